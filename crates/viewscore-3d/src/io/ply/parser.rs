use std::io::{BufRead, Read};
use std::path::Path;

use super::{
    properties::{PlyDataType, PlyPropertyDefinition, PlyType, VertexLayout},
    PlyError,
};
use crate::{mesh::TriangleMesh, pointcloud::PointCloud};

/// Upper bound on records reserved up front. The declared count is untrusted.
const MAX_PREALLOCATED_RECORDS: usize = 1 << 20;

/// Encoding of the PLY body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlyFormat {
    /// Whitespace separated text.
    Ascii,
    /// Packed little-endian values.
    BinaryLittleEndian,
}

/// An `element` block of the header.
#[derive(Debug, Clone, PartialEq)]
pub struct PlyElement {
    /// The element name, e.g. `vertex` or `face`.
    pub name: String,
    /// The number of records.
    pub count: usize,
    /// The properties of each record, in file order.
    pub properties: Vec<PlyPropertyDefinition>,
}

impl PlyElement {
    fn capacity_hint(&self) -> usize {
        self.count.min(MAX_PREALLOCATED_RECORDS)
    }
}

/// The parsed PLY header.
#[derive(Debug, Clone, PartialEq)]
pub struct PlyHeader {
    /// The body encoding.
    pub format: PlyFormat,
    /// The elements in file order.
    pub elements: Vec<PlyElement>,
}

impl PlyHeader {
    /// Find an element by name.
    pub fn element(&self, name: &str) -> Option<&PlyElement> {
        self.elements.iter().find(|e| e.name == name)
    }
}

fn parse_header<R: BufRead>(reader: &mut R) -> Result<PlyHeader, PlyError> {
    let mut line = String::new();
    let mut format = None;
    let mut elements: Vec<PlyElement> = Vec::new();

    if reader.read_line(&mut line)? == 0 || line.trim() != "ply" {
        return Err(PlyError::MalformedHeader("missing 'ply' magic".to_string()));
    }

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(PlyError::MalformedHeader(
                "end of file before 'end_header'".to_string(),
            ));
        }
        let parts = line.split_whitespace().collect::<Vec<_>>();

        match parts.as_slice() {
            [] | ["comment", ..] | ["obj_info", ..] => continue,
            ["end_header"] => break,
            ["format", "ascii", _] => format = Some(PlyFormat::Ascii),
            ["format", "binary_little_endian", _] => format = Some(PlyFormat::BinaryLittleEndian),
            ["format", other, ..] => return Err(PlyError::UnsupportedFormat(other.to_string())),
            ["element", name, count] => {
                let count = count.parse().map_err(|_| {
                    PlyError::MalformedHeader(format!("invalid count for element '{name}'"))
                })?;
                elements.push(PlyElement {
                    name: name.to_string(),
                    count,
                    properties: Vec::new(),
                });
            }
            ["property", "list", count_type, item_type, name] => {
                let element = elements.last_mut().ok_or_else(|| {
                    PlyError::MalformedHeader(format!("property '{name}' outside of an element"))
                })?;
                element.properties.push(PlyPropertyDefinition {
                    name: name.to_string(),
                    data_type: PlyDataType::parse(item_type)?,
                    list_count: Some(PlyDataType::parse(count_type)?),
                });
            }
            ["property", data_type, name] => {
                let element = elements.last_mut().ok_or_else(|| {
                    PlyError::MalformedHeader(format!("property '{name}' outside of an element"))
                })?;
                element
                    .properties
                    .push(PlyPropertyDefinition::scalar(name, PlyDataType::parse(data_type)?));
            }
            _ => {
                return Err(PlyError::MalformedHeader(format!(
                    "unexpected header line '{}'",
                    line.trim()
                )))
            }
        }
    }

    let format =
        format.ok_or_else(|| PlyError::MalformedHeader("missing 'format' line".to_string()))?;

    Ok(PlyHeader { format, elements })
}

/// A stream of typed values from the PLY body.
trait ValueSource {
    fn next_value(&mut self, data_type: PlyDataType) -> Result<f64, PlyError>;

    /// Fill `buffer` with the raw bytes of one packed record.
    fn read_packed(&mut self, buffer: &mut [u8]) -> Result<(), PlyError>;
}

struct AsciiSource<'a> {
    tokens: std::str::SplitAsciiWhitespace<'a>,
}

impl ValueSource for AsciiSource<'_> {
    fn next_value(&mut self, data_type: PlyDataType) -> Result<f64, PlyError> {
        let token = self
            .tokens
            .next()
            .ok_or_else(|| PlyError::Parse("unexpected end of data".to_string()))?;
        data_type.parse_token(token)
    }

    fn read_packed(&mut self, _buffer: &mut [u8]) -> Result<(), PlyError> {
        Err(PlyError::UnsupportedFormat(
            "packed records in an ascii body".to_string(),
        ))
    }
}

struct BinarySource<R> {
    reader: R,
    scratch: [u8; 8],
}

impl<R: Read> ValueSource for BinarySource<R> {
    fn next_value(&mut self, data_type: PlyDataType) -> Result<f64, PlyError> {
        let bytes = &mut self.scratch[..data_type.size()];
        self.reader.read_exact(bytes)?;
        data_type.decode_le(bytes)
    }

    fn read_packed(&mut self, buffer: &mut [u8]) -> Result<(), PlyError> {
        self.reader.read_exact(buffer)?;
        Ok(())
    }
}

/// Read one record: scalar values in `scalars`, list values in `lists`, each in property order.
fn read_record<S: ValueSource>(
    source: &mut S,
    properties: &[PlyPropertyDefinition],
    scalars: &mut Vec<f64>,
    lists: &mut Vec<Vec<f64>>,
) -> Result<(), PlyError> {
    scalars.clear();
    lists.clear();
    for property in properties {
        match property.list_count {
            None => scalars.push(source.next_value(property.data_type)?),
            Some(count_type) => {
                let count = source.next_value(count_type)?;
                if !(count.is_finite() && count >= 0.0) {
                    return Err(PlyError::Parse(format!(
                        "invalid list length {count} for '{}'",
                        property.name
                    )));
                }
                let items = (0..count as usize)
                    .map(|_| source.next_value(property.data_type))
                    .collect::<Result<Vec<_>, _>>()?;
                lists.push(items);
            }
        }
    }
    Ok(())
}

/// Everything read from the body that the geometry types need.
#[derive(Debug, Default)]
struct PlyContents {
    points: Vec<[f64; 3]>,
    normals: Option<Vec<[f64; 3]>>,
    scalars: Option<Vec<f32>>,
    faces: Vec<[u32; 3]>,
}

fn read_vertices<S: ValueSource>(
    source: &mut S,
    format: PlyFormat,
    element: &PlyElement,
    contents: &mut PlyContents,
) -> Result<(), PlyError> {
    let ply_type = PlyType::detect_format(&element.properties);

    if let (PlyFormat::BinaryLittleEndian, Some(size)) = (format, ply_type.packed_size()) {
        let mut buffer = vec![0u8; size];
        let mut normals = Vec::with_capacity(element.capacity_hint());
        contents.points.reserve(element.capacity_hint());
        for _ in 0..element.count {
            source.read_packed(&mut buffer)?;
            let property = ply_type.deserialize(&buffer)?;
            contents.points.push(property.to_point());
            normals.push(property.to_normal());
        }
        contents.normals = Some(normals);
        return Ok(());
    }

    let layout = VertexLayout::from_properties(&element.properties)?;
    let mut normals = layout.normal.map(|_| Vec::with_capacity(element.capacity_hint()));
    let mut scalars = layout.scalar.map(|_| Vec::with_capacity(element.capacity_hint()));
    let (mut record, mut lists) = (Vec::new(), Vec::new());

    contents.points.reserve(element.capacity_hint());
    for _ in 0..element.count {
        read_record(source, &element.properties, &mut record, &mut lists)?;
        contents.points.push(layout.point(&record));
        if let (Some(normals), Some(normal)) = (normals.as_mut(), layout.normal(&record)) {
            normals.push(normal);
        }
        if let (Some(scalars), Some(scalar)) = (scalars.as_mut(), layout.scalar(&record)) {
            scalars.push(scalar);
        }
    }

    contents.normals = normals;
    contents.scalars = scalars;
    Ok(())
}

fn read_faces<S: ValueSource>(
    source: &mut S,
    element: &PlyElement,
    contents: &mut PlyContents,
) -> Result<(), PlyError> {
    let indices_column = element
        .properties
        .iter()
        .filter(|p| p.is_list())
        .position(|p| p.name == "vertex_indices" || p.name == "vertex_index")
        .ok_or(PlyError::MissingProperty("vertex_indices"))?;

    let (mut record, mut lists) = (Vec::new(), Vec::new());
    let mut skipped = 0usize;

    contents.faces.reserve(element.capacity_hint());
    for _ in 0..element.count {
        read_record(source, &element.properties, &mut record, &mut lists)?;
        let polygon = lists[indices_column]
            .iter()
            .map(|&i| {
                if i.is_finite() && i >= 0.0 && i <= u32::MAX as f64 {
                    Ok(i as u32)
                } else {
                    Err(PlyError::Parse(format!("invalid vertex index {i}")))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        if polygon.len() < 3 {
            skipped += 1;
            continue;
        }

        // fan triangulation around the first corner
        for i in 1..polygon.len() - 1 {
            contents
                .faces
                .push([polygon[0], polygon[i], polygon[i + 1]]);
        }
    }

    if skipped > 0 {
        log::warn!("skipped {skipped} faces with fewer than three vertices");
    }
    Ok(())
}

fn skip_element<S: ValueSource>(source: &mut S, element: &PlyElement) -> Result<(), PlyError> {
    let (mut record, mut lists) = (Vec::new(), Vec::new());
    for _ in 0..element.count {
        read_record(source, &element.properties, &mut record, &mut lists)?;
    }
    Ok(())
}

fn read_body<S: ValueSource>(source: &mut S, header: &PlyHeader) -> Result<PlyContents, PlyError> {
    let mut contents = PlyContents::default();
    let mut has_vertices = false;

    for element in &header.elements {
        match element.name.as_str() {
            "vertex" => {
                read_vertices(source, header.format, element, &mut contents)?;
                has_vertices = true;
            }
            "face" => read_faces(source, element, &mut contents)?,
            _ => skip_element(source, element)?,
        }
    }

    if !has_vertices {
        return Err(PlyError::MissingProperty("vertex"));
    }
    Ok(contents)
}

fn read_ply(path: &Path) -> Result<PlyContents, PlyError> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    let header = parse_header(&mut reader)?;

    match header.format {
        PlyFormat::Ascii => {
            let mut body = String::new();
            reader.read_to_string(&mut body)?;
            let mut source = AsciiSource {
                tokens: body.split_ascii_whitespace(),
            };
            read_body(&mut source, &header)
        }
        PlyFormat::BinaryLittleEndian => {
            let mut source = BinarySource {
                reader,
                scratch: [0u8; 8],
            };
            read_body(&mut source, &header)
        }
    }
}

/// Read a triangle mesh from a PLY file.
///
/// Polygons are fan-triangulated. A `quality` or `scalar` vertex property, when present,
/// becomes the mesh scalar field.
///
/// # Arguments
///
/// * `path` - The path to the PLY file.
///
/// # Returns
///
/// The mesh with vertices in file order.
pub fn read_ply_mesh(path: impl AsRef<Path>) -> Result<TriangleMesh, PlyError> {
    let contents = read_ply(path.as_ref())?;
    let mut mesh = TriangleMesh::new(contents.points, contents.faces)?;
    if let Some(scalars) = contents.scalars {
        mesh.set_scalars(scalars)?;
    }

    log::debug!(
        "read mesh {} with {} vertices and {} faces",
        path.as_ref().display(),
        mesh.num_vertices(),
        mesh.num_faces()
    );

    Ok(mesh)
}

/// Read a point cloud from a PLY file.
///
/// Missing normals are synthesized, see [`PointCloud::from_points_with_normals`].
pub fn read_ply_pointcloud(path: impl AsRef<Path>) -> Result<PointCloud, PlyError> {
    let contents = read_ply(path.as_ref())?;
    let pointcloud = PointCloud::from_points_with_normals(contents.points, contents.normals)?;

    log::debug!(
        "read point cloud {} with {} points",
        path.as_ref().display(),
        pointcloud.len()
    );

    Ok(pointcloud)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(bytes: &[u8]) -> Result<NamedTempFile, std::io::Error> {
        let mut file = NamedTempFile::new()?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(file)
    }

    #[test]
    fn test_parse_header_basic() -> Result<(), PlyError> {
        let header_text = "ply\nformat binary_little_endian 1.0\ncomment test\nelement vertex 10\nproperty float x\nproperty float y\nproperty float z\nelement face 2\nproperty list uchar int vertex_indices\nend_header\n";
        let mut reader = std::io::BufReader::new(header_text.as_bytes());
        let header = parse_header(&mut reader)?;
        assert_eq!(header.format, PlyFormat::BinaryLittleEndian);
        assert_eq!(header.elements.len(), 2);

        let vertex = header.element("vertex").ok_or(PlyError::MissingProperty("vertex"))?;
        assert_eq!(vertex.count, 10);
        assert_eq!(vertex.properties.len(), 3);
        assert_eq!(vertex.properties[0].name, "x");
        assert_eq!(vertex.properties[0].data_type, PlyDataType::Float32);

        let face = header.element("face").ok_or(PlyError::MissingProperty("face"))?;
        assert_eq!(face.properties[0].list_count, Some(PlyDataType::UInt8));
        assert_eq!(face.properties[0].data_type, PlyDataType::Int32);
        Ok(())
    }

    #[test]
    fn test_parse_header_errors() {
        let mut reader = std::io::BufReader::new("plx\n".as_bytes());
        assert!(matches!(
            parse_header(&mut reader),
            Err(PlyError::MalformedHeader(_))
        ));

        let mut reader =
            std::io::BufReader::new("ply\nformat binary_big_endian 1.0\nend_header\n".as_bytes());
        assert!(matches!(
            parse_header(&mut reader),
            Err(PlyError::UnsupportedFormat(_))
        ));

        let mut reader = std::io::BufReader::new("ply\nproperty float x\n".as_bytes());
        assert!(matches!(
            parse_header(&mut reader),
            Err(PlyError::MalformedHeader(_))
        ));

        let mut reader = std::io::BufReader::new("ply\nformat ascii 1.0\n".as_bytes());
        assert!(matches!(
            parse_header(&mut reader),
            Err(PlyError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_read_ascii_mesh_with_quad() -> Result<(), Box<dyn std::error::Error>> {
        let file = write_temp(
            b"ply\nformat ascii 1.0\nelement vertex 4\nproperty float x\nproperty float y\nproperty float z\nproperty float quality\nelement face 1\nproperty list uchar int vertex_indices\nend_header\n0 0 0 0.1\n1 0 0 0.2\n1 1 0 0.3\n0 1 0 0.4\n4 0 1 2 3\n",
        )?;
        let mesh = read_ply_mesh(file.path())?;
        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.faces(), &[[0, 1, 2], [0, 2, 3]]);
        assert_eq!(mesh.vertices()[2], [1.0, 1.0, 0.0]);
        assert_eq!(mesh.scalars(), Some(&[0.1f32, 0.2, 0.3, 0.4][..]));
        Ok(())
    }

    #[test]
    fn test_read_mesh_out_of_bounds_face() -> Result<(), Box<dyn std::error::Error>> {
        let file = write_temp(
            b"ply\nformat ascii 1.0\nelement vertex 3\nproperty float x\nproperty float y\nproperty float z\nelement face 1\nproperty list uchar int vertex_indices\nend_header\n0 0 0\n1 0 0\n0 1 0\n3 0 1 7\n",
        )?;
        assert!(matches!(read_ply_mesh(file.path()), Err(PlyError::Mesh(_))));
        Ok(())
    }

    #[test]
    fn test_read_binary_pointcloud_packed() -> Result<(), Box<dyn std::error::Error>> {
        let mut bytes = b"ply\nformat binary_little_endian 1.0\nelement vertex 1\nproperty float x\nproperty float y\nproperty float z\nproperty float nx\nproperty float ny\nproperty float nz\nend_header\n".to_vec();
        for v in [1.0f32, 2.0, 3.0, 0.0, 2.0, 0.0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let file = write_temp(&bytes)?;

        let pointcloud = read_ply_pointcloud(file.path())?;
        assert_eq!(pointcloud.len(), 1);
        assert_eq!(pointcloud.points()[0], [1.0, 2.0, 3.0]);
        assert_eq!(pointcloud.normals()[0], [0.0, 1.0, 0.0]);
        Ok(())
    }

    #[test]
    fn test_read_binary_pointcloud_dynamic() -> Result<(), Box<dyn std::error::Error>> {
        let mut bytes = b"ply\nformat binary_little_endian 1.0\nelement vertex 2\nproperty double x\nproperty double y\nproperty double z\nproperty uchar intensity\nend_header\n".to_vec();
        for p in [[1.0f64, 0.0, 0.0], [-1.0, 0.0, 0.0]] {
            for v in p {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
            bytes.push(7);
        }
        let file = write_temp(&bytes)?;

        let pointcloud = read_ply_pointcloud(file.path())?;
        assert_eq!(pointcloud.len(), 2);
        assert_eq!(pointcloud.points()[1], [-1.0, 0.0, 0.0]);
        // no normals in the file, synthesized outward from the centre
        assert_eq!(pointcloud.normals()[0], [1.0, 0.0, 0.0]);
        assert_eq!(pointcloud.normals()[1], [-1.0, 0.0, 0.0]);
        Ok(())
    }

    #[test]
    fn test_read_oversized_vertex_count() -> Result<(), Box<dyn std::error::Error>> {
        let file = write_temp(
            b"ply\nformat ascii 1.0\nelement vertex 99999999999999999\nproperty float x\nproperty float y\nproperty float z\nend_header\n0 0 0\n1 0 0\n",
        )?;
        assert!(matches!(read_ply_pointcloud(file.path()), Err(PlyError::Parse(_))));
        assert!(read_ply_mesh(file.path()).is_err());

        let mut bytes = b"ply\nformat binary_little_endian 1.0\nelement vertex 99999999999999999\nproperty float x\nproperty float y\nproperty float z\nend_header\n".to_vec();
        bytes.extend_from_slice(&1.0f32.to_le_bytes());
        let file = write_temp(&bytes)?;
        assert!(matches!(read_ply_pointcloud(file.path()), Err(PlyError::Io(_))));
        Ok(())
    }

    #[test]
    fn test_read_truncated_binary() -> Result<(), Box<dyn std::error::Error>> {
        let mut bytes = b"ply\nformat binary_little_endian 1.0\nelement vertex 2\nproperty float x\nproperty float y\nproperty float z\nend_header\n".to_vec();
        bytes.extend_from_slice(&1.0f32.to_le_bytes());
        let file = write_temp(&bytes)?;
        assert!(matches!(
            read_ply_pointcloud(file.path()),
            Err(PlyError::Io(_))
        ));
        Ok(())
    }

    #[test]
    fn test_read_missing_vertex_element() -> Result<(), Box<dyn std::error::Error>> {
        let file = write_temp(b"ply\nformat ascii 1.0\nend_header\n")?;
        assert!(matches!(
            read_ply_mesh(file.path()),
            Err(PlyError::MissingProperty("vertex"))
        ));
        Ok(())
    }
}
