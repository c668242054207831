//! The scoring pipeline as a chain of stages.
//!
//! Each stage consumes the previous one, so the order
//! `Loaded → IndicesBuilt → Accumulated → Projected → Scored → Exported` is enforced by the
//! types. Any failure aborts the run.

use std::path::{Path, PathBuf};
use std::time::Instant;

use viewscore_3d::{
    io::ply::{read_ply_mesh, read_ply_pointcloud, write_ply_mesh, PlyError, PlyWriteOptions},
    mesh::TriangleMesh,
    pointcloud::PointCloud,
    spatial::{NearestNeighborIndex, RayIntersectionIndex},
    transfer::{from_device_blob, to_device_blob},
};

use crate::{
    accumulator::PerPointAccumulator,
    config::PipelineConfig,
    encoding::PackedQualityBuffer,
    grid::SphericalQualityGrid,
    projector::SphericalQualityProjector,
    scorer::{export_scores, ViewpointScorer},
    visibility::{AccumulationStats, VisibilityAccumulator},
    QualityError,
};

/// A step of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Inputs are in memory.
    Loaded,
    /// Spatial indexes are built.
    IndicesBuilt,
    /// Per-point evidence is accumulated.
    Accumulated,
    /// The quality grid is projected.
    Projected,
    /// Candidate vertices are scored.
    Scored,
    /// The scored sphere is written.
    Exported,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Loaded => "Loaded",
            Stage::IndicesBuilt => "IndicesBuilt",
            Stage::Accumulated => "Accumulated",
            Stage::Projected => "Projected",
            Stage::Scored => "Scored",
            Stage::Exported => "Exported",
        };
        write!(f, "{name}")
    }
}

/// Input files of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenePaths {
    /// Triangulated proxy surface, used for occlusion.
    pub proxy_mesh: PathBuf,
    /// Dense proxy samples with normals.
    pub proxy_cloud: PathBuf,
    /// Candidate-viewpoint sphere to score.
    pub candidate_sphere: PathBuf,
}

impl ScenePaths {
    /// Create the input set.
    pub fn new(
        proxy_mesh: impl Into<PathBuf>,
        proxy_cloud: impl Into<PathBuf>,
        candidate_sphere: impl Into<PathBuf>,
    ) -> Self {
        Self {
            proxy_mesh: proxy_mesh.into(),
            proxy_cloud: proxy_cloud.into(),
            candidate_sphere: candidate_sphere.into(),
        }
    }

    /// `<sphere stem>_scored.ply` next to the candidate sphere.
    pub fn default_output(&self) -> PathBuf {
        let stem = self
            .candidate_sphere
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sphere".to_string());
        self.candidate_sphere
            .with_file_name(format!("{stem}_scored.ply"))
    }
}

fn load_error(path: &Path) -> impl FnOnce(PlyError) -> QualityError + '_ {
    move |source| QualityError::Load {
        path: path.to_path_buf(),
        source,
    }
}

fn load_mesh(path: &Path) -> Result<TriangleMesh, QualityError> {
    let mesh = read_ply_mesh(path).map_err(load_error(path))?;
    if mesh.num_vertices() == 0 {
        return Err(load_error(path)(PlyError::Empty));
    }
    Ok(mesh)
}

fn load_pointcloud(path: &Path) -> Result<PointCloud, QualityError> {
    let cloud = read_ply_pointcloud(path).map_err(load_error(path))?;
    if cloud.is_empty() {
        return Err(load_error(path)(PlyError::Empty));
    }
    Ok(cloud)
}

// round trip through a blob, as the parallel passes only see uploaded copies
fn upload<T>(value: &T, name: &str) -> Result<T, QualityError>
where
    T: bincode::Encode + bincode::Decode<()>,
{
    let blob = to_device_blob(value)?;
    log::debug!("uploaded {name}: {} bytes", blob.len());
    Ok(from_device_blob(&blob)?)
}

/// Stage [`Stage::Loaded`]: the three inputs in memory.
#[derive(Debug, Clone)]
pub struct LoadedScene {
    config: PipelineConfig,
    proxy_mesh: TriangleMesh,
    proxy_cloud: PointCloud,
    sphere: TriangleMesh,
}

impl LoadedScene {
    /// Read the three input files.
    ///
    /// # Errors
    ///
    /// [`QualityError::Load`] naming the first file that cannot be read or holds no vertices.
    pub fn load(paths: &ScenePaths, config: PipelineConfig) -> Result<Self, QualityError> {
        let start = Instant::now();
        let proxy_mesh = load_mesh(&paths.proxy_mesh)?;
        let proxy_cloud = load_pointcloud(&paths.proxy_cloud)?;
        let sphere = load_mesh(&paths.candidate_sphere)?;
        log::debug!("loading took {:?}", start.elapsed());

        Ok(Self::from_parts(proxy_mesh, proxy_cloud, sphere, config))
    }

    /// Start from geometry already in memory.
    pub fn from_parts(
        proxy_mesh: TriangleMesh,
        proxy_cloud: PointCloud,
        sphere: TriangleMesh,
        config: PipelineConfig,
    ) -> Self {
        log::info!(
            "{}: proxy mesh with {} faces, {} proxy points, {} candidate viewpoints",
            Stage::Loaded,
            proxy_mesh.num_faces(),
            proxy_cloud.len(),
            sphere.num_vertices()
        );
        Self {
            config,
            proxy_mesh,
            proxy_cloud,
            sphere,
        }
    }

    /// The run configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The proxy surface.
    pub fn proxy_mesh(&self) -> &TriangleMesh {
        &self.proxy_mesh
    }

    /// The proxy samples.
    pub fn proxy_cloud(&self) -> &PointCloud {
        &self.proxy_cloud
    }

    /// The candidate-viewpoint sphere.
    pub fn sphere(&self) -> &TriangleMesh {
        &self.sphere
    }

    /// Build the ray index over the proxy mesh and the nearest-neighbor index over the proxy
    /// points, and resolve the observer from the proxy bounding box.
    ///
    /// # Errors
    ///
    /// [`QualityError::EmptyGeometry`] if either input has nothing to index.
    pub fn build_indices(self) -> Result<IndexedScene, QualityError> {
        let start = Instant::now();
        let rays = RayIntersectionIndex::build(&self.proxy_mesh).map_err(|source| {
            QualityError::EmptyGeometry {
                input: "proxy mesh",
                source,
            }
        })?;
        let points = NearestNeighborIndex::build(self.proxy_cloud.points()).map_err(|source| {
            QualityError::EmptyGeometry {
                input: "proxy point cloud",
                source,
            }
        })?;
        log::debug!("index construction took {:?}", start.elapsed());

        let rays = upload(&rays, "ray index")?;
        let points = upload(&points, "nearest-neighbor index")?;
        let cloud = upload(&self.proxy_cloud, "point cloud")?;

        let observer = self.config.resolve_observer(&self.proxy_mesh.bounds());
        log::info!(
            "{}: {} triangles, {} points, observer at {:?}",
            Stage::IndicesBuilt,
            rays.num_triangles(),
            points.len(),
            observer
        );

        Ok(IndexedScene {
            config: self.config,
            observer,
            cloud,
            rays,
            points,
            sphere: self.sphere,
        })
    }
}

/// Stage [`Stage::IndicesBuilt`]: read-only indexes ready for the parallel passes.
#[derive(Debug)]
pub struct IndexedScene {
    config: PipelineConfig,
    observer: [f64; 3],
    cloud: PointCloud,
    rays: RayIntersectionIndex,
    points: NearestNeighborIndex,
    sphere: TriangleMesh,
}

impl IndexedScene {
    /// The reference observer position.
    pub fn observer(&self) -> [f64; 3] {
        self.observer
    }

    /// The ray index over the proxy mesh.
    pub fn rays(&self) -> &RayIntersectionIndex {
        &self.rays
    }

    /// The nearest-neighbor index over the proxy points.
    pub fn points(&self) -> &NearestNeighborIndex {
        &self.points
    }

    /// Run the visibility pass from the observer.
    pub fn accumulate(self) -> Result<AccumulatedScene, QualityError> {
        let start = Instant::now();
        let accumulator = PerPointAccumulator::new(self.cloud.len());
        let stats = VisibilityAccumulator::new(&self.cloud, &self.rays)
            .with_epsilon(self.config.occlusion_epsilon)
            .with_strategy(self.config.strategy)
            .accumulate(&self.observer, &accumulator)?;
        log::debug!("accumulation took {:?}", start.elapsed());
        log::info!(
            "{}: {} of {} points observed",
            Stage::Accumulated,
            stats.accepted,
            stats.total()
        );

        Ok(AccumulatedScene {
            indexed: self,
            accumulator,
            stats,
        })
    }
}

/// Stage [`Stage::Accumulated`]: per-point evidence from the observer.
pub struct AccumulatedScene {
    indexed: IndexedScene,
    accumulator: PerPointAccumulator,
    stats: AccumulationStats,
}

impl AccumulatedScene {
    /// The per-point evidence.
    pub fn accumulator(&self) -> &PerPointAccumulator {
        &self.accumulator
    }

    /// Counters of the visibility pass.
    pub fn stats(&self) -> AccumulationStats {
        self.stats
    }

    /// Project the evidence onto the spherical quality grid.
    pub fn project(self) -> Result<ProjectedScene, QualityError> {
        let start = Instant::now();
        let config = &self.indexed.config;
        let grid = SphericalQualityProjector::new(
            &self.indexed.rays,
            &self.indexed.points,
            config.camera,
        )
        .with_target_gsd(config.target_gsd)
        .with_aggregation(config.aggregation.aggregation())
        .with_strategy(config.strategy)
        .project(&self.indexed.observer, &self.accumulator)?;
        log::debug!("projection took {:?}", start.elapsed());
        log::info!(
            "{}: {} covered cells",
            Stage::Projected,
            grid.num_covered()
        );

        Ok(ProjectedScene {
            accumulated: self,
            grid,
        })
    }
}

/// Stage [`Stage::Projected`]: the quality grid.
pub struct ProjectedScene {
    accumulated: AccumulatedScene,
    grid: SphericalQualityGrid,
}

impl ProjectedScene {
    /// The projected grid.
    pub fn grid(&self) -> &SphericalQualityGrid {
        &self.grid
    }

    /// The per-point evidence.
    pub fn accumulator(&self) -> &PerPointAccumulator {
        &self.accumulated.accumulator
    }

    /// Score every candidate vertex, attach the scores to the sphere and move the sphere onto
    /// the observer.
    pub fn score(self) -> Result<ScoredScene, QualityError> {
        let AccumulatedScene {
            indexed,
            accumulator,
            stats,
        } = self.accumulated;
        let IndexedScene {
            config,
            observer,
            mut sphere,
            ..
        } = indexed;

        let scores = PackedQualityBuffer::new(sphere.num_vertices());
        ViewpointScorer::new(config.lookup)
            .with_strategy(config.strategy)
            .score(&self.grid, &sphere, &scores)?;

        export_scores(&mut sphere, &scores, &observer)?;
        log::info!(
            "{}: {} candidate viewpoints",
            Stage::Scored,
            sphere.num_vertices()
        );

        Ok(ScoredScene {
            observer,
            sphere,
            grid: self.grid,
            accumulator,
            stats,
        })
    }
}

/// Stage [`Stage::Scored`]: the candidate sphere carrying its scores.
pub struct ScoredScene {
    observer: [f64; 3],
    sphere: TriangleMesh,
    grid: SphericalQualityGrid,
    accumulator: PerPointAccumulator,
    stats: AccumulationStats,
}

impl ScoredScene {
    /// The reference observer position.
    pub fn observer(&self) -> [f64; 3] {
        self.observer
    }

    /// The scored sphere, centred on the observer.
    pub fn sphere(&self) -> &TriangleMesh {
        &self.sphere
    }

    /// One score per candidate vertex.
    pub fn scores(&self) -> &[f32] {
        self.sphere.scalars().unwrap_or(&[])
    }

    /// The quality grid the scores were read from.
    pub fn grid(&self) -> &SphericalQualityGrid {
        &self.grid
    }

    /// The per-point evidence.
    pub fn accumulator(&self) -> &PerPointAccumulator {
        &self.accumulator
    }

    /// Counters of the visibility pass.
    pub fn stats(&self) -> AccumulationStats {
        self.stats
    }

    /// Write the scored sphere with its scalar field.
    pub fn export(&self, path: impl AsRef<Path>) -> Result<(), QualityError> {
        let path = path.as_ref();
        write_ply_mesh(path, &self.sphere, PlyWriteOptions::default()).map_err(|source| {
            QualityError::Export {
                path: path.to_path_buf(),
                source,
            }
        })?;
        log::info!("{}: {}", Stage::Exported, path.display());
        Ok(())
    }
}

/// Run every stage on `paths` and write the scored sphere to
/// [`ScenePaths::default_output`].
///
/// # Returns
///
/// The path of the written file.
pub fn run_pipeline(paths: &ScenePaths, config: &PipelineConfig) -> Result<PathBuf, QualityError> {
    let output = paths.default_output();
    LoadedScene::load(paths, config.clone())?
        .build_indices()?
        .accumulate()?
        .project()?
        .score()?
        .export(&output)?;
    Ok(output)
}
