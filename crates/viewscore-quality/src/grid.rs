use glam::DVec3;

/// Number of azimuth columns, one per degree.
pub const GRID_WIDTH: usize = 360;

/// Number of elevation rows, one per degree.
pub const GRID_HEIGHT: usize = 180;

/// Spherical angles of a direction in degrees.
///
/// `azimuth` is `atan2(y, x)` wrapped to `[0, 360)`, `polar` is the angle from +Z in `[0, 180]`.
/// Returns `None` for a zero or non-finite direction.
pub fn direction_to_angles(direction: &[f64; 3]) -> Option<(f64, f64)> {
    let d = DVec3::from_array(*direction);
    if !d.is_finite() {
        return None;
    }
    let d = d.try_normalize()?;
    let polar = d.z.clamp(-1.0, 1.0).acos().to_degrees();
    let azimuth = d.y.atan2(d.x).to_degrees().rem_euclid(360.0);
    Some((azimuth, polar))
}

/// The `(row, col)` cell containing `direction`.
///
/// Row 0 holds the directions closest to +Z, the -Z pole falls in the last row.
pub fn direction_to_cell(direction: &[f64; 3]) -> Option<(usize, usize)> {
    let (azimuth, polar) = direction_to_angles(direction)?;
    let row = (polar.floor() as usize).min(GRID_HEIGHT - 1);
    let col = (azimuth.floor() as usize) % GRID_WIDTH;
    Some((row, col))
}

/// Unit direction through the centre of cell `(row, col)`.
pub fn cell_direction(row: usize, col: usize) -> [f64; 3] {
    let polar = (row as f64 + 0.5).to_radians();
    let azimuth = (col as f64 + 0.5).to_radians();
    [
        polar.sin() * azimuth.cos(),
        polar.sin() * azimuth.sin(),
        polar.cos(),
    ]
}

/// Expected reconstruction quality as a function of viewing direction.
///
/// Equirectangular grid of [`GRID_HEIGHT`] rows by [`GRID_WIDTH`] columns in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct SphericalQualityGrid {
    cells: Vec<f32>,
}

impl Default for SphericalQualityGrid {
    fn default() -> Self {
        Self::new()
    }
}

impl SphericalQualityGrid {
    /// Create a grid with every cell at zero.
    pub fn new() -> Self {
        Self {
            cells: vec![0.0; GRID_WIDTH * GRID_HEIGHT],
        }
    }

    /// Value of cell `(row, col)`.
    ///
    /// PRECONDITION: `row < GRID_HEIGHT` and `col < GRID_WIDTH`.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.cells[row * GRID_WIDTH + col]
    }

    /// Set cell `(row, col)`.
    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        self.cells[row * GRID_WIDTH + col] = value;
    }

    /// The cells in row-major order.
    pub fn as_slice(&self) -> &[f32] {
        &self.cells
    }

    /// The cells in row-major order.
    pub fn as_slice_mut(&mut self) -> &mut [f32] {
        &mut self.cells
    }

    /// The largest cell value.
    pub fn max_value(&self) -> f32 {
        self.cells.iter().copied().fold(0.0, f32::max)
    }

    /// Number of cells with a positive value.
    pub fn num_covered(&self) -> usize {
        self.cells.iter().filter(|&&v| v > 0.0).count()
    }

    /// Value of the cell containing `direction`, zero for an invalid direction.
    pub fn sample_nearest(&self, direction: &[f64; 3]) -> f32 {
        direction_to_cell(direction)
            .map(|(row, col)| self.get(row, col))
            .unwrap_or(0.0)
    }

    /// Bilinear interpolation between the four cell centres around `direction`.
    ///
    /// Azimuth wraps around, elevation clamps at the poles. Zero for an invalid direction.
    pub fn sample_bilinear(&self, direction: &[f64; 3]) -> f32 {
        let Some((azimuth, polar)) = direction_to_angles(direction) else {
            return 0.0;
        };

        let y = (polar - 0.5).clamp(0.0, (GRID_HEIGHT - 1) as f64);
        let row0 = (y.floor() as usize).min(GRID_HEIGHT - 1);
        let row1 = (row0 + 1).min(GRID_HEIGHT - 1);
        let wy = (y - row0 as f64) as f32;

        let x = azimuth - 0.5;
        let x0 = x.floor();
        let wx = (x - x0) as f32;
        let col0 = (x0 as i64).rem_euclid(GRID_WIDTH as i64) as usize;
        let col1 = (col0 + 1) % GRID_WIDTH;

        let top = self.get(row0, col0) * (1.0 - wx) + self.get(row0, col1) * wx;
        let bottom = self.get(row1, col0) * (1.0 - wx) + self.get(row1, col1) * wx;
        top * (1.0 - wy) + bottom * wy
    }
}
