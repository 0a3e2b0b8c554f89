use crate::core::models::Visible;
use nalgebra::Point3;

/// A dense 3D scalar grid with a Cartesian origin and uniform voxel size.
///
/// Data is stored z-major: index `(k * jsize + j) * isize + i` for voxel
/// `(i, j, k)` along the x, y, z axes.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeGrid {
    pub name: String,
    pub origin: Point3<f64>,
    pub voxel_size: f64,
    /// Voxel counts along x, y, z.
    pub dims: [usize; 3],
    pub data: Vec<f32>,
}

impl VolumeGrid {
    /// Allocates a zero-filled grid.
    pub fn new(name: &str, origin: Point3<f64>, voxel_size: f64, dims: [usize; 3]) -> Self {
        Self {
            name: name.to_string(),
            origin,
            voxel_size,
            dims,
            data: vec![0.0; dims[0] * dims[1] * dims[2]],
        }
    }

    pub fn num_voxels(&self) -> usize {
        self.data.len()
    }

    pub fn voxel_volume(&self) -> f64 {
        self.voxel_size.powi(3)
    }

    /// Cartesian position of the center of voxel `(i, j, k)`.
    pub fn voxel_center(&self, i: usize, j: usize, k: usize) -> Point3<f64> {
        self.origin
            + nalgebra::Vector3::new(
                (i as f64 + 0.5) * self.voxel_size,
                (j as f64 + 0.5) * self.voxel_size,
                (k as f64 + 0.5) * self.voxel_size,
            )
    }

    /// Sum of all voxel values times the voxel volume.
    pub fn integral(&self) -> f64 {
        self.data.iter().map(|v| *v as f64).sum::<f64>() * self.voxel_volume()
    }

    /// Mass-rank display threshold: the histogram-derived value below which
    /// `fraction` of the total mass lies, so that fraction of the
    /// probability mass sits outside the displayed isosurface.
    pub fn mass_rank_value(&self, fraction: f64) -> f32 {
        const BINS: usize = 1024;
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for &v in &self.data {
            min = min.min(v);
            max = max.max(v);
        }
        if !(min < max) {
            return if min.is_finite() { min } else { 0.0 };
        }

        let scale = BINS as f32 / (max - min);
        let mut bin_mass = vec![0.0f64; BINS];
        for &v in &self.data {
            let bin = (((v - min) * scale) as usize).min(BINS - 1);
            bin_mass[bin] += v as f64;
        }
        let total: f64 = bin_mass.iter().sum();
        let target = fraction.clamp(0.0, 1.0) * total;

        let mut cumulative = 0.0;
        for (bin, mass) in bin_mass.iter().enumerate() {
            cumulative += mass;
            if cumulative >= target {
                return min + (bin + 1) as f32 / scale;
            }
        }
        max
    }
}

/// A displayable localization density: a probability grid plus its surface
/// threshold and tint.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityMap {
    pub asym_id: Option<String>,
    pub grid: VolumeGrid,
    pub surface_level: f32,
    pub color: [u8; 4],
    /// Auxiliary maps stay out of the interactive volume-viewer listing.
    pub show_in_volume_viewer: bool,
    pub display: bool,
}

impl DensityMap {
    /// Wraps a grid with a mass-rank surface level at `level_fraction`.
    pub fn new(asym_id: Option<String>, grid: VolumeGrid, level_fraction: f64, color: [u8; 4]) -> Self {
        let surface_level = grid.mass_rank_value(level_fraction);
        Self {
            asym_id,
            grid,
            surface_level,
            color,
            show_in_volume_viewer: false,
            display: true,
        }
    }
}

impl Visible for DensityMap {
    fn is_visible(&self) -> bool {
        self.display
    }
    fn set_visible(&mut self, visible: bool) {
        self.display = visible;
    }
}
