use glam::Vec3;

use crate::cpu::neighbors::EMPTY_CELL;
use crate::error::FluidError;

// ==================== particle buffers ===============================

// all fluid arrays are indexed by sorted position and reordered together
#[derive(Clone, Debug, Default)]
pub struct FluidBuffers {
    pub positions: Vec<Vec3>,
    pub predicted_positions: Vec<Vec3>,
    pub velocities: Vec<Vec3>,
    pub densities: Vec<f32>,
    pub normals: Vec<Vec3>,
    pub other_forces: Vec<Vec3>,
    pub pressures: Vec<f32>,
    pub pressure_forces: Vec<Vec3>,
    /// predicted density - rest density, read back for the convergence test
    pub density_variations: Vec<f32>,
}

impl FluidBuffers {
    pub fn zeroed(count: usize) -> Self {
        Self {
            positions: vec![Vec3::ZERO; count],
            predicted_positions: vec![Vec3::ZERO; count],
            velocities: vec![Vec3::ZERO; count],
            densities: vec![0.0; count],
            normals: vec![Vec3::ZERO; count],
            other_forces: vec![Vec3::ZERO; count],
            pressures: vec![0.0; count],
            pressure_forces: vec![Vec3::ZERO; count],
            density_variations: vec![0.0; count],
        }
    }

    // velocities and everything else start at zero
    pub fn from_positions(positions: Vec<Vec3>) -> Self {
        let mut buffers = Self::zeroed(positions.len());
        buffers.positions = positions;
        buffers
    }

    pub fn check_consistent(&self, expected: usize) -> Result<(), FluidError> {
        check_len("fluid positions", self.positions.len(), expected)?;
        check_len(
            "fluid predicted positions",
            self.predicted_positions.len(),
            expected,
        )?;
        check_len("fluid velocities", self.velocities.len(), expected)?;
        check_len("fluid densities", self.densities.len(), expected)?;
        check_len("fluid normals", self.normals.len(), expected)?;
        check_len("fluid other forces", self.other_forces.len(), expected)?;
        check_len("fluid pressures", self.pressures.len(), expected)?;
        check_len("fluid pressure forces", self.pressure_forces.len(), expected)?;
        check_len(
            "fluid density variations",
            self.density_variations.len(),
            expected,
        )
    }
}

// static walls, only reordered when the boundary changes
#[derive(Clone, Debug, Default)]
pub struct BoundaryBuffers {
    pub positions: Vec<Vec3>,
    pub pressures: Vec<f32>,
    /// boundary vs boundary density, constant while the boundary stays put
    pub init_pred_densities: Vec<f32>,
}

impl BoundaryBuffers {
    pub fn from_positions(positions: Vec<Vec3>) -> Self {
        let count = positions.len();
        Self {
            positions,
            pressures: vec![0.0; count],
            init_pred_densities: vec![0.0; count],
        }
    }

    pub fn check_consistent(&self, expected: usize) -> Result<(), FluidError> {
        check_len("boundary positions", self.positions.len(), expected)?;
        check_len("boundary pressures", self.pressures.len(), expected)?;
        check_len(
            "boundary initial predicted densities",
            self.init_pred_densities.len(),
            expected,
        )
    }
}

fn check_len(name: &'static str, len: usize, expected: usize) -> Result<(), FluidError> {
    if len == expected {
        Ok(())
    } else {
        Err(FluidError::InconsistentBuffer {
            name,
            len,
            expected,
        })
    }
}

// ==================== grid buffers ===================================

/// Spatial hash state of one particle set.
#[derive(Clone, Debug, Default)]
pub struct GridBuffers {
    /// `[start, end)` of every bucket in the sorted arrays, `EMPTY_CELL` when unused
    pub cell_offsets: Vec<u32>,
    pub keys: Vec<u32>,
    pub src_locations: Vec<u32>,
    pub positions_tmp: Vec<Vec3>,
    // fluid only, stays empty for the boundary
    pub velocities_tmp: Vec<Vec3>,
}

impl GridBuffers {
    pub fn new(count: usize, bucket_count: u32, with_velocities: bool) -> Self {
        Self {
            cell_offsets: vec![EMPTY_CELL; (bucket_count as usize * 2).max(1)],
            keys: vec![0; count],
            src_locations: vec![0; count],
            positions_tmp: vec![Vec3::ZERO; count],
            velocities_tmp: if with_velocities {
                vec![Vec3::ZERO; count]
            } else {
                Vec::new()
            },
        }
    }
}

// =====================================================================
