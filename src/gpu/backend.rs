// the compute device as the engine sees it: one call per kernel, dispatched in order.
// the device shipped with this crate is host-emulated, see `cpu::backend`
use glam::Vec3;

use crate::error::FluidError;
use crate::gpu::ffi::ParamsBlock;
use crate::gpu::readback::PendingRead;

// one work group, every dispatch gets rounded up to this
pub const WORK_GROUP_SIZE: u32 = 64;

/// Number of work items actually launched for `count` particles; the surplus
/// items of the last group are masked out by the kernel.
pub fn dispatch_size(count: usize) -> usize {
    count.div_ceil(WORK_GROUP_SIZE as usize) * WORK_GROUP_SIZE as usize
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KernelName {
    ResetCellOffsets,
    Initialize,
    ReorderBoundary,
    ReorderFluid,
    InitializeBoundaryBoundaryPredDensities,
    UpdateDensity,
    UpdateNormal,
    BoundaryPressureInitialization,
    ForceInitialization,
    UpdatePositionAndVelocity,
    UpdatePressure,
    UpdatePressureForce,
}

impl KernelName {
    pub const ALL: [KernelName; 12] = [
        KernelName::ResetCellOffsets,
        KernelName::Initialize,
        KernelName::ReorderBoundary,
        KernelName::ReorderFluid,
        KernelName::InitializeBoundaryBoundaryPredDensities,
        KernelName::UpdateDensity,
        KernelName::UpdateNormal,
        KernelName::BoundaryPressureInitialization,
        KernelName::ForceInitialization,
        KernelName::UpdatePositionAndVelocity,
        KernelName::UpdatePressure,
        KernelName::UpdatePressureForce,
    ];

    pub fn program(self) -> &'static str {
        match self {
            KernelName::ResetCellOffsets
            | KernelName::Initialize
            | KernelName::ReorderBoundary
            | KernelName::ReorderFluid => "sort_utils",
            _ => "pcisph",
        }
    }

    pub fn entry_point(self) -> &'static str {
        match self {
            KernelName::ResetCellOffsets => "reset_cell_offsets",
            KernelName::Initialize => "initialize",
            KernelName::ReorderBoundary => "reorder_and_insert_boundary_offsets",
            KernelName::ReorderFluid => "reorder_and_insert_fluid_offsets",
            KernelName::InitializeBoundaryBoundaryPredDensities => {
                "initialize_boundary_boundary_pred_densities"
            }
            KernelName::UpdateDensity => "update_density",
            KernelName::UpdateNormal => "update_normal",
            KernelName::BoundaryPressureInitialization => "boundary_pressure_initialization",
            KernelName::ForceInitialization => "force_initialization",
            KernelName::UpdatePositionAndVelocity => "update_position_and_velocity",
            KernelName::UpdatePressure => "update_pressure",
            KernelName::UpdatePressureForce => "update_pressure_force",
        }
    }
}

// ===== kernel arguments =====

/// Sorted positions together with the start/end table built for them.
#[derive(Clone, Copy)]
pub struct GridView<'a> {
    pub offsets: &'a [u32],
    pub positions: &'a [Vec3],
}

/// Output of the sort, consumed by the reorder kernels.
#[derive(Clone, Copy)]
pub struct SortedKeys<'a> {
    pub keys: &'a [u32],
    pub src_locations: &'a [u32],
}

/// `to[i] = from[src_locations[i]]`
pub struct Permute<'a, T> {
    pub from: &'a [T],
    pub to: &'a mut [T],
}

#[derive(Clone, Copy)]
pub struct FluidFields<'a> {
    pub velocities: &'a [Vec3],
    pub densities: &'a [f32],
    pub normals: &'a [Vec3],
}

pub struct ForceOutputs<'a> {
    pub other_forces: &'a mut [Vec3],
    pub pressures: &'a mut [f32],
    pub pressure_forces: &'a mut [Vec3],
}

#[derive(Clone, Copy)]
pub struct Forces<'a> {
    pub other: &'a [Vec3],
    pub pressure: &'a [Vec3],
}

#[derive(Clone, Copy)]
pub struct PressureFields<'a> {
    pub densities: &'a [f32],
    pub pressures: &'a [f32],
    pub boundary_pressures: &'a [f32],
}

/// Predict writes a trial position only, commit overwrites the real state.
pub enum Integration<'a> {
    Predict {
        positions: &'a [Vec3],
        velocities: &'a [Vec3],
        predicted: &'a mut [Vec3],
    },
    Commit {
        positions: &'a mut [Vec3],
        velocities: &'a mut [Vec3],
    },
}

/// Which particles `update_pressure` runs over.
pub enum PressureTarget<'a> {
    Boundary {
        positions: &'a [Vec3],
        init_pred_densities: &'a [f32],
        pressures: &'a mut [f32],
    },
    Fluid {
        pressures: &'a mut [f32],
        density_variations: &'a mut [f32],
    },
}

/// A device the engine dispatches to. Calls are executed in the order they are
/// made, so no barriers are needed between them; the only synchronization is
/// waiting on a [`PendingRead`].
pub trait ComputeBackend {
    /// Compiles the programs behind `kernels`. Fatal on failure.
    fn build(&mut self, kernels: &[KernelName]) -> Result<(), FluidError>;

    // ===== grid build =====
    fn reset_cell_offsets(&mut self, block: &ParamsBlock, offsets: &mut [u32]);
    fn initialize_keys(
        &mut self,
        block: &ParamsBlock,
        positions: &[Vec3],
        keys: &mut [u32],
        src_locations: &mut [u32],
    );
    /// Stable sort by key, looking at the low `bits` bits only.
    fn sort(&mut self, keys: &mut [u32], values: &mut [u32], bits: u32);
    fn reorder_boundary(
        &mut self,
        block: &ParamsBlock,
        sorted: SortedKeys<'_>,
        offsets: &mut [u32],
        positions: Permute<'_, Vec3>,
    );
    fn reorder_fluid(
        &mut self,
        block: &ParamsBlock,
        sorted: SortedKeys<'_>,
        offsets: &mut [u32],
        positions: Permute<'_, Vec3>,
        velocities: Permute<'_, Vec3>,
    );

    // ===== pcisph =====
    fn initialize_boundary_densities(
        &mut self,
        block: &ParamsBlock,
        boundary: GridView<'_>,
        init_pred_densities: &mut [f32],
    );
    fn update_density(
        &mut self,
        block: &ParamsBlock,
        fluid: GridView<'_>,
        boundary: GridView<'_>,
        densities: &mut [f32],
    );
    fn update_normal(
        &mut self,
        block: &ParamsBlock,
        fluid: GridView<'_>,
        densities: &[f32],
        normals: &mut [Vec3],
    );
    fn boundary_pressure_initialization(
        &mut self,
        block: &ParamsBlock,
        init_pred_densities: &[f32],
        pressures: &mut [f32],
    );
    fn force_initialization(
        &mut self,
        block: &ParamsBlock,
        fluid: GridView<'_>,
        fields: FluidFields<'_>,
        out: ForceOutputs<'_>,
    );
    fn update_position_and_velocity(
        &mut self,
        block: &ParamsBlock,
        forces: Forces<'_>,
        integration: Integration<'_>,
    );
    /// `fluid` carries the predicted positions, bucketed by the fluid grid.
    fn update_pressure(
        &mut self,
        block: &ParamsBlock,
        fluid: GridView<'_>,
        boundary: GridView<'_>,
        target: PressureTarget<'_>,
    );
    fn update_pressure_force(
        &mut self,
        block: &ParamsBlock,
        fluid: GridView<'_>,
        boundary: GridView<'_>,
        fields: PressureFields<'_>,
        pressure_forces: &mut [Vec3],
    );

    // ===== transfer =====
    /// Starts copying `data` back to the host without waiting for it.
    fn read(&mut self, data: &[f32]) -> PendingRead;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_rounds_up_to_whole_groups() {
        assert_eq!(dispatch_size(0), 0);
        assert_eq!(dispatch_size(1), 64);
        assert_eq!(dispatch_size(64), 64);
        assert_eq!(dispatch_size(65), 128);
        assert_eq!(dispatch_size(1000), 1024);
    }

    #[test]
    fn kernels_live_in_two_programs() {
        let sort_utils = KernelName::ALL
            .iter()
            .filter(|k| k.program() == "sort_utils")
            .count();
        assert_eq!(sort_utils, 4);
        assert_eq!(KernelName::UpdatePressure.entry_point(), "update_pressure");
    }
}
