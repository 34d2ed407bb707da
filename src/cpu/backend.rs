// host implementation of the compute device: rayon runs every dispatch as work groups of 64
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use glam::Vec3;
use rayon::prelude::*;

use crate::cache::{Cache, EntryBuilder};
use crate::cpu::neighbors::{EMPTY_CELL, hash_position};
use crate::cpu::{pcisph, radix_sort};
use crate::error::FluidError;
use crate::gpu::backend::{
    ComputeBackend, FluidFields, ForceOutputs, Forces, GridView, Integration, KernelName, Permute,
    PressureFields, PressureTarget, SortedKeys, WORK_GROUP_SIZE, dispatch_size,
};
use crate::gpu::ffi::ParamsBlock;
use crate::gpu::readback::PendingRead;

const GROUP: usize = WORK_GROUP_SIZE as usize;

// ==================== programs =======================================

/// A built program and the entry points it exports.
#[derive(Debug)]
pub struct Program {
    pub name: &'static str,
    entry_points: BTreeSet<&'static str>,
}

impl Program {
    pub fn has_entry_point(&self, entry_point: &str) -> bool {
        self.entry_points.contains(entry_point)
    }
}

/// Where programs come from. The builtin set exports every kernel the engine
/// dispatches.
#[derive(Clone, Debug)]
pub struct ProgramLoader {
    sources: BTreeMap<&'static str, BTreeSet<&'static str>>,
}

impl ProgramLoader {
    pub fn builtin() -> Self {
        let mut sources: BTreeMap<&'static str, BTreeSet<&'static str>> = BTreeMap::new();
        for kernel in KernelName::ALL {
            sources
                .entry(kernel.program())
                .or_default()
                .insert(kernel.entry_point());
        }
        Self { sources }
    }

    /// Drops an entry point, e.g. to see how a broken program is reported.
    pub fn without_entry_point(mut self, program: &str, entry_point: &str) -> Self {
        if let Some(entry_points) = self.sources.get_mut(program) {
            entry_points.remove(entry_point);
        }
        self
    }
}

impl EntryBuilder<&'static str, Arc<Program>> for ProgramLoader {
    type Error = FluidError;

    fn build(&mut self, name: &&'static str) -> Result<Arc<Program>, FluidError> {
        let entry_points = self
            .sources
            .get(name)
            .ok_or_else(|| FluidError::KernelBuild {
                program: name.to_string(),
                log: "no source for program".to_string(),
            })?;
        Ok(Arc::new(Program {
            name: *name,
            entry_points: entry_points.clone(),
        }))
    }
}

// ==================== backend ========================================

pub struct CpuBackend {
    programs: Cache<&'static str, Arc<Program>, ProgramLoader>,
    built: BTreeSet<KernelName>,
    dispatches: usize,
    work_items: usize,
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::with_programs(ProgramLoader::builtin())
    }

    pub fn with_programs(loader: ProgramLoader) -> Self {
        Self {
            programs: Cache::new(loader),
            built: BTreeSet::new(),
            dispatches: 0,
            work_items: 0,
        }
    }

    /// Kernel launches so far (the sort counts as one).
    pub fn dispatches(&self) -> usize {
        self.dispatches
    }

    /// Work items launched so far, rounded up to whole work groups.
    pub fn work_items(&self) -> usize {
        self.work_items
    }

    pub fn reset_counters(&mut self) {
        self.dispatches = 0;
        self.work_items = 0;
    }

    fn launch(&mut self, kernel: KernelName, count: usize) {
        debug_assert!(self.built.contains(&kernel), "{:?} was never built", kernel);
        self.dispatches += 1;
        self.work_items += dispatch_size(count);
    }
}

// one rayon task per work group, items past the end of the slice never run
fn run_groups<T: Send>(out: &mut [T], item: impl Fn(usize, &mut T) + Sync + Send) {
    out.par_chunks_mut(GROUP)
        .enumerate()
        .for_each(|(group, chunk)| {
            for (local, slot) in chunk.iter_mut().enumerate() {
                item(group * GROUP + local, slot);
            }
        });
}

fn run_groups2<A: Send, B: Send>(
    a: &mut [A],
    b: &mut [B],
    item: impl Fn(usize, &mut A, &mut B) + Sync + Send,
) {
    a.par_chunks_mut(GROUP)
        .zip(b.par_chunks_mut(GROUP))
        .enumerate()
        .for_each(|(group, (chunk_a, chunk_b))| {
            for (local, (x, y)) in chunk_a.iter_mut().zip(chunk_b.iter_mut()).enumerate() {
                item(group * GROUP + local, x, y);
            }
        });
}

// start at the first index of a run of equal keys, end one past its last
fn insert_offsets(keys: &[u32], offsets: &mut [u32]) {
    for (i, &key) in keys.iter().enumerate() {
        let cell = key as usize;
        if i == 0 || keys[i - 1] != key {
            offsets[2 * cell] = i as u32;
        }
        if i + 1 == keys.len() || keys[i + 1] != key {
            offsets[2 * cell + 1] = i as u32 + 1;
        }
    }
}

impl ComputeBackend for CpuBackend {
    fn build(&mut self, kernels: &[KernelName]) -> Result<(), FluidError> {
        for &kernel in kernels {
            let program = self.programs.get(&kernel.program())?;
            if !program.has_entry_point(kernel.entry_point()) {
                return Err(FluidError::KernelBuild {
                    program: program.name.to_string(),
                    log: format!("kernel `{}` not found", kernel.entry_point()),
                });
            }
            self.built.insert(kernel);
        }
        Ok(())
    }

    fn reset_cell_offsets(&mut self, _block: &ParamsBlock, offsets: &mut [u32]) {
        self.launch(KernelName::ResetCellOffsets, offsets.len() / 2);
        offsets.par_iter_mut().for_each(|o| *o = EMPTY_CELL);
    }

    fn initialize_keys(
        &mut self,
        block: &ParamsBlock,
        positions: &[Vec3],
        keys: &mut [u32],
        src_locations: &mut [u32],
    ) {
        self.launch(KernelName::Initialize, keys.len());
        let params = block.decode();
        run_groups2(keys, src_locations, |i, key, src| {
            *key = hash_position(&params, positions[i]);
            *src = i as u32;
        });
    }

    fn sort(&mut self, keys: &mut [u32], values: &mut [u32], bits: u32) {
        self.dispatches += 1;
        self.work_items += dispatch_size(keys.len());
        radix_sort::sort_pairs(keys, values, bits);
    }

    fn reorder_boundary(
        &mut self,
        _block: &ParamsBlock,
        sorted: SortedKeys<'_>,
        offsets: &mut [u32],
        positions: Permute<'_, Vec3>,
    ) {
        self.launch(KernelName::ReorderBoundary, sorted.keys.len());
        let Permute { from, to } = positions;
        run_groups(to, |i, out| *out = from[sorted.src_locations[i] as usize]);
        insert_offsets(sorted.keys, offsets);
    }

    fn reorder_fluid(
        &mut self,
        _block: &ParamsBlock,
        sorted: SortedKeys<'_>,
        offsets: &mut [u32],
        positions: Permute<'_, Vec3>,
        velocities: Permute<'_, Vec3>,
    ) {
        self.launch(KernelName::ReorderFluid, sorted.keys.len());
        let (positions_in, velocities_in) = (positions.from, velocities.from);
        run_groups2(positions.to, velocities.to, |i, x, v| {
            let src = sorted.src_locations[i] as usize;
            *x = positions_in[src];
            *v = velocities_in[src];
        });
        insert_offsets(sorted.keys, offsets);
    }

    fn initialize_boundary_densities(
        &mut self,
        block: &ParamsBlock,
        boundary: GridView<'_>,
        init_pred_densities: &mut [f32],
    ) {
        self.launch(
            KernelName::InitializeBoundaryBoundaryPredDensities,
            init_pred_densities.len(),
        );
        let params = block.decode();
        run_groups(init_pred_densities, |b, rho| {
            *rho = pcisph::boundary_boundary_density(&params, boundary, b);
        });
    }

    fn update_density(
        &mut self,
        block: &ParamsBlock,
        fluid: GridView<'_>,
        boundary: GridView<'_>,
        densities: &mut [f32],
    ) {
        self.launch(KernelName::UpdateDensity, densities.len());
        let params = block.decode();
        run_groups(densities, |i, rho| {
            *rho = pcisph::density(&params, fluid, boundary, i);
        });
    }

    fn update_normal(
        &mut self,
        block: &ParamsBlock,
        fluid: GridView<'_>,
        densities: &[f32],
        normals: &mut [Vec3],
    ) {
        self.launch(KernelName::UpdateNormal, normals.len());
        let params = block.decode();
        run_groups(normals, |i, n| *n = pcisph::normal(&params, fluid, densities, i));
    }

    fn boundary_pressure_initialization(
        &mut self,
        block: &ParamsBlock,
        init_pred_densities: &[f32],
        pressures: &mut [f32],
    ) {
        self.launch(KernelName::BoundaryPressureInitialization, pressures.len());
        let params = block.decode();
        run_groups(pressures, |b, p| {
            *p = pcisph::boundary_initial_pressure(&params, init_pred_densities[b]);
        });
    }

    fn force_initialization(
        &mut self,
        block: &ParamsBlock,
        fluid: GridView<'_>,
        fields: FluidFields<'_>,
        out: ForceOutputs<'_>,
    ) {
        self.launch(KernelName::ForceInitialization, out.other_forces.len());
        let params = block.decode();
        run_groups(out.other_forces, |i, f| {
            *f = pcisph::other_force(&params, fluid, fields, i);
        });
        out.pressures.par_iter_mut().for_each(|p| *p = 0.0);
        out.pressure_forces.par_iter_mut().for_each(|f| *f = Vec3::ZERO);
    }

    fn update_position_and_velocity(
        &mut self,
        block: &ParamsBlock,
        forces: Forces<'_>,
        integration: Integration<'_>,
    ) {
        let params = block.decode();
        match integration {
            Integration::Predict {
                positions,
                velocities,
                predicted,
            } => {
                self.launch(KernelName::UpdatePositionAndVelocity, predicted.len());
                run_groups(predicted, |i, out| {
                    let force = forces.other[i] + forces.pressure[i];
                    *out = pcisph::integrate(&params, positions[i], velocities[i], force).0;
                });
            }
            Integration::Commit {
                positions,
                velocities,
            } => {
                self.launch(KernelName::UpdatePositionAndVelocity, positions.len());
                run_groups2(positions, velocities, |i, x, v| {
                    let force = forces.other[i] + forces.pressure[i];
                    (*x, *v) = pcisph::integrate(&params, *x, *v, force);
                });
            }
        }
    }

    fn update_pressure(
        &mut self,
        block: &ParamsBlock,
        fluid: GridView<'_>,
        boundary: GridView<'_>,
        target: PressureTarget<'_>,
    ) {
        let params = block.decode();
        match target {
            PressureTarget::Boundary {
                positions,
                init_pred_densities,
                pressures,
            } => {
                self.launch(KernelName::UpdatePressure, pressures.len());
                run_groups(pressures, |b, p| {
                    let predicted = pcisph::boundary_predicted_density(
                        &params,
                        fluid,
                        positions[b],
                        init_pred_densities[b],
                    );
                    *p = pcisph::corrected_pressure(&params, *p, predicted).0;
                });
            }
            PressureTarget::Fluid {
                pressures,
                density_variations,
            } => {
                self.launch(KernelName::UpdatePressure, pressures.len());
                run_groups2(pressures, density_variations, |i, p, variation| {
                    let predicted = pcisph::density(&params, fluid, boundary, i);
                    (*p, *variation) = pcisph::corrected_pressure(&params, *p, predicted);
                });
            }
        }
    }

    fn update_pressure_force(
        &mut self,
        block: &ParamsBlock,
        fluid: GridView<'_>,
        boundary: GridView<'_>,
        fields: PressureFields<'_>,
        pressure_forces: &mut [Vec3],
    ) {
        self.launch(KernelName::UpdatePressureForce, pressure_forces.len());
        let params = block.decode();
        run_groups(pressure_forces, |i, f| {
            *f = pcisph::pressure_force(&params, fluid, boundary, fields, i);
        });
    }

    fn read(&mut self, data: &[f32]) -> PendingRead {
        let (tx, pending) = PendingRead::channel();
        let data = data.to_vec();
        rayon::spawn(move || {
            // nobody waiting any more is not our problem
            let _ = tx.send(data);
        });
        pending
    }
}
