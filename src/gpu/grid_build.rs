// spatial hash grid build: hash -> sort -> reorder + offset table
use crate::error::FluidError;
use crate::gpu::backend::{ComputeBackend, GridView, Permute, SortedKeys};
use crate::gpu::buffers::{BoundaryBuffers, FluidBuffers, GridBuffers};
use crate::gpu::ffi::{ParamsBlock, SimulationParams};

/// Smallest bit width (at least 1) whose all-ones value reaches `n - 1`, i.e.
/// enough to sort keys in `[0, n)`.
pub fn sort_bit_count(n: usize) -> Result<u32, FluidError> {
    let max_key = n.saturating_sub(1);
    let max_key = u32::try_from(max_key).map_err(|_| FluidError::SortBitWidth { count: n })?;
    Ok((u32::BITS - max_key.leading_zeros()).max(1))
}

// keys are bucket indices, so small sets still need the bucket range
fn key_bits(count: usize, params: &SimulationParams) -> Result<u32, FluidError> {
    sort_bit_count(count.max(params.bucket_count as usize))
}

/// Sorts the static boundary into buckets. Only needed when the boundary changed.
pub fn build_boundary_grid<B: ComputeBackend>(
    backend: &mut B,
    block: &ParamsBlock,
    params: &SimulationParams,
    grid: &mut GridBuffers,
    boundary: &mut BoundaryBuffers,
) -> Result<(), FluidError> {
    let count = boundary.positions.len();
    if count == 0 {
        return Ok(());
    }
    let bits = key_bits(count, params)?;

    backend.reset_cell_offsets(block, &mut grid.cell_offsets);
    backend.initialize_keys(
        block,
        &boundary.positions,
        &mut grid.keys,
        &mut grid.src_locations,
    );
    backend.sort(&mut grid.keys, &mut grid.src_locations, bits);

    grid.positions_tmp.copy_from_slice(&boundary.positions);
    backend.reorder_boundary(
        block,
        SortedKeys {
            keys: &grid.keys,
            src_locations: &grid.src_locations,
        },
        &mut grid.cell_offsets,
        Permute {
            from: &grid.positions_tmp,
            to: &mut boundary.positions,
        },
    );
    Ok(())
}

/// Re-buckets the fluid, dragging positions and velocities along. Every step.
pub fn build_fluid_grid<B: ComputeBackend>(
    backend: &mut B,
    block: &ParamsBlock,
    params: &SimulationParams,
    grid: &mut GridBuffers,
    fluid: &mut FluidBuffers,
) -> Result<(), FluidError> {
    let count = fluid.positions.len();
    if count == 0 {
        return Ok(());
    }
    let bits = key_bits(count, params)?;

    backend.reset_cell_offsets(block, &mut grid.cell_offsets);
    backend.initialize_keys(
        block,
        &fluid.positions,
        &mut grid.keys,
        &mut grid.src_locations,
    );
    backend.sort(&mut grid.keys, &mut grid.src_locations, bits);

    grid.positions_tmp.copy_from_slice(&fluid.positions);
    grid.velocities_tmp.copy_from_slice(&fluid.velocities);
    backend.reorder_fluid(
        block,
        SortedKeys {
            keys: &grid.keys,
            src_locations: &grid.src_locations,
        },
        &mut grid.cell_offsets,
        Permute {
            from: &grid.positions_tmp,
            to: &mut fluid.positions,
        },
        Permute {
            from: &grid.velocities_tmp,
            to: &mut fluid.velocities,
        },
    );
    Ok(())
}

pub fn grid_view<'a>(grid: &'a GridBuffers, positions: &'a [glam::Vec3]) -> GridView<'a> {
    GridView {
        offsets: &grid.cell_offsets,
        positions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::backend::CpuBackend;
    use crate::cpu::neighbors::{EMPTY_CELL, hash_position};
    use crate::gpu::backend::KernelName;
    use crate::sim::derive::derive_params;
    use crate::sim::settings::FluidSettings;
    use glam::Vec3;

    fn backend() -> CpuBackend {
        let mut backend = CpuBackend::new();
        backend.build(&KernelName::ALL).unwrap();
        backend
    }

    // a loose jittered block so that plenty of cells hold several particles
    fn scattered(count: usize) -> Vec<Vec3> {
        (0..count)
            .map(|i| {
                let f = i as f32;
                Vec3::new(
                    (f * 0.37).sin() * 0.2,
                    (f * 0.11).cos() * 0.15,
                    (f * 0.53).fract() * 0.1,
                )
            })
            .collect()
    }

    fn sorted_fluid(count: usize) -> (SimulationParams, GridBuffers, FluidBuffers, Vec<Vec3>) {
        let params = derive_params(&FluidSettings::default().with_counts(count as u32, 0));
        let block = ParamsBlock::new(&params);
        let positions = scattered(count);
        let mut fluid = FluidBuffers::from_positions(positions.clone());
        fluid.velocities = (0..count).map(|i| Vec3::splat(i as f32)).collect();
        let mut grid = GridBuffers::new(count, params.bucket_count, true);
        build_fluid_grid(&mut backend(), &block, &params, &mut grid, &mut fluid).unwrap();
        (params, grid, fluid, positions)
    }

    #[test]
    fn bit_count() {
        assert_eq!(sort_bit_count(0).unwrap(), 1);
        assert_eq!(sort_bit_count(2).unwrap(), 1);
        assert_eq!(sort_bit_count(3).unwrap(), 2);
        assert_eq!(sort_bit_count(64).unwrap(), 6);
        assert_eq!(sort_bit_count(65).unwrap(), 7);
        assert_eq!(sort_bit_count(1 << 20).unwrap(), 20);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn bit_count_overflow() {
        let n = u32::MAX as usize + 2;
        assert_eq!(sort_bit_count(n), Err(FluidError::SortBitWidth { count: n }));
    }

    #[test]
    fn cell_ranges_partition_the_particles() {
        let (params, grid, fluid, _) = sorted_fluid(500);
        let mut covered = vec![0u32; 500];
        for bucket in 0..params.bucket_count as usize {
            let start = grid.cell_offsets[2 * bucket];
            let end = grid.cell_offsets[2 * bucket + 1];
            if start == EMPTY_CELL {
                assert_eq!(end, EMPTY_CELL);
                continue;
            }
            assert!(start < end);
            for i in start as usize..end as usize {
                covered[i] += 1;
                assert_eq!(hash_position(&params, fluid.positions[i]) as usize, bucket);
            }
        }
        assert!(covered.iter().all(|&c| c == 1));
    }

    #[test]
    fn sort_is_stable() {
        let (_, grid, _, _) = sorted_fluid(500);
        for pair in grid.keys.windows(2).zip(grid.src_locations.windows(2)) {
            let (keys, src) = pair;
            assert!(keys[0] <= keys[1]);
            if keys[0] == keys[1] {
                assert!(src[0] < src[1]);
            }
        }
    }

    #[test]
    fn permutation_round_trip() {
        let (_, grid, fluid, original) = sorted_fluid(300);
        let mut positions = vec![Vec3::ZERO; 300];
        let mut velocities = vec![Vec3::ZERO; 300];
        for (i, &src) in grid.src_locations.iter().enumerate() {
            positions[src as usize] = fluid.positions[i];
            velocities[src as usize] = fluid.velocities[i];
        }
        assert_eq!(positions, original);
        let expected: Vec<Vec3> = (0..300).map(|i| Vec3::splat(i as f32)).collect();
        assert_eq!(velocities, expected);
    }

    #[test]
    fn boundary_grid_keeps_every_particle() {
        let params = derive_params(&FluidSettings::default().with_counts(10, 64));
        let block = ParamsBlock::new(&params);
        let original = scattered(64);
        let mut boundary = BoundaryBuffers::from_positions(original.clone());
        let mut grid = GridBuffers::new(64, params.bucket_count, false);
        build_boundary_grid(&mut backend(), &block, &params, &mut grid, &mut boundary).unwrap();

        let mut restored = vec![Vec3::ZERO; 64];
        for (i, &src) in grid.src_locations.iter().enumerate() {
            restored[src as usize] = boundary.positions[i];
        }
        assert_eq!(restored, original);
    }

    #[test]
    fn empty_set_dispatches_nothing() {
        let params = derive_params(&FluidSettings::default());
        let block = ParamsBlock::new(&params);
        let mut backend = backend();
        let mut grid = GridBuffers::new(0, params.bucket_count, true);
        let mut fluid = FluidBuffers::zeroed(0);
        build_fluid_grid(&mut backend, &block, &params, &mut grid, &mut fluid).unwrap();
        assert_eq!(backend.dispatches(), 0);
    }
}
