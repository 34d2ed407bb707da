// uniform spatial hash: cell coordinates, bucket hash and the 3x3x3 neighbour walk
use glam::{IVec3, Vec3};

use crate::gpu::ffi::SimulationParams;

/// Offset table value of a bucket nobody landed in.
pub const EMPTY_CELL: u32 = u32::MAX;

const HASH_PRIMES: [u32; 3] = [73_856_093, 19_349_663, 83_492_791];

#[inline]
pub fn cell_coord(pos: Vec3, cell_size: f32) -> IVec3 {
    (pos / cell_size).floor().as_ivec3()
}

#[inline]
pub fn hash_cell(cell: IVec3, bucket_count: u32) -> u32 {
    let h = (cell.x as u32).wrapping_mul(HASH_PRIMES[0])
        ^ (cell.y as u32).wrapping_mul(HASH_PRIMES[1])
        ^ (cell.z as u32).wrapping_mul(HASH_PRIMES[2]);
    h % bucket_count
}

#[inline]
pub fn hash_position(params: &SimulationParams, pos: Vec3) -> u32 {
    hash_cell(cell_coord(pos, params.cell_size), params.bucket_count)
}

/// Buckets of the 27 cells around `cell`, each one listed once even when
/// several cells collide into it.
fn neighbor_buckets(cell: IVec3, bucket_count: u32) -> ([u32; 27], usize) {
    let mut buckets = [0u32; 27];
    let mut len = 0;
    for z in -1..=1 {
        for y in -1..=1 {
            for x in -1..=1 {
                let bucket = hash_cell(cell + IVec3::new(x, y, z), bucket_count);
                if !buckets[..len].contains(&bucket) {
                    buckets[len] = bucket;
                    len += 1;
                }
            }
        }
    }
    (buckets, len)
}

/// Calls `f(j, point - positions[j], r2)` for every sorted particle `j` within
/// the kernel radius of `point`. `offsets` is the start/end table built for
/// `positions`, which must already be in sorted order.
pub fn for_each_neighbor(
    params: &SimulationParams,
    offsets: &[u32],
    positions: &[Vec3],
    point: Vec3,
    mut f: impl FnMut(usize, Vec3, f32),
) {
    if positions.is_empty() {
        return;
    }
    let (buckets, len) = neighbor_buckets(cell_coord(point, params.cell_size), params.bucket_count);
    for &bucket in &buckets[..len] {
        let start = offsets[2 * bucket as usize];
        if start == EMPTY_CELL {
            continue;
        }
        let end = offsets[2 * bucket as usize + 1];
        for j in start as usize..end as usize {
            let d = point - positions[j];
            let r2 = d.length_squared();
            if r2 < params.kernel_radius2 {
                f(j, d, r2);
            }
        }
    }
}
