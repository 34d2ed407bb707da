// deriving every dependent constant from the base settings
use std::f32::consts::PI;

use glam::Vec3;

use crate::cpu::kernels;
use crate::gpu::backend::WORK_GROUP_SIZE;
use crate::gpu::ffi::SimulationParams;
use crate::sim::settings::FluidSettings;

/// Smallest grid the hash ever uses.
pub const MIN_BUCKET_COUNT: u32 = WORK_GROUP_SIZE;

/// Buckets scale with the particle count but stay a multiple of 64 so hash
/// keys remain locally unique within a work group.
pub fn bucket_count(fluid_count: u32) -> u32 {
    let buckets = fluid_count / 2;
    (buckets - buckets % WORK_GROUP_SIZE).max(MIN_BUCKET_COUNT)
}

/// Pure: the same settings always give bit-identical params.
pub fn derive_params(settings: &FluidSettings) -> SimulationParams {
    let r = settings.particle_radius;
    let kernel_radius = 4.0 * r;

    let mut params = SimulationParams {
        particle_radius: r,
        // a cube of fluid with side 2r at rest density
        particle_mass: settings.rest_density / (1.0 / (2.0 * r)).powi(3),
        rest_density: settings.rest_density,
        boundary_count: settings.boundary_count,
        fluid_count: settings.fluid_count,
        kernel_radius,
        kernel_radius2: kernel_radius * kernel_radius,
        bucket_count: bucket_count(settings.fluid_count),
        cell_size: kernel_radius,
        poly6_normalization: 315.0 / (64.0 * PI * kernel_radius.powi(9)),
        poly6_d1_normalization: -945.0 / (32.0 * PI * kernel_radius.powi(9)),
        viscosity_d2_normalization: 45.0 / (PI * kernel_radius.powi(6)),
        spiky_d1_normalization: -45.0 / (PI * kernel_radius.powi(6)),
        surface_tension_coefficient: settings.surface_tension,
        surface_tension_term: kernel_radius.powi(6) / 64.0,
        surface_tension_normalization: 32.0 / (PI * kernel_radius.powi(9)),
        viscosity_constant: settings.viscosity,
        gravity: settings.gravity,
        delta_t: settings.delta_t,
        density_variation_scaling_factor: 0.0,
    };
    params.density_variation_scaling_factor = density_variation_scaling_factor(&params);
    params
}

/// PCISPH stability constant. Sums the poly6 gradient over a filled lattice of
/// virtual neighbours (spacing 2r, extent h + 2r in every axis), so it only
/// depends on r, rho_0 and dt, never on actual particle positions.
pub fn density_variation_scaling_factor(params: &SimulationParams) -> f32 {
    let particle_size = 2.0 * params.particle_radius;
    let mass = params.particle_mass;
    let beta = params.delta_t * params.delta_t * mass * mass * 2.0
        / (params.rest_density * params.rest_density);

    // the lattice is walked in whole steps, (h + 2r) / 2r == 3
    let extent = ((params.kernel_radius + particle_size) / particle_size).floor() as i32;

    let mut value_sum = Vec3::ZERO;
    let mut value_dot_value_sum = 0.0;
    for z in -extent..=extent {
        for y in -extent..=extent {
            for x in -extent..=extent {
                let offset = Vec3::new(x as f32, y as f32, z as f32) * particle_size;
                let r2 = offset.length_squared();
                if r2 < params.kernel_radius2 {
                    let value = -kernels::poly6_gradient(params, offset, r2);
                    value_sum += value;
                    value_dot_value_sum += value.length_squared();
                }
            }
        }
    }

    let value_sum_dot_value_sum = value_sum.length_squared();
    -1.0 / (beta * (-value_sum_dot_value_sum - value_dot_value_sum))
}
