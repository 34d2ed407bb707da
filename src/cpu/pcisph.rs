// per particle bodies of the pcisph kernels, one call = one work item
use glam::Vec3;

use crate::cpu::kernels::{poly6, poly6_gradient, spiky_gradient, surface_tension, viscosity_laplacian};
use crate::cpu::neighbors::for_each_neighbor;
use crate::gpu::backend::{FluidFields, GridView, PressureFields};
use crate::gpu::ffi::SimulationParams;

/// Poly6 weighted mass of `grid` around `point`.
#[inline]
fn mass_density_at(params: &SimulationParams, grid: GridView<'_>, point: Vec3) -> f32 {
    let mut sum = 0.0;
    for_each_neighbor(params, grid.offsets, grid.positions, point, |_, _, r2| {
        sum += poly6(params, r2);
    });
    params.particle_mass * sum
}

// boundary vs boundary only, the particle itself included
pub fn boundary_boundary_density(params: &SimulationParams, boundary: GridView<'_>, i: usize) -> f32 {
    mass_density_at(params, boundary, boundary.positions[i])
}

/// Density of fluid particle `i`, self contribution included. Also gives the
/// predicted density when `fluid` carries predicted positions.
pub fn density(
    params: &SimulationParams,
    fluid: GridView<'_>,
    boundary: GridView<'_>,
    i: usize,
) -> f32 {
    let point = fluid.positions[i];
    mass_density_at(params, fluid, point) + mass_density_at(params, boundary, point)
}

// predicted density of a wall particle: its cached wall density plus the moved fluid
pub fn boundary_predicted_density(
    params: &SimulationParams,
    fluid: GridView<'_>,
    point: Vec3,
    init_pred_density: f32,
) -> f32 {
    init_pred_density + mass_density_at(params, fluid, point)
}

// Akinci surface normal, scaled by h and not unit length
pub fn normal(params: &SimulationParams, fluid: GridView<'_>, densities: &[f32], i: usize) -> Vec3 {
    let mut n = Vec3::ZERO;
    for_each_neighbor(params, fluid.offsets, fluid.positions, fluid.positions[i], |j, d, r2| {
        n += params.particle_mass / densities[j] * poly6_gradient(params, d, r2);
    });
    params.kernel_radius * n
}

/// Viscosity, surface tension and gravity. Held constant through the solver.
pub fn other_force(
    params: &SimulationParams,
    fluid: GridView<'_>,
    fields: FluidFields<'_>,
    i: usize,
) -> Vec3 {
    let m = params.particle_mass;
    let sigma = params.surface_tension_coefficient;
    let rho_i = fields.densities[i];
    let v_i = fields.velocities[i];
    let n_i = fields.normals[i];

    let mut viscosity = Vec3::ZERO;
    let mut tension = Vec3::ZERO;
    for_each_neighbor(params, fluid.offsets, fluid.positions, fluid.positions[i], |j, d, r2| {
        if j == i {
            return;
        }
        let r = r2.sqrt();
        let rho_j = fields.densities[j];
        viscosity += m / rho_j * (fields.velocities[j] - v_i) * viscosity_laplacian(params, r);

        // symmetric correction, stronger where the fluid is sparse
        let k_ij = 2.0 * params.rest_density / (rho_i + rho_j);
        let mut f = -sigma * m * (n_i - fields.normals[j]);
        if r > 0.0 {
            f -= sigma * m * m * surface_tension(params, r) * d / r;
        }
        tension += k_ij * f;
    });

    m * params.viscosity_constant * viscosity + tension + Vec3::new(0.0, m * params.gravity, 0.0)
}

// walls start every step from the pressure their own density asks for
pub fn boundary_initial_pressure(params: &SimulationParams, init_pred_density: f32) -> f32 {
    (params.density_variation_scaling_factor * (init_pred_density - params.rest_density)).max(0.0)
}

/// Accumulates the pressure correction for a predicted density. Returns the
/// new pressure and the raw density variation.
pub fn corrected_pressure(params: &SimulationParams, pressure: f32, predicted_density: f32) -> (f32, f32) {
    let variation = predicted_density - params.rest_density;
    let pressure = (pressure + params.density_variation_scaling_factor * variation).max(0.0);
    (pressure, variation)
}

pub fn pressure_force(
    params: &SimulationParams,
    fluid: GridView<'_>,
    boundary: GridView<'_>,
    fields: PressureFields<'_>,
    i: usize,
) -> Vec3 {
    let m2 = params.particle_mass * params.particle_mass;
    let rho_02 = params.rest_density * params.rest_density;
    let point = fluid.positions[i];
    let term_i = fields.pressures[i] / (fields.densities[i] * fields.densities[i]);

    let mut f = Vec3::ZERO;
    for_each_neighbor(params, fluid.offsets, fluid.positions, point, |j, d, r2| {
        if j == i {
            return;
        }
        let term_j = fields.pressures[j] / (fields.densities[j] * fields.densities[j]);
        f -= m2 * (term_i + term_j) * spiky_gradient(params, d, r2.sqrt());
    });
    for_each_neighbor(params, boundary.offsets, boundary.positions, point, |b, d, r2| {
        let term_b = fields.boundary_pressures[b] / rho_02;
        f -= m2 * (term_i + term_b) * spiky_gradient(params, d, r2.sqrt());
    });
    f
}

/// Semi-implicit Euler, velocity first.
#[inline]
pub fn integrate(params: &SimulationParams, position: Vec3, velocity: Vec3, force: Vec3) -> (Vec3, Vec3) {
    let velocity = velocity + params.delta_t * force / params.particle_mass;
    (position + params.delta_t * velocity, velocity)
}
