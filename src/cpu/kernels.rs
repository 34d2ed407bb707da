// smoothing kernels in 3D, normalizations come from the parameter block
use glam::Vec3;

use crate::gpu::ffi::SimulationParams;

// callers only pass neighbours with r2 < h2, so no range checks in here

#[inline]
pub fn poly6(params: &SimulationParams, r2: f32) -> f32 {
    params.poly6_normalization * (params.kernel_radius2 - r2).powi(3)
}

#[inline]
pub fn poly6_gradient(params: &SimulationParams, d: Vec3, r2: f32) -> Vec3 {
    params.poly6_d1_normalization * (params.kernel_radius2 - r2).powi(2) * d
}

#[inline]
pub fn viscosity_laplacian(params: &SimulationParams, r: f32) -> f32 {
    params.viscosity_d2_normalization * (params.kernel_radius - r)
}

#[inline]
pub fn spiky_gradient(params: &SimulationParams, d: Vec3, r: f32) -> Vec3 {
    if r == 0.0 {
        return Vec3::ZERO;
    }
    params.spiky_d1_normalization * (params.kernel_radius - r).powi(2) * d / r
}

/// Cohesion spline (Akinci et al.), attractive at mid range and slightly
/// repulsive close up.
#[inline]
pub fn surface_tension(params: &SimulationParams, r: f32) -> f32 {
    let h = params.kernel_radius;
    let spline = (h - r).powi(3) * r.powi(3);
    if 2.0 * r > h {
        params.surface_tension_normalization * spline
    } else if r > 0.0 {
        params.surface_tension_normalization * (2.0 * spline - params.surface_tension_term)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::derive::derive_params;
    use crate::sim::settings::FluidSettings;

    fn params() -> SimulationParams {
        derive_params(&FluidSettings::default().with_counts(8, 0))
    }

    #[test]
    fn poly6_peaks_at_zero_and_vanishes_at_h() {
        let p = params();
        assert!(poly6(&p, 0.0) > poly6(&p, 0.25 * p.kernel_radius2));
        assert_eq!(poly6(&p, p.kernel_radius2), 0.0);
    }

    #[test]
    fn poly6_gradient_points_along_the_offset() {
        let p = params();
        let d = Vec3::new(0.01, 0.0, 0.0);
        let g = poly6_gradient(&p, d, d.length_squared());
        // negative normalization: the gradient points back towards the centre
        assert!(g.x < 0.0);
        assert_eq!(g.y, 0.0);
        assert_eq!(g.z, 0.0);
    }

    #[test]
    fn spiky_gradient_is_zero_on_top_of_itself() {
        let p = params();
        assert_eq!(spiky_gradient(&p, Vec3::ZERO, 0.0), Vec3::ZERO);
        let g = spiky_gradient(&p, Vec3::Y * 0.02, 0.02);
        assert!(g.y < 0.0);
    }

    #[test]
    fn viscosity_laplacian_is_positive_inside() {
        let p = params();
        assert!(viscosity_laplacian(&p, 0.5 * p.kernel_radius) > 0.0);
        assert_eq!(viscosity_laplacian(&p, p.kernel_radius), 0.0);
    }

    #[test]
    fn surface_tension_spline() {
        let p = params();
        let h = p.kernel_radius;
        assert_eq!(surface_tension(&p, 0.0), 0.0);
        // repulsive close up, attractive further out
        assert!(surface_tension(&p, 0.05 * h) < 0.0);
        assert!(surface_tension(&p, 0.75 * h) > 0.0);
        // continuous where the two branches meet
        let below = surface_tension(&p, 0.5 * h - 1e-6);
        let above = surface_tension(&p, 0.5 * h + 1e-6);
        assert!((below - above).abs() <= 1e-3 * above.abs().max(1.0));
    }
}
