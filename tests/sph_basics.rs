use bevy_pcisph_fluid::cpu::backend::{CpuBackend, ProgramLoader};
use bevy_pcisph_fluid::cpu::kernels::poly6;
use bevy_pcisph_fluid::gpu::pipeline::{MAX_ITERATIONS, MIN_ITERATIONS};
use bevy_pcisph_fluid::sim::derive::{bucket_count, derive_params};
use bevy_pcisph_fluid::{Fluid, FluidError, FluidSettings, Simulation, StepOutcome};
use glam::Vec3;

fn lattice(n: i32, spacing: f32, offset: Vec3) -> Vec<Vec3> {
    let mut positions = Vec::new();
    for z in 0..n {
        for y in 0..n {
            for x in 0..n {
                positions.push(offset + Vec3::new(x as f32, y as f32, z as f32) * spacing);
            }
        }
    }
    positions
}

fn engine(settings: FluidSettings) -> Fluid {
    Fluid::with_settings(CpuBackend::new(), settings).unwrap()
}

#[test]
fn isolated_particles_only_see_themselves() {
    let mut fluid = engine(FluidSettings::default().with_gravity(0.0));
    let start = vec![Vec3::ZERO, Vec3::new(0.1, 0.0, 0.0)];
    fluid.load_scene(Vec::new(), start.clone());

    for _ in 0..5 {
        let report = fluid.update().unwrap();
        assert_eq!(report.outcome, StepOutcome::Converged);
        assert_eq!(report.iterations, MIN_ITERATIONS + 1);

        let params = *fluid.params();
        let self_density = params.particle_mass * poly6(&params, 0.0);
        for &rho in &fluid.fluid().densities {
            assert!((rho - self_density).abs() <= 1e-5 * self_density);
        }
        assert!(fluid.fluid().pressures.iter().all(|&p| p == 0.0));
        assert!(fluid.fluid().pressure_forces.iter().all(|&f| f == Vec3::ZERO));
    }

    // nothing pushes them anywhere
    let mut end = fluid.fluid().positions.clone();
    end.sort_by(|a, b| a.x.total_cmp(&b.x));
    assert_eq!(end, start);
}

#[test]
fn particle_in_a_box_does_not_fall_through() {
    let r = 0.01;
    let spacing = 2.0 * r;
    let walls: Vec<Vec3> = lattice(5, spacing, Vec3::splat(-2.0 * spacing))
        .into_iter()
        .filter(|p| p.length() > 0.5 * spacing)
        .collect();
    assert_eq!(walls.len(), 124);

    let mut fluid = engine(FluidSettings::default().with_particle_radius(r));
    fluid.load_scene(walls, vec![Vec3::ZERO]);

    let mut fastest: f32 = 0.0;
    for _ in 0..150 {
        fluid.update().unwrap();
        let x = fluid.fluid().positions[0];
        let v = fluid.fluid().velocities[0];
        assert!(x.is_finite() && v.is_finite());
        // free fall would have left the box after ~50 steps
        assert!(x.length() < spacing, "particle drifted to {}", x);
        fastest = fastest.max(v.length());
    }
    // free fall would reach ~2.9 m/s by now
    assert!(fastest < 0.5, "speed ran away: {}", fastest);
}

#[test]
fn empty_fluid_is_a_no_op() {
    let mut fluid = engine(FluidSettings::default());
    fluid.load_scene(lattice(3, 0.02, Vec3::ZERO), Vec::new());
    let report = fluid.update().unwrap();
    assert_eq!(report.outcome, StepOutcome::Skipped);
    assert_eq!(fluid.backend().dispatches(), 0);
    assert_eq!(fluid.backend().work_items(), 0);

    let mut sim = Simulation::new(fluid);
    sim.update().unwrap();
    sim.update().unwrap();
    assert_eq!(sim.time(), 0.0);
    assert_eq!(sim.fluid().backend().dispatches(), 0);
}

#[test]
fn every_buffer_keeps_the_fluid_count() {
    let floor = lattice(8, 0.02, Vec3::new(-0.07, -0.1, -0.07))
        .into_iter()
        .filter(|p| p.y < -0.09)
        .collect::<Vec<_>>();
    let block = lattice(5, 0.02, Vec3::new(-0.04, -0.06, -0.04));
    let mut fluid = engine(FluidSettings::default());
    fluid.load_scene(floor, block);

    for _ in 0..3 {
        fluid.update().unwrap();
        let f = fluid.fluid();
        for len in [
            f.positions.len(),
            f.predicted_positions.len(),
            f.velocities.len(),
            f.densities.len(),
            f.normals.len(),
            f.other_forces.len(),
            f.pressures.len(),
            f.pressure_forces.len(),
        ] {
            assert_eq!(len, 125);
        }
    }
}

#[test]
fn inconsistent_buffers_stop_the_step() {
    let mut fluid = engine(FluidSettings::default());
    fluid.load_scene(Vec::new(), lattice(2, 0.02, Vec3::ZERO));
    fluid.fluid_buffers_mut().normals.pop();

    let err = fluid.update().unwrap_err();
    assert_eq!(
        err,
        FluidError::InconsistentBuffer {
            name: "fluid normals",
            len: 7,
            expected: 8,
        }
    );
    assert_eq!(fluid.backend().dispatches(), 0);

    // a count that no longer matches the buffers is just as fatal
    let mut fluid = engine(FluidSettings::default());
    fluid.load_scene(Vec::new(), lattice(2, 0.02, Vec3::ZERO));
    fluid.set_fluid_count(9);
    assert!(matches!(
        fluid.update(),
        Err(FluidError::InconsistentBuffer { expected: 9, .. })
    ));
}

#[test]
fn solver_iterations_are_bounded() {
    // squeezed below the rest spacing so pressure has work to do
    let mut fluid = engine(FluidSettings::default().with_gravity(0.0));
    fluid.load_scene(Vec::new(), lattice(6, 0.015, Vec3::ZERO));

    for _ in 0..10 {
        let report = fluid.update().unwrap();
        assert!(report.iterations >= MIN_ITERATIONS + 1);
        assert!(report.iterations <= MAX_ITERATIONS);
        // the test never runs before iteration 2
        assert_eq!(report.convergence_checks, report.iterations - MIN_ITERATIONS);
        assert!(report.max_density_variation.is_some());
        if report.outcome == StepOutcome::Exhausted {
            assert_eq!(report.iterations, MAX_ITERATIONS);
        }
    }
}

#[test]
fn missing_kernel_fails_construction() {
    let loader = ProgramLoader::builtin().without_entry_point("sort_utils", "initialize");
    match Fluid::new(CpuBackend::with_programs(loader)) {
        Err(FluidError::KernelBuild { program, log }) => {
            assert_eq!(program, "sort_utils");
            assert!(log.contains("initialize"));
        }
        Err(other) => panic!("unexpected error {}", other),
        Ok(_) => panic!("built a program without its entry point"),
    }
}

#[test]
fn derived_params_are_deterministic() {
    let settings = FluidSettings::default().with_counts(1000, 300);
    let a = derive_params(&settings);
    let b = derive_params(&settings);
    assert_eq!(bytemuck::bytes_of(&a), bytemuck::bytes_of(&b));

    let buckets = bucket_count(1000);
    assert!(buckets >= 64);
    assert_eq!(buckets % 64, 0);
    assert_eq!(a.bucket_count, buckets);
}
