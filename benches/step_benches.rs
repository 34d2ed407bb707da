use bevy_pcisph_fluid::cpu::backend::CpuBackend;
use bevy_pcisph_fluid::{Fluid, FluidSettings};
use criterion::{Criterion, criterion_group, criterion_main};
use glam::Vec3;

fn lattice(nx: usize, ny: usize, nz: usize, spacing: f32, offset: Vec3) -> Vec<Vec3> {
    let mut positions = Vec::with_capacity(nx * ny * nz);
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                positions.push(offset + Vec3::new(x as f32, y as f32, z as f32) * spacing);
            }
        }
    }
    positions
}

fn bench_step(c: &mut Criterion) {
    let r = 0.01;
    let spacing = 2.0 * r; // rest spacing of the fluid

    // a tray: floor of two layers, fluid block resting above it
    let floor = lattice(24, 2, 24, spacing, Vec3::new(-0.24, -0.04, -0.24));
    let block = lattice(16, 16, 16, spacing, Vec3::new(-0.16, 0.0, -0.16));

    let mut fluid = Fluid::with_settings(
        CpuBackend::new(),
        FluidSettings::default().with_particle_radius(r),
    )
    .unwrap();
    fluid.load_scene(floor, block);
    // first step derives params and sorts the floor
    fluid.update().unwrap();

    c.bench_function("pcisph_step_4.1k", |b| b.iter(|| fluid.update().unwrap()));
}

criterion_group!(benches, bench_step);
criterion_main!(benches);
