use bevy::log::{debug, info, trace};
use glam::Vec3;

use crate::cpu::backend::CpuBackend;
use crate::error::FluidError;
use crate::gpu::backend::{
    ComputeBackend, FluidFields, ForceOutputs, Forces, Integration, KernelName, PressureFields,
    PressureTarget,
};
use crate::gpu::buffers::{BoundaryBuffers, FluidBuffers, GridBuffers};
use crate::gpu::ffi::{ParamsBlock, SimulationParams};
use crate::gpu::grid_build::{build_boundary_grid, build_fluid_grid, grid_view};
use crate::gpu::readback;
use crate::sim::derive::derive_params;
use crate::sim::settings::{Consumed, FluidSettings, Revision, Tracked};

pub const MAX_ITERATIONS: u32 = 7;
// the error estimate means nothing before two corrective passes
pub const MIN_ITERATIONS: u32 = 2;

/// Where the pressure solver is within one step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolverState {
    Initialized,
    Iterating(u32),
    Converged { iterations: u32 },
    Exhausted,
}

impl SolverState {
    /// Iteration to run next, `None` once the loop is over.
    fn iteration(self) -> Option<u32> {
        match self {
            SolverState::Initialized => Some(0),
            SolverState::Iterating(i) => Some(i),
            SolverState::Converged { .. } | SolverState::Exhausted => None,
        }
    }

    fn after(i: u32) -> Self {
        if i + 1 >= MAX_ITERATIONS {
            SolverState::Exhausted
        } else {
            SolverState::Iterating(i + 1)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// nothing to simulate, no dispatch happened
    Skipped,
    Converged,
    /// hit the iteration cap, the step still got committed
    Exhausted,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepReport {
    pub outcome: StepOutcome,
    pub iterations: u32,
    /// how often the convergence test actually ran
    pub convergence_checks: u32,
    /// last max(density variation) / rest density that was read back
    pub max_density_variation: Option<f32>,
}

impl StepReport {
    fn skipped() -> Self {
        Self {
            outcome: StepOutcome::Skipped,
            iterations: 0,
            convergence_checks: 0,
            max_density_variation: None,
        }
    }
}

/// What a renderer gets to look at.
pub struct RenderView<'a> {
    pub positions: &'a [Vec3],
    pub normals: &'a [Vec3],
    pub densities: &'a [f32],
    pub velocities: &'a [Vec3],
    pub params: &'a ParamsBlock,
}

/// The PCISPH engine. Owns every buffer it dispatches over; not reentrant.
pub struct Fluid<B: ComputeBackend = CpuBackend> {
    backend: B,

    settings: Tracked<FluidSettings>,
    derived_from: Consumed,
    boundary_revision: Revision,
    boundary_sorted_at: Consumed,

    params: SimulationParams,
    block: ParamsBlock,

    fluid: FluidBuffers,
    boundary: BoundaryBuffers,
    fluid_grid: GridBuffers,
    boundary_grid: GridBuffers,
}

impl<B: ComputeBackend> Fluid<B> {
    pub fn new(backend: B) -> Result<Self, FluidError> {
        Self::with_settings(backend, FluidSettings::default())
    }

    /// Builds every kernel up front, a broken program never gets to step.
    pub fn with_settings(mut backend: B, settings: FluidSettings) -> Result<Self, FluidError> {
        backend.build(&KernelName::ALL)?;
        info!("built {} fluid kernels", KernelName::ALL.len());

        let params = SimulationParams::default();
        Ok(Self {
            backend,
            settings: Tracked::new(settings),
            derived_from: Consumed::default(),
            boundary_revision: Revision::default(),
            boundary_sorted_at: Consumed::default(),
            params,
            block: ParamsBlock::new(&params),
            fluid: FluidBuffers::zeroed(settings.fluid_count as usize),
            boundary: BoundaryBuffers::from_positions(vec![
                Vec3::ZERO;
                settings.boundary_count as usize
            ]),
            fluid_grid: GridBuffers::default(),
            boundary_grid: GridBuffers::default(),
        })
    }

    // ===== settings =====

    pub fn settings(&self) -> &FluidSettings {
        self.settings.get()
    }

    pub fn apply_settings(&mut self, settings: FluidSettings) {
        self.settings.replace(settings);
    }

    pub fn set_fluid_count(&mut self, count: u32) {
        self.settings.update(|s| s.fluid_count = count);
    }

    pub fn set_boundary_count(&mut self, count: u32) {
        self.settings.update(|s| s.boundary_count = count);
    }

    pub fn set_particle_radius(&mut self, particle_radius: f32) {
        self.settings.update(|s| s.particle_radius = particle_radius);
    }

    pub fn set_rest_density(&mut self, rest_density: f32) {
        self.settings.update(|s| s.rest_density = rest_density);
    }

    pub fn set_gravity(&mut self, gravity: f32) {
        self.settings.update(|s| s.gravity = gravity);
    }

    pub fn set_viscosity(&mut self, viscosity: f32) {
        self.settings.update(|s| s.viscosity = viscosity);
    }

    pub fn set_surface_tension(&mut self, surface_tension: f32) {
        self.settings.update(|s| s.surface_tension = surface_tension);
    }

    pub fn set_delta_t(&mut self, delta_t: f32) {
        self.settings.update(|s| s.delta_t = delta_t);
    }

    // not part of the parameter block, nothing to re-derive
    pub fn set_density_variation_threshold(&mut self, threshold: f32) {
        self.settings
            .update_silently(|s| s.density_variation_threshold = threshold);
    }

    // ===== scene =====

    /// Hands over a freshly loaded scene: boundary positions plus the initial
    /// fluid positions. Fluid velocities start at zero.
    pub fn load_scene(&mut self, boundary_positions: Vec<Vec3>, fluid_positions: Vec<Vec3>) {
        let fluid_count = fluid_positions.len() as u32;
        let boundary_count = boundary_positions.len() as u32;
        self.settings.update(|s| {
            s.fluid_count = fluid_count;
            s.boundary_count = boundary_count;
        });
        self.boundary = BoundaryBuffers::from_positions(boundary_positions);
        self.fluid = FluidBuffers::from_positions(fluid_positions);
        self.boundary_revision = self.boundary_revision.next();
        info!(
            "loaded scene with {} fluid and {} boundary particles",
            fluid_count, boundary_count
        );
    }

    /// Direct write access for a scene loader. Sizes are checked on the next step.
    pub fn fluid_buffers_mut(&mut self) -> &mut FluidBuffers {
        &mut self.fluid
    }

    /// Touching the boundary means it gets re-sorted on the next step.
    pub fn boundary_buffers_mut(&mut self) -> &mut BoundaryBuffers {
        self.boundary_revision = self.boundary_revision.next();
        &mut self.boundary
    }

    // ===== views =====

    pub fn fluid(&self) -> &FluidBuffers {
        &self.fluid
    }

    pub fn boundary(&self) -> &BoundaryBuffers {
        &self.boundary
    }

    /// Parameters as of the last step.
    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn render_view(&self) -> RenderView<'_> {
        RenderView {
            positions: &self.fluid.positions,
            normals: &self.fluid.normals,
            densities: &self.fluid.densities,
            velocities: &self.fluid.velocities,
            params: &self.block,
        }
    }

    // ===== step =====

    fn rederive(&mut self) {
        let settings = *self.settings.get();
        self.params = derive_params(&settings);
        self.block = ParamsBlock::new(&self.params);

        let fluid_count = settings.fluid_count as usize;
        let boundary_count = settings.boundary_count as usize;
        self.fluid_grid = GridBuffers::new(fluid_count, self.params.bucket_count, true);
        self.boundary_grid = GridBuffers::new(boundary_count, self.params.bucket_count, false);
        self.fluid.density_variations = vec![0.0; fluid_count];
        self.boundary.init_pred_densities = vec![0.0; boundary_count];
        self.fluid.velocities.fill(Vec3::ZERO);

        // new bucket layout, the old boundary sort is worthless
        self.boundary_sorted_at.invalidate();
        self.derived_from.mark(self.settings.revision());
        debug!(
            "derived params: kernel radius {}, {} buckets, scaling factor {}",
            self.params.kernel_radius,
            self.params.bucket_count,
            self.params.density_variation_scaling_factor
        );
    }

    fn check_buffers_consistent(&self) -> Result<(), FluidError> {
        self.fluid
            .check_consistent(self.params.fluid_count as usize)?;
        self.boundary
            .check_consistent(self.params.boundary_count as usize)
    }

    /// Advances the fluid by one `delta_t`.
    pub fn update(&mut self) -> Result<StepReport, FluidError> {
        if self.derived_from.is_stale(self.settings.revision()) {
            self.rederive();
        }

        self.check_buffers_consistent()?;

        if self.params.fluid_count == 0 {
            return Ok(StepReport::skipped());
        }

        if self.boundary_sorted_at.is_stale(self.boundary_revision) {
            self.sort_boundary()?;
        }
        self.step()
    }

    fn sort_boundary(&mut self) -> Result<(), FluidError> {
        let Self {
            backend,
            params,
            block,
            boundary,
            boundary_grid,
            ..
        } = self;

        if params.boundary_count > 0 {
            build_boundary_grid(backend, block, params, boundary_grid, boundary)?;
            backend.initialize_boundary_densities(
                block,
                grid_view(boundary_grid, &boundary.positions),
                &mut boundary.init_pred_densities,
            );
            debug!("sorted {} boundary particles", params.boundary_count);
        }
        self.boundary_sorted_at.mark(self.boundary_revision);
        Ok(())
    }

    fn step(&mut self) -> Result<StepReport, FluidError> {
        let threshold = self.settings.get().density_variation_threshold;
        let Self {
            backend,
            params,
            block,
            fluid,
            boundary,
            fluid_grid,
            boundary_grid,
            ..
        } = self;
        let has_boundary = params.boundary_count > 0;

        build_fluid_grid(backend, block, params, fluid_grid, fluid)?;
        let boundary_view = grid_view(boundary_grid, &boundary.positions);

        // density and normals
        backend.update_density(
            block,
            grid_view(fluid_grid, &fluid.positions),
            boundary_view,
            &mut fluid.densities,
        );
        backend.update_normal(
            block,
            grid_view(fluid_grid, &fluid.positions),
            &fluid.densities,
            &mut fluid.normals,
        );

        if has_boundary {
            backend.boundary_pressure_initialization(
                block,
                &boundary.init_pred_densities,
                &mut boundary.pressures,
            );
        }

        // viscosity / surface tension / gravity
        backend.force_initialization(
            block,
            grid_view(fluid_grid, &fluid.positions),
            FluidFields {
                velocities: &fluid.velocities,
                densities: &fluid.densities,
                normals: &fluid.normals,
            },
            ForceOutputs {
                other_forces: &mut fluid.other_forces,
                pressures: &mut fluid.pressures,
                pressure_forces: &mut fluid.pressure_forces,
            },
        );

        let mut state = SolverState::Initialized;
        let mut convergence_checks = 0;
        let mut max_density_variation = None;

        while let Some(i) = state.iteration() {
            // -> predict position
            backend.update_position_and_velocity(
                block,
                Forces {
                    other: &fluid.other_forces,
                    pressure: &fluid.pressure_forces,
                },
                Integration::Predict {
                    positions: &fluid.positions,
                    velocities: &fluid.velocities,
                    predicted: &mut fluid.predicted_positions,
                },
            );

            // -> predicted density, pressure correction
            if has_boundary {
                backend.update_pressure(
                    block,
                    grid_view(fluid_grid, &fluid.predicted_positions),
                    boundary_view,
                    PressureTarget::Boundary {
                        positions: &boundary.positions,
                        init_pred_densities: &boundary.init_pred_densities,
                        pressures: &mut boundary.pressures,
                    },
                );
            }
            backend.update_pressure(
                block,
                grid_view(fluid_grid, &fluid.predicted_positions),
                boundary_view,
                PressureTarget::Fluid {
                    pressures: &mut fluid.pressures,
                    density_variations: &mut fluid.density_variations,
                },
            );

            // -> start reading the variations back, overlaps with the force pass
            let pending =
                (i >= MIN_ITERATIONS).then(|| backend.read(&fluid.density_variations));

            // -> pressure force
            backend.update_pressure_force(
                block,
                grid_view(fluid_grid, &fluid.positions),
                boundary_view,
                PressureFields {
                    densities: &fluid.densities,
                    pressures: &fluid.pressures,
                    boundary_pressures: &boundary.pressures,
                },
                &mut fluid.pressure_forces,
            );

            // -> can we stop?
            let Some(pending) = pending else {
                state = SolverState::after(i);
                continue;
            };
            let variations = pending.wait()?;
            convergence_checks += 1;
            let max = readback::max_value(&variations).unwrap_or(0.0) / params.rest_density;
            max_density_variation = Some(max);
            trace!("pcisph iteration {}: max density variation {}", i, max);

            state = if max < threshold {
                SolverState::Converged { iterations: i + 1 }
            } else {
                SolverState::after(i)
            };
        }

        // time integration, the only write to the real state
        backend.update_position_and_velocity(
            block,
            Forces {
                other: &fluid.other_forces,
                pressure: &fluid.pressure_forces,
            },
            Integration::Commit {
                positions: &mut fluid.positions,
                velocities: &mut fluid.velocities,
            },
        );

        let (outcome, iterations) = match state {
            SolverState::Converged { iterations } => (StepOutcome::Converged, iterations),
            _ => (StepOutcome::Exhausted, MAX_ITERATIONS),
        };
        Ok(StepReport {
            outcome,
            iterations,
            convergence_checks,
            max_density_variation,
        })
    }
}
