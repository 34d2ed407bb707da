//! Base settings of the fluid and the revision bookkeeping that replaces
//! "something changed" flags.

/// The independently settable inputs. Everything else in
/// [`SimulationParams`](crate::gpu::ffi::SimulationParams) is derived from these.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FluidSettings {
    pub particle_radius: f32,
    pub rest_density: f32,
    pub gravity: f32,
    pub viscosity: f32,
    pub surface_tension: f32,
    pub delta_t: f32,
    /// Normalized max density variation below which the pressure solver stops.
    pub density_variation_threshold: f32,
    pub fluid_count: u32,
    pub boundary_count: u32,
}

impl Default for FluidSettings {
    // water, same as the default scene
    fn default() -> Self {
        Self {
            particle_radius: 0.01,
            rest_density: 999.972,
            gravity: -9.81,
            viscosity: 0.00008,
            surface_tension: 1.0,
            delta_t: 0.002,
            density_variation_threshold: 0.01,
            fluid_count: 0,
            boundary_count: 0,
        }
    }
}

impl FluidSettings {
    pub fn with_particle_radius(mut self, particle_radius: f32) -> Self {
        self.particle_radius = particle_radius;
        self
    }

    pub fn with_rest_density(mut self, rest_density: f32) -> Self {
        self.rest_density = rest_density;
        self
    }

    pub fn with_gravity(mut self, gravity: f32) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_viscosity(mut self, viscosity: f32) -> Self {
        self.viscosity = viscosity;
        self
    }

    pub fn with_surface_tension(mut self, surface_tension: f32) -> Self {
        self.surface_tension = surface_tension;
        self
    }

    pub fn with_delta_t(mut self, delta_t: f32) -> Self {
        self.delta_t = delta_t;
        self
    }

    pub fn with_density_variation_threshold(mut self, threshold: f32) -> Self {
        self.density_variation_threshold = threshold;
        self
    }

    pub fn with_counts(mut self, fluid_count: u32, boundary_count: u32) -> Self {
        self.fluid_count = fluid_count;
        self.boundary_count = boundary_count;
        self
    }
}

/// Monotonic version number of some piece of state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision(u64);

impl Revision {
    pub fn next(self) -> Self {
        Revision(self.0 + 1)
    }
}

/// An immutable snapshot plus the revision it was published under.
/// Replacing the snapshot always moves to a new revision.
#[derive(Clone, Debug)]
pub struct Tracked<T> {
    value: T,
    revision: Revision,
}

impl<T> Tracked<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            revision: Revision::default(),
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn replace(&mut self, value: T) {
        self.value = value;
        self.revision = self.revision.next();
    }

    pub fn update(&mut self, f: impl FnOnce(&mut T)) {
        f(&mut self.value);
        self.revision = self.revision.next();
    }

    /// Change the snapshot without publishing a new revision. Only for fields
    /// no consumer derives anything from.
    pub fn update_silently(&mut self, f: impl FnOnce(&mut T)) {
        f(&mut self.value);
    }
}

/// Remembers the last revision something was computed from.
#[derive(Clone, Copy, Debug, Default)]
pub struct Consumed(Option<Revision>);

impl Consumed {
    pub fn is_stale(&self, current: Revision) -> bool {
        self.0 != Some(current)
    }

    pub fn mark(&mut self, current: Revision) {
        self.0 = Some(current);
    }

    pub fn invalidate(&mut self) {
        self.0 = None;
    }
}
