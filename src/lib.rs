pub mod cache;
pub mod error;
pub mod plugin;

pub mod cpu {
    pub mod backend;
    pub mod kernels;
    pub mod neighbors;
    pub mod pcisph;
    pub mod radix_sort;
}

pub mod gpu {
    pub mod backend;
    pub mod buffers;
    pub mod ffi;
    pub mod grid_build;
    pub mod pipeline;
    pub mod readback;
}

pub mod sim {
    pub mod clock;
    pub mod derive;
    pub mod settings;
}

pub use error::FluidError;
pub use gpu::pipeline::{Fluid, StepOutcome, StepReport};
pub use plugin::{FluidSimulation, LastFrame, PcisphPlugin};
pub use sim::clock::{FrameReport, RecordingSettings, Simulation};
pub use sim::settings::FluidSettings;
