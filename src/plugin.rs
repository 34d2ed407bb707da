use bevy::app::AppExit;
use bevy::prelude::*;

use crate::cpu::backend::CpuBackend;
use crate::sim::clock::{FrameReport, Simulation};

// ==================== resources ======================================

// the engine lives in the main world, inserted by whoever loads the scene
#[derive(Resource)]
pub struct FluidSimulation(pub Simulation<CpuBackend>);

// what the last frame did, for anything that wants to record or display it
#[derive(Resource, Default)]
pub struct LastFrame(pub Option<FrameReport>);

// =====================================================================

// ========================== systems ==================================

fn step_fluid(
    mut simulation: ResMut<FluidSimulation>,
    mut last_frame: ResMut<LastFrame>,
    mut exit: EventWriter<AppExit>,
) {
    match simulation.0.update() {
        Ok(frame) => {
            last_frame.0 = Some(frame);
            if simulation.0.finished() {
                info!("simulation finished at t = {}", frame.time);
                exit.write(AppExit::Success);
            }
        }
        Err(err) => {
            error!("fluid step failed: {}", err);
            exit.write(AppExit::error());
        }
    }
}

// =====================================================================

// Plugin

pub struct PcisphPlugin;

impl Plugin for PcisphPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<LastFrame>().add_systems(
            Update,
            step_fluid.run_if(resource_exists::<FluidSimulation>),
        );
    }
}
