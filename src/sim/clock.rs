//! Simulated time on top of [`Fluid`] steps, including the optional fixed-rate
//! frame recording.

use crate::cpu::backend::CpuBackend;
use crate::error::FluidError;
use crate::gpu::backend::ComputeBackend;
use crate::gpu::pipeline::{Fluid, StepOutcome, StepReport};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RecordingSettings {
    /// simulated seconds between two recorded frames
    pub interval: f32,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            interval: 1.0 / 60.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameReport {
    /// steps that actually ran during this update
    pub steps: u32,
    pub time: f32,
    /// index of the frame to record now, if one is due
    pub record_frame: Option<u32>,
    pub last_step: Option<StepReport>,
}

pub struct Simulation<B: ComputeBackend = CpuBackend> {
    fluid: Fluid<B>,
    recording: Option<RecordingSettings>,
    duration: f32,

    time: f32,
    last_recorded_frame_time: f32,
    frame_counter: u32,
}

impl<B: ComputeBackend> Simulation<B> {
    pub fn new(fluid: Fluid<B>) -> Self {
        Self {
            fluid,
            recording: None,
            duration: f32::INFINITY,
            time: 0.0,
            last_recorded_frame_time: f32::NEG_INFINITY,
            frame_counter: 0,
        }
    }

    pub fn with_recording(mut self, recording: RecordingSettings) -> Self {
        self.recording = Some(recording);
        self
    }

    /// Simulated seconds after which [`finished`](Self::finished) turns true.
    pub fn with_duration(mut self, duration: f32) -> Self {
        self.duration = duration;
        self
    }

    pub fn fluid(&self) -> &Fluid<B> {
        &self.fluid
    }

    pub fn fluid_mut(&mut self) -> &mut Fluid<B> {
        &mut self.fluid
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn frame_counter(&self) -> u32 {
        self.frame_counter
    }

    fn since_last_frame(&self) -> f32 {
        self.time - self.last_recorded_frame_time
    }

    /// One step when not recording, otherwise as many as it takes to cross the
    /// next recording interval.
    pub fn update(&mut self) -> Result<FrameReport, FluidError> {
        let mut steps = 0;
        let mut last_step;

        loop {
            let report = self.fluid.update()?;
            last_step = report;
            // a skipped step does not move the clock
            if report.outcome == StepOutcome::Skipped {
                break;
            }
            steps += 1;
            let before = self.time;
            self.time += self.fluid.params().delta_t;

            let Some(recording) = self.recording else {
                break;
            };
            if self.time <= before || self.since_last_frame() > recording.interval {
                break;
            }
        }

        let record_frame = match self.recording {
            Some(recording) if self.since_last_frame() >= recording.interval => {
                let frame = self.frame_counter;
                self.frame_counter += 1;
                self.last_recorded_frame_time = self.time;
                Some(frame)
            }
            _ => None,
        };

        Ok(FrameReport {
            steps,
            time: self.time,
            record_frame,
            last_step: Some(last_step),
        })
    }

    pub fn finished(&self) -> bool {
        self.time >= self.duration
    }

    /// Starts over with a fresh engine, e.g. after reloading the scene.
    pub fn reset(&mut self, fluid: Fluid<B>) {
        self.fluid = fluid;
        self.time = 0.0;
        self.frame_counter = 0;
        self.last_recorded_frame_time = f32::NEG_INFINITY;
    }
}
