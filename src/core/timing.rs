//! Per-frame phase timers.
//!
//! At most one sub-phase timer runs at a time. Starting a phase while another
//! runs, or ending a phase that is not the running one, is a logic error in
//! the instrumentation and is reported as a sanity-check failure.

use log::trace;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Render,
    BufferRead,
    BufferWrite,
    Compress,
    Blend,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Phase::Render => "render",
            Phase::BufferRead => "buffer read",
            Phase::BufferWrite => "buffer write",
            Phase::Compress => "compress",
            Phase::Blend => "blend",
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimingError {
    #[error("called start for timer {requested:?}, but end never called for timer {running:?}")]
    AlreadyRunning { requested: Phase, running: Phase },
    #[error("started timer {running:?}, but ended timer {requested:?}")]
    Mismatch { requested: Phase, running: Option<Phase> },
}

/// Accumulated seconds per phase for the current frame
#[derive(Debug, Clone, Default)]
pub struct Timing {
    pub render: f64,
    pub buffer_read: f64,
    pub buffer_write: f64,
    pub compress: f64,
    pub blend: f64,
    pub composite: f64,
    pub total_draw: f64,
    running: Option<(Phase, Instant)>,
}

impl Timing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero every counter and stop the running timer
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn running(&self) -> Option<Phase> {
        self.running.map(|(phase, _)| phase)
    }

    /// Start `phase`. On a discipline violation the new phase still starts.
    pub fn begin(&mut self, phase: Phase) -> Result<(), TimingError> {
        trace!("Beginning {}", phase.name());
        let previous = self.running.replace((phase, Instant::now()));
        match previous {
            Some((running, _)) => Err(TimingError::AlreadyRunning { requested: phase, running }),
            None => Ok(()),
        }
    }

    /// Stop `phase` and add its elapsed time. A mismatched end stops the
    /// running timer without recording anything.
    pub fn end(&mut self, phase: Phase) -> Result<(), TimingError> {
        trace!("Ending {}", phase.name());
        match self.running.take() {
            Some((running, start)) if running == phase => {
                self.add(phase, start.elapsed().as_secs_f64());
                Ok(())
            }
            other => Err(TimingError::Mismatch {
                requested: phase,
                running: other.map(|(p, _)| p),
            }),
        }
    }

    pub fn add(&mut self, phase: Phase, seconds: f64) {
        *self.slot(phase) += seconds;
    }

    pub fn get(&self, phase: Phase) -> f64 {
        match phase {
            Phase::Render => self.render,
            Phase::BufferRead => self.buffer_read,
            Phase::BufferWrite => self.buffer_write,
            Phase::Compress => self.compress,
            Phase::Blend => self.blend,
        }
    }

    fn slot(&mut self, phase: Phase) -> &mut f64 {
        match phase {
            Phase::Render => &mut self.render,
            Phase::BufferRead => &mut self.buffer_read,
            Phase::BufferWrite => &mut self.buffer_write,
            Phase::Compress => &mut self.compress,
            Phase::Blend => &mut self.blend,
        }
    }
}
