//! Progress bars for engine phases
//!
//! Every phase reports through the same callback; a new bar is started
//! whenever the reported [`Phase`] changes.

use flashcheck_core::{Phase, PhaseProgress};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct BarState {
    phase: Option<Phase>,
    bar: Option<ProgressBar>,
}

/// One progress bar per phase, shared between the engine callback and the
/// command that started the run
#[derive(Clone, Default)]
pub struct PhaseBars {
    state: Arc<Mutex<BarState>>,
    hidden: bool,
}

impl PhaseBars {
    /// Bars drawn to the terminal, or never drawn when `hidden`
    pub fn new(hidden: bool) -> Self {
        Self {
            state: Arc::default(),
            hidden,
        }
    }

    /// Callback to hand to a runner's `on_progress`
    pub fn callback(&self) -> impl FnMut(&PhaseProgress) + Send + 'static {
        let bars = self.clone();
        move |progress| bars.update(progress)
    }

    fn update(&self, progress: &PhaseProgress) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };

        if state.phase != Some(progress.phase) {
            if let Some(previous) = state.bar.take() {
                previous.finish();
            }
            state.bar = Some(self.start(progress));
            state.phase = Some(progress.phase);
        }

        if let Some(bar) = &state.bar {
            bar.set_length(progress.total);
            bar.set_position(progress.completed);
            bar.set_message(format!("{} {}", progress.step, progress.speed_display()));
            if progress.total > 0 && progress.completed >= progress.total {
                bar.finish();
            }
        }
    }

    fn start(&self, progress: &PhaseProgress) -> ProgressBar {
        let bar = if self.hidden {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(progress.total)
        };
        bar.set_style(phase_style(progress.phase));
        bar.set_prefix(progress.phase.to_string());
        bar
    }

    /// Stop drawing, leaving whatever the last bar showed
    pub fn finish(&self) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(bar) = state.bar.take() {
                bar.abandon();
            }
            state.phase = None;
        }
    }

    #[cfg(test)]
    fn current(&self) -> Option<(Phase, u64, u64)> {
        let state = self.state.lock().ok()?;
        let bar = state.bar.as_ref()?;
        Some((state.phase?, bar.position(), bar.length().unwrap_or(0)))
    }
}

/// Bar colour per phase so consecutive phases are easy to tell apart
fn phase_style(phase: Phase) -> ProgressStyle {
    let color = match phase {
        Phase::Speed => "cyan/blue",
        Phase::Integrity => "green/white",
        Phase::CapacityWrite => "yellow/white",
        Phase::CapacityVerify => "magenta/white",
    };

    ProgressStyle::default_bar()
        .template(&format!(
            "  {{spinner:.green}} {{prefix:26}} [{{bar:40.{}}}] {{pos}}/{{len}} {{msg}}",
            color
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓░")
}
