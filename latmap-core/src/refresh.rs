//! Coalesces selection-change signals into recompute-and-redraw passes.
//!
//! The host drives the scheduler with `on_frame` once per paint cycle. A
//! signal while idle schedules a pass two frames out; further signals before
//! the pass starts fold into it. A signal that lands while a pass is running
//! queues exactly one rerun, no matter how many arrive. A signal raised by
//! the rerun itself is kept but waits for the next frame cycle.

use log::debug;

/// Frame ticks between the first signal and the pass.
pub const FRAMES_BEFORE_PASS: u8 = 2;

/// The first pass plus at most one trailing rerun.
pub const MAX_PASSES_PER_FRAME: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    Scheduled { frames_left: u8 },
    Running,
}

#[derive(Debug)]
pub struct RefreshScheduler {
    phase: RefreshPhase,
    pending: bool,
    signals: u64,
    passes: u64,
}

impl Default for RefreshScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshScheduler {
    pub fn new() -> Self {
        RefreshScheduler {
            phase: RefreshPhase::Idle,
            pending: false,
            signals: 0,
            passes: 0,
        }
    }

    pub fn phase(&self) -> RefreshPhase {
        self.phase
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn signals(&self) -> u64 {
        self.signals
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn signal(&mut self) {
        self.signals += 1;
        match self.phase {
            RefreshPhase::Idle => {
                self.phase = RefreshPhase::Scheduled {
                    frames_left: FRAMES_BEFORE_PASS,
                };
                debug!("refresh scheduled");
            }
            RefreshPhase::Scheduled { .. } => {
                debug!("refresh signal coalesced into scheduled pass");
            }
            RefreshPhase::Running => {
                self.pending = true;
                debug!("refresh signal during pass, rerun queued");
            }
        }
    }

    /// Advances one frame and runs the pass once the wait is over.
    ///
    /// `pass` receives the scheduler so work done inside it may signal again.
    /// Returns the number of passes run during this frame.
    pub fn on_frame<F>(&mut self, mut pass: F) -> u32
    where
        F: FnMut(&mut RefreshScheduler),
    {
        let RefreshPhase::Scheduled { frames_left } = self.phase else {
            return 0;
        };
        if frames_left > 1 {
            self.phase = RefreshPhase::Scheduled {
                frames_left: frames_left - 1,
            };
            return 0;
        }

        self.phase = RefreshPhase::Running;
        let mut ran = 0;
        for _ in 0..MAX_PASSES_PER_FRAME {
            // cleared before the pass so a signal raised inside it survives
            self.pending = false;
            self.passes += 1;
            ran += 1;
            debug!("refresh pass {} starting", self.passes);
            pass(&mut *self);
            if !self.pending {
                self.phase = RefreshPhase::Idle;
                return ran;
            }
        }
        // the rerun signaled too: hold it for the next frame cycle
        self.pending = false;
        self.phase = RefreshPhase::Scheduled {
            frames_left: FRAMES_BEFORE_PASS,
        };
        debug!("refresh rerun signaled again, rescheduled");
        ran
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{RenderStateCoordinator, SelectionInputs};
    use crate::{ColorRamp, Dataset, Metric, RawRow};

    fn run_frames(s: &mut RefreshScheduler, frames: usize) -> u32 {
        (0..frames).map(|_| s.on_frame(|_| {})).sum()
    }

    #[test]
    fn idle_scheduler_does_nothing_on_frames() {
        let mut s = RefreshScheduler::new();
        assert_eq!(run_frames(&mut s, 5), 0);
        assert_eq!(s.phase(), RefreshPhase::Idle);
    }

    #[test]
    fn burst_before_pass_runs_once() {
        let mut s = RefreshScheduler::new();
        for _ in 0..25 {
            s.signal();
        }
        assert_eq!(s.on_frame(|_| {}), 0);
        assert_eq!(s.phase(), RefreshPhase::Scheduled { frames_left: 1 });
        s.signal();
        s.signal();
        assert_eq!(s.on_frame(|_| {}), 1);
        assert_eq!(s.phase(), RefreshPhase::Idle);
        assert_eq!(run_frames(&mut s, 4), 0);
        assert_eq!(s.passes(), 1);
        assert_eq!(s.signals(), 27);
    }

    #[test]
    fn signal_during_pass_runs_exactly_one_more() {
        let mut s = RefreshScheduler::new();
        s.signal();
        s.on_frame(|_| {});
        let mut calls = 0;
        let ran = s.on_frame(|s| {
            calls += 1;
            if calls == 1 {
                for _ in 0..10 {
                    s.signal();
                }
                assert!(s.is_pending());
            } else {
                assert!(!s.is_pending());
            }
        });
        assert_eq!(ran, 2);
        assert_eq!(calls, 2);
        assert!(!s.is_pending());
        assert_eq!(s.phase(), RefreshPhase::Idle);
    }

    #[test]
    fn pass_that_always_signals_is_bounded_per_frame() {
        let mut s = RefreshScheduler::new();
        s.signal();
        s.on_frame(|_| {});
        let mut calls = 0;
        for _ in 0..6 {
            let ran = s.on_frame(|s| {
                calls += 1;
                s.signal();
            });
            assert!(ran <= MAX_PASSES_PER_FRAME);
        }
        // frames alternate: two passes, then one frame of waiting
        assert_eq!(calls, 6);
        assert_eq!(s.passes(), 6);
        assert_eq!(s.phase(), RefreshPhase::Scheduled { frames_left: 1 });
        assert!(!s.is_pending());
    }

    #[test]
    fn signal_after_pass_needs_a_fresh_wait() {
        let mut s = RefreshScheduler::new();
        s.signal();
        assert_eq!(run_frames(&mut s, 2), 1);
        s.signal();
        assert_eq!(s.on_frame(|_| {}), 0);
        assert_eq!(s.on_frame(|_| {}), 1);
        assert_eq!(s.passes(), 2);
    }

    #[test]
    fn pass_sees_latest_selection() {
        let dataset = Dataset::from_raw(&[RawRow {
            src_country: Some("US".to_string()),
            dst_country: Some("DE".to_string()),
            average_ms: Some("20".to_string()),
            ..RawRow::default()
        }]);
        let mut coordinator = RenderStateCoordinator::new(dataset, ColorRamp::default());
        let mut selection = SelectionInputs::default();
        let mut s = RefreshScheduler::new();

        selection.source = Some("DE".to_string());
        s.signal();
        selection.source = Some("US".to_string());
        selection.metric = Metric::P50;
        s.signal();
        for _ in 0..2 {
            s.on_frame(|_| {
                coordinator.recompute(&selection);
            });
        }

        assert_eq!(coordinator.passes(), 1);
        assert_eq!(coordinator.state().selected_source.as_deref(), Some("US"));
        assert_eq!(coordinator.state().selected_metric, Metric::P50);
    }
}
