//! Linear volume fades driven by an external clock.
//!
//! A fade is either in, out, or idle; starting one direction replaces the
//! other. Nothing runs in the background: the owner calls [`Fade::tick`]
//! with the current time once per frame and applies the returned volume.

/// Fade length used unless configured otherwise.
pub const DEFAULT_FADE_DURATION_MS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FadeState {
    #[default]
    Idle,
    In {
        started_ms: u64,
    },
    Out {
        started_ms: u64,
    },
}

/// Result of advancing a fade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeTick {
    /// Volume to apply
    pub volume: f32,
    /// The fade-out finished and playback should stop
    pub stop: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fade {
    state: FadeState,
    duration_ms: u64,
}

impl Default for Fade {
    fn default() -> Self {
        Self::new(DEFAULT_FADE_DURATION_MS)
    }
}

impl Fade {
    pub fn new(duration_ms: u64) -> Self {
        Self {
            state: FadeState::Idle,
            duration_ms,
        }
    }

    pub fn state(&self) -> FadeState {
        self.state
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn set_duration_ms(&mut self, duration_ms: u64) {
        self.duration_ms = duration_ms;
    }

    pub fn is_fading_in(&self) -> bool {
        matches!(self.state, FadeState::In { .. })
    }

    pub fn is_fading_out(&self) -> bool {
        matches!(self.state, FadeState::Out { .. })
    }

    pub fn start_in(&mut self, now_ms: u64) {
        self.state = FadeState::In { started_ms: now_ms };
    }

    pub fn start_out(&mut self, now_ms: u64) {
        self.state = FadeState::Out { started_ms: now_ms };
    }

    pub fn cancel(&mut self) {
        self.state = FadeState::Idle;
    }

    /// Advance to `now_ms`.
    ///
    /// Fading in, the volume is `elapsed / duration` and is not capped: the
    /// tick that ends the fade may return a value above 1. Fading out, the
    /// elapsed time is capped at the duration so the volume bottoms out at 0.
    /// A zero duration finishes either direction on the first tick.
    pub fn tick(&mut self, now_ms: u64) -> Option<FadeTick> {
        let duration = self.duration_ms as f32;
        match self.state {
            FadeState::Idle => None,
            FadeState::In { started_ms } => {
                let volume = if self.duration_ms == 0 {
                    1.0
                } else {
                    now_ms.saturating_sub(started_ms) as f32 / duration
                };
                if volume >= 1.0 {
                    self.state = FadeState::Idle;
                }
                Some(FadeTick { volume, stop: false })
            }
            FadeState::Out { started_ms } => {
                let volume = if self.duration_ms == 0 {
                    0.0
                } else {
                    let elapsed = now_ms.saturating_sub(started_ms).min(self.duration_ms) as f32;
                    1.0 - elapsed / duration
                };
                let stop = volume <= 0.0;
                if stop {
                    self.state = FadeState::Idle;
                }
                Some(FadeTick { volume, stop })
            }
        }
    }
}
