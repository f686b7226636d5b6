//! Audio Engine Interface
//!
//! The voice manager never talks to an audio platform directly. It drives an
//! [`AudioBackend`], a deliberately small surface modelled on Web Audio
//! parameter automation: tones are created, started, given gain ramps and
//! scheduled to stop, and the backend reports back asynchronously through
//! [`EngineEvent`]s.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized ──▶ Initializing ──▶ Running ◀──▶ Suspended
//!                        │
//!                        └──▶ Failed (terminal)
//! ```

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::fmt;

new_key_type! {
    /// Handle to a tone generator owned by a backend
    pub struct ToneId;
}

/// Lifecycle of the audio engine for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioEngineState {
    /// No engine has been requested yet
    #[default]
    Uninitialized,
    /// Construction is in progress
    Initializing,
    /// Producing audio
    Running,
    /// Paused by the platform (focus, autoplay policy); recoverable
    Suspended,
    /// Unavailable for the rest of the session
    Failed,
}

impl AudioEngineState {
    pub fn is_running(self) -> bool {
        self == AudioEngineState::Running
    }

    pub fn is_terminal(self) -> bool {
        self == AudioEngineState::Failed
    }
}

/// Run state reported by a constructed backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendState {
    Running,
    Suspended,
    Closed,
}

/// Oscillator shape of a voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "wasm", derive(tsify::Tsify))]
#[cfg_attr(feature = "wasm", tsify(into_wasm_abi, from_wasm_abi))]
#[serde(rename_all = "snake_case")]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl Waveform {
    /// Web Audio `OscillatorType` name
    pub fn as_str(self) -> &'static str {
        match self {
            Waveform::Sine => "sine",
            Waveform::Square => "square",
            Waveform::Sawtooth => "sawtooth",
            Waveform::Triangle => "triangle",
        }
    }

    /// Parse a Web Audio `OscillatorType` name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "sine" => Some(Waveform::Sine),
            "square" => Some(Waveform::Square),
            "sawtooth" | "saw" => Some(Waveform::Sawtooth),
            "triangle" | "tri" => Some(Waveform::Triangle),
            _ => None,
        }
    }
}

/// Notification from a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// The backend changed run state
    StateChanged(BackendState),
    /// A tone reached its scheduled stop; its resources may be released
    ToneEnded(ToneId),
}

/// Errors raised by a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The platform has no audio capability at all
    Unsupported,
    /// The engine or its output graph could not be built
    Construction(String),
    /// The platform refused to resume (typically: needs a user gesture)
    ResumeRejected,
    /// A tone handle does not belong to this backend
    UnknownTone,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Unsupported => write!(f, "Audio is not supported on this platform"),
            EngineError::Construction(msg) => write!(f, "Audio engine construction failed: {}", msg),
            EngineError::ResumeRejected => write!(f, "Audio engine refused to resume"),
            EngineError::UnknownTone => write!(f, "Unknown tone"),
        }
    }
}

impl std::error::Error for EngineError {}

/// User-facing engine notice, shown by presentation as a banner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineNotice {
    /// No audio capability; terminal
    Unsupported,
    /// Engine construction failed; terminal
    InitFailed,
    /// Engine is not running and needs a user gesture; recoverable
    Disabled,
}

impl EngineNotice {
    pub fn message(self) -> &'static str {
        match self {
            EngineNotice::Unsupported => "Audio not supported on this platform.",
            EngineNotice::InitFailed => "Audio failed to initialize.",
            EngineNotice::Disabled => "Audio disabled. Tap anywhere or click Enable.",
        }
    }

    /// Whether the notice persists for the rest of the session
    pub fn is_terminal(self) -> bool {
        !matches!(self, EngineNotice::Disabled)
    }
}

impl fmt::Display for EngineNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// A platform audio engine
///
/// Times are in seconds on the backend's own clock ([`current_time`]).
/// Gain automation follows Web Audio semantics: [`ramp_gain`] ramps
/// linearly from the previous scheduled point to `target` at `end_time`.
///
/// [`current_time`]: AudioBackend::current_time
/// [`ramp_gain`]: AudioBackend::ramp_gain
pub trait AudioBackend {
    /// Construct the engine and its output graph
    fn open(&mut self) -> Result<(), EngineError>;

    /// Current run state; only meaningful after a successful [`open`](AudioBackend::open)
    fn state(&self) -> BackendState;

    /// Ask the platform to resume a suspended engine
    fn resume(&mut self) -> Result<(), EngineError>;

    /// Engine clock in seconds
    fn current_time(&self) -> f64;

    /// Set the master output gain
    fn set_master_gain(&mut self, gain: f64);

    /// Create a silent-until-started tone generator
    fn create_tone(
        &mut self,
        frequency: f64,
        waveform: Waveform,
        initial_gain: f64,
    ) -> Result<ToneId, EngineError>;

    /// Start the generator at `at`
    fn start_tone(&mut self, tone: ToneId, at: f64) -> Result<(), EngineError>;

    /// Pin the gain to `value` at `at`
    fn set_gain_at(&mut self, tone: ToneId, value: f64, at: f64) -> Result<(), EngineError>;

    /// Ramp the gain linearly to `target`, arriving at `end_time`
    fn ramp_gain(&mut self, tone: ToneId, target: f64, end_time: f64) -> Result<(), EngineError>;

    /// Drop automation scheduled after `at` and hold the gain it had at `at`.
    /// Returns the held value.
    fn hold_gain(&mut self, tone: ToneId, at: f64) -> Result<f64, EngineError>;

    /// Stop the generator at `at`; a [`EngineEvent::ToneEnded`] follows
    fn stop_tone(&mut self, tone: ToneId, at: f64) -> Result<(), EngineError>;

    /// Release a stopped generator's resources
    fn dispose_tone(&mut self, tone: ToneId);

    /// Take pending notifications
    fn drain_events(&mut self) -> Vec<EngineEvent>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scriptable backend for voice and gesture tests

    use super::*;
    use slotmap::SlotMap;

    #[derive(Debug, Clone)]
    pub struct FakeTone {
        pub frequency: f64,
        pub waveform: Waveform,
        pub gain: f64,
        pub started_at: Option<f64>,
        pub stop_at: Option<f64>,
        pub ramps: Vec<(f64, f64)>,
    }

    /// Backend whose clock, run state and failures are set by the test
    #[derive(Debug)]
    pub struct FakeBackend {
        pub open_error: Option<EngineError>,
        pub opened: bool,
        pub state: BackendState,
        pub resume_succeeds: bool,
        pub now: f64,
        pub master_gain: f64,
        pub tones: SlotMap<ToneId, FakeTone>,
        pub disposed: Vec<ToneId>,
        pub events: Vec<EngineEvent>,
        pub open_calls: usize,
    }

    impl FakeBackend {
        /// Opens straight into the running state
        pub fn running() -> Self {
            Self {
                open_error: None,
                opened: false,
                state: BackendState::Running,
                resume_succeeds: true,
                now: 0.0,
                master_gain: 1.0,
                tones: SlotMap::with_key(),
                disposed: Vec::new(),
                events: Vec::new(),
                open_calls: 0,
            }
        }

        /// Opens suspended, as browsers do before a user gesture
        pub fn suspended(resume_succeeds: bool) -> Self {
            Self {
                state: BackendState::Suspended,
                resume_succeeds,
                ..Self::running()
            }
        }

        pub fn failing(error: EngineError) -> Self {
            Self {
                open_error: Some(error),
                ..Self::running()
            }
        }

        /// Advance the clock, ending every tone whose stop time has passed
        pub fn advance_to(&mut self, now: f64) {
            self.now = now;
            let ended: Vec<ToneId> = self
                .tones
                .iter_mut()
                .filter_map(|(id, tone)| match tone.stop_at {
                    Some(t) if t <= now => {
                        tone.stop_at = None;
                        Some(id)
                    }
                    _ => None,
                })
                .collect();
            self.events
                .extend(ended.into_iter().map(EngineEvent::ToneEnded));
        }

        /// Simulate the platform changing run state
        pub fn platform_state(&mut self, state: BackendState) {
            self.state = state;
            self.events.push(EngineEvent::StateChanged(state));
        }

        pub fn live_tones(&self) -> usize {
            self.tones.len()
        }
    }

    impl AudioBackend for FakeBackend {
        fn open(&mut self) -> Result<(), EngineError> {
            self.open_calls += 1;
            if let Some(err) = self.open_error.clone() {
                return Err(err);
            }
            self.opened = true;
            Ok(())
        }

        fn state(&self) -> BackendState {
            self.state
        }

        fn resume(&mut self) -> Result<(), EngineError> {
            if self.resume_succeeds {
                self.platform_state(BackendState::Running);
                Ok(())
            } else {
                Err(EngineError::ResumeRejected)
            }
        }

        fn current_time(&self) -> f64 {
            self.now
        }

        fn set_master_gain(&mut self, gain: f64) {
            self.master_gain = gain;
        }

        fn create_tone(
            &mut self,
            frequency: f64,
            waveform: Waveform,
            initial_gain: f64,
        ) -> Result<ToneId, EngineError> {
            Ok(self.tones.insert(FakeTone {
                frequency,
                waveform,
                gain: initial_gain,
                started_at: None,
                stop_at: None,
                ramps: Vec::new(),
            }))
        }

        fn start_tone(&mut self, tone: ToneId, at: f64) -> Result<(), EngineError> {
            let t = self.tones.get_mut(tone).ok_or(EngineError::UnknownTone)?;
            t.started_at = Some(at);
            Ok(())
        }

        fn set_gain_at(&mut self, tone: ToneId, value: f64, _at: f64) -> Result<(), EngineError> {
            let t = self.tones.get_mut(tone).ok_or(EngineError::UnknownTone)?;
            t.gain = value;
            Ok(())
        }

        fn ramp_gain(&mut self, tone: ToneId, target: f64, end_time: f64) -> Result<(), EngineError> {
            let t = self.tones.get_mut(tone).ok_or(EngineError::UnknownTone)?;
            t.ramps.push((target, end_time));
            Ok(())
        }

        fn hold_gain(&mut self, tone: ToneId, _at: f64) -> Result<f64, EngineError> {
            let t = self.tones.get_mut(tone).ok_or(EngineError::UnknownTone)?;
            if let Some(&(target, _)) = t.ramps.last() {
                t.gain = target;
            }
            Ok(t.gain)
        }

        fn stop_tone(&mut self, tone: ToneId, at: f64) -> Result<(), EngineError> {
            let t = self.tones.get_mut(tone).ok_or(EngineError::UnknownTone)?;
            t.stop_at = Some(at);
            Ok(())
        }

        fn dispose_tone(&mut self, tone: ToneId) {
            if self.tones.remove(tone).is_some() {
                self.disposed.push(tone);
            }
        }

        fn drain_events(&mut self) -> Vec<EngineEvent> {
            std::mem::take(&mut self.events)
        }
    }
}
