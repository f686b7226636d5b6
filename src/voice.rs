//! Voice Management
//!
//! This module owns everything that sounds: the audio engine lifecycle and
//! the registry of voices, one per sounding pitch identity.
//!
//! # Architecture
//!
//! - `VoiceManager` - Engine lifecycle, notices and the voice registry
//! - `Voice` - A single tone bound to a [`PitchKey`]
//! - `VoiceSettings` - Waveform, envelope times and master volume
//!
//! Releasing a voice is two-phase. `note_off` deregisters the key at once,
//! so the same pitch can start again immediately as a new voice, while the
//! old tone keeps fading out. Its generator is disposed only when the
//! backend reports [`EngineEvent::ToneEnded`].

use crate::engine::{
    AudioBackend, AudioEngineState, BackendState, EngineError, EngineEvent, EngineNotice, ToneId,
    Waveform,
};
use crate::ratio::PitchKey;
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};
use std::collections::HashMap;

/// Gain a voice starts from; exponential-style ramps cannot start at zero
pub const START_GAIN: f64 = 1e-4;

/// Gain a released voice fades to before it is stopped
pub const RELEASE_FLOOR_GAIN: f64 = 1e-5;

/// Peak gain of a voice
pub const PEAK_GAIN: f64 = 1.0;

/// Shortest attack ramp, in seconds. An instantaneous jump would click.
pub const MIN_ATTACK_SECS: f64 = 0.001;

/// Shortest release ramp, in seconds
pub const MIN_RELEASE_SECS: f64 = 0.05;

new_key_type! {
    /// Identifier of a voice in the registry
    pub struct VoiceId;
}

/// Sound settings read at the moment of each note
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "wasm", derive(tsify::Tsify))]
#[cfg_attr(feature = "wasm", tsify(into_wasm_abi, from_wasm_abi))]
#[serde(default)]
pub struct VoiceSettings {
    pub waveform: Waveform,
    /// Attack time in milliseconds
    pub attack_ms: f64,
    /// Release time in milliseconds
    pub release_ms: f64,
    /// Master output gain (0.0 to 1.0)
    pub master_volume: f64,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            waveform: Waveform::Sine,
            attack_ms: 5.0,
            release_ms: 250.0,
            master_volume: 0.18,
        }
    }
}

impl VoiceSettings {
    /// Attack ramp length in seconds, never instantaneous
    pub fn attack_secs(&self) -> f64 {
        finite_or(self.attack_ms, 5.0).max(0.0) / 1000.0
    }

    /// Release ramp length in seconds
    pub fn release_secs(&self) -> f64 {
        (finite_or(self.release_ms, 250.0) / 1000.0).max(MIN_RELEASE_SECS)
    }

    /// Master gain clamped to `[0, 1]`
    pub fn master_gain(&self) -> f64 {
        finite_or(self.master_volume, 0.18).clamp(0.0, 1.0)
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// Phase of a voice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoicePhase {
    /// Registered under its key and sounding
    Sounding,
    /// Deregistered and fading out; waiting for the tone to end
    Releasing,
}

/// A single tone bound to a pitch identity
#[derive(Debug, Clone)]
pub struct Voice {
    pub key: PitchKey,
    pub tone: ToneId,
    pub frequency: f64,
    pub waveform: Waveform,
    /// Engine time the voice started
    pub started_at: f64,
    /// Engine time the release began
    pub released_at: Option<f64>,
    pub phase: VoicePhase,
}

/// Registry of sounding voices plus the engine they sound on
///
/// At most one voice per [`PitchKey`] is sounding at any instant.
pub struct VoiceManager<B: AudioBackend> {
    backend: B,
    state: AudioEngineState,
    notice: Option<EngineNotice>,
    settings: VoiceSettings,
    voices: SlotMap<VoiceId, Voice>,
    /// Sounding voices by pitch identity
    sounding: HashMap<PitchKey, VoiceId>,
    /// Releasing voices by the tone they are waiting on
    tails: HashMap<ToneId, VoiceId>,
    panic_epoch: u64,
}

impl<B: AudioBackend> VoiceManager<B> {
    /// Create a manager around an unopened backend
    pub fn new(backend: B) -> Self {
        Self::with_settings(backend, VoiceSettings::default())
    }

    pub fn with_settings(backend: B, settings: VoiceSettings) -> Self {
        Self {
            backend,
            state: AudioEngineState::Uninitialized,
            notice: None,
            settings,
            voices: SlotMap::with_key(),
            sounding: HashMap::new(),
            tails: HashMap::new(),
            panic_epoch: 0,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn state(&self) -> AudioEngineState {
        self.state
    }

    /// Notice presentation should currently show, if any
    pub fn notice(&self) -> Option<EngineNotice> {
        self.notice
    }

    pub fn settings(&self) -> &VoiceSettings {
        &self.settings
    }

    /// Replace the sound settings. Volume applies at once; everything else
    /// applies from the next note.
    pub fn set_settings(&mut self, settings: VoiceSettings) {
        let volume_changed = settings.master_gain() != self.settings.master_gain();
        self.settings = settings;
        if volume_changed && self.engine_constructed() {
            self.backend.set_master_gain(self.settings.master_gain());
        }
    }

    pub fn set_master_volume(&mut self, volume: f64) {
        let settings = VoiceSettings {
            master_volume: volume,
            ..self.settings
        };
        self.set_settings(settings);
    }

    /// Whether `key` is sounding
    pub fn is_active(&self, key: &PitchKey) -> bool {
        self.sounding.contains_key(key)
    }

    /// Number of sounding voices
    pub fn active_count(&self) -> usize {
        self.sounding.len()
    }

    /// Number of released voices still fading out
    pub fn releasing_count(&self) -> usize {
        self.tails.len()
    }

    /// Sounding keys in no particular order
    pub fn active_keys(&self) -> impl Iterator<Item = PitchKey> + '_ {
        self.sounding.keys().copied()
    }

    /// The sounding voice for `key`
    pub fn voice(&self, key: &PitchKey) -> Option<&Voice> {
        self.sounding.get(key).and_then(|id| self.voices.get(*id))
    }

    /// Incremented by every [`panic`](Self::panic); sustain trackers compare
    /// against it to know they must clear.
    pub fn panic_epoch(&self) -> u64 {
        self.panic_epoch
    }

    fn engine_constructed(&self) -> bool {
        matches!(
            self.state,
            AudioEngineState::Running | AudioEngineState::Suspended
        )
    }

    // =========================================================================
    // Engine lifecycle
    // =========================================================================

    /// A user interaction happened (pointer-down, key-down, enable button).
    ///
    /// Starts or resumes the engine if it is not running. Returns whether
    /// the engine is running afterwards.
    pub fn interact(&mut self) -> bool {
        self.ensure_running()
    }

    /// Make sure the engine is running, constructing or resuming it.
    ///
    /// Failures never propagate: they are logged and turned into a notice.
    pub fn ensure_running(&mut self) -> bool {
        self.process_events();

        match self.state {
            AudioEngineState::Running => return true,
            AudioEngineState::Failed => return false,
            AudioEngineState::Uninitialized | AudioEngineState::Initializing => {
                if !self.initialize() {
                    return false;
                }
            }
            AudioEngineState::Suspended => {}
        }

        if self.backend.state() == BackendState::Suspended {
            if let Err(e) = self.backend.resume() {
                log::warn!("audio engine resume failed: {}", e);
            }
        }
        self.process_events();
        self.sync_backend_state();

        self.state.is_running()
    }

    fn initialize(&mut self) -> bool {
        self.state = AudioEngineState::Initializing;
        log::info!("initializing audio engine");

        if let Err(e) = self.backend.open() {
            self.fail(&e);
            return false;
        }

        self.backend.set_master_gain(self.settings.master_gain());
        if let Err(e) = self.prime() {
            self.fail(&e);
            return false;
        }

        self.sync_backend_state();
        true
    }

    /// Schedule a silent tone that starts and stops at once, so the output
    /// graph is exercised before the first real note
    fn prime(&mut self) -> Result<(), EngineError> {
        let now = self.backend.current_time();
        let tone = self.backend.create_tone(440.0, Waveform::Sine, 0.0)?;
        self.backend.start_tone(tone, now)?;
        self.backend.stop_tone(tone, now)
    }

    fn fail(&mut self, error: &EngineError) {
        log::error!("audio engine unavailable: {}", error);
        self.state = AudioEngineState::Failed;
        self.notice = Some(match error {
            EngineError::Unsupported => EngineNotice::Unsupported,
            _ => EngineNotice::InitFailed,
        });
    }

    fn sync_backend_state(&mut self) {
        let state = self.backend.state();
        self.apply_backend_state(state);
    }

    fn apply_backend_state(&mut self, state: BackendState) {
        if matches!(
            self.state,
            AudioEngineState::Uninitialized | AudioEngineState::Failed
        ) {
            return;
        }

        let next = match state {
            BackendState::Running => AudioEngineState::Running,
            BackendState::Suspended => AudioEngineState::Suspended,
            BackendState::Closed => AudioEngineState::Failed,
        };
        if next != self.state {
            log::info!("audio engine {:?} -> {:?}", self.state, next);
        }
        self.state = next;

        match next {
            AudioEngineState::Running => {
                if self.notice == Some(EngineNotice::Disabled) {
                    self.notice = None;
                }
            }
            AudioEngineState::Failed => {
                log::error!("audio engine closed");
                self.notice = Some(EngineNotice::InitFailed);
            }
            _ => self.raise_disabled(),
        }
    }

    fn raise_disabled(&mut self) {
        if !self.notice.map(EngineNotice::is_terminal).unwrap_or(false) {
            self.notice = Some(EngineNotice::Disabled);
        }
    }

    /// React to one backend notification
    pub fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::StateChanged(state) => self.apply_backend_state(state),
            EngineEvent::ToneEnded(tone) => {
                if let Some(id) = self.tails.remove(&tone) {
                    self.voices.remove(id);
                }
                self.backend.dispose_tone(tone);
            }
        }
    }

    /// Drain and handle every pending backend notification
    pub fn process_events(&mut self) {
        for event in self.backend.drain_events() {
            self.handle_event(event);
        }
    }

    /// Page visibility changed: hiding silences everything, showing a page
    /// whose engine is not running raises the disabled notice
    pub fn on_visibility_change(&mut self, hidden: bool) {
        if hidden {
            self.panic();
        } else {
            self.process_events();
            if !self.state.is_running() {
                self.raise_disabled();
            }
        }
    }

    // =========================================================================
    // Notes
    // =========================================================================

    /// Start a voice for `key` at `frequency`.
    ///
    /// A no-op when `key` is already sounding. Returns whether a new voice
    /// was started; when the engine cannot run the note is dropped.
    pub fn note_on(&mut self, key: PitchKey, frequency: f64) -> bool {
        if self.sounding.contains_key(&key) {
            return false;
        }
        if !self.ensure_running() {
            log::warn!("dropping note {}: audio engine not running", key);
            return false;
        }
        if !(frequency.is_finite() && frequency > 0.0) {
            log::warn!("dropping note {}: invalid frequency {}", key, frequency);
            return false;
        }

        let now = self.backend.current_time();
        let waveform = self.settings.waveform;
        let attack = self.settings.attack_secs().max(MIN_ATTACK_SECS);

        let tone = match self.backend.create_tone(frequency, waveform, START_GAIN) {
            Ok(tone) => tone,
            Err(e) => {
                log::warn!("dropping note {}: {}", key, e);
                return false;
            }
        };
        if let Err(e) = schedule_attack(&mut self.backend, tone, now, attack) {
            log::warn!("dropping note {}: {}", key, e);
            self.backend.dispose_tone(tone);
            return false;
        }

        let id = self.voices.insert(Voice {
            key,
            tone,
            frequency,
            waveform,
            started_at: now,
            released_at: None,
            phase: VoicePhase::Sounding,
        });
        self.sounding.insert(key, id);
        if self.notice == Some(EngineNotice::Disabled) {
            self.notice = None;
        }
        log::debug!("note on {} at {:.2} Hz", key, frequency);
        true
    }

    /// Release the voice for `key`.
    ///
    /// A no-op when `key` is not sounding. Returns whether a voice was
    /// released.
    pub fn note_off(&mut self, key: PitchKey) -> bool {
        let Some(id) = self.sounding.remove(&key) else {
            return false;
        };
        let now = self.backend.current_time();
        let release = self.settings.release_secs();

        let Some(voice) = self.voices.get_mut(id) else {
            return false;
        };
        voice.phase = VoicePhase::Releasing;
        voice.released_at = Some(now);
        let tone = voice.tone;

        match schedule_release(&mut self.backend, tone, now, release) {
            Ok(()) => {
                self.tails.insert(tone, id);
            }
            Err(e) => {
                log::warn!("release of {} failed, disposing at once: {}", key, e);
                self.backend.dispose_tone(tone);
                self.voices.remove(id);
            }
        }
        log::debug!("note off {}", key);
        true
    }

    /// Release every sounding voice. Idempotent.
    ///
    /// Returns how many voices were released.
    pub fn panic(&mut self) -> usize {
        let keys: Vec<PitchKey> = self.sounding.keys().copied().collect();
        let released = keys.into_iter().filter(|&key| self.note_off(key)).count();
        self.panic_epoch = self.panic_epoch.wrapping_add(1);
        if released > 0 {
            log::info!("panic released {} voices", released);
        }
        released
    }
}

fn schedule_attack<B: AudioBackend>(
    backend: &mut B,
    tone: ToneId,
    now: f64,
    attack: f64,
) -> Result<(), EngineError> {
    backend.set_gain_at(tone, START_GAIN, now)?;
    backend.ramp_gain(tone, PEAK_GAIN, now + attack)?;
    backend.start_tone(tone, now)
}

fn schedule_release<B: AudioBackend>(
    backend: &mut B,
    tone: ToneId,
    now: f64,
    release: f64,
) -> Result<(), EngineError> {
    backend.hold_gain(tone, now)?;
    backend.ramp_gain(tone, RELEASE_FLOOR_GAIN, now + release)?;
    backend.stop_tone(tone, now + release)
}
