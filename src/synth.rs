//! Software Synthesis Backend
//!
//! [`SynthBackend`] implements [`AudioBackend`] by rendering samples itself:
//! one phase-accumulator oscillator per tone, per-tone gain automation with
//! Web Audio ramp semantics, a master gain stage and a peak limiter on the
//! output bus.
//!
//! The engine clock is sample-accurate and advances only while rendering in
//! the running state, so a suspended engine is silent and frozen in time.

use crate::engine::{AudioBackend, BackendState, EngineError, EngineEvent, ToneId, Waveform};
use slotmap::SlotMap;
use std::f64::consts::TAU;

pub const DEFAULT_SAMPLE_RATE: f64 = 44100.0;

/// Limiter threshold in dBFS
pub const LIMITER_THRESHOLD_DB: f64 = -3.0;
/// Limiter compression ratio above the threshold
pub const LIMITER_RATIO: f64 = 20.0;
/// Limiter attack time in seconds
pub const LIMITER_ATTACK: f64 = 0.003;
/// Limiter release time in seconds
pub const LIMITER_RELEASE: f64 = 0.25;

/// One sample of a unit-amplitude waveform at `phase` in `[0, 1)`
pub fn oscillator(waveform: Waveform, phase: f64) -> f64 {
    match waveform {
        Waveform::Sine => libm::sin(phase * TAU),
        Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        Waveform::Sawtooth => 2.0 * phase - 1.0,
        Waveform::Square => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct GainPoint {
    time: f64,
    value: f64,
    /// Reached by a linear ramp from the previous point rather than a jump
    ramp: bool,
}

/// Scheduled gain curve of one tone
#[derive(Debug, Clone, PartialEq)]
pub struct GainAutomation {
    initial: f64,
    points: Vec<GainPoint>,
}

impl GainAutomation {
    pub fn new(initial: f64) -> Self {
        Self {
            initial,
            points: Vec::new(),
        }
    }

    fn insert(&mut self, point: GainPoint) {
        let at = self.points.partition_point(|p| p.time <= point.time);
        self.points.insert(at, point);
    }

    /// Jump to `value` at `time`
    pub fn set_value_at(&mut self, value: f64, time: f64) {
        self.insert(GainPoint {
            time,
            value,
            ramp: false,
        });
    }

    /// Ramp linearly from the previous point to `value`, arriving at `end`.
    /// With no previous point the ramp starts at `now`.
    pub fn ramp_to(&mut self, value: f64, end: f64, now: f64) {
        if self.points.is_empty() {
            let held = self.value_at(now);
            self.set_value_at(held, now);
        }
        self.insert(GainPoint {
            time: end,
            value,
            ramp: true,
        });
    }

    /// Cancel everything scheduled at or after `time` and hold the value the
    /// curve had there
    pub fn hold(&mut self, time: f64) -> f64 {
        let value = self.value_at(time);
        self.points.retain(|p| p.time < time);
        self.set_value_at(value, time);
        value
    }

    /// Gain at `time`
    pub fn value_at(&self, time: f64) -> f64 {
        let mut prev_time = f64::NEG_INFINITY;
        let mut prev_value = self.initial;

        for p in &self.points {
            if p.time <= time {
                prev_time = p.time;
                prev_value = p.value;
                continue;
            }
            if p.ramp && prev_time.is_finite() && p.time > prev_time {
                let frac = (time - prev_time) / (p.time - prev_time);
                return prev_value + (p.value - prev_value) * frac;
            }
            break;
        }

        prev_value
    }

    /// Drop points that can no longer affect the curve after `time`
    fn prune(&mut self, time: f64) {
        let passed = self.points.partition_point(|p| p.time <= time);
        if passed > 1 {
            self.points.drain(..passed - 1);
        }
    }
}

/// Feed-forward peak limiter with a hard knee
#[derive(Debug, Clone)]
pub struct Limiter {
    threshold_db: f64,
    ratio: f64,
    attack_coef: f64,
    release_coef: f64,
    /// Current gain reduction in dB (>= 0)
    reduction_db: f64,
}

impl Limiter {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            threshold_db: LIMITER_THRESHOLD_DB,
            ratio: LIMITER_RATIO,
            attack_coef: smoothing_coef(LIMITER_ATTACK, sample_rate),
            release_coef: smoothing_coef(LIMITER_RELEASE, sample_rate),
            reduction_db: 0.0,
        }
    }

    pub fn process(&mut self, input: f64) -> f64 {
        let level_db = 20.0 * libm::log10(input.abs().max(1e-9));
        let over = level_db - self.threshold_db;
        let target = if over > 0.0 {
            over * (1.0 - 1.0 / self.ratio)
        } else {
            0.0
        };

        let coef = if target > self.reduction_db {
            self.attack_coef
        } else {
            self.release_coef
        };
        self.reduction_db = target + coef * (self.reduction_db - target);

        input * libm::pow(10.0, -self.reduction_db / 20.0)
    }

    pub fn reduction_db(&self) -> f64 {
        self.reduction_db
    }

    pub fn reset(&mut self) {
        self.reduction_db = 0.0;
    }
}

fn smoothing_coef(time: f64, sample_rate: f64) -> f64 {
    libm::exp(-1.0 / (time * sample_rate))
}

#[derive(Debug, Clone)]
struct Tone {
    frequency: f64,
    waveform: Waveform,
    phase: f64,
    gain: GainAutomation,
    start: Option<f64>,
    stop: Option<f64>,
    ended: bool,
}

impl Tone {
    fn sounding_at(&self, time: f64) -> bool {
        match (self.start, self.stop) {
            (Some(start), Some(stop)) => start <= time && time < stop,
            (Some(start), None) => start <= time,
            _ => false,
        }
    }
}

/// Oscillator-bank backend rendering mono `f32` blocks
pub struct SynthBackend {
    sample_rate: f64,
    opened: bool,
    open_suspended: bool,
    state: BackendState,
    /// Engine clock in samples
    frames: u64,
    master_gain: f64,
    limiter: Limiter,
    tones: SlotMap<ToneId, Tone>,
    events: Vec<EngineEvent>,
}

impl SynthBackend {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            opened: false,
            open_suspended: false,
            state: BackendState::Suspended,
            frames: 0,
            master_gain: 1.0,
            limiter: Limiter::new(sample_rate),
            tones: SlotMap::with_key(),
            events: Vec::new(),
        }
    }

    /// Open into the suspended state, as a browser does before the first
    /// user gesture
    pub fn start_suspended(mut self) -> Self {
        self.open_suspended = true;
        self
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn master_gain(&self) -> f64 {
        self.master_gain
    }

    pub fn limiter(&self) -> &Limiter {
        &self.limiter
    }

    /// Tones created and not yet disposed
    pub fn tone_count(&self) -> usize {
        self.tones.len()
    }

    /// Platform-initiated suspension (focus loss, device change)
    pub fn suspend(&mut self) {
        self.set_state(BackendState::Suspended);
    }

    /// Platform-initiated shutdown; the engine cannot come back
    pub fn close(&mut self) {
        self.set_state(BackendState::Closed);
    }

    fn set_state(&mut self, state: BackendState) {
        if self.opened && self.state != state {
            self.state = state;
            self.events.push(EngineEvent::StateChanged(state));
        }
    }

    fn tone_mut(&mut self, tone: ToneId) -> Result<&mut Tone, EngineError> {
        self.tones.get_mut(tone).ok_or(EngineError::UnknownTone)
    }

    /// Render the next block of mono samples.
    ///
    /// Outputs silence without advancing the clock unless running.
    pub fn render(&mut self, out: &mut [f32]) {
        if !(self.opened && self.state == BackendState::Running) {
            out.fill(0.0);
            return;
        }

        let dt = 1.0 / self.sample_rate;
        for sample in out.iter_mut() {
            let time = self.frames as f64 * dt;
            let mut mix = 0.0;

            for (_, tone) in self.tones.iter_mut() {
                if !tone.sounding_at(time) {
                    continue;
                }
                mix += oscillator(tone.waveform, tone.phase) * tone.gain.value_at(time);
                tone.phase = (tone.phase + tone.frequency * dt).fract();
            }

            *sample = self.limiter.process(mix * self.master_gain) as f32;
            self.frames += 1;
        }

        self.collect_ended();
    }

    /// Render `frames` samples into a new buffer
    pub fn render_frames(&mut self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames];
        self.render(&mut out);
        out
    }

    fn collect_ended(&mut self) {
        let now = self.current_time();
        for (id, tone) in self.tones.iter_mut() {
            if tone.ended {
                continue;
            }
            if let Some(stop) = tone.stop {
                if stop <= now {
                    tone.ended = true;
                    self.events.push(EngineEvent::ToneEnded(id));
                    continue;
                }
            }
            tone.gain.prune(now);
        }
    }
}

impl Default for SynthBackend {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE)
    }
}

impl AudioBackend for SynthBackend {
    fn open(&mut self) -> Result<(), EngineError> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(EngineError::Construction(format!(
                "invalid sample rate {}",
                self.sample_rate
            )));
        }
        if self.state == BackendState::Closed {
            return Err(EngineError::Construction("engine closed".into()));
        }

        self.opened = true;
        self.state = if self.open_suspended {
            BackendState::Suspended
        } else {
            BackendState::Running
        };
        log::debug!(
            "synth opened at {} Hz ({:?})",
            self.sample_rate,
            self.state
        );
        Ok(())
    }

    fn state(&self) -> BackendState {
        self.state
    }

    fn resume(&mut self) -> Result<(), EngineError> {
        match self.state {
            BackendState::Closed => Err(EngineError::ResumeRejected),
            _ if !self.opened => Err(EngineError::ResumeRejected),
            _ => {
                self.set_state(BackendState::Running);
                Ok(())
            }
        }
    }

    fn current_time(&self) -> f64 {
        self.frames as f64 / self.sample_rate
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
        if !self.opened || self.state == BackendState::Closed {
            return Err(EngineError::Construction("engine not open".into()));
        }
        Ok(self.tones.insert(Tone {
            frequency,
            waveform,
            phase: 0.0,
            gain: GainAutomation::new(initial_gain),
            start: None,
            stop: None,
            ended: false,
        }))
    }

    fn start_tone(&mut self, tone: ToneId, at: f64) -> Result<(), EngineError> {
        self.tone_mut(tone)?.start = Some(at);
        Ok(())
    }

    fn set_gain_at(&mut self, tone: ToneId, value: f64, at: f64) -> Result<(), EngineError> {
        self.tone_mut(tone)?.gain.set_value_at(value, at);
        Ok(())
    }

    fn ramp_gain(&mut self, tone: ToneId, target: f64, end_time: f64) -> Result<(), EngineError> {
        let now = self.current_time();
        self.tone_mut(tone)?.gain.ramp_to(target, end_time, now);
        Ok(())
    }

    fn hold_gain(&mut self, tone: ToneId, at: f64) -> Result<f64, EngineError> {
        Ok(self.tone_mut(tone)?.gain.hold(at))
    }

    fn stop_tone(&mut self, tone: ToneId, at: f64) -> Result<(), EngineError> {
        let now = self.current_time();
        let t = self.tones.get_mut(tone).ok_or(EngineError::UnknownTone)?;
        t.stop = Some(at);
        // A stop in the past ends the tone without waiting for a render
        if at <= now && !t.ended {
            t.ended = true;
            self.events.push(EngineEvent::ToneEnded(tone));
        }
        Ok(())
    }

    fn dispose_tone(&mut self, tone: ToneId) {
        self.tones.remove(tone);
    }

    fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratio::PitchRatio;
    use crate::voice::{VoiceManager, VoiceSettings};
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn peak(samples: &[f32]) -> f32 {
        samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }

    #[test]
    fn test_oscillator_shapes() {
        assert_abs_diff_eq!(oscillator(Waveform::Sine, 0.25), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(oscillator(Waveform::Triangle, 0.5), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(oscillator(Waveform::Triangle, 0.0), -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(oscillator(Waveform::Sawtooth, 0.0), -1.0, epsilon = 1e-12);
        assert_eq!(oscillator(Waveform::Square, 0.1), 1.0);
        assert_eq!(oscillator(Waveform::Square, 0.9), -1.0);
    }

    #[test]
    fn test_gain_ramp_interpolates() {
        let mut gain = GainAutomation::new(0.0);
        gain.set_value_at(0.0, 1.0);
        gain.ramp_to(1.0, 2.0, 1.0);
        assert_relative_eq!(gain.value_at(0.5), 0.0);
        assert_relative_eq!(gain.value_at(1.5), 0.5);
        assert_relative_eq!(gain.value_at(2.0), 1.0);
        assert_relative_eq!(gain.value_at(5.0), 1.0);
    }

    #[test]
    fn test_gain_hold_cancels_pending_ramp() {
        let mut gain = GainAutomation::new(0.0);
        gain.set_value_at(0.0, 0.0);
        gain.ramp_to(1.0, 1.0, 0.0);
        let held = gain.hold(0.25);
        assert_relative_eq!(held, 0.25);
        assert_relative_eq!(gain.value_at(0.9), 0.25);

        gain.ramp_to(0.0, 0.5, 0.25);
        assert_relative_eq!(gain.value_at(0.375), 0.125);
    }

    #[test]
    fn test_ramp_without_anchor_starts_now() {
        let mut gain = GainAutomation::new(0.5);
        gain.ramp_to(1.0, 2.0, 1.0);
        assert_relative_eq!(gain.value_at(1.0), 0.5);
        assert_relative_eq!(gain.value_at(1.5), 0.75);
    }

    #[test]
    fn test_suspended_engine_is_silent_and_frozen() {
        let mut synth = SynthBackend::new(1000.0).start_suspended();
        synth.open().unwrap();
        assert_eq!(synth.state(), BackendState::Suspended);

        let tone = synth.create_tone(100.0, Waveform::Square, 1.0).unwrap();
        synth.start_tone(tone, 0.0).unwrap();
        let out = synth.render_frames(100);
        assert_eq!(peak(&out), 0.0);
        assert_eq!(synth.current_time(), 0.0);

        synth.resume().unwrap();
        assert_eq!(
            synth.drain_events(),
            vec![EngineEvent::StateChanged(BackendState::Running)]
        );
        synth.set_master_gain(0.25);
        let out = synth.render_frames(100);
        assert!(peak(&out) > 0.2);
        assert_relative_eq!(synth.current_time(), 0.1);
    }

    #[test]
    fn test_quiet_signal_passes_limiter() {
        let mut synth = SynthBackend::new(8000.0);
        synth.open().unwrap();
        synth.set_master_gain(0.25);
        let tone = synth.create_tone(200.0, Waveform::Sine, 1.0).unwrap();
        synth.start_tone(tone, 0.0).unwrap();

        let out = synth.render_frames(8000);
        assert_abs_diff_eq!(peak(&out), 0.25, epsilon = 0.01);
        assert_eq!(synth.limiter().reduction_db(), 0.0);
    }

    #[test]
    fn test_limiter_tames_loud_signal() {
        let mut limiter = Limiter::new(8000.0);
        let mut last = 0.0;
        for _ in 0..8000 {
            last = limiter.process(4.0);
        }
        // 4.0 is about +12 dBFS; with ratio 20 it settles just above -3 dBFS
        let threshold = libm::pow(10.0, LIMITER_THRESHOLD_DB / 20.0);
        assert!(last < threshold * 1.5, "limited to {}", last);
        assert!(limiter.reduction_db() > 10.0);

        for _ in 0..80000 {
            limiter.process(0.0);
        }
        assert!(limiter.reduction_db() < 0.01);
    }

    #[test]
    fn test_stop_emits_tone_ended_once() {
        let mut synth = SynthBackend::new(1000.0);
        synth.open().unwrap();
        let tone = synth.create_tone(100.0, Waveform::Sine, 1.0).unwrap();
        synth.start_tone(tone, 0.0).unwrap();
        synth.stop_tone(tone, 0.05).unwrap();

        synth.render_frames(20);
        assert!(synth.drain_events().is_empty());
        synth.render_frames(40);
        assert_eq!(synth.drain_events(), vec![EngineEvent::ToneEnded(tone)]);
        synth.render_frames(40);
        assert!(synth.drain_events().is_empty());

        synth.dispose_tone(tone);
        assert_eq!(synth.tone_count(), 0);
        assert_eq!(synth.start_tone(tone, 0.0), Err(EngineError::UnknownTone));
    }

    #[test]
    fn test_immediate_stop_ends_without_render() {
        let mut synth = SynthBackend::default();
        synth.open().unwrap();
        let tone = synth.create_tone(440.0, Waveform::Sine, 0.0).unwrap();
        synth.start_tone(tone, 0.0).unwrap();
        synth.stop_tone(tone, 0.0).unwrap();
        assert_eq!(synth.drain_events(), vec![EngineEvent::ToneEnded(tone)]);
    }

    #[test]
    fn test_invalid_sample_rate_fails_to_open() {
        let mut synth = SynthBackend::new(0.0);
        assert!(matches!(synth.open(), Err(EngineError::Construction(_))));
    }

    #[test]
    fn test_close_is_reported() {
        let mut synth = SynthBackend::default();
        synth.open().unwrap();
        synth.close();
        assert_eq!(
            synth.drain_events(),
            vec![EngineEvent::StateChanged(BackendState::Closed)]
        );
        assert_eq!(synth.resume(), Err(EngineError::ResumeRejected));
    }

    #[test]
    fn test_voice_lifecycle_on_synth() {
        let mut vm = VoiceManager::with_settings(
            SynthBackend::new(8000.0),
            VoiceSettings {
                release_ms: 100.0,
                ..VoiceSettings::default()
            },
        );
        let key = PitchRatio::new(3, 2).unwrap().into();

        assert!(vm.note_on(key, 588.0));
        let out = vm.backend_mut().render_frames(800);
        assert!(peak(&out) > 0.1);

        vm.note_off(key);
        vm.process_events();
        assert_eq!(vm.active_count(), 0);
        assert_eq!(vm.releasing_count(), 1);

        vm.backend_mut().render_frames(1200);
        vm.process_events();
        assert_eq!(vm.releasing_count(), 0);
        assert_eq!(vm.backend().tone_count(), 0);

        let out = vm.backend_mut().render_frames(100);
        assert_eq!(peak(&out), 0.0);
    }
}
