//! Gesture Controller
//!
//! Turns pointer trajectories, header clicks and modifier state into note
//! requests on a [`VoiceManager`].
//!
//! # Gestures
//!
//! - **Drag**: one active pointer; a new press takes the gesture over.
//!   Every newly entered playable cell sounds once per gesture and is
//!   released after [`release_delay`], or joins the sustain set while the
//!   modifier is held.
//! - **Chord**: modifier + header click sounds the line's distinct pitches
//!   together, sustained until the modifier is released.
//! - **Arpeggio**: a plain header click arms that header for
//!   [`ARM_WINDOW`] seconds; a second click inside the window plays the
//!   line in order, with the time between the clicks as the step. The
//!   first note sounds one step after the second click.
//!
//! Nothing here reads a wall clock. Every entry point takes `now` in
//! seconds, and deferred work lives in explicit timers fired by
//! [`GestureController::advance`].

use crate::diamond::{AxisRef, CellRef, Diamond, PitchContext};
use crate::engine::AudioBackend;
use crate::ratio::PitchKey;
use crate::voice::{VoiceManager, VoiceSettings};
use slotmap::{new_key_type, SlotMap};
use std::collections::{BTreeSet, HashMap, HashSet};

/// How long an armed header waits for its second click, in seconds
pub const ARM_WINDOW: f64 = 2.0;

/// Arpeggio step bounds, in seconds
pub const MIN_ARPEGGIO_STEP: f64 = 0.040;
pub const MAX_ARPEGGIO_STEP: f64 = 1.2;

/// Extra time a played note is held beyond the release setting
pub const RELEASE_MARGIN: f64 = 0.040;

/// Platform pointer identifier
pub type PointerId = i64;

new_key_type! {
    /// Handle to a pending timer
    pub struct TimerId;
}

/// Delay between a transient note-on and its note-off, in seconds
pub fn release_delay(settings: &VoiceSettings) -> f64 {
    let release_ms = if settings.release_ms.is_finite() {
        settings.release_ms
    } else {
        0.0
    };
    release_ms.max(10.0) / 1000.0 + RELEASE_MARGIN
}

/// Arpeggio step for two clicks `elapsed` seconds apart
pub fn arpeggio_step(elapsed: f64) -> f64 {
    if elapsed.is_nan() {
        return MIN_ARPEGGIO_STEP;
    }
    elapsed.clamp(MIN_ARPEGGIO_STEP, MAX_ARPEGGIO_STEP)
}

/// What a gesture acts on: the model, the live pitch settings and the
/// voices
pub struct GestureContext<'a, B: AudioBackend> {
    pub diamond: &'a Diamond,
    pub pitch: PitchContext,
    pub voices: &'a mut VoiceManager<B>,
}

impl<'a, B: AudioBackend> GestureContext<'a, B> {
    pub fn new(diamond: &'a Diamond, pitch: PitchContext, voices: &'a mut VoiceManager<B>) -> Self {
        Self {
            diamond,
            pitch,
            voices,
        }
    }

    fn sound(&mut self, key: PitchKey) -> bool {
        let frequency = key.frequency(self.pitch.reference_hz);
        self.voices.note_on(key, frequency)
    }
}

/// Arm state of one header
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArmState {
    Idle,
    /// First click seen at `at`; `timer` disarms when the window closes
    Armed { at: f64, timer: TimerId },
}

#[derive(Debug, Clone, PartialEq)]
enum TimerAction {
    Release(PitchKey),
    Play(PitchKey),
    Disarm(AxisRef),
}

#[derive(Debug, Clone)]
struct Timer {
    due: f64,
    seq: u64,
    action: TimerAction,
}

#[derive(Debug, Clone)]
struct Drag {
    pointer: PointerId,
    /// Pitches already sounded by this gesture
    touched: HashSet<PitchKey>,
}

/// Gesture state for one session
#[derive(Debug, Default)]
pub struct GestureController {
    drag: Option<Drag>,
    modifier: bool,
    sustained: BTreeSet<PitchKey>,
    arms: HashMap<AxisRef, ArmState>,
    timers: SlotMap<TimerId, Timer>,
    next_seq: u64,
    seen_panic_epoch: u64,
}

impl GestureController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn modifier_held(&self) -> bool {
        self.modifier
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Keys held by the modifier, ascending
    pub fn sustained(&self) -> impl Iterator<Item = PitchKey> + '_ {
        self.sustained.iter().copied()
    }

    pub fn sustained_count(&self) -> usize {
        self.sustained.len()
    }

    pub fn arm_state(&self, axis: AxisRef) -> ArmState {
        self.arms.get(&axis).copied().unwrap_or(ArmState::Idle)
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Due time of the earliest pending timer
    pub fn next_due(&self) -> Option<f64> {
        self.timers.values().map(|t| t.due).reduce(f64::min)
    }

    fn schedule(&mut self, due: f64, action: TimerAction) -> TimerId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.timers.insert(Timer { due, seq, action })
    }

    /// Forget per-gesture state if the voices were panicked behind our back
    fn observe_panic<B: AudioBackend>(&mut self, cx: &GestureContext<'_, B>) {
        let epoch = cx.voices.panic_epoch();
        if epoch != self.seen_panic_epoch {
            self.seen_panic_epoch = epoch;
            self.sustained.clear();
            self.timers.clear();
            self.arms.clear();
            if let Some(drag) = self.drag.as_mut() {
                drag.touched.clear();
            }
            log::debug!("gesture state cleared by panic");
        }
    }

    // =========================================================================
    // Drag
    // =========================================================================

    /// Pointer pressed, over `target` if it is a playable cell.
    ///
    /// Starts a fresh gesture, replacing any drag still in progress.
    pub fn pointer_down<B: AudioBackend>(
        &mut self,
        cx: &mut GestureContext<'_, B>,
        pointer: PointerId,
        target: Option<CellRef>,
        now: f64,
    ) {
        self.observe_panic(cx);
        cx.voices.interact();

        self.drag = Some(Drag {
            pointer,
            touched: HashSet::new(),
        });
        if let Some(cell) = target {
            self.enter_cell(cx, cell, now);
        }
    }

    /// Pointer moved, now over `target`
    pub fn pointer_move<B: AudioBackend>(
        &mut self,
        cx: &mut GestureContext<'_, B>,
        pointer: PointerId,
        target: Option<CellRef>,
        now: f64,
    ) {
        self.observe_panic(cx);
        if !self.drag.as_ref().is_some_and(|d| d.pointer == pointer) {
            return;
        }
        if let Some(cell) = target {
            self.enter_cell(cx, cell, now);
        }
    }

    /// Pointer released; ends the gesture
    pub fn pointer_up(&mut self, pointer: PointerId) {
        if self.drag.as_ref().is_some_and(|d| d.pointer == pointer) {
            self.drag = None;
        }
    }

    /// Pointer cancelled by the platform; ends the gesture like a release
    pub fn pointer_cancel(&mut self, pointer: PointerId) {
        self.pointer_up(pointer);
    }

    fn enter_cell<B: AudioBackend>(
        &mut self,
        cx: &mut GestureContext<'_, B>,
        cell: CellRef,
        now: f64,
    ) {
        let Some(key) = cx.diamond.key_at(cell, cx.pitch.label_mode) else {
            return;
        };
        let Some(drag) = self.drag.as_mut() else {
            return;
        };
        if !drag.touched.insert(key) {
            return;
        }

        cx.sound(key);
        self.hold_or_release(cx, key, now);
    }

    fn hold_or_release<B: AudioBackend>(
        &mut self,
        cx: &GestureContext<'_, B>,
        key: PitchKey,
        now: f64,
    ) {
        if self.modifier {
            self.sustained.insert(key);
        } else {
            let delay = release_delay(cx.voices.settings());
            self.schedule(now + delay, TimerAction::Release(key));
        }
    }

    // =========================================================================
    // Modifier and sustain
    // =========================================================================

    /// Modifier key went down or up. Letting go releases everything it
    /// sustained.
    pub fn set_modifier<B: AudioBackend>(&mut self, cx: &mut GestureContext<'_, B>, held: bool) {
        self.observe_panic(cx);
        let was_held = self.modifier;
        self.modifier = held;
        if held {
            cx.voices.interact();
        } else if was_held {
            self.release_sustained(cx);
        }
    }

    /// Release every sustained key
    pub fn release_sustained<B: AudioBackend>(&mut self, cx: &mut GestureContext<'_, B>) {
        self.observe_panic(cx);
        for key in std::mem::take(&mut self.sustained) {
            cx.voices.note_off(key);
        }
    }

    // =========================================================================
    // Headers
    // =========================================================================

    /// Header tile clicked
    pub fn header_click<B: AudioBackend>(
        &mut self,
        cx: &mut GestureContext<'_, B>,
        axis: AxisRef,
        now: f64,
    ) {
        self.observe_panic(cx);
        cx.voices.interact();

        if self.modifier {
            self.chord(cx, axis, true, now);
            return;
        }

        match self.arm_state(axis) {
            ArmState::Armed { at, timer } if now - at <= ARM_WINDOW => {
                self.timers.remove(timer);
                self.arms.remove(&axis);
                self.arpeggio(cx, axis, arpeggio_step(now - at), now);
            }
            ArmState::Armed { timer, .. } => {
                // Window lapsed before its timer fired; this click re-arms
                self.timers.remove(timer);
                self.arm(axis, now);
            }
            ArmState::Idle => self.arm(axis, now),
        }
    }

    fn arm(&mut self, axis: AxisRef, now: f64) {
        let timer = self.schedule(now + ARM_WINDOW, TimerAction::Disarm(axis));
        self.arms.insert(axis, ArmState::Armed { at: now, timer });
        log::debug!("armed {:?} {}", axis.axis, axis.index);
    }

    /// Sound every distinct pitch on a header's line at once.
    ///
    /// Sustained chords wait for the modifier release; otherwise they share
    /// one release after the usual delay. Returns the number of pitches.
    pub fn chord<B: AudioBackend>(
        &mut self,
        cx: &mut GestureContext<'_, B>,
        axis: AxisRef,
        sustain: bool,
        now: f64,
    ) -> usize {
        self.observe_panic(cx);
        let keys = cx.diamond.line_keys(axis, cx.pitch.label_mode);
        let delay = release_delay(cx.voices.settings());

        for &key in &keys {
            cx.sound(key);
            if sustain {
                self.sustained.insert(key);
            } else {
                self.schedule(now + delay, TimerAction::Release(key));
            }
        }
        log::debug!("chord of {} pitches", keys.len());
        keys.len()
    }

    /// Play a header's line in order, `step` seconds apart, the first note
    /// one step from now. Returns the number of pitches scheduled.
    pub fn arpeggio<B: AudioBackend>(
        &mut self,
        cx: &mut GestureContext<'_, B>,
        axis: AxisRef,
        step: f64,
        now: f64,
    ) -> usize {
        self.observe_panic(cx);
        let keys = cx.diamond.line_keys(axis, cx.pitch.label_mode);
        for (i, &key) in keys.iter().enumerate() {
            self.schedule(now + (i + 1) as f64 * step, TimerAction::Play(key));
        }
        log::debug!("arpeggio of {} pitches, step {:.3}s", keys.len(), step);
        self.advance(cx, now);
        keys.len()
    }

    // =========================================================================
    // Time
    // =========================================================================

    /// Fire every timer due at or before `now`, earliest first.
    ///
    /// Work scheduled by a firing timer is timed from that timer's due time,
    /// so the outcome does not depend on how often this is called. Returns
    /// the number of timers fired.
    pub fn advance<B: AudioBackend>(&mut self, cx: &mut GestureContext<'_, B>, now: f64) -> usize {
        self.observe_panic(cx);
        let mut fired = 0;

        while let Some(id) = self.next_timer(now) {
            let Some(timer) = self.timers.remove(id) else {
                break;
            };
            fired += 1;

            match timer.action {
                TimerAction::Release(key) => {
                    // A key the modifier has since captured stays held
                    if !self.sustained.contains(&key) {
                        cx.voices.note_off(key);
                    }
                }
                TimerAction::Play(key) => {
                    cx.sound(key);
                    let delay = release_delay(cx.voices.settings());
                    self.schedule(timer.due + delay, TimerAction::Release(key));
                }
                TimerAction::Disarm(axis) => {
                    if let Some(ArmState::Armed { timer: t, .. }) = self.arms.get(&axis) {
                        if *t == id {
                            self.arms.remove(&axis);
                        }
                    }
                }
            }
        }

        fired
    }

    fn next_timer(&self, now: f64) -> Option<TimerId> {
        self.timers
            .iter()
            .filter(|(_, t)| t.due <= now)
            .min_by(|(_, a), (_, b)| a.due.total_cmp(&b.due).then(a.seq.cmp(&b.seq)))
            .map(|(id, _)| id)
    }

    /// Silence everything and drop all pending gesture work. Idempotent.
    pub fn panic<B: AudioBackend>(&mut self, cx: &mut GestureContext<'_, B>) {
        cx.voices.panic();
        self.observe_panic(cx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::FakeBackend;
    use crate::grid::{GridParams, GridSet};
    use crate::ratio::{LabelMode, PitchRatio};
    use approx::assert_abs_diff_eq;

    fn key(n: u64, d: u64) -> PitchKey {
        PitchRatio::new(n, d).unwrap().into()
    }

    struct Rig {
        diamond: Diamond,
        voices: VoiceManager<FakeBackend>,
        gestures: GestureController,
    }

    impl Rig {
        fn new(diamond: Diamond) -> Self {
            Self {
                diamond,
                voices: VoiceManager::new(FakeBackend::running()),
                gestures: GestureController::new(),
            }
        }

        fn five_limit() -> Self {
            Self::new(Diamond::from_params(&GridParams::limit_from_text("5", "")))
        }

        /// Run `f` with a normalized-mode context at 392 Hz
        fn with<R>(
            &mut self,
            f: impl FnOnce(&mut GestureController, &mut GestureContext<'_, FakeBackend>) -> R,
        ) -> R {
            let mut cx = GestureContext::new(
                &self.diamond,
                PitchContext {
                    label_mode: LabelMode::Normalized,
                    reference_hz: 392.0,
                },
                &mut self.voices,
            );
            f(&mut self.gestures, &mut cx)
        }
    }

    #[test]
    fn test_release_delay_and_step() {
        let settings = VoiceSettings::default();
        assert_abs_diff_eq!(release_delay(&settings), 0.29, epsilon = 1e-9);
        let short = VoiceSettings {
            release_ms: 0.0,
            ..settings
        };
        assert_abs_diff_eq!(release_delay(&short), 0.05, epsilon = 1e-9);

        assert_abs_diff_eq!(arpeggio_step(0.001), 0.04, epsilon = 1e-9);
        assert_abs_diff_eq!(arpeggio_step(0.3), 0.3, epsilon = 1e-9);
        assert_abs_diff_eq!(arpeggio_step(1.9), 1.2, epsilon = 1e-9);
    }

    #[test]
    fn test_drag_sounds_each_pitch_once() {
        let mut rig = Rig::five_limit();
        rig.with(|g, cx| {
            // (0,1) = 3/1 -> 3/2, (1,0) = 1/3 -> 4/3
            g.pointer_down(cx, 1, Some(CellRef::new(0, 1)), 0.0);
            g.pointer_move(cx, 1, Some(CellRef::new(0, 1)), 0.01);
            g.pointer_move(cx, 1, Some(CellRef::new(1, 0)), 0.02);
            g.pointer_move(cx, 1, None, 0.03);
            g.pointer_move(cx, 1, Some(CellRef::new(0, 1)), 0.04);
        });

        assert!(rig.voices.is_active(&key(3, 2)));
        assert!(rig.voices.is_active(&key(4, 3)));
        assert_eq!(rig.voices.active_count(), 2);
        assert_eq!(rig.gestures.pending_timers(), 2);

        let voice = rig.voices.voice(&key(3, 2)).unwrap();
        assert_abs_diff_eq!(voice.frequency, 588.0, epsilon = 1e-9);
    }

    #[test]
    fn test_drag_releases_after_delay() {
        let mut rig = Rig::five_limit();
        rig.with(|g, cx| {
            g.pointer_down(cx, 1, Some(CellRef::new(0, 1)), 0.0);
            g.advance(cx, 0.28);
        });
        assert!(rig.voices.is_active(&key(3, 2)));

        let fired = rig.with(|g, cx| g.advance(cx, 0.30));
        assert_eq!(fired, 1);
        assert_eq!(rig.voices.active_count(), 0);
    }

    #[test]
    fn test_reentry_needs_new_gesture() {
        let mut rig = Rig::five_limit();
        rig.with(|g, cx| {
            g.pointer_down(cx, 1, Some(CellRef::new(0, 1)), 0.0);
            g.advance(cx, 1.0);
            g.pointer_move(cx, 1, Some(CellRef::new(0, 1)), 1.0);
        });
        assert_eq!(rig.voices.active_count(), 0);

        rig.with(|g, cx| {
            g.pointer_up(1);
            g.pointer_down(cx, 1, Some(CellRef::new(0, 1)), 2.0);
        });
        assert!(rig.voices.is_active(&key(3, 2)));
    }

    #[test]
    fn test_octave_equivalents_dedup_within_gesture() {
        // 1, 2 and 4 are all unison once folded
        let mut rig = Rig::new(Diamond::new(GridSet::from_values([1, 2, 4])));
        rig.with(|g, cx| {
            g.pointer_down(cx, 1, Some(CellRef::new(0, 0)), 0.0);
            g.pointer_move(cx, 1, Some(CellRef::new(0, 1)), 0.0);
            g.pointer_move(cx, 1, Some(CellRef::new(0, 2)), 0.0);
        });
        assert_eq!(rig.voices.active_count(), 1);
        assert_eq!(rig.gestures.pending_timers(), 1);
    }

    #[test]
    fn test_new_pointer_takes_over_gesture() {
        let mut rig = Rig::five_limit();
        rig.with(|g, cx| {
            g.pointer_down(cx, 1, Some(CellRef::new(0, 1)), 0.0);
            g.pointer_down(cx, 2, Some(CellRef::new(1, 0)), 0.0);
            // The first pointer no longer drives the gesture
            g.pointer_move(cx, 1, Some(CellRef::new(0, 2)), 0.0);
        });
        // 3/2 from pointer 1, 4/3 from pointer 2
        assert_eq!(rig.voices.active_count(), 2);
        assert!(!rig.voices.is_active(&key(5, 4)));

        rig.gestures.pointer_up(1);
        assert!(rig.gestures.is_dragging());

        rig.with(|g, cx| g.pointer_move(cx, 2, Some(CellRef::new(0, 2)), 0.0));
        assert!(rig.voices.is_active(&key(5, 4)));

        rig.gestures.pointer_cancel(2);
        assert!(!rig.gestures.is_dragging());
    }

    #[test]
    fn test_new_press_resets_touched_cells() {
        let mut rig = Rig::five_limit();
        rig.with(|g, cx| {
            g.pointer_down(cx, 1, Some(CellRef::new(0, 1)), 0.0);
            g.advance(cx, 1.0);
            // Same pitch again without lifting: a fresh gesture sounds it
            g.pointer_down(cx, 2, Some(CellRef::new(0, 1)), 1.0);
        });
        assert!(rig.voices.is_active(&key(3, 2)));
    }

    #[test]
    fn test_modifier_sustains_until_released() {
        let mut rig = Rig::five_limit();
        rig.with(|g, cx| {
            g.set_modifier(cx, true);
            g.pointer_down(cx, 1, Some(CellRef::new(0, 1)), 0.0);
            g.pointer_move(cx, 1, Some(CellRef::new(0, 2)), 0.0);
            g.pointer_up(1);
            g.advance(cx, 10.0);
        });
        assert_eq!(rig.voices.active_count(), 2);
        assert_eq!(rig.gestures.sustained_count(), 2);
        assert_eq!(rig.gestures.pending_timers(), 0);

        rig.with(|g, cx| g.set_modifier(cx, false));
        assert_eq!(rig.voices.active_count(), 0);
        assert_eq!(rig.gestures.sustained_count(), 0);
    }

    #[test]
    fn test_modifier_chord_on_header() {
        let mut rig = Rig::five_limit();
        rig.with(|g, cx| {
            g.set_modifier(cx, true);
            g.header_click(cx, AxisRef::row(0), 0.0);
        });
        // Row 0 of [1, 3, 5]: 1/1, 3/1 -> 3/2, 5/1 -> 5/4
        for k in [key(1, 1), key(3, 2), key(5, 4)] {
            assert!(rig.voices.is_active(&k));
        }
        assert_eq!(rig.gestures.arm_state(AxisRef::row(0)), ArmState::Idle);

        rig.with(|g, cx| g.set_modifier(cx, false));
        assert_eq!(rig.voices.active_count(), 0);
    }

    #[test]
    fn test_chord_dedups_by_pitch() {
        let mut rig = Rig::new(Diamond::new(GridSet::from_values([1, 2, 4])));
        let count = rig.with(|g, cx| g.chord(cx, AxisRef::column(2), false, 0.0));
        assert_eq!(count, 1);
        assert_eq!(rig.voices.active_count(), 1);

        rig.with(|g, cx| g.advance(cx, 1.0));
        assert_eq!(rig.voices.active_count(), 0);
    }

    #[test]
    fn test_double_click_plays_arpeggio() {
        let mut rig = Rig::five_limit();
        rig.with(|g, cx| g.header_click(cx, AxisRef::row(0), 0.0));
        assert!(matches!(
            rig.gestures.arm_state(AxisRef::row(0)),
            ArmState::Armed { .. }
        ));
        assert_eq!(rig.voices.active_count(), 0);

        // Step 0.3s; notes due at 0.6, 0.9 and 1.2
        rig.with(|g, cx| g.header_click(cx, AxisRef::row(0), 0.3));
        assert_eq!(rig.gestures.arm_state(AxisRef::row(0)), ArmState::Idle);
        assert_eq!(rig.voices.active_count(), 0);
        assert_eq!(rig.gestures.pending_timers(), 3);

        rig.with(|g, cx| g.advance(cx, 0.65));
        assert!(rig.voices.is_active(&key(1, 1)));
        assert_eq!(rig.voices.active_count(), 1);

        // First note released at 0.6 + 0.29
        rig.with(|g, cx| g.advance(cx, 0.95));
        assert!(!rig.voices.is_active(&key(1, 1)));
        assert!(rig.voices.is_active(&key(3, 2)));

        rig.with(|g, cx| g.advance(cx, 1.25));
        assert!(rig.voices.is_active(&key(5, 4)));

        rig.with(|g, cx| g.advance(cx, 5.0));
        assert_eq!(rig.voices.active_count(), 0);
        assert_eq!(rig.gestures.pending_timers(), 0);
    }

    #[test]
    fn test_fast_double_click_uses_min_step() {
        let mut rig = Rig::five_limit();
        rig.with(|g, cx| {
            g.header_click(cx, AxisRef::column(1), 0.0);
            g.header_click(cx, AxisRef::column(1), 0.001);
        });
        let next = rig.gestures.next_due().unwrap();
        assert_abs_diff_eq!(next, 0.001 + MIN_ARPEGGIO_STEP, epsilon = 1e-9);
    }

    #[test]
    fn test_arm_window_expires() {
        let mut rig = Rig::five_limit();
        rig.with(|g, cx| {
            g.header_click(cx, AxisRef::row(1), 0.0);
            g.advance(cx, 2.1);
        });
        assert_eq!(rig.gestures.arm_state(AxisRef::row(1)), ArmState::Idle);

        rig.with(|g, cx| g.header_click(cx, AxisRef::row(1), 2.2));
        assert_eq!(rig.voices.active_count(), 0);
        assert!(matches!(
            rig.gestures.arm_state(AxisRef::row(1)),
            ArmState::Armed { at, .. } if at == 2.2
        ));
    }

    #[test]
    fn test_late_second_click_rearms() {
        let mut rig = Rig::five_limit();
        rig.with(|g, cx| {
            g.header_click(cx, AxisRef::row(2), 0.0);
            g.header_click(cx, AxisRef::row(2), 3.0);
        });
        assert_eq!(rig.voices.active_count(), 0);
        assert_eq!(rig.gestures.pending_timers(), 1);
    }

    #[test]
    fn test_headers_arm_independently() {
        let mut rig = Rig::five_limit();
        rig.with(|g, cx| {
            g.header_click(cx, AxisRef::row(0), 0.0);
            g.header_click(cx, AxisRef::column(0), 0.1);
        });
        assert_eq!(rig.voices.active_count(), 0);
        assert!(matches!(
            rig.gestures.arm_state(AxisRef::row(0)),
            ArmState::Armed { .. }
        ));
        assert!(matches!(
            rig.gestures.arm_state(AxisRef::column(0)),
            ArmState::Armed { .. }
        ));
    }

    #[test]
    fn test_panic_cancels_pending_work() {
        let mut rig = Rig::five_limit();
        rig.with(|g, cx| {
            g.set_modifier(cx, true);
            g.pointer_down(cx, 1, Some(CellRef::new(0, 1)), 0.0);
            g.set_modifier(cx, false);
            g.header_click(cx, AxisRef::row(0), 0.0);
            g.header_click(cx, AxisRef::row(0), 0.5);
            g.panic(cx);
        });
        assert_eq!(rig.voices.active_count(), 0);
        assert_eq!(rig.gestures.pending_timers(), 0);
        assert_eq!(rig.gestures.sustained_count(), 0);

        rig.with(|g, cx| g.panic(cx));
        assert_eq!(rig.voices.active_count(), 0);
    }

    #[test]
    fn test_external_panic_clears_sustain() {
        let mut rig = Rig::five_limit();
        rig.with(|g, cx| {
            g.set_modifier(cx, true);
            g.pointer_down(cx, 1, Some(CellRef::new(0, 1)), 0.0);
        });
        assert_eq!(rig.gestures.sustained_count(), 1);

        rig.voices.on_visibility_change(true);
        rig.with(|g, cx| g.advance(cx, 0.1));
        assert_eq!(rig.gestures.sustained_count(), 0);
        assert_eq!(rig.voices.active_count(), 0);
    }

    #[test]
    fn test_dropped_engine_leaves_no_voices() {
        let mut rig = Rig::five_limit();
        rig.voices = VoiceManager::new(FakeBackend::suspended(false));
        rig.with(|g, cx| {
            g.pointer_down(cx, 1, Some(CellRef::new(0, 1)), 0.0);
            g.advance(cx, 1.0);
        });
        assert_eq!(rig.voices.active_count(), 0);
        assert!(rig.voices.notice().is_some());
    }
}
