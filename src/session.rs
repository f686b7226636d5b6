//! Diamond Session
//!
//! [`DiamondSession`] is the single object a presentation layer talks to.
//! It owns the configuration, the built [`Diamond`], the
//! [`VoiceManager`] and the [`GestureController`], and forwards input
//! events between them with the live configuration applied.

use crate::config::DiamondConfig;
use crate::diamond::{AxisRef, Cell, CellRef, Diamond, Header};
use crate::engine::{AudioBackend, AudioEngineState, EngineNotice};
use crate::gesture::{GestureContext, GestureController, PointerId};
use crate::voice::VoiceManager;

/// One player's diamond, voices and gesture state
pub struct DiamondSession<B: AudioBackend> {
    config: DiamondConfig,
    diamond: Diamond,
    voices: VoiceManager<B>,
    gestures: GestureController,
}

impl<B: AudioBackend> DiamondSession<B> {
    pub fn new(config: DiamondConfig, backend: B) -> Self {
        let diamond = Diamond::from_params(&config.grid);
        let voices = VoiceManager::with_settings(backend, config.voice);
        log::info!("session started with a {}x{} diamond", diamond.size(), diamond.size());
        Self {
            config,
            diamond,
            voices,
            gestures: GestureController::new(),
        }
    }

    pub fn config(&self) -> &DiamondConfig {
        &self.config
    }

    /// Apply new settings.
    ///
    /// Voice settings apply from the next note (volume at once). A change
    /// of grid or label mode rebuilds the model and silences everything,
    /// since pitch identities and header positions no longer line up.
    pub fn set_config(&mut self, config: DiamondConfig) {
        let rebuild = config.grid != self.config.grid;
        let relabel = config.label_mode != self.config.label_mode;

        self.voices.set_settings(config.voice);
        self.config = config;

        if rebuild || relabel {
            self.panic();
        }
        if rebuild {
            self.diamond = Diamond::from_params(&self.config.grid);
            log::info!("grid rebuilt: {:?}", self.diamond.grid().values());
        }
    }

    pub fn diamond(&self) -> &Diamond {
        &self.diamond
    }

    pub fn voices(&self) -> &VoiceManager<B> {
        &self.voices
    }

    pub fn voices_mut(&mut self) -> &mut VoiceManager<B> {
        &mut self.voices
    }

    pub fn gestures(&self) -> &GestureController {
        &self.gestures
    }

    pub fn backend_mut(&mut self) -> &mut B {
        self.voices.backend_mut()
    }

    pub fn engine_state(&self) -> AudioEngineState {
        self.voices.state()
    }

    pub fn notice(&self) -> Option<EngineNotice> {
        self.voices.notice()
    }

    // =========================================================================
    // Model queries
    // =========================================================================

    pub fn cell(&self, cell: CellRef) -> Option<Cell> {
        self.diamond.cell(cell, &self.config.pitch_context())
    }

    pub fn cells(&self) -> Vec<Cell> {
        self.diamond.cells(&self.config.pitch_context())
    }

    pub fn headers(&self) -> Vec<Header> {
        self.diamond.headers()
    }

    /// Whether the pitch a cell sounds is currently sounding
    pub fn is_cell_playing(&self, cell: CellRef) -> bool {
        self.diamond
            .key_at(cell, self.config.label_mode)
            .is_some_and(|key| self.voices.is_active(&key))
    }

    /// Every cell whose pitch is sounding, row-major
    pub fn playing_cells(&self) -> Vec<CellRef> {
        let n = self.diamond.size();
        (0..n)
            .flat_map(|row| (0..n).map(move |col| CellRef::new(row, col)))
            .filter(|&cell| self.is_cell_playing(cell))
            .collect()
    }

    // =========================================================================
    // Input
    // =========================================================================

    fn with_gestures<R>(
        &mut self,
        f: impl FnOnce(&mut GestureController, &mut GestureContext<'_, B>) -> R,
    ) -> R {
        let mut cx = GestureContext::new(
            &self.diamond,
            self.config.pitch_context(),
            &mut self.voices,
        );
        f(&mut self.gestures, &mut cx)
    }

    /// Explicit enable action, or any other user interaction
    pub fn interact(&mut self) -> bool {
        self.voices.interact()
    }

    pub fn pointer_down(&mut self, pointer: PointerId, target: Option<CellRef>, now: f64) {
        self.with_gestures(|g, cx| g.pointer_down(cx, pointer, target, now));
    }

    pub fn pointer_move(&mut self, pointer: PointerId, target: Option<CellRef>, now: f64) {
        self.with_gestures(|g, cx| g.pointer_move(cx, pointer, target, now));
    }

    pub fn pointer_up(&mut self, pointer: PointerId) {
        self.gestures.pointer_up(pointer);
    }

    pub fn pointer_cancel(&mut self, pointer: PointerId) {
        self.gestures.pointer_cancel(pointer);
    }

    pub fn header_click(&mut self, axis: AxisRef, now: f64) {
        self.with_gestures(|g, cx| g.header_click(cx, axis, now));
    }

    pub fn chord(&mut self, axis: AxisRef, sustain: bool, now: f64) -> usize {
        self.with_gestures(|g, cx| g.chord(cx, axis, sustain, now))
    }

    pub fn arpeggio(&mut self, axis: AxisRef, step: f64, now: f64) -> usize {
        self.with_gestures(|g, cx| g.arpeggio(cx, axis, step, now))
    }

    pub fn set_modifier(&mut self, held: bool) {
        self.with_gestures(|g, cx| g.set_modifier(cx, held));
    }

    pub fn release_sustained(&mut self) {
        self.with_gestures(|g, cx| g.release_sustained(cx));
    }

    /// Fire due gesture timers and handle pending engine events
    pub fn advance(&mut self, now: f64) -> usize {
        self.voices.process_events();
        self.with_gestures(|g, cx| g.advance(cx, now))
    }

    /// Silence everything. Idempotent.
    pub fn panic(&mut self) {
        self.with_gestures(|g, cx| g.panic(cx));
    }

    pub fn on_visibility_change(&mut self, hidden: bool) {
        if hidden {
            self.panic();
        } else {
            self.voices.on_visibility_change(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::FakeBackend;
    use crate::grid::GridParams;
    use crate::ratio::LabelMode;

    fn session() -> DiamondSession<FakeBackend> {
        let config = DiamondConfig {
            grid: GridParams::limit_from_text("5", ""),
            ..DiamondConfig::default()
        };
        DiamondSession::new(config, FakeBackend::running())
    }

    #[test]
    fn test_model_follows_config() {
        let s = session();
        assert_eq!(s.diamond().grid().values(), &[1, 3, 5]);
        assert_eq!(s.cells().len(), 9);
        assert_eq!(s.headers().len(), 6);
        assert_eq!(s.cell(CellRef::new(1, 0)).unwrap().label, "4/3");
    }

    #[test]
    fn test_playing_cells_follow_pitch_identity() {
        let mut s = session();
        s.pointer_down(1, Some(CellRef::new(0, 0)), 0.0);

        // Every diagonal cell is unison, so all light up together
        let playing = s.playing_cells();
        assert_eq!(
            playing,
            vec![CellRef::new(0, 0), CellRef::new(1, 1), CellRef::new(2, 2)]
        );

        s.advance(1.0);
        assert!(s.playing_cells().is_empty());
    }

    #[test]
    fn test_grid_change_rebuilds_and_silences() {
        let mut s = session();
        s.chord(AxisRef::row(0), true, 0.0);
        assert_eq!(s.voices().active_count(), 3);

        let config = DiamondConfig {
            grid: GridParams::custom("1 7"),
            ..s.config().clone()
        };
        s.set_config(config);
        assert_eq!(s.voices().active_count(), 0);
        assert_eq!(s.diamond().grid().values(), &[1, 7]);
        assert_eq!(s.gestures().sustained_count(), 0);
    }

    #[test]
    fn test_voice_change_keeps_notes() {
        let mut s = session();
        s.chord(AxisRef::row(0), true, 0.0);

        let mut config = s.config().clone();
        config.voice.master_volume = 0.4;
        s.set_config(config);
        assert_eq!(s.voices().active_count(), 3);
        assert_eq!(s.voices().backend().master_gain, 0.4);
    }

    #[test]
    fn test_label_mode_change_silences() {
        let mut s = session();
        s.chord(AxisRef::row(0), true, 0.0);
        let config = DiamondConfig {
            label_mode: LabelMode::Reduced,
            ..s.config().clone()
        };
        s.set_config(config);
        assert_eq!(s.voices().active_count(), 0);
        assert_eq!(s.cell(CellRef::new(1, 0)).unwrap().label, "1/3");
    }

    #[test]
    fn test_hidden_page_panics() {
        let mut s = session();
        s.set_modifier(true);
        s.pointer_down(1, Some(CellRef::new(0, 1)), 0.0);
        assert!(s.is_cell_playing(CellRef::new(0, 1)));

        s.on_visibility_change(true);
        assert!(!s.is_cell_playing(CellRef::new(0, 1)));
        assert_eq!(s.gestures().sustained_count(), 0);
    }

    #[test]
    fn test_notice_surfaces_from_engine() {
        let mut s = DiamondSession::new(DiamondConfig::default(), FakeBackend::suspended(false));
        assert!(s.notice().is_none());
        assert!(!s.interact());
        assert_eq!(s.notice(), Some(EngineNotice::Disabled));
        assert_eq!(s.engine_state(), AudioEngineState::Suspended);
    }
}
