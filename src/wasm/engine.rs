//! DiamondEngine - Main WASM interface for a diamond session

use super::error::DiamondError;
use crate::config::DiamondConfig;
use crate::diamond::{Axis, AxisRef, CellRef};
use crate::engine::Waveform;
use crate::grid::GridParams;
use crate::ratio::LabelMode;
use crate::session::DiamondSession;
use crate::synth::SynthBackend;
use serde::Serialize;
use wasm_bindgen::prelude::*;

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(|e| DiamondError::from(e).into_js())
}

fn ms_to_secs(ms: f64) -> f64 {
    ms / 1000.0
}

fn cell_target(row: Option<u32>, col: Option<u32>) -> Option<CellRef> {
    match (row, col) {
        (Some(row), Some(col)) => Some(CellRef::new(row as usize, col as usize)),
        _ => None,
    }
}

fn parse_axis(axis: &str, index: u32) -> Result<AxisRef, JsValue> {
    let axis = match axis {
        "row" => Axis::Row,
        "column" | "col" => Axis::Column,
        other => {
            return Err(DiamondError::from(format!("Unknown axis: {}", other)).into_js());
        }
    };
    Ok(AxisRef {
        axis,
        index: index as usize,
    })
}

/// Main WASM interface: a diamond session over the software synth
#[wasm_bindgen]
pub struct DiamondEngine {
    session: DiamondSession<SynthBackend>,
    sample_rate: f64,
}

#[wasm_bindgen]
impl DiamondEngine {
    /// Create an engine with default settings.
    ///
    /// The synth opens suspended, like a browser AudioContext, and resumes
    /// on the first user interaction.
    #[wasm_bindgen(constructor)]
    pub fn new(sample_rate: f64) -> Self {
        // Initialize panic hook for better error messages
        console_error_panic_hook::set_once();

        let backend = SynthBackend::new(sample_rate).start_suspended();
        Self {
            session: DiamondSession::new(DiamondConfig::default(), backend),
            sample_rate,
        }
    }

    /// Get the sample rate
    #[wasm_bindgen(getter)]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Current configuration object
    pub fn get_config(&self) -> Result<JsValue, JsValue> {
        to_js(self.session.config())
    }

    /// Replace the configuration from an object
    pub fn set_config(&mut self, config: JsValue) -> Result<(), JsValue> {
        let config: DiamondConfig =
            serde_wasm_bindgen::from_value(config).map_err(|e| DiamondError::from(e).into_js())?;
        self.session.set_config(config);
        Ok(())
    }

    /// Replace the configuration from a JSON string
    pub fn load_config_json(&mut self, json: &str) -> Result<(), JsValue> {
        let config = DiamondConfig::from_json(json).map_err(|e| DiamondError::from(e).into_js())?;
        self.session.set_config(config);
        Ok(())
    }

    /// Current configuration as a JSON string
    pub fn save_config_json(&self) -> Result<String, JsValue> {
        self.session
            .config()
            .to_json()
            .map_err(|e| DiamondError::from(e).into_js())
    }

    pub fn set_reference_hz(&mut self, hz: f64) {
        let mut config = self.session.config().clone();
        config.reference_hz = hz;
        self.session.set_config(config);
    }

    /// Set the label mode: "reduced", "rows" or "normalized"
    pub fn set_label_mode(&mut self, mode: &str) -> Result<(), JsValue> {
        let label_mode = match mode {
            "reduced" | "raw" => LabelMode::Reduced,
            "rows" => LabelMode::Rows,
            "normalized" => LabelMode::Normalized,
            other => {
                return Err(DiamondError::from(format!("Unknown label mode: {}", other)).into_js())
            }
        };
        let mut config = self.session.config().clone();
        config.label_mode = label_mode;
        self.session.set_config(config);
        Ok(())
    }

    /// Set the oscillator type by Web Audio name
    pub fn set_waveform(&mut self, name: &str) -> Result<(), JsValue> {
        let waveform = Waveform::from_name(name)
            .ok_or_else(|| DiamondError::from(format!("Unknown waveform: {}", name)).into_js())?;
        let mut config = self.session.config().clone();
        config.voice.waveform = waveform;
        self.session.set_config(config);
        Ok(())
    }

    pub fn set_envelope(&mut self, attack_ms: f64, release_ms: f64) {
        let mut config = self.session.config().clone();
        config.voice.attack_ms = attack_ms;
        config.voice.release_ms = release_ms;
        self.session.set_config(config);
    }

    pub fn set_master_volume(&mut self, volume: f64) {
        let mut config = self.session.config().clone();
        config.voice.master_volume = volume;
        self.session.set_config(config);
    }

    /// Build the grid from the odd-limit and prime-limit text fields
    pub fn set_grid_limit(&mut self, odd_limit: &str, prime_limit: &str) {
        let mut config = self.session.config().clone();
        config.grid = GridParams::limit_from_text(odd_limit, prime_limit);
        self.session.set_config(config);
    }

    /// Build the grid from a free-form list
    pub fn set_grid_custom(&mut self, text: &str) {
        let mut config = self.session.config().clone();
        config.grid = GridParams::custom(text);
        self.session.set_config(config);
    }

    // =========================================================================
    // Model
    // =========================================================================

    /// Grid values in order
    pub fn grid_values(&self) -> Vec<f64> {
        self.session
            .diamond()
            .grid()
            .iter()
            .map(|n| n as f64)
            .collect()
    }

    /// All cells, row-major
    pub fn get_cells(&self) -> Result<JsValue, JsValue> {
        to_js(&self.session.cells())
    }

    /// Row headers followed by column headers
    pub fn get_headers(&self) -> Result<JsValue, JsValue> {
        to_js(&self.session.headers())
    }

    /// Cells whose pitch is currently sounding
    pub fn get_playing_cells(&self) -> Result<JsValue, JsValue> {
        to_js(&self.session.playing_cells())
    }

    // =========================================================================
    // Input
    // =========================================================================

    /// User interaction or explicit enable; returns whether audio runs
    pub fn enable(&mut self) -> bool {
        self.session.interact()
    }

    pub fn pointer_down(&mut self, pointer: i32, row: Option<u32>, col: Option<u32>, now_ms: f64) {
        self.session
            .pointer_down(pointer.into(), cell_target(row, col), ms_to_secs(now_ms));
    }

    pub fn pointer_move(&mut self, pointer: i32, row: Option<u32>, col: Option<u32>, now_ms: f64) {
        self.session
            .pointer_move(pointer.into(), cell_target(row, col), ms_to_secs(now_ms));
    }

    pub fn pointer_up(&mut self, pointer: i32) {
        self.session.pointer_up(pointer.into());
    }

    pub fn pointer_cancel(&mut self, pointer: i32) {
        self.session.pointer_cancel(pointer.into());
    }

    /// Header click; `axis` is "row" or "column"
    pub fn header_click(&mut self, axis: &str, index: u32, now_ms: f64) -> Result<(), JsValue> {
        let axis = parse_axis(axis, index)?;
        self.session.header_click(axis, ms_to_secs(now_ms));
        Ok(())
    }

    /// Sound a header's line at once
    pub fn chord(
        &mut self,
        axis: &str,
        index: u32,
        sustain: bool,
        now_ms: f64,
    ) -> Result<usize, JsValue> {
        let axis = parse_axis(axis, index)?;
        Ok(self.session.chord(axis, sustain, ms_to_secs(now_ms)))
    }

    pub fn set_modifier(&mut self, held: bool) {
        self.session.set_modifier(held);
    }

    /// Fire due timers; call from the UI loop
    pub fn advance(&mut self, now_ms: f64) -> usize {
        self.session.advance(ms_to_secs(now_ms))
    }

    pub fn panic(&mut self) {
        self.session.panic();
    }

    pub fn visibility_change(&mut self, hidden: bool) {
        self.session.on_visibility_change(hidden);
    }

    // =========================================================================
    // Engine
    // =========================================================================

    /// Banner text to show, if any
    pub fn notice(&self) -> Option<String> {
        self.session.notice().map(|n| n.message().to_string())
    }

    pub fn engine_state(&self) -> Result<JsValue, JsValue> {
        to_js(&self.session.engine_state())
    }

    pub fn active_voice_count(&self) -> usize {
        self.session.voices().active_count()
    }

    /// Render a block of mono samples for the AudioWorklet
    pub fn process_block(&mut self, num_samples: usize) -> js_sys::Float32Array {
        let block = self.session.backend_mut().render_frames(num_samples);
        self.session.voices_mut().process_events();
        js_sys::Float32Array::from(&block[..])
    }
}
