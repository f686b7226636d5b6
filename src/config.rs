//! Session Configuration
//!
//! Every user-adjustable setting in one serializable record. The session
//! reads it at the moment of each action, so edits take effect on the next
//! note without rebuilding anything except the grid.

use crate::diamond::PitchContext;
use crate::grid::GridParams;
use crate::ratio::LabelMode;
use crate::voice::VoiceSettings;
use serde::{Deserialize, Serialize};

/// Default reference pitch (G4), in Hz
pub const DEFAULT_REFERENCE_HZ: f64 = 392.0;

/// Serializable session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "wasm", derive(tsify::Tsify))]
#[cfg_attr(feature = "wasm", tsify(into_wasm_abi, from_wasm_abi))]
#[serde(default)]
pub struct DiamondConfig {
    /// Schema version for forward compatibility
    pub version: u32,
    /// Frequency of `1/1`, in Hz
    pub reference_hz: f64,
    pub label_mode: LabelMode,
    pub voice: VoiceSettings,
    pub grid: GridParams,
}

impl Default for DiamondConfig {
    fn default() -> Self {
        Self {
            version: 1,
            reference_hz: DEFAULT_REFERENCE_HZ,
            label_mode: LabelMode::default(),
            voice: VoiceSettings::default(),
            grid: GridParams::default(),
        }
    }
}

impl DiamondConfig {
    /// Reference pitch, falling back to the default when unusable
    pub fn reference_hz(&self) -> f64 {
        if self.reference_hz.is_finite() && self.reference_hz > 0.0 {
            self.reference_hz
        } else {
            DEFAULT_REFERENCE_HZ
        }
    }

    /// Pitch settings for model queries and gestures
    pub fn pitch_context(&self) -> PitchContext {
        PitchContext {
            label_mode: self.label_mode,
            reference_hz: self.reference_hz(),
        }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON string; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
