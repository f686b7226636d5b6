//! Pitch Ratios and Canonical Keys
//!
//! A [`PitchRatio`] is a just-intonation interval in lowest terms. A
//! [`PitchKey`] is the identity used to decide whether two grid cells sound
//! the same note; which key a ratio maps to depends on the active
//! [`LabelMode`].

use crate::number::{fold_fraction, fold_to_octave, reduce, reduce_fraction};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cents per octave
pub const CENTS_PER_OCTAVE: f64 = 1200.0;

/// How cells are labelled, and which pitch identity they sound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "wasm", derive(tsify::Tsify))]
#[cfg_attr(feature = "wasm", tsify(into_wasm_abi, from_wasm_abi))]
#[serde(rename_all = "snake_case")]
pub enum LabelMode {
    /// Label and sound the reduced ratio
    Reduced,
    /// Label with the unreduced `column/row` pair, sound the reduced ratio
    Rows,
    /// Label and sound the ratio folded into the octave `[1, 2)`
    #[default]
    Normalized,
}

impl LabelMode {
    /// Whether sounding pitches are folded into a single octave
    pub fn folds_octaves(self) -> bool {
        matches!(self, LabelMode::Normalized)
    }
}

/// Just-intonation ratio `num/den` in lowest terms, both terms >= 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PitchRatio {
    num: u64,
    den: u64,
}

impl PitchRatio {
    /// Unison, `1/1`
    pub const UNISON: PitchRatio = PitchRatio { num: 1, den: 1 };

    /// Create a ratio, reducing it to lowest terms.
    ///
    /// Returns `None` when either term is zero.
    pub fn new(num: u64, den: u64) -> Option<Self> {
        if num == 0 || den == 0 {
            return None;
        }
        let (num, den) = reduce_fraction(num, den);
        Some(Self { num, den })
    }

    /// Ratio of the diamond cell at row value `a`, column value `b`: `b/a`
    pub fn for_cell(a: u64, b: u64) -> Option<Self> {
        if a == 0 || b == 0 {
            return None;
        }
        let (num, den) = reduce(a, b);
        Some(Self { num, den })
    }

    pub fn num(&self) -> u64 {
        self.num
    }

    pub fn den(&self) -> u64 {
        self.den
    }

    /// Real value `num / den`
    pub fn value(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Size of the interval in cents
    pub fn cents(&self) -> f64 {
        CENTS_PER_OCTAVE * libm::log2(self.value())
    }

    /// The same ratio folded into `[1, 2)`
    pub fn folded(&self) -> Self {
        let (num, den) = fold_fraction(self.num, self.den);
        Self { num, den }
    }

    /// Whether the ratio already lies in `[1, 2)`
    pub fn is_folded(&self) -> bool {
        self.num >= self.den && self.num < self.den.saturating_mul(2)
    }

    /// Canonical key under `mode`
    pub fn key(&self, mode: LabelMode) -> PitchKey {
        if mode.folds_octaves() {
            PitchKey(self.folded())
        } else {
            PitchKey(*self)
        }
    }

    /// Ratio actually sounded under `mode`
    pub fn sounding_value(&self, mode: LabelMode) -> f64 {
        if mode.folds_octaves() {
            fold_to_octave(self.value())
        } else {
            self.value()
        }
    }

    /// Frequency for a reference pitch under `mode`
    pub fn frequency(&self, reference_hz: f64, mode: LabelMode) -> f64 {
        reference_hz * self.sounding_value(mode)
    }
}

impl Default for PitchRatio {
    fn default() -> Self {
        Self::UNISON
    }
}

impl fmt::Display for PitchRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Pitch identity: the unit of deduplication for audio
///
/// Two cells whose keys are equal sound the same note, even if their raw
/// row/column pairs differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PitchKey(PitchRatio);

impl PitchKey {
    /// Key of the unison ratio, shared by every diagonal cell
    pub const UNISON: PitchKey = PitchKey(PitchRatio::UNISON);

    /// Ratio this key stands for
    pub fn ratio(&self) -> PitchRatio {
        self.0
    }

    /// Frequency of this key for a reference pitch.
    ///
    /// Keys are already folded when they come from a folding mode, so the
    /// ratio is used as-is.
    pub fn frequency(&self, reference_hz: f64) -> f64 {
        reference_hz * self.0.value()
    }
}

impl From<PitchRatio> for PitchKey {
    fn from(ratio: PitchRatio) -> Self {
        PitchKey(ratio)
    }
}

impl fmt::Display for PitchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
