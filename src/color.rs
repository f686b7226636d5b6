//! Prime-Family Coloring
//!
//! Every grid value is colored by its largest prime factor. The distinct
//! prime bases of a grid are spread evenly around the hue circle, and
//! multiples of a base share its hue while desaturating with distance:
//!
//! ```text
//! saturation = clamp(75 * 0.85^(k - 1), 28, 75),   k = round(n / p)
//! ```
//!
//! Unison (`n = 1`) is not hue-derived; it always gets a fixed neutral.

use crate::number::largest_prime_factor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Hue of the first (smallest) prime base, in degrees
pub const HUE_OFFSET: f64 = 17.0;

/// Saturation of a prime itself, in percent
pub const MAX_SATURATION: f64 = 75.0;

/// Saturation floor for distant multiples, in percent
pub const MIN_SATURATION: f64 = 28.0;

/// Per-step saturation decay with multiplicative distance
pub const SATURATION_DECAY: f64 = 0.85;

/// Lightness of every hue-derived tile, in percent
pub const LIGHTNESS: f64 = 60.0;

/// Lightness boost and ceiling for softened (header) tiles
pub const SOFTEN_BOOST: f64 = 22.0;
pub const SOFTEN_CEILING: f64 = 92.0;

/// The neutral unison color, `#f2f4f8`
pub const UNISON_RGB: (u8, u8, u8) = (0xf2, 0xf4, 0xf8);

/// An HSL color with hue in degrees and saturation/lightness in percent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hsl {
    pub hue: f64,
    pub saturation: f64,
    pub lightness: f64,
}

impl Hsl {
    pub fn new(hue: f64, saturation: f64, lightness: f64) -> Self {
        Self {
            hue,
            saturation,
            lightness,
        }
    }

    /// Lighter variant used for header tiles
    pub fn softened(&self) -> Self {
        Self {
            lightness: (self.lightness + SOFTEN_BOOST).min(SOFTEN_CEILING),
            ..*self
        }
    }
}

impl fmt::Display for Hsl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hsl({} {:.1}% {}%)",
            self.hue, self.saturation, self.lightness
        )
    }
}

/// Color of a tile
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TileColor {
    /// Fixed neutral for unison
    Unison,
    /// Hue-derived prime-family color
    Hsl(Hsl),
}

impl TileColor {
    /// Lighter variant for header tiles; unison is already light
    pub fn softened(&self) -> Self {
        match self {
            TileColor::Unison => TileColor::Unison,
            TileColor::Hsl(hsl) => TileColor::Hsl(hsl.softened()),
        }
    }

    /// HSL components, if hue-derived
    pub fn hsl(&self) -> Option<Hsl> {
        match self {
            TileColor::Unison => None,
            TileColor::Hsl(hsl) => Some(*hsl),
        }
    }
}

impl fmt::Display for TileColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileColor::Unison => {
                let (r, g, b) = UNISON_RGB;
                write!(f, "#{:02x}{:02x}{:02x}", r, g, b)
            }
            TileColor::Hsl(hsl) => hsl.fmt(f),
        }
    }
}

/// Hue assignment for the prime bases of one grid
///
/// Built once per grid: the distinct largest prime factors are sorted and
/// spaced `360 / count` degrees apart, starting at [`HUE_OFFSET`]. The map
/// is deliberately per-grid, so the same prime may get a different hue in
/// a different grid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrimeHueMap {
    hues: BTreeMap<u64, f64>,
}

impl PrimeHueMap {
    /// Compute the assignment for a set of grid values
    pub fn for_values<I: IntoIterator<Item = u64>>(values: I) -> Self {
        let mut hues = BTreeMap::new();
        for n in values {
            if n > 1 {
                hues.insert(largest_prime_factor(n), 0.0);
            }
        }

        let count = hues.len().max(1) as f64;
        for (i, hue) in hues.values_mut().enumerate() {
            *hue = (HUE_OFFSET + i as f64 * 360.0 / count) % 360.0;
        }

        Self { hues }
    }

    /// Assigned hue of a prime base, if the base occurs in the grid
    pub fn get(&self, prime: u64) -> Option<f64> {
        self.hues.get(&prime).copied()
    }

    /// Hue for a prime base, falling back to a fixed scatter for primes
    /// outside the grid
    pub fn hue_for_prime(&self, prime: u64) -> f64 {
        self.get(prime).unwrap_or_else(|| fallback_hue(prime))
    }

    /// Prime bases in ascending order with their hues
    pub fn iter(&self) -> impl Iterator<Item = (u64, f64)> + '_ {
        self.hues.iter().map(|(&p, &h)| (p, h))
    }

    pub fn len(&self) -> usize {
        self.hues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hues.is_empty()
    }

    /// Color for a grid value
    pub fn color_for_value(&self, n: u64) -> TileColor {
        if n <= 1 {
            return TileColor::Unison;
        }

        let p = largest_prime_factor(n);
        let hue = self.hue_for_prime(p);
        let k = multiplicative_distance(n, p);
        TileColor::Hsl(Hsl::new(hue, saturation_for_distance(k), LIGHTNESS))
    }
}

/// Scatter hue used for primes that have no grid assignment
pub fn fallback_hue(n: u64) -> f64 {
    ((n % 360) * 137 + 61) as f64 % 360.0
}

/// `round(n / p)`, at least 1
pub fn multiplicative_distance(n: u64, prime: u64) -> u64 {
    if prime == 0 {
        return 1;
    }
    (libm::round(n as f64 / prime as f64) as u64).max(1)
}

/// Saturation for multiplicative distance `k`
pub fn saturation_for_distance(k: u64) -> f64 {
    let steps = k.saturating_sub(1) as f64;
    (MAX_SATURATION * libm::pow(SATURATION_DECAY, steps)).clamp(MIN_SATURATION, MAX_SATURATION)
}

/// Shortest distance between two hues on the circle
pub fn circular_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).abs() % 360.0;
    d.min(360.0 - d)
}
