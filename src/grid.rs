//! Grid Generation
//!
//! Derives the ordered set of integers that spans both axes of the diamond.
//! Two rules are supported:
//!
//! - **Limit**: odd integers up to an odd limit, optionally restricted to
//!   numbers that factor over the primes up to a prime limit.
//! - **Custom**: a free-form list of positive integers.
//!
//! Generation never fails. Malformed values are filtered to the nearest
//! sane value (or dropped), so the caller always gets something to render.
//! Every grid holds at most [`MAX_GRID_SIZE`] values, none above
//! [`MAX_GRID_VALUE`].

use crate::number::{factor_allowed, primes_up_to};
use serde::{Deserialize, Serialize};

/// Most values a grid may hold; the diamond renders `N x N` cells
pub const MAX_GRID_SIZE: usize = 256;

/// Largest odd limit, giving exactly [`MAX_GRID_SIZE`] odd values
pub const MAX_ODD_LIMIT: u64 = 2 * MAX_GRID_SIZE as u64 - 1;

/// Largest grid value: 2^53, the last integer a JS number holds exactly
pub const MAX_GRID_VALUE: u64 = 1 << 53;

/// Ordered sequence of distinct positive integers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GridSet(Vec<u64>);

impl GridSet {
    /// Build a set from arbitrary values, keeping the first occurrence of
    /// each value in `1..=MAX_GRID_VALUE`, up to [`MAX_GRID_SIZE`] of them.
    pub fn from_values<I: IntoIterator<Item = u64>>(values: I) -> Self {
        let mut out = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for n in values {
            if out.len() == MAX_GRID_SIZE {
                log::warn!("grid truncated to {} values", MAX_GRID_SIZE);
                break;
            }
            if (1..=MAX_GRID_VALUE).contains(&n) && seen.insert(n) {
                out.push(n);
            }
        }
        Self(out)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<u64> {
        self.0.get(index).copied()
    }

    pub fn values(&self) -> &[u64] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.0.iter().copied()
    }
}

impl AsRef<[u64]> for GridSet {
    fn as_ref(&self) -> &[u64] {
        &self.0
    }
}

/// Parameters selecting the generation rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "wasm", derive(tsify::Tsify))]
#[cfg_attr(feature = "wasm", tsify(into_wasm_abi, from_wasm_abi))]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum GridParams {
    /// Odd numbers up to `odd_limit`, optionally filtered by `prime_limit`
    Limit {
        odd_limit: i64,
        #[serde(default)]
        prime_limit: Option<i64>,
    },
    /// Free-form list; any run of non-digits separates entries
    Custom { text: String },
}

impl Default for GridParams {
    fn default() -> Self {
        GridParams::Limit {
            odd_limit: 9,
            prime_limit: None,
        }
    }
}

impl GridParams {
    /// Limit parameters from raw text fields.
    ///
    /// An unparseable odd limit becomes 1; an unparseable prime limit means
    /// "no prime filter".
    pub fn limit_from_text(odd_limit: &str, prime_limit: &str) -> Self {
        GridParams::Limit {
            odd_limit: parse_leading_int(odd_limit).unwrap_or(1),
            prime_limit: parse_leading_int(prime_limit),
        }
    }

    /// Custom-list parameters
    pub fn custom(text: impl Into<String>) -> Self {
        GridParams::Custom { text: text.into() }
    }
}

/// Build the grid for the given parameters
pub fn build_grid(params: &GridParams) -> GridSet {
    let grid = match params {
        GridParams::Limit {
            odd_limit,
            prime_limit,
        } => limit_set(*odd_limit, *prime_limit),
        GridParams::Custom { text } => parse_custom(text),
    };
    log::debug!("built grid of {} values from {:?}", grid.len(), params);
    grid
}

/// Normalize an odd limit: floored at 1, capped at [`MAX_ODD_LIMIT`],
/// decremented when even
pub fn normalize_odd_limit(limit: i64) -> u64 {
    let mut l = (limit.max(1) as u64).min(MAX_ODD_LIMIT);
    if l % 2 == 0 {
        l -= 1;
    }
    l
}

/// Odd integers in `[1, L]`, intersected with the `P`-limit when `P >= 2`
pub fn limit_set(odd_limit: i64, prime_limit: Option<i64>) -> GridSet {
    let l = normalize_odd_limit(odd_limit);
    let odds = (1..=l).step_by(2);

    match prime_limit {
        Some(p) if p >= 2 => {
            // No member exceeds L, so larger primes can never divide one.
            let allow = primes_up_to((p as u64).min(l));
            GridSet(odds.filter(|&n| factor_allowed(n, &allow)).collect())
        }
        _ => GridSet(odds.collect()),
    }
}

/// Parse a free-form list into unique positive integers in first-seen order
///
/// Any run of non-digit characters acts as a delimiter, so `"3.5.7"`,
/// `"3, 5, 7"` and `"3 5 7"` are equivalent. Entries above
/// [`MAX_GRID_VALUE`] are dropped, and only the first [`MAX_GRID_SIZE`]
/// distinct entries are kept.
pub fn parse_custom(text: &str) -> GridSet {
    let values = text
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<u64>().ok());
    GridSet::from_values(values)
}

/// Lenient integer parse: optional surrounding whitespace, optional sign,
/// then as many digits as are present. Trailing garbage is ignored;
/// no digits at all yields `None`. Overflow saturates.
pub fn parse_leading_int(text: &str) -> Option<i64> {
    let s = text.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let run: &str = {
        let end = digits
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(digits.len());
        &digits[..end]
    };
    if run.is_empty() {
        return None;
    }

    let magnitude = run.parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -magnitude } else { magnitude })
}
