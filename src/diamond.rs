//! Diamond Model
//!
//! Pairs every grid value against every other and describes each pairing
//! for presentation: reduced ratio, pitch identity, label, tooltip and
//! colors. Row values are denominators, column values numerators.
//!
//! The model is pure. Anything that depends on live configuration (label
//! mode, reference pitch) is passed in at call time, so a change to the
//! configuration is picked up by the next query.

use crate::color::{PrimeHueMap, TileColor};
use crate::grid::{build_grid, GridParams, GridSet};
use crate::ratio::{LabelMode, PitchKey, PitchRatio};
use serde::Serialize;
use std::collections::HashSet;

/// Presentation-facing pitch settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchContext {
    pub label_mode: LabelMode,
    pub reference_hz: f64,
}

/// Axis of a header tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    /// Left headers; a row shares its denominator
    Row,
    /// Top headers; a column shares its numerator
    Column,
}

/// Reference to one header tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct AxisRef {
    pub axis: Axis,
    pub index: usize,
}

impl AxisRef {
    pub fn row(index: usize) -> Self {
        Self {
            axis: Axis::Row,
            index,
        }
    }

    pub fn column(index: usize) -> Self {
        Self {
            axis: Axis::Column,
            index,
        }
    }
}

/// Position of a playable cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CellRef {
    pub row: usize,
    pub col: usize,
}

impl CellRef {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// Everything presentation needs to draw and play one cell
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cell {
    pub position: CellRef,
    /// Row value (denominator side)
    pub row_value: u64,
    /// Column value (numerator side)
    pub col_value: u64,
    /// Reduced `col_value / row_value`
    pub ratio: PitchRatio,
    /// Pitch identity under the active label mode
    pub key: PitchKey,
    /// Text shown on the tile
    pub label: String,
    /// Hover text: label, frequency and cents
    pub tooltip: String,
    /// Frequency sounded when the cell is played
    pub frequency_hz: f64,
    /// Cents of the sounded ratio
    pub cents: f64,
    /// Color of the numerator (column value)
    pub numerator_color: TileColor,
    /// Color of the denominator (row value)
    pub denominator_color: TileColor,
}

/// A header tile
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Header {
    pub axis: AxisRef,
    pub value: u64,
    pub color: TileColor,
}

/// A built diamond: the grid and its per-grid hue assignment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diamond {
    grid: GridSet,
    hues: PrimeHueMap,
}

impl Diamond {
    /// Wrap a grid, computing its hue assignment once
    pub fn new(grid: GridSet) -> Self {
        let hues = PrimeHueMap::for_values(grid.iter());
        Self { grid, hues }
    }

    /// Build the grid from parameters and wrap it
    pub fn from_params(params: &GridParams) -> Self {
        Self::new(build_grid(params))
    }

    pub fn grid(&self) -> &GridSet {
        &self.grid
    }

    pub fn hues(&self) -> &PrimeHueMap {
        &self.hues
    }

    /// Number of values per axis
    pub fn size(&self) -> usize {
        self.grid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grid.is_empty()
    }

    /// Color of a value in this grid
    pub fn color_for_value(&self, n: u64) -> TileColor {
        self.hues.color_for_value(n)
    }

    /// Reduced ratio of a cell
    pub fn ratio_at(&self, cell: CellRef) -> Option<PitchRatio> {
        let a = self.grid.get(cell.row)?;
        let b = self.grid.get(cell.col)?;
        PitchRatio::for_cell(a, b)
    }

    /// Pitch identity of a cell
    pub fn key_at(&self, cell: CellRef, mode: LabelMode) -> Option<PitchKey> {
        self.ratio_at(cell).map(|r| r.key(mode))
    }

    /// Label text for a cell
    pub fn label_at(&self, cell: CellRef, mode: LabelMode) -> Option<String> {
        let a = self.grid.get(cell.row)?;
        let b = self.grid.get(cell.col)?;
        let ratio = PitchRatio::for_cell(a, b)?;
        Some(label_for(a, b, ratio, mode))
    }

    /// Full description of a cell
    pub fn cell(&self, cell: CellRef, ctx: &PitchContext) -> Option<Cell> {
        let a = self.grid.get(cell.row)?;
        let b = self.grid.get(cell.col)?;
        let ratio = PitchRatio::for_cell(a, b)?;

        let label = label_for(a, b, ratio, ctx.label_mode);
        let sounding = ratio.sounding_value(ctx.label_mode);
        let frequency_hz = ctx.reference_hz * sounding;
        let cents = crate::ratio::CENTS_PER_OCTAVE * libm::log2(sounding);
        let tooltip = tooltip_text(&label, frequency_hz, cents);

        Some(Cell {
            position: cell,
            row_value: a,
            col_value: b,
            ratio,
            key: ratio.key(ctx.label_mode),
            label,
            tooltip,
            frequency_hz,
            cents,
            numerator_color: self.hues.color_for_value(b),
            denominator_color: self.hues.color_for_value(a),
        })
    }

    /// All cells in row-major order
    pub fn cells(&self, ctx: &PitchContext) -> Vec<Cell> {
        let n = self.size();
        let mut out = Vec::with_capacity(n * n);
        for row in 0..n {
            for col in 0..n {
                if let Some(cell) = self.cell(CellRef::new(row, col), ctx) {
                    out.push(cell);
                }
            }
        }
        out
    }

    /// Header tile description, with a softened color
    pub fn header(&self, axis: AxisRef) -> Option<Header> {
        let value = self.grid.get(axis.index)?;
        Some(Header {
            axis,
            value,
            color: self.hues.color_for_value(value).softened(),
        })
    }

    /// Row headers followed by column headers
    pub fn headers(&self) -> Vec<Header> {
        let n = self.size();
        (0..n)
            .map(AxisRef::row)
            .chain((0..n).map(AxisRef::column))
            .filter_map(|axis| self.header(axis))
            .collect()
    }

    /// Positions of every cell along a header's line
    pub fn line_cells(&self, axis: AxisRef) -> Vec<CellRef> {
        let n = self.size();
        if axis.index >= n {
            return Vec::new();
        }
        match axis.axis {
            Axis::Row => (0..n).map(|col| CellRef::new(axis.index, col)).collect(),
            Axis::Column => (0..n).map(|row| CellRef::new(row, axis.index)).collect(),
        }
    }

    /// Distinct pitch identities along a line, in line order
    pub fn line_keys(&self, axis: AxisRef, mode: LabelMode) -> Vec<PitchKey> {
        let mut seen = HashSet::new();
        self.line_cells(axis)
            .into_iter()
            .filter_map(|cell| self.key_at(cell, mode))
            .filter(|key| seen.insert(*key))
            .collect()
    }
}

/// Label text for the pair `(a, b)` with reduced ratio `ratio`
pub fn label_for(a: u64, b: u64, ratio: PitchRatio, mode: LabelMode) -> String {
    match mode {
        LabelMode::Rows => format!("{}/{}", b, a),
        LabelMode::Reduced => ratio.to_string(),
        LabelMode::Normalized => ratio.folded().to_string(),
    }
}

/// Tooltip text: `label • 588.00 Hz • +701.96¢`
pub fn tooltip_text(label: &str, frequency_hz: f64, cents: f64) -> String {
    let sign = if cents >= 0.0 { "+" } else { "" };
    format!("{} • {:.2} Hz • {}{:.2}¢", label, frequency_hz, sign, cents)
}
