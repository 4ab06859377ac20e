//! Bit-matrix codec for the live-state grids (pressed buttons, lit LEDs).
//!
//! Two wire shapes exist across device variants:
//! - `SingleInteger`: one `u64` for the whole grid, bit `row * cols + col`.
//! - `PackedRows`: an array with one `u64` per row, bit `col` of entry `row`.
//!
//! The layout is always declared by the caller, never inferred from the
//! value. All bit arithmetic is done on `u64` so 8x8 grids keep bit 63.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of bits in one wire word.
pub const WORD_BITS: usize = 64;

/// How a grid is packed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    PackedRows,
    SingleInteger,
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PackedRows => f.write_str("packed_rows"),
            Self::SingleInteger => f.write_str("single_integer"),
        }
    }
}

/// A bitfield as it appears in a `liveStatus` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireBits {
    Single(u64),
    Rows(Vec<u64>),
}

/// Dimensions and packing of one live-state grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridShape {
    rows: u8,
    cols: u8,
    layout: Layout,
}

impl GridShape {
    /// # Errors
    /// Returns `SyncError::EmptyGrid` for a zero dimension and
    /// `SyncError::GridTooLarge` if the grid cannot be addressed by the layout.
    pub fn new(rows: u8, cols: u8, layout: Layout) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(SyncError::EmptyGrid);
        }
        let fits = match layout {
            Layout::SingleInteger => usize::from(rows) * usize::from(cols) <= WORD_BITS,
            Layout::PackedRows => usize::from(cols) <= WORD_BITS,
        };
        if !fits {
            return Err(SyncError::GridTooLarge { rows, cols, layout });
        }
        Ok(Self { rows, cols, layout })
    }

    pub fn rows(&self) -> usize {
        usize::from(self.rows)
    }

    pub fn cols(&self) -> usize {
        usize::from(self.cols)
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }
}

/// A rectangular grid of on/off cells, stored row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    rows: usize,
    cols: usize,
    cells: Vec<bool>,
}

impl Grid {
    /// An all-off grid.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![false; rows * cols],
        }
    }

    /// Build a grid from row-major cells. Missing cells are off, extra cells dropped.
    pub fn from_cells(rows: usize, cols: usize, cells: impl IntoIterator<Item = bool>) -> Self {
        let mut grid = Self::new(rows, cols);
        for (slot, value) in grid.cells.iter_mut().zip(cells) {
            *slot = value;
        }
        grid
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Cell state; cells outside the grid read as off.
    pub fn get(&self, row: usize, col: usize) -> bool {
        if row >= self.rows || col >= self.cols {
            return false;
        }
        self.cells[row * self.cols + col]
    }

    /// Set a cell. Out-of-range writes are ignored.
    pub fn set(&mut self, row: usize, col: usize, on: bool) {
        if row < self.rows && col < self.cols {
            self.cells[row * self.cols + col] = on;
        }
    }

    /// Cells of one row, left to right. Empty for a row outside the grid.
    pub fn iter_row(&self, row: usize) -> impl Iterator<Item = bool> + '_ {
        let cells: &[bool] = if row < self.rows {
            &self.cells[row * self.cols..(row + 1) * self.cols]
        } else {
            &[][..]
        };
        cells.iter().copied()
    }

    pub fn count_set(&self) -> usize {
        self.cells.iter().filter(|&&on| on).count()
    }

    /// All cells in row-major order.
    pub fn cells(&self) -> &[bool] {
        &self.cells
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..self.rows {
            if row > 0 {
                f.write_str("/")?;
            }
            for on in self.iter_row(row) {
                f.write_str(if on { "#" } else { "." })?;
            }
        }
        Ok(())
    }
}

/// Decode a wire bitfield into a grid of the given shape.
///
/// Rows missing from a packed-rows array decode as off; bits beyond the grid
/// are ignored.
///
/// # Errors
/// Returns `SyncError::LayoutMismatch` if the wire value has the other shape.
pub fn decode(wire: &WireBits, shape: &GridShape) -> Result<Grid> {
    let mut grid = Grid::new(shape.rows(), shape.cols());

    match (shape.layout, wire) {
        (Layout::SingleInteger, WireBits::Single(bits)) => {
            for (i, cell) in grid.cells.iter_mut().enumerate() {
                *cell = (bits >> i) & 1 == 1;
            }
        }
        (Layout::PackedRows, WireBits::Rows(words)) => {
            for (row, bits) in words.iter().take(shape.rows()).enumerate() {
                for col in 0..shape.cols() {
                    grid.set(row, col, (bits >> col) & 1 == 1);
                }
            }
        }
        (layout, _) => return Err(SyncError::LayoutMismatch(layout)),
    }

    Ok(grid)
}

/// Encode a grid into the wire shape for `layout`.
///
/// With `SingleInteger` only the first 64 cells are representable; with
/// `PackedRows` only the first 64 columns of each row.
pub fn encode(grid: &Grid, layout: Layout) -> WireBits {
    match layout {
        Layout::SingleInteger => WireBits::Single(pack(grid.cells.iter().copied())),
        Layout::PackedRows => {
            WireBits::Rows((0..grid.rows).map(|r| pack(grid.iter_row(r))).collect())
        }
    }
}

fn pack(cells: impl Iterator<Item = bool>) -> u64 {
    cells
        .take(WORD_BITS)
        .enumerate()
        .filter(|(_, on)| *on)
        .fold(0u64, |acc, (i, _)| acc | (1u64 << i))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn shape(rows: u8, cols: u8, layout: Layout) -> GridShape {
        GridShape::new(rows, cols, layout).unwrap()
    }

    #[test]
    fn single_integer_bit_zero_is_column_zero() {
        let grid = decode(
            &WireBits::Single(0b101),
            &shape(1, 3, Layout::SingleInteger),
        )
        .unwrap();
        assert_eq!(grid.cells(), &[true, false, true]);
    }

    #[test]
    fn single_integer_is_row_major() {
        // 5x5 pendant matrix: bit 7 = row 1, col 2.
        let grid = decode(
            &WireBits::Single(1 << 7),
            &shape(5, 5, Layout::SingleInteger),
        )
        .unwrap();
        assert!(grid.get(1, 2));
        assert_eq!(grid.count_set(), 1);
    }

    #[test]
    fn packed_rows_use_one_word_per_row() {
        let grid = decode(
            &WireBits::Rows(vec![0b0000_0001, 0b1000_0000]),
            &shape(2, 8, Layout::PackedRows),
        )
        .unwrap();
        assert!(grid.get(0, 0));
        assert!(grid.get(1, 7));
        assert_eq!(grid.count_set(), 2);
    }

    #[test]
    fn full_8x8_keeps_the_top_bit() {
        let grid = decode(
            &WireBits::Single(1 << 63),
            &shape(8, 8, Layout::SingleInteger),
        )
        .unwrap();
        assert!(grid.get(7, 7));
        assert_eq!(encode(&grid, Layout::SingleInteger), WireBits::Single(1 << 63));
    }

    #[test]
    fn short_row_array_leaves_missing_rows_off() {
        let grid = decode(
            &WireBits::Rows(vec![0xff]),
            &shape(3, 4, Layout::PackedRows),
        )
        .unwrap();
        assert_eq!(grid.count_set(), 4);
        assert!(!grid.get(2, 0));
    }

    #[test]
    fn bits_outside_the_grid_are_ignored() {
        let grid = decode(
            &WireBits::Single(u64::MAX),
            &shape(2, 2, Layout::SingleInteger),
        )
        .unwrap();
        assert_eq!(grid.count_set(), 4);
    }

    #[test]
    fn out_of_range_cell_reads_off() {
        let grid = Grid::from_cells(1, 1, [true]);
        assert!(grid.get(0, 0));
        assert!(!grid.get(0, 1));
        assert!(!grid.get(9, 9));
        assert_eq!(grid.iter_row(4).count(), 0);
    }

    #[test]
    fn mismatched_wire_shape_is_rejected() {
        let err = decode(&WireBits::Single(1), &shape(8, 8, Layout::PackedRows)).unwrap_err();
        assert!(matches!(err, SyncError::LayoutMismatch(Layout::PackedRows)));

        let err = decode(
            &WireBits::Rows(vec![1]),
            &shape(1, 8, Layout::SingleInteger),
        )
        .unwrap_err();
        assert!(matches!(err, SyncError::LayoutMismatch(Layout::SingleInteger)));
    }

    #[test]
    fn shape_limits() {
        assert!(GridShape::new(8, 8, Layout::SingleInteger).is_ok());
        assert!(matches!(
            GridShape::new(9, 8, Layout::SingleInteger),
            Err(SyncError::GridTooLarge { .. })
        ));
        assert!(GridShape::new(16, 64, Layout::PackedRows).is_ok());
        assert!(matches!(
            GridShape::new(0, 3, Layout::PackedRows),
            Err(SyncError::EmptyGrid)
        ));
    }

    #[test]
    fn wire_bits_parse_both_json_shapes() {
        let single: WireBits = serde_json::from_str("5").unwrap();
        assert_eq!(single, WireBits::Single(5));
        let rows: WireBits = serde_json::from_str("[1, 0, 255]").unwrap();
        assert_eq!(rows, WireBits::Rows(vec![1, 0, 255]));
        let wide: WireBits = serde_json::from_str("18446744073709551615").unwrap();
        assert_eq!(wide, WireBits::Single(u64::MAX));
    }

    #[test]
    fn display_marks_set_cells() {
        let grid = Grid::from_cells(2, 2, [true, false, false, true]);
        assert_eq!(grid.to_string(), "#./.#");
    }

    fn dims() -> impl Strategy<Value = (u8, u8)> {
        (1u8..=64).prop_flat_map(|rows| (Just(rows), 1u8..=(64 / rows)))
    }

    proptest! {
        #[test]
        fn round_trip_single_integer((rows, cols) in dims(), bits in any::<u64>()) {
            let shape = shape(rows, cols, Layout::SingleInteger);
            let len = shape.rows() * shape.cols();
            let cells: Vec<bool> = (0..len).map(|i| (bits >> i) & 1 == 1).collect();
            let grid = Grid::from_cells(shape.rows(), shape.cols(), cells);
            let decoded = decode(&encode(&grid, Layout::SingleInteger), &shape).unwrap();
            prop_assert_eq!(decoded, grid);
        }

        #[test]
        fn round_trip_packed_rows((rows, cols) in dims(), seed in proptest::collection::vec(any::<bool>(), 64)) {
            let shape = shape(rows, cols, Layout::PackedRows);
            let grid = Grid::from_cells(shape.rows(), shape.cols(), seed);
            let decoded = decode(&encode(&grid, Layout::PackedRows), &shape).unwrap();
            prop_assert_eq!(decoded, grid);
        }
    }
}
