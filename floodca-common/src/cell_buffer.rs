/*
Dense per-cell storage bound to a Grid. Generalizes the bordered
dense-array idiom of `structures::array2d::Array2D` with the fill/insert/
retrieve/reduce/border contract of the CADDIES CellBuff type.
*/

use crate::geom::{Box, BoxList, Grid, BORDER};

/// Reduction operators for [`CellBuffer::sequential_op`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReduceOp {
    Add,
    Mul,
    Min,
    MinAbs,
    Max,
    MaxAbs,
}

impl ReduceOp {
    /// The accumulator's starting value before any cell is folded in.
    pub fn initial(self) -> f64 {
        match self {
            ReduceOp::Add => 0.0,
            ReduceOp::Mul => 1.0,
            ReduceOp::Min | ReduceOp::MinAbs => f64::INFINITY,
            ReduceOp::Max => f64::NEG_INFINITY,
            ReduceOp::MaxAbs => 0.0,
        }
    }

    fn apply(self, acc: f64, v: f64) -> f64 {
        match self {
            ReduceOp::Add => acc + v,
            ReduceOp::Mul => acc * v,
            ReduceOp::Min => acc.min(v),
            ReduceOp::MinAbs => acc.min(v.abs()),
            ReduceOp::Max => acc.max(v),
            ReduceOp::MaxAbs => acc.max(v.abs()),
        }
    }
}

/// Update operators for [`CellBuffer::borders_value`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BorderOp {
    Equal,
    Add,
    Sub,
    Mul,
    Div,
}

/// One side of the border ring.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    North,
    South,
    East,
    West,
}

/// A set of border segments (ranges along one side, in interior-index
/// coordinates) plus a flag for whether the four corner border cells are
/// addressed as well.
#[derive(Clone, Debug, Default)]
pub struct Borders {
    segments: Vec<(Side, isize, isize)>,
    corners: bool,
}

impl Borders {
    pub fn new() -> Borders {
        Borders::default()
    }

    pub fn with_corners(mut self, yes: bool) -> Borders {
        self.corners = yes;
        self
    }

    pub fn segment(mut self, side: Side, start: isize, end: isize) -> Borders {
        self.segments.push((side, start, end));
        self
    }

    /// All four sides in full, corners included — the "whole border ring"
    /// case used by most reflective/open-boundary stencils.
    pub fn full(grid: &Grid) -> Borders {
        Borders::new()
            .segment(Side::North, 0, grid.nx())
            .segment(Side::South, 0, grid.nx())
            .segment(Side::West, 0, grid.ny())
            .segment(Side::East, 0, grid.ny())
            .with_corners(true)
    }
}

/// Dense `(nx+2b) x (ny+2b)` storage for one value per cell, addressed by
/// interior-relative coordinates; negative indices or indices `>= nx`/`>=
/// ny` reach into the border ring, out-of-range indices return `nodata`.
#[derive(Clone, Debug)]
pub struct CellBuffer<T> {
    grid: Grid,
    nodata: T,
    data: Vec<T>,
}

impl<T: Copy> CellBuffer<T> {
    pub fn new(grid: Grid, nodata: T) -> CellBuffer<T> {
        let len = (grid.alloc_width() * grid.alloc_height()) as usize;
        CellBuffer {
            grid,
            nodata,
            data: vec![nodata; len],
        }
    }

    pub fn grid(&self) -> Grid {
        self.grid
    }

    pub fn nodata(&self) -> T {
        self.nodata
    }

    fn index(&self, x: isize, y: isize) -> Option<usize> {
        let w = self.grid.alloc_width();
        let h = self.grid.alloc_height();
        let cx = x + BORDER;
        let cy = y + BORDER;
        if cx < 0 || cx >= w || cy < 0 || cy >= h {
            return None;
        }
        Some((cy * w + cx) as usize)
    }

    pub fn get(&self, x: isize, y: isize) -> T {
        match self.index(x, y) {
            Some(i) => self.data[i],
            None => self.nodata,
        }
    }

    pub fn set(&mut self, x: isize, y: isize, v: T) {
        if let Some(i) = self.index(x, y) {
            self.data[i] = v;
        }
    }

    /// Sets interior cells within each box of `boxlist` to `v`; the border
    /// ring is untouched.
    pub fn fill(&mut self, boxlist: &BoxList, v: T) {
        for b in boxlist.boxes() {
            for y in b.top()..b.bottom() {
                for x in b.left()..b.right() {
                    self.set(x, y, v);
                }
            }
        }
    }

    /// Sets every allocated cell, including the border ring, to `v`.
    pub fn clear(&mut self, v: T) {
        self.data.iter_mut().for_each(|c| *c = v);
    }

    /// Writes `src` (row-major, `sw x sh`) into the interior cells of
    /// `target`. If `target`'s size matches `src`'s exactly, it is a plain
    /// copy. If `target.w()`/`target.h()` are clean integer multiples of
    /// `sw`/`sh`, each source cell is broadcast to the corresponding
    /// `(target.w()/sw) x (target.h()/sh)` block of destination cells
    /// (clean integer upsampling). Any other size mismatch is silently
    /// refused.
    pub fn insert_data(&mut self, target: Box, src: &[T], sw: isize, sh: isize) {
        if target.is_empty() || sw <= 0 || sh <= 0 {
            return;
        }
        if src.len() != (sw * sh) as usize {
            return;
        }
        if target.w() == sw && target.h() == sh {
            for y in 0..sh {
                for x in 0..sw {
                    let v = src[(y * sw + x) as usize];
                    self.set(target.x() + x, target.y() + y, v);
                }
            }
            return;
        }
        if target.w() % sw != 0 || target.h() % sh != 0 {
            return;
        }
        let scale_x = target.w() / sw;
        let scale_y = target.h() / sh;
        for sy in 0..sh {
            for sx in 0..sw {
                let v = src[(sy * sw + sx) as usize];
                for by in 0..scale_y {
                    for bx in 0..scale_x {
                        let x = target.x() + sx * scale_x + bx;
                        let y = target.y() + sy * scale_y + by;
                        self.set(x, y, v);
                    }
                }
            }
        }
    }

    /// Reads the interior cells of `source` into a row-major `Vec<T>` of
    /// exactly `source.w() x source.h()` elements (the inverse of
    /// `insert_data`'s exact-match case; no downsampling).
    pub fn retrieve_data(&self, source: Box) -> Vec<T> {
        let mut out = Vec::with_capacity(source.area().max(0) as usize);
        for y in source.top()..source.bottom() {
            for x in source.left()..source.right() {
                out.push(self.get(x, y));
            }
        }
        out
    }
}

impl CellBuffer<f64> {
    /// Reduces the interior cells inside every box of `boxlist` with `op`,
    /// starting from `op.initial()`.
    pub fn sequential_op(&self, boxlist: &BoxList, op: ReduceOp) -> f64 {
        let mut acc = op.initial();
        for b in boxlist.boxes() {
            for y in b.top()..b.bottom() {
                for x in b.left()..b.right() {
                    acc = op.apply(acc, self.get(x, y));
                }
            }
        }
        acc
    }

    fn border_cells(&self, borders: &Borders) -> Vec<(isize, isize)> {
        let nx = self.grid.nx();
        let ny = self.grid.ny();
        let mut cells = Vec::new();
        for (side, start, end) in &borders.segments {
            match side {
                Side::North => cells.extend((*start..*end).map(|x| (x, -1))),
                Side::South => cells.extend((*start..*end).map(|x| (x, ny))),
                Side::West => cells.extend((*start..*end).map(|y| (-1, y))),
                Side::East => cells.extend((*start..*end).map(|y| (nx, y))),
            }
        }
        if borders.corners {
            cells.push((-1, -1));
            cells.push((nx, -1));
            cells.push((-1, ny));
            cells.push((nx, ny));
        }
        cells
    }

    /// Applies `op` to every border cell addressed by `borders`, using `v`
    /// as the right-hand operand (`Equal` overwrites; `Add`/`Sub`/`Mul`/
    /// `Div` update the existing value in place; `Div` by zero is a no-op).
    pub fn borders_value(&mut self, borders: &Borders, v: f64, op: BorderOp) {
        for (x, y) in self.border_cells(borders) {
            let cur = self.get(x, y);
            let new = match op {
                BorderOp::Equal => v,
                BorderOp::Add => cur + v,
                BorderOp::Sub => cur - v,
                BorderOp::Mul => cur * v,
                BorderOp::Div => {
                    if v == 0.0 {
                        cur
                    } else {
                        cur / v
                    }
                }
            };
            self.set(x, y, new);
        }
    }

    /// Copies the innermost interior cell adjacent to each addressed border
    /// cell into that border cell — open/reflective boundary emulation of
    /// outflow at the domain edge.
    pub fn borders_shift(&mut self, borders: &Borders) {
        let nx = self.grid.nx();
        let ny = self.grid.ny();
        let mut writes = Vec::new();
        for (side, start, end) in &borders.segments {
            match side {
                Side::North => writes.extend((*start..*end).map(|x| ((x, -1), self.get(x, 0)))),
                Side::South => {
                    writes.extend((*start..*end).map(|x| ((x, ny), self.get(x, ny - 1))))
                }
                Side::West => writes.extend((*start..*end).map(|y| ((-1, y), self.get(0, y)))),
                Side::East => {
                    writes.extend((*start..*end).map(|y| ((nx, y), self.get(nx - 1, y))))
                }
            }
        }
        if borders.corners {
            writes.push(((-1, -1), self.get(0, 0)));
            writes.push(((nx, -1), self.get(nx - 1, 0)));
            writes.push(((-1, ny), self.get(0, ny - 1)));
            writes.push(((nx, ny), self.get(nx - 1, ny - 1)));
        }
        for ((x, y), v) in writes {
            self.set(x, y, v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_grid() -> Grid {
        Grid::new(4, 3, 10.0, 0.0, 0.0)
    }

    #[test]
    fn get_set_round_trip_and_nodata_default() {
        let grid = small_grid();
        let mut buf = CellBuffer::new(grid, -9999.0);
        assert_eq!(buf.get(0, 0), -9999.0);
        buf.set(2, 1, 3.5);
        assert_eq!(buf.get(2, 1), 3.5);
        // out of range always reads nodata, never panics
        assert_eq!(buf.get(100, 100), -9999.0);
    }

    #[test]
    fn fill_touches_only_listed_interior_cells() {
        let grid = small_grid();
        let mut buf = CellBuffer::new(grid, 0.0);
        let list = BoxList::from_box(Box::new(1, 0, 2, 2));
        buf.fill(&list, 7.0);
        assert_eq!(buf.get(1, 0), 7.0);
        assert_eq!(buf.get(2, 1), 7.0);
        assert_eq!(buf.get(0, 0), 0.0);
        assert_eq!(buf.get(-1, -1), 0.0); // border ring untouched
    }

    #[test]
    fn clear_touches_border_ring_too() {
        let grid = small_grid();
        let mut buf = CellBuffer::new(grid, 0.0);
        buf.clear(5.0);
        assert_eq!(buf.get(-1, -1), 5.0);
        assert_eq!(buf.get(0, 0), 5.0);
    }

    #[test]
    fn insert_data_exact_size_is_plain_copy() {
        let grid = small_grid();
        let mut buf = CellBuffer::new(grid, 0.0);
        let target = Box::new(0, 0, 2, 2);
        buf.insert_data(target, &[1.0, 2.0, 3.0, 4.0], 2, 2);
        assert_eq!(buf.get(0, 0), 1.0);
        assert_eq!(buf.get(1, 0), 2.0);
        assert_eq!(buf.get(0, 1), 3.0);
        assert_eq!(buf.get(1, 1), 4.0);
    }

    #[test]
    fn insert_data_clean_upsample_broadcasts_blocks() {
        let grid = Grid::new(4, 2, 10.0, 0.0, 0.0);
        let mut buf = CellBuffer::new(grid, 0.0);
        let target = Box::new(0, 0, 4, 2);
        // 2x1 source upsampled to a 4x2 target: each source cell covers a
        // 2x2 destination block.
        buf.insert_data(target, &[9.0, 1.0], 2, 1);
        assert_eq!(buf.get(0, 0), 9.0);
        assert_eq!(buf.get(1, 0), 9.0);
        assert_eq!(buf.get(0, 1), 9.0);
        assert_eq!(buf.get(1, 1), 9.0);
        assert_eq!(buf.get(2, 0), 1.0);
        assert_eq!(buf.get(3, 1), 1.0);
    }

    #[test]
    fn insert_data_refuses_non_clean_mismatch() {
        let grid = small_grid();
        let mut buf = CellBuffer::new(grid, -1.0);
        let target = Box::new(0, 0, 3, 2); // 3 is not a multiple of 2
        buf.insert_data(target, &[1.0, 2.0], 2, 1);
        // refused: buffer stays at nodata everywhere in the target
        for y in 0..2 {
            for x in 0..3 {
                assert_eq!(buf.get(x, y), -1.0);
            }
        }
    }

    #[test]
    fn retrieve_data_reads_back_what_was_written() {
        let grid = small_grid();
        let mut buf = CellBuffer::new(grid, 0.0);
        let b = Box::new(1, 1, 2, 2);
        buf.insert_data(b, &[1.0, 2.0, 3.0, 4.0], 2, 2);
        assert_eq!(buf.retrieve_data(b), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn sequential_op_add_and_max() {
        let grid = small_grid();
        let mut buf = CellBuffer::new(grid, 0.0);
        buf.set(0, 0, 1.0);
        buf.set(1, 0, -5.0);
        buf.set(2, 0, 3.0);
        let list = BoxList::from_box(grid.full_box());
        assert_eq!(buf.sequential_op(&list, ReduceOp::Add), -1.0);
        assert_eq!(buf.sequential_op(&list, ReduceOp::Max), 3.0);
        assert_eq!(buf.sequential_op(&list, ReduceOp::MinAbs), 0.0);
    }

    #[test]
    fn borders_value_equal_overwrites_addressed_cells_only() {
        let grid = small_grid();
        let mut buf = CellBuffer::new(grid, 0.0);
        let borders = Borders::full(&grid);
        buf.borders_value(&borders, 42.0, BorderOp::Equal);
        assert_eq!(buf.get(0, -1), 42.0); // north
        assert_eq!(buf.get(-1, -1), 42.0); // corner
        assert_eq!(buf.get(0, 0), 0.0); // interior untouched
    }

    #[test]
    fn borders_shift_copies_innermost_interior_row() {
        let grid = small_grid();
        let mut buf = CellBuffer::new(grid, 0.0);
        buf.set(0, 0, 11.0);
        buf.set(1, 0, 12.0);
        let borders = Borders::new().segment(Side::North, 0, grid.nx());
        buf.borders_shift(&borders);
        assert_eq!(buf.get(0, -1), 11.0);
        assert_eq!(buf.get(1, -1), 12.0);
    }
}
