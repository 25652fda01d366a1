/*
Per-cell validity state derived from an elevation buffer's nodata pattern,
grounded on the CADDIES `createCellMask`/"boundary cell" discussion: a
nodata cell with at least one data neighbour is kept in the domain as a
flux-receiving boundary cell rather than dropped outright.
*/

use crate::cell_buffer::CellBuffer;
use crate::geom::Box;

/// Bit index for each of the four von Neumann neighbours within a
/// [`Mask`] entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Neighbour {
    North = 0,
    East = 1,
    South = 2,
    West = 3,
}

const NEIGHBOURS: [Neighbour; 4] = [
    Neighbour::North,
    Neighbour::East,
    Neighbour::South,
    Neighbour::West,
];

/// Auxiliary bit marking a boundary cell: the cell itself is nodata but at
/// least one neighbour holds data.
const BOUNDARY_BIT: u32 = 31;

/// Auxiliary bit marking that the cell's own elevation is data (not
/// nodata). Kept separate from the neighbour bits 0–3 so a cell with
/// valid data but zero data neighbours (an isolated pixel, or a DEM edge
/// whose von-Neumann neighbours all happen to be nodata) is still
/// distinguishable from a true void cell by [`Mask::is_void`].
const SELF_DATA_BIT: u32 = 30;

fn offset(n: Neighbour) -> (isize, isize) {
    match n {
        Neighbour::North => (0, -1),
        Neighbour::East => (1, 0),
        Neighbour::South => (0, 1),
        Neighbour::West => (-1, 0),
    }
}

/// Per-cell validity state: bits 0–3 record which of the four neighbours
/// hold data, bit 31 flags a boundary cell (nodata with ≥1 data
/// neighbour).
#[derive(Clone, Debug)]
pub struct Mask {
    buffer: CellBuffer<u32>,
}

impl Mask {
    /// Builds the mask from an elevation buffer: for every cell, bits 0–3
    /// are set according to whether each neighbour's elevation differs
    /// from `nodata`; bit 31 is set when the cell's own elevation equals
    /// `nodata` and at least one neighbour bit is set.
    pub fn from_elevation(domain: Box, elv: &CellBuffer<f64>, nodata: f64) -> Mask {
        let grid = elv.grid();
        let mut buffer = CellBuffer::new(grid, 0u32);
        for y in domain.top()..domain.bottom() {
            for x in domain.left()..domain.right() {
                let mut bits = 0u32;
                for n in NEIGHBOURS {
                    let (dx, dy) = offset(n);
                    if elv.get(x + dx, y + dy) != nodata {
                        bits |= 1 << (n as u32);
                    }
                }
                let self_has_data = elv.get(x, y) != nodata;
                if self_has_data {
                    bits |= 1 << SELF_DATA_BIT;
                } else if bits != 0 {
                    bits |= 1 << BOUNDARY_BIT;
                }
                buffer.set(x, y, bits);
            }
        }
        Mask { buffer }
    }

    pub fn neighbour_has_data(&self, x: isize, y: isize, n: Neighbour) -> bool {
        self.buffer.get(x, y) & (1 << (n as u32)) != 0
    }

    pub fn is_boundary(&self, x: isize, y: isize) -> bool {
        self.buffer.get(x, y) & (1 << BOUNDARY_BIT) != 0
    }

    /// True if the cell itself has no elevation data and is not a
    /// boundary cell either — entirely outside the active domain, skipped
    /// by every stencil. A cell with valid data but zero data neighbours
    /// (e.g. an isolated pixel) is never void.
    pub fn is_void(&self, x: isize, y: isize) -> bool {
        let raw = self.buffer.get(x, y);
        raw & (1 << SELF_DATA_BIT) == 0 && raw & (1 << BOUNDARY_BIT) == 0
    }

    /// Marks `(x, y)` as nodata with no neighbour bits, removing it
    /// permanently from computation — used by `removeUpstr`.
    pub fn clear_cell(&mut self, x: isize, y: isize) {
        self.buffer.set(x, y, 0);
    }

    pub fn raw(&self, x: isize, y: isize) -> u32 {
        self.buffer.get(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Grid;

    fn elv_with_hole(nodata: f64) -> (CellBuffer<f64>, Box) {
        let grid = Grid::new(3, 3, 10.0, 0.0, 0.0);
        let mut elv = CellBuffer::new(grid, nodata);
        let full = grid.full_box();
        elv.fill(&crate::geom::BoxList::from_box(full), 5.0);
        elv.set(1, 1, nodata); // a hole in the middle of data
        (elv, full)
    }

    #[test]
    fn interior_data_cell_has_all_neighbour_bits_set() {
        let (elv, full) = elv_with_hole(-9999.0);
        let mask = Mask::from_elevation(full, &elv, -9999.0);
        // (0,0) is a corner: north/west neighbours fall outside the grid
        // and read as nodata from CellBuffer, so only east/south are set.
        assert!(mask.neighbour_has_data(0, 0, Neighbour::East));
        assert!(mask.neighbour_has_data(0, 0, Neighbour::South));
        assert!(!mask.neighbour_has_data(0, 0, Neighbour::North));
        assert!(!mask.is_boundary(0, 0));
    }

    #[test]
    fn nodata_cell_with_data_neighbour_is_boundary() {
        let (elv, full) = elv_with_hole(-9999.0);
        let mask = Mask::from_elevation(full, &elv, -9999.0);
        assert!(mask.is_boundary(1, 1));
    }

    #[test]
    fn isolated_data_pixel_with_no_data_neighbours_is_not_void() {
        // A single valid cell surrounded on all four sides by nodata: it
        // has zero neighbour bits set, but it still carries elevation
        // data itself and must stay in the active domain.
        let grid = Grid::new(3, 3, 10.0, 0.0, 0.0);
        let mut elv = CellBuffer::new(grid, -9999.0);
        elv.set(1, 1, 5.0);
        let full = grid.full_box();
        let mask = Mask::from_elevation(full, &elv, -9999.0);
        assert!(!mask.neighbour_has_data(1, 1, Neighbour::North));
        assert!(!mask.neighbour_has_data(1, 1, Neighbour::East));
        assert!(!mask.is_boundary(1, 1));
        assert!(!mask.is_void(1, 1));
        assert!(mask.is_void(0, 0));
    }

    #[test]
    fn clear_cell_makes_it_void() {
        let (elv, full) = elv_with_hole(-9999.0);
        let mut mask = Mask::from_elevation(full, &elv, -9999.0);
        assert!(!mask.is_void(0, 0));
        mask.clear_cell(0, 0);
        assert!(mask.is_void(0, 0));
        assert!(!mask.is_boundary(0, 0));
    }
}
