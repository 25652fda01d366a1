/*
Per-edge storage bound to a Grid. An edge is shared by the two cells it
separates; `EdgeBuffer` stores it once and exposes it through whichever
cell's perspective the caller asks for, matching the CADDIES EdgeBuff
convention (east of cell (x,y) is the same slot as west of cell (x+1,y)).
*/

use crate::cell_buffer::ReduceOp;
use crate::geom::{BoxList, Grid};

/// Dense storage for the grid's internal edges, split into two physical
/// subarrays: west-east edges (`(nx+1) x ny`, one vertical line per column
/// boundary) and north-south edges (`nx x (ny+1)`, one horizontal line per
/// row boundary).
#[derive(Clone, Debug)]
pub struct EdgeBuffer<T> {
    grid: Grid,
    nodata: T,
    we: Vec<T>,
    ns: Vec<T>,
}

impl<T: Copy> EdgeBuffer<T> {
    pub fn new(grid: Grid, nodata: T) -> EdgeBuffer<T> {
        let nx = grid.nx();
        let ny = grid.ny();
        EdgeBuffer {
            grid,
            nodata,
            we: vec![nodata; ((nx + 1) * ny).max(0) as usize],
            ns: vec![nodata; (nx * (ny + 1)).max(0) as usize],
        }
    }

    pub fn grid(&self) -> Grid {
        self.grid
    }

    fn we_index(&self, x: isize, y: isize) -> Option<usize> {
        if x < 0 || x > self.grid.nx() || y < 0 || y >= self.grid.ny() {
            return None;
        }
        Some((y * (self.grid.nx() + 1) + x) as usize)
    }

    fn ns_index(&self, x: isize, y: isize) -> Option<usize> {
        if x < 0 || x >= self.grid.nx() || y < 0 || y > self.grid.ny() {
            return None;
        }
        Some((y * self.grid.nx() + x) as usize)
    }

    /// The west edge of cell `(x, y)` — equivalently the east edge of
    /// `(x - 1, y)`.
    pub fn west(&self, x: isize, y: isize) -> T {
        self.we_index(x, y).map_or(self.nodata, |i| self.we[i])
    }

    /// The east edge of cell `(x, y)` — equivalently the west edge of
    /// `(x + 1, y)`.
    pub fn east(&self, x: isize, y: isize) -> T {
        self.we_index(x + 1, y).map_or(self.nodata, |i| self.we[i])
    }

    /// The north edge of cell `(x, y)` — equivalently the south edge of
    /// `(x, y - 1)`.
    pub fn north(&self, x: isize, y: isize) -> T {
        self.ns_index(x, y).map_or(self.nodata, |i| self.ns[i])
    }

    /// The south edge of cell `(x, y)` — equivalently the north edge of
    /// `(x, y + 1)`.
    pub fn south(&self, x: isize, y: isize) -> T {
        self.ns_index(x, y + 1).map_or(self.nodata, |i| self.ns[i])
    }

    pub fn set_west(&mut self, x: isize, y: isize, v: T) {
        if let Some(i) = self.we_index(x, y) {
            self.we[i] = v;
        }
    }

    pub fn set_east(&mut self, x: isize, y: isize, v: T) {
        if let Some(i) = self.we_index(x + 1, y) {
            self.we[i] = v;
        }
    }

    pub fn set_north(&mut self, x: isize, y: isize, v: T) {
        if let Some(i) = self.ns_index(x, y) {
            self.ns[i] = v;
        }
    }

    pub fn set_south(&mut self, x: isize, y: isize, v: T) {
        if let Some(i) = self.ns_index(x, y + 1) {
            self.ns[i] = v;
        }
    }

    /// Sets every edge to `v`.
    pub fn clear(&mut self, v: T) {
        self.we.iter_mut().for_each(|c| *c = v);
        self.ns.iter_mut().for_each(|c| *c = v);
    }
}

impl EdgeBuffer<f64> {
    /// Per-edge reduction over the edges touched by `boxlist`'s interior
    /// cells, returning the 5-slot layout callers index by compass
    /// direction: `[unused, east/west, north/south, east/west, north/south]`
    /// (indices 1 and 3 carry the same west-east statistic, 2 and 4 the
    /// same north-south one — a single edge is visited once regardless of
    /// which of its two owning cells asks for it).
    pub fn sequential_op(&self, boxlist: &BoxList, op: ReduceOp) -> [f64; 5] {
        let (we_acc, ns_acc) = self.reduce_axes(boxlist, op);
        [op.initial(), we_acc, ns_acc, we_acc, ns_acc]
    }

    /// The same reduction collapsed to its two logical values: west-east
    /// and north-south.
    pub fn reduce_axes(&self, boxlist: &BoxList, op: ReduceOp) -> (f64, f64) {
        let mut we_acc = op.initial();
        let mut ns_acc = op.initial();
        for b in boxlist.boxes() {
            for y in b.top()..b.bottom() {
                for x in b.left()..=b.right() {
                    if let Some(i) = self.we_index(x, y) {
                        we_acc = fold(op, we_acc, self.we[i]);
                    }
                }
            }
            for y in b.top()..=b.bottom() {
                for x in b.left()..b.right() {
                    if let Some(i) = self.ns_index(x, y) {
                        ns_acc = fold(op, ns_acc, self.ns[i]);
                    }
                }
            }
        }
        (we_acc, ns_acc)
    }

    /// Elementwise maximum of `self` and `other`, used by `updatePEAKE`.
    pub fn update_peak(&mut self, other: &EdgeBuffer<f64>) {
        for (a, b) in self.we.iter_mut().zip(other.we.iter()) {
            *a = a.max(*b);
        }
        for (a, b) in self.ns.iter_mut().zip(other.ns.iter()) {
            *a = a.max(*b);
        }
    }
}

fn fold(op: ReduceOp, acc: f64, v: f64) -> f64 {
    match op {
        ReduceOp::Add => acc + v,
        ReduceOp::Mul => acc * v,
        ReduceOp::Min => acc.min(v),
        ReduceOp::MinAbs => acc.min(v.abs()),
        ReduceOp::Max => acc.max(v),
        ReduceOp::MaxAbs => acc.max(v.abs()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn east_of_cell_is_west_of_its_neighbour() {
        let grid = Grid::new(3, 2, 10.0, 0.0, 0.0);
        let mut buf = EdgeBuffer::new(grid, 0.0);
        buf.set_east(0, 0, 4.5);
        assert_eq!(buf.west(1, 0), 4.5);
        assert_eq!(buf.east(0, 0), 4.5);
    }

    #[test]
    fn south_of_cell_is_north_of_its_neighbour() {
        let grid = Grid::new(3, 2, 10.0, 0.0, 0.0);
        let mut buf = EdgeBuffer::new(grid, 0.0);
        buf.set_south(1, 0, 7.0);
        assert_eq!(buf.north(1, 1), 7.0);
        assert_eq!(buf.south(1, 0), 7.0);
    }

    #[test]
    fn out_of_range_edge_reads_nodata() {
        let grid = Grid::new(2, 2, 10.0, 0.0, 0.0);
        let buf = EdgeBuffer::new(grid, -1.0);
        assert_eq!(buf.west(-1, 0), -1.0);
        assert_eq!(buf.north(0, -1), -1.0);
    }

    #[test]
    fn clear_resets_every_edge() {
        let grid = Grid::new(2, 2, 10.0, 0.0, 0.0);
        let mut buf = EdgeBuffer::new(grid, 0.0);
        buf.set_east(0, 0, 9.0);
        buf.clear(3.0);
        assert_eq!(buf.east(0, 0), 3.0);
        assert_eq!(buf.north(1, 1), 3.0);
    }

    #[test]
    fn update_peak_takes_elementwise_max() {
        let grid = Grid::new(2, 2, 10.0, 0.0, 0.0);
        let mut peak = EdgeBuffer::new(grid, 0.0);
        let mut current = EdgeBuffer::new(grid, 0.0);
        peak.set_east(0, 0, 2.0);
        current.set_east(0, 0, 5.0);
        peak.set_north(0, 1, 9.0);
        current.set_north(0, 1, 1.0);
        peak.update_peak(&current);
        assert_eq!(peak.east(0, 0), 5.0);
        assert_eq!(peak.north(0, 1), 9.0);
    }
}
