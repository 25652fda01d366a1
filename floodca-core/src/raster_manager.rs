/*
Peak accumulation and output cadence (component C9), kept as a thin
scheduling layer: the actual raster encoding lives in `floodca_raster`
and the actual file write is the caller's business, so this module only
decides *when* to fire and *what* to hand over, mirroring how
`floodca_common::config`'s settings persistence stays separate from the
engine that uses it.
*/

use floodca_common::{CellBuffer, EdgeBuffer};
use std::fmt::Write as _;

/// Owns the peak water-depth/velocity buffers and updates them at
/// `update_peak_dt`-gated points in the main loop via the `update_peak_*`
/// stencils. Peaks are optional since a run with `update_peak_dt <= 0`
/// tracks none.
pub struct PeakTracker {
    enabled: bool,
    due: bool,
    pub peak_wd: Option<CellBuffer<f64>>,
    pub peak_speed: Option<CellBuffer<f64>>,
    pub peak_outflow: Option<EdgeBuffer<f64>>,
}

impl PeakTracker {
    pub fn new(enabled: bool, wd: &CellBuffer<f64>, outf: &EdgeBuffer<f64>) -> PeakTracker {
        if enabled {
            PeakTracker {
                enabled,
                due: false,
                peak_wd: Some(CellBuffer::new(wd.grid(), wd.nodata())),
                peak_speed: Some(CellBuffer::new(wd.grid(), 0.0)),
                peak_outflow: Some(EdgeBuffer::new(outf.grid(), 0.0)),
            }
        } else {
            PeakTracker {
                enabled: false,
                due: false,
                peak_wd: None,
                peak_speed: None,
                peak_outflow: None,
            }
        }
    }

    pub fn mark_due(&mut self) {
        if self.enabled {
            self.due = true;
        }
    }

    pub fn take_due(&mut self) -> bool {
        let was_due = self.due;
        self.due = false;
        was_due
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Fixed-cadence snapshot schedule: fires every `output_period` of
/// simulated time, plus unconditionally on the run's final iteration.
pub struct SnapshotSchedule {
    output_period: f64,
    next_output: f64,
}

impl SnapshotSchedule {
    pub fn new(time_start: f64, output_period: f64) -> SnapshotSchedule {
        SnapshotSchedule {
            output_period,
            next_output: time_start + output_period,
        }
    }

    /// Call once per iteration after `t` has advanced. Returns true if
    /// this iteration should write a snapshot (cadence reached, or
    /// `is_final` is set for the run's last iteration regardless of
    /// cadence).
    pub fn due(&mut self, t: f64, is_final: bool) -> bool {
        if is_final {
            return true;
        }
        if t >= self.next_output {
            self.next_output += self.output_period;
            return true;
        }
        false
    }
}

/// Append-only `<base>_ts.csv` writer: one row per iteration with `t,
/// dt, vamax, upstr_elv` and the current computational-domain extent.
/// Hand-rolled `write!` formatting rather than the `csv` crate, matching
/// spec.md §6's description of this as a narrow, fixed-column sidecar
/// rather than a general tabular format.
pub struct TimeSeriesWriter {
    rows: String,
}

impl TimeSeriesWriter {
    pub fn new() -> TimeSeriesWriter {
        let mut rows = String::new();
        rows.push_str("t,dt,vamax,upstr_elv,domain_x,domain_y,domain_w,domain_h\n");
        TimeSeriesWriter { rows }
    }

    pub fn record(
        &mut self,
        t: f64,
        dt: f64,
        vamax: f64,
        upstr_elv: f64,
        domain_extent: (isize, isize, isize, isize),
    ) {
        let _ = writeln!(
            self.rows,
            "{},{},{},{},{},{},{},{}",
            t,
            dt,
            vamax,
            upstr_elv,
            domain_extent.0,
            domain_extent.1,
            domain_extent.2,
            domain_extent.3
        );
    }

    pub fn contents(&self) -> &str {
        &self.rows
    }
}

impl Default for TimeSeriesWriter {
    fn default() -> TimeSeriesWriter {
        TimeSeriesWriter::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use floodca_common::Grid;

    #[test]
    fn snapshot_schedule_fires_on_cadence_and_on_final() {
        let mut sched = SnapshotSchedule::new(0.0, 100.0);
        assert!(!sched.due(50.0, false));
        assert!(sched.due(100.0, false));
        assert!(!sched.due(150.0, false));
        assert!(sched.due(170.0, true));
    }

    #[test]
    fn time_series_writer_accumulates_rows() {
        let mut w = TimeSeriesWriter::new();
        w.record(0.0, 6.0, 0.1, 100.0, (0, 0, 3, 3));
        w.record(6.0, 6.0, 0.2, 100.0, (0, 0, 4, 4));
        assert_eq!(w.contents().lines().count(), 3);
    }

    #[test]
    fn peak_tracker_disabled_allocates_nothing() {
        let grid = Grid::new(3, 3, 5.0, 0.0, 0.0);
        let wd = CellBuffer::new(grid, 0.0);
        let outf = EdgeBuffer::new(grid, 0.0);
        let tracker = PeakTracker::new(false, &wd, &outf);
        assert!(tracker.peak_wd.is_none());
    }
}
