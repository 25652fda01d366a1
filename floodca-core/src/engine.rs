/*
Composes C4-C7 into the per-iteration loop (component C8), grounded on
`whitebox-tools-app/src/tools/hydro_analysis/d8_flow_accum.rs`'s row-
partitioned thread::spawn + mpsc dispatch for the one genuinely hot-path
kernel (outflow); every other kernel is cheap enough per spec.md §5's
"single-threaded sequential" option (a) to run straight through
`stencils.rs`'s `BoxList` walk — spec.md §5 only requires that no kernel
observe another kernel's partial writes within the same iteration, not
that every kernel be parallelized.
*/

use crate::dt_controller::{compute_dt, dtn1_wca2d_v1, dtn1_wca2d_v2, ScalarState};
use crate::events::{EventManager, TimeSeriesEvent};
use crate::progress::ProgressSink;
use crate::raster_manager::{PeakTracker, SnapshotSchedule, TimeSeriesWriter};
use crate::stencils::{
    self, compute_row_outflow_v1, infiltration, remove_upstr, set_boundary_ele, update_peak_c,
    update_peak_e, velocity_diffusive, velocity_wca2d_v1, waterdepth, Thresholds,
    ALARM_BORDER_OR_UPSTREAM,
};
use floodca_common::{Alarms, Box as GridBox, BoxList, CellBuffer, EdgeBuffer, FloodError, Grid, Mask, ModelType, Setup};
use std::sync::{mpsc, Arc};
use std::thread;

/// Final tally handed back to the caller once the run loop exits.
#[derive(Clone, Copy, Debug)]
pub struct EngineReport {
    pub iterations: u64,
    pub t_final: f64,
    pub domain_extent: (isize, isize, isize, isize),
}

/// Owns every buffer and piece of mutable state the main loop threads
/// across iterations. Constructed once from a loaded elevation grid and
/// the three event lists; `run` drives it to completion.
pub struct Engine {
    grid: Grid,
    setup: Setup,
    thresholds: Thresholds,
    fullbox: GridBox,

    mask: Mask,
    elv: CellBuffer<f64>,
    wd: CellBuffer<f64>,

    // v1 state
    outf: EdgeBuffer<f64>,
    ptot: EdgeBuffer<f64>,

    // v2 state: a two-slot double buffer addressed by `outf_index`.
    outf_pair: [EdgeBuffer<f64>; 2],
    outf_index: usize,
    pdt: CellBuffer<f64>,
    previous_possible_dt: f64,

    speed: CellBuffer<f64>,
    angle: CellBuffer<f64>,
    scratch: CellBuffer<f64>,

    domain: BoxList,
    alarms: Alarms,
    scalar: ScalarState,

    rain: EventManager,
    inflow: EventManager,
    water_level: EventManager,
    t_end_events: f64,

    peak: PeakTracker,
    snapshot_schedule: SnapshotSchedule,
    ts_writer: TimeSeriesWriter,
}

impl Engine {
    pub fn new(
        grid: Grid,
        mut elv: CellBuffer<f64>,
        nodata: f64,
        setup: Setup,
        rain_events: Vec<TimeSeriesEvent>,
        inflow_events: Vec<TimeSeriesEvent>,
        water_level_events: Vec<TimeSeriesEvent>,
    ) -> Result<Engine, FloodError> {
        setup.validate()?;
        let fullbox = grid.full_box();
        let fulldomain = BoxList::from_box(fullbox);
        // Highest elevation before boundary cells are overwritten, so a
        // closed-boundary `boundary_elv` can't inflate the upstream-pruning
        // threshold; mirrors `CADDIES2D.cpp`'s `high_elv` computed before
        // its own `setBoundaryEle` call.
        let high_elv = elv.sequential_op(&fulldomain, floodca_common::ReduceOp::Max);
        let mut mask = Mask::from_elevation(fullbox, &elv, nodata);
        set_boundary_ele(&fulldomain, &mask, &mut elv, setup.boundary_elv);

        let wd = CellBuffer::new(grid, 0.0);
        let outf = EdgeBuffer::new(grid, 0.0);
        let ptot = EdgeBuffer::new(grid, 0.0);
        let outf_pair = [EdgeBuffer::new(grid, 0.0), EdgeBuffer::new(grid, 0.0)];
        let pdt = CellBuffer::new(grid, setup.time_maxdt);
        let speed = CellBuffer::new(grid, 0.0);
        let angle = CellBuffer::new(grid, 0.0);
        let mut scratch = CellBuffer::new(grid, 0.0);

        let mut domain = if setup.expand_domain {
            BoxList::new()
        } else {
            BoxList::from_box(fullbox)
        };

        let mut rain = EventManager::new(rain_events, false);
        let mut inflow = EventManager::new(inflow_events, true);
        let mut water_level = EventManager::new(water_level_events, false);

        // Fold every event's selector into the computational domain up
        // front, mirroring `CADDIES2D.cpp`'s pre-loop `addDomain` calls, so
        // an expanding domain never has to grow just to catch up to an
        // area an event was already going to touch.
        rain.add_domain(&mut domain);
        inflow.add_domain(&mut domain);
        water_level.add_domain(&mut domain);

        let t_end_events = [rain.end_time(), inflow.end_time(), water_level.end_time()]
            .into_iter()
            .flatten()
            .fold(setup.time_start, f64::max);

        // Pre-loop volume-check setup and initial dt selection, mirroring
        // `CADDIES2D.cpp`'s init sequence: each manager's area is analysed
        // against the full domain before the loop starts (not just at the
        // first period boundary), and the very first dt is chosen from the
        // potential velocity the events alone could cause, since no
        // velocity field exists yet.
        if setup.check_vols {
            rain.analyse_area(&mask, &mut scratch);
            inflow.analyse_area(&mask, &mut scratch);
            water_level.analyse_area(&mask, &mut scratch);
        }

        let potential_va = [
            rain.potential_va(setup.time_start, setup.time_updatedt),
            inflow.potential_va(setup.time_start, setup.time_updatedt),
            water_level.potential_va(setup.time_start, setup.time_updatedt),
        ]
        .into_iter()
        .fold(0.0, f64::max);
        let initial_dtn1 = dtn1_wca2d_v1(&setup, grid.cell_length(), potential_va, 0.0);
        let (initial_dtfrac, initial_dt) = compute_dt(&setup, 1, initial_dtn1);

        rain.prepare(setup.time_start, setup.time_updatedt);
        inflow.prepare(setup.time_start, setup.time_updatedt);
        water_level.prepare(setup.time_start, setup.time_updatedt);

        let peak = PeakTracker::new(setup.update_peak_dt > 0.0, &wd, &outf);
        let snapshot_schedule = SnapshotSchedule::new(setup.time_start, setup.output_period);
        let ts_writer = TimeSeriesWriter::new();
        let mut scalar = ScalarState::new(&setup);
        scalar.dtfrac = initial_dtfrac;
        scalar.dt = initial_dt;
        scalar.previous_dt = initial_dt;
        scalar.iter_until_dt_update = (setup.time_updatedt / initial_dt).round() as u64;
        scalar.upstr_elv = high_elv;

        let thresholds = Thresholds {
            ignore_wd: setup.ignore_wd,
            tol_delwl: setup.tolerance,
            tol_va: setup.tolerance,
            tol_slope: setup.tol_slope,
        };
        let previous_possible_dt = setup.time_maxdt;

        Ok(Engine {
            grid,
            setup,
            thresholds,
            fullbox,
            mask,
            elv,
            wd,
            outf,
            ptot,
            outf_pair,
            outf_index: 0,
            pdt,
            previous_possible_dt,
            speed,
            angle,
            scratch,
            domain,
            alarms: Alarms::new(1),
            scalar,
            rain,
            inflow,
            water_level,
            t_end_events,
            peak,
            snapshot_schedule,
            ts_writer,
        })
    }

    pub fn grid(&self) -> Grid {
        self.grid
    }

    pub fn water_depth(&self) -> &CellBuffer<f64> {
        &self.wd
    }

    /// Mutable access to the water-depth buffer, for callers seeding an
    /// initial condition (e.g. a warm-started run) before the first call
    /// to [`Engine::run`].
    pub fn water_depth_mut(&mut self) -> &mut CellBuffer<f64> {
        &mut self.wd
    }

    pub fn speed(&self) -> &CellBuffer<f64> {
        &self.speed
    }

    pub fn peak_water_depth(&self) -> Option<&CellBuffer<f64>> {
        self.peak.peak_wd.as_ref()
    }

    pub fn peak_speed(&self) -> Option<&CellBuffer<f64>> {
        self.peak.peak_speed.as_ref()
    }

    pub fn domain_extent(&self) -> GridBox {
        if self.setup.expand_domain {
            self.domain.extent()
        } else {
            self.fullbox
        }
    }

    pub fn time_series(&self) -> &TimeSeriesWriter {
        &self.ts_writer
    }

    /// True once a cell has been permanently removed from computation by
    /// upstream pruning (or was nodata to begin with).
    pub fn is_void(&self, x: isize, y: isize) -> bool {
        self.mask.is_void(x, y)
    }

    pub fn upstr_elv(&self) -> f64 {
        self.scalar.upstr_elv
    }

    /// Runs the main loop to completion (spec.md §4.8's twelve steps),
    /// calling `on_snapshot` whenever the output cadence fires and
    /// reporting status through `progress`. `force_stop` is polled once
    /// per iteration; honouring it within the same iteration matches the
    /// "0 ideal" bound spec.md §5 describes.
    pub fn run<F, S>(
        &mut self,
        progress: &mut ProgressSink,
        mut force_stop: F,
        mut on_snapshot: S,
    ) -> EngineReport
    where
        F: FnMut() -> bool,
        S: FnMut(&Engine),
    {
        let num_procs = resolve_num_procs(self.setup.max_procs);
        let mut last_reported_pct: i64 = -1;

        loop {
            if force_stop() {
                break;
            }
            if self.scalar.t >= self.setup.time_end || self.scalar.iter >= self.setup.time_maxiters
            {
                break;
            }

            // 1. Reset per-iteration accounting.
            let peak_due_this_iter = self.peak.take_due();
            // 2. Arm the border/upstream alarm for this iteration's checks.
            if self.setup.expand_domain {
                self.alarms.deactivate_all();
                self.alarms.set();
            }

            // 4. Advance time, snapping to the period grid to kill drift.
            let dt = self.scalar.dt;
            self.scalar.t += dt;
            let rounded = (self.scalar.t * 100.0).round() / 100.0;
            if (rounded % self.setup.time_updatedt).abs() < 0.01 {
                self.scalar.t = rounded;
            }

            // 5. Outflow.
            match self.setup.model_type {
                ModelType::V1 => {
                    self.outf.clear(0.0);
                    self.run_outflow_v1_parallel(num_procs, dt);
                }
                ModelType::V2 => {
                    let ratio_dt = self.scalar.ratio_dt();
                    let next_idx = 1 - self.outf_index;
                    self.outf_pair[next_idx].clear(0.0);
                    // `outf_index`/`next_idx` are always {0,1} in some
                    // order, so splitting at 1 always isolates each slot.
                    let (slot0, slot1) = self.outf_pair.split_at_mut(1);
                    let (prev_buf, next_buf): (&EdgeBuffer<f64>, &mut EdgeBuffer<f64>) =
                        if self.outf_index == 0 {
                            (&slot0[0], &mut slot1[0])
                        } else {
                            (&slot1[0], &mut slot0[0])
                        };
                    stencils::outflow_wca2d_v2(
                        &self.domain,
                        &self.mask,
                        &self.elv,
                        &self.wd,
                        dt,
                        ratio_dt,
                        self.grid.cell_length(),
                        &self.thresholds,
                        prev_buf,
                        next_buf,
                        &mut self.alarms,
                    );
                }
            }

            // 6. Domain expansion on a latched border alarm.
            if self.setup.expand_domain {
                self.alarms.get();
                if self.alarms.is_activated(ALARM_BORDER_OR_UPSTREAM) {
                    let extent = self.domain.extent();
                    let base = if extent.is_empty() {
                        GridBox::new(self.fullbox.x() + self.fullbox.w() / 2, self.fullbox.y() + self.fullbox.h() / 2, 1, 1)
                    } else {
                        extent
                    };
                    let expanded = base.expand_clipped(1, &self.fullbox);
                    self.domain = BoxList::from_box(expanded);
                }
            }

            // 7. Water depth update; v2 swaps buffers afterwards.
            match self.setup.model_type {
                ModelType::V1 => waterdepth(&self.domain, &self.mask, &mut self.wd, &self.outf),
                ModelType::V2 => {
                    waterdepth(&self.domain, &self.mask, &mut self.wd, &self.outf_pair[self.outf_index ^ 1]);
                    self.outf_index ^= 1;
                }
            }

            // 8. Events, fixed order rain -> inflow -> water-level.
            self.rain.add(&mut self.wd, &self.mask, &self.grid, self.scalar.t, dt);
            self.inflow.add(&mut self.wd, &self.mask, &self.grid, self.scalar.t, dt);
            self.water_level.add(&mut self.wd, &self.mask, &self.grid, self.scalar.t, dt);

            // 9. Period-boundary bookkeeping.
            self.scalar.previous_dt = self.scalar.dt;
            if self.scalar.at_period_boundary() {
                self.run_period_boundary();
            }
            self.scalar.iter += 1;

            // 10/11. Peak tracking.
            self.ts_writer.record(
                self.scalar.t,
                self.scalar.dt,
                self.scalar.vamax,
                self.scalar.upstr_elv,
                domain_extent_tuple(self.domain_extent()),
            );
            if self.setup.update_peak_dt > 0.0 {
                self.peak.mark_due();
            }
            if peak_due_this_iter && self.peak.is_enabled() {
                let domain = self.domain_as_list();
                if let Some(peak_wd) = self.peak.peak_wd.as_mut() {
                    update_peak_c(peak_wd, &self.wd, &domain);
                }
                if let Some(peak_speed) = self.peak.peak_speed.as_mut() {
                    update_peak_c(peak_speed, &self.speed, &domain);
                }
                if let Some(peak_outf) = self.peak.peak_outflow.as_mut() {
                    let current = match self.setup.model_type {
                        ModelType::V1 => &self.outf,
                        ModelType::V2 => &self.outf_pair[self.outf_index],
                    };
                    update_peak_e(peak_outf, current);
                }
            }

            // 12. Output cadence.
            let is_final =
                self.scalar.t >= self.setup.time_end || self.scalar.iter >= self.setup.time_maxiters;
            if self.snapshot_schedule.due(self.scalar.t, is_final) {
                on_snapshot(self);
            }

            let pct = ((self.scalar.t / self.setup.time_end) * 100.0) as i64;
            if pct != last_reported_pct {
                last_reported_pct = pct;
                progress.progress(pct.clamp(0, 100) as usize);
            }
        }

        progress.report("simulation finished");
        EngineReport {
            iterations: self.scalar.iter,
            t_final: self.scalar.t,
            domain_extent: domain_extent_tuple(self.domain_extent()),
        }
    }

    fn domain_as_list(&self) -> BoxList {
        if self.setup.expand_domain {
            self.domain.clone()
        } else {
            BoxList::from_box(self.fullbox)
        }
    }

    /// Runs `outflowWCA2Dv1` row-parallel over the domain's bounding box:
    /// each worker computes its rows' contributions independently (no
    /// shared mutable state), then the main thread folds every row's
    /// result into `outf`/`ptot`/`alarms` in order — the same
    /// compute-in-worker, merge-on-main-thread split
    /// `d8_flow_accum.rs` uses for `flow_dir.set_row_data`.
    fn run_outflow_v1_parallel(&mut self, num_procs: usize, dt: f64) {
        let extent = if self.setup.expand_domain {
            self.domain.extent()
        } else {
            self.fullbox
        };
        if extent.is_empty() {
            return;
        }
        let (top, bottom) = (extent.top(), extent.bottom());
        let (left, right) = (extent.left(), extent.right());
        let rows: Vec<isize> = (top..bottom).collect();
        if rows.is_empty() {
            return;
        }

        let mask = Arc::new(self.mask.clone());
        let elv = Arc::new(self.elv.clone());
        let wd = Arc::new(self.wd.clone());
        let rows = Arc::new(rows);
        let cell_length = self.grid.cell_length();
        let thresholds = self.thresholds;
        let (tx, rx) = mpsc::channel();
        let num_procs = num_procs.min(rows.len()).max(1);

        for tid in 0..num_procs {
            let tx = tx.clone();
            let mask = Arc::clone(&mask);
            let elv = Arc::clone(&elv);
            let wd = Arc::clone(&wd);
            let rows = Arc::clone(&rows);
            thread::spawn(move || {
                for &y in rows.iter().filter(|r| (**r - top) as usize % num_procs == tid) {
                    let row_result = compute_row_outflow_v1(
                        &mask, &elv, &wd, y, left, right, dt, cell_length, &thresholds,
                    );
                    tx.send((y, row_result)).expect("outflow worker channel closed");
                }
            });
        }
        drop(tx);

        let mut pending = rows.len();
        for (y, row_result) in rx {
            for (x, out) in row_result {
                stencils::accumulate_edge(&mut self.outf, x, y, out);
                stencils::accumulate_edge(&mut self.ptot, x, y, out);
                stencils::activate_if_crosses_border(&self.mask, x, y, out, &mut self.alarms);
            }
            pending -= 1;
            if pending == 0 {
                break;
            }
        }
    }

    fn run_period_boundary(&mut self) {
        let setup = &self.setup;

        // 1. Optional infiltration over the full domain.
        if setup.infrate_global > 0.0 {
            let domain = self.domain_as_list();
            let amount = setup.infrate_global * self.scalar.period_time_dt;
            infiltration(&domain, &self.mask, &mut self.wd, amount, self.grid.area());
        }

        let pruning_enabled = setup.ignore_upstream;

        // 2. Optionally reset the upstream-tracking alarm.
        if pruning_enabled {
            self.alarms.deactivate_all();
            self.alarms.set();
        }

        // 3. Rebase t.
        self.scalar.t = self.scalar.next_dt_time;

        // 4. Velocity kernel, producing vamax (and possible_dt for v2).
        let domain = self.domain_as_list();
        let mut possible_dt = setup.time_maxdt;
        match setup.model_type {
            ModelType::V1 => {
                velocity_wca2d_v1(
                    &domain,
                    &self.mask,
                    &self.elv,
                    &self.wd,
                    &self.ptot,
                    self.grid.cell_length(),
                    self.scalar.period_time_dt,
                    self.scalar.upstr_elv,
                    &self.thresholds,
                    &mut self.speed,
                    &mut self.angle,
                    &mut self.alarms,
                );
                self.ptot.clear(0.0);
            }
            ModelType::V2 => {
                velocity_diffusive(
                    &domain,
                    &self.mask,
                    &self.elv,
                    &self.wd,
                    &self.outf_pair[self.outf_index],
                    setup.roughness_global,
                    self.grid.cell_length(),
                    self.scalar.dt,
                    setup.time_maxdt,
                    setup.time_mindt,
                    &self.thresholds,
                    &mut self.speed,
                    &mut self.angle,
                    &mut self.pdt,
                );
                possible_dt = self
                    .pdt
                    .sequential_op(&domain, floodca_common::ReduceOp::Min);
            }
        }
        let vamax = self.speed.sequential_op(&domain, floodca_common::ReduceOp::MaxAbs);
        self.scalar.vamax = vamax;

        // 5. Potential velocities from events.
        let potential_va = [
            self.rain.potential_va(self.scalar.t, self.scalar.period_time_dt),
            self.inflow.potential_va(self.scalar.t, self.scalar.period_time_dt),
            self.water_level
                .potential_va(self.scalar.t, self.scalar.period_time_dt),
        ]
        .into_iter()
        .fold(0.0, f64::max);

        // 6. Candidate next dt.
        let dtn1 = match setup.model_type {
            ModelType::V1 => dtn1_wca2d_v1(setup, self.grid.cell_length(), potential_va, vamax),
            ModelType::V2 => {
                let (dtn1, guarded) = dtn1_wca2d_v2(
                    setup,
                    self.grid.cell_length(),
                    potential_va,
                    vamax,
                    possible_dt,
                    self.previous_possible_dt,
                );
                self.previous_possible_dt = guarded;
                dtn1
            }
        };

        // 7. Quantize dt.
        let (dtfrac, dt) = compute_dt(setup, self.scalar.dtfrac, dtn1);
        self.scalar.dtfrac = dtfrac;
        self.scalar.previous_dt = self.scalar.dt;
        self.scalar.dt = dt;

        // 8. Reschedule and re-prepare events.
        self.scalar.iter_until_dt_update = (self.scalar.period_time_dt / dt).round() as u64;
        self.scalar.begin_period(setup);
        self.rain.prepare(self.scalar.t, self.scalar.period_time_dt);
        self.inflow.prepare(self.scalar.t, self.scalar.period_time_dt);
        self.water_level.prepare(self.scalar.t, self.scalar.period_time_dt);
        if setup.check_vols {
            let mut scratch = std::mem::replace(&mut self.scratch, CellBuffer::new(self.grid, 0.0));
            self.rain.analyse_area(&self.mask, &mut scratch);
            self.water_level.analyse_area(&self.mask, &mut scratch);
            self.scratch = scratch;
        }
        {
            let mut scratch = std::mem::replace(&mut self.scratch, CellBuffer::new(self.grid, 0.0));
            self.inflow.analyse_area(&self.mask, &mut scratch);
            self.scratch = scratch;
        }

        // 9. Upstream pruning.
        if pruning_enabled {
            self.alarms.get();
            let alarm_stayed_off = !self.alarms.is_activated(ALARM_BORDER_OR_UPSTREAM);
            if alarm_stayed_off && self.scalar.t > self.t_end_events {
                remove_upstr(&domain, &self.elv, &mut self.mask, self.scalar.upstr_elv);
                self.scalar.upstr_elv -= setup.upstream_reduction;
            }
        }
    }
}

fn domain_extent_tuple(b: GridBox) -> (isize, isize, isize, isize) {
    (b.x(), b.y(), b.w(), b.h())
}

fn resolve_num_procs(max_procs: isize) -> usize {
    let available = num_cpus::get().max(1);
    if max_procs > 0 {
        (max_procs as usize).min(available)
    } else {
        available
    }
}
