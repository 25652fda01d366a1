/*
Adaptive time-step selection (spec.md §4.7), grounded on the same
period/reschedule split the event managers use for their own time
bookkeeping (`floodca_core::events`): a coarse "update period" governs
when expensive global recomputation (velocity, potential event volumes)
happens, while `dt` itself is re-quantized every iteration to the nearest
fraction of `time_maxdt` that still respects the latest stability bound.
*/

use floodca_common::Setup;

/// Per-run mutable scalars the main loop threads between iterations.
/// Grounded on spec.md §4.7's period-boundary procedure; kept together in
/// one struct rather than loose locals because every field changes at a
/// different cadence (per-iteration, per-period, or once at startup) and
/// the main loop needs to reason about all three at once.
#[derive(Clone, Copy, Debug)]
pub struct ScalarState {
    pub t: f64,
    pub dt: f64,
    pub previous_dt: f64,
    pub dtfrac: u64,
    pub iter: u64,
    pub iter_until_dt_update: u64,
    pub next_dt_time: f64,
    pub period_time_dt: f64,
    pub upstr_elv: f64,
    pub vamax: f64,
    possible_dt: f64,
}

impl ScalarState {
    pub fn new(setup: &Setup) -> ScalarState {
        ScalarState {
            t: setup.time_start,
            dt: setup.time_maxdt,
            previous_dt: setup.time_maxdt,
            dtfrac: 1,
            iter: 0,
            iter_until_dt_update: 0,
            next_dt_time: setup.time_start + setup.time_updatedt,
            period_time_dt: setup.time_updatedt,
            upstr_elv: f64::INFINITY,
            vamax: 0.0,
            possible_dt: setup.time_maxdt,
        }
    }

    pub fn ratio_dt(&self) -> f64 {
        if self.previous_dt > 0.0 {
            self.dt / self.previous_dt
        } else {
            1.0
        }
    }

    /// True once `t` has reached the next update-period boundary; the
    /// caller then runs the period-boundary procedure and calls
    /// [`ScalarState::begin_period`] to reschedule.
    pub fn at_period_boundary(&self) -> bool {
        self.t >= self.next_dt_time
    }

    pub fn begin_period(&mut self, setup: &Setup) {
        self.next_dt_time = self.t + setup.time_updatedt;
        self.period_time_dt = setup.time_updatedt;
        self.vamax = 0.0;
    }

    pub fn advance(&mut self, dt: f64) {
        self.previous_dt = self.dt;
        self.dt = dt;
        self.t += dt;
        self.iter += 1;
    }
}

/// The v1 candidate next-dt: bounded by the global ceiling and by the
/// fastest motion seen (either the just-reported potential velocity, used
/// while still inside the current period, or `vamax`, the period's
/// running peak).
pub fn dtn1_wca2d_v1(setup: &Setup, cell_length: f64, potential_va: f64, vamax: f64) -> f64 {
    let mut dtn1 = setup.time_maxdt;
    if potential_va > 0.0 {
        dtn1 = dtn1.min(setup.time_alpha * cell_length / potential_va);
    }
    if vamax > 0.0 {
        dtn1 = dtn1.min(setup.time_alpha * cell_length / vamax);
    }
    dtn1.max(setup.time_mindt)
}

/// v2's candidate additionally folds in the diffusive stable-dt estimate
/// `possible_dt` (the minimum of `velocity_diffusive`'s per-cell `PDT`),
/// guarded against transient single-cell spikes: spec.md §4.7's
/// spike-resistance rule keeps the previous period's `possible_dt` when
/// the new one collapses below `time_mindt` but isn't itself much smaller
/// than what came before it (within a factor of `time_alpha`).
pub fn dtn1_wca2d_v2(
    setup: &Setup,
    cell_length: f64,
    potential_va: f64,
    vamax: f64,
    possible_dt: f64,
    previous_possible_dt: f64,
) -> (f64, f64) {
    let guarded_possible_dt = if possible_dt < setup.time_mindt
        && previous_possible_dt * setup.time_alpha > possible_dt
    {
        previous_possible_dt
    } else {
        possible_dt
    };
    let dtn1 = dtn1_wca2d_v1(setup, cell_length, potential_va, vamax).min(guarded_possible_dt);
    (dtn1.max(setup.time_mindt), guarded_possible_dt)
}

/// Quantizes `dtn1` to `time_maxdt / dtfrac` for some positive integer
/// `dtfrac`, choosing the largest `dt` that still satisfies `dt <= dtn1`
/// (spec.md §8 invariant 5), and biasing the search to stay near
/// `prev_dtfrac` rather than rescanning from 1 every iteration. This is a
/// two-branch monotonic walk, not a binary search: `dtfrac` only ever
/// grows by small steps update to update in a physically-evolving flood,
/// so starting from the previous value and walking one increment at a
/// time converges in O(1) amortized steps while still being exact.
pub fn compute_dt(setup: &Setup, prev_dtfrac: u64, dtn1: f64) -> (u64, f64) {
    let max_frac = ((setup.time_maxdt / setup.time_mindt).round() as u64).max(1);
    let mut dtfrac = prev_dtfrac.clamp(1, max_frac);
    let mut dt = setup.time_maxdt / dtfrac as f64;

    if dt <= dtn1 {
        while dt <= dtn1 && dtfrac > 1 {
            dtfrac -= 1;
            dt = setup.time_maxdt / dtfrac as f64;
        }
        if dt > dtn1 && dtfrac < max_frac {
            dtfrac += 1;
            dt = setup.time_maxdt / dtfrac as f64;
        }
    } else {
        while dt > dtn1 && dtfrac < max_frac {
            dtfrac += 1;
            dt = setup.time_maxdt / dtfrac as f64;
        }
    }

    dt = dt.clamp(setup.time_mindt, setup.time_maxdt);
    (dtfrac, dt)
}
