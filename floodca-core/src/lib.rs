/*
Component C4-C9: stencil kernels, event managers, the DT controller and
the main loop that composes them (spec.md §4.4-§4.8), plus the thin
raster/progress/error scaffolding a runnable engine needs around that
core. Grounded on `whitebox-tools-app`'s crate-per-concern split: this
crate is the analogue of `whitebox-tools-app` itself (the thing that
wires the library crates below it into a runnable tool), while
`floodca_common`/`floodca_raster` play the role of `whitebox_common`/
`whitebox_raster`.
*/

pub mod dt_controller;
pub mod engine;
pub mod error;
pub mod events;
pub mod progress;
pub mod raster_manager;
pub mod stencils;

pub use dt_controller::ScalarState;
pub use engine::{Engine, EngineReport};
pub use error::FloodError;
pub use events::{
    parse_inflow_csv, parse_rain_csv, parse_water_level_csv, AnalyticSolution, EventManager,
    Selector, TimeSeriesEvent,
};
pub use progress::ProgressSink;
pub use raster_manager::{PeakTracker, SnapshotSchedule, TimeSeriesWriter};
pub use stencils::Thresholds;
