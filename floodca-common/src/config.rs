/*
Engine configuration, modeled on `whitebox_common::configs::Configs`: a
`serde`-derived struct with a hand-written `Default`, optionally loaded
from a JSON file next to the executable via the same `settings.json`
path-resolution idiom (popping a trailing `plugins`/binary-name segment).
*/

use crate::error::FloodError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::fs::File;
use std::io::prelude::*;
use std::io::Error;
use std::path::PathBuf;

/// Which family of stencil kernels the main loop runs.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    V1,
    V2,
}

/// The configuration knobs table from spec.md §6.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Setup {
    pub model_type: ModelType,

    pub time_start: f64,
    pub time_end: f64,
    pub time_maxiters: u64,

    pub time_maxdt: f64,
    pub time_mindt: f64,
    pub time_updatedt: f64,

    pub time_alpha: f64,

    pub tolerance: f64,
    pub ignore_wd: f64,
    pub tol_slope: f64,

    pub roughness_global: f64,
    pub infrate_global: f64,

    pub boundary_elv: f64,

    pub expand_domain: bool,

    pub ignore_upstream: bool,
    pub upstream_reduction: f64,

    pub update_peak_dt: f64,
    pub check_vols: bool,

    pub output_period: f64,

    pub max_procs: isize,
}

impl Setup {
    pub fn new() -> Setup {
        Setup {
            model_type: ModelType::V1,
            time_start: 0.0,
            time_end: 3600.0,
            time_maxiters: 1_000_000,
            time_maxdt: 30.0,
            time_mindt: 0.1,
            time_updatedt: 30.0,
            time_alpha: 0.7,
            tolerance: 0.001,
            ignore_wd: 0.0001,
            tol_slope: 0.001,
            roughness_global: 0.03,
            infrate_global: 0.0,
            boundary_elv: 1.0e6,
            expand_domain: true,
            ignore_upstream: true,
            upstream_reduction: 0.0,
            update_peak_dt: 30.0,
            check_vols: true,
            output_period: 300.0,
            max_procs: -1,
        }
    }

    /// Construction-time validation: catches contradictory thresholds that
    /// would otherwise surface much later as silent numerical nonsense.
    pub fn validate(&self) -> Result<(), FloodError> {
        if self.time_mindt <= 0.0 || self.time_maxdt <= 0.0 {
            return Err(FloodError::Config(
                "time_mindt and time_maxdt must be positive".to_string(),
            ));
        }
        if self.time_mindt > self.time_maxdt {
            return Err(FloodError::Config(
                "time_mindt must not exceed time_maxdt".to_string(),
            ));
        }
        if self.time_end <= self.time_start {
            return Err(FloodError::Config(
                "time_end must be greater than time_start".to_string(),
            ));
        }
        if self.output_period <= 0.0 {
            return Err(FloodError::Config(
                "output_period must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Setup {
    fn default() -> Setup {
        Setup::new()
    }
}

fn settings_path() -> PathBuf {
    let mut exe_path = std::env::current_exe().unwrap_or_default();
    exe_path.pop();
    if exe_path.ends_with("plugins") {
        exe_path.pop();
    }
    exe_path.join("settings.json")
}

/// Loads `Setup` from `settings.json` next to the executable, falling
/// back to defaults if the file is missing.
pub fn get_setup() -> std::result::Result<Setup, Error> {
    let config_file = settings_path();
    let setup: Setup = match fs::read_to_string(&config_file) {
        Ok(contents) => serde_json::from_str(&contents)
            .map_err(|e| Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?,
        Err(_) => Setup::new(),
    };
    Ok(setup)
}

/// Writes `setup` to `settings.json` next to the executable.
pub fn save_setup(setup: &Setup) -> std::result::Result<(), Error> {
    let setup_json = serde_json::to_string_pretty(setup)
        .map_err(|e| Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    let config_file = settings_path();
    match File::create(&config_file) {
        Ok(mut file) => {
            if let Err(_e) = file.write_all(setup_json.as_bytes()) {
                eprintln!(
                    "Error writing to output settings.json file, likely due to a permissions \
                     problem. Settings will not be updated."
                );
            }
        }
        Err(_e) => {
            eprintln!("Could not create output settings.json file.");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        assert!(Setup::new().validate().is_ok());
    }

    #[test]
    fn mindt_above_maxdt_is_rejected() {
        let mut setup = Setup::new();
        setup.time_mindt = 100.0;
        setup.time_maxdt = 1.0;
        assert!(setup.validate().is_err());
    }

    #[test]
    fn end_before_start_is_rejected() {
        let mut setup = Setup::new();
        setup.time_end = 0.0;
        setup.time_start = 10.0;
        assert!(setup.validate().is_err());
    }

    #[test]
    fn json_round_trips_through_serde() {
        let setup = Setup::new();
        let json = serde_json::to_string(&setup).unwrap();
        let back: Setup = serde_json::from_str(&json).unwrap();
        assert_eq!(setup, back);
    }
}
