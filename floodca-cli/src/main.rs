/*!
floodca is the command-line entry point for the FloodCA cellular-automaton
flood-inundation engine. It recognizes the following commands:

| Command           | Description                                                          |
| ----------------- | --------------------------------------------------------------------- |
| -h, -help         | Prints help information.                                              |
| -data <path>      | Directory holding `elevation.asc`, `settings.json` and event CSVs.    |
| -niters <n>       | Overrides `time_maxiters` from `settings.json`.                       |
| -nruns <n>        | Repeats the run `n` times, one output subdirectory per run.           |
| -results          | Prints a one-line summary after the run completes.                    |
| -output <path>    | Directory snapshot/peak/time-series rasters are written to.           |
| -version          | Prints version information.                                           |
*/

use floodca_common::config::{get_setup, Setup};
use floodca_common::{CellBuffer, FloodError, Grid};
use floodca_core::{
    parse_inflow_csv, parse_rain_csv, parse_water_level_csv, Engine, EngineReport, ProgressSink,
};
use floodca_raster::{write_arcascii, DataType, PhotometricInterpretation, RasterConfigs};
use std::env;
use std::fs;
use std::io::{Error, ErrorKind};
use std::path::{Path, PathBuf};

fn main() {
    match run() {
        Ok(()) => {}
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
    }
}

fn run() -> Result<(), Error> {
    let args: Vec<String> = env::args().collect();
    if args.len() <= 1 {
        version();
        help();
        return Ok(());
    }

    let mut data_dir: Option<String> = None;
    let mut output_dir: String = "./output".to_string();
    let mut niters: Option<u64> = None;
    let mut nruns: usize = 1;
    let mut show_results = false;

    let rest = &args[1..];
    let mut i = 0;
    while i < rest.len() {
        let arg = &rest[i];
        let flag_val = arg.to_lowercase().replace("--", "-");
        if flag_val == "-h" || flag_val == "-help" {
            help();
            return Ok(());
        } else if flag_val == "-version" {
            version();
            return Ok(());
        } else if flag_val == "-results" {
            show_results = true;
        } else if let Some(v) = flag_value(rest, &mut i, "-data") {
            data_dir = Some(v);
        } else if let Some(v) = flag_value(rest, &mut i, "-output") {
            output_dir = v;
        } else if let Some(v) = flag_value(rest, &mut i, "-niters") {
            niters = Some(v.parse::<u64>().map_err(|e| {
                Error::new(ErrorKind::InvalidInput, format!("bad -niters value: {}", e))
            })?);
        } else if let Some(v) = flag_value(rest, &mut i, "-nruns") {
            nruns = v.parse::<usize>().map_err(|e| {
                Error::new(ErrorKind::InvalidInput, format!("bad -nruns value: {}", e))
            })?;
        }
        i += 1;
    }

    let data_dir = data_dir.ok_or_else(|| {
        Error::new(ErrorKind::InvalidInput, "missing required -data <path> argument")
    })?;

    for run_index in 0..nruns.max(1) {
        let run_output = if nruns > 1 {
            Path::new(&output_dir).join(format!("run_{}", run_index))
        } else {
            PathBuf::from(&output_dir)
        };
        fs::create_dir_all(&run_output)?;

        let report = run_once(&data_dir, &run_output, niters)?;

        if show_results {
            println!(
                "run {}: {} iterations, t_final={:.3}, domain=({}, {}, {}, {})",
                run_index,
                report.iterations,
                report.t_final,
                report.domain_extent.0,
                report.domain_extent.1,
                report.domain_extent.2,
                report.domain_extent.3
            );
        }
    }

    Ok(())
}

fn run_once(data_dir: &str, output_dir: &Path, niters: Option<u64>) -> Result<EngineReport, Error> {
    let data_path = Path::new(data_dir);

    let mut setup = load_setup(&data_path.join("settings.json"))?;
    if let Some(n) = niters {
        setup.time_maxiters = n;
    }

    let mut raster_configs = RasterConfigs::default();
    let mut elevation_data = Vec::new();
    let elevation_path = find_elevation_file(data_path)?;
    floodca_raster::read_arcascii(
        elevation_path.to_str().unwrap_or_default(),
        &mut raster_configs,
        &mut elevation_data,
    )?;

    let grid = Grid::new(
        raster_configs.columns as isize,
        raster_configs.rows as isize,
        raster_configs.cell_length(),
        raster_configs.west,
        raster_configs.south,
    );

    let nodata = raster_configs.nodata;
    let mut elv = CellBuffer::new(grid, nodata);
    elv.insert_data(
        grid.full_box(),
        &elevation_data,
        raster_configs.columns as isize,
        raster_configs.rows as isize,
    );

    let rain_events = load_events(&data_path.join("rain.csv"), &grid, parse_rain_csv)?;
    let inflow_events = load_events(&data_path.join("inflow.csv"), &grid, parse_inflow_csv)?;
    let water_level_events =
        load_events(&data_path.join("water_level.csv"), &grid, parse_water_level_csv)?;

    let mut engine = Engine::new(
        grid,
        elv,
        nodata,
        setup,
        rain_events,
        inflow_events,
        water_level_events,
    )
    .map_err(Error::from)?;

    let mut snapshot_count: usize = 0;
    let mut progress = ProgressSink::new(
        |msg: &str| println!("{}", msg),
        |pct: usize| println!("{}%", pct),
    );

    let report = engine.run(
        &mut progress,
        || false,
        |eng| {
            snapshot_count += 1;
            let name = output_dir.join(format!("wd_{:05}.asc", snapshot_count));
            if let Err(e) = write_cell_raster(&raster_configs, eng.grid(), eng.water_depth(), &name)
            {
                eprintln!("failed to write snapshot {}: {}", name.display(), e);
            }
        },
    );

    if let Some(peak_wd) = engine.peak_water_depth() {
        let name = output_dir.join("peak_wd.asc");
        write_cell_raster(&raster_configs, engine.grid(), peak_wd, &name)?;
    }
    if let Some(peak_speed) = engine.peak_speed() {
        let name = output_dir.join("peak_speed.asc");
        write_cell_raster(&raster_configs, engine.grid(), peak_speed, &name)?;
    }

    fs::write(
        output_dir.join(format!("{}_ts.csv", timestamped_base())),
        engine.time_series().contents(),
    )?;

    Ok(report)
}

/// A `<base>_ts.csv` file name stem stamped with the run's wall-clock
/// start time, so successive runs against the same `-output` directory
/// don't clobber each other's time-step CSVs.
fn timestamped_base() -> String {
    chrono::Local::now().format("floodca_%Y%m%d_%H%M%S").to_string()
}

fn write_cell_raster(
    template: &RasterConfigs,
    grid: Grid,
    buffer: &CellBuffer<f64>,
    path: &Path,
) -> Result<(), Error> {
    let full = grid.full_box();
    let data = buffer.retrieve_data(full);
    let mut configs = template.clone();
    configs.data_type = DataType::F32;
    configs.photometric_interp = PhotometricInterpretation::Continuous;
    write_arcascii(path.to_str().unwrap_or_default(), &configs, &data)
}

fn load_setup(path: &Path) -> Result<Setup, Error> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| Error::new(ErrorKind::InvalidData, e.to_string()))
    } else {
        get_setup()
    }
}

fn load_events<F>(path: &Path, grid: &Grid, parser: F) -> Result<Vec<floodca_core::TimeSeriesEvent>, Error>
where
    F: Fn(&str, &Grid) -> Result<Vec<floodca_core::TimeSeriesEvent>, FloodError>,
{
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(path)?;
    parser(&contents, grid).map_err(Error::from)
}

fn find_elevation_file(data_path: &Path) -> Result<PathBuf, Error> {
    for name in ["elevation.asc", "elevation.txt", "dem.asc"] {
        let candidate = data_path.join(name);
        if candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(Error::new(
        ErrorKind::NotFound,
        format!(
            "no elevation.asc/elevation.txt/dem.asc found under {}",
            data_path.display()
        ),
    ))
}

/// Resolves a flag's value from either the `-flag=value`/`--flag=value`
/// inline form or the `-flag value` space-separated form spec.md §6 shows;
/// in the latter case the following argument is consumed, advancing `i`.
fn flag_value(args: &[String], i: &mut usize, flag: &str) -> Option<String> {
    let inline = strip_flag(&args[*i], flag)?;
    if !inline.is_empty() {
        return Some(inline);
    }
    if *i + 1 < args.len() && !args[*i + 1].starts_with('-') {
        *i += 1;
        return Some(args[*i].clone());
    }
    Some(inline)
}

fn strip_flag(arg: &str, flag: &str) -> Option<String> {
    let lower = arg.to_lowercase();
    let single = flag.trim_start_matches('-');
    if !(lower.starts_with(flag) || lower.starts_with(&format!("-{}", single))) {
        return None;
    }
    let mut v = arg
        .replacen(&format!("--{}", single), "", 1)
        .replacen(&format!("-{}", single), "", 1)
        .replace('"', "")
        .replace('\'', "");
    if let Some(stripped) = v.strip_prefix('=') {
        v = stripped.to_string();
    }
    Some(v.trim().to_string())
}

fn help() {
    println!(
        "FloodCA Help

The following commands are recognized:
-h, -help          Prints help information.
-data <path>       Directory holding elevation.asc, settings.json and event CSVs.
-niters <n>        Overrides time_maxiters from settings.json.
-nruns <n>         Repeats the run n times, one output subdirectory per run.
-results           Prints a one-line summary after the run completes.
-output <path>     Directory snapshot/peak/time-series rasters are written to.
-version           Prints version information.

Example usage:
>> floodca -data=./scenario -output=./scenario/out -results"
    );
}

fn version() {
    const VERSION: Option<&'static str> = option_env!("CARGO_PKG_VERSION");
    println!("floodca v{}", VERSION.unwrap_or("unknown"));
}
