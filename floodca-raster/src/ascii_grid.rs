/*
ESRI/AAIGrid ASCII raster I/O, adapted from the teacher's
`arcascii_raster.rs` line-tokenizing idiom (case-insensitive key match on
whichever of space/tab the file uses as a separator) and extended to
accept the alternative hex-ASCII header key names from spec.md §6
(`xll`/`yll`/`side`/`no_data` in place of `xllcorner`/`yllcorner`/
`cellsize`/`nodata_value`).
*/

use crate::{DataType, PhotometricInterpretation, RasterConfigs};
use std::f64;
use std::fs::File;
use std::io::prelude::*;
use std::io::BufReader;
use std::io::BufWriter;
use std::io::{Error, ErrorKind};

pub fn read_arcascii(
    file_name: &str,
    configs: &mut RasterConfigs,
    data: &mut Vec<f64>,
) -> Result<(), Error> {
    let f = File::open(file_name)?;
    let f = BufReader::new(f);

    let mut xllcenter = f64::NEG_INFINITY;
    let mut yllcenter = f64::NEG_INFINITY;
    let mut xllcorner = f64::NEG_INFINITY;
    let mut yllcorner = f64::NEG_INFINITY;

    for line in f.lines() {
        let line_unwrapped = line?;
        let mut vec: Vec<&str> = line_unwrapped.split(' ').filter(|s| !s.is_empty()).collect();
        if vec.len() == 1 {
            vec = line_unwrapped
                .split('\t')
                .filter(|s| !s.is_empty())
                .collect();
        }
        if vec.is_empty() {
            continue;
        }
        let key = vec[0].to_lowercase();
        let last = vec[vec.len() - 1].trim();
        if key.contains("nrows") {
            configs.rows = parse_usize(last)?;
            if configs.columns > 0 {
                data.reserve(configs.rows * configs.columns);
            }
        } else if key.contains("ncols") {
            configs.columns = parse_usize(last)?;
            if configs.rows > 0 {
                data.reserve(configs.rows * configs.columns);
            }
        } else if key.contains("xllcorner") || key == "xll" {
            xllcorner = parse_f64(last)?;
        } else if key.contains("yllcorner") || key == "yll" {
            yllcorner = parse_f64(last)?;
        } else if key.contains("xllcenter") {
            xllcenter = parse_f64(last)?;
        } else if key.contains("yllcenter") {
            yllcenter = parse_f64(last)?;
        } else if key.contains("cellsize") || key == "side" {
            let v = parse_f64(last)?;
            configs.resolution_x = v;
            configs.resolution_y = v;
        } else if key.contains("nodata_value") || key == "no_data" {
            configs.data_type = if last.contains('.') {
                DataType::F32
            } else {
                DataType::I32
            };
            configs.nodata = parse_f64(last)?;
        } else {
            for val in &vec {
                let v = val.trim();
                if !v.is_empty() {
                    data.push(parse_f64(v)?);
                }
            }
        }
    }

    if configs.rows == 0 || configs.columns == 0 {
        return Err(Error::new(
            ErrorKind::InvalidData,
            "ASCII grid header is missing nrows/ncols",
        ));
    }

    if xllcorner != f64::NEG_INFINITY {
        configs.west = xllcorner;
        configs.east = xllcorner + (configs.columns as f64) * configs.resolution_x;
        configs.south = yllcorner;
        configs.north = yllcorner + (configs.rows as f64) * configs.resolution_y;
    } else if xllcenter != f64::NEG_INFINITY {
        configs.west = xllcenter - 0.5 * configs.resolution_x;
        configs.east = configs.west + (configs.columns as f64) * configs.resolution_x;
        configs.south = yllcenter - 0.5 * configs.resolution_y;
        configs.north = configs.south + (configs.rows as f64) * configs.resolution_y;
    } else {
        return Err(Error::new(
            ErrorKind::InvalidData,
            "ASCII grid header is missing a corner/center coordinate",
        ));
    }

    configs.photometric_interp = PhotometricInterpretation::Continuous;

    Ok(())
}

pub fn write_arcascii(file_name: &str, configs: &RasterConfigs, data: &[f64]) -> Result<(), Error> {
    let f = File::create(file_name)?;
    let mut writer = BufWriter::new(f);

    writer.write_all(format!("NCOLS {}\n", configs.columns).as_bytes())?;
    writer.write_all(format!("NROWS {}\n", configs.rows).as_bytes())?;
    writer.write_all(format!("XLLCORNER {}\n", configs.west).as_bytes())?;
    writer.write_all(format!("YLLCORNER {}\n", configs.south).as_bytes())?;
    writer.write_all(
        format!(
            "CELLSIZE {}\n",
            (configs.resolution_x + configs.resolution_y) / 2.0
        )
        .as_bytes(),
    )?;
    writer.write_all(format!("NODATA_VALUE {:.2}\n", configs.nodata).as_bytes())?;

    let mut line = String::new();
    let mut col = 0usize;
    for (i, v) in data.iter().enumerate() {
        if col + 1 < configs.columns {
            line += &format!("{:.4} ", v);
        } else {
            line += &format!("{:.4}\n", v);
        }
        col += 1;
        if col == configs.columns {
            writer.write_all(line.as_bytes())?;
            line.clear();
            col = 0;
        }
        let _ = i;
    }
    writer.flush()?;

    Ok(())
}

fn parse_usize(s: &str) -> Result<usize, Error> {
    s.parse::<f64>()
        .map(|v| v as usize)
        .map_err(|e| Error::new(ErrorKind::InvalidData, e.to_string()))
}

fn parse_f64(s: &str) -> Result<f64, Error> {
    s.parse::<f64>()
        .map_err(|e| Error::new(ErrorKind::InvalidData, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_temp(contents: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("floodca_ascii_test_{:p}.asc", contents));
        let mut f = File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn reads_standard_corner_header_and_data() {
        let path = write_temp(
            "ncols 2\nnrows 2\nxllcorner 0.0\nyllcorner 0.0\ncellsize 10.0\nnodata_value -9999\n\
             1 2\n3 4\n",
        );
        let mut configs = RasterConfigs::default();
        let mut data = Vec::new();
        read_arcascii(path.to_str().unwrap(), &mut configs, &mut data).unwrap();
        assert_eq!(configs.rows, 2);
        assert_eq!(configs.columns, 2);
        assert_eq!(data, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(configs.west, 0.0);
        assert_eq!(configs.north, 20.0);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn reads_hex_ascii_header_variant() {
        let path = write_temp("ncols 1\nnrows 1\nxll 5.0\nyll 5.0\nside 2.0\nno_data -1\n9\n");
        let mut configs = RasterConfigs::default();
        let mut data = Vec::new();
        read_arcascii(path.to_str().unwrap(), &mut configs, &mut data).unwrap();
        assert_eq!(configs.resolution_x, 2.0);
        assert_eq!(configs.nodata, -1.0);
        assert_eq!(data, vec![9.0]);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn missing_dimensions_is_an_error() {
        let path = write_temp("xllcorner 0.0\nyllcorner 0.0\ncellsize 1.0\nnodata_value -1\n");
        let mut configs = RasterConfigs::default();
        let mut data = Vec::new();
        assert!(read_arcascii(path.to_str().unwrap(), &mut configs, &mut data).is_err());
        let _ = std::fs::remove_file(path);
    }
}
