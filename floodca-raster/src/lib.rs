/*
Raster configuration and I/O for the flood CA engine. Trimmed from the
teacher's multi-format `Raster`/`RasterConfigs` down to the two formats
this engine actually reads and writes: ESRI/AAIGrid ASCII elevation grids
on the way in, and a native binary "preprocessed grid" artifact
(`.GD`/`.CB`/`.EB`) that the solver caches between runs.
*/

mod ascii_grid;
pub mod preprocessed;

pub use ascii_grid::{read_arcascii, write_arcascii};
pub use preprocessed::{
    read_cell_buffer, read_edge_buffer, read_grid_header, write_cell_buffer, write_edge_buffer,
    write_grid_header, PREPROCESSED_MAGIC,
};

use floodca_common::utils::Endianness;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    F64,
    F32,
    I32,
    I16,
    I8,
    Unknown,
}

impl Default for DataType {
    fn default() -> DataType {
        DataType::F32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotometricInterpretation {
    Continuous,
    Categorical,
    Unknown,
}

impl Default for PhotometricInterpretation {
    fn default() -> PhotometricInterpretation {
        PhotometricInterpretation::Continuous
    }
}

/// Grid metadata shared by every raster format this crate reads or writes.
/// A deliberate subset of the teacher's `RasterConfigs`: the GeoTIFF/CRS
/// fields (projection, palette, tiepoints, ...) have no reader left to
/// populate them, so they were dropped rather than carried as dead weight.
#[derive(Debug, Clone)]
pub struct RasterConfigs {
    pub title: String,
    pub rows: usize,
    pub columns: usize,
    pub nodata: f64,
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
    pub resolution_x: f64,
    pub resolution_y: f64,
    pub endian: Endianness,
    pub photometric_interp: PhotometricInterpretation,
    pub data_type: DataType,
}

impl Default for RasterConfigs {
    fn default() -> RasterConfigs {
        RasterConfigs {
            title: String::new(),
            rows: 0,
            columns: 0,
            nodata: -32768.0,
            north: 0.0,
            south: 0.0,
            east: 0.0,
            west: 0.0,
            resolution_x: 1.0,
            resolution_y: 1.0,
            endian: Endianness::LittleEndian,
            photometric_interp: PhotometricInterpretation::Continuous,
            data_type: DataType::F32,
        }
    }
}

impl RasterConfigs {
    /// Cell length derived from the grid extent, matching the
    /// `(east - west) / columns` convention `Grid::new` expects; callers
    /// should confirm `resolution_x == resolution_y` before relying on a
    /// single scalar cell length, since the flood grid is always square.
    pub fn cell_length(&self) -> f64 {
        (self.east - self.west) / self.columns as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_configs_are_a_single_cell_grid() {
        let c = RasterConfigs::default();
        assert_eq!(c.rows, 0);
        assert_eq!(c.data_type, DataType::F32);
    }

    #[test]
    fn cell_length_matches_extent_over_columns() {
        let mut c = RasterConfigs::default();
        c.west = 0.0;
        c.east = 100.0;
        c.columns = 50;
        assert_eq!(c.cell_length(), 2.0);
    }
}
