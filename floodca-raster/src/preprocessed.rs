/*
Native binary cache format the solver writes between runs so a domain
does not have to be re-decomposed into boxes, re-masked, and re-clipped
on every invocation: a `.GD` grid-header file shared by a run's `.CB`
(cell buffer) and `.EB` (edge buffer) sidecar files, all three tagged
with the same magic number and built on `floodca_common`'s byte-order
reader/writer rather than a bespoke cursor, following
`esri_bil.rs`'s reader/writer-pair idiom.
*/

use floodca_common::utils::{ByteOrderReader, ByteOrderWriter, Endianness};
use std::fs::File;
use std::io::{BufReader, BufWriter, Error, ErrorKind};

pub const PREPROCESSED_MAGIC: u32 = 0xFFFA;

/// Header shared by `.GD`/`.CB`/`.EB` files: enough to reconstruct a
/// `floodca_common::geom::Grid` and validate that a `.CB`/`.EB` sidecar
/// actually matches the `.GD` it claims to belong to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridHeader {
    pub nx: usize,
    pub ny: usize,
    pub cell_length: f64,
    pub sw_x: f64,
    pub sw_y: f64,
    pub nodata: f64,
}

pub fn write_grid_header(file_name: &str, header: &GridHeader) -> Result<(), Error> {
    let f = File::create(file_name)?;
    let mut w = ByteOrderWriter::new(BufWriter::new(f), Endianness::LittleEndian);
    write_header(&mut w, header)?;
    Ok(())
}

pub fn read_grid_header(file_name: &str) -> Result<GridHeader, Error> {
    let f = File::open(file_name)?;
    let mut r = ByteOrderReader::new(BufReader::new(f), Endianness::LittleEndian);
    read_header(&mut r)
}

/// Writes a `.CB` file: the shared header followed by the buffer's flat
/// `(nx + 2) * (ny + 2)` bordered data in row-major order, matching
/// `CellBuffer`'s own internal layout so a read is a single block copy.
pub fn write_cell_buffer(file_name: &str, header: &GridHeader, data: &[f64]) -> Result<(), Error> {
    let expected = (header.nx + 2) * (header.ny + 2);
    if data.len() != expected {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            format!(
                "cell buffer length {} does not match grid header ({} expected)",
                data.len(),
                expected
            ),
        ));
    }
    let f = File::create(file_name)?;
    let mut w = ByteOrderWriter::new(BufWriter::new(f), Endianness::LittleEndian);
    write_header(&mut w, header)?;
    for v in data {
        w.write_f64(*v)?;
    }
    Ok(())
}

pub fn read_cell_buffer(file_name: &str) -> Result<(GridHeader, Vec<f64>), Error> {
    let f = File::open(file_name)?;
    let mut r = ByteOrderReader::new(BufReader::new(f), Endianness::LittleEndian);
    let header = read_header(&mut r)?;
    let expected = (header.nx + 2) * (header.ny + 2);
    let mut data = Vec::with_capacity(expected);
    for _ in 0..expected {
        data.push(r.read_f64()?);
    }
    Ok((header, data))
}

/// Writes an `.EB` file: the shared header, then the `we` subarray
/// (`(nx + 1) * ny` values) followed by the `ns` subarray
/// (`nx * (ny + 1)` values), matching `EdgeBuffer`'s own two-subarray
/// layout.
pub fn write_edge_buffer(
    file_name: &str,
    header: &GridHeader,
    we: &[f64],
    ns: &[f64],
) -> Result<(), Error> {
    let expected_we = (header.nx + 1) * header.ny;
    let expected_ns = header.nx * (header.ny + 1);
    if we.len() != expected_we || ns.len() != expected_ns {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            "edge buffer subarray length does not match grid header",
        ));
    }
    let f = File::create(file_name)?;
    let mut w = ByteOrderWriter::new(BufWriter::new(f), Endianness::LittleEndian);
    write_header(&mut w, header)?;
    for v in we {
        w.write_f64(*v)?;
    }
    for v in ns {
        w.write_f64(*v)?;
    }
    Ok(())
}

pub fn read_edge_buffer(file_name: &str) -> Result<(GridHeader, Vec<f64>, Vec<f64>), Error> {
    let f = File::open(file_name)?;
    let mut r = ByteOrderReader::new(BufReader::new(f), Endianness::LittleEndian);
    let header = read_header(&mut r)?;
    let expected_we = (header.nx + 1) * header.ny;
    let expected_ns = header.nx * (header.ny + 1);
    let mut we = Vec::with_capacity(expected_we);
    for _ in 0..expected_we {
        we.push(r.read_f64()?);
    }
    let mut ns = Vec::with_capacity(expected_ns);
    for _ in 0..expected_ns {
        ns.push(r.read_f64()?);
    }
    Ok((header, we, ns))
}

fn write_header<W: std::io::Write>(
    w: &mut ByteOrderWriter<W>,
    header: &GridHeader,
) -> Result<(), Error> {
    w.write_u32(PREPROCESSED_MAGIC)?;
    w.write_u64(header.nx as u64)?;
    w.write_u64(header.ny as u64)?;
    w.write_f64(header.cell_length)?;
    w.write_f64(header.sw_x)?;
    w.write_f64(header.sw_y)?;
    w.write_f64(header.nodata)?;
    Ok(())
}

fn read_header<R: std::io::Read + std::io::Seek>(
    r: &mut ByteOrderReader<R>,
) -> Result<GridHeader, Error> {
    let magic = r.read_u32()?;
    if magic != PREPROCESSED_MAGIC {
        return Err(Error::new(
            ErrorKind::InvalidData,
            format!("bad preprocessed-grid magic number: {:#x}", magic),
        ));
    }
    let nx = r.read_u64()? as usize;
    let ny = r.read_u64()? as usize;
    let cell_length = r.read_f64()?;
    let sw_x = r.read_f64()?;
    let sw_y = r.read_f64()?;
    let nodata = r.read_f64()?;
    Ok(GridHeader {
        nx,
        ny,
        cell_length,
        sw_x,
        sw_y,
        nodata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(name);
        p
    }

    fn sample_header() -> GridHeader {
        GridHeader {
            nx: 3,
            ny: 2,
            cell_length: 10.0,
            sw_x: 100.0,
            sw_y: 200.0,
            nodata: -9999.0,
        }
    }

    #[test]
    fn grid_header_round_trips() {
        let path = temp_path("floodca_test_header.GD");
        let h = sample_header();
        write_grid_header(path.to_str().unwrap(), &h).unwrap();
        let back = read_grid_header(path.to_str().unwrap()).unwrap();
        assert_eq!(back, h);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn cell_buffer_round_trips_bordered_data() {
        let path = temp_path("floodca_test_cb.CB");
        let h = sample_header();
        let n = (h.nx + 2) * (h.ny + 2);
        let data: Vec<f64> = (0..n).map(|i| i as f64 * 1.5).collect();
        write_cell_buffer(path.to_str().unwrap(), &h, &data).unwrap();
        let (back_header, back_data) = read_cell_buffer(path.to_str().unwrap()).unwrap();
        assert_eq!(back_header, h);
        assert_eq!(back_data, data);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn cell_buffer_rejects_mismatched_length() {
        let path = temp_path("floodca_test_cb_bad.CB");
        let h = sample_header();
        let data = vec![0.0; 3];
        assert!(write_cell_buffer(path.to_str().unwrap(), &h, &data).is_err());
    }

    #[test]
    fn edge_buffer_round_trips_both_subarrays() {
        let path = temp_path("floodca_test_eb.EB");
        let h = sample_header();
        let we: Vec<f64> = (0..(h.nx + 1) * h.ny).map(|i| i as f64).collect();
        let ns: Vec<f64> = (0..h.nx * (h.ny + 1)).map(|i| -(i as f64)).collect();
        write_edge_buffer(path.to_str().unwrap(), &h, &we, &ns).unwrap();
        let (back_header, back_we, back_ns) = read_edge_buffer(path.to_str().unwrap()).unwrap();
        assert_eq!(back_header, h);
        assert_eq!(back_we, we);
        assert_eq!(back_ns, ns);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn bad_magic_number_is_rejected() {
        let path = temp_path("floodca_test_bad_magic.GD");
        {
            let f = File::create(&path).unwrap();
            let mut w = ByteOrderWriter::new(BufWriter::new(f), Endianness::LittleEndian);
            w.write_u32(0xDEAD).unwrap();
        }
        assert!(read_grid_header(path.to_str().unwrap()).is_err());
        let _ = std::fs::remove_file(path);
    }
}
