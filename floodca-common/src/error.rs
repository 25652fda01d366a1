/*
Error taxonomy for construction-time failures (spec.md §7). The teacher's
tools never reach for `thiserror`/`anyhow`; every fallible function in
this workspace returns `std::io::Result<T>`, with `FloodError` converting
at the boundary so call sites that already expect an `io::Error` (file
I/O, `WhiteboxTool::run`-style entry points) see no change in shape.
*/

use std::error::Error;
use std::fmt;
use std::io;

/// Construction-time failures. Numerical/in-loop anomalies (divide by
/// zero, NaN, a dt dip below `time_mindt`) are not represented here —
/// they are recovered locally per spec.md §7, not raised as errors.
#[derive(Debug, Clone, PartialEq)]
pub enum FloodError {
    /// Unknown model variant, contradictory thresholds, a missing
    /// required configuration file.
    Config(String),
    /// ASCII grid header mismatch, unrecognised CSV token, wrong magic
    /// number on a preprocessed-grid file.
    InputFormat(String),
    /// Extents outside the grid, a negative width/height, a zone that
    /// maps to an empty box.
    Geometry(String),
}

impl fmt::Display for FloodError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FloodError::Config(msg) => write!(f, "configuration error: {}", msg),
            FloodError::InputFormat(msg) => write!(f, "input format error: {}", msg),
            FloodError::Geometry(msg) => write!(f, "geometry error: {}", msg),
        }
    }
}

impl Error for FloodError {}

impl From<FloodError> for io::Error {
    fn from(err: FloodError) -> io::Error {
        let kind = match err {
            FloodError::Config(_) => io::ErrorKind::InvalidInput,
            FloodError::InputFormat(_) => io::ErrorKind::InvalidData,
            FloodError::Geometry(_) => io::ErrorKind::InvalidInput,
        };
        io::Error::new(kind, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_to_io_error_with_matching_kind() {
        let err: io::Error = FloodError::InputFormat("bad magic".to_string()).into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("bad magic"));
    }

    #[test]
    fn display_messages_name_the_category() {
        assert!(FloodError::Config("x".into()).to_string().starts_with("configuration"));
        assert!(FloodError::Geometry("y".into()).to_string().starts_with("geometry"));
    }
}
