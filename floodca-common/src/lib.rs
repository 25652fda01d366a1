pub mod alarms;
pub mod cell_buffer;
pub mod config;
pub mod edge_buffer;
pub mod error;
pub mod geom;
pub mod mask;
pub mod utils;

pub use alarms::Alarms;
pub use cell_buffer::{BorderOp, Borders, CellBuffer, ReduceOp, Side};
pub use config::{ModelType, Setup};
pub use edge_buffer::EdgeBuffer;
pub use error::FloodError;
pub use geom::{split_block_decomposition, Box, BoxList, Grid};
pub use mask::{Mask, Neighbour};
