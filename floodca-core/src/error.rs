/*
`FloodError` itself lives in `floodca_common::error`, not here: it is
already needed by `floodca_raster` (bad magic numbers, malformed ASCII
headers) before `floodca-core` exists in the dependency graph, so it was
built low in the stack rather than duplicated. This module re-exports it
under the name a reader of this crate would expect to find it.
*/

pub use floodca_common::FloodError;
