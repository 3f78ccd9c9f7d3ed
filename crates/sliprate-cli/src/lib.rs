//! File formats and reporting around the `sliprate` library.

pub mod io;
pub mod markers;
pub mod report;
