//! Commands exposed to the CLI and embedding applications

mod scan;

pub use scan::*;
