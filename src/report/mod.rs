//! Output rendering and writing.

pub mod writer;

pub use writer::{render_output, write_output};
