//! Output of a finished batch
//!
//! - [`json`] writes the pretty-printed `BatchSummary` to a timestamped file
//! - [`console`] renders the per-account analysis as text

pub mod console;
pub mod json;

pub use console::render_summary;
pub use json::{output_file_name, save_json_output, to_json};
