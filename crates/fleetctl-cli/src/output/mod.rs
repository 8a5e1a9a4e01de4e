//! Output formatting module: tables for listings, progress bars for
//! long-running pulls.

mod format;
mod progress;
mod table;

pub use format::{OutputFormat, render_rows};
pub use progress::ProgressBar;
pub use table::Table;
