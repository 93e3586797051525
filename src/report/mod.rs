//! Run artifacts: CSV tables, the JSON history and ASCII curves for the log.

pub mod plots;
pub mod writer;

pub use plots::{epoch_summary, plot_series};
pub use writer::ReportWriter;
