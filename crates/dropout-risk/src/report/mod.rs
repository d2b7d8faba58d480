//! HTML reporting for training runs.
pub mod html;
pub mod plots;

pub use html::{training_report, Report, ReportSection};
