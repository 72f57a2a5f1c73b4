pub mod report;

pub use report::{DemuxSummary, TagCount};
