use std::io;
use thiserror::Error;

/// Everything that can abort a demultiplexing run. Construction-time kinds
/// (table, threshold) fire before any output file is created; `TrimTooLong`
/// and the I/O kinds abort the streaming phase after sink cleanup.
#[derive(Debug, Error)]
pub enum DemuxError {
    #[error("adaptor file line {line}: expected '<sequence> <tag>', got '{text}'")]
    MalformedTableLine { line: usize, text: String },

    #[error("adaptor file has no wildcard line; add '*  <trash_tag>' for unmatched reads")]
    MissingWildcard,

    #[error("adaptor '{0}' is listed more than once")]
    DuplicateAdaptor(String),

    #[error("levenshtein rate must be within [0, 1], got {0}")]
    InvalidThreshold(f64),

    #[error("read '{read}': cannot trim {len} bases, the read is too short")]
    TrimTooLong { read: String, len: usize },

    #[error("paired inputs are out of step: '{path}' still has records after its mate file ended")]
    PairedStreamMismatch { path: String },

    #[error("failed to open '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to create '{path}': {source}")]
    Create {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("FASTQ parse error: {0}")]
    Fastq(#[from] seq_io::fastq::Error),

    #[error("report error: {0}")]
    Report(#[from] csv::Error),
}
