pub mod table;

pub use table::{AdaptorEntry, AdaptorTable};
