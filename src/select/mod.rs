pub mod selector;

pub use selector::{selector_for, max_adaptor_similarity, Select, Selection};
