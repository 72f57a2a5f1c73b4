pub mod registry;

pub use registry::SinkRegistry;
