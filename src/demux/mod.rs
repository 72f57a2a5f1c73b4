pub mod driver;

pub use driver::{ConsoleLog, Demultiplexer, NullLog, RouteLog};
