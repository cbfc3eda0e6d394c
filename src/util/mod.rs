//! Small parsing helpers shared by the command surface.

mod interval;

pub use interval::parse_interval;
