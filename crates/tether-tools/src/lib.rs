//! Local built-in tools for Tether.
//!
//! These run in-process, synchronously, and are offered to the model next to
//! host actions and provider tools.

mod registry;
mod weather;

pub use registry::LocalToolRegistry;
pub use weather::GetWeatherTool;
