//! Shared types and error hierarchy for Tether.

pub mod error;
pub mod message;
pub mod model;
pub mod tool;
mod util;

pub use error::{ConfigError, InvocationError, TetherError, ToolError};
pub use message::*;
pub use tool::*;
pub use util::truncate_str;
