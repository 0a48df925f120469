//! Common types for the social dispatch workspace

mod secret;
mod error;

pub use secret::Secret;
pub use error::{Error, Result};
