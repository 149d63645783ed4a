//! The `utils` module collects the pieces shared by every other module of
//! `securesub`: the crate-wide error type and logging setup.

pub mod error;
pub mod logging;

pub use error::{ClientError, Result};

#[cfg(test)]
mod tests;
