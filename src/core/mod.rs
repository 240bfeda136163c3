//! Core traits, types, and constants.
//!
//! Everything here is free of transport and storage details: the clock and
//! store abstractions, the shared error types, and the well-known names that
//! every replica of a document must agree on.

mod clock;
mod constants;
mod error;
mod traits;

pub use clock::*;
pub use constants::*;
pub use error::*;
pub use traits::*;
