//! Tabular data: CSV decoding into typed datasets and column sorting.

mod codec;
mod sort;

pub use codec::*;
pub use sort::*;
