/// Wire-shape decoding for amounts and integer words
pub mod conversions;

pub use conversions::{WireAmount, WireWord};
