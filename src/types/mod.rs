//! Value types with built-in codecs

mod timestamp;

pub use timestamp::Timestamp;
