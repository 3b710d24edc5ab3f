//! ROS1 message wire format for serde.
//!
//! The format is the one carried inside TCPROS frames: little-endian
//! primitives with no alignment padding, `u32` length prefixes in front of
//! strings and variable-length arrays, and no prefix in front of fixed-size
//! arrays. Strings are not NUL-terminated.

pub mod buffer;
pub mod deserializer;
pub mod error;
pub mod serializer;

pub use buffer::RosBuffer;
pub use deserializer::{RosDeserializer, from_bytes, from_bytes_with, from_slice};
pub use error::{Error, Result};
pub use serializer::{RosSerializer, to_buffer, to_vec};
