//! Error types for ROS1 wire serialization/deserialization

use std::fmt::Display;

use serde::{de, ser};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Custom(String),

    #[error("the ROS1 wire format is not self-describing")]
    UnsupportedAny,

    #[error("{0} has no ROS1 wire representation")]
    Unsupported(&'static str),

    #[error("sequence length required")]
    UnknownLength,

    #[error("length {0} does not fit in a u32 prefix")]
    LengthOverflow(usize),

    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),

    #[error("invalid boolean value: {0}")]
    InvalidBool(u8),

    #[error("char {0:#x} does not fit in a ROS1 char")]
    InvalidChar(u32),

    #[error("{0}")]
    Utf8(#[from] std::str::Utf8Error),
}

impl ser::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Self::Custom(msg.to_string())
    }
}

impl de::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Self::Custom(msg.to_string())
    }
}
