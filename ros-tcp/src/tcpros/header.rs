//! TCPROS connection header.
//!
//! ```text
//! +------------------+----------------+-----------+----------------+-----------+----
//! | total len (4B LE)| field len (4B) | key=value | field len (4B) | key=value | ...
//! +------------------+----------------+-----------+----------------+-----------+----
//! ```

use std::fmt;
use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::{Error, Result};

pub const CALLER_ID: &str = "callerid";
pub const TOPIC: &str = "topic";
pub const SERVICE: &str = "service";
pub const TYPE: &str = "type";
pub const MD5SUM: &str = "md5sum";
pub const MESSAGE_DEFINITION: &str = "message_definition";
pub const REQUEST_TYPE: &str = "request_type";
pub const RESPONSE_TYPE: &str = "response_type";
pub const LATCHING: &str = "latching";
pub const PERSISTENT: &str = "persistent";
pub const TCP_NODELAY: &str = "tcp_nodelay";
pub const PROBE: &str = "probe";
pub const ERROR: &str = "error";

/// `md5sum` value a service client sends when it does not know the type.
pub const ANY_MD5SUM: &str = "*";

pub const MAX_HEADER_SIZE: usize = 1024 * 1024;

/// Ordered `key=value` fields. Setting an existing key replaces its value in
/// place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionHeader {
    fields: Vec<(String, String)>,
}

impl ConnectionHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// `Err(Handshake)` naming the missing field.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| Error::Handshake(format!("header is missing `{}`", key)))
    }

    /// Boolean flags are `"1"` when set.
    pub fn flag(&self, key: &str) -> bool {
        self.get(key) == Some("1")
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Encode including the leading total length.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let body_len: usize = self.fields.iter().map(|(k, v)| 4 + k.len() + 1 + v.len()).sum();
        if body_len > MAX_HEADER_SIZE {
            return Err(Error::Protocol(format!("header too large: {} bytes", body_len)));
        }

        let mut out = Vec::with_capacity(4 + body_len);
        out.write_u32::<LittleEndian>(body_len as u32)?;
        for (key, value) in &self.fields {
            out.write_u32::<LittleEndian>((key.len() + 1 + value.len()) as u32)?;
            out.extend_from_slice(key.as_bytes());
            out.push(b'=');
            out.extend_from_slice(value.as_bytes());
        }
        Ok(out)
    }

    /// Decode a header body, i.e. the bytes after the total length.
    pub fn decode(body: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(body);
        let mut header = Self::new();

        while (cursor.position() as usize) < body.len() {
            let field_len = cursor
                .read_u32::<LittleEndian>()
                .map_err(|_| Error::Handshake("truncated field length".into()))? as usize;
            let remaining = body.len() - cursor.position() as usize;
            if field_len > remaining {
                return Err(Error::Handshake(format!(
                    "field length {} exceeds remaining {} bytes",
                    field_len, remaining
                )));
            }

            let mut field = vec![0u8; field_len];
            cursor.read_exact(&mut field)?;
            let field = String::from_utf8(field)
                .map_err(|_| Error::Handshake("header field is not utf-8".into()))?;
            let (key, value) = field
                .split_once('=')
                .ok_or_else(|| Error::Handshake(format!("header field without '=': {}", field)))?;
            header.insert(key, value);
        }

        Ok(header)
    }
}

impl fmt::Display for ConnectionHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.fields {
            if key == MESSAGE_DEFINITION {
                continue;
            }
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{}={}", key, value)?;
            first = false;
        }
        Ok(())
    }
}
