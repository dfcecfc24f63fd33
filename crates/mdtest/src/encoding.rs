//! Text encoding used at the I/O boundary.
//!
//! Fixture files, engine stdin/stdout and HTTP bodies are decoded and encoded
//! with an explicit [`TextEncoding`]; everything past the boundary is a Rust
//! `String`.

use std::fmt;

use serde::Deserialize;
use thiserror::Error;

/// Errors converting between bytes and text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// Bytes are not valid in the encoding.
    #[error("invalid {encoding} at byte {position}")]
    InvalidBytes {
        encoding: TextEncoding,
        position: usize,
    },

    /// A character has no representation in the encoding.
    #[error("character {ch:?} cannot be encoded as {encoding}")]
    Unrepresentable { encoding: TextEncoding, ch: char },
}

/// A supported text encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum TextEncoding {
    /// UTF-8 (default).
    #[default]
    #[serde(rename = "utf-8", alias = "utf8", alias = "UTF-8")]
    Utf8,
    /// ISO-8859-1: every byte is the code point of the same value.
    #[serde(
        rename = "latin-1",
        alias = "latin1",
        alias = "iso-8859-1",
        alias = "ISO-8859-1"
    )]
    Latin1,
}

impl TextEncoding {
    /// Returns the canonical label of the encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Latin1 => "latin-1",
        }
    }

    /// Decodes bytes into text.
    pub fn decode(&self, bytes: &[u8]) -> Result<String, EncodingError> {
        match self {
            Self::Utf8 => String::from_utf8(bytes.to_vec()).map_err(|e| {
                EncodingError::InvalidBytes {
                    encoding: *self,
                    position: e.utf8_error().valid_up_to(),
                }
            }),
            Self::Latin1 => Ok(bytes.iter().copied().map(char::from).collect()),
        }
    }

    /// Encodes text into bytes.
    pub fn encode(&self, text: &str) -> Result<Vec<u8>, EncodingError> {
        match self {
            Self::Utf8 => Ok(text.as_bytes().to_vec()),
            Self::Latin1 => text
                .chars()
                .map(|ch| {
                    u8::try_from(u32::from(ch)).map_err(|_| EncodingError::Unrepresentable {
                        encoding: *self,
                        ch,
                    })
                })
                .collect(),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
