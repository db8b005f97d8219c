//! Little-endian binary codec shared by every Nuki message
//!
//! Every fixed-layout structure implements [`Wire`]. Structures whose shape
//! depends on the device family (Smart Lock vs Opener) read the family from
//! the [`Reader`] they are decoded from.

use crate::model::Model;

/// Failure to interpret a byte sequence as a protocol value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("message truncated: needed {needed} bytes, {remaining} left")]
    Truncated { needed: usize, remaining: usize },
    #[error("unknown {kind} value 0x{value:02x}")]
    UnknownVariant { kind: &'static str, value: u32 },
    #[error("crc mismatch: expected 0x{expected:04x}, got 0x{actual:04x}")]
    CrcMismatch { expected: u16, actual: u16 },
    #[error("string field is not valid utf-8")]
    InvalidUtf8,
    #[error("length field says {declared} bytes but {actual} are present")]
    LengthMismatch { declared: usize, actual: usize },
}

/// Cursor over an incoming byte slice
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    model: Model,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self::with_model(buf, Model::SmartLock)
    }

    pub fn with_model(buf: &'a [u8], model: Model) -> Self {
        Self { buf, pos: 0, model }
    }

    /// Device family used to pick model-dependent layouts
    pub fn model(&self) -> Model {
        self.model
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::Truncated {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Consume everything that is left
    pub fn rest(&mut self) -> &'a [u8] {
        let out = &self.buf[self.pos..];
        self.pos = self.buf.len();
        out
    }
}

/// Growable output buffer
#[derive(Debug, Clone, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn put(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// A value with a fixed little-endian wire layout
pub trait Wire: Sized {
    fn encode(&self, w: &mut Writer);

    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError>;

    fn to_bytes(&self) -> Vec<u8> {
        let mut w = Writer::new();
        self.encode(&mut w);
        w.into_bytes()
    }

    /// Decode with the Smart Lock layout
    fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        Self::decode(&mut Reader::new(data))
    }

    fn from_bytes_for(data: &[u8], model: Model) -> Result<Self, DecodeError> {
        Self::decode(&mut Reader::with_model(data, model))
    }
}

macro_rules! wire_int {
    ($($ty:ty),*) => {
        $(
            impl Wire for $ty {
                fn encode(&self, w: &mut Writer) {
                    w.put(&self.to_le_bytes());
                }

                fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
                    Ok(<$ty>::from_le_bytes(r.array()?))
                }
            }
        )*
    };
}

wire_int!(u8, u16, u32, i8, i16, f32);

impl<const N: usize> Wire for [u8; N] {
    fn encode(&self, w: &mut Writer) {
        w.put(self);
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        r.array()
    }
}

/// Trailing optional field: absent when the input is exhausted
impl<T: Wire> Wire for Option<T> {
    fn encode(&self, w: &mut Writer) {
        if let Some(value) = self {
            value.encode(w);
        }
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        if r.is_empty() {
            return Ok(None);
        }
        T::decode(r).map(Some)
    }
}

/// UTF-8 string occupying exactly `N` bytes, zero padded on the right
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct PaddedString<const N: usize>(String);

impl<const N: usize> PaddedString<N> {
    /// Builds a padded string, truncating on a char boundary when too long
    pub fn new(s: &str) -> Self {
        let mut end = s.len().min(N);
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        Self(s[..end].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<const N: usize> From<&str> for PaddedString<N> {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl<const N: usize> std::fmt::Display for PaddedString<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<const N: usize> Wire for PaddedString<N> {
    fn encode(&self, w: &mut Writer) {
        let mut out = [0u8; N];
        let bytes = self.0.as_bytes();
        let len = bytes.len().min(N);
        out[..len].copy_from_slice(&bytes[..len]);
        w.put(&out);
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let raw = r.take(N)?;
        let end = raw.iter().position(|b| *b == 0).unwrap_or(N);
        let s = std::str::from_utf8(&raw[..end]).map_err(|_| DecodeError::InvalidUtf8)?;
        Ok(Self(s.to_string()))
    }
}
