//! Dynamically-typed OPACK value tree.

use uuid::Uuid;

/// Width of an explicitly-sized integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntWidth {
    One,
    Two,
    Four,
    Eight,
}

impl IntWidth {
    /// Number of payload bytes.
    pub fn bytes(self) -> usize {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Four => 4,
            Self::Eight => 8,
        }
    }

    /// Smallest width that can hold `value`.
    pub fn minimal_for(value: u64) -> Self {
        if value <= u8::MAX as u64 {
            Self::One
        } else if value <= u16::MAX as u64 {
            Self::Two
        } else if value <= u32::MAX as u64 {
            Self::Four
        } else {
            Self::Eight
        }
    }

    /// True if `value` fits in this width.
    pub fn fits(self, value: u64) -> bool {
        match self {
            Self::One => value <= u8::MAX as u64,
            Self::Two => value <= u16::MAX as u64,
            Self::Four => value <= u32::MAX as u64,
            Self::Eight => true,
        }
    }
}

/// An OPACK value.
///
/// `Int` encodes with the smallest possible representation; `SizedInt` pins
/// the encoded width so decode→encode reproduces the original bytes.
/// Integers compare equal by numeric value regardless of carrier.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(u64),
    SizedInt(u64, IntWidth),
    Float32(f32),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Array(Vec<Value>),
    Dict(Vec<(String, Value)>),
}

impl Value {
    /// Build a dict preserving insertion order.
    pub fn dict<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self::Dict(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Build an array.
    pub fn array<I: IntoIterator<Item = Value>>(items: I) -> Self {
        Self::Array(items.into_iter().collect())
    }

    /// Numeric value if this is any integer carrier.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Int(n) | Self::SizedInt(n, _) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&[(String, Value)]> {
        match self {
            Self::Dict(entries) => Some(entries),
            _ => None,
        }
    }

    /// Look up a dict entry by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_dict()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// True for arrays and dicts.
    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Array(_) | Self::Dict(_))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            // Integer carriers compare by value; width is an encoding detail.
            (Self::Int(_) | Self::SizedInt(..), Self::Int(_) | Self::SizedInt(..)) => {
                self.as_u64() == other.as_u64()
            }
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Float32(a), Self::Float32(b)) => a == b,
            (Self::Float64(a), Self::Float64(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Uuid(a), Self::Uuid(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Dict(a), Self::Dict(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(v as u64)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Self::Int(v as u64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}
