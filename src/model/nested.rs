//! Three-way values for nested configuration objects.
//!
//! The Dataproc wire format distinguishes an object the caller never
//! mentioned (key omitted or `null`) from one the caller explicitly cleared
//! (`{}`). [`Nested`] keeps that distinction through decode, canonicalization,
//! diffing and encode.

use serde::de::{DeserializeOwned, Error as _};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A nested configuration object that may be absent, explicitly empty, or set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Nested<T> {
    /// The key was omitted or `null`.
    #[default]
    Absent,
    /// The key was present as `{}`.
    Empty,
    /// A populated object.
    Value(T),
}

impl<T> Nested<T> {
    /// Creates a populated value.
    #[must_use]
    pub const fn value(value: T) -> Self {
        Self::Value(value)
    }

    /// Creates an explicitly empty value.
    #[must_use]
    pub const fn empty() -> Self {
        Self::Empty
    }

    /// Returns true if the object was not mentioned.
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Returns true if the object was explicitly cleared.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Returns the populated value, if any.
    #[must_use]
    pub const fn as_value(&self) -> Option<&T> {
        match self {
            Self::Value(value) => Some(value),
            Self::Absent | Self::Empty => None,
        }
    }
}

impl<T> From<T> for Nested<T> {
    fn from(value: T) -> Self {
        Self::Value(value)
    }
}

impl<T: Serialize> Serialize for Nested<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Absent => serializer.serialize_none(),
            Self::Empty => serializer.serialize_map(Some(0))?.end(),
            Self::Value(value) => value.serialize(serializer),
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Nested<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Option::<serde_json::Value>::deserialize(deserializer)? {
            None | Some(serde_json::Value::Null) => Ok(Self::Absent),
            Some(serde_json::Value::Object(map)) if map.is_empty() => Ok(Self::Empty),
            Some(other) => serde_json::from_value(other)
                .map(Self::Value)
                .map_err(D::Error::custom),
        }
    }
}
