// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Display;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::Error;

/// A single element of a [`ClaimPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClaimPathSegment {
  /// A named object property.
  Key(String),
  /// A concrete array index.
  Index(usize),
  /// Every element of an array.
  Wildcard,
}

/// An ordered selector over the claim tree of an SD-JWT or SD-JWT-VC, as used
/// by type metadata (`claims[].path`) and the presentation selector.
///
/// Serializes to and parses from a JSON array where `null` denotes the
/// wildcard segment, e.g. `["address", "street_address"]` or
/// `["nationalities", null]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ClaimPath(Vec<ClaimPathSegment>);

impl ClaimPath {
  /// Creates a path from its segments.
  pub fn new(segments: Vec<ClaimPathSegment>) -> Self {
    Self(segments)
  }

  /// The empty path, selecting the root of the claim tree.
  pub fn root() -> Self {
    Self(Vec::new())
  }

  pub fn segments(&self) -> &[ClaimPathSegment] {
    &self.0
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Returns a new path with `segment` appended.
  pub fn join(&self, segment: ClaimPathSegment) -> Self {
    let mut segments = self.0.clone();
    segments.push(segment);
    Self(segments)
  }

  /// Parses a `ClaimPath` from its JSON-array representation, as used in type
  /// metadata `claims[].path` entries.
  pub fn from_json_array(value: &Value) -> crate::Result<Self> {
    let array = value
      .as_array()
      .ok_or_else(|| Error::InvalidPath("claim path must be a JSON array".to_string()))?;
    let mut segments = Vec::with_capacity(array.len());
    for element in array {
      let segment = match element {
        Value::Null => ClaimPathSegment::Wildcard,
        Value::String(s) => ClaimPathSegment::Key(s.clone()),
        Value::Number(n) => {
          let index = n
            .as_u64()
            .ok_or_else(|| Error::InvalidPath("claim path index must be a non-negative integer".to_string()))?;
          ClaimPathSegment::Index(index as usize)
        }
        _ => return Err(Error::InvalidPath("invalid claim path element".to_string())),
      };
      segments.push(segment);
    }
    Ok(Self(segments))
  }

  /// Serializes this path to its JSON-array representation.
  pub fn to_json_array(&self) -> Value {
    Value::Array(
      self
        .0
        .iter()
        .map(|segment| match segment {
          ClaimPathSegment::Key(key) => Value::String(key.clone()),
          ClaimPathSegment::Index(index) => Value::Number((*index).into()),
          ClaimPathSegment::Wildcard => Value::Null,
        })
        .collect(),
    )
  }
}

impl Serialize for ClaimPath {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    self.to_json_array().serialize(serializer)
  }
}

impl<'de> Deserialize<'de> for ClaimPath {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: serde::Deserializer<'de>,
  {
    let value = Value::deserialize(deserializer)?;
    Self::from_json_array(&value).map_err(serde::de::Error::custom)
  }
}

impl Display for ClaimPath {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.to_json_array())
  }
}

impl FromIterator<ClaimPathSegment> for ClaimPath {
  fn from_iter<I: IntoIterator<Item = ClaimPathSegment>>(iter: I) -> Self {
    Self(iter.into_iter().collect())
  }
}
