// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::hash::Hash;

use indexmap::IndexMap;
use serde_json::Value;

/// Whether a claim may be selectively disclosed, and if so, how it must be
/// revealed together with its parent.
///
/// `Never` claims are emitted in the clear by the issuance engine.
/// `Always` claims are concealed behind a digest and can only be revealed by
/// disclosing the chain from the root down to the claim (see the "structured
/// vs recursive" distinction in the glossary).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disclosable<T> {
  NeverSelectively(T),
  AlwaysSelectively(T),
}

impl<T> Disclosable<T> {
  pub fn is_always_selectively(&self) -> bool {
    matches!(self, Disclosable::AlwaysSelectively(_))
  }

  pub fn value(&self) -> &T {
    match self {
      Disclosable::NeverSelectively(v) | Disclosable::AlwaysSelectively(v) => v,
    }
  }

  pub fn into_value(self) -> T {
    match self {
      Disclosable::NeverSelectively(v) | Disclosable::AlwaysSelectively(v) => v,
    }
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Disclosable<U> {
    match self {
      Disclosable::NeverSelectively(v) => Disclosable::NeverSelectively(f(v)),
      Disclosable::AlwaysSelectively(v) => Disclosable::AlwaysSelectively(f(v)),
    }
  }
}

/// The shape of a disclosable claim: a leaf value, or a nested container.
///
/// `K` is the key type used by nested objects (normally `String`); `A` is the
/// metadata carried at the leaves — a concrete [`serde_json::Value`] on the
/// "spec surface" used by the issuer, or display/constraint metadata on the
/// "definition surface" used by the validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisclosableValue<K, A> {
  Id(A),
  Obj(DisclosableObject<K, A>),
  Arr(DisclosableArray<K, A>),
}

/// One entry of a [`DisclosableObject`] or [`DisclosableArray`]: a shape tagged
/// with whether it may be selectively disclosed.
pub type DisclosableElement<K, A> = Disclosable<DisclosableValue<K, A>>;

/// An ordered mapping from object keys to disclosable elements.
///
/// Iteration order is preserved so issuance is deterministic given a fixed
/// salt sequence (see the ordering guarantees in the concurrency model).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisclosableObject<K, A> {
  entries: IndexMap<K, DisclosableElement<K, A>>,
  /// Overrides the issuance engine's `fallbackMinimumDigests` for this
  /// container specifically. `None` defers to the factory-wide fallback.
  min_digests: Option<usize>,
}

impl<K: Eq + Hash, A> Default for DisclosableObject<K, A> {
  fn default() -> Self {
    Self {
      entries: IndexMap::new(),
      min_digests: None,
    }
  }
}

impl<K: Eq + Hash, A> DisclosableObject<K, A> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Sets the minimum number of `_sd` digests (real + decoy) this container
  /// must carry once encoded.
  pub fn with_min_digests(mut self, min_digests: usize) -> Self {
    self.min_digests = Some(min_digests);
    self
  }

  pub fn min_digests(&self) -> Option<usize> {
    self.min_digests
  }

  pub fn insert(mut self, key: K, element: DisclosableElement<K, A>) -> Self {
    self.entries.insert(key, element);
    self
  }

  pub fn get(&self, key: &K) -> Option<&DisclosableElement<K, A>> {
    self.entries.get(key)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&K, &DisclosableElement<K, A>)> {
    self.entries.iter()
  }

  pub fn into_iter(self) -> impl Iterator<Item = (K, DisclosableElement<K, A>)> {
    self.entries.into_iter()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

/// An ordered sequence of disclosable elements, one per array position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisclosableArray<K, A> {
  entries: Vec<DisclosableElement<K, A>>,
  /// Overrides the issuance engine's `fallbackMinimumDigests` for this array.
  min_digests: Option<usize>,
}

impl<K, A> Default for DisclosableArray<K, A> {
  fn default() -> Self {
    Self {
      entries: Vec::new(),
      min_digests: None,
    }
  }
}

impl<K, A> DisclosableArray<K, A> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_min_digests(mut self, min_digests: usize) -> Self {
    self.min_digests = Some(min_digests);
    self
  }

  pub fn min_digests(&self) -> Option<usize> {
    self.min_digests
  }

  pub fn push(mut self, element: DisclosableElement<K, A>) -> Self {
    self.entries.push(element);
    self
  }

  pub fn iter(&self) -> impl Iterator<Item = &DisclosableElement<K, A>> {
    self.entries.iter()
  }

  pub fn into_iter(self) -> impl Iterator<Item = DisclosableElement<K, A>> {
    self.entries.into_iter()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

/// Marks `value` as always emitted in the clear.
pub fn never<K, A>(value: DisclosableValue<K, A>) -> DisclosableElement<K, A> {
  Disclosable::NeverSelectively(value)
}

/// Marks `value` as selectively disclosable.
pub fn always<K, A>(value: DisclosableValue<K, A>) -> DisclosableElement<K, A> {
  Disclosable::AlwaysSelectively(value)
}

/// Shorthand for a never-disclosed leaf.
pub fn never_leaf<K, A>(value: A) -> DisclosableElement<K, A> {
  never(DisclosableValue::Id(value))
}

/// Shorthand for an always-disclosable leaf.
pub fn always_leaf<K, A>(value: A) -> DisclosableElement<K, A> {
  always(DisclosableValue::Id(value))
}

/// Shorthand for a never-disclosed nested object (its children may still be
/// individually selectively disclosable — this is the "structured" case).
pub fn never_obj<K: Eq + Hash, A>(object: DisclosableObject<K, A>) -> DisclosableElement<K, A> {
  never(DisclosableValue::Obj(object))
}

/// Shorthand for a selectively-disclosable nested object (the "recursive"
/// case: the container itself must be revealed before any child can be).
pub fn always_obj<K: Eq + Hash, A>(object: DisclosableObject<K, A>) -> DisclosableElement<K, A> {
  always(DisclosableValue::Obj(object))
}

pub fn never_arr<K, A>(array: DisclosableArray<K, A>) -> DisclosableElement<K, A> {
  never(DisclosableValue::Arr(array))
}

pub fn always_arr<K, A>(array: DisclosableArray<K, A>) -> DisclosableElement<K, A> {
  always(DisclosableValue::Arr(array))
}

impl<K: Eq + Hash + Clone, A> DisclosableValue<K, A> {
  /// Propagates `f_k`/`f_a` through the tree, preserving disclosability tags.
  pub fn map<K2: Eq + Hash, A2>(
    self,
    f_k: &mut impl FnMut(K) -> K2,
    f_a: &mut impl FnMut(A) -> A2,
  ) -> DisclosableValue<K2, A2> {
    match self {
      DisclosableValue::Id(a) => DisclosableValue::Id(f_a(a)),
      DisclosableValue::Obj(obj) => DisclosableValue::Obj(map_object(obj, f_k, f_a)),
      DisclosableValue::Arr(arr) => DisclosableValue::Arr(map_array(arr, f_k, f_a)),
    }
  }
}

fn map_element<K: Eq + Hash + Clone, A, K2: Eq + Hash, A2>(
  element: DisclosableElement<K, A>,
  f_k: &mut impl FnMut(K) -> K2,
  f_a: &mut impl FnMut(A) -> A2,
) -> DisclosableElement<K2, A2> {
  element.map(|value| value.map(f_k, f_a))
}

/// Propagates `f_k`/`f_a` through every entry of `object`.
pub fn map_object<K: Eq + Hash + Clone, A, K2: Eq + Hash, A2>(
  object: DisclosableObject<K, A>,
  f_k: &mut impl FnMut(K) -> K2,
  f_a: &mut impl FnMut(A) -> A2,
) -> DisclosableObject<K2, A2> {
  let min_digests = object.min_digests();
  let mut mapped = DisclosableObject::new();
  if let Some(min_digests) = min_digests {
    mapped = mapped.with_min_digests(min_digests);
  }
  for (key, element) in object.into_iter() {
    mapped = mapped.insert(f_k(key), map_element(element, f_k, f_a));
  }
  mapped
}

/// Propagates `f_k`/`f_a` through every entry of `array`.
pub fn map_array<K: Eq + Hash + Clone, A, K2: Eq + Hash, A2>(
  array: DisclosableArray<K, A>,
  f_k: &mut impl FnMut(K) -> K2,
  f_a: &mut impl FnMut(A) -> A2,
) -> DisclosableArray<K2, A2> {
  let min_digests = array.min_digests();
  let mut mapped = DisclosableArray::new();
  if let Some(min_digests) = min_digests {
    mapped = mapped.with_min_digests(min_digests);
  }
  for element in array.into_iter() {
    mapped = mapped.push(map_element(element, f_k, f_a));
  }
  mapped
}

/// The "spec surface": a disclosable tree over concrete JSON leaf values,
/// built by an issuer to describe one specific credential instance.
pub type DisclosableSpecValue = DisclosableValue<String, Value>;
pub type DisclosableSpecObject = DisclosableObject<String, Value>;
pub type DisclosableSpecArray = DisclosableArray<String, Value>;
pub type DisclosableSpecElement = DisclosableElement<String, Value>;

/// Metadata attached to a leaf of the "definition surface": the schema a
/// [`crate::validator::DefinitionValidator`] checks a recreated claim set
/// against. Display labels and other non-goal rendering metadata are
/// intentionally not modeled here.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClaimDef {
  /// If `true`, [`crate::validator::DefinitionViolation::MissingRequiredClaim`]
  /// is reported when the claim is absent from the recreated payload.
  pub required: bool,
}

impl ClaimDef {
  pub fn required() -> Self {
    Self { required: true }
  }

  pub fn optional() -> Self {
    Self { required: false }
  }
}

pub type DisclosableDefValue = DisclosableValue<String, ClaimDef>;
pub type DisclosableDef = DisclosableObject<String, ClaimDef>;
pub type DisclosableDefArray = DisclosableArray<String, ClaimDef>;
pub type DisclosableDefElement = DisclosableElement<String, ClaimDef>;

/// Resolves a [`crate::ClaimPath`] against a definition, returning the element
/// it designates.
///
/// Named segments traverse [`DisclosableValue::Obj`]; wildcard segments
/// traverse [`DisclosableValue::Arr`] (every element of a homogeneous array
/// definition is described by the same element); a concrete numeric index is
/// invalid in a definition because array definitions describe a homogeneous
/// element shape, not individual positions.
pub fn find_element<'a>(
  def: &'a DisclosableDef,
  path: &crate::ClaimPath,
) -> crate::Result<&'a DisclosableDefElement> {
  use crate::claim_path::ClaimPathSegment;
  use crate::Error;

  let mut segments = path.segments().iter();
  let Some(first) = segments.next() else {
    return Err(Error::InvalidPath("cannot resolve the empty path against a definition".to_string()));
  };
  let ClaimPathSegment::Key(key) = first else {
    return Err(Error::InvalidPath(
      "a definition path must start with a named key".to_string(),
    ));
  };
  let mut current = def
    .get(key)
    .ok_or_else(|| Error::InvalidPath(format!("no such claim in definition: {key}")))?;

  for segment in segments {
    match (segment, current.value()) {
      (ClaimPathSegment::Key(key), DisclosableValue::Obj(obj)) => {
        current = obj
          .get(key)
          .ok_or_else(|| Error::InvalidPath(format!("no such claim in definition: {key}")))?;
      }
      (ClaimPathSegment::Wildcard, DisclosableValue::Arr(arr)) => {
        current = arr
          .iter()
          .next()
          .ok_or_else(|| Error::InvalidPath("array definition has no element shape".to_string()))?;
      }
      (ClaimPathSegment::Index(_), _) => {
        return Err(Error::InvalidPath(
          "concrete array indices are invalid in a definition; arrays are assumed homogeneous".to_string(),
        ));
      }
      _ => return Err(Error::InvalidPath("claim path does not match the definition shape".to_string())),
    }
  }
  Ok(current)
}
