// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Matches a recreated claim set, together with its per-claim disclosure
//! trace, against a [`DisclosableDef`] schema.
//!
//! Grounded in the accumulator pattern `identity_credential` uses for its
//! compound credential validation errors: every applicable check runs, and
//! the complete list of violations is returned rather than failing on the
//! first mismatch, because a caller debugging a malformed credential needs
//! to see everything wrong with it at once.

use std::collections::HashMap;

use serde_json::Map;
use serde_json::Value;

use crate::claim_path::ClaimPathSegment;
use crate::disclosable::DisclosableDef;
use crate::disclosable::DisclosableDefElement;
use crate::disclosable::DisclosableValue;
use crate::error::DefinitionViolation;
use crate::ClaimPath;
use crate::Disclosure;
use crate::Error;
use crate::Hasher;
use crate::Result;
use crate::SdJwt;
use crate::SdObjectDecoder;
use crate::Visitor;

/// SD-JWT-VC registered claims that must always appear in the payload
/// plain (spec.md's claims taxonomy): a definition marking any of these
/// selectively disclosable is itself invalid, independent of what the
/// presentation being checked actually discloses.
const ALWAYS_PLAIN_CLAIMS: &[&str] = &["iss", "vct", "iat", "cnf", "exp", "nbf", "status", "vct#integrity"];

#[derive(Default)]
struct ChainRecorder {
  by_path: HashMap<ClaimPath, Disclosure>,
}

impl Visitor for ChainRecorder {
  fn visit_disclosed_claim(&mut self, path: &ClaimPath, disclosure: &Disclosure) {
    self.by_path.insert(path.clone(), disclosure.clone());
  }
}

fn chain_length(path: &ClaimPath, by_path: &HashMap<ClaimPath, Disclosure>) -> usize {
  let segments = path.segments();
  (1..=segments.len())
    .filter(|depth| by_path.contains_key(&ClaimPath::new(segments[..*depth].to_vec())))
    .count()
}

/// Validates a recreated SD-JWT(-VC) claim set against a [`DisclosableDef`].
pub struct DefinitionValidator;

impl DefinitionValidator {
  /// Recreates `sd_jwt`'s payload and checks it against `def`, accumulating
  /// every violation rather than stopping at the first.
  ///
  /// `expected_vct` checks [`DefinitionViolation::InvalidVct`] against the
  /// payload's `vct` claim when provided (SD-JWT-VC profile only).
  ///
  /// ## Error
  /// [`Error::DefinitionViolation`] carrying every violation found. If
  /// recreation itself fails (duplicate digest, unused disclosure, ...), the
  /// single violation [`DefinitionViolation::DisclosureInconsistencies`] is
  /// returned instead of attempting the structural comparison.
  pub fn validate(
    def: &DisclosableDef,
    sd_jwt: &SdJwt,
    hasher: &dyn Hasher,
    expected_vct: Option<&str>,
  ) -> Result<Map<String, Value>> {
    let digest_map: HashMap<String, Disclosure> = sd_jwt
      .disclosures()
      .iter()
      .map(|d| (hasher.encoded_digest(&d.to_string()), d.clone()))
      .collect();
    let object = serde_json::to_value(sd_jwt.claims()).map_err(|e| Error::DeserializationError(e.to_string()))?;

    let mut recorder = ChainRecorder::default();
    let recreated = match SdObjectDecoder.decode_with_visitor(
      object.as_object().expect("SdJwtClaims always serializes to an object"),
      &digest_map,
      &mut recorder,
    ) {
      Ok(recreated) => recreated,
      Err(e) => {
        return Err(Error::DefinitionViolation(vec![DefinitionViolation::DisclosureInconsistencies(
          e.to_string(),
        )]))
      }
    };

    let mut violations = Vec::new();

    for claim in ALWAYS_PLAIN_CLAIMS {
      if def.get(&claim.to_string()).is_some_and(|element| element.is_always_selectively()) {
        violations.push(DefinitionViolation::IllegalSdClaim(claim.to_string()));
      }
    }

    if let Some(expected) = expected_vct {
      let actual = recreated.get("vct").and_then(Value::as_str);
      if actual != Some(expected) {
        violations.push(DefinitionViolation::InvalidVct);
      }
    }

    walk_object(def, &recreated, &ClaimPath::root(), 0, &recorder.by_path, &mut violations);

    if violations.is_empty() {
      Ok(recreated)
    } else {
      Err(Error::DefinitionViolation(violations))
    }
  }
}

fn walk_object(
  def: &DisclosableDef,
  payload: &Map<String, Value>,
  path: &ClaimPath,
  parent_chain_len: usize,
  chains: &HashMap<ClaimPath, Disclosure>,
  violations: &mut Vec<DefinitionViolation>,
) {
  for key in payload.keys() {
    if def.get(key).is_none() {
      violations.push(DefinitionViolation::UnknownClaim(path.join(ClaimPathSegment::Key(key.clone())).to_string()));
    }
  }

  for (key, element) in def.iter() {
    let child_path = path.join(ClaimPathSegment::Key(key.clone()));
    let child_chain_len = chain_length(&child_path, chains);
    let is_disclosed = child_chain_len > parent_chain_len;

    let Some(value) = payload.get(key) else {
      if is_required(element) {
        violations.push(DefinitionViolation::MissingRequiredClaim(child_path.to_string()));
      }
      continue;
    };

    let wrong_type = match element.value() {
      DisclosableValue::Id(_) => false,
      DisclosableValue::Obj(child_def) => match value.as_object() {
        Some(child_obj) => {
          walk_object(child_def, child_obj, &child_path, child_chain_len, chains, violations);
          false
        }
        None => {
          violations.push(DefinitionViolation::WrongClaimType(child_path.to_string()));
          true
        }
      },
      DisclosableValue::Arr(child_def) => match value.as_array() {
        Some(child_arr) => {
          walk_array(child_def, child_arr, &child_path, child_chain_len, chains, violations);
          false
        }
        None => {
          violations.push(DefinitionViolation::WrongClaimType(child_path.to_string()));
          true
        }
      },
    };

    if !wrong_type && element.is_always_selectively() != is_disclosed {
      violations.push(DefinitionViolation::IncorrectlyDisclosedClaim(child_path.to_string()));
    }
  }
}

/// Arrays are homogeneous: every element is checked against the single
/// element-definition found at `def`'s sole entry.
fn walk_array(
  def: &crate::disclosable::DisclosableDefArray,
  payload: &[Value],
  path: &ClaimPath,
  parent_chain_len: usize,
  chains: &HashMap<ClaimPath, Disclosure>,
  violations: &mut Vec<DefinitionViolation>,
) {
  let Some(element_def) = def.iter().next() else {
    return;
  };
  for (index, value) in payload.iter().enumerate() {
    let element_path = path.join(ClaimPathSegment::Index(index));
    let element_chain_len = chain_length(&element_path, chains);
    let is_disclosed = element_chain_len > parent_chain_len;

    let wrong_type = match element_def.value() {
      DisclosableValue::Id(_) => false,
      DisclosableValue::Obj(child_def) => match value.as_object() {
        Some(child_obj) => {
          walk_object(child_def, child_obj, &element_path, element_chain_len, chains, violations);
          false
        }
        None => {
          violations.push(DefinitionViolation::WrongClaimType(element_path.to_string()));
          true
        }
      },
      DisclosableValue::Arr(child_def) => match value.as_array() {
        Some(child_arr) => {
          walk_array(child_def, child_arr, &element_path, element_chain_len, chains, violations);
          false
        }
        None => {
          violations.push(DefinitionViolation::WrongClaimType(element_path.to_string()));
          true
        }
      },
    };

    if !wrong_type && element_def.is_always_selectively() != is_disclosed {
      violations.push(DefinitionViolation::IncorrectlyDisclosedClaim(element_path.to_string()));
    }
  }
}

/// `DisclosableObject`/`DisclosableArray` carry no claim-level metadata of
/// their own (only leaves do, via [`ClaimDef`]); a container or array named
/// in a definition is always treated as required, since optionality is only
/// meaningful at the leaves this crate's definition surface describes.
fn is_required(element: &DisclosableDefElement) -> bool {
  match element.value() {
    DisclosableValue::Id(def) => def.required,
    DisclosableValue::Obj(_) | DisclosableValue::Arr(_) => true,
  }
}
