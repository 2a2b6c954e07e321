// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The presentation selector: narrows an issued [`SdJwt`] down to the
//! disclosures required to reveal a requested set of [`ClaimPath`]s.
//!
//! Grounded in [`crate::sd_jwt::SdJwt::conceal`]'s `find_disclosure`/
//! `get_all_sub_disclosures` machinery, which removes the disclosures for one
//! path at a time; this generalizes the same tree-walk to "keep only the
//! union of disclosures needed for a requested path set" by driving
//! [`crate::decoder::SdObjectDecoder`]'s path-tracking [`crate::Visitor`]
//! instead of re-implementing the traversal.

use std::collections::HashMap;
use std::collections::HashSet;

use crate::claim_path::ClaimPathSegment;
use crate::ClaimPath;
use crate::Disclosure;
use crate::Error;
use crate::Hasher;
use crate::Result;
use crate::SdJwt;
use crate::SdObjectDecoder;
use crate::Visitor;
use crate::SHA_ALG_NAME;

#[derive(Default)]
struct ChainRecorder {
  by_path: HashMap<ClaimPath, Disclosure>,
}

impl Visitor for ChainRecorder {
  fn visit_disclosed_claim(&mut self, path: &ClaimPath, disclosure: &Disclosure) {
    self.by_path.insert(path.clone(), disclosure.clone());
  }
}

/// Computes the minimal set of disclosures required to reveal `paths` of an
/// issued credential.
pub struct SdJwtSelector;

impl SdJwtSelector {
  /// Returns a copy of `sd_jwt` carrying only the disclosures required to
  /// reveal every claim named in `paths`, plus the ancestor disclosures of
  /// any recursive container along the way. Any existing key binding JWT is
  /// dropped, since its `sd_hash` is only valid for the disclosure set it was
  /// computed over; bind a new one with [`crate::KeyBindingJwt::build`] after
  /// selecting.
  ///
  /// ## Error
  /// [`Error::MissingHasher`] if `hasher` does not match the `_sd_alg` the
  /// credential was issued with.
  pub fn select(sd_jwt: &SdJwt, hasher: &dyn Hasher, paths: &[ClaimPath]) -> Result<SdJwt> {
    let required_hasher = sd_jwt.claims()._sd_alg.as_deref().unwrap_or(SHA_ALG_NAME);
    if required_hasher != hasher.alg_name() {
      return Err(Error::MissingHasher(format!(
        "the provided hasher uses algorithm \"{}\", but algorithm \"{required_hasher}\" is required",
        hasher.alg_name()
      )));
    }

    let digest_map: HashMap<String, Disclosure> = sd_jwt
      .disclosures()
      .iter()
      .map(|d| (hasher.encoded_digest(&d.to_string()), d.clone()))
      .collect();

    let object = serde_json::to_value(sd_jwt.claims())
      .map_err(|e| Error::DeserializationError(e.to_string()))?;
    let mut recorder = ChainRecorder::default();
    SdObjectDecoder.decode_with_visitor(
      object.as_object().expect("SdJwtClaims always serializes to an object"),
      &digest_map,
      &mut recorder,
    )?;

    let mut kept_digests: HashSet<String> = HashSet::new();
    for requested in paths {
      for candidate in candidates(requested, &recorder.by_path) {
        for disclosure in chain(&candidate, &recorder.by_path) {
          kept_digests.insert(hasher.encoded_digest(&disclosure.to_string()));
        }
      }
    }

    // Preserve the original relative ordering of the kept disclosures.
    let kept: Vec<Disclosure> = sd_jwt
      .disclosures()
      .iter()
      .filter(|d| kept_digests.contains(&hasher.encoded_digest(&d.to_string())))
      .cloned()
      .collect();

    Ok(SdJwt::new(sd_jwt.jwt().clone(), kept, None))
  }
}

/// Expands `requested` into the concrete recorded paths it matches, treating
/// a [`ClaimPathSegment::Wildcard`] as matching any concrete array index.
/// A path with no wildcard segment stands for itself, whether or not it was
/// actually disclosed (a plain or nonexistent claim simply yields an empty
/// chain).
fn candidates(requested: &ClaimPath, by_path: &HashMap<ClaimPath, Disclosure>) -> Vec<ClaimPath> {
  if !requested.segments().iter().any(|s| matches!(s, ClaimPathSegment::Wildcard)) {
    return vec![requested.clone()];
  }
  by_path
    .keys()
    .filter(|candidate| pattern_matches(requested, candidate))
    .cloned()
    .collect()
}

fn pattern_matches(pattern: &ClaimPath, candidate: &ClaimPath) -> bool {
  let pattern_segments = pattern.segments();
  let candidate_segments = candidate.segments();
  pattern_segments.len() == candidate_segments.len()
    && pattern_segments
      .iter()
      .zip(candidate_segments.iter())
      .all(|(p, c)| matches!(p, ClaimPathSegment::Wildcard) || p == c)
}

/// Returns the disclosures required to reach `path`, in root-to-leaf order:
/// one entry per ancestor prefix (including `path` itself) that was itself
/// selectively disclosed.
fn chain(path: &ClaimPath, by_path: &HashMap<ClaimPath, Disclosure>) -> Vec<Disclosure> {
  let segments = path.segments();
  (1..=segments.len())
    .filter_map(|depth| by_path.get(&ClaimPath::new(segments[..depth].to_vec())).cloned())
    .collect()
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::claim_path::ClaimPathSegment;
  use crate::Sha256Hasher;
  use serde_json::json;

  fn path(segments: &[&str]) -> ClaimPath {
    ClaimPath::new(segments.iter().map(|s| ClaimPathSegment::Key(s.to_string())).collect())
  }

  #[tokio::test]
  async fn presentation_chain_recursive_container() {
    use crate::SdJwtBuilder;

    struct NoopSigner;
    #[async_trait::async_trait]
    impl crate::JwsSigner for NoopSigner {
      type Error = std::convert::Infallible;
      async fn sign(&self, _header: &crate::JsonObject, _payload: &crate::JsonObject) -> Result<Vec<u8>, Self::Error> {
        Ok(vec![0; 4])
      }
    }

    let obj = json!({
      "credentialSubject": {
        "type": "Person",
        "address": { "locality": "Anytown", "country": "US" }
      }
    });
    let sd_jwt = SdJwtBuilder::new(obj)
      .unwrap()
      .make_concealable("/credentialSubject/address")
      .unwrap()
      .make_concealable("/credentialSubject/address/locality")
      .unwrap()
      .finish(&NoopSigner, "none")
      .await
      .unwrap();

    let hasher = Sha256Hasher::new();
    let requested = [path(&["credentialSubject", "address", "locality"])];
    let selected = SdJwtSelector::select(&sd_jwt, &hasher, &requested).unwrap();
    assert_eq!(selected.disclosures().len(), 2);
  }

  #[tokio::test]
  async fn plain_descendant_of_structured_container_yields_nothing() {
    use crate::SdJwtBuilder;

    struct NoopSigner;
    #[async_trait::async_trait]
    impl crate::JwsSigner for NoopSigner {
      type Error = std::convert::Infallible;
      async fn sign(&self, _header: &crate::JsonObject, _payload: &crate::JsonObject) -> Result<Vec<u8>, Self::Error> {
        Ok(vec![0; 4])
      }
    }

    let obj = json!({
      "credentialSubject": {
        "type": "Person"
      }
    });
    let sd_jwt = SdJwtBuilder::new(obj).unwrap().finish(&NoopSigner, "none").await.unwrap();

    let hasher = Sha256Hasher::new();
    let requested = [path(&["credentialSubject", "type"])];
    let selected = SdJwtSelector::select(&sd_jwt, &hasher, &requested).unwrap();
    assert!(selected.disclosures().is_empty());
  }
}
