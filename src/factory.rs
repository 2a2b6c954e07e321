// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The issuance engine: turns a [`DisclosableSpecObject`] into an unsigned
//! JWT payload plus the list of disclosures the holder will later select
//! from.
//!
//! Grounded in [`crate::encoder::SdObjectEncoder`]'s salt generation, digest
//! construction, and decoy scheme, generalized from repeated path-based
//! `conceal`/`add_decoys` calls into a single recursive walk over a
//! declarative spec tree, since a declarative issuance surface (rather than
//! an imperative one) is what the spec of `SdJwtFactory` calls for.

use rand::Rng;
use serde_json::Map;
use serde_json::Value;

use crate::disclosable::Disclosable;
use crate::disclosable::DisclosableSpecArray;
use crate::disclosable::DisclosableSpecObject;
use crate::disclosable::DisclosableSpecValue;
use crate::encoder::ARRAY_DIGEST_KEY;
use crate::encoder::DEFAULT_SALT_SIZE;
use crate::encoder::DIGESTS_KEY;
use crate::encoder::SD_ALG;
use crate::Disclosure;
use crate::Error;
use crate::Hasher;
use crate::JsonObject;
use crate::Result;
use crate::Sha256Hasher;

/// Produces the high-entropy random salt for one disclosure.
///
/// Test doubles may be deterministic; production implementations must be
/// cryptographically random (the default, [`RandomSaltProvider`], uses
/// `rand`'s thread-local CSPRNG, matching the teacher's own `gen_rand`).
pub trait SaltProvider: Send + Sync {
  fn salt(&self, size: usize) -> String;
}

/// CSPRNG-backed [`SaltProvider`], identical in shape to
/// [`crate::encoder::SdObjectEncoder`]'s internal salt generation.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSaltProvider;

impl SaltProvider for RandomSaltProvider {
  fn salt(&self, size: usize) -> String {
    let mut rng = rand::thread_rng();
    let random_bytes: Vec<u8> = (0..size).map(|_| rng.gen()).collect();
    multibase::Base::Base64Url.encode(random_bytes)
  }
}

/// Produces a digest-shaped decoy string, indistinguishable from a digest
/// computed over a real disclosure.
pub trait DecoyGenerator: Send + Sync {
  fn decoy_digest(&self, hasher: &dyn Hasher, salt: &dyn SaltProvider, salt_size: usize) -> String;
}

/// Default [`DecoyGenerator`]: hashes a throwaway `Disclosure` built from
/// random salt/name/value, exactly as [`crate::encoder::SdObjectEncoder`]'s
/// `random_digest` does, so a decoy is indistinguishable from a real digest
/// without knowledge of the hasher's preimage resistance being relied upon.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomDecoyGenerator;

impl DecoyGenerator for RandomDecoyGenerator {
  fn decoy_digest(&self, hasher: &dyn Hasher, salt: &dyn SaltProvider, salt_size: usize) -> String {
    let mut rng = rand::thread_rng();
    let decoy_value_length = rng.gen_range(20..=100);
    let decoy_claim_name_length = rng.gen_range(4..=10);
    let disclosure = Disclosure::new(
      salt.salt(salt_size),
      Some(salt.salt(decoy_claim_name_length)),
      Value::String(salt.salt(decoy_value_length)),
    );
    hasher.encoded_digest(&disclosure.to_string())
  }
}

/// Configuration for [`SdJwtFactory`]: `{hashAlgorithm, saltProvider, decoyGen,
/// fallbackMinimumDigests}` per the issuance engine's spec.
pub struct SdJwtFactoryConfig<H: Hasher = Sha256Hasher> {
  pub hasher: H,
  pub salt_provider: Box<dyn SaltProvider>,
  pub decoy_gen: Box<dyn DecoyGenerator>,
  pub salt_size: usize,
  /// Floor applied to a container's `_sd` (or sentinel-entry count, for
  /// arrays) when the container itself does not set `min_digests`. `None`
  /// imposes no floor beyond the container's own real disclosures.
  pub fallback_minimum_digests: Option<usize>,
}

impl Default for SdJwtFactoryConfig<Sha256Hasher> {
  fn default() -> Self {
    Self {
      hasher: Sha256Hasher::new(),
      salt_provider: Box::new(RandomSaltProvider),
      decoy_gen: Box::new(RandomDecoyGenerator),
      salt_size: DEFAULT_SALT_SIZE,
      fallback_minimum_digests: None,
    }
  }
}

impl<H: Hasher> SdJwtFactoryConfig<H> {
  pub fn with_hasher(hasher: H) -> Self {
    Self {
      hasher,
      salt_provider: Box::new(RandomSaltProvider),
      decoy_gen: Box::new(RandomDecoyGenerator),
      salt_size: DEFAULT_SALT_SIZE,
      fallback_minimum_digests: None,
    }
  }

  pub fn with_fallback_minimum_digests(mut self, floor: usize) -> Self {
    self.fallback_minimum_digests = Some(floor);
    self
  }
}

/// Transforms a [`DisclosableSpecObject`] into an unsigned JWT payload and
/// the disclosures required to later reveal its selectively-disclosable
/// claims.
pub struct SdJwtFactory<H: Hasher = Sha256Hasher> {
  config: SdJwtFactoryConfig<H>,
}

impl SdJwtFactory<Sha256Hasher> {
  pub fn new() -> Self {
    Self {
      config: SdJwtFactoryConfig::default(),
    }
  }
}

impl Default for SdJwtFactory<Sha256Hasher> {
  fn default() -> Self {
    Self::new()
  }
}

impl<H: Hasher> SdJwtFactory<H> {
  pub fn with_config(config: SdJwtFactoryConfig<H>) -> Self {
    Self { config }
  }

  /// Runs the issuance algorithm of spec.md §4.2 over `spec`, returning the
  /// unsigned JWT payload and the full list of disclosures it references.
  ///
  /// ## Error
  /// [`Error::ReservedClaimName`] if `spec` uses `_sd`, `...`, or `_sd_alg`
  /// as an issuer-supplied claim name anywhere in the tree.
  pub fn create_sd_jwt(&self, spec: DisclosableSpecObject) -> Result<(JsonObject, Vec<Disclosure>)> {
    let mut disclosures = Vec::new();
    let mut payload = self.process_object(&spec, &mut disclosures)?;
    if !disclosures.is_empty() {
      payload.insert(SD_ALG.to_string(), Value::String(self.config.hasher.alg_name().to_string()));
    }
    Ok((payload, disclosures))
  }

  fn effective_min_digests(&self, own: Option<usize>) -> usize {
    own.or(self.config.fallback_minimum_digests).unwrap_or(0)
  }

  fn new_disclosure(&self, name: Option<String>, value: Value) -> Disclosure {
    Disclosure::new(self.config.salt_provider.salt(self.config.salt_size), name, value)
  }

  fn process_value(&self, value: &DisclosableSpecValue, disclosures: &mut Vec<Disclosure>) -> Result<Value> {
    match value {
      DisclosableSpecValue::Id(leaf) => Ok(leaf.clone()),
      DisclosableSpecValue::Obj(obj) => Ok(Value::Object(self.process_object(obj, disclosures)?)),
      DisclosableSpecValue::Arr(arr) => Ok(Value::Array(self.process_array(arr, disclosures)?)),
    }
  }

  fn process_object(&self, spec: &DisclosableSpecObject, disclosures: &mut Vec<Disclosure>) -> Result<JsonObject> {
    let mut emitted: JsonObject = Map::new();
    let mut sd_digests: Vec<String> = Vec::new();

    for (key, element) in spec.iter() {
      check_reserved_name(key)?;
      match element {
        Disclosable::NeverSelectively(value) => {
          let resolved = self.process_value(value, disclosures)?;
          emitted.insert(key.clone(), resolved);
        }
        Disclosable::AlwaysSelectively(value) => {
          let resolved = self.process_value(value, disclosures)?;
          let disclosure = self.new_disclosure(Some(key.clone()), resolved);
          sd_digests.push(self.config.hasher.encoded_digest(&disclosure.to_string()));
          disclosures.push(disclosure);
        }
      }
    }

    let floor = self.effective_min_digests(spec.min_digests());
    while sd_digests.len() < floor {
      sd_digests.push(
        self
          .config
          .decoy_gen
          .decoy_digest(&self.config.hasher, self.config.salt_provider.as_ref(), self.config.salt_size),
      );
    }
    if !sd_digests.is_empty() {
      // Sorted lexicographically so digest position never leaks which claims
      // are real versus decoy.
      sd_digests.sort_unstable();
      emitted.insert(DIGESTS_KEY.to_string(), Value::Array(sd_digests.into_iter().map(Value::String).collect()));
    }

    Ok(emitted)
  }

  fn process_array(&self, spec: &DisclosableSpecArray, disclosures: &mut Vec<Disclosure>) -> Result<Vec<Value>> {
    let mut output: Vec<Value> = Vec::new();
    let mut real_entries = 0usize;

    for element in spec.iter() {
      match element {
        Disclosable::NeverSelectively(value) => {
          let resolved = self.process_value(value, disclosures)?;
          output.push(resolved);
        }
        Disclosable::AlwaysSelectively(value) => {
          let resolved = self.process_value(value, disclosures)?;
          let disclosure = self.new_disclosure(None, resolved);
          let digest = self.config.hasher.encoded_digest(&disclosure.to_string());
          disclosures.push(disclosure);
          output.push(sentinel(digest));
          real_entries += 1;
        }
      }
    }

    let floor = self.effective_min_digests(spec.min_digests());
    let mut rng = rand::thread_rng();
    let mut decoy_count = floor.saturating_sub(real_entries);
    while decoy_count > 0 {
      let digest = self
        .config
        .decoy_gen
        .decoy_digest(&self.config.hasher, self.config.salt_provider.as_ref(), self.config.salt_size);
      let position = rng.gen_range(0..=output.len());
      output.insert(position, sentinel(digest));
      decoy_count -= 1;
    }

    Ok(output)
  }
}

fn sentinel(digest: String) -> Value {
  let mut object = Map::new();
  object.insert(ARRAY_DIGEST_KEY.to_string(), Value::String(digest));
  Value::Object(object)
}

fn check_reserved_name(name: &str) -> Result<()> {
  if name == DIGESTS_KEY || name == ARRAY_DIGEST_KEY || name == SD_ALG {
    return Err(Error::ReservedClaimName(name.to_string()));
  }
  Ok(())
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::disclosable::always_leaf;
  use crate::disclosable::always_obj;
  use crate::disclosable::never_leaf;
  use crate::disclosable::DisclosableObject;
  use serde_json::json;

  #[test]
  fn never_selectively_claims_are_emitted_plain() {
    let spec: DisclosableSpecObject =
      DisclosableObject::new().insert("given_name".to_string(), never_leaf(json!("John")));
    let (payload, disclosures) = SdJwtFactory::new().create_sd_jwt(spec).unwrap();
    assert_eq!(payload.get("given_name").unwrap(), "John");
    assert!(disclosures.is_empty());
    assert!(payload.get("_sd_alg").is_none());
  }

  #[test]
  fn always_selectively_claims_are_concealed() {
    let spec: DisclosableSpecObject =
      DisclosableObject::new().insert("family_name".to_string(), always_leaf(json!("Möbius")));
    let (payload, disclosures) = SdJwtFactory::new().create_sd_jwt(spec).unwrap();
    assert!(payload.get("family_name").is_none());
    assert_eq!(payload.get("_sd").unwrap().as_array().unwrap().len(), 1);
    assert_eq!(payload.get("_sd_alg").unwrap(), "sha-256");
    assert_eq!(disclosures.len(), 1);
    assert_eq!(disclosures[0].claim_name.as_deref(), Some("family_name"));
  }

  #[test]
  fn rejects_reserved_claim_name() {
    let spec: DisclosableSpecObject = DisclosableObject::new().insert("_sd".to_string(), never_leaf(json!(1)));
    assert!(matches!(
      SdJwtFactory::new().create_sd_jwt(spec).unwrap_err(),
      Error::ReservedClaimName(_)
    ));
  }

  #[test]
  fn fallback_minimum_digests_pads_with_decoys() {
    let spec: DisclosableSpecObject = DisclosableObject::new()
      .insert("a".to_string(), always_leaf(json!("1")))
      .insert("b".to_string(), always_leaf(json!("2")))
      .insert("c".to_string(), always_leaf(json!("3")));
    let config = SdJwtFactoryConfig::default().with_fallback_minimum_digests(6);
    let factory = SdJwtFactory::with_config(config);
    let (payload, disclosures) = factory.create_sd_jwt(spec).unwrap();
    assert_eq!(disclosures.len(), 3);
    assert!(payload.get("_sd").unwrap().as_array().unwrap().len() >= 6);
  }

  #[test]
  fn sd_array_is_sorted_lexicographically() {
    let spec: DisclosableSpecObject = DisclosableObject::new()
      .insert("a".to_string(), always_leaf(json!("1")))
      .insert("b".to_string(), always_leaf(json!("2")));
    let (payload, _) = SdJwtFactory::new().create_sd_jwt(spec).unwrap();
    let sd: Vec<String> = payload
      .get("_sd")
      .unwrap()
      .as_array()
      .unwrap()
      .iter()
      .map(|v| v.as_str().unwrap().to_string())
      .collect();
    let mut sorted = sd.clone();
    sorted.sort_unstable();
    assert_eq!(sd, sorted);
  }

  #[test]
  fn nested_recursive_object_is_concealed_as_one_disclosure() {
    let address: DisclosableSpecObject =
      DisclosableObject::new().insert("locality".to_string(), always_leaf(json!("Anytown")));
    let spec: DisclosableSpecObject = DisclosableObject::new().insert("address".to_string(), always_obj(address));
    let (payload, disclosures) = SdJwtFactory::new().create_sd_jwt(spec).unwrap();
    assert!(payload.get("address").is_none());
    assert_eq!(disclosures.len(), 2);
    let address_disclosure = disclosures
      .iter()
      .find(|d| d.claim_name.as_deref() == Some("address"))
      .unwrap();
    assert!(address_disclosure.claim_value.get("_sd").is_some());
  }
}
