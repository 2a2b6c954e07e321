// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::collections::HashSet;

use crate::claim_path::ClaimPathSegment;
use crate::ClaimPath;
use crate::Disclosure;
use crate::Error;
use crate::ARRAY_DIGEST_KEY;
use crate::DIGESTS_KEY;
use crate::SD_ALG;
use serde_json::Map;
use serde_json::Value;

/// Observes each digest resolved while recreating a payload.
///
/// The default no-op implementation is used for a bare recreation; the
/// presentation selector (and anything else that needs to know *which*
/// disclosures were required to reach a given claim) supplies a visitor that
/// records the [`ClaimPath`] -> disclosure chain instead.
pub trait Visitor {
  /// Called once a `_sd`/`...` digest has been resolved to `disclosure` and
  /// spliced into the output at `path`.
  fn visit_disclosed_claim(&mut self, _path: &ClaimPath, _disclosure: &Disclosure) {}
}

/// A [`Visitor`] that does nothing; used when only the recreated object is needed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopVisitor;

impl Visitor for NoopVisitor {}

/// Substitutes digests in an SD-JWT object with the plaintext values provided by their
/// disclosures.
///
/// Unlike [`crate::encoder::SdObjectEncoder`], this type holds no hasher: callers resolve
/// the digest for each [`Disclosure`] themselves (the hash algorithm is named by the
/// payload's `_sd_alg` claim, which this decoder does not need to interpret) and pass in
/// the resulting `digest -> Disclosure` map.
#[derive(Debug, Default, Clone, Copy)]
pub struct SdObjectDecoder;

impl SdObjectDecoder {
  /// Decodes `object`, splicing in every disclosure from `disclosures` whose digest is
  /// referenced by a `_sd` array or `...` sentinel anywhere in the tree.
  ///
  /// ## Notes
  /// * Claims like `exp` or `iat` are not validated in the process of decoding.
  /// * `_sd_alg` is removed from the result if present.
  ///
  /// ## Error
  /// [`Error::DuplicateDigestError`] if a digest is referenced more than once.
  /// [`Error::ClaimCollisionError`] if a disclosed claim name already exists in its object.
  /// [`Error::UnusedDisclosures`] if a disclosure in `disclosures` resolves no digest.
  pub fn decode(
    &self,
    object: &Map<String, Value>,
    disclosures: &HashMap<String, Disclosure>,
  ) -> Result<Map<String, Value>, Error> {
    let mut visitor = NoopVisitor;
    self.decode_with_visitor(object, disclosures, &mut visitor)
  }

  /// Like [`Self::decode`], but reports every resolved digest to `visitor` along with the
  /// [`ClaimPath`] of the claim it revealed.
  pub fn decode_with_visitor(
    &self,
    object: &Map<String, Value>,
    disclosures: &HashMap<String, Disclosure>,
    visitor: &mut dyn Visitor,
  ) -> Result<Map<String, Value>, Error> {
    let mut processed_digests: HashSet<String> = HashSet::new();
    let mut decoded = self.decode_object(object, disclosures, &mut processed_digests, &ClaimPath::root(), visitor)?;

    if processed_digests.len() != disclosures.len() {
      return Err(Error::UnusedDisclosures(
        disclosures.len().saturating_sub(processed_digests.len()),
      ));
    }

    decoded.remove(SD_ALG);
    Ok(decoded)
  }

  fn decode_object(
    &self,
    object: &Map<String, Value>,
    disclosures: &HashMap<String, Disclosure>,
    processed_digests: &mut HashSet<String>,
    path: &ClaimPath,
    visitor: &mut dyn Visitor,
  ) -> Result<Map<String, Value>, Error> {
    let mut output: Map<String, Value> = object.clone();
    for (key, value) in object.iter() {
      if key == DIGESTS_KEY {
        let sd_array: &Vec<Value> = value
          .as_array()
          .ok_or_else(|| Error::DataTypeMismatch(format!("{DIGESTS_KEY} is not an array")))?;
        for digest in sd_array {
          let digest_str = digest
            .as_str()
            .ok_or_else(|| Error::DataTypeMismatch(format!("{digest} is not a string")))?
            .to_string();

          if processed_digests.contains(&digest_str) {
            return Err(Error::DuplicateDigestError(digest_str));
          }

          let Some(disclosure) = disclosures.get(&digest_str) else {
            // Withheld: no disclosure was provided for this digest.
            continue;
          };
          let claim_name = disclosure
            .claim_name
            .clone()
            .ok_or_else(|| Error::DataTypeMismatch(format!("disclosure type error: {disclosure}")))?;

          if output.contains_key(&claim_name) {
            return Err(Error::ClaimCollisionError(claim_name));
          }
          processed_digests.insert(digest_str);

          let claim_path = path.join(ClaimPathSegment::Key(claim_name.clone()));
          let recursively_decoded = match disclosure.claim_value {
            Value::Array(ref sub_arr) => {
              Value::Array(self.decode_array(sub_arr, disclosures, processed_digests, &claim_path, visitor)?)
            }
            Value::Object(ref sub_obj) => {
              Value::Object(self.decode_object(sub_obj, disclosures, processed_digests, &claim_path, visitor)?)
            }
            _ => disclosure.claim_value.clone(),
          };

          visitor.visit_disclosed_claim(&claim_path, disclosure);
          output.insert(claim_name, recursively_decoded);
        }
        output.remove(DIGESTS_KEY);
        continue;
      }

      let child_path = path.join(ClaimPathSegment::Key(key.clone()));
      match value {
        Value::Object(object) => {
          let decoded_object = self.decode_object(object, disclosures, processed_digests, &child_path, visitor)?;
          output.insert(key.to_string(), Value::Object(decoded_object));
        }
        Value::Array(array) => {
          let decoded_array = self.decode_array(array, disclosures, processed_digests, &child_path, visitor)?;
          output.insert(key.to_string(), Value::Array(decoded_array));
        }
        // Only objects and arrays require decoding.
        _ => {}
      }
    }
    Ok(output)
  }

  fn decode_array(
    &self,
    array: &[Value],
    disclosures: &HashMap<String, Disclosure>,
    processed_digests: &mut HashSet<String>,
    path: &ClaimPath,
    visitor: &mut dyn Visitor,
  ) -> Result<Vec<Value>, Error> {
    let mut output: Vec<Value> = vec![];
    for value in array.iter() {
      if let Some(object) = value.as_object() {
        if let Some(digest_value) = object.get(ARRAY_DIGEST_KEY) {
          if object.len() != 1 {
            return Err(Error::InvalidArrayDisclosureObject);
          }
          let digest_str = digest_value
            .as_str()
            .ok_or_else(|| Error::DataTypeMismatch(format!("{ARRAY_DIGEST_KEY} is not a string")))?
            .to_string();

          if processed_digests.contains(&digest_str) {
            return Err(Error::DuplicateDigestError(digest_str));
          }

          // Withheld array elements are dropped from the recreated view, shifting indices.
          let Some(disclosure) = disclosures.get(&digest_str) else {
            continue;
          };
          if disclosure.claim_name.is_some() {
            return Err(Error::InvalidDisclosure("array length must be 2".to_string()));
          }
          processed_digests.insert(digest_str);

          let element_path = path.join(ClaimPathSegment::Index(output.len()));
          let recursively_decoded = match disclosure.claim_value {
            Value::Array(ref sub_arr) => {
              Value::Array(self.decode_array(sub_arr, disclosures, processed_digests, &element_path, visitor)?)
            }
            Value::Object(ref sub_obj) => {
              Value::Object(self.decode_object(sub_obj, disclosures, processed_digests, &element_path, visitor)?)
            }
            _ => disclosure.claim_value.clone(),
          };

          visitor.visit_disclosed_claim(&element_path, disclosure);
          output.push(recursively_decoded);
        } else {
          let element_path = path.join(ClaimPathSegment::Index(output.len()));
          let decoded_object = self.decode_object(object, disclosures, processed_digests, &element_path, visitor)?;
          output.push(Value::Object(decoded_object));
        }
      } else if let Some(arr) = value.as_array() {
        let element_path = path.join(ClaimPathSegment::Index(output.len()));
        let decoded = self.decode_array(arr, disclosures, processed_digests, &element_path, visitor)?;
        output.push(Value::Array(decoded));
      } else {
        output.push(value.clone());
      }
    }

    Ok(output)
  }
}

#[cfg(test)]
mod test {
  use std::collections::HashMap;

  use crate::ClaimPath;
  use crate::Disclosure;
  use crate::Error;
  use crate::Hasher;
  use crate::SdObjectDecoder;
  use crate::SdObjectEncoder;
  use crate::Sha256Hasher;
  use crate::Visitor;
  use serde_json::json;
  use serde_json::Value;

  fn digest_map(hasher: &dyn Hasher, disclosures: Vec<Disclosure>) -> HashMap<String, Disclosure> {
    disclosures
      .into_iter()
      .map(|d| (hasher.encoded_digest(&d.to_string()), d))
      .collect()
  }

  #[test]
  fn collision() {
    let object = json!({ "id": "did:value" });
    let hasher = Sha256Hasher::new();
    let mut encoder = SdObjectEncoder::try_from(object).unwrap();
    let dis = encoder.conceal("/id").unwrap();
    encoder
      .object
      .as_object_mut()
      .unwrap()
      .insert("id".to_string(), Value::String("id-value".to_string()));
    let decoder = SdObjectDecoder;
    let decoded = decoder
      .decode(encoder.object().as_object().unwrap(), &digest_map(&hasher, vec![dis]))
      .unwrap_err();
    assert!(matches!(decoded, Error::ClaimCollisionError(_)));
  }

  #[test]
  fn sd_alg_is_stripped() {
    let object = json!({ "id": "did:value", "claim1": ["abc"] });
    let mut encoder = SdObjectEncoder::try_from(object).unwrap();
    encoder.add_sd_alg_property();
    assert_eq!(encoder.object().get("_sd_alg").unwrap(), "sha-256");
    let decoder = SdObjectDecoder;
    let decoded = decoder
      .decode(encoder.object().as_object().unwrap(), &HashMap::new())
      .unwrap();
    assert!(decoded.get("_sd_alg").is_none());
  }

  #[test]
  fn duplicate_digest() {
    let object = json!({ "id": "did:value" });
    let hasher = Sha256Hasher::new();
    let mut encoder = SdObjectEncoder::try_from(object).unwrap();
    let disclosure = encoder.conceal("/id").unwrap();
    let digest = hasher.encoded_digest(&disclosure.to_string());
    let obj = json!({ "_sd": [digest.clone(), digest] });
    let decoder = SdObjectDecoder;
    let result = decoder.decode(obj.as_object().unwrap(), &digest_map(&hasher, vec![disclosure]));
    assert!(matches!(result.unwrap_err(), Error::DuplicateDigestError(_)));
  }

  #[test]
  fn unused_disclosure() {
    let object = json!({ "id": "did:value", "tst": "tst-value" });
    let hasher = Sha256Hasher::new();
    let mut encoder = SdObjectEncoder::try_from(object).unwrap();
    let disclosure_1 = encoder.conceal("/id").unwrap();
    let disclosure_2 = encoder.conceal("/tst").unwrap();
    let digest_1 = hasher.encoded_digest(&disclosure_1.to_string());
    let obj = json!({ "_sd": [digest_1] });
    let decoder = SdObjectDecoder;
    let result = decoder.decode(
      obj.as_object().unwrap(),
      &digest_map(&hasher, vec![disclosure_1, disclosure_2]),
    );
    assert!(matches!(result.unwrap_err(), Error::UnusedDisclosures(1)));
  }

  #[test]
  fn withheld_array_element_is_dropped() {
    let object = json!({ "nationalities": ["DE", "US"] });
    let hasher = Sha256Hasher::new();
    let mut encoder = SdObjectEncoder::try_from(object).unwrap();
    encoder.conceal("/nationalities/0").unwrap();
    let decoder = SdObjectDecoder;
    // No disclosures supplied: the withheld element is dropped, not nulled.
    let decoded = decoder
      .decode(encoder.object().as_object().unwrap(), &digest_map(&hasher, vec![]))
      .unwrap();
    assert_eq!(decoded.get("nationalities").unwrap().as_array().unwrap().len(), 1);
  }

  #[test]
  fn visitor_records_path_per_disclosure() {
    let object = json!({ "address": { "locality": "Anytown" } });
    let hasher = Sha256Hasher::new();
    let mut encoder = SdObjectEncoder::try_from(object).unwrap();
    let locality = encoder.conceal("/address/locality").unwrap();
    let address = encoder.conceal("/address").unwrap();

    #[derive(Default)]
    struct Recorder(Vec<ClaimPath>);
    impl Visitor for Recorder {
      fn visit_disclosed_claim(&mut self, path: &ClaimPath, _disclosure: &Disclosure) {
        self.0.push(path.clone());
      }
    }

    let mut recorder = Recorder::default();
    let decoder = SdObjectDecoder;
    decoder
      .decode_with_visitor(
        encoder.object().as_object().unwrap(),
        &digest_map(&hasher, vec![locality, address]),
        &mut recorder,
      )
      .unwrap();
    assert_eq!(recorder.0.len(), 2);
  }
}
