// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use super::Disclosure;
use super::Hasher;
use crate::Error;
use crate::Result;
use crate::Sha256Hasher;
use rand::Rng;
use serde_json::json;
use serde_json::Map;
use serde_json::Value;

pub(crate) const DIGESTS_KEY: &str = "_sd";
pub(crate) const ARRAY_DIGEST_KEY: &str = "...";
pub(crate) const DEFAULT_SALT_SIZE: usize = 30;
pub(crate) const SD_ALG: &str = "_sd_alg";

/// Transforms a JSON object into an SD-JWT object by substituting selected values
/// with their corresponding disclosure digests.
///
/// Values are addressed by [JSON pointer](https://datatracker.ietf.org/doc/html/rfc6901)
/// (`/claim1/claim2`); this is the primitive [`crate::factory::SdJwtFactory`] drives to
/// turn a [`crate::disclosable::DisclosableSpecObject`] tree into a payload.
#[derive(Debug, Clone)]
pub struct SdObjectEncoder<H: Hasher = Sha256Hasher> {
  pub(crate) object: Value,
  salt_size: usize,
  hasher: H,
}

impl SdObjectEncoder<Sha256Hasher> {
  /// Creates a new [`SdObjectEncoder`] with `sha-256` hash function.
  ///
  /// ## Error
  /// Returns [`Error::DeserializationError`] if `object` is not a valid JSON object.
  pub fn new(object: &str) -> Result<Self> {
    let value: Value = serde_json::from_str(object).map_err(|e| Error::DeserializationError(e.to_string()))?;
    Self::with_custom_hasher(value, Sha256Hasher::new())
  }

  /// Creates a new [`SdObjectEncoder`] with `sha-256` hash function from a serializable object.
  ///
  /// ## Error
  /// Returns [`Error::DeserializationError`] if `object` can not be serialized into a valid JSON object.
  pub fn try_from_serializable<T: serde::Serialize>(object: T) -> Result<Self> {
    let value = serde_json::to_value(object).map_err(|e| Error::DeserializationError(e.to_string()))?;
    Self::with_custom_hasher(value, Sha256Hasher::new())
  }
}

impl TryFrom<Value> for SdObjectEncoder<Sha256Hasher> {
  type Error = crate::Error;

  fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
    Self::with_custom_hasher(value, Sha256Hasher::new())
  }
}

impl<H: Hasher> SdObjectEncoder<H> {
  /// Creates a new [`SdObjectEncoder`] with a custom hash function to create digests.
  ///
  /// ## Error
  /// Returns [`Error::DataTypeMismatch`] if `object` is not a JSON object.
  pub fn with_custom_hasher(object: Value, hasher: H) -> Result<Self> {
    Self::with_custom_hasher_and_salt_size(object, hasher, DEFAULT_SALT_SIZE)
  }

  /// Creates a new [`SdObjectEncoder`] with a custom hash function and salt size.
  ///
  /// ## Error
  /// Returns [`Error::DataTypeMismatch`] if `object` is not a JSON object.
  pub fn with_custom_hasher_and_salt_size(object: Value, hasher: H, salt_size: usize) -> Result<Self> {
    if !object.is_object() {
      return Err(Error::DataTypeMismatch("expected object".to_owned()));
    }
    Ok(Self {
      object,
      salt_size,
      hasher,
    })
  }

  /// Substitutes the value at `pointer` with the digest of its disclosure.
  ///
  /// `pointer` addresses the value using the syntax of
  /// [JSON pointer](https://datatracker.ietf.org/doc/html/rfc6901), e.g. `/claim1/claim2`.
  /// If the pointer resolves to an array element, the element is concealed as an
  /// `ArrayElement` disclosure instead; use a pointer to the array itself plus
  /// `add_decoys` for decoy entries in arrays.
  ///
  /// ## Error
  /// * [`Error::InvalidPath`] if `pointer` is invalid or does not resolve.
  /// * [`Error::DataTypeMismatch`] if a path segment is not a container.
  pub fn conceal(&mut self, pointer: &str) -> Result<Disclosure> {
    let segments = Self::split_pointer(pointer)?;
    let salt = Self::gen_rand(self.salt_size);

    let parent = Self::navigate_to_parent(&mut self.object, &segments[..segments.len() - 1])?;
    let last = segments[segments.len() - 1].as_str();

    match parent {
      Value::Object(map) => {
        check_reserved_name(last)?;
        let value = map
          .remove(last)
          .ok_or_else(|| Error::InvalidPath(format!("{last} does not exist")))?;
        let disclosure = Disclosure::new(salt, Some(last.to_owned()), value);
        let hash = self.hasher.encoded_digest(&disclosure.to_string());
        Self::add_digest_to_object(map, hash)?;
        Ok(disclosure)
      }
      Value::Array(array) => {
        let index: usize = last
          .parse()
          .map_err(|_| Error::InvalidPath(format!("{last} is not a valid array index")))?;
        if index >= array.len() {
          return Err(Error::IndexOutofBounds(index));
        }
        let disclosure = Disclosure::new(salt, None, array[index].clone());
        let hash = self.hasher.encoded_digest(&disclosure.to_string());
        array[index] = json!({ ARRAY_DIGEST_KEY: hash });
        Ok(disclosure)
      }
      _ => Err(Error::DataTypeMismatch(format!("{last}'s parent is not a container"))),
    }
  }

  /// Adds a decoy digest at `pointer`. Use an empty string to add decoys at the top level.
  ///
  /// If `pointer` resolves to an object, the decoy is appended to its `_sd` array; if it
  /// resolves to an array, a sentinel `{"...": <digest>}` decoy entry is appended.
  pub fn add_decoys(&mut self, pointer: &str, number_of_decoys: usize) -> Result<()> {
    for _ in 0..number_of_decoys {
      self.add_decoy(pointer)?;
    }
    Ok(())
  }

  fn add_decoy(&mut self, pointer: &str) -> Result<Disclosure> {
    let segments = Self::split_pointer(pointer)?;
    if let Some(last) = segments.last() {
      check_reserved_name(last)?;
    }
    let target = Self::navigate_to_parent(&mut self.object, &segments)?;

    match target {
      Value::Object(map) => {
        let (disclosure, hash) = Self::random_digest(&self.hasher, self.salt_size, false);
        Self::add_digest_to_object(map, hash)?;
        Ok(disclosure)
      }
      Value::Array(array) => {
        let (disclosure, hash) = Self::random_digest(&self.hasher, self.salt_size, true);
        array.push(json!({ ARRAY_DIGEST_KEY: hash }));
        Ok(disclosure)
      }
      _ => Err(Error::DataTypeMismatch(
        "decoys can only be added to objects or arrays".to_string(),
      )),
    }
  }

  /// Splits a JSON pointer into its non-empty segments. The root pointer (`""` or `"/"`)
  /// yields an empty segment list.
  fn split_pointer(pointer: &str) -> Result<Vec<String>> {
    if pointer.is_empty() {
      return Ok(Vec::new());
    }
    if !pointer.starts_with('/') {
      return Err(Error::InvalidPath(format!(
        "{pointer} is not a valid JSON pointer: must start with '/'"
      )));
    }
    Ok(
      pointer
        .split('/')
        .skip(1)
        .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
        .collect(),
    )
  }

  fn navigate_to_parent<'o>(object: &'o mut Value, segments: &[String]) -> Result<&'o mut Value> {
    let mut current = object;
    for segment in segments {
      current = match current {
        Value::Object(map) => map
          .get_mut(segment.as_str())
          .ok_or_else(|| Error::InvalidPath(format!("{segment} does not exist")))?,
        Value::Array(array) => {
          let index: usize = segment
            .parse()
            .map_err(|_| Error::InvalidPath(format!("{segment} is not a valid array index")))?;
          array.get_mut(index).ok_or(Error::IndexOutofBounds(index))?
        }
        _ => return Err(Error::DataTypeMismatch(format!("{segment} is not a container"))),
      };
    }
    Ok(current)
  }

  /// Adds the `_sd_alg` property to the top level of the object, naming the hash
  /// algorithm used for every digest this encoder has produced.
  pub fn add_sd_alg_property(&mut self) -> Option<Value> {
    self
      .object
      .as_object_mut()
      .expect("object invariant upheld by constructors")
      .insert(SD_ALG.to_string(), Value::String(self.hasher.alg_name().to_string()))
  }

  /// Returns the modified object as a string.
  pub fn try_to_string(&self) -> Result<String> {
    serde_json::to_string(&self.object)
      .map_err(|_e| Error::Unspecified("error while serializing internal object".to_string()))
  }

  /// Add the hash to the "_sd" array if it exists; otherwise, create the array and insert the hash.
  fn add_digest_to_object(object: &mut Map<String, Value>, digest: String) -> Result<()> {
    if let Some(sd_value) = object.get_mut(DIGESTS_KEY) {
      if let Value::Array(value) = sd_value {
        value.push(Value::String(digest))
      } else {
        return Err(Error::DataTypeMismatch(
          "invalid object: existing `_sd` type is not an array".to_string(),
        ));
      }
    } else {
      object.insert(DIGESTS_KEY.to_owned(), Value::Array(vec![Value::String(digest)]));
    }
    Ok(())
  }

  fn random_digest(hasher: &dyn Hasher, salt_len: usize, array_entry: bool) -> (Disclosure, String) {
    let mut rng = rand::thread_rng();
    let salt = Self::gen_rand(salt_len);
    let decoy_value_length = rng.gen_range(20..=100);
    let decoy_claim_name = if array_entry {
      None
    } else {
      let decoy_claim_name_length = rng.gen_range(4..=10);
      Some(Self::gen_rand(decoy_claim_name_length))
    };
    let decoy_value = Self::gen_rand(decoy_value_length);
    let disclosure = Disclosure::new(salt, decoy_claim_name, Value::String(decoy_value));
    let hash = hasher.encoded_digest(&disclosure.to_string());
    (disclosure, hash)
  }

  fn gen_rand(len: usize) -> String {
    let mut rng = rand::thread_rng();
    let random_bytes: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
    multibase::Base::Base64Url.encode(random_bytes)
  }

  /// Returns a reference to the internal object.
  pub fn object(&self) -> &Value {
    &self.object
  }

  /// Returns the used salt length.
  pub fn salt_size(&self) -> usize {
    self.salt_size
  }

  /// Sets the size of the random data used to generate disclosure salts, in bytes.
  ///
  /// ## Warning
  /// Salt size must be >= 16.
  pub fn set_salt_size(&mut self, salt_size: usize) -> Result<()> {
    if salt_size < 16 {
      Err(Error::InvalidSaltSize)
    } else {
      self.salt_size = salt_size;
      Ok(())
    }
  }
}

fn check_reserved_name(name: &str) -> Result<()> {
  if name == DIGESTS_KEY || name == ARRAY_DIGEST_KEY || name == SD_ALG {
    return Err(Error::ReservedClaimName(name.to_string()));
  }
  Ok(())
}

#[cfg(test)]
mod test {

  use super::SdObjectEncoder;
  use crate::Error;
  use serde::Serialize;
  use serde_json::json;
  use serde_json::Value;

  #[derive(Serialize)]
  struct TestStruct {
    id: String,
    claim2: Vec<String>,
  }

  fn object() -> Value {
    json!({
      "id": "did:value",
      "claim1": {
        "abc": true
      },
      "claim2": ["arr-value1", "arr-value2"]
    })
  }

  #[test]
  fn simple() {
    let mut encoder = SdObjectEncoder::try_from(object()).unwrap();
    encoder.conceal("/claim1/abc").unwrap();
    encoder.conceal("/id").unwrap();
    encoder.add_decoys("", 10).unwrap();
    encoder.add_decoys("/claim2", 10).unwrap();
    assert!(encoder.object().get("id").is_none());
    assert_eq!(encoder.object().get("_sd").unwrap().as_array().unwrap().len(), 11);
    assert_eq!(encoder.object().get("claim2").unwrap().as_array().unwrap().len(), 12);
  }

  #[test]
  fn errors() {
    let mut encoder = SdObjectEncoder::try_from(object()).unwrap();
    encoder.conceal("/claim1/abc").unwrap();
    assert!(matches!(encoder.conceal("/claim2/2").unwrap_err(), Error::IndexOutofBounds(2)));
  }

  #[test]
  fn conceal_rejects_reserved_claim_name() {
    let mut encoder = SdObjectEncoder::try_from(json!({ "_sd": [], "id": "did:value" })).unwrap();
    assert!(matches!(encoder.conceal("/_sd").unwrap_err(), Error::ReservedClaimName(_)));
  }

  #[test]
  fn add_decoys_rejects_reserved_claim_name() {
    let mut encoder = SdObjectEncoder::try_from(object()).unwrap();
    assert!(matches!(
      encoder.add_decoys("/_sd_alg", 1).unwrap_err(),
      Error::ReservedClaimName(_)
    ));
  }

  #[test]
  fn test_wrong_path() {
    let mut encoder = SdObjectEncoder::try_from(object()).unwrap();
    assert!(matches!(encoder.conceal("/claim12").unwrap_err(), Error::InvalidPath(_)));
    assert!(matches!(encoder.conceal("/claim12/0").unwrap_err(), Error::InvalidPath(_)));
  }

  #[test]
  fn test_from_serializable() {
    let test_value = TestStruct {
      id: "did:value".to_string(),
      claim2: vec!["arr-value1".to_string(), "arr-vlaue2".to_string()],
    };
    let mut encoder = SdObjectEncoder::try_from_serializable(test_value).unwrap();
    encoder.conceal("/id").unwrap();
    encoder.add_decoys("", 10).unwrap();
    encoder.add_decoys("/claim2", 10).unwrap();
    assert!(encoder.object().get("id").is_none());
    assert_eq!(encoder.object().get("_sd").unwrap().as_array().unwrap().len(), 11);
    assert_eq!(encoder.object().get("claim2").unwrap().as_array().unwrap().len(), 12);
  }

  #[test]
  fn conceal_array_entry() {
    let mut encoder = SdObjectEncoder::try_from(object()).unwrap();
    let disclosure = encoder.conceal("/claim2/0").unwrap();
    assert!(disclosure.claim_name.is_none());
    let array = encoder.object().get("claim2").unwrap().as_array().unwrap();
    assert_eq!(array.len(), 2);
    assert!(array[0].get("...").is_some());
  }
}
