// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use crate::Error;
use serde_json::Value;
use std::fmt::Display;

/// A disclosable value.
/// Both object properties and array elements disclosures are supported.
///
/// See: https://www.ietf.org/archive/id/draft-ietf-oauth-selective-disclosure-jwt-07.html#name-disclosures
///
/// The Base64Url-encoded form this was parsed from (or, for a freshly built
/// disclosure, the form computed at construction time) is kept in `raw` and
/// is what `Display` emits: a disclosure's digest is taken over the exact
/// bytes it was written with, so round-tripping through `salt`/`claim_name`/
/// `claim_value` and re-serializing would silently change the hash whenever
/// the original JSON carried insignificant whitespace or non-canonical
/// escapes. `raw` is excluded from `PartialEq`/`Eq`: two disclosures with the
/// same salt, name and value are equal regardless of how they were spelled.
#[derive(Debug, Clone)]
pub struct Disclosure {
  /// The salt value.
  pub salt: String,
  /// The claim name, optional for array elements.
  pub claim_name: Option<String>,
  /// The claim Value which can be of any type.
  pub claim_value: Value,
  raw: String,
}

impl PartialEq for Disclosure {
  fn eq(&self, other: &Self) -> bool {
    self.salt == other.salt && self.claim_name == other.claim_name && self.claim_value == other.claim_value
  }
}

impl Eq for Disclosure {}

impl Disclosure {
  /// Creates a new instance of [`Disclosure`].
  ///
  /// Use `.to_string()` to get the actual disclosure.
  pub fn new(salt: String, claim_name: Option<String>, claim_value: Value) -> Self {
    let raw = Self::encode(&salt, claim_name.as_deref(), &claim_value);
    Self {
      salt,
      claim_name,
      claim_value,
      raw,
    }
  }

  /// Encodes a salt/name/value triple as a Base64Url disclosure, using the
  /// canonical, whitespace-free JSON serialization `serde_json` produces.
  fn encode(salt: &str, claim_name: Option<&str>, claim_value: &Value) -> String {
    let json = if let Some(name) = claim_name {
      serde_json::to_string(&serde_json::json!([salt, name, claim_value]))
    } else {
      serde_json::to_string(&serde_json::json!([salt, claim_value]))
    }
    .expect("JSON array of a salt, optional name and a Value always serializes");
    multibase::Base::Base64Url.encode(json)
  }

  /// Parses a Base64 encoded disclosure into a [`Disclosure`].
  ///
  /// ## Error
  ///
  /// Returns an [`Error::InvalidDisclosure`] if input is not a valid disclosure.
  pub fn parse(disclosure: &str) -> Result<Self, Error> {
    let decoded: Vec<Value> = multibase::Base::Base64Url
      .decode(disclosure)
      .map_err(|_e| {
        Error::InvalidDisclosure(format!(
          "Base64 decoding of the disclosure was not possible {}",
          disclosure
        ))
      })
      .and_then(|data| {
        serde_json::from_slice(&data).map_err(|_e| {
          Error::InvalidDisclosure(format!(
            "decoded disclosure could not be deserialized as an array {}",
            disclosure
          ))
        })
      })?;

    if decoded.len() == 2 {
      Ok(Self {
        salt: decoded
          .first()
          .ok_or(Error::InvalidDisclosure("invalid salt".to_string()))?
          .as_str()
          .ok_or(Error::InvalidDisclosure(
            "salt could not be parsed as a string".to_string(),
          ))?
          .to_owned(),
        claim_name: None,
        claim_value: decoded
          .get(1)
          .ok_or(Error::InvalidDisclosure("invalid claim value".to_string()))?
          .clone(),
        raw: disclosure.to_owned(),
      })
    } else if decoded.len() == 3 {
      let claim_name = decoded
        .get(1)
        .ok_or(Error::InvalidDisclosure("invalid claim name".to_string()))?
        .as_str()
        .ok_or(Error::InvalidDisclosure(
          "claim name could not be parsed as a string".to_string(),
        ))?
        .to_owned();
      if is_reserved_claim_name(&claim_name) {
        return Err(Error::InvalidDisclosure(format!(
          "reserved claim name `{claim_name}` cannot appear in a disclosure"
        )));
      }
      Ok(Self {
        salt: decoded
          .first()
          .ok_or(Error::InvalidDisclosure("invalid salt".to_string()))?
          .as_str()
          .ok_or(Error::InvalidDisclosure(
            "salt could not be parsed as a string".to_string(),
          ))?
          .to_owned(),
        claim_name: Some(claim_name),
        claim_value: decoded
          .get(2)
          .ok_or(Error::InvalidDisclosure("invalid claim value".to_string()))?
          .clone(),
        raw: disclosure.to_owned(),
      })
    } else {
      Err(Error::InvalidDisclosure(format!(
        "deserialized array has an invalid length of {}",
        decoded.len()
      )))
    }
  }
}

/// `_sd`, `...`, and `_sd_alg` are reserved for the digest machinery itself;
/// an issuer-supplied claim name in a disclosure must not collide with them.
fn is_reserved_claim_name(name: &str) -> bool {
  name == crate::DIGESTS_KEY || name == crate::ARRAY_DIGEST_KEY || name == crate::SD_ALG
}

impl Display for Disclosure {
  /// Emits the exact bytes this disclosure was parsed from (or, for a
  /// disclosure built via [`Disclosure::new`], the canonical encoding
  /// computed once at construction time). Never re-derived from
  /// `salt`/`claim_name`/`claim_value`, since a digest is only reproducible
  /// over the disclosure string as written.
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.raw)
  }
}

#[cfg(test)]
mod test {
  use super::Disclosure;

  // Canonical, whitespace-free encoding. The salt/name/value triple and its encoding
  // come from the example quoted in the hashing-disclosures examples; the encoder here
  // purposefully omits the insignificant whitespace some IETF draft listings include.
  #[test]
  fn test_creating_object_property() {
    let disclosure = Disclosure::new(
      "_26bc4LT-ac6q2KI6cBW5es".to_owned(),
      Some("family_name".to_owned()),
      "Möbius".to_owned().into(),
    );
    assert_eq!(
      "WyJfMjZiYzRMVC1hYzZxMktJNmNCVzVlcyIsImZhbWlseV9uYW1lIiwiTcO2Yml1cyJd",
      disclosure.to_string()
    );
  }

  #[test]
  fn test_creating_array_element() {
    let disclosure = Disclosure::new("lklxF5jMYlGTPUovMNIvCA".to_owned(), None, "US".to_owned().into());
    assert_eq!("WyJsa2x4RjVqTVlsR1RQVW92TU5JdkNBIiwiVVMiXQ", disclosure.to_string());
  }

  #[test]
  fn round_trip() {
    let disclosure = Disclosure::new(
      "2GLC42sKQveCfGfryNRN9w".to_string(),
      Some("time".to_owned()),
      "2012-04-23T18:25Z".to_owned().into(),
    );
    let parsed = Disclosure::parse(&disclosure.to_string()).unwrap();
    assert_eq!(parsed, disclosure);
  }

  // `parse` must still accept disclosures created with insignificant whitespace, since
  // the JSON grammar allows it; only this crate's own encoder avoids producing it.
  #[test]
  fn parse_tolerates_whitespace_from_other_encoders() {
    let parsed = Disclosure::parse("WyIyR0xDNDJzS1F2ZUNmR2ZyeU5STjl3IiwgInRpbWUiLCAiMjAxMi0wNC0yM1QxODoyNVoiXQ").unwrap();
    assert_eq!(parsed.salt, "2GLC42sKQveCfGfryNRN9w");
    assert_eq!(parsed.claim_name.as_deref(), Some("time"));
  }

  #[test]
  fn rejects_reserved_claim_name() {
    use multibase::Base;
    let bad = Base::Base64Url.encode(serde_json::to_string(&serde_json::json!(["salt", "_sd", "v"])).unwrap());
    assert!(Disclosure::parse(&bad).is_err());
  }

  #[test]
  fn rejects_wrong_length() {
    use multibase::Base;
    let bad = Base::Base64Url.encode(serde_json::to_string(&serde_json::json!(["only-one"])).unwrap());
    assert!(Disclosure::parse(&bad).is_err());
  }

  // The disclosure's digest is taken over the bytes it was written with, so a
  // disclosure created with insignificant whitespace or a non-canonical
  // escape must come back out of `Display` exactly as it went in, not
  // re-serialized through `salt`/`claim_name`/`claim_value`.
  #[test]
  fn display_preserves_original_bytes() {
    let original = "WyJHMDJOU3JRZmpGWFE3SW8wOXN5YWpBIiwgInJlZ2lvbiIsICJcdTZlMmZcdTUzM2EiXQ";
    let parsed = Disclosure::parse(original).unwrap();
    assert_eq!(parsed.to_string(), original);
  }
}
