// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The JWS-JSON serialization of an SD-JWT(-VC) presentation: an alternative
//! to the compact `jwt~d1~...~dn~[kb]` form that carries the same envelope,
//! disclosures, and key binding JWT as a JSON object instead of a
//! tilde-separated string.
//!
//! Grounded in [`crate::jwt::Jwt`]'s `header`/`claims`/`signature` split (the
//! protected header and payload are exactly what that type already owns) and
//! in the `#[serde(untagged)]` pattern [`crate::key_binding_jwt_claims::RequiredKeyBinding`]
//! already uses for a field that can take one of several JSON shapes, applied
//! here to the flattened-vs-general distinction.

use itertools::Itertools;
use multibase::Base;
use serde::Deserialize;
use serde::Serialize;

use crate::jwt::Jwt;
use crate::Disclosure;
use crate::Error;
use crate::KeyBindingJwt;
use crate::Result;
use crate::SdJwt;
use crate::SdJwtClaims;

/// The unprotected header carrying disclosures and an optional key binding
/// JWT, per spec.md §4.6: these never go under `protected` since a verifier
/// must be able to read them without first verifying the signature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnprotectedHeader {
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub disclosures: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub kb_jwt: Option<String>,
}

/// The Flattened JWS-JSON Serialization: a single signature inlined into the
/// top-level object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlattenedJwsJson {
  pub payload: String,
  pub protected: String,
  #[serde(default)]
  pub header: UnprotectedHeader,
  pub signature: String,
}

/// One entry of a [`GeneralJwsJson`]'s `signatures` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwsJsonSignature {
  pub protected: String,
  #[serde(default)]
  pub header: UnprotectedHeader,
  pub signature: String,
}

/// The General JWS-JSON Serialization: an explicit `signatures` array.
///
/// An SD-JWT presentation carries exactly one issuer signature, so
/// [`GeneralJwsJson::into_sd_jwt`] rejects any instance whose `signatures`
/// does not have exactly one entry, per spec.md §4.6 ("the general form must
/// contain exactly one signature").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralJwsJson {
  pub payload: String,
  pub signatures: Vec<JwsJsonSignature>,
}

/// Either serialization form, accepted interchangeably on parse.
///
/// `serde(untagged)` tries `Flattened` first; a document carrying
/// `signatures` instead of `signature` falls through to `General`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JwsJson {
  Flattened(FlattenedJwsJson),
  General(GeneralJwsJson),
}

impl FlattenedJwsJson {
  fn into_parts(self) -> Result<(String, String, String, UnprotectedHeader)> {
    Ok((self.protected, self.payload, self.signature, self.header))
  }
}

impl GeneralJwsJson {
  fn into_parts(mut self) -> Result<(String, String, String, UnprotectedHeader)> {
    if self.signatures.len() != 1 {
      return Err(Error::ParsingError(format!(
        "general JWS-JSON serialization must carry exactly one signature, found {}",
        self.signatures.len()
      )));
    }
    let entry = self.signatures.remove(0);
    Ok((entry.protected, self.payload, entry.signature, entry.header))
  }
}

impl JwsJson {
  /// Parses `s` as either JWS-JSON form and reconstructs the [`SdJwt`] it encodes.
  ///
  /// ## Error
  /// [`Error::ParsingError`] if `s` is not valid JSON, is a general-form
  /// document without exactly one signature, or any disclosure/key-binding
  /// string it carries fails to parse.
  pub fn parse(s: &str) -> Result<SdJwt> {
    let parsed: JwsJson =
      serde_json::from_str(s).map_err(|e| Error::ParsingError(format!("invalid JWS-JSON serialization: {e}")))?;
    parsed.into_sd_jwt()
  }

  fn into_sd_jwt(self) -> Result<SdJwt> {
    let (protected, payload, signature, header) = match self {
      JwsJson::Flattened(flattened) => flattened.into_parts()?,
      JwsJson::General(general) => general.into_parts()?,
    };

    let header_bytes = Base::Base64Url
      .decode(&protected)
      .map_err(|e| Error::ParsingError(format!("protected header is not Base64Url-encoded: {e}")))?;
    let jwt_header = serde_json::from_slice(&header_bytes)
      .map_err(|e| Error::ParsingError(format!("protected header is not a JSON object: {e}")))?;

    let payload_bytes = Base::Base64Url
      .decode(&payload)
      .map_err(|e| Error::ParsingError(format!("payload is not Base64Url-encoded: {e}")))?;
    let claims: SdJwtClaims = serde_json::from_slice(&payload_bytes)
      .map_err(|e| Error::ParsingError(format!("payload is not valid SD-JWT claims: {e}")))?;

    let (disclosures, failed): (Vec<_>, Vec<_>) = header
      .disclosures
      .iter()
      .map(|d| Disclosure::parse(d).map_err(|_| d.clone()))
      .partition_result();
    if !failed.is_empty() {
      return Err(Error::InvalidDisclosures(failed));
    }

    let key_binding_jwt = header.kb_jwt.map(|kb| kb.parse::<KeyBindingJwt>()).transpose()?;

    let jwt = Jwt {
      header: jwt_header,
      claims,
      signature,
    };

    Ok(SdJwt::new(jwt, disclosures, key_binding_jwt))
  }
}

impl SdJwt {
  /// Serializes this presentation as the Flattened JWS-JSON form.
  pub fn to_flattened_jws_json(&self) -> FlattenedJwsJson {
    let jwt = self.jwt();
    FlattenedJwsJson {
      protected: Base::Base64Url.encode(serde_json::to_vec(&jwt.header).expect("header always serializes")),
      payload: Base::Base64Url.encode(serde_json::to_vec(&jwt.claims).expect("claims always serialize")),
      signature: jwt.signature.clone(),
      header: UnprotectedHeader {
        disclosures: self.disclosures().iter().map(Disclosure::to_string).collect(),
        kb_jwt: self.key_binding_jwt().map(KeyBindingJwt::to_string),
      },
    }
  }

  /// Serializes this presentation as the General JWS-JSON form.
  pub fn to_general_jws_json(&self) -> GeneralJwsJson {
    let flattened = self.to_flattened_jws_json();
    GeneralJwsJson {
      payload: flattened.payload,
      signatures: vec![JwsJsonSignature {
        protected: flattened.protected,
        header: flattened.header,
        signature: flattened.signature,
      }],
    }
  }

  /// Parses either JWS-JSON serialization form into an [`SdJwt`].
  pub fn parse_jws_json(s: &str) -> Result<Self> {
    JwsJson::parse(s)
  }
}
