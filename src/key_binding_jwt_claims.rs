// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use anyhow::Context as _;
use async_trait::async_trait;
use itertools::Itertools;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::jwt::Jwt;
use crate::Error;
use crate::Hasher;
use crate::JsonObject;
use crate::JwsSigner;
use crate::Result;

/// JWT header `typ` for an SD-JWT's issuer-signed envelope.
pub(crate) const HEADER_TYP: &str = "sd-jwt";

/// The holder's committed key, carried in the credential's `cnf` claim per
/// [RFC 7800](https://www.rfc-editor.org/rfc/rfc7800.html#section-3).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequiredKeyBinding {
  /// The holder's public key, embedded directly as a JWK.
  Jwk { jwk: JsonObject },
  /// A reference to a key known to the verifier out-of-band.
  Kid { kid: String },
}

/// Claims set for a key binding JWT.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct KeyBindingJwtClaims {
  pub iat: i64,
  pub aud: String,
  pub nonce: String,
  pub sd_hash: String,
  #[serde(flatten)]
  pub properties: BTreeMap<String, Value>,
}

impl KeyBindingJwtClaims {
  pub const KB_JWT_HEADER_TYP: &'static str = "kb+jwt";

  /// Creates a new [`KeyBindingJwtClaims`], computing `sd_hash` over the presentation
  /// `jwt` and `disclosures` as specified: `hash(jwt ~ d1 ~ ... ~ dn ~)`.
  pub fn new(hasher: &dyn Hasher, jwt: String, disclosures: Vec<String>, nonce: String, aud: String, iat: i64) -> Self {
    let disclosures = disclosures.iter().join("~");
    let sd_jwt = format!("{}~{}~", jwt, disclosures);
    let hash = hasher.encoded_digest(&sd_jwt);
    Self {
      iat,
      aud,
      nonce,
      sd_hash: hash,
      properties: BTreeMap::new(),
    }
  }
}

/// A holder-signed proof of possession, presented alongside an [`crate::SdJwt`] when the
/// credential requires key binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBindingJwt(Jwt<KeyBindingJwtClaims>);

impl KeyBindingJwt {
  pub fn claims(&self) -> &KeyBindingJwtClaims {
    &self.0.claims
  }

  pub fn header(&self) -> &JsonObject {
    &self.0.header
  }

  /// Signs `claims` into a [`KeyBindingJwt`] using `signer` and algorithm `alg`.
  pub async fn build<S>(claims: KeyBindingJwtClaims, signer: &S, alg: &str) -> Result<Self>
  where
    S: JwsSigner,
  {
    let Value::Object(header) = serde_json::json!({
      "typ": KeyBindingJwtClaims::KB_JWT_HEADER_TYP,
      "alg": alg,
    }) else {
      unreachable!();
    };
    let Value::Object(payload) = serde_json::to_value(&claims).map_err(|e| Error::DeserializationError(e.to_string()))?
    else {
      unreachable!();
    };
    let signature = signer
      .sign(&header, &payload)
      .await
      .map(|bytes| multibase::Base::Base64Url.encode(bytes))
      .map_err(|e| Error::JwsSignerFailure(e.to_string()))?;

    Ok(Self(Jwt {
      header,
      claims,
      signature,
    }))
  }
}

impl Display for KeyBindingJwt {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    Display::fmt(&self.0, f)
  }
}

impl FromStr for KeyBindingJwt {
  type Err = Error;
  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    Ok(Self(s.parse()?))
  }
}

/// Verifies a key binding JWT's signature and returns it parsed, delegating signature
/// validation to `verifier` (which also checks the JWS `alg` matches the key found in
/// `cnf`).
#[async_trait]
pub(crate) trait VerifyKeyBindingJwt {
  async fn verify_kb_jwt<V>(self, verifier: &V) -> Result<KeyBindingJwtClaims>
  where
    V: crate::JwsVerifier + Sync;
}

#[async_trait]
impl VerifyKeyBindingJwt for KeyBindingJwt {
  async fn verify_kb_jwt<V>(self, verifier: &V) -> Result<KeyBindingJwtClaims>
  where
    V: crate::JwsVerifier + Sync,
  {
    let signature = multibase::Base::Base64Url
      .decode(&self.0.signature)
      .context("signature is not Base64Url-encoded")
      .map_err(|e| Error::KeyBindingFailed(crate::error::KeyBindingError::InvalidKbJwt(e.to_string())))?;
    verifier
      .verify(&self.0.header, &self.0.claims_as_object()?, &signature)
      .await
      .map_err(|e| Error::KeyBindingFailed(crate::error::KeyBindingError::InvalidKbJwt(e.to_string())))?;
    Ok(self.0.claims)
  }
}

impl Jwt<KeyBindingJwtClaims> {
  fn claims_as_object(&self) -> Result<JsonObject> {
    match serde_json::to_value(&self.claims).map_err(|e| Error::DeserializationError(e.to_string()))? {
      Value::Object(map) => Ok(map),
      _ => unreachable!("KeyBindingJwtClaims always serializes to an object"),
    }
  }
}
