// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The three issuer key-source strategies an SD-JWT-VC verifier chooses
//! between: `.well-known` issuer metadata, an X.509 certificate chain carried
//! in the JWS header's `x5c`, or a DID document.

use std::error::Error as StdError;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use crate::error::SdJwtVcError;
use crate::vc::metadata::validate_issuer_metadata;
use crate::vc::metadata::IssuerMetadata;
use crate::vc::metadata::Jwks;
use crate::Error;
use crate::JsonObject;
use crate::Jwt;
use crate::Resolver;
use crate::Result;

/// Which key source an issuer's JWT header directs the verifier to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySourceStrategy {
  /// `iss` resolves to `.well-known/jwt-vc-issuer` metadata.
  IssuerMetadata,
  /// The header's `x5c` carries a certificate chain rooted in a trust anchor
  /// the verifier already recognizes. Takes precedence over `kid` whenever
  /// `x5c` is present, since a certificate chain is itself a statement of key
  /// provenance that a bare `kid` lookup cannot contradict.
  X509,
  /// `iss` is a DID; the verification method is found in its DID document.
  Did,
}

/// A minimal DID document: only what this crate needs to pick out a
/// verification method's public key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DidDocument {
  pub id: String,
  #[serde(default, rename = "verificationMethod")]
  pub verification_method: Vec<VerificationMethod>,
}

impl DidDocument {
  /// Finds the verification method whose `id` equals `kid`, or the
  /// document's only verification method if `kid` is `None` and exactly one
  /// is present.
  pub fn find_verification_method(&self, kid: Option<&str>) -> Option<&VerificationMethod> {
    match kid {
      Some(kid) => self.verification_method.iter().find(|vm| vm.id == kid),
      None if self.verification_method.len() == 1 => self.verification_method.first(),
      None => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationMethod {
  pub id: String,
  #[serde(rename = "publicKeyJwk", skip_serializing_if = "Option::is_none")]
  pub public_key_jwk: Option<JsonObject>,
}

/// Validates an `x5c` certificate chain against a trust anchor. The core
/// never parses ASN.1/X.509 itself; callers supply whichever PKI library
/// they already depend on.
#[async_trait]
pub trait X509ChainValidator {
  type Error: StdError;
  /// Validates `chain` (DER-encoded certificates, leaf first) and returns
  /// the leaf certificate's public key as a JWK, or an error if the chain
  /// does not validate to a trusted root.
  async fn validate(&self, chain: &[Vec<u8>]) -> Result<JsonObject, Self::Error>;
}

/// The collaborators an SD-JWT-VC verifier needs to resolve an issuer's
/// signing key by any of the three strategies. A verifier typically only has
/// one of these configured, but the bundle keeps `verifier::Verifier`'s
/// constructor to a single argument.
pub struct IssuerKeyResolvers<MR, DR, XV, JR = MR> {
  pub issuer_metadata_resolver: Option<MR>,
  pub did_resolver: Option<DR>,
  pub x509_validator: Option<XV>,
  /// Dereferences a `jwks_uri` found in issuer metadata into its JWK set.
  /// Only consulted when the fetched [`IssuerMetadata`] carries `jwks_uri`
  /// rather than an inline `jwks`.
  pub jwks_uri_resolver: Option<JR>,
}

/// Picks the key source directed by `header` and resolves it to a JWK.
///
/// `x5c` takes precedence over `kid`/`iss`-based lookups whenever present,
/// per the resolved ambiguity between the two historical mechanisms: a
/// certificate chain is a stronger, self-contained statement of key
/// provenance, so a verifier that has configured an [`X509ChainValidator`]
/// and receives a header with `x5c` uses it even if `kid` is also present.
pub async fn resolve_issuer_key<MR, DR, XV, JR>(
  header: &JsonObject,
  iss: &str,
  resolvers: &IssuerKeyResolvers<MR, DR, XV, JR>,
) -> Result<JsonObject>
where
  MR: Resolver<String, IssuerMetadata> + Sync,
  DR: Resolver<String, DidDocument> + Sync,
  XV: X509ChainValidator + Sync,
  JR: Resolver<String, Jwks> + Sync,
{
  let kid = header.get("kid").and_then(|v| v.as_str());
  let x5c = header.get("x5c").and_then(|v| v.as_array());

  if let (Some(x5c), Some(validator)) = (x5c, &resolvers.x509_validator) {
    let chain = x5c
      .iter()
      .map(|cert| {
        cert
          .as_str()
          .ok_or_else(|| Error::SdJwtVc(SdJwtVcError::IssuerKeySourceError("x5c entry is not a string".to_string())))
          .and_then(|b64| {
            multibase::Base::Base64.decode(b64).map_err(|e| {
              Error::SdJwtVc(SdJwtVcError::IssuerKeySourceError(format!("x5c entry is not base64: {e}")))
            })
          })
      })
      .collect::<Result<Vec<Vec<u8>>>>()?;
    return validator
      .validate(&chain)
      .await
      .map_err(|e| Error::SdJwtVc(SdJwtVcError::IssuerKeySourceError(e.to_string())));
  }

  if let Some(did_resolver) = iss.starts_with("did:").then_some(()).and(resolvers.did_resolver.as_ref()) {
    let doc = did_resolver
      .resolve(&iss.to_string())
      .await
      .map_err(|e| Error::SdJwtVc(SdJwtVcError::IssuerKeySourceError(e.to_string())))?;
    return doc
      .find_verification_method(kid)
      .and_then(|vm| vm.public_key_jwk.clone())
      .ok_or_else(|| {
        Error::SdJwtVc(SdJwtVcError::IssuerKeySourceError(format!(
          "no matching verification method for {iss}"
        )))
      });
  }

  if let Some(metadata_resolver) = &resolvers.issuer_metadata_resolver {
    let metadata = metadata_resolver
      .resolve(&iss.to_string())
      .await
      .map_err(|e| Error::SdJwtVc(SdJwtVcError::IssuerKeySourceError(e.to_string())))?;
    validate_issuer_metadata(&metadata, iss)?;
    let keys = match (metadata.jwks, metadata.jwks_uri) {
      (Some(jwks), None) => jwks.keys,
      (None, Some(jwks_uri)) => {
        let jwks_resolver = resolvers.jwks_uri_resolver.as_ref().ok_or_else(|| {
          Error::SdJwtVc(SdJwtVcError::IssuerKeySourceError(format!(
            "{iss} publishes jwks_uri but no jwks_uri_resolver is configured"
          )))
        })?;
        jwks_resolver
          .resolve(&jwks_uri)
          .await
          .map_err(|e| Error::SdJwtVc(SdJwtVcError::IssuerKeySourceError(e.to_string())))?
          .keys
      }
      // validate_issuer_metadata already rejects both-present/neither-present.
      _ => unreachable!("validate_issuer_metadata enforces exactly one of jwks/jwks_uri"),
    };
    return match kid {
      Some(kid) => keys
        .into_iter()
        .find(|k| k.get("kid").and_then(|v| v.as_str()) == Some(kid))
        .ok_or_else(|| Error::SdJwtVc(SdJwtVcError::IssuerKeySourceError(format!("no key with kid {kid}")))),
      None if keys.len() == 1 => Ok(keys.into_iter().next().expect("checked len == 1")),
      None => Err(Error::SdJwtVc(SdJwtVcError::IssuerKeySourceError(format!(
        "{iss} published multiple keys and the header carries no kid"
      )))),
    };
  }

  Err(Error::SdJwtVc(SdJwtVcError::IssuerKeySourceError(format!(
    "no configured key source resolver can handle issuer {iss}"
  ))))
}

/// Detects which [`KeySourceStrategy`] a parsed SD-JWT-VC's header/`iss`
/// direct the verifier to, without yet resolving the key.
pub fn detect_strategy<T>(jwt: &Jwt<T>, iss: &str) -> KeySourceStrategy {
  if jwt.header.contains_key("x5c") {
    KeySourceStrategy::X509
  } else if iss.starts_with("did:") {
    KeySourceStrategy::Did
  } else {
    KeySourceStrategy::IssuerMetadata
  }
}
