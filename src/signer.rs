// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::error::Error;

use async_trait::async_trait;
use serde_json::Map;
use serde_json::Value;

pub type JsonObject = Map<String, Value>;

/// JSON Web Signature (JWS) signer.
///
/// Implementations compute the detached signature over the JWS signing input
/// `base64url(header) || "." || base64url(payload)`; they never assemble the
/// compact serialization themselves, since [`crate::Jwt`] owns that.
#[async_trait]
pub trait JwsSigner {
  type Error: Error;
  /// Signs `header`.`payload` and returns the raw signature bytes. The algorithm
  /// used for signing must be read from the `alg` property of `header`.
  async fn sign(&self, header: &JsonObject, payload: &JsonObject) -> Result<Vec<u8>, Self::Error>;
}

/// JSON Web Signature (JWS) verifier.
///
/// A capability interface mirroring [`JwsSigner`]: the core stores an opaque
/// `Jwt<T>` and delegates all cryptographic work to a caller-supplied
/// implementation, never embedding a key management or algorithm registry of
/// its own.
#[async_trait]
pub trait JwsVerifier {
  type Error: Error;
  /// Verifies the detached `signature` over `header`.`payload`, returning an
  /// error if it does not validate. The claims are already known to the
  /// caller from the parsed payload; this method only attests to the
  /// signature's validity over it.
  async fn verify(&self, header: &JsonObject, payload: &JsonObject, signature: &[u8]) -> Result<(), Self::Error>;
}
