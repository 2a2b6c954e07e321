// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The single verification pipeline every consumer of an SD-JWT(-VC)
//! presentation drives: parse, verify the issuer's signature, recreate the
//! claim set, optionally verify a key binding JWT, optionally validate
//! SD-JWT-VC type metadata.
//!
//! Grounded in [`crate::sd_jwt::SdJwt::into_disclosed_object`] for the
//! recreation step and [`crate::key_binding_jwt_claims::VerifyKeyBindingJwt`]
//! for the key binding step; this module's job is only to sequence those
//! existing primitives the same way for every caller, rather than leaving
//! each consumer to assemble the pipeline (and its error handling) by hand.

use crate::error::KeyBindingError;
use crate::JsonObject;
use crate::KeyBindingJwtClaims;
use crate::SdJwt;

use crate::key_binding_jwt_claims::VerifyKeyBindingJwt;
use crate::Disclosure;
use crate::Error;
use crate::Hasher;
use crate::JwsVerifier;
use crate::Result;

/// Whether a presentation is required to carry a key binding JWT.
///
/// Resolves the ambiguity between this crate's historical split into two
/// verifier surfaces (one for bare SD-JWTs, one requiring key binding): a
/// single pipeline now takes this as an explicit parameter instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyBindingPolicy {
  /// The presentation must carry a key binding JWT; its absence is an error.
  MustBePresent,
  /// The presentation must not carry a key binding JWT; its presence is an
  /// error (e.g. the credential's `cnf` is unset, so no key binding makes
  /// sense).
  MustNotBePresent,
  /// A key binding JWT is verified if present, accepted either way if not.
  Optional,
}

/// The expectations a key binding JWT must satisfy, checked only when one is
/// present (or required by [`KeyBindingPolicy::MustBePresent`]).
pub struct KeyBindingExpectations<'a> {
  pub nonce: &'a str,
  pub audience: &'a str,
  pub hasher: &'a dyn Hasher,
  /// The current time, as Unix seconds, supplied by the caller: this crate
  /// never reads the system clock itself.
  pub now: i64,
  /// The maximum age, in seconds, a key binding JWT's `iat` may have relative
  /// to `now`. `None` skips the check.
  pub max_age: Option<i64>,
}

/// Runs the shared SD-JWT(-VC) verification pipeline.
pub struct SdJwtVerifier;

impl SdJwtVerifier {
  /// Parses `presentation`, verifies the issuer's signature over the JWT
  /// envelope with `verifier`, and recreates the disclosed claim set.
  ///
  /// This alone does not check key binding or SD-JWT-VC type metadata; call
  /// [`Self::verify_key_binding`] (and, for the VC profile, the `vc::metadata`
  /// helpers) with the returned [`SdJwt`] as needed.
  ///
  /// ## Error
  /// [`Error::JwsVerificationFailure`] if the signature does not validate.
  pub async fn verify<V>(presentation: &str, verifier: &V) -> Result<(SdJwt, JsonObject)>
  where
    V: JwsVerifier + Sync,
  {
    let sd_jwt = SdJwt::parse(presentation)?;
    Self::verify_parsed(sd_jwt, verifier).await
  }

  /// As [`Self::verify`], for a presentation that has already been parsed.
  pub async fn verify_parsed<V>(sd_jwt: SdJwt, verifier: &V) -> Result<(SdJwt, JsonObject)>
  where
    V: JwsVerifier + Sync,
  {
    let payload = serde_json::to_value(sd_jwt.claims())
      .map_err(|e| Error::DeserializationError(e.to_string()))?;
    let Some(payload) = payload.as_object() else {
      unreachable!("SdJwtClaims always serializes to an object");
    };
    let signature = multibase::Base::Base64Url
      .decode(&sd_jwt.jwt().signature)
      .map_err(|e| Error::JwsVerificationFailure(format!("signature is not Base64Url-encoded: {e}")))?;
    verifier
      .verify(sd_jwt.header(), payload, &signature)
      .await
      .map_err(|e| Error::JwsVerificationFailure(e.to_string()))?;

    let hasher = crate::hasher_for_alg(sd_jwt.claims()._sd_alg.as_deref().unwrap_or(crate::SHA_ALG_NAME))
      .ok_or_else(|| Error::MissingHasher(sd_jwt.claims()._sd_alg.clone().unwrap_or_default()))?;
    let disclosed = sd_jwt.clone().into_disclosed_object(hasher.as_ref())?;

    Ok((sd_jwt, disclosed))
  }

  /// Enforces `policy` against `sd_jwt`'s key binding JWT, verifying its
  /// signature and claims against `expectations` when one is present (or
  /// required).
  ///
  /// ## Error
  /// [`Error::KeyBindingFailed`], carrying the specific [`KeyBindingError`]:
  /// `MissingKbJwt`/`UnexpectedKbJwt` for a policy mismatch, `MissingCnf` if
  /// the credential never committed to a holder key, `DigestMismatch`/
  /// `NonceMismatch`/`AudienceMismatch`/`IssuanceTime` for a claims mismatch.
  pub async fn verify_key_binding<V>(
    sd_jwt: &SdJwt,
    policy: KeyBindingPolicy,
    expectations: &KeyBindingExpectations<'_>,
    verifier: &V,
  ) -> Result<Option<KeyBindingJwtClaims>>
  where
    V: JwsVerifier + Sync,
  {
    let kb_jwt = match (sd_jwt.key_binding_jwt(), policy) {
      (None, KeyBindingPolicy::MustBePresent) => return Err(Error::KeyBindingFailed(KeyBindingError::MissingKbJwt)),
      (None, KeyBindingPolicy::MustNotBePresent | KeyBindingPolicy::Optional) => return Ok(None),
      (Some(_), KeyBindingPolicy::MustNotBePresent) => {
        return Err(Error::KeyBindingFailed(KeyBindingError::UnexpectedKbJwt))
      }
      (Some(kb_jwt), KeyBindingPolicy::MustBePresent | KeyBindingPolicy::Optional) => kb_jwt,
    };

    if sd_jwt.required_key_bind().is_none() {
      return Err(Error::KeyBindingFailed(KeyBindingError::MissingCnf));
    }

    let claims = kb_jwt.clone().verify_kb_jwt(verifier).await?;

    let expected_hash = expectations.hasher.encoded_digest(&format!(
      "{}~{}~",
      sd_jwt.jwt(),
      sd_jwt
        .disclosures()
        .iter()
        .map(Disclosure::to_string)
        .collect::<Vec<_>>()
        .join("~")
    ));
    if claims.sd_hash != expected_hash {
      return Err(Error::KeyBindingFailed(KeyBindingError::DigestMismatch));
    }
    if claims.nonce != expectations.nonce {
      return Err(Error::KeyBindingFailed(KeyBindingError::NonceMismatch));
    }
    if claims.aud != expectations.audience {
      return Err(Error::KeyBindingFailed(KeyBindingError::AudienceMismatch));
    }
    if let Some(max_age) = expectations.max_age {
      let age = expectations.now - claims.iat;
      if age < 0 || age > max_age {
        return Err(Error::KeyBindingFailed(KeyBindingError::IssuanceTime(format!(
          "key binding JWT issued at {}, outside the accepted window at {}",
          claims.iat, expectations.now
        ))));
      }
    }

    Ok(Some(claims))
  }
}
