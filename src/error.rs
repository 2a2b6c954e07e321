// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

/// Alias for a `Result` with the error type [`Error`].
pub type Result<T> = ::core::result::Result<T, Error>;

#[derive(Debug, thiserror::Error, strum::IntoStaticStr)]
#[non_exhaustive]
pub enum Error {
  #[error("invalid input: {0}")]
  InvalidDisclosure(String),

  #[error("no hasher can be specified for the hashing algorithm {0}")]
  MissingHasher(String),

  #[error("data type is not expected: {0}")]
  DataTypeMismatch(String),

  #[error("claim {0} of disclosure already exists")]
  ClaimCollisionError(String),

  #[error("digest {0} appears multiple times")]
  DuplicateDigestError(String),

  #[error("array disclosure object contains keys other than `...`")]
  InvalidArrayDisclosureObject,

  #[error("invalid path: {0}")]
  InvalidPath(String),

  #[error("invalid input")]
  DeserializationError(String),

  #[error("index {0} is out of bounds for the provided array")]
  IndexOutofBounds(usize),

  #[error("{0}")]
  Unspecified(String),

  #[error("salt size must be greater or equal 16")]
  InvalidSaltSize,

  #[error("reserved claim name `{0}` cannot be used as an issuer-supplied claim name")]
  ReservedClaimName(String),

  #[error("{0} unused disclosures were provided which were not required")]
  UnusedDisclosures(usize),

  #[error("the SD-JWT could not be parsed: {0}")]
  ParsingError(String),

  #[error("one or more disclosures are invalid: {0:?}")]
  InvalidDisclosures(Vec<String>),

  #[error("disclosures are not unique: {0}")]
  NonUniqueDisclosures(String),

  #[error("key binding validation failed: {0}")]
  KeyBindingFailed(#[from] KeyBindingError),

  #[error("SD-JWT-VC processing failed: {0}")]
  SdJwtVc(#[from] SdJwtVcError),

  #[error("definition validation failed with {} violation(s)", .0.len())]
  DefinitionViolation(Vec<DefinitionViolation>),

  #[error("JWS signer failed: {0}")]
  JwsSignerFailure(String),

  #[error("JWS verification failed: {0}")]
  JwsVerificationFailure(String),
}

/// Reasons why key-binding validation can fail.
#[derive(Debug, thiserror::Error, strum::IntoStaticStr, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum KeyBindingError {
  #[error("a key binding JWT was required but is missing from the presentation")]
  MissingKbJwt,
  #[error("a key binding JWT was present but none was expected")]
  UnexpectedKbJwt,
  #[error("the key binding JWT is invalid: {0}")]
  InvalidKbJwt(String),
  #[error("the credential does not carry a `cnf` confirmation claim to bind against")]
  MissingCnf,
  #[error("`sd_hash` in the key binding JWT does not match the presentation")]
  DigestMismatch,
  #[error("the key binding JWT nonce does not match the expected value")]
  NonceMismatch,
  #[error("the key binding JWT audience does not match the expected value")]
  AudienceMismatch,
  #[error("the key binding JWT issuance time is outside the accepted window: {0}")]
  IssuanceTime(String),
}

/// Failures specific to the SD-JWT-VC profile.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SdJwtVcError {
  #[error("could not determine the issuer's signing key: {0}")]
  IssuerKeySourceError(String),
  #[error("type metadata resolution failed: {0}")]
  TypeMetadataResolutionFailure(#[source] anyhow::Error),
  #[error("type metadata validation failed: {0:?}")]
  TypeMetadataValidationFailure(Vec<String>),
}

/// A single violation reported by the definition-based validator.
///
/// Unlike most of this crate's errors, these are accumulated rather than
/// short-circuited: [`Error::DefinitionViolation`] always carries the
/// complete list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum DefinitionViolation {
  #[error("unknown claim at {0}")]
  UnknownClaim(String),
  #[error("missing required claim at {0}")]
  MissingRequiredClaim(String),
  #[error("claim at {0} has the wrong type")]
  WrongClaimType(String),
  #[error("claim at {0} was disclosed in a way that does not match its definition")]
  IncorrectlyDisclosedClaim(String),
  #[error("`vct` does not match the expected value")]
  InvalidVct,
  #[error("disclosure inconsistency while recreating the claim set: {0}")]
  DisclosureInconsistencies(String),
  #[error("registered claim `{0}` must always be plain but the definition marks it selectively disclosable")]
  IllegalSdClaim(String),
}
