// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use crypto::hashes::sha::SHA256;
use crypto::hashes::sha::SHA256_LEN;
use crypto::hashes::sha::SHA384;
use crypto::hashes::sha::SHA384_LEN;
use crypto::hashes::sha::SHA512;
use crypto::hashes::sha::SHA512_LEN;
use sha3::Digest;
use sha3::Sha3_256;
use sha3::Sha3_384;
use sha3::Sha3_512;

/// Used to implement hash functions to be used for encoding/decoding.
///
/// ## Note
///
/// Implementations of this trait are expected only for algorithms listed in
/// the IANA "Named Information Hash Algorithm" registry.
/// See [Hash Function Claim](https://www.ietf.org/archive/id/draft-ietf-oauth-selective-disclosure-jwt-07.html#name-hash-function-claim)
pub trait Hasher: Sync + Send {
  /// Digests input to produce unique fixed-size hash value in bytes.
  fn digest(&self, input: &[u8]) -> Vec<u8>;

  /// Returns the name of hash function used.
  ///
  /// ## Note
  ///
  /// The hash algorithm identifier MUST be a hash algorithm value from the
  /// "Hash Name String" column in the IANA "Named Information Hash Algorithm"
  fn alg_name(&self) -> &'static str;

  /// Returns the base64url-encoded digest of a `disclosure`.
  fn encoded_digest(&self, disclosure: &str) -> String {
    let hash = self.digest(disclosure.as_bytes());
    multibase::Base::Base64Url.encode(hash)
  }
}

/// An implementation of [`Hasher`] that uses the `sha-256` hash function.
#[derive(Default, Debug, Clone, Copy)]
pub struct Sha256Hasher;

impl Sha256Hasher {
  pub const ALG_NAME: &'static str = "sha-256";
  /// Creates a new [`Sha256Hasher`]
  pub fn new() -> Self {
    Sha256Hasher {}
  }
}

impl Hasher for Sha256Hasher {
  fn digest(&self, input: &[u8]) -> Vec<u8> {
    let mut digest: [u8; SHA256_LEN] = Default::default();
    SHA256(input, &mut digest);
    digest.to_vec()
  }

  fn alg_name(&self) -> &'static str {
    Sha256Hasher::ALG_NAME
  }
}

/// An implementation of [`Hasher`] that uses the `sha-384` hash function.
#[derive(Default, Debug, Clone, Copy)]
pub struct Sha384Hasher;

impl Sha384Hasher {
  pub const ALG_NAME: &'static str = "sha-384";
  /// Creates a new [`Sha384Hasher`]
  pub fn new() -> Self {
    Sha384Hasher {}
  }
}

impl Hasher for Sha384Hasher {
  fn digest(&self, input: &[u8]) -> Vec<u8> {
    let mut digest: [u8; SHA384_LEN] = Default::default();
    SHA384(input, &mut digest);
    digest.to_vec()
  }

  fn alg_name(&self) -> &'static str {
    Sha384Hasher::ALG_NAME
  }
}

/// An implementation of [`Hasher`] that uses the `sha-512` hash function.
#[derive(Default, Debug, Clone, Copy)]
pub struct Sha512Hasher;

impl Sha512Hasher {
  pub const ALG_NAME: &'static str = "sha-512";
  /// Creates a new [`Sha512Hasher`]
  pub fn new() -> Self {
    Sha512Hasher {}
  }
}

impl Hasher for Sha512Hasher {
  fn digest(&self, input: &[u8]) -> Vec<u8> {
    let mut digest: [u8; SHA512_LEN] = Default::default();
    SHA512(input, &mut digest);
    digest.to_vec()
  }

  fn alg_name(&self) -> &'static str {
    Sha512Hasher::ALG_NAME
  }
}

/// An implementation of [`Hasher`] that uses the `sha3-256` hash function.
#[derive(Default, Debug, Clone, Copy)]
pub struct Sha3_256Hasher;

impl Sha3_256Hasher {
  pub const ALG_NAME: &'static str = "sha3-256";
  pub fn new() -> Self {
    Sha3_256Hasher {}
  }
}

impl Hasher for Sha3_256Hasher {
  fn digest(&self, input: &[u8]) -> Vec<u8> {
    Sha3_256::digest(input).to_vec()
  }

  fn alg_name(&self) -> &'static str {
    Sha3_256Hasher::ALG_NAME
  }
}

/// An implementation of [`Hasher`] that uses the `sha3-384` hash function.
#[derive(Default, Debug, Clone, Copy)]
pub struct Sha3_384Hasher;

impl Sha3_384Hasher {
  pub const ALG_NAME: &'static str = "sha3-384";
  pub fn new() -> Self {
    Sha3_384Hasher {}
  }
}

impl Hasher for Sha3_384Hasher {
  fn digest(&self, input: &[u8]) -> Vec<u8> {
    Sha3_384::digest(input).to_vec()
  }

  fn alg_name(&self) -> &'static str {
    Sha3_384Hasher::ALG_NAME
  }
}

/// An implementation of [`Hasher`] that uses the `sha3-512` hash function.
#[derive(Default, Debug, Clone, Copy)]
pub struct Sha3_512Hasher;

impl Sha3_512Hasher {
  pub const ALG_NAME: &'static str = "sha3-512";
  pub fn new() -> Self {
    Sha3_512Hasher {}
  }
}

impl Hasher for Sha3_512Hasher {
  fn digest(&self, input: &[u8]) -> Vec<u8> {
    Sha3_512::digest(input).to_vec()
  }

  fn alg_name(&self) -> &'static str {
    Sha3_512Hasher::ALG_NAME
  }
}

/// The hash algorithm assumed when a payload carries no `_sd_alg` claim.
pub const SHA_ALG_NAME: &str = Sha256Hasher::ALG_NAME;

/// Returns the default [`Hasher`] for a named hash algorithm, if this crate
/// ships an implementation for it.
///
/// Supported aliases: `sha-256`, `sha-384`, `sha-512`, `sha3-256`, `sha3-384`,
/// `sha3-512`.
pub fn hasher_for_alg(alg: &str) -> Option<Box<dyn Hasher>> {
  match alg {
    Sha256Hasher::ALG_NAME => Some(Box::new(Sha256Hasher::new())),
    Sha384Hasher::ALG_NAME => Some(Box::new(Sha384Hasher::new())),
    Sha512Hasher::ALG_NAME => Some(Box::new(Sha512Hasher::new())),
    Sha3_256Hasher::ALG_NAME => Some(Box::new(Sha3_256Hasher::new())),
    Sha3_384Hasher::ALG_NAME => Some(Box::new(Sha3_384Hasher::new())),
    Sha3_512Hasher::ALG_NAME => Some(Box::new(Sha3_512Hasher::new())),
    _ => None,
  }
}
