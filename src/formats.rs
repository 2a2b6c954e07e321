// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Bit-exact auxiliary grammars used alongside SD-JWT-VC: Subresource
//! Integrity (`vct#integrity`), RFC 4501 `dns:` URIs, RFC 6901 JSON Pointer,
//! and the restricted single-claim JSONPath grammar used by some type
//! metadata schemas.
//!
//! None of these have a byte-exact crate in this crate's dependency stack,
//! so (per the teacher's own `Disclosure::parse`) they are hand-rolled,
//! terse, `unwrap`-free parsers rather than a half-fitting library.

use std::fmt;
use std::str::FromStr;

use percent_encoding::percent_decode_str;
use serde_json::Value;

use crate::Error;

/// One `<alg>-<base64>[?<options>]` entry of a [`DocumentIntegrity`] value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityMetadata {
  pub algorithm: SriAlgorithm,
  pub digest: String,
  pub options: Vec<String>,
}

/// The hash algorithms the Subresource Integrity grammar recognizes. Any
/// other algorithm token makes the whole value invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SriAlgorithm {
  Sha256,
  Sha384,
  Sha512,
}

impl SriAlgorithm {
  fn parse(s: &str) -> Option<Self> {
    match s {
      "sha256" => Some(Self::Sha256),
      "sha384" => Some(Self::Sha384),
      "sha512" => Some(Self::Sha512),
      _ => None,
    }
  }

  fn as_str(self) -> &'static str {
    match self {
      Self::Sha256 => "sha256",
      Self::Sha384 => "sha384",
      Self::Sha512 => "sha512",
    }
  }

  /// The strongest algorithm sorts last: SRI picks the strongest group present.
  fn strength(self) -> u8 {
    match self {
      Self::Sha256 => 0,
      Self::Sha384 => 1,
      Self::Sha512 => 2,
    }
  }
}

/// A whitespace-separated Subresource Integrity value (`vct#integrity`,
/// `extends#integrity`, `schema#integrity`): `<alg>-<base64>[?<options>]`.
///
/// Per the SRI grammar, an unknown algorithm token anywhere in the value
/// rejects the value as a whole rather than being skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentIntegrity(Vec<IntegrityMetadata>);

impl DocumentIntegrity {
  pub fn entries(&self) -> &[IntegrityMetadata] {
    &self.0
  }

  /// Returns the entries using the strongest algorithm present, per the SRI
  /// "use the strongest available hash" rule.
  pub fn strongest(&self) -> Vec<&IntegrityMetadata> {
    let Some(max) = self.0.iter().map(|e| e.algorithm.strength()).max() else {
      return Vec::new();
    };
    self.0.iter().filter(|e| e.algorithm.strength() == max).collect()
  }

  /// Validates that `resource` hashes (with one of [`Self::strongest`]'s
  /// algorithms) to one of the candidate digests.
  pub fn verify(&self, resource: &[u8]) -> bool {
    self.strongest().into_iter().any(|candidate| {
      let computed: Vec<u8> = match candidate.algorithm {
        SriAlgorithm::Sha256 => crate::Sha256Hasher::new().digest(resource),
        SriAlgorithm::Sha384 => crate::Sha384Hasher::new().digest(resource),
        SriAlgorithm::Sha512 => crate::Sha512Hasher::new().digest(resource),
      };
      let encoded = multibase::Base::Base64Pad.encode(&computed);
      encoded == candidate.digest || encoded.trim_end_matches('=') == candidate.digest.trim_end_matches('=')
    })
  }
}

impl FromStr for DocumentIntegrity {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let entries = s
      .split_whitespace()
      .map(|token| {
        let (hash_expr, options) = match token.split_once('?') {
          Some((hash_expr, options)) => (hash_expr, options.split(',').map(str::to_owned).collect()),
          None => (token, Vec::new()),
        };
        let (alg, digest) = hash_expr
          .split_once('-')
          .ok_or_else(|| Error::InvalidPath(format!("malformed integrity metadata: {token}")))?;
        let algorithm = SriAlgorithm::parse(alg)
          .ok_or_else(|| Error::InvalidPath(format!("unsupported integrity algorithm: {alg}")))?;
        Ok(IntegrityMetadata {
          algorithm,
          digest: digest.to_owned(),
          options,
        })
      })
      .collect::<Result<Vec<_>, Error>>()?;
    if entries.is_empty() {
      return Err(Error::InvalidPath("integrity metadata must not be empty".to_string()));
    }
    Ok(Self(entries))
  }
}

impl fmt::Display for DocumentIntegrity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let rendered = self
      .0
      .iter()
      .map(|entry| {
        if entry.options.is_empty() {
          format!("{}-{}", entry.algorithm.as_str(), entry.digest)
        } else {
          format!("{}-{}?{}", entry.algorithm.as_str(), entry.digest, entry.options.join(","))
        }
      })
      .collect::<Vec<_>>()
      .join(" ");
    f.write_str(&rendered)
  }
}

use crate::Hasher;

/// A parsed `dns:` URI, per [RFC 4501](https://datatracker.ietf.org/doc/html/rfc4501).
///
/// `dns:[//authority/]dnsname[?query]`. The authority, when present, follows
/// the `//`-prefixed form; both the authority and the name are
/// percent-decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsUri {
  pub authority: Option<String>,
  pub name: String,
  pub query: Option<String>,
}

impl FromStr for DnsUri {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let rest = s
      .strip_prefix("dns:")
      .ok_or_else(|| Error::InvalidPath("dns URI must start with `dns:`".to_string()))?;

    let (rest, authority) = if let Some(after_slashes) = rest.strip_prefix("//") {
      match after_slashes.find('/') {
        Some(idx) => (&after_slashes[idx + 1..], Some(&after_slashes[..idx])),
        None => ("", Some(after_slashes)),
      }
    } else {
      (rest, None)
    };

    let (name_part, query) = match rest.split_once('?') {
      Some((name, query)) => (name, Some(decode(query)?)),
      None => (rest, None),
    };

    Ok(Self {
      authority: authority.map(decode).transpose()?,
      name: decode(name_part)?,
      query,
    })
  }
}

fn decode(s: &str) -> crate::Result<String> {
  percent_decode_str(s)
    .decode_utf8()
    .map(|cow| cow.into_owned())
    .map_err(|e| Error::InvalidPath(format!("invalid percent-encoding: {e}")))
}

impl fmt::Display for DnsUri {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "dns:")?;
    if let Some(authority) = &self.authority {
      write!(f, "//{authority}/")?;
    }
    write!(f, "{}", self.name)?;
    if let Some(query) = &self.query {
      write!(f, "?{query}")?;
    }
    Ok(())
  }
}

/// An RFC 6901 JSON Pointer: `/`-separated segments with `~1` -> `/` and
/// `~0` -> `~` unescaping. The empty string addresses the document root.
///
/// This duplicates the segment grammar [`crate::encoder::SdObjectEncoder`]
/// already implements internally for `conceal`, exposed here as a standalone
/// value type for callers (e.g. type metadata `schema` validation) that need
/// to resolve a pointer without going through the encoder.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JsonPointer(Vec<String>);

impl JsonPointer {
  pub fn root() -> Self {
    Self(Vec::new())
  }

  pub fn is_root(&self) -> bool {
    self.0.is_empty()
  }

  pub fn parse(pointer: &str) -> crate::Result<Self> {
    if pointer.is_empty() {
      return Ok(Self::root());
    }
    if !pointer.starts_with('/') {
      return Err(Error::InvalidPath(format!(
        "{pointer} is not a valid JSON pointer: must start with '/'"
      )));
    }
    Ok(Self(
      pointer
        .split('/')
        .skip(1)
        .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
        .collect(),
    ))
  }

  /// Resolves this pointer against `document`.
  pub fn resolve<'v>(&self, document: &'v Value) -> crate::Result<&'v Value> {
    let mut current = document;
    for segment in &self.0 {
      current = match current {
        Value::Object(map) => map
          .get(segment.as_str())
          .ok_or_else(|| Error::InvalidPath(format!("{segment} does not exist")))?,
        Value::Array(array) => {
          let index: usize = segment
            .parse()
            .map_err(|_| Error::InvalidPath(format!("{segment} is not a valid array index")))?;
          array.get(index).ok_or(Error::IndexOutofBounds(index))?
        }
        _ => return Err(Error::DataTypeMismatch(format!("{segment} is not a container"))),
      };
    }
    Ok(current)
  }
}

impl fmt::Display for JsonPointer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for segment in &self.0 {
      write!(f, "/{}", segment.replace('~', "~0").replace('/', "~1"))?;
    }
    Ok(())
  }
}

/// The restricted JSONPath grammar `$.name(.name|[index])*` used by a
/// subset of SD-JWT-VC schema consumers to address a single claim.
///
/// This is deliberately narrower than general JSONPath: no wildcards, no
/// filters, no slices. It exists purely as a single-claim selector, distinct
/// from [`crate::ClaimPath`] (which models the SD-JWT-VC `claims[].path`
/// array form and supports wildcards).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleClaimJsonPath(Vec<PathStep>);

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathStep {
  Name(String),
  Index(usize),
}

impl FromStr for SingleClaimJsonPath {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let rest = s
      .strip_prefix('$')
      .ok_or_else(|| Error::InvalidPath("single-claim JSONPath must start with `$`".to_string()))?;

    let mut steps = Vec::new();
    let mut chars = rest.char_indices().peekable();
    while let Some(&(start, c)) = chars.peek() {
      match c {
        '.' => {
          chars.next();
          let name_start = start + 1;
          let mut end = name_start;
          while let Some(&(idx, c)) = chars.peek() {
            if c == '.' || c == '[' {
              break;
            }
            end = idx + c.len_utf8();
            chars.next();
          }
          let name = &rest[name_start..end];
          if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(Error::InvalidPath(format!("invalid JSONPath name segment: {name}")));
          }
          steps.push(PathStep::Name(name.to_owned()));
        }
        '[' => {
          chars.next();
          let digits_start = start + 1;
          let mut end = digits_start;
          while let Some(&(idx, c)) = chars.peek() {
            if c == ']' {
              break;
            }
            end = idx + c.len_utf8();
            chars.next();
          }
          match chars.next() {
            Some((_, ']')) => {}
            _ => return Err(Error::InvalidPath("unterminated `[` in JSONPath".to_string())),
          }
          let index: usize = rest[digits_start..end]
            .parse()
            .map_err(|_| Error::InvalidPath(format!("invalid JSONPath index: {}", &rest[digits_start..end])))?;
          steps.push(PathStep::Index(index));
        }
        _ => return Err(Error::InvalidPath(format!("unexpected character `{c}` in JSONPath"))),
      }
    }
    if steps.is_empty() {
      return Err(Error::InvalidPath("JSONPath must select at least one claim".to_string()));
    }
    Ok(Self(steps))
  }
}

impl SingleClaimJsonPath {
  /// Converts this path into the corresponding [`crate::ClaimPath`].
  pub fn to_claim_path(&self) -> crate::ClaimPath {
    self
      .0
      .iter()
      .map(|step| match step {
        PathStep::Name(name) => crate::ClaimPathSegment::Key(name.clone()),
        PathStep::Index(index) => crate::ClaimPathSegment::Index(*index),
      })
      .collect()
  }
}

impl fmt::Display for SingleClaimJsonPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("$")?;
    for step in &self.0 {
      match step {
        PathStep::Name(name) => write!(f, ".{name}")?,
        PathStep::Index(index) => write!(f, "[{index}]")?,
      }
    }
    Ok(())
  }
}
