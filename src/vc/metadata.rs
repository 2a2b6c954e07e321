// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Issuer metadata (`.well-known/jwt-vc-issuer`) and type metadata (`vct`),
//! including the `extends` chain merge.

use serde::Deserialize;
use serde::Serialize;

use crate::error::SdJwtVcError;
use crate::ClaimPath;
use crate::Error;
use crate::JsonObject;
use crate::Resolver;
use crate::Result;

/// `GET {origin}/.well-known/jwt-vc-issuer{path}` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerMetadata {
  pub issuer: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub jwks: Option<Jwks>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub jwks_uri: Option<String>,
}

/// A bare JWK set, as returned directly by `jwks` or dereferenced from `jwks_uri`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwks {
  pub keys: Vec<JsonObject>,
}

/// Whether a claim described by type metadata may be selectively disclosed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimSdPolicy {
  Always,
  Allowed,
  Never,
}

impl ClaimSdPolicy {
  /// `true` if `child` relaxes the constraint `self` (the parent's policy)
  /// imposes: `Always`/`Never` are immutable, `Allowed` may be narrowed to
  /// anything.
  fn is_relaxed_by(self, child: Self) -> bool {
    match self {
      ClaimSdPolicy::Always | ClaimSdPolicy::Never => child != self,
      ClaimSdPolicy::Allowed => false,
    }
  }
}

/// One entry of type metadata's `claims[]` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimMetadata {
  pub path: ClaimPath,
  pub sd: ClaimSdPolicy,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub display: Vec<serde_json::Value>,
}

/// Type metadata for a `vct` value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeMetadata {
  pub vct: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub extends: Option<String>,
  #[serde(rename = "extends#integrity", skip_serializing_if = "Option::is_none")]
  pub extends_integrity: Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub display: Vec<serde_json::Value>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub claims: Vec<ClaimMetadata>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub schema: Option<serde_json::Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub schema_uri: Option<String>,
}

/// Checks the two structural constraints the SD-JWT-VC profile places on a
/// fetched [`IssuerMetadata`] document before any key inside it is trusted:
/// its `issuer` field must equal the issuer that was actually requested (an
/// issuer cannot vouch for someone else's keys), and exactly one of
/// `jwks`/`jwks_uri` may be present (an issuer that publishes both is
/// ambiguous about which one is authoritative).
pub fn validate_issuer_metadata(metadata: &IssuerMetadata, expected_issuer: &str) -> Result<()> {
  if metadata.issuer != expected_issuer {
    return Err(Error::SdJwtVc(SdJwtVcError::IssuerKeySourceError(format!(
      "issuer metadata's `issuer` field ({}) does not match the expected issuer ({expected_issuer})",
      metadata.issuer
    ))));
  }
  match (&metadata.jwks, &metadata.jwks_uri) {
    (Some(_), Some(_)) => Err(Error::SdJwtVc(SdJwtVcError::IssuerKeySourceError(format!(
      "issuer metadata for {expected_issuer} carries both `jwks` and `jwks_uri`"
    )))),
    (None, None) => Err(Error::SdJwtVc(SdJwtVcError::IssuerKeySourceError(format!(
      "issuer metadata for {expected_issuer} carries neither `jwks` nor `jwks_uri`"
    )))),
    _ => Ok(()),
  }
}

/// Builds the `.well-known/jwt-vc-issuer` URL for `iss`, per the SD-JWT-VC
/// profile: the well-known suffix is inserted right after the origin, with
/// the issuer's own path appended after it.
pub fn issuer_metadata_url(iss: &str) -> Result<String> {
  let url = url_parts(iss)?;
  Ok(format!("{}/.well-known/jwt-vc-issuer{}", url.origin, url.path))
}

struct UrlParts {
  origin: String,
  path: String,
}

fn url_parts(iss: &str) -> Result<UrlParts> {
  let without_scheme = iss
    .strip_prefix("https://")
    .ok_or_else(|| Error::SdJwtVc(SdJwtVcError::IssuerKeySourceError(format!("{iss} is not an HTTPS issuer URL"))))?;
  let (authority, path) = without_scheme.split_once('/').unwrap_or((without_scheme, ""));
  Ok(UrlParts {
    origin: format!("https://{authority}"),
    path: if path.is_empty() {
      String::new()
    } else {
      format!("/{path}")
    },
  })
}

/// Merges `child` type metadata over `parent`, the next level up its
/// `extends` chain. `child`'s own fields win except `claims`, whose entries
/// are merged per-path: a path present in both must not relax the parent's
/// `sd` policy; a path present in only one side is carried over unchanged.
pub fn merge_type_metadata(parent: &TypeMetadata, child: &TypeMetadata) -> Result<TypeMetadata> {
  let mut merged_claims = child.claims.clone();
  for parent_claim in &parent.claims {
    match child.claims.iter().find(|c| c.path == parent_claim.path) {
      Some(child_claim) => {
        if parent_claim.sd.is_relaxed_by(child_claim.sd) {
          return Err(Error::SdJwtVc(SdJwtVcError::TypeMetadataValidationFailure(vec![format!(
            "{} relaxes the `sd` policy {:?} inherited from `{}` to {:?}",
            parent_claim.path, parent_claim.sd, parent.vct, child_claim.sd
          )])));
        }
      }
      None => merged_claims.push(parent_claim.clone()),
    }
  }

  Ok(TypeMetadata {
    vct: child.vct.clone(),
    extends: child.extends.clone(),
    extends_integrity: child.extends_integrity.clone(),
    display: child.display.clone(),
    claims: merged_claims,
    schema: child.schema.clone().or_else(|| parent.schema.clone()),
    schema_uri: child.schema_uri.clone().or_else(|| parent.schema_uri.clone()),
  })
}

/// Resolves `vct`'s full `extends` chain and folds it into one effective
/// [`TypeMetadata`], enforcing the strictness-preservation rule at every
/// step. Bounded to 16 levels to guard against a cyclic `extends` chain.
pub async fn resolve_merged_type_metadata<R>(resolver: &R, vct: &str) -> Result<TypeMetadata>
where
  R: Resolver<String, TypeMetadata> + Sync,
{
  const MAX_CHAIN_DEPTH: usize = 16;

  let mut chain = Vec::new();
  let mut current = vct.to_string();
  loop {
    if chain.len() >= MAX_CHAIN_DEPTH {
      return Err(Error::SdJwtVc(SdJwtVcError::TypeMetadataResolutionFailure(anyhow::anyhow!(
        "`extends` chain for {vct} exceeds {MAX_CHAIN_DEPTH} levels"
      ))));
    }
    let metadata = resolver
      .resolve(&current)
      .await
      .map_err(|e| Error::SdJwtVc(SdJwtVcError::TypeMetadataResolutionFailure(e.into())))?;
    let extends = metadata.extends.clone();
    chain.push(metadata);
    match extends {
      Some(parent_vct) => current = parent_vct,
      None => break,
    }
  }

  // `chain` runs leaf-first; fold it root-first so each merge sees its
  // immediate parent's already-merged constraints.
  let mut merged = chain.pop().expect("resolved at least the requested vct");
  while let Some(child) = chain.pop() {
    merged = merge_type_metadata(&merged, &child)?;
  }
  Ok(merged)
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn builds_well_known_url_with_path() {
    let url = issuer_metadata_url("https://issuer.example.com/path/to/issuer").unwrap();
    assert_eq!(url, "https://issuer.example.com/.well-known/jwt-vc-issuer/path/to/issuer");
  }

  #[test]
  fn builds_well_known_url_without_path() {
    let url = issuer_metadata_url("https://issuer.example.com").unwrap();
    assert_eq!(url, "https://issuer.example.com/.well-known/jwt-vc-issuer");
  }

  #[test]
  fn rejects_non_https_issuer() {
    assert!(issuer_metadata_url("did:example:123").is_err());
  }

  #[test]
  fn rejects_issuer_metadata_carrying_both_jwks_and_jwks_uri() {
    let metadata = IssuerMetadata {
      issuer: "https://issuer.example.com".to_string(),
      jwks: Some(Jwks { keys: vec![] }),
      jwks_uri: Some("https://issuer.example.com/jwks.json".to_string()),
    };
    assert!(validate_issuer_metadata(&metadata, "https://issuer.example.com").is_err());
  }

  #[test]
  fn rejects_issuer_metadata_carrying_neither_jwks_nor_jwks_uri() {
    let metadata = IssuerMetadata {
      issuer: "https://issuer.example.com".to_string(),
      jwks: None,
      jwks_uri: None,
    };
    assert!(validate_issuer_metadata(&metadata, "https://issuer.example.com").is_err());
  }

  #[test]
  fn rejects_issuer_metadata_with_mismatched_issuer() {
    let metadata = IssuerMetadata {
      issuer: "https://someone-else.example.com".to_string(),
      jwks: Some(Jwks { keys: vec![] }),
      jwks_uri: None,
    };
    assert!(validate_issuer_metadata(&metadata, "https://issuer.example.com").is_err());
  }

  #[test]
  fn accepts_well_formed_issuer_metadata() {
    let metadata = IssuerMetadata {
      issuer: "https://issuer.example.com".to_string(),
      jwks: Some(Jwks { keys: vec![] }),
      jwks_uri: None,
    };
    assert!(validate_issuer_metadata(&metadata, "https://issuer.example.com").is_ok());
  }

  fn claim(path: &[&str], sd: ClaimSdPolicy) -> ClaimMetadata {
    ClaimMetadata {
      path: ClaimPath::new(
        path
          .iter()
          .map(|s| crate::ClaimPathSegment::Key(s.to_string()))
          .collect(),
      ),
      sd,
      display: vec![],
    }
  }

  #[test]
  fn child_cannot_relax_always() {
    let parent = TypeMetadata {
      vct: "urn:parent".to_string(),
      extends: None,
      extends_integrity: None,
      display: vec![],
      claims: vec![claim(&["given_name"], ClaimSdPolicy::Always)],
      schema: None,
      schema_uri: None,
    };
    let child = TypeMetadata {
      vct: "urn:child".to_string(),
      extends: Some("urn:parent".to_string()),
      extends_integrity: None,
      display: vec![],
      claims: vec![claim(&["given_name"], ClaimSdPolicy::Allowed)],
      schema: None,
      schema_uri: None,
    };
    assert!(merge_type_metadata(&parent, &child).is_err());
  }

  #[test]
  fn child_may_narrow_allowed() {
    let parent = TypeMetadata {
      vct: "urn:parent".to_string(),
      extends: None,
      extends_integrity: None,
      display: vec![],
      claims: vec![claim(&["nationalities"], ClaimSdPolicy::Allowed)],
      schema: None,
      schema_uri: None,
    };
    let child = TypeMetadata {
      vct: "urn:child".to_string(),
      extends: Some("urn:parent".to_string()),
      extends_integrity: None,
      display: vec![],
      claims: vec![claim(&["nationalities"], ClaimSdPolicy::Always)],
      schema: None,
      schema_uri: None,
    };
    let merged = merge_type_metadata(&parent, &child).unwrap();
    assert_eq!(merged.claims[0].sd, ClaimSdPolicy::Always);
  }

  #[test]
  fn inherited_claims_not_repeated_in_child_are_carried_over() {
    let parent = TypeMetadata {
      vct: "urn:parent".to_string(),
      extends: None,
      extends_integrity: None,
      display: vec![],
      claims: vec![claim(&["address"], ClaimSdPolicy::Always)],
      schema: None,
      schema_uri: None,
    };
    let child = TypeMetadata {
      vct: "urn:child".to_string(),
      extends: Some("urn:parent".to_string()),
      extends_integrity: None,
      display: vec![],
      claims: vec![],
      schema: None,
      schema_uri: None,
    };
    let merged = merge_type_metadata(&parent, &child).unwrap();
    assert_eq!(merged.claims.len(), 1);
  }
}
