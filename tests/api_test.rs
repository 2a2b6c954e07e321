// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use josekit::jws::HS256;
use multibase::Base;
use sd_jwt_vc::claim_path::ClaimPathSegment;
use sd_jwt_vc::disclosable::always_leaf;
use sd_jwt_vc::disclosable::never_leaf;
use sd_jwt_vc::disclosable::ClaimDef;
use sd_jwt_vc::disclosable::DisclosableDef;
use sd_jwt_vc::disclosable::DisclosableObject;
use sd_jwt_vc::selector::SdJwtSelector;
use sd_jwt_vc::validator::DefinitionValidator;
use sd_jwt_vc::verifier::KeyBindingExpectations;
use sd_jwt_vc::verifier::KeyBindingPolicy;
use sd_jwt_vc::verifier::SdJwtVerifier;
use sd_jwt_vc::ClaimPath;
use sd_jwt_vc::JsonObject;
use sd_jwt_vc::JwsSigner;
use sd_jwt_vc::JwsVerifier;
use sd_jwt_vc::Hasher;
use sd_jwt_vc::KeyBindingJwt;
use sd_jwt_vc::KeyBindingJwtClaims;
use sd_jwt_vc::RequiredKeyBinding;
use sd_jwt_vc::SdJwtBuilder;
use sd_jwt_vc::Sha256Hasher;
use serde_json::json;

const SECRET: &[u8] = b"0123456789ABCDEF0123456789ABCDEF";

/// Wraps a josekit HMAC signer to satisfy this crate's [`JwsSigner`] seam:
/// the signing input is reconstructed exactly as [`sd_jwt_vc::Jwt`]'s
/// `Display` impl renders it, so a verifier built the same way accepts it.
struct HmacSigner;

#[async_trait]
impl JwsSigner for HmacSigner {
  type Error = josekit::JoseError;
  async fn sign(&self, header: &JsonObject, payload: &JsonObject) -> Result<Vec<u8>, Self::Error> {
    let signer = HS256.signer_from_bytes(SECRET)?;
    signer.sign(signing_input(header, payload).as_bytes())
  }
}

struct HmacVerifier;

#[async_trait]
impl JwsVerifier for HmacVerifier {
  type Error = josekit::JoseError;
  async fn verify(&self, header: &JsonObject, payload: &JsonObject, signature: &[u8]) -> Result<(), Self::Error> {
    let verifier = HS256.verifier_from_bytes(SECRET)?;
    verifier.verify(signing_input(header, payload).as_bytes(), signature)
  }
}

fn signing_input(header: &JsonObject, payload: &JsonObject) -> String {
  format!(
    "{}.{}",
    Base::Base64Url.encode(serde_json::to_vec(header).unwrap()),
    Base::Base64Url.encode(serde_json::to_vec(payload).unwrap())
  )
}

fn path(segments: &[&str]) -> ClaimPath {
  ClaimPath::new(segments.iter().map(|s| ClaimPathSegment::Key(s.to_string())).collect())
}

#[tokio::test]
async fn issue_present_verify_round_trip() {
  let object = json!({
    "sub": "user_42",
    "given_name": "John",
    "family_name": "Doe",
    "email": "johndoe@example.com",
    "address": {
      "street_address": "123 Main St",
      "locality": "Anytown",
      "region": "Anystate",
      "country": "US"
    },
    "nationalities": ["US", "DE"]
  });

  let sd_jwt = SdJwtBuilder::new(object)
    .unwrap()
    .make_concealable("/email")
    .unwrap()
    .make_concealable("/address/street_address")
    .unwrap()
    .make_concealable("/address")
    .unwrap()
    .make_concealable("/nationalities/0")
    .unwrap()
    .finish(&HmacSigner, "HS256")
    .await
    .unwrap();

  let presentation = sd_jwt.presentation();
  let (_, disclosed) = SdJwtVerifier::verify(&presentation, &HmacVerifier).await.unwrap();

  assert_eq!(disclosed.get("email").unwrap(), "johndoe@example.com");
  assert_eq!(disclosed.get("sub").unwrap(), "user_42");
  let address = disclosed.get("address").unwrap().as_object().unwrap();
  assert_eq!(address.get("street_address").unwrap(), "123 Main St");
}

#[tokio::test]
async fn presentation_selector_narrows_to_requested_claims() {
  let object = json!({
    "credentialSubject": {
      "type": "Person",
      "address": { "locality": "Anytown", "country": "US" }
    }
  });
  let sd_jwt = SdJwtBuilder::new(object)
    .unwrap()
    .make_concealable("/credentialSubject/address")
    .unwrap()
    .make_concealable("/credentialSubject/address/locality")
    .unwrap()
    .finish(&HmacSigner, "HS256")
    .await
    .unwrap();

  let hasher = Sha256Hasher::new();
  let requested = [path(&["credentialSubject", "address", "locality"])];
  let selected = SdJwtSelector::select(&sd_jwt, &hasher, &requested).unwrap();
  assert_eq!(selected.disclosures().len(), 2);

  let (_, disclosed) = SdJwtVerifier::verify(&selected.presentation(), &HmacVerifier).await.unwrap();
  let subject = disclosed.get("credentialSubject").unwrap().as_object().unwrap();
  assert!(subject.get("address").is_some());
}

#[tokio::test]
async fn definition_validator_flags_a_tampered_disclosure_set() {
  let object = json!({ "given_name": "John", "family_name": "Doe" });
  let sd_jwt = SdJwtBuilder::new(object)
    .unwrap()
    .make_concealable("/family_name")
    .unwrap()
    .finish(&HmacSigner, "HS256")
    .await
    .unwrap();

  let def: DisclosableDef = DisclosableObject::new()
    .insert("given_name".to_string(), always_leaf(ClaimDef::required()))
    .insert("family_name".to_string(), always_leaf(ClaimDef::required()));

  let hasher = Sha256Hasher::new();
  let err = DefinitionValidator::validate(&def, &sd_jwt, &hasher, None).unwrap_err();
  assert!(matches!(err, sd_jwt_vc::Error::DefinitionViolation(_)));

  let never_def: DisclosableDef = DisclosableObject::new()
    .insert("given_name".to_string(), never_leaf(ClaimDef::required()))
    .insert("family_name".to_string(), always_leaf(ClaimDef::required()));
  DefinitionValidator::validate(&never_def, &sd_jwt, &hasher, None).unwrap();
}

#[tokio::test]
async fn key_binding_round_trip_and_policy_enforcement() {
  let object = json!({ "given_name": "John" });
  let jwk = json!({ "kty": "oct" }).as_object().unwrap().clone();
  let mut sd_jwt = SdJwtBuilder::new(object)
    .unwrap()
    .require_key_binding(RequiredKeyBinding::Jwk { jwk })
    .finish(&HmacSigner, "HS256")
    .await
    .unwrap();

  let hasher = Sha256Hasher::new();
  // `sd_jwt.to_string()` is `{jwt}~{disclosures}~` while no key binding JWT is
  // attached yet, exactly the input `sd_hash` is defined over.
  let claims = KeyBindingJwtClaims {
    iat: 100,
    aud: "verifier.example.com".to_string(),
    nonce: "a-nonce".to_string(),
    sd_hash: hasher.encoded_digest(&sd_jwt.to_string()),
    ..Default::default()
  };
  let kb_jwt = KeyBindingJwt::build(claims, &HmacSigner, "HS256").await.unwrap();
  sd_jwt.attach_key_binding_jwt(kb_jwt);

  let expectations = KeyBindingExpectations {
    nonce: "a-nonce",
    audience: "verifier.example.com",
    hasher: &hasher,
    now: 100,
    max_age: Some(300),
  };
  let claims = SdJwtVerifier::verify_key_binding(&sd_jwt, KeyBindingPolicy::MustBePresent, &expectations, &HmacVerifier)
    .await
    .unwrap();
  assert!(claims.is_some());

  let wrong_expectations = KeyBindingExpectations {
    nonce: "wrong-nonce",
    ..expectations
  };
  let err = SdJwtVerifier::verify_key_binding(&sd_jwt, KeyBindingPolicy::MustBePresent, &wrong_expectations, &HmacVerifier)
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    sd_jwt_vc::Error::KeyBindingFailed(sd_jwt_vc::KeyBindingError::NonceMismatch)
  ));
}

#[tokio::test]
async fn duplicated_disclosure_in_presentation_is_rejected() {
  let object = json!({ "given_name": "John" });
  let sd_jwt = SdJwtBuilder::new(object)
    .unwrap()
    .make_concealable("/given_name")
    .unwrap()
    .finish(&HmacSigner, "HS256")
    .await
    .unwrap();

  let jwt_part = sd_jwt.presentation().split('~').next().unwrap().to_string();
  let disclosure = sd_jwt.disclosures()[0].to_string();
  let tampered = format!("{jwt_part}~{disclosure}~{disclosure}~");

  let err = SdJwtVerifier::verify(&tampered, &HmacVerifier).await.unwrap_err();
  assert!(matches!(err, sd_jwt_vc::Error::NonUniqueDisclosures(_)));
}

#[tokio::test]
async fn definition_violations_accumulate_across_the_whole_tree() {
  use sd_jwt_vc::disclosable::always_arr;
  use sd_jwt_vc::disclosable::always_obj;
  use sd_jwt_vc::disclosable::DisclosableArray;
  use sd_jwt_vc::DefinitionViolation;

  let object = json!({
    "family_name": "Doe",
    "nationalities": "DE",
    "address": { "house_number": "42" },
    "age_equal_or_over": { "18": true }
  });
  let sd_jwt = SdJwtBuilder::new(object)
    .unwrap()
    .make_concealable("/address/house_number")
    .unwrap()
    .finish(&HmacSigner, "HS256")
    .await
    .unwrap();

  let def: DisclosableDef = DisclosableObject::new()
    .insert("family_name".to_string(), always_leaf(ClaimDef::required()))
    .insert(
      "nationalities".to_string(),
      always_arr(DisclosableArray::new().push(always_leaf(ClaimDef::optional()))),
    )
    .insert(
      "address".to_string(),
      always_obj(DisclosableObject::new().insert("house_number".to_string(), always_leaf(ClaimDef::required()))),
    )
    .insert(
      "age_equal_or_over".to_string(),
      always_obj(DisclosableObject::new().insert("18".to_string(), always_leaf(ClaimDef::required()))),
    );

  let hasher = Sha256Hasher::new();
  let err = DefinitionValidator::validate(&def, &sd_jwt, &hasher, None).unwrap_err();
  let sd_jwt_vc::Error::DefinitionViolation(violations) = err else {
    panic!("expected DefinitionViolation");
  };

  assert!(violations.iter().any(|v| matches!(v, DefinitionViolation::WrongClaimType(p) if p.contains("nationalities"))));
  for claim in ["family_name", "address", "age_equal_or_over"] {
    assert!(
      violations
        .iter()
        .any(|v| matches!(v, DefinitionViolation::IncorrectlyDisclosedClaim(p) if p.ends_with(&format!("\"{claim}\"]")))),
      "expected an IncorrectlyDisclosedClaim for {claim}"
    );
  }
  assert!(violations
    .iter()
    .any(|v| matches!(v, DefinitionViolation::IncorrectlyDisclosedClaim(p) if p.contains("age_equal_or_over") && p.contains("18"))));
  // The one child that was actually disclosed to match its definition contributes no violation.
  assert!(!violations
    .iter()
    .any(|v| matches!(v, DefinitionViolation::IncorrectlyDisclosedClaim(p) if p.contains("house_number"))));
}

#[test]
fn decode_ietf_draft_example_2() {
  // Values taken from https://www.ietf.org/archive/id/draft-ietf-oauth-selective-disclosure-jwt-06.html#name-example-2-handling-structur
  let sd_jwt = "eyJhbGciOiAiRVMyNTYifQ.eyJfc2QiOiBbIkM5aW5wNllvUmFFWFI0Mjd6WUpQN1FyazFXSF84YmR3T0FfWVVyVW5HUVUiLCAiS3VldDF5QWEwSElRdlluT1ZkNTloY1ZpTzlVZzZKMmtTZnFZUkJlb3d2RSIsICJNTWxkT0ZGekIyZDB1bWxtcFRJYUdlcmhXZFVfUHBZZkx2S2hoX2ZfOWFZIiwgIlg2WkFZT0lJMnZQTjQwVjd4RXhad1Z3ejd5Um1MTmNWd3Q1REw4Ukx2NGciLCAiWTM0em1JbzBRTExPdGRNcFhHd2pCZ0x2cjE3eUVoaFlUMEZHb2ZSLWFJRSIsICJmeUdwMFdUd3dQdjJKRFFsbjFsU2lhZW9iWnNNV0ExMGJRNTk4OS05RFRzIiwgIm9tbUZBaWNWVDhMR0hDQjB1eXd4N2ZZdW8zTUhZS08xNWN6LVJaRVlNNVEiLCAiczBCS1lzTFd4UVFlVTh0VmxsdE03TUtzSVJUckVJYTFQa0ptcXhCQmY1VSJdLCAiaXNzIjogImh0dHBzOi8vaXNzdWVyLmV4YW1wbGUuY29tIiwgImlhdCI6IDE2ODMwMDAwMDAsICJleHAiOiAxODgzMDAwMDAwLCAiYWRkcmVzcyI6IHsiX3NkIjogWyI2YVVoelloWjdTSjFrVm1hZ1FBTzN1MkVUTjJDQzFhSGhlWnBLbmFGMF9FIiwgIkF6TGxGb2JrSjJ4aWF1cFJFUHlvSnotOS1OU2xkQjZDZ2pyN2ZVeW9IemciLCAiUHp6Y1Z1MHFiTXVCR1NqdWxmZXd6a2VzRDl6dXRPRXhuNUVXTndrclEtayIsICJiMkRrdzBqY0lGOXJHZzhfUEY4WmN2bmNXN3p3Wmo1cnlCV3ZYZnJwemVrIiwgImNQWUpISVo4VnUtZjlDQ3lWdWIyVWZnRWs4anZ2WGV6d0sxcF9KbmVlWFEiLCAiZ2xUM2hyU1U3ZlNXZ3dGNVVEWm1Xd0JUdzMyZ25VbGRJaGk4aEdWQ2FWNCIsICJydkpkNmlxNlQ1ZWptc0JNb0d3dU5YaDlxQUFGQVRBY2k0MG9pZEVlVnNBIiwgInVOSG9XWWhYc1poVkpDTkUyRHF5LXpxdDd0NjlnSkt5NVFhRnY3R3JNWDQiXX0sICJfc2RfYWxnIjogInNoYS0yNTYifQ.IjE4EfnYu1RZ1uz6yqtFh5Lppq36VC4VeSr-hLDFpZ9zqBNmMrT5JHLLXTuMJqKQp3NIzDsLaft4GK5bYyfqhg~WyJHMDJOU3JRZmpGWFE3SW8wOXN5YWpBIiwgInJlZ2lvbiIsICJcdTZlMmZcdTUzM2EiXQ~WyJsa2x4RjVqTVlsR1RQVW92TU5JdkNBIiwgImNvdW50cnkiLCAiSlAiXQ~";
  let parsed = sd_jwt_vc::SdJwt::parse(sd_jwt).unwrap();
  let hasher = Sha256Hasher::new();
  let decoded = parsed.into_disclosed_object(&hasher).unwrap();

  assert_eq!(decoded.get("iss").unwrap(), "https://issuer.example.com");
  let address = decoded.get("address").unwrap().as_object().unwrap();
  assert_eq!(address.get("country").unwrap(), "JP");
  assert_eq!(address.get("region").unwrap(), "港区");
}
