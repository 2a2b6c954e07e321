// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::error::Error;

use async_trait::async_trait;
use josekit::jws::HS256;
use multibase::Base;
use sd_jwt_vc::selector::SdJwtSelector;
use sd_jwt_vc::verifier::SdJwtVerifier;
use sd_jwt_vc::ClaimPath;
use sd_jwt_vc::ClaimPathSegment;
use sd_jwt_vc::JsonObject;
use sd_jwt_vc::JwsSigner;
use sd_jwt_vc::JwsVerifier;
use sd_jwt_vc::SdJwtBuilder;
use sd_jwt_vc::Sha256Hasher;
use serde_json::json;

const ISSUER_SECRET: &[u8] = b"0123456789ABCDEF0123456789ABCDEF";

/// Wraps a josekit HMAC signer to satisfy this crate's [`JwsSigner`] seam.
/// Creating and verifying JWTs is outside the scope of this library; josekit
/// is used here only to make this demo runnable end to end.
struct HmacSigner;

#[async_trait]
impl JwsSigner for HmacSigner {
  type Error = josekit::JoseError;
  async fn sign(&self, header: &JsonObject, payload: &JsonObject) -> Result<Vec<u8>, Self::Error> {
    let signer = HS256.signer_from_bytes(ISSUER_SECRET)?;
    signer.sign(signing_input(header, payload).as_bytes())
  }
}

struct HmacVerifier;

#[async_trait]
impl JwsVerifier for HmacVerifier {
  type Error = josekit::JoseError;
  async fn verify(&self, header: &JsonObject, payload: &JsonObject, signature: &[u8]) -> Result<(), Self::Error> {
    let verifier = HS256.verifier_from_bytes(ISSUER_SECRET)?;
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

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
  let object = json!({
    "sub": "user_42",
    "given_name": "John",
    "family_name": "Doe",
    "email": "johndoe@example.com",
    "phone_number": "+1-202-555-0101",
    "phone_number_verified": true,
    "address": {
      "street_address": "123 Main St",
      "locality": "Anytown",
      "region": "Anystate",
      "country": "US"
    },
    "birthdate": "1940-01-01",
    "updated_at": 1570000000,
    "nationalities": [
      "US",
      "DE"
    ]
  });

  // Issuance: mark individual claims, a nested object, and an array entry as
  // concealable, then sign the resulting SD-JWT.
  let sd_jwt = SdJwtBuilder::new(object)?
    .make_concealable("/email")?
    .make_concealable("/phone_number")?
    .make_concealable("/address/street_address")?
    .make_concealable("/address")?
    .make_concealable("/nationalities/0")?
    .finish(&HmacSigner, "HS256")
    .await?;

  let presentation = sd_jwt.presentation();
  println!("issued SD-JWT: {presentation}");

  // Holder: the holder only wants to present their address and nationality,
  // not their email or phone number.
  let requested = [
    ClaimPath::new(vec![ClaimPathSegment::Key("address".to_string())]),
    ClaimPath::new(vec![
      ClaimPathSegment::Key("nationalities".to_string()),
      ClaimPathSegment::Index(0),
    ]),
  ];
  let hasher = Sha256Hasher::new();
  let selected = SdJwtSelector::select(&sd_jwt, &hasher, &requested)?;
  println!("selected presentation: {}", selected.presentation());

  // Verifier: checks the issuer's signature and recreates the disclosed claims.
  let (_, disclosed) = SdJwtVerifier::verify(&selected.presentation(), &HmacVerifier).await?;
  println!("disclosed object: {}", serde_json::to_string_pretty(&disclosed)?);

  Ok(())
}
