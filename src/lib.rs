// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

mod builder;
pub mod claim_path;
pub mod disclosable;
mod disclosure;
mod encoder;
mod error;
pub mod factory;
pub mod formats;
mod hasher;
mod jwt;
mod key_binding_jwt_claims;
mod decoder;
pub mod jws_json;
pub mod resolver;
pub mod selector;
mod sd_jwt;
mod signer;
pub mod validator;
pub mod vc;
pub mod verifier;

pub use builder::*;
pub use claim_path::ClaimPath;
pub use claim_path::ClaimPathSegment;
pub use decoder::*;
pub use disclosable::ClaimDef;
pub use disclosable::Disclosable;
pub use disclosable::DisclosableArray;
pub use disclosable::DisclosableObject;
pub use disclosable::DisclosableValue;
pub use disclosure::*;
pub use encoder::*;
pub use error::*;
pub use hasher::*;
pub use jwt::Jwt;
pub use resolver::Resolver;
pub use key_binding_jwt_claims::KeyBindingJwt;
pub use key_binding_jwt_claims::KeyBindingJwtClaims;
pub use key_binding_jwt_claims::RequiredKeyBinding;
pub(crate) use key_binding_jwt_claims::HEADER_TYP;
pub use sd_jwt::SdJwt;
pub use sd_jwt::SdJwtClaims;
pub use signer::JsonObject;
pub use signer::JwsSigner;
pub use signer::JwsVerifier;
