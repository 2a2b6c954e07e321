// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The SD-JWT-VC profile: issuer/type metadata resolution and the three
//! issuer key-source strategies (`.well-known` metadata, X.509, DID).

pub mod key_source;
pub mod metadata;

pub use key_source::DidDocument;
pub use key_source::IssuerKeyResolvers;
pub use key_source::KeySourceStrategy;
pub use key_source::VerificationMethod;
pub use key_source::X509ChainValidator;
pub use metadata::ClaimMetadata;
pub use metadata::ClaimSdPolicy;
pub use metadata::IssuerMetadata;
pub use metadata::Jwks;
pub use metadata::TypeMetadata;
