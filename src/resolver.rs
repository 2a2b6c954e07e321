// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;

/// A collaborator fetching a resource of type `O` addressed by `I`.
///
/// This is the single seam through which the core reaches every piece of
/// network I/O it needs (issuer metadata, type metadata, DID documents):
/// the core never opens a socket itself. Implementations are free to cache,
/// rate-limit, or serve fixtures, as long as they honor the contract that a
/// missing resource is [`Error::NotFound`] and a malformed one is
/// [`Error::ParsingFailure`].
#[async_trait]
pub trait Resolver<I, O>: Sync {
  async fn resolve(&self, input: &I) -> Result<O, Error>;
}

/// Failures a [`Resolver`] implementation can report.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
  #[error("no resource found for {0}")]
  NotFound(String),
  #[error("resource could not be parsed: {0}")]
  ParsingFailure(#[source] anyhow::Error),
  #[error("{0}")]
  Generic(#[source] anyhow::Error),
}
