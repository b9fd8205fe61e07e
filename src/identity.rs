//! The identifier-resolution boundary (§6 "Identifier resolver").
//!
//! Normalizes a downstream API's raw curies against a node-normalization service (e.g. Translator's
//! Node Normalizer) before they ever reach a [`crate::record::Record`]. Consumed, not owned: this
//! crate only needs the shape of the answer.

use async_trait::async_trait;

use crate::error::TrapiError;
use crate::identifiers::Curie;
use crate::record::NormalizedInfo;

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolves a batch of raw curies to their normalized form. Implementations are expected to
    /// return one [`NormalizedInfo`] per input curie, in the same order; a curie the resolver has
    /// never seen still gets an identity-only entry (§6 "unknown curies normalize to themselves").
    async fn resolve(&self, curies: &[Curie]) -> Result<Vec<NormalizedInfo>, TrapiError>;
}

/// A resolver that treats every curie as already normalized — useful for tests and for sources
/// that only ever emit already-normalized identifiers.
pub struct IdentityOnlyResolver;

#[async_trait]
impl IdentityResolver for IdentityOnlyResolver {
    async fn resolve(&self, curies: &[Curie]) -> Result<Vec<NormalizedInfo>, TrapiError> {
        Ok(curies.iter().cloned().map(NormalizedInfo::identity_only).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identity_only_resolver_echoes_curies() {
        let resolver = IdentityOnlyResolver;
        let out = resolver
            .resolve(&[Curie::new("NCBIGene:3778")])
            .await
            .unwrap();
        assert_eq!(out[0].primary_curie, Curie::new("NCBIGene:3778"));
    }
}
