//! Media resolution seam mapping a source/item pair to downloadable content.
//!
//! Resolved links may be short-lived, so the executor always re-resolves at
//! download time rather than trusting a URL captured at enqueue time.
//!
//! # Architecture
//!
//! - [`MediaResolver`] - async trait a source adapter implements
//! - [`ResolverRegistry`] - source-keyed collection the engine consults
//! - [`CacheMaintenance`] - optional capability a resolver may expose
//! - [`DirectResolver`] - passthrough implementation (item id is the URL)

mod direct;

pub use direct::DirectResolver;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::job::MediaRef;

/// Errors produced during media resolution.
///
/// The source key is deliberately not called `source`: thiserror reserves
/// that field name for the underlying error cause.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No resolver is registered for the media item's source.
    #[error("no resolver registered for source {source_key}")]
    UnknownSource {
        /// The unmatched source key.
        source_key: String,
    },

    /// The source knows the item but has no downloadable content for it.
    #[error("no downloadable content for {source_key}:{item_id}")]
    NotAvailable {
        /// Source key.
        source_key: String,
        /// Item identifier within the source.
        item_id: String,
    },

    /// The resolver's upstream request failed.
    #[error("resolver request failed for {source_key}:{item_id}: {message}")]
    Upstream {
        /// Source key.
        source_key: String,
        /// Item identifier within the source.
        item_id: String,
        /// Upstream failure description.
        message: String,
    },
}

/// Freshly resolved content location for a media item.
#[derive(Debug, Clone)]
pub struct ResolvedContent {
    /// The authoritative downloadable URL, valid now.
    pub url: String,
}

/// A source adapter that maps media references to current content URLs.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Source key this resolver serves; matched against
    /// [`MediaRef::source`].
    fn source(&self) -> &str;

    /// Resolves the current content URL for a media item.
    ///
    /// Returns `Ok(None)` when the item exists but has no downloadable
    /// content (deleted, takedown, unsupported format).
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when the upstream lookup itself fails.
    async fn resolve(&self, media: &MediaRef) -> Result<Option<ResolvedContent>, ResolveError>;

    /// Optional cache-maintenance capability.
    ///
    /// Sources that keep local metadata caches return `Some`; everyone else
    /// inherits the `None` default. Callers probe this method instead of
    /// inspecting concrete types.
    fn cache_maintenance(&self) -> Option<&dyn CacheMaintenance> {
        None
    }
}

/// Optional capability for resolvers that maintain local caches.
#[async_trait]
pub trait CacheMaintenance: Send + Sync {
    /// Drops any locally cached metadata so the next resolve is fresh.
    async fn flush_cache(&self);
}

/// Source-keyed collection of resolvers consulted by the engine.
#[derive(Default)]
pub struct ResolverRegistry {
    resolvers: HashMap<String, Box<dyn MediaResolver>>,
}

impl std::fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverRegistry")
            .field("sources", &self.resolvers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ResolverRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a resolver under its source key. A later registration for
    /// the same source replaces the earlier one.
    pub fn register(&mut self, resolver: Box<dyn MediaResolver>) {
        self.resolvers
            .insert(resolver.source().to_string(), resolver);
    }

    /// Resolves the current content URL for `media`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::UnknownSource`] when no resolver matches the
    /// media's source, or the resolver's own error.
    pub async fn resolve(
        &self,
        media: &MediaRef,
    ) -> Result<Option<ResolvedContent>, ResolveError> {
        let resolver =
            self.resolvers
                .get(&media.source)
                .ok_or_else(|| ResolveError::UnknownSource {
                    source_key: media.source.clone(),
                })?;
        resolver.resolve(media).await
    }

    /// Flushes caches on every resolver that exposes the capability.
    pub async fn flush_caches(&self) {
        for resolver in self.resolvers.values() {
            if let Some(maintenance) = resolver.cache_maintenance() {
                maintenance.flush_cache().await;
            }
        }
    }
}
