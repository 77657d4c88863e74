//! Passthrough resolver: the item id already is the content URL.

use async_trait::async_trait;

use super::{MediaResolver, ResolveError, ResolvedContent};
use crate::job::MediaRef;

/// Source key served by [`DirectResolver`].
pub const DIRECT_SOURCE: &str = "direct";

/// Resolver for media references whose `item_id` is a complete URL.
///
/// Useful for ad-hoc downloads and as the simplest reference
/// implementation of the [`MediaResolver`] seam.
#[derive(Debug, Default)]
pub struct DirectResolver;

impl DirectResolver {
    /// Creates a new direct resolver.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaResolver for DirectResolver {
    fn source(&self) -> &str {
        DIRECT_SOURCE
    }

    async fn resolve(&self, media: &MediaRef) -> Result<Option<ResolvedContent>, ResolveError> {
        if media.item_id.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(ResolvedContent {
            url: media.item_id.clone(),
        }))
    }
}
