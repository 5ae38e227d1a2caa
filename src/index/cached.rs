//! Memoizing wrapper around a [`ReleaseIndex`]

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::index::cache::{MemoKey, MemoStore};
use crate::index::error::{CacheError, IndexError};
use crate::index::registry::ReleaseIndex;
use crate::index::types::{ModuleFileHit, ReleaseFile, ReleaseMetadata};

/// A memoized operation and the generation of its stored results.
/// Bump the generation whenever the shape or meaning of the result changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoFunction {
    pub name: &'static str,
    pub generation: u32,
}

pub const FILES_BY_MODULE: MemoFunction = MemoFunction {
    name: "files_by_module",
    generation: 1,
};

pub const FILES_BY_RELEASE: MemoFunction = MemoFunction {
    name: "files_by_release",
    generation: 1,
};

pub const RELEASE_METADATA: MemoFunction = MemoFunction {
    name: "release_metadata",
    generation: 1,
};

const MEMO_FUNCTIONS: &[MemoFunction] = &[FILES_BY_MODULE, FILES_BY_RELEASE, RELEASE_METADATA];

/// Serves repeated queries from a [`MemoStore`] and forwards misses to the inner index.
///
/// Errors are never stored, so a failed query is retried on the next run.
pub struct CachedIndex<S: MemoStore> {
    inner: Arc<dyn ReleaseIndex>,
    store: Arc<S>,
}

impl<S: MemoStore> CachedIndex<S> {
    pub fn new(inner: Arc<dyn ReleaseIndex>, store: Arc<S>) -> Self {
        Self { inner, store }
    }

    /// Drop entries left behind by earlier generations of every memoized function
    pub fn prune_stale(&self) -> Result<usize, IndexError> {
        let mut total = 0;
        for function in MEMO_FUNCTIONS {
            total += self
                .store
                .prune_generations(function.name, function.generation)?;
        }
        Ok(total)
    }

    async fn memoized<A, T, F, Fut>(
        &self,
        function: MemoFunction,
        args: &A,
        fetch: F,
    ) -> Result<T, IndexError>
    where
        A: Serialize + Sync + ?Sized,
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, IndexError>> + Send,
    {
        let key = MemoKey::new(function.name, function.generation, args)?;

        if let Some(stored) = self.store.get(&key)? {
            match serde_json::from_str(&stored) {
                Ok(value) => {
                    debug!("Memo hit for {} ({})", function.name, key.fingerprint);
                    return Ok(value);
                }
                Err(e) => warn!(
                    "Discarding unreadable memo entry for {}: {}",
                    function.name, e
                ),
            }
        }

        let value = fetch().await?;
        let encoded = serde_json::to_string(&value).map_err(CacheError::from)?;
        self.store.put(&key, &encoded)?;

        Ok(value)
    }
}

#[async_trait::async_trait]
impl<S: MemoStore> ReleaseIndex for CachedIndex<S> {
    async fn files_by_module(
        &self,
        module: &str,
        versions: &[String],
        file_size: Option<u64>,
    ) -> Result<Vec<ModuleFileHit>, IndexError> {
        self.memoized(
            FILES_BY_MODULE,
            &(module, versions, file_size),
            || self.inner.files_by_module(module, versions, file_size),
        )
        .await
    }

    async fn files_by_release(
        &self,
        author: &str,
        release: &str,
    ) -> Result<Vec<ReleaseFile>, IndexError> {
        self.memoized(
            FILES_BY_RELEASE,
            &(author, release),
            || self.inner.files_by_release(author, release),
        )
        .await
    }

    async fn release_metadata(
        &self,
        author: &str,
        release: &str,
    ) -> Result<ReleaseMetadata, IndexError> {
        self.memoized(
            RELEASE_METADATA,
            &(author, release),
            || self.inner.release_metadata(author, release),
        )
        .await
    }
}
