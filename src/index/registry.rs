//! Release index trait for querying release and module metadata

#[cfg(test)]
use mockall::automock;

use crate::index::error::IndexError;
use crate::index::types::{ModuleFileHit, ReleaseFile, ReleaseMetadata};

/// Query contract of a remote package index
///
/// Implementations are stateless and idempotent per call, so calls for
/// different modules may run concurrently.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait ReleaseIndex: Send + Sync {
    /// Files that declare `module` at any of `versions`
    ///
    /// # Arguments
    /// * `module` - Module name, e.g. "Foo::Bar"
    /// * `versions` - Equivalent encodings of one version; a hit on any counts
    /// * `file_size` - When set, only files of exactly this size match
    ///
    /// # Returns
    /// * `Err(IndexError::CountExceeded)` - if the result count reaches the page limit
    async fn files_by_module(
        &self,
        module: &str,
        versions: &[String],
        file_size: Option<u64>,
    ) -> Result<Vec<ModuleFileHit>, IndexError>;

    /// Every module declared by every file of a release
    async fn files_by_release(
        &self,
        author: &str,
        release: &str,
    ) -> Result<Vec<ReleaseFile>, IndexError>;

    /// Full metadata of a release
    async fn release_metadata(
        &self,
        author: &str,
        release: &str,
    ) -> Result<ReleaseMetadata, IndexError>;
}
