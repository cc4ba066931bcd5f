// Infrastructure: the store contract and its implementations.

pub mod memory_store;
pub mod pg_store;
pub mod traits;

pub use memory_store::InMemoryEntityStore;
pub use pg_store::PgEntityStore;
pub use traits::{BaseEntityStore, StoreError};

use std::future::Future;
use std::time::Duration;

/// Run a store operation under a bounded timeout.
///
/// A timed-out operation becomes [`StoreError::Timeout`] for the entity it
/// was serving; it never blocks the rest of a batch.
pub async fn timed<T, F>(limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}
