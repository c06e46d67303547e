use std::sync::Arc;

use tracing::error;

use pinchat_db::{PersistenceGateway, StoreResult};

use crate::error::ApiError;

/// The storage backend chosen at startup.
pub type Store = Arc<dyn PersistenceGateway>;

/// Run a gateway call on the blocking pool. Join failures and backend errors
/// both surface as [`ApiError::UpstreamUnavailable`] (or `Conflict` for
/// uniqueness violations); nothing is retried here.
pub(crate) async fn blocking<T, F>(store: &Store, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&dyn PersistenceGateway) -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::UpstreamUnavailable
        })?
        .map_err(ApiError::from)
}
