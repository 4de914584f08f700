//! Adding and removing tracked accounts.

use cpdb_core::{normalize_handle, TrackedAccount};
use cpdb_db::DbError;
use uuid::Uuid;

use crate::error::CollectorError;
use crate::store::AccountStore;

/// Normalizes `raw_handle` and starts tracking it.
///
/// The new account has never been refreshed. Use
/// [`crate::CollectionScheduler::register_account`] to also run the first
/// refresh when the budget allows.
///
/// # Errors
///
/// - [`CollectorError::InvalidHandle`] if the handle does not normalize.
/// - [`CollectorError::DuplicateHandle`] if it is already tracked.
/// - [`CollectorError::Store`] on any other store failure.
pub async fn add_account(
    store: &dyn AccountStore,
    raw_handle: &str,
    project_id: Option<Uuid>,
) -> Result<TrackedAccount, CollectorError> {
    let handle = normalize_handle(raw_handle)?;

    if store.find_account_by_handle(&handle).await?.is_some() {
        return Err(CollectorError::DuplicateHandle(handle));
    }

    match store.insert_tracked_account(&handle, project_id).await {
        Ok(account) => {
            tracing::info!(handle = %account.handle, id = account.id, "account registered");
            Ok(account)
        }
        // Lost a race with a concurrent insert of the same handle.
        Err(DbError::Conflict(_)) => Err(CollectorError::DuplicateHandle(handle)),
        Err(e) => Err(e.into()),
    }
}

/// Stops tracking `raw_handle` and deletes its posts.
///
/// # Errors
///
/// - [`CollectorError::InvalidHandle`] if the handle does not normalize.
/// - [`CollectorError::AccountNotFound`] if it is not tracked.
/// - [`CollectorError::Store`] on store failure.
pub async fn remove_account(
    store: &dyn AccountStore,
    raw_handle: &str,
) -> Result<TrackedAccount, CollectorError> {
    let handle = normalize_handle(raw_handle)?;
    let Some(account) = store.find_account_by_handle(&handle).await? else {
        return Err(CollectorError::AccountNotFound(format!("@{handle}")));
    };
    remove_resolved_account(store, &account).await?;
    Ok(account)
}

/// Deletes an already-resolved account.
///
/// # Errors
///
/// [`CollectorError::AccountNotFound`] if the row vanished in the meantime,
/// [`CollectorError::Store`] on store failure.
pub async fn remove_resolved_account(
    store: &dyn AccountStore,
    account: &TrackedAccount,
) -> Result<(), CollectorError> {
    if store.delete_tracked_account(account.id).await? {
        tracing::info!(handle = %account.handle, id = account.id, "account removed");
        Ok(())
    } else {
        Err(CollectorError::AccountNotFound(format!("@{}", account.handle)))
    }
}
