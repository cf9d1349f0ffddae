/*!
 * Transaction helper
 *
 * Runs a closure inside one database transaction: commit on `Ok`, rollback on `Err`.
 */

use metrics::{counter, histogram};
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionError, TransactionTrait};
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::ServiceError;

/// Type alias for boxed future used in transactions
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Execute a function within a database transaction
///
/// ```rust,ignore
/// let lot = with_transaction(&db, move |txn| {
///     Box::pin(async move {
///         let repo = LineageRepository::new(txn, &tenant_id);
///         repo.find_lot(lot_id).await
///     })
/// })
/// .await?;
/// ```
pub async fn with_transaction<F, T>(db: &DatabaseConnection, f: F) -> Result<T, ServiceError>
where
    F: for<'a> FnOnce(&'a DatabaseTransaction) -> BoxFuture<'a, Result<T, ServiceError>> + Send,
    T: Send,
{
    let transaction_id = Uuid::new_v4();
    let start = std::time::Instant::now();

    debug!(transaction_id = %transaction_id, "Starting database transaction");
    counter!("lot_lineage_db.transaction.started", 1);

    let result = db.transaction::<_, T, ServiceError>(f).await;

    let elapsed = start.elapsed();
    histogram!("lot_lineage_db.transaction.duration", elapsed);

    match &result {
        Ok(_) => {
            counter!("lot_lineage_db.transaction.committed", 1);
            debug!(transaction_id = %transaction_id, "Transaction committed in {:?}", elapsed);
        }
        Err(_) => {
            counter!("lot_lineage_db.transaction.rolled_back", 1);
            warn!(transaction_id = %transaction_id, "Transaction rolled back after {:?}", elapsed);
        }
    }

    result.map_err(|e| match e {
        TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
        TransactionError::Transaction(err) => err,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::recipe;
    use sea_orm::{ActiveModelTrait, EntityTrait, PaginatorTrait, Set};

    async fn setup() -> DatabaseConnection {
        let db = crate::db::establish_connection_with_config(&crate::db::DbConfig {
            url: "sqlite::memory:".into(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        })
        .await
        .unwrap();
        crate::db::run_migrations(&db).await.unwrap();
        db
    }

    fn recipe_model(name: &str) -> recipe::ActiveModel {
        recipe::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set("t1".into()),
            name: Set(name.into()),
            style: Set(None),
            created_at: Set(chrono::Utc::now()),
        }
    }

    #[tokio::test]
    async fn commits_on_success() {
        let db = setup().await;
        let out = with_transaction(&db, |txn| {
            Box::pin(async move {
                recipe_model("Pale").insert(txn).await?;
                Ok(7)
            })
        })
        .await
        .unwrap();
        assert_eq!(out, 7);
        assert_eq!(recipe::Entity::find().count(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn rolls_back_and_returns_the_service_error() {
        let db = setup().await;
        let err = with_transaction::<_, ()>(&db, |txn| {
            Box::pin(async move {
                recipe_model("Stout").insert(txn).await?;
                Err(ServiceError::Conflict("stale".into()))
            })
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert_eq!(recipe::Entity::find().count(&db).await.unwrap(), 0);
    }
}
