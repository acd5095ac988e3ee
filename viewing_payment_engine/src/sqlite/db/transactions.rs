use log::{debug, trace};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{NewTransaction, Transaction, TransactionStatus},
    traits::PaymentGatewayError,
};

/// Inserts a new transaction in `Created` status.
pub async fn insert_transaction(
    tx: NewTransaction,
    conn: &mut SqliteConnection,
) -> Result<Transaction, PaymentGatewayError> {
    let result: Transaction = sqlx::query_as(
        r#"
            INSERT INTO transactions (provider, amount, currency, reference)
            VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(tx.provider.to_string())
    .bind(tx.amount.value())
    .bind(tx.currency)
    .bind(tx.reference)
    .fetch_one(conn)
    .await?;
    debug!("🗃️💳️ Transaction inserted with id {}", result.id);
    Ok(result)
}

pub async fn fetch_transaction(id: i64, conn: &mut SqliteConnection) -> Result<Option<Transaction>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM transactions WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_transaction_by_provider_id(
    provider_tx_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM transactions WHERE provider_tx_id = $1")
        .bind(provider_tx_id)
        .fetch_optional(conn)
        .await
}

/// Records the provider-side id and forces the status to `Pending`. The `status = 'Created'`
/// guard makes this atomic with respect to concurrent writers: only one caller can ever win.
pub async fn set_provider_details(
    id: i64,
    provider_tx_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, PaymentGatewayError> {
    let result: Option<Transaction> = sqlx::query_as(
        r#"
            UPDATE transactions
            SET provider_tx_id = $1, status = 'Pending', updated_at = CURRENT_TIMESTAMP
            WHERE id = $2 AND status = 'Created'
            RETURNING *;
        "#,
    )
    .bind(provider_tx_id)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(result)
}

/// The guarded compare-and-swap at the heart of the ledger. The new status is only persisted if
/// the current status is one of the legal sources for it; otherwise no row matches and `None` is
/// returned, leaving the caller to decide whether that was a harmless replay or a violation.
pub async fn guarded_status_update(
    id: i64,
    new_status: TransactionStatus,
    failure_reason: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, PaymentGatewayError> {
    let sources = TransactionStatus::allowed_sources(new_status);
    if sources.is_empty() {
        return Ok(None);
    }
    let mut builder = QueryBuilder::new("UPDATE transactions SET updated_at = CURRENT_TIMESTAMP, status = ");
    builder.push_bind(new_status.to_string());
    if new_status == TransactionStatus::Completed {
        builder.push(", completed_at = CURRENT_TIMESTAMP");
    }
    if new_status == TransactionStatus::Failed {
        builder.push(", failure_reason = ");
        builder.push_bind(failure_reason);
    }
    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.push(" AND status IN (");
    let mut in_clause = builder.separated(", ");
    for source in sources {
        in_clause.push_bind(source.to_string());
    }
    builder.push(") RETURNING *");
    trace!("🗃️💳️ Executing query: {}", builder.sql());
    let result = builder.build_query_as::<Transaction>().fetch_optional(conn).await?;
    Ok(result)
}
