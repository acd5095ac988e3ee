use log::debug;
use sqlx::SqliteConnection;

use crate::{db_types::CreditPack, traits::PaymentGatewayError};

pub async fn fetch_pack_for_reservation(
    reservation_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<CreditPack>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM credit_packs WHERE reservation_id = $1")
        .bind(reservation_id)
        .fetch_optional(conn)
        .await
}

pub async fn fetch_packs_for_user(user_id: i64, conn: &mut SqliteConnection) -> Result<Vec<CreditPack>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM credit_packs WHERE user_id = $1 ORDER BY created_at ASC")
        .bind(user_id)
        .fetch_all(conn)
        .await
}

/// The oldest pack with credits remaining and no expiry in the past, if any.
pub async fn fetch_usable_pack_for_user(
    user_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<CreditPack>, sqlx::Error> {
    sqlx::query_as(
        r#"
            SELECT * FROM credit_packs
            WHERE user_id = $1
              AND used_credits < total_credits
              AND (expires_at IS NULL OR expires_at > CURRENT_TIMESTAMP)
            ORDER BY created_at ASC
            LIMIT 1;
        "#,
    )
    .bind(user_id)
    .fetch_optional(conn)
    .await
}

/// Consumes one credit, guarded so that a pack can never go past its total. A `None` result
/// means another writer drained the pack first.
pub async fn consume_credit(
    pack_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<CreditPack>, PaymentGatewayError> {
    let result: Option<CreditPack> = sqlx::query_as(
        r#"
            UPDATE credit_packs
            SET used_credits = used_credits + 1
            WHERE id = $1 AND used_credits < total_credits
            RETURNING *;
        "#,
    )
    .bind(pack_id)
    .fetch_optional(conn)
    .await?;
    Ok(result)
}

/// Creates a new pack with the first credit already consumed by the triggering payment.
pub async fn insert_pack(
    user_id: i64,
    reservation_id: i64,
    pack_size: i64,
    conn: &mut SqliteConnection,
) -> Result<CreditPack, PaymentGatewayError> {
    let pack: CreditPack = sqlx::query_as(
        r#"
            INSERT INTO credit_packs (user_id, total_credits, used_credits, reservation_id)
            VALUES ($1, $2, 1, $3)
            RETURNING *;
        "#,
    )
    .bind(user_id)
    .bind(pack_size)
    .bind(reservation_id)
    .fetch_one(conn)
    .await?;
    debug!("🗃️🎟️ Credit pack {} created for user {user_id} ({} credits)", pack.id, pack.total_credits);
    Ok(pack)
}
