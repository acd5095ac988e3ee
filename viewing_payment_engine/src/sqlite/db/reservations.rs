use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewReservation, Reservation, ReservationStatus, TransitionRecord},
    traits::PaymentGatewayError,
};

/// Inserts a reservation in `Pending` status. The reservation-request workflow proper lives
/// outside this crate; this is the narrow collaborator interface it uses.
pub async fn insert_reservation(
    reservation: NewReservation,
    conn: &mut SqliteConnection,
) -> Result<Reservation, PaymentGatewayError> {
    let result: Reservation = sqlx::query_as(
        r#"
            INSERT INTO reservations (user_id, proposed_at)
            VALUES ($1, $2)
            RETURNING *;
        "#,
    )
    .bind(reservation.user_id)
    .bind(reservation.proposed_at)
    .fetch_one(conn)
    .await?;
    debug!("🗃️🏠️ Reservation inserted with id {}", result.id);
    Ok(result)
}

/// Links a transaction to a reservation. The unique index on `transaction_id` enforces the
/// at-most-one-transaction-per-reservation invariant at the storage level.
pub async fn link_transaction(
    reservation_id: i64,
    transaction_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Reservation>, PaymentGatewayError> {
    let result: Option<Reservation> = sqlx::query_as(
        "UPDATE reservations SET transaction_id = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *",
    )
    .bind(transaction_id)
    .bind(reservation_id)
    .fetch_optional(conn)
    .await?;
    Ok(result)
}

pub async fn fetch_reservation(id: i64, conn: &mut SqliteConnection) -> Result<Option<Reservation>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM reservations WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_reservation_for_transaction(
    transaction_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Reservation>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM reservations WHERE transaction_id = $1")
        .bind(transaction_id)
        .fetch_optional(conn)
        .await
}

/// The guarded reservation transition. Only applies when the reservation is currently in
/// `expected`; a miss returns `None` rather than erroring, since a concurrent human action on the
/// reservation is an expected race, not a bug.
pub async fn guarded_transition(
    reservation_id: i64,
    expected: ReservationStatus,
    new_status: ReservationStatus,
    confirmed_at: Option<DateTime<Utc>>,
    conn: &mut SqliteConnection,
) -> Result<Option<Reservation>, PaymentGatewayError> {
    let result: Option<Reservation> = sqlx::query_as(
        r#"
            UPDATE reservations
            SET status = $1,
                confirmed_at = COALESCE($2, confirmed_at),
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $3 AND status = $4
            RETURNING *;
        "#,
    )
    .bind(new_status.to_string())
    .bind(confirmed_at)
    .bind(reservation_id)
    .bind(expected.to_string())
    .fetch_optional(conn)
    .await?;
    Ok(result)
}

/// Appends one immutable audit row. Rows in `reservation_transitions` are never updated or
/// deleted.
pub async fn insert_transition_record(
    reservation_id: i64,
    from_status: ReservationStatus,
    to_status: ReservationStatus,
    actor: &str,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<TransitionRecord, PaymentGatewayError> {
    let record: TransitionRecord = sqlx::query_as(
        r#"
            INSERT INTO reservation_transitions (reservation_id, from_status, to_status, actor, reason)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(reservation_id)
    .bind(from_status.to_string())
    .bind(to_status.to_string())
    .bind(actor)
    .bind(reason)
    .fetch_one(conn)
    .await?;
    Ok(record)
}

pub async fn fetch_transition_records(
    reservation_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<TransitionRecord>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM reservation_transitions WHERE reservation_id = $1 ORDER BY id ASC")
        .bind(reservation_id)
        .fetch_all(conn)
        .await
}
