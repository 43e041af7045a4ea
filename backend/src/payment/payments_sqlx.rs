//! Payment rows. Written outside the engine's transactions; a payment row
//! never gates seat ownership, only further capture attempts.

use std::str::FromStr;

use sqlx::{AnyConnection, Row};

use super::model::{Payment, PaymentId, PaymentStatus};
use crate::booking::model::{BookingId, UserId};
use crate::db::rows::{instant_col, uuid_col};
use crate::error::BookingResult;
use crate::money::Money;

pub async fn insert(conn: &mut AnyConnection, p: &Payment) -> BookingResult<()> {
    sqlx::query(
        r#"
INSERT INTO payments (payment_id, booking_id, external_ref, amount_minor, status, created_at_ms)
VALUES (?, ?, ?, ?, ?, ?)
"#,
    )
    .bind(p.id.to_string())
    .bind(p.booking_id.to_string())
    .bind(p.external_ref.clone())
    .bind(p.amount.minor_units())
    .bind(p.status.as_str())
    .bind(p.created_at.timestamp_millis())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// True while a PROCESSING or SUCCESS row exists for the booking.
pub async fn live_for_booking(conn: &mut AnyConnection, booking_id: &BookingId) -> BookingResult<bool> {
    let row = sqlx::query(
        "SELECT payment_id FROM payments WHERE booking_id = ? AND status IN ('PROCESSING', 'SUCCESS') LIMIT 1",
    )
    .bind(booking_id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.is_some())
}

/// Resolve a PROCESSING row. Returns false if it was not PROCESSING.
pub async fn settle(
    conn: &mut AnyConnection,
    payment_id: &PaymentId,
    status: PaymentStatus,
    external_ref: Option<&str>,
) -> BookingResult<bool> {
    let res = sqlx::query(
        "UPDATE payments SET status = ?, external_ref = ? WHERE payment_id = ? AND status = 'PROCESSING'",
    )
    .bind(status.as_str())
    .bind(external_ref.map(str::to_string))
    .bind(payment_id.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(res.rows_affected() == 1)
}

/// Oldest first: the order attempts were made.
pub async fn for_booking(conn: &mut AnyConnection, booking_id: &BookingId) -> BookingResult<Vec<Payment>> {
    let rows = sqlx::query(
        r#"
SELECT payment_id, booking_id, external_ref, amount_minor, status, created_at_ms
FROM payments
WHERE booking_id = ?
ORDER BY created_at_ms, payment_id
"#,
    )
    .bind(booking_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.iter().map(row_to_payment).collect::<anyhow::Result<Vec<_>>>()?)
}

/// Successful payments across all of a holder's bookings, newest first.
pub async fn successful_for_user(conn: &mut AnyConnection, user_id: &UserId) -> BookingResult<Vec<Payment>> {
    let rows = sqlx::query(
        r#"
SELECT p.payment_id, p.booking_id, p.external_ref, p.amount_minor, p.status, p.created_at_ms
FROM payments p
JOIN bookings b ON b.booking_id = p.booking_id
WHERE b.user_id = ? AND p.status = 'SUCCESS'
ORDER BY p.created_at_ms DESC
"#,
    )
    .bind(user_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.iter().map(row_to_payment).collect::<anyhow::Result<Vec<_>>>()?)
}

/* =========================
Row mapping
========================= */

fn row_to_payment(r: &sqlx::any::AnyRow) -> anyhow::Result<Payment> {
    let status_str: String = r.try_get("status")?;

    Ok(Payment {
        id: uuid_col(r, "payment_id")?,
        booking_id: uuid_col(r, "booking_id")?,
        external_ref: r.try_get("external_ref")?,
        amount: Money::from_minor(r.try_get("amount_minor")?),
        status: PaymentStatus::from_str(&status_str)?,
        created_at: instant_col(r, "created_at_ms")?,
    })
}
