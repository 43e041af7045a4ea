//! Booking Ledger: row access for the `bookings` table.
//!
//! Every function runs on a caller-supplied connection so the engine can
//! compose them inside one transaction.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::{AnyConnection, Row};

use super::model::{Booking, BookingId, BookingStatus, UserId};
use crate::catalog::model::SeatId;
use crate::db::rows::{instant_col, u32_col, uuid_col};
use crate::error::BookingResult;
use crate::money::Money;

const BOOKING_COLUMNS: &str =
    "booking_id, showtime_id, user_id, quantity, status, created_at_ms, final_price_minor";

pub async fn insert(conn: &mut AnyConnection, b: &Booking) -> BookingResult<()> {
    sqlx::query(
        r#"
INSERT INTO bookings (
  booking_id, showtime_id, user_id, quantity, status, created_at_ms, final_price_minor
)
VALUES (?, ?, ?, ?, ?, ?, ?)
"#,
    )
    .bind(b.id.to_string())
    .bind(b.showtime_id.to_string())
    .bind(b.user_id.to_string())
    .bind(i64::from(b.quantity))
    .bind(b.status.as_str())
    .bind(b.created_at.timestamp_millis())
    .bind(b.final_price.minor_units())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Rewrite the mutable columns (amendments).
pub async fn update(conn: &mut AnyConnection, b: &Booking) -> BookingResult<()> {
    sqlx::query(
        r#"
UPDATE bookings
SET showtime_id = ?, quantity = ?, status = ?, final_price_minor = ?
WHERE booking_id = ?
"#,
    )
    .bind(b.showtime_id.to_string())
    .bind(i64::from(b.quantity))
    .bind(b.status.as_str())
    .bind(b.final_price.minor_units())
    .bind(b.id.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Take the write lock on a booking row before reading it.
///
/// A no-op UPDATE: on SQLite it acquires the database write lock for the
/// transaction, elsewhere it row-locks like `SELECT ... FOR UPDATE`.
/// Returns false if the booking does not exist.
pub async fn claim(conn: &mut AnyConnection, id: &BookingId) -> BookingResult<bool> {
    let res = sqlx::query("UPDATE bookings SET status = status WHERE booking_id = ?")
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(res.rows_affected() > 0)
}

pub async fn fetch(conn: &mut AnyConnection, id: &BookingId) -> BookingResult<Option<Booking>> {
    let row = sqlx::query(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE booking_id = ?"
    ))
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.as_ref().map(row_to_booking).transpose()?)
}

/// Newest first.
pub async fn for_user(conn: &mut AnyConnection, user_id: &UserId) -> BookingResult<Vec<Booking>> {
    let rows = sqlx::query(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE user_id = ? ORDER BY created_at_ms DESC"
    ))
    .bind(user_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.iter().map(row_to_booking).collect::<anyhow::Result<Vec<_>>>()?)
}

/// Compare-and-set on status. False when the row was not in `from`.
pub async fn transition(
    conn: &mut AnyConnection,
    id: &BookingId,
    from: BookingStatus,
    to: BookingStatus,
) -> BookingResult<bool> {
    debug_assert!(from.can_transition_to(to), "illegal transition {from} -> {to}");

    let res = sqlx::query("UPDATE bookings SET status = ? WHERE booking_id = ? AND status = ?")
        .bind(to.as_str())
        .bind(id.to_string())
        .bind(from.as_str())
        .execute(&mut *conn)
        .await?;

    Ok(res.rows_affected() == 1)
}

/// Mark EXPIRED every PENDING booking that owns a lapsed seat lock.
///
/// Matches locks on booking id as well as on (holder, showtime).
pub async fn expire_lapsed(conn: &mut AnyConnection, now_ms: i64) -> BookingResult<Vec<BookingId>> {
    let rows = sqlx::query(
        r#"
UPDATE bookings
SET status = 'EXPIRED'
WHERE status = 'PENDING'
  AND EXISTS (
    SELECT 1 FROM seat_locks l
    WHERE l.booking_id = bookings.booking_id
      AND l.user_id = bookings.user_id
      AND l.showtime_id = bookings.showtime_id
      AND l.expires_at_ms <= ?
  )
RETURNING booking_id
"#,
    )
    .bind(now_ms)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .iter()
        .map(|r| uuid_col(r, "booking_id"))
        .collect::<anyhow::Result<Vec<_>>>()?)
}

/// Audit trail for administrative amendments.
pub async fn record_amendment(
    conn: &mut AnyConnection,
    booking_id: &BookingId,
    amended_by: &UserId,
    at: DateTime<Utc>,
    seat_ids: &[SeatId],
) -> BookingResult<()> {
    let seat_ids_json = serde_json::to_string(seat_ids).map_err(anyhow::Error::from)?;

    sqlx::query(
        r#"
INSERT INTO booking_amendments (amendment_id, booking_id, amended_by, amended_at_ms, seat_ids_json)
VALUES (?, ?, ?, ?, ?)
"#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(booking_id.to_string())
    .bind(amended_by.to_string())
    .bind(at.timestamp_millis())
    .bind(seat_ids_json)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/* =========================
Row mapping
========================= */

fn row_to_booking(r: &sqlx::any::AnyRow) -> anyhow::Result<Booking> {
    let status_str: String = r.try_get("status")?;
    let status = BookingStatus::from_str(&status_str)
        .map_err(|e| anyhow::anyhow!("Invalid booking status '{}': {}", status_str, e))?;

    Ok(Booking {
        id: uuid_col(r, "booking_id")?,
        showtime_id: uuid_col(r, "showtime_id")?,
        user_id: uuid_col(r, "user_id")?,
        quantity: u32_col(r, "quantity")?,
        status,
        created_at: instant_col(r, "created_at_ms")?,
        final_price: Money::from_minor(r.try_get("final_price_minor")?),
    })
}
