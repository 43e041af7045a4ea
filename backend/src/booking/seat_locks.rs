//! Seat Lock Store: transient holds in `seat_locks`.
//!
//! A lock is active while `expires_at_ms > now`. The queries below are the
//! only place that predicate is evaluated; `ledger::expire_lapsed` and
//! `release_expired` use its complement. Only the reservation engine writes
//! here, always inside its own transaction.

use sqlx::AnyConnection;

use super::model::{Booking, SeatLock};
use crate::catalog::model::{SeatId, ShowtimeId};
use crate::db::rows::{instant_col, placeholders, uuid_col};
use crate::error::BookingResult;

const LOCK_COLUMNS: &str =
    "lock_id, booking_id, showtime_id, seat_id, user_id, locked_at_ms, expires_at_ms";

pub async fn insert_many(conn: &mut AnyConnection, locks: &[SeatLock]) -> BookingResult<()> {
    for lock in locks {
        sqlx::query(
            r#"
INSERT INTO seat_locks (
  lock_id, booking_id, showtime_id, seat_id, user_id, locked_at_ms, expires_at_ms
)
VALUES (?, ?, ?, ?, ?, ?, ?)
"#,
        )
        .bind(lock.id.to_string())
        .bind(lock.booking_id.to_string())
        .bind(lock.showtime_id.to_string())
        .bind(lock.seat_id.to_string())
        .bind(lock.user_id.to_string())
        .bind(lock.locked_at.timestamp_millis())
        .bind(lock.expires_at.timestamp_millis())
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Active locks on any of `seat_ids` for this showtime, whoever holds them.
pub async fn active_on_seats(
    conn: &mut AnyConnection,
    showtime_id: &ShowtimeId,
    seat_ids: &[SeatId],
    now_ms: i64,
) -> BookingResult<Vec<SeatLock>> {
    if seat_ids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT {LOCK_COLUMNS} FROM seat_locks \
         WHERE showtime_id = ? AND expires_at_ms > ? AND seat_id IN ({})",
        placeholders(seat_ids.len())
    );

    let mut query = sqlx::query(&sql)
        .bind(showtime_id.to_string())
        .bind(now_ms);
    for id in seat_ids {
        query = query.bind(id.to_string());
    }

    let rows = query.fetch_all(&mut *conn).await?;
    Ok(rows.iter().map(row_to_lock).collect::<anyhow::Result<Vec<_>>>()?)
}

/// Active locks owned by this booking's holder for its showtime.
pub async fn active_for_booking(
    conn: &mut AnyConnection,
    booking: &Booking,
    now_ms: i64,
) -> BookingResult<Vec<SeatLock>> {
    let rows = sqlx::query(&format!(
        "SELECT {LOCK_COLUMNS} FROM seat_locks \
         WHERE booking_id = ? AND user_id = ? AND showtime_id = ? AND expires_at_ms > ? \
         ORDER BY locked_at_ms, seat_id"
    ))
    .bind(booking.id.to_string())
    .bind(booking.user_id.to_string())
    .bind(booking.showtime_id.to_string())
    .bind(now_ms)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.iter().map(row_to_lock).collect::<anyhow::Result<Vec<_>>>()?)
}

/// Drop every lock the booking holds, active or not.
pub async fn release_for_booking(conn: &mut AnyConnection, booking: &Booking) -> BookingResult<u64> {
    let res = sqlx::query(
        "DELETE FROM seat_locks WHERE booking_id = ? AND user_id = ? AND showtime_id = ?",
    )
    .bind(booking.id.to_string())
    .bind(booking.user_id.to_string())
    .bind(booking.showtime_id.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(res.rows_affected())
}

pub async fn release_expired(conn: &mut AnyConnection, now_ms: i64) -> BookingResult<u64> {
    let res = sqlx::query("DELETE FROM seat_locks WHERE expires_at_ms <= ?")
        .bind(now_ms)
        .execute(&mut *conn)
        .await?;

    Ok(res.rows_affected())
}

/* =========================
Row mapping
========================= */

fn row_to_lock(r: &sqlx::any::AnyRow) -> anyhow::Result<SeatLock> {
    Ok(SeatLock {
        id: uuid_col(r, "lock_id")?,
        booking_id: uuid_col(r, "booking_id")?,
        showtime_id: uuid_col(r, "showtime_id")?,
        seat_id: uuid_col(r, "seat_id")?,
        user_id: uuid_col(r, "user_id")?,
        locked_at: instant_col(r, "locked_at_ms")?,
        expires_at: instant_col(r, "expires_at_ms")?,
    })
}
