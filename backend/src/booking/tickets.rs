//! Ticket Store: permanent seat ownership in `tickets`.

use sqlx::AnyConnection;

use super::model::{BookingId, Ticket};
use crate::catalog::model::{SeatId, ShowtimeId};
use crate::db::rows::{placeholders, uuid_col};
use crate::error::BookingResult;

pub async fn insert_many(conn: &mut AnyConnection, tickets: &[Ticket]) -> BookingResult<()> {
    for t in tickets {
        sqlx::query(
            "INSERT INTO tickets (ticket_id, booking_id, showtime_id, seat_id) VALUES (?, ?, ?, ?)",
        )
        .bind(t.id.to_string())
        .bind(t.booking_id.to_string())
        .bind(t.showtime_id.to_string())
        .bind(t.seat_id.to_string())
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Tickets already sold for any of `seat_ids` at this showtime.
pub async fn sold_among(
    conn: &mut AnyConnection,
    showtime_id: &ShowtimeId,
    seat_ids: &[SeatId],
) -> BookingResult<Vec<Ticket>> {
    if seat_ids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT ticket_id, booking_id, showtime_id, seat_id FROM tickets \
         WHERE showtime_id = ? AND seat_id IN ({})",
        placeholders(seat_ids.len())
    );

    let mut query = sqlx::query(&sql).bind(showtime_id.to_string());
    for id in seat_ids {
        query = query.bind(id.to_string());
    }

    let rows = query.fetch_all(&mut *conn).await?;
    Ok(rows.iter().map(row_to_ticket).collect::<anyhow::Result<Vec<_>>>()?)
}

pub async fn for_booking(conn: &mut AnyConnection, booking_id: &BookingId) -> BookingResult<Vec<Ticket>> {
    let rows = sqlx::query(
        "SELECT ticket_id, booking_id, showtime_id, seat_id FROM tickets WHERE booking_id = ?",
    )
    .bind(booking_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.iter().map(row_to_ticket).collect::<anyhow::Result<Vec<_>>>()?)
}

pub async fn delete_for_booking(conn: &mut AnyConnection, booking_id: &BookingId) -> BookingResult<u64> {
    let res = sqlx::query("DELETE FROM tickets WHERE booking_id = ?")
        .bind(booking_id.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(res.rows_affected())
}

fn row_to_ticket(r: &sqlx::any::AnyRow) -> anyhow::Result<Ticket> {
    Ok(Ticket {
        id: uuid_col(r, "ticket_id")?,
        booking_id: uuid_col(r, "booking_id")?,
        showtime_id: uuid_col(r, "showtime_id")?,
        seat_id: uuid_col(r, "seat_id")?,
    })
}
