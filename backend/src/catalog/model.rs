use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::Money;

pub type MovieId = Uuid;
pub type HallId = Uuid;
pub type SeatId = Uuid;
pub type ShowtimeId = Uuid;

/// Time between screenings in one hall for cleaning.
pub const CLEANING_BUFFER_MINUTES: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movie {
    pub id: MovieId,
    pub title: String,
    pub duration_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hall {
    pub id: HallId,
    pub name: String,
    /// Rows are labelled `A`, `B`, ... so at most 26.
    pub row_count: u32,
    pub seats_per_row: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub id: SeatId,
    pub hall_id: HallId,
    pub row_label: char,
    pub column_number: u32,
    /// False while the seat is broken or otherwise out of service.
    pub in_service: bool,
}

impl fmt::Display for Seat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.row_label, self.column_number)
    }
}

/// One screening of a movie in a hall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Showtime {
    pub id: ShowtimeId,
    pub movie_id: MovieId,
    pub hall_id: HallId,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    /// Current price per seat. Bookings freeze their own total at creation.
    pub price: Money,
}

impl Showtime {
    pub fn has_finished(&self, now: DateTime<Utc>) -> bool {
        self.end_at < now
    }

    /// Booking closes when the screening starts, not when it ends.
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.start_at < now
    }
}

/// End of a screening: movie runtime plus the cleaning buffer.
pub fn screening_end(start_at: DateTime<Utc>, duration_minutes: u32) -> DateTime<Utc> {
    start_at + Duration::minutes(i64::from(duration_minutes) + CLEANING_BUFFER_MINUTES)
}

/// Half-open interval overlap: back-to-back screenings do not collide.
pub fn windows_overlap(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && a_end > b_start
}

/// Seat grid for a new hall: rows `A..` times columns `1..=seats_per_row`.
pub fn seat_grid(hall_id: HallId, row_count: u32, seats_per_row: u32) -> Vec<Seat> {
    let mut seats = Vec::with_capacity((row_count * seats_per_row) as usize);

    for r in 0..row_count.min(26) {
        let row_label = char::from(b'A' + r as u8);

        for column_number in 1..=seats_per_row {
            seats.push(Seat {
                id: Uuid::new_v4(),
                hall_id,
                row_label,
                column_number,
                in_service: true,
            });
        }
    }

    seats
}
