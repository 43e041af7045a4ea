use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::model::{SeatId, ShowtimeId};
use crate::money::Money;

pub type BookingId = Uuid;
pub type LockId = Uuid;
pub type TicketId = Uuid;
/// Identity of the customer holding seats; owned by the auth layer.
pub type UserId = Uuid;

/// Seats per booking are bounded to 1..=MAX_QUANTITY.
pub const MAX_QUANTITY: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Expired,
}

impl BookingStatus {
    /// PENDING -> CONFIRMED | CANCELLED | EXPIRED, CONFIRMED -> CANCELLED.
    /// Nothing ever returns to PENDING.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Pending, Expired) | (Confirmed, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Expired)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(BookingStatus::Pending),
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            "EXPIRED" => Ok(BookingStatus::Expired),
            other => Err(anyhow::anyhow!("Invalid BookingStatus value: {}", other)),
        }
    }
}

/// A customer's purchase attempt for one showtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub showtime_id: ShowtimeId,
    pub user_id: UserId,
    pub quantity: u32,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    /// quantity x showtime price at creation (or at the last amendment).
    /// Later price changes on the showtime do not touch it.
    pub final_price: Money,
}

/// Temporary hold on one seat for one showtime.
///
/// Active while `expires_at > now`; `seat_locks` evaluates that in SQL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatLock {
    pub id: LockId,
    pub booking_id: BookingId,
    pub showtime_id: ShowtimeId,
    pub seat_id: SeatId,
    pub user_id: UserId,
    pub locked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Permanent ownership of one seat for the booking's showtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub booking_id: BookingId,
    pub showtime_id: ShowtimeId,
    pub seat_id: SeatId,
}

/// Outcome of one expiry sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_bookings: Vec<BookingId>,
    pub released_locks: u64,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.expired_bookings.is_empty() && self.released_locks == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL: [BookingStatus; 4] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::Cancelled,
        BookingStatus::Expired,
    ];

    #[test]
    fn status_round_trips_through_text() {
        for s in ALL {
            assert_eq!(s.to_string().parse::<BookingStatus>().unwrap(), s);
        }
        assert!("pending".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn allowed_transitions() {
        use BookingStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Pending.can_transition_to(Expired));
        assert!(Confirmed.can_transition_to(Cancelled));

        assert!(!Confirmed.can_transition_to(Expired));
        assert!(!Cancelled.can_transition_to(Confirmed));
        assert!(!Expired.can_transition_to(Confirmed));
    }

    proptest! {
        #[test]
        fn nothing_reenters_pending(from in 0usize..4) {
            prop_assert!(!ALL[from].can_transition_to(BookingStatus::Pending));
        }

        #[test]
        fn terminal_states_have_no_exits(from in 0usize..4, to in 0usize..4) {
            if ALL[from].is_terminal() {
                prop_assert!(!ALL[from].can_transition_to(ALL[to]));
            }
        }
    }
}
