use thiserror::Error;
use uuid::Uuid;

use crate::booking::model::BookingStatus;

/// Everything the reservation core can fail with.
///
/// Variants up to `PaymentInProgress` are business rejections: the caller can fix
/// the request and try again, and their message is safe to show verbatim.
/// `Store` and `Internal` are system faults; the operation was rolled back
/// and nothing was written.
#[derive(Error, Debug)]
pub enum BookingError {
    #[error("the movie is already finished")]
    AlreadyFinished,

    #[error("the movie has already started")]
    AlreadyStarted,

    #[error("please choose {expected} seats (got {actual})")]
    QuantityMismatch { expected: u32, actual: usize },

    #[error("quantity must be between 1 and {max} (got {actual})")]
    InvalidQuantity { actual: u32, max: u32 },

    #[error("one or more seats are already sold")]
    SeatsAlreadySold,

    #[error("one or more seats are not available")]
    InvalidSeat,

    #[error("one or more seats are on hold by someone else")]
    SeatsOnHold,

    #[error("you already hold one or more of these seats in a pending booking")]
    DuplicatePendingBooking,

    #[error("booking has no locked seats to confirm")]
    NoLockedSeats,

    #[error("payment failed: {0}")]
    PaymentFailed(String),

    #[error("showtime {0} not found")]
    ShowtimeNotFound(Uuid),

    #[error("booking {0} not found")]
    BookingNotFound(Uuid),

    #[error("booking is {0} and cannot be amended")]
    NotAmendable(BookingStatus),

    #[error("booking is {0} and cannot be paid")]
    NotPayable(BookingStatus),

    #[error("a payment for this booking is already in progress")]
    PaymentInProgress,

    #[error("storage failure: {0}")]
    Store(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl BookingError {
    /// True for client-correctable business rule violations.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, BookingError::Store(_) | BookingError::Internal(_))
    }
}

pub type BookingResult<T> = Result<T, BookingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_and_faults_are_distinct() {
        assert!(BookingError::SeatsOnHold.is_rejection());
        assert!(BookingError::PaymentFailed("card declined".into()).is_rejection());
        assert!(BookingError::PaymentInProgress.is_rejection());
        assert!(!BookingError::Store(sqlx::Error::PoolTimedOut).is_rejection());
        assert!(!BookingError::Internal(anyhow::anyhow!("bad row")).is_rejection());
    }

    #[test]
    fn messages_are_user_facing() {
        let err = BookingError::QuantityMismatch {
            expected: 2,
            actual: 1,
        };
        assert_eq!(err.to_string(), "please choose 2 seats (got 1)");
        assert_eq!(
            BookingError::NotPayable(BookingStatus::Expired).to_string(),
            "booking is EXPIRED and cannot be paid"
        );
    }
}
