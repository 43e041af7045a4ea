use std::sync::Arc;
use std::time::Duration;

use common::logger::{annotate_booking, warn_if_slow};
use sqlx::AnyPool;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::gateway::PaymentGateway;
use super::model::{Payment, PaymentStatus};
use super::payments_sqlx;
use crate::booking::engine::ReservationEngine;
use crate::booking::{ledger, seat_locks};
use crate::booking::model::{Booking, BookingId, BookingStatus, UserId};
use crate::error::{BookingError, BookingResult};

const SLOW_CHARGE: Duration = Duration::from_secs(2);

/// A captured payment and the booking it confirmed.
#[derive(Debug, Clone)]
pub struct PaymentOutcome {
    pub payment: Payment,
    pub booking: Booking,
}

/// Charges a PENDING booking and confirms it.
///
/// Guarantees:
/// - a booking that is not PENDING, or whose hold has lapsed, is never charged
/// - at most one capture per booking is in flight; concurrent callers get
///   `PaymentInProgress`
/// - one gateway attempt per call, recorded as PROCESSING then SUCCESS or FAILED
/// - a failed charge leaves the booking and its seat locks untouched
///
/// An attempt left PROCESSING by a crash mid-charge blocks further captures
/// for that booking until an operator resolves it against the processor.
pub struct PaymentService {
    pool: AnyPool,
    engine: Arc<ReservationEngine>,
    gateway: Arc<dyn PaymentGateway>,
}

impl PaymentService {
    pub fn new(pool: AnyPool, engine: Arc<ReservationEngine>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            pool,
            engine,
            gateway,
        }
    }

    #[instrument(
        skip(self, token),
        target = "payment",
        fields(booking_id = %booking_id, showtime_id = tracing::field::Empty)
    )]
    pub async fn process_payment(&self, booking_id: BookingId, token: &str) -> BookingResult<PaymentOutcome> {
        let (booking, attempt) = self.begin_capture(booking_id).await?;

        let charged = warn_if_slow(
            "gateway_charge",
            SLOW_CHARGE,
            self.gateway.charge(booking.final_price, token),
        )
        .await;

        match charged {
            Ok(receipt) => {
                let payment = Payment {
                    external_ref: Some(receipt.external_ref),
                    status: PaymentStatus::Success,
                    ..attempt
                };
                self.settle(&payment).await.inspect_err(|e| {
                    error!(
                        payment_id = %payment.id,
                        external_ref = ?payment.external_ref,
                        error = %e,
                        "charge captured but not recorded"
                    );
                })?;

                let booking = self.engine.confirm_booking(booking_id).await.inspect_err(|e| {
                    error!(
                        payment_id = %payment.id,
                        error = %e,
                        "charge captured but confirmation failed"
                    );
                })?;

                info!(payment_id = %payment.id, amount = %payment.amount, "payment captured");
                Ok(PaymentOutcome { payment, booking })
            }
            Err(e) => {
                let payment = Payment {
                    status: PaymentStatus::Failed,
                    ..attempt
                };
                self.settle(&payment).await?;

                warn!(payment_id = %payment.id, reason = %e, "payment failed");
                Err(BookingError::PaymentFailed(e.to_string()))
            }
        }
    }

    pub async fn payments_for_booking(&self, booking_id: BookingId) -> BookingResult<Vec<Payment>> {
        let mut conn = self.pool.acquire().await?;
        payments_sqlx::for_booking(&mut conn, &booking_id).await
    }

    /// Newest first.
    pub async fn successful_payments_for_holder(&self, holder: UserId) -> BookingResult<Vec<Payment>> {
        let mut conn = self.pool.acquire().await?;
        payments_sqlx::successful_for_user(&mut conn, &holder).await
    }

    /// Checks the booking is payable and records a PROCESSING attempt, in one
    /// transaction that claims the booking row first. A second caller for the
    /// same booking sees the live attempt and is refused.
    async fn begin_capture(&self, booking_id: BookingId) -> BookingResult<(Booking, Payment)> {
        let now = self.engine.now();
        let mut tx = self.pool.begin().await?;

        if !ledger::claim(&mut tx, &booking_id).await? {
            return Err(BookingError::BookingNotFound(booking_id));
        }
        let booking = ledger::fetch(&mut tx, &booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound(booking_id))?;
        annotate_booking(&booking.showtime_id, Some(&booking.id));

        if booking.status != BookingStatus::Pending {
            warn!(status = %booking.status, "payment refused; booking not pending");
            return Err(BookingError::NotPayable(booking.status));
        }

        if seat_locks::active_for_booking(&mut tx, &booking, now.timestamp_millis())
            .await?
            .is_empty()
        {
            warn!("payment refused; hold has lapsed");
            return Err(BookingError::NoLockedSeats);
        }

        if payments_sqlx::live_for_booking(&mut tx, &booking_id).await? {
            warn!("payment refused; another capture is in flight");
            return Err(BookingError::PaymentInProgress);
        }

        let attempt = Payment {
            id: Uuid::new_v4(),
            booking_id,
            external_ref: None,
            amount: booking.final_price,
            status: PaymentStatus::Processing,
            created_at: now,
        };

        match payments_sqlx::insert(&mut tx, &attempt).await {
            Err(BookingError::Store(sqlx::Error::Database(db))) if db.is_unique_violation() => {
                warn!("payment refused; another capture is in flight");
                return Err(BookingError::PaymentInProgress);
            }
            other => other?,
        }
        tx.commit().await?;

        debug!(payment_id = %attempt.id, "capture started");
        Ok((booking, attempt))
    }

    async fn settle(&self, payment: &Payment) -> BookingResult<()> {
        let mut conn = self.pool.acquire().await?;
        let settled = payments_sqlx::settle(
            &mut conn,
            &payment.id,
            payment.status,
            payment.external_ref.as_deref(),
        )
        .await?;

        if !settled {
            return Err(anyhow::anyhow!("payment {} was not PROCESSING", payment.id).into());
        }
        Ok(())
    }
}
