//! Reservation engine.
//!
//! Owns every write to bookings, seat locks and tickets. Each operation runs
//! as one database transaction whose first statement is a write, so the
//! conflict reads that follow see a stable view and two racing requests for
//! the same seat can never both pass their checks.
//!
//! Guarantees:
//! - a seat is held by at most one active lock and sold at most once per showtime
//! - a CONFIRMED booking owns exactly `quantity` tickets and no locks
//! - lapsed holds are swept before any conflict check reads lock state
//! - a rejected request writes nothing; its transaction rolls back on drop
//!
//! Time is read from the injected `Clock`, never from the wall clock.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use common::clock::Clock;
use common::logger::{annotate_booking, warn_if_slow};
use sqlx::{AnyConnection, AnyPool};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::model::{Booking, BookingId, BookingStatus, MAX_QUANTITY, SeatLock, SweepReport, Ticket, UserId};
use super::{ledger, seat_locks, sweep, tickets};
use crate::catalog::Catalog;
use crate::catalog::model::{SeatId, Showtime, ShowtimeId};
use crate::error::{BookingError, BookingResult};

pub const DEFAULT_HOLD: Duration = Duration::from_secs(10 * 60);

const SLOW_TX: Duration = Duration::from_millis(250);

/// A customer asking to hold seats for a showtime.
#[derive(Debug, Clone)]
pub struct HoldRequest {
    pub holder: UserId,
    pub showtime_id: ShowtimeId,
    pub quantity: u32,
    pub seat_ids: Vec<SeatId>,
}

/// An administrator rewriting an existing booking's seats.
///
/// `showtime_id` and `quantity` default to the booking's current values.
#[derive(Debug, Clone)]
pub struct Amendment {
    pub booking_id: BookingId,
    pub amended_by: UserId,
    pub showtime_id: Option<ShowtimeId>,
    pub quantity: Option<u32>,
    pub seat_ids: Vec<SeatId>,
}

#[derive(Debug, Clone)]
pub enum BookingRequest {
    Hold(HoldRequest),
    AdminAmendment(Amendment),
}

/// Which booking, if any, the conflict checks should treat as "self".
#[derive(Clone, Copy)]
enum Owner {
    Holder(UserId),
    Booking(BookingId),
}

pub struct ReservationEngine {
    pool: AnyPool,
    catalog: Arc<dyn Catalog>,
    clock: Arc<dyn Clock>,
    hold: TimeDelta,
}

impl ReservationEngine {
    pub fn new(pool: AnyPool, catalog: Arc<dyn Catalog>, clock: Arc<dyn Clock>, hold: Duration) -> Self {
        let hold = TimeDelta::from_std(hold).unwrap_or_else(|_| {
            warn!(hold_secs = hold.as_secs(), "seat hold out of range; using default");
            TimeDelta::minutes(10)
        });

        Self {
            pool,
            catalog,
            clock,
            hold,
        }
    }

    pub fn hold(&self) -> TimeDelta {
        self.hold
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Place a hold, or apply an administrative amendment.
    ///
    /// Checks run in a fixed order and the first failure wins:
    /// showtime finished, showtime started, quantity mismatch, seats sold,
    /// seats invalid, seats held by someone else, duplicate pending hold.
    pub async fn request_booking(&self, request: BookingRequest) -> BookingResult<Booking> {
        let res = match request {
            BookingRequest::Hold(req) => self.place_hold(req).await,
            BookingRequest::AdminAmendment(a) => self.amend(a).await,
        };

        if let Err(e) = &res {
            if e.is_rejection() {
                warn!(target: "engine", reason = %e, "booking request rejected");
            } else {
                error!(target: "engine", error = ?e, "booking request failed");
            }
        }
        res
    }

    #[instrument(
        skip(self, req),
        target = "engine",
        fields(
            holder = %req.holder,
            showtime_id = %req.showtime_id,
            quantity = req.quantity,
            booking_id = tracing::field::Empty
        )
    )]
    async fn place_hold(&self, req: HoldRequest) -> BookingResult<Booking> {
        check_quantity(req.quantity)?;

        let showtime = self.showtime(&req.showtime_id).await?;
        let now = self.clock.now();
        check_window(&showtime, now)?;

        let valid = self.catalog.seats_exist(&showtime.hall_id, &req.seat_ids).await?;

        let mut tx = self.pool.begin().await?;
        sweep::run(&mut tx, now).await?;

        check_conflicts(
            &mut tx,
            &showtime,
            req.quantity,
            &req.seat_ids,
            &valid,
            Owner::Holder(req.holder),
            now,
        )
        .await?;

        let booking = Booking {
            id: Uuid::new_v4(),
            showtime_id: showtime.id,
            user_id: req.holder,
            quantity: req.quantity,
            status: BookingStatus::Pending,
            created_at: now,
            final_price: price_for(&showtime, req.quantity)?,
        };

        let expires_at = now + self.hold;
        let locks: Vec<SeatLock> = req
            .seat_ids
            .iter()
            .map(|seat_id| SeatLock {
                id: Uuid::new_v4(),
                booking_id: booking.id,
                showtime_id: showtime.id,
                seat_id: *seat_id,
                user_id: req.holder,
                locked_at: now,
                expires_at,
            })
            .collect();

        warn_if_slow("hold_commit", SLOW_TX, async {
            ledger::insert(&mut tx, &booking).await?;
            seat_locks::insert_many(&mut tx, &locks).await?;
            tx.commit().await?;
            Ok::<_, BookingError>(())
        })
        .await?;

        annotate_booking(&showtime.id, Some(&booking.id));
        info!(
            booking_id = %booking.id,
            seats = locks.len(),
            %expires_at,
            final_price = %booking.final_price,
            "seats held"
        );
        Ok(booking)
    }

    #[instrument(
        skip(self, a),
        target = "engine",
        fields(
            booking_id = %a.booking_id,
            amended_by = %a.amended_by,
            showtime_id = tracing::field::Empty
        )
    )]
    async fn amend(&self, a: Amendment) -> BookingResult<Booking> {
        let current = self.booking(a.booking_id).await?;
        ensure_amendable(&current)?;

        let quantity = a.quantity.unwrap_or(current.quantity);
        check_quantity(quantity)?;

        let showtime = self
            .showtime(&a.showtime_id.unwrap_or(current.showtime_id))
            .await?;
        let now = self.clock.now();
        check_window(&showtime, now)?;

        let valid = self.catalog.seats_exist(&showtime.hall_id, &a.seat_ids).await?;

        let mut tx = self.pool.begin().await?;
        sweep::run(&mut tx, now).await?;

        // The sweep may have expired it, or a concurrent cancel may have won.
        let current = locked_booking(&mut tx, &a.booking_id).await?;
        ensure_amendable(&current)?;

        check_conflicts(
            &mut tx,
            &showtime,
            quantity,
            &a.seat_ids,
            &valid,
            Owner::Booking(current.id),
            now,
        )
        .await?;

        let amended = Booking {
            showtime_id: showtime.id,
            quantity,
            status: BookingStatus::Confirmed,
            final_price: price_for(&showtime, quantity)?,
            ..current.clone()
        };

        let new_tickets: Vec<Ticket> = a
            .seat_ids
            .iter()
            .map(|seat_id| Ticket {
                id: Uuid::new_v4(),
                booking_id: amended.id,
                showtime_id: showtime.id,
                seat_id: *seat_id,
            })
            .collect();

        warn_if_slow("amend_commit", SLOW_TX, async {
            tickets::delete_for_booking(&mut tx, &current.id).await?;
            seat_locks::release_for_booking(&mut tx, &current).await?;
            ledger::update(&mut tx, &amended).await?;
            tickets::insert_many(&mut tx, &new_tickets).await?;
            ledger::record_amendment(&mut tx, &amended.id, &a.amended_by, now, &a.seat_ids).await?;
            tx.commit().await?;
            Ok::<_, BookingError>(())
        })
        .await?;

        annotate_booking(&showtime.id, Some(&amended.id));
        info!(
            from_status = %current.status,
            seats = new_tickets.len(),
            final_price = %amended.final_price,
            "booking amended"
        );
        Ok(amended)
    }

    /// Turn a PENDING booking's active locks into tickets.
    ///
    /// Any other status is returned unchanged. Fails with `NoLockedSeats`
    /// when the hold has lapsed.
    #[instrument(
        skip(self),
        target = "engine",
        fields(booking_id = %id, showtime_id = tracing::field::Empty)
    )]
    pub async fn confirm_booking(&self, id: BookingId) -> BookingResult<Booking> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;

        let booking = locked_booking(&mut tx, &id).await?;
        if booking.status != BookingStatus::Pending {
            debug!(status = %booking.status, "confirm skipped; booking not pending");
            return Ok(booking);
        }

        let locks = seat_locks::active_for_booking(&mut tx, &booking, now.timestamp_millis()).await?;
        if locks.is_empty() {
            warn!("no active locks to confirm");
            return Err(BookingError::NoLockedSeats);
        }

        let new_tickets: Vec<Ticket> = locks
            .iter()
            .map(|lock| Ticket {
                id: Uuid::new_v4(),
                booking_id: booking.id,
                showtime_id: lock.showtime_id,
                seat_id: lock.seat_id,
            })
            .collect();

        warn_if_slow("confirm_commit", SLOW_TX, async {
            tickets::insert_many(&mut tx, &new_tickets).await?;
            seat_locks::release_for_booking(&mut tx, &booking).await?;
            if !ledger::transition(&mut tx, &booking.id, BookingStatus::Pending, BookingStatus::Confirmed).await? {
                return Err(anyhow::anyhow!("booking {} left PENDING mid-confirm", booking.id).into());
            }
            tx.commit().await?;
            Ok::<_, BookingError>(())
        })
        .await?;

        annotate_booking(&booking.showtime_id, Some(&booking.id));
        info!(tickets = new_tickets.len(), "booking confirmed");

        Ok(Booking {
            status: BookingStatus::Confirmed,
            ..booking
        })
    }

    /// CONFIRMED bookings give up their tickets, PENDING ones their locks.
    /// Terminal bookings are returned unchanged.
    #[instrument(skip(self), target = "engine", fields(booking_id = %id))]
    pub async fn cancel_booking(&self, id: BookingId) -> BookingResult<Booking> {
        let mut tx = self.pool.begin().await?;

        let booking = locked_booking(&mut tx, &id).await?;
        let released = match booking.status {
            BookingStatus::Confirmed => tickets::delete_for_booking(&mut tx, &booking.id).await?,
            BookingStatus::Pending => seat_locks::release_for_booking(&mut tx, &booking).await?,
            BookingStatus::Cancelled | BookingStatus::Expired => {
                debug!(status = %booking.status, "cancel skipped; booking already terminal");
                return Ok(booking);
            }
        };

        if !ledger::transition(&mut tx, &booking.id, booking.status, BookingStatus::Cancelled).await? {
            return Err(anyhow::anyhow!("booking {} changed status mid-cancel", booking.id).into());
        }
        tx.commit().await?;

        info!(from_status = %booking.status, released, "booking cancelled");

        Ok(Booking {
            status: BookingStatus::Cancelled,
            ..booking
        })
    }

    /// Expire every lapsed hold now. Requests already sweep lazily; this is
    /// what the background loop calls.
    #[instrument(skip(self), target = "engine")]
    pub async fn sweep_expired(&self) -> BookingResult<SweepReport> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;
        let report = sweep::run(&mut tx, now).await?;
        tx.commit().await?;
        Ok(report)
    }

    /* =========================
    Queries
    ========================= */

    pub async fn booking(&self, id: BookingId) -> BookingResult<Booking> {
        let mut conn = self.pool.acquire().await?;
        ledger::fetch(&mut conn, &id)
            .await?
            .ok_or(BookingError::BookingNotFound(id))
    }

    /// Newest first.
    pub async fn bookings_for_holder(&self, holder: UserId) -> BookingResult<Vec<Booking>> {
        let mut conn = self.pool.acquire().await?;
        ledger::for_user(&mut conn, &holder).await
    }

    /// Seats the booking currently occupies: tickets once confirmed, active
    /// locks while pending, nothing otherwise.
    pub async fn seats_of(&self, id: BookingId) -> BookingResult<Vec<SeatId>> {
        let mut conn = self.pool.acquire().await?;
        let booking = ledger::fetch(&mut conn, &id)
            .await?
            .ok_or(BookingError::BookingNotFound(id))?;

        let seats = match booking.status {
            BookingStatus::Confirmed => tickets::for_booking(&mut conn, &id)
                .await?
                .into_iter()
                .map(|t| t.seat_id)
                .collect(),
            BookingStatus::Pending => {
                seat_locks::active_for_booking(&mut conn, &booking, self.clock.now_ms())
                    .await?
                    .into_iter()
                    .map(|l| l.seat_id)
                    .collect()
            }
            BookingStatus::Cancelled | BookingStatus::Expired => Vec::new(),
        };
        Ok(seats)
    }

    async fn showtime(&self, id: &ShowtimeId) -> BookingResult<Showtime> {
        self.catalog
            .get_showtime(id)
            .await?
            .ok_or(BookingError::ShowtimeNotFound(*id))
    }
}

fn check_quantity(quantity: u32) -> BookingResult<()> {
    if !(1..=MAX_QUANTITY).contains(&quantity) {
        return Err(BookingError::InvalidQuantity {
            actual: quantity,
            max: MAX_QUANTITY,
        });
    }
    Ok(())
}

fn check_window(showtime: &Showtime, now: DateTime<Utc>) -> BookingResult<()> {
    if showtime.has_finished(now) {
        return Err(BookingError::AlreadyFinished);
    }
    if showtime.has_started(now) {
        return Err(BookingError::AlreadyStarted);
    }
    Ok(())
}

fn ensure_amendable(b: &Booking) -> BookingResult<()> {
    match b.status {
        BookingStatus::Pending | BookingStatus::Confirmed => Ok(()),
        other => Err(BookingError::NotAmendable(other)),
    }
}

fn price_for(showtime: &Showtime, quantity: u32) -> BookingResult<crate::money::Money> {
    showtime
        .price
        .times(quantity)
        .ok_or_else(|| anyhow::anyhow!("price overflow for {quantity} x {}", showtime.price).into())
}

/// Claim the booking row, then read it.
async fn locked_booking(conn: &mut AnyConnection, id: &BookingId) -> BookingResult<Booking> {
    if !ledger::claim(conn, id).await? {
        return Err(BookingError::BookingNotFound(*id));
    }
    ledger::fetch(conn, id)
        .await?
        .ok_or(BookingError::BookingNotFound(*id))
}

/// Quantity, sold, invalid, held, duplicate: in that order.
async fn check_conflicts(
    conn: &mut AnyConnection,
    showtime: &Showtime,
    quantity: u32,
    seat_ids: &[SeatId],
    valid: &HashSet<SeatId>,
    owner: Owner,
    now: DateTime<Utc>,
) -> BookingResult<()> {
    if seat_ids.len() != quantity as usize {
        return Err(BookingError::QuantityMismatch {
            expected: quantity,
            actual: seat_ids.len(),
        });
    }

    let sold = tickets::sold_among(conn, &showtime.id, seat_ids).await?;
    let sold_to_others = sold.iter().any(|t| match owner {
        Owner::Booking(own) => t.booking_id != own,
        Owner::Holder(_) => true,
    });
    if sold_to_others {
        return Err(BookingError::SeatsAlreadySold);
    }

    let distinct: HashSet<&SeatId> = seat_ids.iter().collect();
    if distinct.len() != seat_ids.len() || seat_ids.iter().any(|s| !valid.contains(s)) {
        return Err(BookingError::InvalidSeat);
    }

    let locks = seat_locks::active_on_seats(conn, &showtime.id, seat_ids, now.timestamp_millis()).await?;
    match owner {
        Owner::Holder(holder) => {
            if locks.iter().any(|l| l.user_id != holder) {
                return Err(BookingError::SeatsOnHold);
            }
            if !locks.is_empty() {
                return Err(BookingError::DuplicatePendingBooking);
            }
        }
        Owner::Booking(own) => {
            if locks.iter().any(|l| l.booking_id != own) {
                return Err(BookingError::SeatsOnHold);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;

    fn showtime(start_in_minutes: i64, now: DateTime<Utc>) -> Showtime {
        let start_at = now + TimeDelta::minutes(start_in_minutes);
        Showtime {
            id: Uuid::new_v4(),
            movie_id: Uuid::new_v4(),
            hall_id: Uuid::new_v4(),
            start_at,
            end_at: start_at + TimeDelta::minutes(120),
            price: Money::from_minor(2_000),
        }
    }

    #[test]
    fn quantity_bounds() {
        assert!(check_quantity(1).is_ok());
        assert!(check_quantity(MAX_QUANTITY).is_ok());
        assert!(matches!(
            check_quantity(0),
            Err(BookingError::InvalidQuantity { actual: 0, .. })
        ));
        assert!(matches!(
            check_quantity(MAX_QUANTITY + 1),
            Err(BookingError::InvalidQuantity { .. })
        ));
    }

    #[test]
    fn finished_wins_over_started() {
        let now = Utc::now();
        assert!(check_window(&showtime(60, now), now).is_ok());
        assert!(matches!(
            check_window(&showtime(-30, now), now),
            Err(BookingError::AlreadyStarted)
        ));
        assert!(matches!(
            check_window(&showtime(-600, now), now),
            Err(BookingError::AlreadyFinished)
        ));
    }

    #[test]
    fn price_is_frozen_per_quantity() {
        let now = Utc::now();
        let st = showtime(60, now);
        assert_eq!(price_for(&st, 3).unwrap(), Money::from_minor(6_000));
    }

    #[test]
    fn only_live_bookings_are_amendable() {
        let mut b = Booking {
            id: Uuid::new_v4(),
            showtime_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            quantity: 1,
            status: BookingStatus::Pending,
            created_at: Utc::now(),
            final_price: Money::ZERO,
        };
        assert!(ensure_amendable(&b).is_ok());
        b.status = BookingStatus::Confirmed;
        assert!(ensure_amendable(&b).is_ok());
        b.status = BookingStatus::Expired;
        assert!(matches!(
            ensure_amendable(&b),
            Err(BookingError::NotAmendable(BookingStatus::Expired))
        ));
    }
}
