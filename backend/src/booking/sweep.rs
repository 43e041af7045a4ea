//! Expiry sweep.
//!
//! Lapsed holds are reconciled in two steps inside the caller's transaction:
//! PENDING bookings owning a lapsed lock become EXPIRED, then every lapsed
//! lock is deleted. The first statement is a write, which is what makes
//! the enclosing engine transaction take the database write lock before it
//! reads any conflict state.

use chrono::{DateTime, Utc};
use sqlx::AnyConnection;
use tracing::{debug, info};

use super::model::SweepReport;
use super::{ledger, seat_locks};
use crate::error::BookingResult;

pub async fn run(conn: &mut AnyConnection, now: DateTime<Utc>) -> BookingResult<SweepReport> {
    let now_ms = now.timestamp_millis();

    let expired_bookings = ledger::expire_lapsed(conn, now_ms).await?;
    let released_locks = seat_locks::release_expired(conn, now_ms).await?;

    let report = SweepReport {
        expired_bookings,
        released_locks,
    };

    if report.is_empty() {
        debug!("sweep found no lapsed holds");
    } else {
        info!(
            expired_bookings = report.expired_bookings.len(),
            released_locks = report.released_locks,
            "expired holds swept"
        );
        for id in &report.expired_bookings {
            debug!(booking_id = %id, "booking expired");
        }
    }

    Ok(report)
}
