#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use sqlx::AnyPool;
use uuid::Uuid;

use cinema_backend::booking::{BookingRequest, HoldRequest, ReservationEngine, UserId};
use cinema_backend::catalog::catalog_sqlx::SqlxCatalog;
use cinema_backend::catalog::model::{Hall, Seat, SeatId, Showtime};
use cinema_backend::db::Db;
use cinema_backend::money::Money;
use common::clock::ManualClock;

pub const HOLD: Duration = Duration::from_secs(10 * 60);

/// Isolated, uniquely named in-memory SQLite database with the schema applied.
/// Shared cache lets every pooled connection see the same data.
pub async fn setup_db() -> AnyPool {
    let db_name = Uuid::new_v4().to_string();
    let conn_str = format!("sqlite:file:{}?mode=memory&cache=shared", db_name);

    let db = Db::connect(&conn_str, 5).await.unwrap();
    db.migrate().await.unwrap();
    db.pool
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 1, 10, 0, 0).unwrap()
}

pub struct Fixture {
    pub pool: AnyPool,
    pub clock: Arc<ManualClock>,
    pub catalog: Arc<SqlxCatalog>,
    pub engine: Arc<ReservationEngine>,
    pub hall: Hall,
    pub seats: Vec<Seat>,
    /// Starts one day after `t0()`, 10.00 per seat.
    pub showtime: Showtime,
}

impl Fixture {
    pub async fn new() -> Self {
        let pool = setup_db().await;
        let clock = Arc::new(ManualClock::new(t0()));
        let catalog = Arc::new(SqlxCatalog::new(pool.clone()));

        let movie = catalog.add_movie("Arrival", 116).await.unwrap();
        let (hall, seats) = catalog.create_hall("Hall 1", 3, 4).await.unwrap();
        let showtime = catalog
            .schedule_showtime(
                movie.id,
                hall.id,
                t0() + chrono::Duration::days(1),
                Money::from_minor(1_000),
            )
            .await
            .unwrap();

        let engine = Arc::new(ReservationEngine::new(
            pool.clone(),
            catalog.clone(),
            clock.clone(),
            HOLD,
        ));

        Self {
            pool,
            clock,
            catalog,
            engine,
            hall,
            seats,
            showtime,
        }
    }

    /// Seat by label, e.g. `seat("A1")`.
    pub fn seat(&self, label: &str) -> SeatId {
        self.seats
            .iter()
            .find(|s| s.to_string().replace('-', "") == label)
            .map(|s| s.id)
            .unwrap_or_else(|| panic!("no seat {label}"))
    }

    pub fn hold(&self, holder: UserId, labels: &[&str]) -> BookingRequest {
        BookingRequest::Hold(HoldRequest {
            holder,
            showtime_id: self.showtime.id,
            quantity: labels.len() as u32,
            seat_ids: labels.iter().map(|l| self.seat(l)).collect(),
        })
    }

    pub async fn count(&self, sql: &str, id: Uuid) -> i64 {
        sqlx::query_scalar(sql)
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }

    pub async fn locks_of(&self, booking_id: Uuid) -> i64 {
        self.count("SELECT COUNT(*) FROM seat_locks WHERE booking_id = ?", booking_id)
            .await
    }

    pub async fn tickets_of(&self, booking_id: Uuid) -> i64 {
        self.count("SELECT COUNT(*) FROM tickets WHERE booking_id = ?", booking_id)
            .await
    }
}
