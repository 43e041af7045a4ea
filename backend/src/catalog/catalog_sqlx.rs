use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{AnyPool, Row};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::model::{
    Hall, HallId, Movie, MovieId, Seat, SeatId, Showtime, ShowtimeId, screening_end, seat_grid,
};
use super::{Catalog, CatalogError};
use crate::db::rows::{i64_to_u32, instant_col, placeholders, u32_col, uuid_col};
use crate::money::Money;

/// SQLx-backed catalog sharing the booking database.
#[derive(Clone)]
pub struct SqlxCatalog {
    pool: AnyPool,
}

impl SqlxCatalog {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    pub async fn add_movie(&self, title: &str, duration_minutes: u32) -> Result<Movie, CatalogError> {
        let movie = Movie {
            id: Uuid::new_v4(),
            title: title.to_string(),
            duration_minutes,
        };

        sqlx::query("INSERT INTO movies (movie_id, title, duration_minutes) VALUES (?, ?, ?)")
            .bind(movie.id.to_string())
            .bind(&movie.title)
            .bind(i64::from(duration_minutes))
            .execute(&self.pool)
            .await?;

        Ok(movie)
    }

    /// Create a hall and its full seat grid in one transaction.
    #[instrument(skip(self), target = "catalog")]
    pub async fn create_hall(
        &self,
        name: &str,
        row_count: u32,
        seats_per_row: u32,
    ) -> Result<(Hall, Vec<Seat>), CatalogError> {
        if !(1..=26).contains(&row_count) || !(1..=50).contains(&seats_per_row) {
            return Err(CatalogError::InvalidLayout(format!(
                "{row_count} rows x {seats_per_row} seats"
            )));
        }

        let hall = Hall {
            id: Uuid::new_v4(),
            name: name.to_string(),
            row_count,
            seats_per_row,
        };
        let seats = seat_grid(hall.id, row_count, seats_per_row);

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO halls (hall_id, name, row_count, seats_per_row) VALUES (?, ?, ?, ?)",
        )
        .bind(hall.id.to_string())
        .bind(&hall.name)
        .bind(i64::from(row_count))
        .bind(i64::from(seats_per_row))
        .execute(&mut *tx)
        .await?;

        for seat in &seats {
            sqlx::query(
                r#"
INSERT INTO seats (seat_id, hall_id, row_label, column_number, in_service)
VALUES (?, ?, ?, ?, 1)
"#,
            )
            .bind(seat.id.to_string())
            .bind(hall.id.to_string())
            .bind(seat.row_label.to_string())
            .bind(i64::from(seat.column_number))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(hall_id = %hall.id, seats = seats.len(), "hall created");
        Ok((hall, seats))
    }

    /// Schedule a screening. The end time is derived from the movie runtime
    /// and the hall must be free for the whole window.
    #[instrument(skip(self, price), target = "catalog")]
    pub async fn schedule_showtime(
        &self,
        movie_id: MovieId,
        hall_id: HallId,
        start_at: DateTime<Utc>,
        price: Money,
    ) -> Result<Showtime, CatalogError> {
        if price.is_negative() {
            return Err(CatalogError::InvalidPrice(price.to_string()));
        }

        let duration: i64 = sqlx::query_scalar("SELECT duration_minutes FROM movies WHERE movie_id = ?")
            .bind(movie_id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(CatalogError::MovieNotFound(movie_id))?;

        let end_at = screening_end(start_at, i64_to_u32(duration)?);

        let mut tx = self.pool.begin().await?;

        let hall_exists: Option<String> =
            sqlx::query_scalar("SELECT hall_id FROM halls WHERE hall_id = ?")
                .bind(hall_id.to_string())
                .fetch_optional(&mut *tx)
                .await?;
        if hall_exists.is_none() {
            return Err(CatalogError::HallNotFound(hall_id));
        }

        let hall_busy: Option<String> = sqlx::query_scalar(
            "SELECT showtime_id FROM showtimes WHERE hall_id = ? AND start_at_ms < ? AND end_at_ms > ? LIMIT 1",
        )
        .bind(hall_id.to_string())
        .bind(end_at.timestamp_millis())
        .bind(start_at.timestamp_millis())
        .fetch_optional(&mut *tx)
        .await?;

        if hall_busy.is_some() {
            // Offer every hall with nothing playing in that window.
            let free_halls: Vec<String> = sqlx::query_scalar(
                r#"
SELECT name FROM halls
WHERE hall_id NOT IN (
  SELECT hall_id FROM showtimes WHERE start_at_ms < ? AND end_at_ms > ?
)
ORDER BY name
"#,
            )
            .bind(end_at.timestamp_millis())
            .bind(start_at.timestamp_millis())
            .fetch_all(&mut *tx)
            .await?;

            warn!(%hall_id, free = free_halls.len(), "schedule conflict");
            return Err(CatalogError::ScheduleConflict { free_halls });
        }

        let showtime = Showtime {
            id: Uuid::new_v4(),
            movie_id,
            hall_id,
            start_at,
            end_at,
            price,
        };

        sqlx::query(
            r#"
INSERT INTO showtimes (showtime_id, movie_id, hall_id, start_at_ms, end_at_ms, price_minor)
VALUES (?, ?, ?, ?, ?, ?)
"#,
        )
        .bind(showtime.id.to_string())
        .bind(movie_id.to_string())
        .bind(hall_id.to_string())
        .bind(start_at.timestamp_millis())
        .bind(end_at.timestamp_millis())
        .bind(price.minor_units())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(showtime_id = %showtime.id, %end_at, "showtime scheduled");
        Ok(showtime)
    }

    /// Change the per-seat price. Existing bookings keep their frozen total.
    pub async fn set_price(&self, showtime_id: ShowtimeId, price: Money) -> Result<(), CatalogError> {
        if price.is_negative() {
            return Err(CatalogError::InvalidPrice(price.to_string()));
        }

        let res = sqlx::query("UPDATE showtimes SET price_minor = ? WHERE showtime_id = ?")
            .bind(price.minor_units())
            .bind(showtime_id.to_string())
            .execute(&self.pool)
            .await?;

        if res.rows_affected() == 0 {
            return Err(CatalogError::ShowtimeNotFound(showtime_id));
        }
        Ok(())
    }

    pub async fn set_seat_in_service(&self, seat_id: SeatId, in_service: bool) -> Result<(), CatalogError> {
        let res = sqlx::query("UPDATE seats SET in_service = ? WHERE seat_id = ?")
            .bind(i64::from(in_service))
            .bind(seat_id.to_string())
            .execute(&self.pool)
            .await?;

        if res.rows_affected() == 0 {
            return Err(CatalogError::SeatNotFound(seat_id));
        }

        debug!(%seat_id, in_service, "seat service flag updated");
        Ok(())
    }

    pub async fn seats_of_hall(&self, hall_id: HallId) -> Result<Vec<Seat>, CatalogError> {
        let rows = sqlx::query(
            r#"
SELECT seat_id, hall_id, row_label, column_number, in_service
FROM seats
WHERE hall_id = ?
ORDER BY row_label, column_number
"#,
        )
        .bind(hall_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_seat).collect::<anyhow::Result<Vec<_>>>()?)
    }
}

#[async_trait]
impl Catalog for SqlxCatalog {
    async fn get_showtime(&self, id: &ShowtimeId) -> anyhow::Result<Option<Showtime>> {
        let row = sqlx::query(
            r#"
SELECT showtime_id, movie_id, hall_id, start_at_ms, end_at_ms, price_minor
FROM showtimes
WHERE showtime_id = ?
"#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_showtime).transpose()
    }

    async fn seats_exist(
        &self,
        hall_id: &HallId,
        seat_ids: &[SeatId],
    ) -> anyhow::Result<HashSet<SeatId>> {
        if seat_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let sql = format!(
            "SELECT seat_id FROM seats WHERE hall_id = ? AND in_service = 1 AND seat_id IN ({})",
            placeholders(seat_ids.len())
        );

        let mut query = sqlx::query(&sql).bind(hall_id.to_string());
        for id in seat_ids {
            query = query.bind(id.to_string());
        }

        let rows = query.fetch_all(&self.pool).await?;

        rows.iter().map(|r| uuid_col(r, "seat_id")).collect()
    }
}

/* =========================
Row mapping
========================= */

fn row_to_showtime(r: &sqlx::any::AnyRow) -> anyhow::Result<Showtime> {
    Ok(Showtime {
        id: uuid_col(r, "showtime_id")?,
        movie_id: uuid_col(r, "movie_id")?,
        hall_id: uuid_col(r, "hall_id")?,
        start_at: instant_col(r, "start_at_ms")?,
        end_at: instant_col(r, "end_at_ms")?,
        price: Money::from_minor(r.try_get("price_minor")?),
    })
}

fn row_to_seat(r: &sqlx::any::AnyRow) -> anyhow::Result<Seat> {
    let label: String = r.try_get("row_label")?;
    let row_label = label
        .chars()
        .next()
        .ok_or_else(|| anyhow::anyhow!("empty row label"))?;

    Ok(Seat {
        id: uuid_col(r, "seat_id")?,
        hall_id: uuid_col(r, "hall_id")?,
        row_label,
        column_number: u32_col(r, "column_number")?,
        in_service: r.try_get::<i64, _>("in_service")? == 1,
    })
}
