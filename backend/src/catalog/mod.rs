//! Showtime and seat catalog.
//!
//! The reservation core only reads from here: it resolves a showtime's window
//! and price, and asks which requested seat ids are real, in-service seats of
//! the showtime's hall. Scheduling helpers live alongside for the admin side.

pub mod catalog_sqlx;
pub mod model;

use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;

use model::{HallId, SeatId, Showtime, ShowtimeId};

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn get_showtime(&self, id: &ShowtimeId) -> anyhow::Result<Option<Showtime>>;

    /// Subset of `seat_ids` that belong to `hall_id` and are in service.
    async fn seats_exist(
        &self,
        hall_id: &HallId,
        seat_ids: &[SeatId],
    ) -> anyhow::Result<HashSet<SeatId>>;
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("movie {0} not found")]
    MovieNotFound(uuid::Uuid),

    #[error("hall {0} not found")]
    HallNotFound(uuid::Uuid),

    #[error("showtime {0} not found")]
    ShowtimeNotFound(uuid::Uuid),

    #[error("seat {0} not found")]
    SeatNotFound(uuid::Uuid),

    #[error("invalid hall layout: {0}")]
    InvalidLayout(String),

    #[error("invalid price: {0}")]
    InvalidPrice(String),

    /// The hall is busy in that window. Lists halls free at that time.
    #[error("{}", schedule_conflict_message(.free_halls))]
    ScheduleConflict { free_halls: Vec<String> },

    #[error("storage failure: {0}")]
    Store(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

fn schedule_conflict_message(free_halls: &[String]) -> String {
    if free_halls.is_empty() {
        "all halls are busy at this time".to_string()
    } else {
        format!(
            "this hall is busy; available halls at this time: {}",
            free_halls.join(", ")
        )
    }
}
