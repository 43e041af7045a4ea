use sqlx::AnyPool;

const STATEMENTS: &[&str] = &[
    // Catalog (read-only from the reservation core's point of view)
    r#"
CREATE TABLE IF NOT EXISTS movies (
  movie_id TEXT PRIMARY KEY,
  title TEXT NOT NULL,
  duration_minutes BIGINT NOT NULL CHECK (duration_minutes BETWEEN 1 AND 240)
);
"#,
    r#"
CREATE TABLE IF NOT EXISTS halls (
  hall_id TEXT PRIMARY KEY,
  name TEXT NOT NULL UNIQUE,
  row_count BIGINT NOT NULL CHECK (row_count BETWEEN 1 AND 26),
  seats_per_row BIGINT NOT NULL CHECK (seats_per_row BETWEEN 1 AND 50)
);
"#,
    r#"
CREATE TABLE IF NOT EXISTS seats (
  seat_id TEXT PRIMARY KEY,
  hall_id TEXT NOT NULL,
  row_label TEXT NOT NULL,
  column_number BIGINT NOT NULL,
  in_service BIGINT NOT NULL DEFAULT 1 CHECK (in_service IN (0,1)),
  UNIQUE (hall_id, row_label, column_number)
);
"#,
    r#"
CREATE TABLE IF NOT EXISTS showtimes (
  showtime_id TEXT PRIMARY KEY,
  movie_id TEXT NOT NULL,
  hall_id TEXT NOT NULL,
  start_at_ms BIGINT NOT NULL,
  end_at_ms BIGINT NOT NULL,
  price_minor BIGINT NOT NULL CHECK (price_minor >= 0)
);
"#,
    // Reservation core
    r#"
CREATE TABLE IF NOT EXISTS bookings (
  booking_id TEXT PRIMARY KEY,
  showtime_id TEXT NOT NULL,
  user_id TEXT NOT NULL,
  quantity BIGINT NOT NULL CHECK (quantity BETWEEN 1 AND 10),
  status TEXT NOT NULL,
  created_at_ms BIGINT NOT NULL,
  final_price_minor BIGINT NOT NULL
);
"#,
    // At most one lock row per seat and showtime. Expired rows are swept in
    // the same transaction before new ones are inserted.
    r#"
CREATE TABLE IF NOT EXISTS seat_locks (
  lock_id TEXT PRIMARY KEY,
  booking_id TEXT NOT NULL,
  showtime_id TEXT NOT NULL,
  seat_id TEXT NOT NULL,
  user_id TEXT NOT NULL,
  locked_at_ms BIGINT NOT NULL,
  expires_at_ms BIGINT NOT NULL,
  UNIQUE (showtime_id, seat_id)
);
"#,
    r#"
CREATE TABLE IF NOT EXISTS tickets (
  ticket_id TEXT PRIMARY KEY,
  booking_id TEXT NOT NULL,
  showtime_id TEXT NOT NULL,
  seat_id TEXT NOT NULL,
  UNIQUE (showtime_id, seat_id)
);
"#,
    r#"
CREATE TABLE IF NOT EXISTS payments (
  payment_id TEXT PRIMARY KEY,
  booking_id TEXT NOT NULL,
  external_ref TEXT,
  amount_minor BIGINT NOT NULL,
  status TEXT NOT NULL,
  created_at_ms BIGINT NOT NULL
);
"#,
    r#"
CREATE TABLE IF NOT EXISTS booking_amendments (
  amendment_id TEXT PRIMARY KEY,
  booking_id TEXT NOT NULL,
  amended_by TEXT NOT NULL,
  amended_at_ms BIGINT NOT NULL,
  seat_ids_json TEXT NOT NULL
);
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_showtimes_hall ON showtimes(hall_id);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_bookings_user ON bookings(user_id);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_seat_locks_expiry ON seat_locks(expires_at_ms);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_seat_locks_booking ON seat_locks(booking_id);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_tickets_booking ON tickets(booking_id);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_payments_booking ON payments(booking_id);"#,
    // At most one capture in flight or captured per booking.
    r#"CREATE UNIQUE INDEX IF NOT EXISTS uq_payments_live ON payments(booking_id) WHERE status IN ('PROCESSING', 'SUCCESS');"#,
];

/// Idempotent schema bootstrap; safe to run on every start.
pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    for stmt in STATEMENTS {
        sqlx::query(stmt).execute(pool).await?;
    }

    tracing::debug!(statements = STATEMENTS.len(), "schema migrated");
    Ok(())
}
