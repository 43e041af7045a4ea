//! Row decoding helpers shared by the SQLx stores.
//!
//! The `Any` driver only speaks primitive types, so ids travel as UUID text
//! and instants as epoch milliseconds.

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::any::AnyRow;
use uuid::Uuid;

pub fn uuid_col(r: &AnyRow, col: &str) -> anyhow::Result<Uuid> {
    let raw: String = r.try_get(col)?;
    Uuid::parse_str(&raw).with_context(|| format!("invalid uuid in column {col}: {raw:?}"))
}

pub fn instant_col(r: &AnyRow, col: &str) -> anyhow::Result<DateTime<Utc>> {
    let ms: i64 = r.try_get(col)?;
    ms_to_instant(ms)
}

pub fn ms_to_instant(ms: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms).ok_or_else(|| anyhow!("timestamp out of range: {ms}"))
}

pub fn u32_col(r: &AnyRow, col: &str) -> anyhow::Result<u32> {
    let v: i64 = r.try_get(col)?;
    i64_to_u32(v)
}

/* =========================
Numeric safety helpers
========================= */

pub fn i64_to_u32(v: i64) -> anyhow::Result<u32> {
    if v < 0 || v > u32::MAX as i64 {
        return Err(anyhow!("out of range for u32: {v}"));
    }
    Ok(v as u32)
}

/// `?, ?, ?` for an `IN (...)` clause of `n` binds.
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
