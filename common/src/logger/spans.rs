use std::time::Duration;

use tracing::{Span, field};

use super::TraceId;

/// Root span for one inbound request (booking, payment, cancellation).
pub fn root_span(name: &'static str, trace_id: &TraceId) -> Span {
    tracing::info_span!(
        "root",
        name = %name,
        trace_id = %trace_id.as_str(),
        showtime_id = field::Empty,
        booking_id = field::Empty
    )
}

/// Record booking identity on the current span once it is known.
pub fn annotate_booking(showtime_id: &uuid::Uuid, booking_id: Option<&uuid::Uuid>) {
    let span = Span::current();
    span.record("showtime_id", field::display(showtime_id));
    if let Some(bid) = booking_id {
        span.record("booking_id", field::display(bid));
    }
}

pub async fn warn_if_slow<F, T>(label: &'static str, max: Duration, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let start = std::time::Instant::now();
    let out = fut.await;
    let elapsed = start.elapsed();
    if elapsed > max {
        tracing::warn!(
            target: "performance",
            label = label,
            elapsed_ms = elapsed.as_millis() as u64,
            "slow operation detected"
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn warn_if_slow_returns_inner_value() {
        let out = warn_if_slow("noop", Duration::from_secs(5), async { 7 }).await;
        assert_eq!(out, 7);
    }
}
