mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Duration;
use tokio::task::JoinSet;
use uuid::Uuid;

use cinema_backend::booking::BookingStatus;
use cinema_backend::error::BookingError;
use cinema_backend::money::Money;
use cinema_backend::payment::{
    ChargeReceipt, GatewayError, MockGateway, PaymentGateway, PaymentService, PaymentStatus,
};

use support::Fixture;

fn service(fx: &Fixture, gateway: Arc<MockGateway>) -> PaymentService {
    PaymentService::new(fx.pool.clone(), fx.engine.clone(), gateway)
}

/// Approves every charge after a pause, so overlapping captures really overlap.
#[derive(Default)]
struct SlowGateway {
    calls: AtomicUsize,
}

#[async_trait]
impl PaymentGateway for SlowGateway {
    async fn charge(&self, _amount: Money, _token: &str) -> Result<ChargeReceipt, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        Ok(ChargeReceipt {
            external_ref: format!("slow_{}", Uuid::new_v4().simple()),
        })
    }
}

#[tokio::test]
async fn successful_charge_confirms_booking() {
    let fx = Fixture::new().await;
    let gateway = Arc::new(MockGateway::approving());
    let payments = service(&fx, gateway.clone());
    let alice = Uuid::new_v4();

    let booking = fx
        .engine
        .request_booking(fx.hold(alice, &["A1", "A2"]))
        .await
        .unwrap();

    let outcome = payments.process_payment(booking.id, "tok_visa").await.unwrap();

    assert_eq!(outcome.booking.status, BookingStatus::Confirmed);
    assert_eq!(outcome.payment.status, PaymentStatus::Success);
    assert_eq!(outcome.payment.amount, Money::from_minor(2_000));
    assert!(outcome.payment.external_ref.is_some());

    assert_eq!(
        gateway.charges(),
        vec![(Money::from_minor(2_000), "tok_visa".to_string())]
    );
    assert_eq!(fx.tickets_of(booking.id).await, 2);
    assert_eq!(fx.locks_of(booking.id).await, 0);

    let history = payments.successful_payments_for_holder(alice).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, outcome.payment.id);
}

#[tokio::test]
async fn declined_charge_keeps_hold_for_retry() {
    let fx = Fixture::new().await;
    let declining = service(&fx, Arc::new(MockGateway::declining("insufficient funds")));
    let alice = Uuid::new_v4();

    let booking = fx
        .engine
        .request_booking(fx.hold(alice, &["B1"]))
        .await
        .unwrap();

    let err = declining
        .process_payment(booking.id, "tok_broke")
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::PaymentFailed(_)));
    assert_eq!(
        err.to_string(),
        "payment failed: card declined: insufficient funds"
    );

    let reread = fx.engine.booking(booking.id).await.unwrap();
    assert_eq!(reread.status, BookingStatus::Pending);
    assert_eq!(fx.locks_of(booking.id).await, 1);

    let recorded = declining.payments_for_booking(booking.id).await.unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].status, PaymentStatus::Failed);
    assert_eq!(recorded[0].external_ref, None);
    assert!(
        declining
            .successful_payments_for_holder(alice)
            .await
            .unwrap()
            .is_empty()
    );

    // Retry within the hold window with a working card.
    let approving = service(&fx, Arc::new(MockGateway::approving()));
    let outcome = approving.process_payment(booking.id, "tok_visa").await.unwrap();
    assert_eq!(outcome.booking.status, BookingStatus::Confirmed);
    assert_eq!(approving.payments_for_booking(booking.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn only_live_holds_are_charged() {
    let fx = Fixture::new().await;
    let gateway = Arc::new(MockGateway::approving());
    let payments = service(&fx, gateway.clone());

    let err = payments
        .process_payment(Uuid::new_v4(), "tok")
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::BookingNotFound(_)));

    let lapsed = fx
        .engine
        .request_booking(fx.hold(Uuid::new_v4(), &["C1"]))
        .await
        .unwrap();
    fx.clock.advance(Duration::minutes(10));

    let err = payments.process_payment(lapsed.id, "tok").await.unwrap_err();
    assert!(matches!(err, BookingError::NoLockedSeats));

    fx.engine.sweep_expired().await.unwrap();
    let err = payments.process_payment(lapsed.id, "tok").await.unwrap_err();
    assert!(matches!(err, BookingError::NotPayable(BookingStatus::Expired)));

    assert!(gateway.charges().is_empty());
    assert!(payments.payments_for_booking(lapsed.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_payments_charge_a_booking_once() {
    let fx = Fixture::new().await;
    let gateway = Arc::new(SlowGateway::default());
    let payments = Arc::new(PaymentService::new(
        fx.pool.clone(),
        fx.engine.clone(),
        gateway.clone(),
    ));

    let booking = fx
        .engine
        .request_booking(fx.hold(Uuid::new_v4(), &["A3"]))
        .await
        .unwrap();

    let mut set = JoinSet::new();
    for _ in 0..2 {
        let payments = Arc::clone(&payments);
        set.spawn(async move { payments.process_payment(booking.id, "tok_visa").await });
    }

    let mut captured = 0;
    let mut refused = 0;
    while let Some(res) = set.join_next().await {
        match res.expect("Task panicked") {
            Ok(outcome) => {
                assert_eq!(outcome.booking.status, BookingStatus::Confirmed);
                captured += 1;
            }
            Err(BookingError::PaymentInProgress)
            | Err(BookingError::NotPayable(BookingStatus::Confirmed)) => refused += 1,
            Err(e) => panic!("second capture must be refused, got: {e}"),
        }
    }
    assert_eq!(captured, 1);
    assert_eq!(refused, 1);
    assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);

    let recorded = payments.payments_for_booking(booking.id).await.unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].status, PaymentStatus::Success);
    assert_eq!(fx.tickets_of(booking.id).await, 1);
}

#[tokio::test]
async fn in_flight_attempt_blocks_a_second_capture() {
    let fx = Fixture::new().await;
    let gateway = Arc::new(MockGateway::approving());
    let payments = service(&fx, gateway.clone());

    let booking = fx
        .engine
        .request_booking(fx.hold(Uuid::new_v4(), &["A4"]))
        .await
        .unwrap();

    // An attempt that never settled, as after a crash mid-charge.
    sqlx::query(
        "INSERT INTO payments (payment_id, booking_id, external_ref, amount_minor, status, created_at_ms) \
         VALUES (?, ?, NULL, 1000, 'PROCESSING', 0)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(booking.id.to_string())
    .execute(&fx.pool)
    .await
    .unwrap();

    let err = payments.process_payment(booking.id, "tok_visa").await.unwrap_err();
    assert!(matches!(err, BookingError::PaymentInProgress));
    assert!(err.is_rejection());
    assert!(gateway.charges().is_empty());

    let reread = fx.engine.booking(booking.id).await.unwrap();
    assert_eq!(reread.status, BookingStatus::Pending);
}
