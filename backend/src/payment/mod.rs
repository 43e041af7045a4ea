//! Payment capture.
//!
//! The only path from a PENDING hold to a CONFIRMED booking that involves
//! money. A charge is attempted once through the configured gateway; every
//! attempt, successful or not, leaves a row in `payments`.

pub mod gateway;
pub mod model;
pub mod payments_sqlx;
pub mod service;

pub use gateway::{ChargeReceipt, GatewayError, MockGateway, PaymentGateway};
pub use model::{Payment, PaymentStatus};
pub use service::{PaymentOutcome, PaymentService};
