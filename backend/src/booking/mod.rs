pub mod engine;
pub mod ledger;
pub mod model;
pub mod seat_locks;
pub mod sweep;
pub mod tickets;

pub use engine::{Amendment, BookingRequest, HoldRequest, ReservationEngine};
pub use model::{Booking, BookingId, BookingStatus, SeatLock, SweepReport, Ticket, UserId};
