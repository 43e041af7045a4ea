mod init;
mod spans;
mod trace_id;

pub use init::init_logger;
pub use spans::{annotate_booking, root_span, warn_if_slow};
pub use trace_id::TraceId;
