use std::fmt;

use uuid::Uuid;

/// Correlation ID that follows a request through the engine and payment capture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceId(String);

impl TraceId {
    pub fn new(v: impl Into<String>) -> Self {
        Self(v.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ids_are_unique() {
        assert_ne!(TraceId::default(), TraceId::default());
    }

    #[test]
    fn explicit_id_round_trips() {
        let id = TraceId::new("req-42");
        assert_eq!(id.as_str(), "req-42");
        assert_eq!(id.to_string(), "req-42");
    }
}
