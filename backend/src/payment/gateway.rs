use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use uuid::Uuid;

use crate::money::Money;

/// External reference handed back by the processor for a captured charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeReceipt {
    pub external_ref: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("card declined: {0}")]
    Declined(String),

    #[error("payment processor unavailable: {0}")]
    Unavailable(String),
}

/// Abstraction over the card processor.
///
/// Implementations make exactly one capture attempt per call and never retry.
#[async_trait]
pub trait PaymentGateway: Send + Sync + 'static {
    async fn charge(&self, amount: Money, token: &str) -> Result<ChargeReceipt, GatewayError>;
}

/// In-process gateway for development and tests.
#[derive(Debug, Default)]
pub struct MockGateway {
    decline_with: Option<String>,
    charges: Mutex<Vec<(Money, String)>>,
}

impl MockGateway {
    pub fn approving() -> Self {
        Self::default()
    }

    pub fn declining(reason: impl Into<String>) -> Self {
        Self {
            decline_with: Some(reason.into()),
            charges: Mutex::new(Vec::new()),
        }
    }

    /// Every (amount, token) this gateway was asked to charge.
    pub fn charges(&self) -> Vec<(Money, String)> {
        self.charges.lock().clone()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn charge(&self, amount: Money, token: &str) -> Result<ChargeReceipt, GatewayError> {
        self.charges.lock().push((amount, token.to_string()));

        match &self.decline_with {
            Some(reason) => Err(GatewayError::Declined(reason.clone())),
            None => Ok(ChargeReceipt {
                external_ref: format!("mock_{}", Uuid::new_v4().simple()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn approving_gateway_records_charge() {
        let gw = MockGateway::approving();
        let receipt = gw.charge(Money::from_minor(4_000), "tok_visa").await.unwrap();

        assert!(receipt.external_ref.starts_with("mock_"));
        assert_eq!(gw.charges(), vec![(Money::from_minor(4_000), "tok_visa".to_string())]);
    }

    #[tokio::test]
    async fn declining_gateway_reports_reason() {
        let gw = MockGateway::declining("insufficient funds");
        let err = gw.charge(Money::from_minor(100), "tok").await.unwrap_err();

        assert_eq!(err, GatewayError::Declined("insufficient funds".into()));
        assert_eq!(err.to_string(), "card declined: insufficient funds");
        assert_eq!(gw.charges().len(), 1);
    }
}
