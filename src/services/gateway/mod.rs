pub mod razorpay;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// An order registered with the payment gateway. The customer completes
/// checkout against this id; the gateway's callback references it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount_paise: i64,
    pub currency: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(
        &self,
        amount_paise: i64,
        currency: &str,
        receipt: &str,
        notes: serde_json::Value,
    ) -> anyhow::Result<GatewayOrder>;
}
