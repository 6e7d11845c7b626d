//! Budget alerts and where they go.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use router_core::OrgId;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Kind of budget alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    /// Spend passed the limit
    BudgetExceeded,
}

impl AlertType {
    /// Alert type name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BudgetExceeded => "budget_exceeded",
        }
    }
}

/// Notification raised when a budget crosses its limit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetAlert {
    /// Budget that triggered the alert
    pub budget_id: Uuid,
    /// Owning organization
    pub org_id: OrgId,
    /// Alert kind
    pub alert_type: AlertType,
    /// Human-readable message
    pub message: String,
    /// Spend as a percentage of the limit
    pub utilization_pct: f64,
    /// Spent in cents
    pub spent_cents: i64,
    /// Limit in cents
    pub limit_cents: i64,
    /// When the alert was raised
    pub timestamp: DateTime<Utc>,
}

/// Alert sink
#[async_trait]
pub trait AlertNotifier: Send + Sync + std::fmt::Debug {
    /// Deliver one alert; failures stay inside the notifier
    async fn notify(&self, alert: BudgetAlert);

    /// Sink name for logs
    fn name(&self) -> &'static str;
}

/// Notifier that logs alerts
#[derive(Debug, Clone, Default)]
pub struct TracingAlertNotifier;

#[async_trait]
impl AlertNotifier for TracingAlertNotifier {
    #[instrument(skip(self, alert), fields(budget_id = %alert.budget_id))]
    async fn notify(&self, alert: BudgetAlert) {
        warn!(
            org_id = %alert.org_id,
            alert_type = alert.alert_type.as_str(),
            utilization_pct = alert.utilization_pct,
            spent_cents = alert.spent_cents,
            limit_cents = alert.limit_cents,
            "{}",
            alert.message
        );
    }

    fn name(&self) -> &'static str {
        "tracing"
    }
}

/// Notifier that forwards alerts to a channel
#[derive(Debug, Clone)]
pub struct ChannelAlertNotifier {
    sender: mpsc::UnboundedSender<BudgetAlert>,
}

impl ChannelAlertNotifier {
    /// Create a notifier and the receiving end of its channel
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<BudgetAlert>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl AlertNotifier for ChannelAlertNotifier {
    async fn notify(&self, alert: BudgetAlert) {
        if self.sender.send(alert).is_err() {
            debug!("Alert receiver dropped");
        }
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}
