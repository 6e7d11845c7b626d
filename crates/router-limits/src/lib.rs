//! # Router Limits
//!
//! Admission control for the LLM cost router:
//! - [`BudgetManager`]: spend against a per-period limit, with alerts
//! - [`QuotaManager`]: per-provider requests-per-minute and in-flight ceilings

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod alert;
pub mod budget;
pub mod quota;

pub use alert::{
    AlertNotifier, AlertType, BudgetAlert, ChannelAlertNotifier, TracingAlertNotifier,
};
pub use budget::{classify, BudgetManager};
pub use quota::{QuotaManager, QuotaUsage};
