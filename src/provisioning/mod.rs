//! Provisioning status, state machine and host notifications.

mod listener;
mod machine;
mod status;

pub use listener::{ProvisioningEvent, ProvisioningListener};
pub use machine::{ConnectionAttempt, ProvisioningStateMachine};
pub use status::{disconnect_reason, ProvisioningStatus, WifiLinkStatus};
