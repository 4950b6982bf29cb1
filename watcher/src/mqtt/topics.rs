//! MQTT topic layout

/// Local broker: zero-payload signal that the cloud connection
/// parameters stored in the control-plane config have changed.
pub const LOCAL_CONFIG_UPDATED: &str = "local/config/cloud_updated";

/// Cloud broker: deployment-availability notifications.
pub const CLOUD_DEPLOYMENT_AVAILABLE: &str = "rv/deployment/available";

/// Cloud broker: outbound deployment status events.
pub const CLOUD_DEPLOYMENT_STATUS: &str = "rv/deployment/status";
