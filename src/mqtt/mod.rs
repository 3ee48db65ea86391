//! Broker session implementations behind the [`crate::publish::BrokerLink`]
//! seam. The real rust-mqtt/embassy-net session is feature-gated so the core
//! builds and tests on the host.

pub mod session;

pub use session::LoggerBroker;

#[cfg(feature = "mqtt")]
pub use session::{EmbassyNetTransport, MqttSession, MqttSessionConfig};
