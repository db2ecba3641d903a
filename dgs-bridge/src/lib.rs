pub mod acquisition;
pub mod config;
pub mod forward;
pub mod link;
pub mod logbook;

pub use acquisition::{Acquisition, SessionEnd, SessionState, SessionSummary};
pub use config::{BackendConfig, Config, LogConfig, SerialConfig};
pub use forward::{ForwardError, Forwarder, HttpForwarder};
pub use link::mock::MockConnector;
pub use link::serial::SerialConnector;
pub use link::{Command, Connector, LinkError, LinkManager, LinkState, Transport};
pub use logbook::{BoundedLog, LogOutcome};
