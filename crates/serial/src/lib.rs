pub mod config;
pub mod link;
pub mod probe;

pub use config::{ReadPolicy, SerialConfig};
pub use link::{DeviceLink, LinkError, SerialLink};
pub use probe::{describe_port, find_port, matches_descriptor};
