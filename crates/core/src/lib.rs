pub mod commands;
pub mod paths;
pub mod response;

pub use commands::{Command, CommandRecord};
pub use paths::*;
pub use response::*;
