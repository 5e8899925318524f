pub mod cancel;
pub mod commands;
pub mod connection;
pub mod context;
pub mod driver;
pub mod error;
pub mod navigation;
pub mod phase;
pub mod pump_state;
pub mod scripter;
pub mod sim;
pub mod state;
pub mod system;
pub mod types;

#[cfg(test)]
mod test_support;

pub use commands::{Command, CommandFuture, ReadPumpStateCommand};
pub use driver::{ConnectStatus, DriverError, DriverEventSender, PumpDriver};
pub use error::ScripterError;
pub use scripter::PumpScripter;
pub use types::*;
