// driver.rs - contract with the Bluetooth remote-terminal driver service
// The driver owns the radio link. We call into it synchronously and it reports
// back through `DriverEvent`s on the event channel.

use crate::system::events::{DriverEvent, DriverEventChannel};
use crate::types::Menu;
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, signal::Signal};
use log::warn;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

#[derive(Debug, Clone, PartialEq)]
pub enum DriverError {
    ConnectFailed(String),
    SendFailed(String),
    NotConnected,
    Transport(String),
}

impl std::fmt::Display for DriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DriverError::ConnectFailed(msg) => write!(f, "Connect failed: {}", msg),
            DriverError::SendFailed(msg) => write!(f, "Send failed: {}", msg),
            DriverError::NotConnected => write!(f, "Not connected to pump"),
            DriverError::Transport(msg) => write!(f, "Transport error: {}", msg),
        }
    }
}

impl std::error::Error for DriverError {}

/// Result of asking the driver to bring the link up. Only `Err` from
/// `connect` is fatal; a rejected status is logged and we still wait for the
/// first menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStatus {
    Initiated,
    Rejected(i32),
}

impl ConnectStatus {
    pub fn from_code(code: i32) -> Self {
        if code == 0 {
            ConnectStatus::Initiated
        } else {
            ConnectStatus::Rejected(code)
        }
    }

    pub fn is_initiated(&self) -> bool {
        matches!(self, ConnectStatus::Initiated)
    }
}

/// Synchronous half of the driver service.
pub trait PumpDriver: Send + Sync {
    fn connect(&self) -> Result<ConnectStatus, DriverError>;

    fn disconnect(&self) -> Result<(), DriverError>;

    /// `held` mirrors the driver API; the scripter always sends `true` and
    /// releases by sending `Key::NoKey`.
    fn send_key(&self, code: u8, held: bool) -> Result<(), DriverError>;

    fn is_connected(&self) -> Result<bool, DriverError>;
}

/// Async view of a `PumpDriver`. Every call runs on its own thread, so a
/// driver stuck in the radio stack never stalls the executor, the watchdog
/// or the event loop. A caller that gives up just drops the future; the
/// thread finishes on its own and its result is discarded.
#[derive(Clone)]
pub struct DriverHandle {
    driver: Arc<dyn PumpDriver>,
}

impl DriverHandle {
    pub fn new(driver: Arc<dyn PumpDriver>) -> Self {
        Self { driver }
    }

    pub async fn connect(&self) -> Result<ConnectStatus, DriverError> {
        let driver = Arc::clone(&self.driver);
        offload("connect", move || driver.connect()).await
    }

    pub async fn disconnect(&self) -> Result<(), DriverError> {
        let driver = Arc::clone(&self.driver);
        offload("disconnect", move || driver.disconnect()).await
    }

    pub async fn send_key(&self, code: u8, held: bool) -> Result<(), DriverError> {
        let driver = Arc::clone(&self.driver);
        offload("send_key", move || driver.send_key(code, held)).await
    }

    pub async fn is_connected(&self) -> Result<bool, DriverError> {
        let driver = Arc::clone(&self.driver);
        offload("is_connected", move || driver.is_connected()).await
    }
}

async fn offload<T, F>(call_name: &'static str, call: F) -> Result<T, DriverError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, DriverError> + Send + 'static,
{
    let done = Arc::new(Signal::<CriticalSectionRawMutex, Result<T, DriverError>>::new());
    let reply = Arc::clone(&done);
    thread::Builder::new()
        .name(format!("pump-driver-{}", call_name))
        .spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|_| {
                Err(DriverError::Transport(format!("driver panicked in {}", call_name)))
            });
            reply.signal(result);
        })
        .map_err(|e| DriverError::Transport(format!("cannot start {} call: {}", call_name, e)))?;
    done.wait().await
}

/// Handle a driver implementation uses to deliver its callbacks. Each
/// callback becomes one `DriverEvent` on the channel.
#[derive(Clone)]
pub struct DriverEventSender {
    channel: Arc<DriverEventChannel>,
}

impl DriverEventSender {
    pub fn new(channel: Arc<DriverEventChannel>) -> Self {
        Self { channel }
    }

    pub fn send(&self, event: DriverEvent) {
        if let Err(_) = self.channel.try_send(event) {
            warn!("Failed to deliver driver event - channel full");
        }
    }

    pub fn on_log(&self, message: impl Into<String>) {
        self.send(DriverEvent::Log(message.into()));
    }

    pub fn on_failure(&self, message: impl Into<String>) {
        self.send(DriverEvent::Failure(message.into()));
    }

    pub fn on_bluetooth_request(&self) {
        self.send(DriverEvent::BluetoothRequested);
    }

    pub fn on_link_started(&self) {
        self.send(DriverEvent::LinkStarted);
    }

    pub fn on_link_stopped(&self) {
        self.send(DriverEvent::LinkStopped);
    }

    pub fn on_menu(&self, menu: Menu) {
        self.send(DriverEvent::Menu(menu));
    }

    pub fn on_no_menu(&self) {
        self.send(DriverEvent::NoMenu);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::events::DRIVER_EVENT_CAPACITY;
    use crate::types::MenuType;

    #[test]
    fn test_connect_status_codes() {
        assert_eq!(ConnectStatus::from_code(0), ConnectStatus::Initiated);
        assert_eq!(ConnectStatus::from_code(-3), ConnectStatus::Rejected(-3));
        assert!(!ConnectStatus::from_code(1).is_initiated());
    }

    #[test]
    fn test_callbacks_arrive_in_order() {
        let channel = Arc::new(DriverEventChannel::new());
        let sender = DriverEventSender::new(Arc::clone(&channel));

        sender.on_bluetooth_request();
        sender.on_link_started();
        sender.on_menu(Menu::new(MenuType::MainMenu));
        sender.on_no_menu();
        sender.on_failure("checksum mismatch");

        let kinds: Vec<&str> = std::iter::from_fn(|| channel.try_receive().ok())
            .map(|event| event.kind())
            .collect();
        assert_eq!(
            kinds,
            vec!["bluetooth_requested", "link_started", "menu", "no_menu", "failure"]
        );
    }

    #[test]
    fn test_full_channel_drops_events() {
        let channel = Arc::new(DriverEventChannel::new());
        let sender = DriverEventSender::new(Arc::clone(&channel));

        for i in 0..DRIVER_EVENT_CAPACITY + 4 {
            sender.on_log(format!("line {}", i));
        }
        assert_eq!(channel.len(), DRIVER_EVENT_CAPACITY);
    }
}
