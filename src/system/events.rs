//! Driver callbacks as one closed event type
//! The driver pushes these onto a bounded channel; the menu state tracker is
//! the only consumer.

use crate::types::Menu;
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};

/// Menus arrive roughly every 500ms, so a handful of slots is plenty.
pub const DRIVER_EVENT_CAPACITY: usize = 16;

pub type DriverEventChannel = Channel<CriticalSectionRawMutex, DriverEvent, DRIVER_EVENT_CAPACITY>;

#[derive(Debug, Clone)]
pub enum DriverEvent {
    /// Diagnostic chatter from the driver
    Log(String),
    /// Driver-side failure report
    Failure(String),
    BluetoothRequested,
    LinkStarted,
    /// Link went down; the displayed menu is no longer known
    LinkStopped,
    /// The primary event: the pump pushed the menu it is currently showing
    Menu(Menu),
    NoMenu,
    // Raw display frames. Menu parsing happens in the driver, we only log these.
    ClearDisplay,
    UpdateDisplay { quarter: Vec<u8>, which: u8 },
}

impl DriverEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            DriverEvent::Log(_) => "log",
            DriverEvent::Failure(_) => "failure",
            DriverEvent::BluetoothRequested => "bluetooth_requested",
            DriverEvent::LinkStarted => "link_started",
            DriverEvent::LinkStopped => "link_stopped",
            DriverEvent::Menu(_) => "menu",
            DriverEvent::NoMenu => "no_menu",
            DriverEvent::ClearDisplay => "clear_display",
            DriverEvent::UpdateDisplay { .. } => "update_display",
        }
    }
}
