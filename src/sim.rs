// sim.rs - in-memory pump that behaves like the driver service
// Pushes the displayed menu on a fixed interval while connected, cycles through
// its menus on the menu key and clears a warning on the check key.

use crate::driver::{ConnectStatus, DriverError, DriverEventSender, PumpDriver};
use crate::system::events::DriverEventChannel;
use crate::types::{Key, Menu, MenuAttribute, MenuTime, MenuType, MenuValue};
use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};
use embassy_time::{Duration, Timer};
use log::{debug, info};
use std::cell::RefCell;
use std::sync::Arc;

struct SimState {
    connected: bool,
    cycle: Vec<Menu>,
    position: usize,
    warning: Option<Menu>,
    responsive: bool,
    fail_connect: bool,
    held_key: Option<Key>,
    presses: Vec<Key>,
    connect_calls: u32,
    disconnect_calls: u32,
}

impl SimState {
    fn displayed(&self) -> Menu {
        match self.warning {
            Some(ref warning) => warning.clone(),
            None => self.cycle[self.position].clone(),
        }
    }

    /// Apply a key release, returning the menu to push if the screen changed.
    fn release(&mut self, key: Key) -> Option<Menu> {
        if !self.responsive {
            return None;
        }
        match key {
            Key::Check if self.warning.is_some() => {
                self.warning = None;
                Some(self.displayed())
            }
            Key::Menu if self.warning.is_none() => {
                self.position = (self.position + 1) % self.cycle.len();
                Some(self.displayed())
            }
            _ => None,
        }
    }
}

pub struct SimulatedPump {
    events: DriverEventSender,
    push_interval: Duration,
    inner: Mutex<CriticalSectionRawMutex, RefCell<SimState>>,
}

impl SimulatedPump {
    pub fn new(channel: Arc<DriverEventChannel>, push_interval: Duration) -> Self {
        Self::with_cycle(channel, Self::default_cycle(), push_interval)
    }

    /// `cycle` is the fixed order the menu key walks through, starting at
    /// its first entry. Must not be empty.
    pub fn with_cycle(
        channel: Arc<DriverEventChannel>,
        cycle: Vec<Menu>,
        push_interval: Duration,
    ) -> Self {
        assert!(!cycle.is_empty(), "simulated pump needs at least one menu");
        Self {
            events: DriverEventSender::new(channel),
            push_interval,
            inner: Mutex::new(RefCell::new(SimState {
                connected: false,
                cycle,
                position: 0,
                warning: None,
                responsive: true,
                fail_connect: false,
                held_key: None,
                presses: Vec::new(),
                connect_calls: 0,
                disconnect_calls: 0,
            })),
        }
    }

    pub fn default_cycle() -> Vec<Menu> {
        [
            MenuType::MainMenu,
            MenuType::StopMenu,
            MenuType::BolusMenu,
            MenuType::ExtendedBolusMenu,
            MenuType::MultiwaveBolusMenu,
            MenuType::TbrMenu,
            MenuType::MyDataMenu,
            MenuType::BasalMenu,
            MenuType::TimeMenu,
            MenuType::AlarmMenu,
            MenuType::MenuSettingsMenu,
            MenuType::BluetoothMenu,
            MenuType::TherapyMenu,
            MenuType::PumpMenu,
        ]
        .into_iter()
        .map(Self::menu_for)
        .collect()
    }

    /// Typical screen content for a menu type.
    pub fn menu_for(menu_type: MenuType) -> Menu {
        let menu = Menu::new(menu_type);
        match menu_type {
            MenuType::MainMenu => menu
                .with_attribute(MenuAttribute::Time, MenuValue::Duration(MenuTime::new(12, 0)))
                .with_attribute(MenuAttribute::Tbr, MenuValue::Number(100.0))
                .with_attribute(MenuAttribute::BasalRate, MenuValue::Number(0.75))
                .with_attribute(MenuAttribute::BasalSelected, MenuValue::Number(1.0)),
            MenuType::TbrSet => menu.with_attribute(MenuAttribute::Tbr, MenuValue::Number(100.0)),
            MenuType::TbrDuration => menu.with_attribute(
                MenuAttribute::Runtime,
                MenuValue::Duration(MenuTime::new(0, 15)),
            ),
            _ => menu,
        }
    }

    /// Periodic menu pushes, roughly what the real driver does every 500ms.
    pub async fn run(&self) {
        info!("Simulated pump running, pushing every {}ms", self.push_interval.as_millis());
        loop {
            Timer::after(self.push_interval).await;
            let menu = self.inner.lock(|inner| {
                let inner = inner.borrow();
                (inner.connected && inner.responsive).then(|| inner.displayed())
            });
            if let Some(menu) = menu {
                self.events.on_menu(menu);
            }
        }
    }

    pub fn show_warning(&self, message: &str) {
        let warning = Menu::new(MenuType::WarningOrError)
            .with_attribute(MenuAttribute::Message, MenuValue::Text(message.to_string()));
        self.inner.lock(|inner| inner.borrow_mut().warning = Some(warning));
    }

    /// An unresponsive pump keeps the link but stops pushing and reacting.
    pub fn set_responsive(&self, responsive: bool) {
        self.inner.lock(|inner| inner.borrow_mut().responsive = responsive);
    }

    pub fn set_connect_failure(&self, fail: bool) {
        self.inner.lock(|inner| inner.borrow_mut().fail_connect = fail);
    }

    pub fn key_presses(&self, key: Key) -> usize {
        self.inner
            .lock(|inner| inner.borrow().presses.iter().filter(|k| **k == key).count())
    }

    pub fn connect_calls(&self) -> u32 {
        self.inner.lock(|inner| inner.borrow().connect_calls)
    }

    pub fn disconnect_calls(&self) -> u32 {
        self.inner.lock(|inner| inner.borrow().disconnect_calls)
    }
}

impl PumpDriver for SimulatedPump {
    fn connect(&self) -> Result<ConnectStatus, DriverError> {
        self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            inner.connect_calls += 1;
            if inner.fail_connect {
                return Err(DriverError::ConnectFailed("simulated connect failure".to_string()));
            }
            inner.connected = true;
            Ok(())
        })?;
        self.events.on_log("simulated link up");
        self.events.on_link_started();
        Ok(ConnectStatus::Initiated)
    }

    fn disconnect(&self) -> Result<(), DriverError> {
        self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            inner.connected = false;
            inner.held_key = None;
            inner.disconnect_calls += 1;
        });
        self.events.on_link_stopped();
        Ok(())
    }

    fn send_key(&self, code: u8, _held: bool) -> Result<(), DriverError> {
        let key = Key::from_code(code)
            .ok_or_else(|| DriverError::SendFailed(format!("unknown key code {:#04x}", code)))?;
        let pushed = self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            if !inner.connected {
                return Err(DriverError::NotConnected);
            }
            if key == Key::NoKey {
                Ok(inner.held_key.take().and_then(|held| inner.release(held)))
            } else {
                inner.held_key = Some(key);
                inner.presses.push(key);
                Ok(None)
            }
        })?;
        if let Some(menu) = pushed {
            debug!("Simulated pump now showing {}", menu.menu_type());
            self.events.on_menu(menu);
        }
        Ok(())
    }

    fn is_connected(&self) -> Result<bool, DriverError> {
        Ok(self.inner.lock(|inner| inner.borrow().connected))
    }
}
