// navigation.rs - key presses and menu navigation on top of the pushed menu stream
// The pump reacts to key presses asynchronously; all we can observe is the next
// menu it pushes, so every wait here is a bounded poll on the shared state.

use crate::cancel::CancelFlag;
use crate::driver::DriverHandle;
use crate::error::ScripterError;
use crate::state::StateManager;
use crate::system::config::ScripterConfig;
use crate::types::{Key, MenuType};
use embassy_time::{Instant, Timer};
use log::{debug, trace};

pub struct MenuNavigator<'a> {
    driver: &'a DriverHandle,
    state: &'a StateManager,
    config: &'a ScripterConfig,
    cancel: &'a CancelFlag,
}

impl<'a> MenuNavigator<'a> {
    pub fn new(
        driver: &'a DriverHandle,
        state: &'a StateManager,
        config: &'a ScripterConfig,
        cancel: &'a CancelFlag,
    ) -> Self {
        Self {
            driver,
            state,
            config,
            cancel,
        }
    }

    pub fn state(&self) -> &'a StateManager {
        self.state
    }

    pub fn cancel_flag(&self) -> &'a CancelFlag {
        self.cancel
    }

    /// Press and release one key. Does not wait for the pump to react.
    pub async fn press_key(&self, key: Key) -> Result<(), ScripterError> {
        self.cancel.checkpoint()?;
        debug!("Pressing {} key", key.name());
        self.driver
            .send_key(key.code(), true)
            .await
            .map_err(|e| ScripterError::connection("Error while pressing buttons", e))?;
        Timer::after(self.config.key_hold()).await;
        self.driver
            .send_key(Key::NoKey.code(), true)
            .await
            .map_err(|e| ScripterError::connection("Error while pressing buttons", e))?;
        debug!("Releasing {} key", key.name());
        Ok(())
    }

    /// Block until the pump pushes another menu. Only the update timestamp
    /// counts; a push with identical content still ends the wait.
    pub async fn wait_for_menu_update(&self) -> Result<(), ScripterError> {
        let deadline = Instant::now() + self.config.menu_update_timeout();
        let initial = self.state.menu_updated_at().await;
        while self.state.menu_updated_at().await == initial {
            self.cancel.checkpoint()?;
            if Instant::now() > deadline {
                return Err(ScripterError::MenuTimeout);
            }
            Timer::after(self.config.menu_update_poll()).await;
        }
        Ok(())
    }

    /// Block until the displayed menu is something other than `menu_type`.
    pub async fn wait_for_menu_to_be_left(&self, menu_type: MenuType) -> Result<(), ScripterError> {
        let deadline = Instant::now() + self.config.menu_leave_timeout();
        while self.state.current_menu_type().await == Some(menu_type) {
            self.cancel.checkpoint()?;
            if Instant::now() > deadline {
                return Err(ScripterError::MenuLeaveTimeout(menu_type));
            }
            Timer::after(self.config.menu_leave_poll()).await;
        }
        Ok(())
    }

    /// Cycle through menus with the menu key until `target` is displayed.
    /// Coming back to the starting menu means the target is not in the cycle,
    /// usually because it was hidden in the pump's menu settings.
    pub async fn navigate_to_menu(&self, target: MenuType) -> Result<(), ScripterError> {
        let started_from = self.displayed_menu_type().await?;
        let mut moved_once = false;
        loop {
            let current = self.displayed_menu_type().await?;
            if current == target {
                return Ok(());
            }
            if moved_once && current == started_from {
                return Err(ScripterError::NavigationNotFound(target));
            }
            trace!("Navigating to {}, currently on {}", target, current);
            self.press_key(Key::Menu).await?;
            self.wait_for_menu_to_be_left(current).await?;
            moved_once = true;
        }
    }

    pub async fn verify_menu_is_displayed(
        &self,
        expected: MenuType,
        failure_message: Option<&str>,
    ) -> Result<(), ScripterError> {
        self.wait_for_menu_update().await?;
        let mut retries = self.config.verify_retries;
        loop {
            let current = self.state.current_menu_type().await;
            if current == Some(expected) {
                return Ok(());
            }
            if retries == 0 {
                let message = match failure_message {
                    Some(message) => message.to_string(),
                    None => format!(
                        "Invalid pump state, expected to be in menu {}, but current menu is {}",
                        expected,
                        current.map_or("none", |menu| menu.as_str())
                    ),
                };
                return Err(ScripterError::VerificationFailed(message));
            }
            self.cancel.checkpoint()?;
            Timer::after(self.config.verify_retry_delay()).await;
            retries -= 1;
        }
    }

    async fn displayed_menu_type(&self) -> Result<MenuType, ScripterError> {
        self.state
            .current_menu_type()
            .await
            .ok_or(ScripterError::NoMenu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::PumpDriver;
    use crate::sim::SimulatedPump;
    use crate::system::events::{DriverEvent, DriverEventChannel};
    use crate::test_support::{fast_config, init_logger, run_with_event_loop, sim_menu};
    use embassy_futures::{block_on, join::join};
    use embassy_time::Duration;
    use std::sync::Arc;

    struct Fixture {
        channel: Arc<DriverEventChannel>,
        pump: Arc<SimulatedPump>,
        driver: DriverHandle,
        state: StateManager,
        config: ScripterConfig,
        cancel: CancelFlag,
    }

    impl Fixture {
        fn new(cycle: &[MenuType]) -> Self {
            init_logger();
            let channel = Arc::new(DriverEventChannel::new());
            let pump = Arc::new(SimulatedPump::with_cycle(
                Arc::clone(&channel),
                cycle.iter().map(|menu_type| sim_menu(*menu_type)).collect(),
                Duration::from_millis(20),
            ));
            Self {
                channel,
                driver: DriverHandle::new(pump.clone()),
                pump,
                state: StateManager::new(),
                config: fast_config(),
                cancel: CancelFlag::new(),
            }
        }

        fn navigator(&self) -> MenuNavigator<'_> {
            MenuNavigator::new(&self.driver, &self.state, &self.config, &self.cancel)
        }

        fn run<F: std::future::Future>(&self, body: F) -> F::Output {
            run_with_event_loop(&self.channel, &self.pump, &self.state, body)
        }
    }

    #[test]
    fn test_navigation_counts_presses() {
        use MenuType::*;
        let fx = Fixture::new(&[StopMenu, BolusMenu, ExtendedBolusMenu, TbrMenu]);
        let navigator = fx.navigator();

        let result = fx.run(async {
            fx.pump.connect().unwrap();
            navigator.wait_for_menu_update().await?;
            navigator.navigate_to_menu(TbrMenu).await
        });

        assert!(result.is_ok());
        assert_eq!(fx.pump.key_presses(Key::Menu), 3);
    }

    #[test]
    fn test_navigation_detects_full_cycle() {
        use MenuType::*;
        let fx = Fixture::new(&[StopMenu, BolusMenu, ExtendedBolusMenu]);
        let navigator = fx.navigator();

        let result = fx.run(async {
            fx.pump.connect().unwrap();
            navigator.wait_for_menu_update().await?;
            navigator.navigate_to_menu(TbrMenu).await
        });

        assert!(matches!(result, Err(ScripterError::NavigationNotFound(TbrMenu))));
        assert_eq!(fx.pump.key_presses(Key::Menu), 3);
    }

    #[test]
    fn test_navigation_already_on_target() {
        use MenuType::*;
        let fx = Fixture::new(&[MainMenu, StopMenu]);
        let navigator = fx.navigator();

        let result = fx.run(async {
            fx.pump.connect().unwrap();
            navigator.wait_for_menu_update().await?;
            navigator.navigate_to_menu(MainMenu).await
        });

        assert!(result.is_ok());
        assert_eq!(fx.pump.key_presses(Key::Menu), 0);
    }

    #[test]
    fn test_navigation_gives_up_when_menu_does_not_change() {
        use MenuType::*;
        let fx = Fixture::new(&[MainMenu, StopMenu, TbrMenu]);
        let navigator = fx.navigator();

        let result = fx.run(async {
            fx.pump.connect().unwrap();
            navigator.wait_for_menu_update().await?;
            fx.pump.set_responsive(false);
            navigator.navigate_to_menu(TbrMenu).await
        });

        assert!(matches!(result, Err(ScripterError::MenuLeaveTimeout(MainMenu))));
        assert_eq!(fx.pump.key_presses(Key::Menu), 1);
    }

    #[test]
    fn test_navigation_without_menu() {
        let fx = Fixture::new(&[MenuType::MainMenu]);

        let result = block_on(fx.navigator().navigate_to_menu(MenuType::TbrMenu));
        assert!(matches!(result, Err(ScripterError::NoMenu)));
    }

    #[test]
    fn test_wait_for_update_times_out_without_pushes() {
        let fx = Fixture::new(&[MenuType::MainMenu]);

        let result = block_on(fx.navigator().wait_for_menu_update());
        assert!(matches!(result, Err(ScripterError::MenuTimeout)));
    }

    #[test]
    fn test_wait_for_update_returns_on_identical_push() {
        let fx = Fixture::new(&[MenuType::MainMenu]);
        let navigator = fx.navigator();
        let menu = sim_menu(MenuType::MainMenu);

        block_on(async {
            fx.state.apply_event(DriverEvent::Menu(menu.clone())).await;
            let (waited, _) = join(navigator.wait_for_menu_update(), async {
                Timer::after(Duration::from_millis(30)).await;
                fx.state.apply_event(DriverEvent::Menu(menu)).await;
            })
            .await;
            assert!(waited.is_ok());
        });
    }

    #[test]
    fn test_wait_for_update_honours_cancel() {
        let fx = Fixture::new(&[MenuType::MainMenu]);
        fx.cancel.cancel();

        let result = block_on(fx.navigator().wait_for_menu_update());
        assert!(matches!(result, Err(ScripterError::Cancelled)));
    }

    #[test]
    fn test_verify_menu_uses_custom_message() {
        use MenuType::*;
        let fx = Fixture::new(&[MainMenu, StopMenu]);
        let navigator = fx.navigator();

        let result = fx.run(async {
            fx.pump.connect().unwrap();
            navigator.wait_for_menu_update().await?;
            navigator.verify_menu_is_displayed(MainMenu, None).await?;
            navigator
                .verify_menu_is_displayed(TbrSet, Some("Not in TBR set menu"))
                .await
        });

        match result {
            Err(ScripterError::VerificationFailed(message)) => {
                assert_eq!(message, "Not in TBR set menu")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_verify_menu_default_message() {
        use MenuType::*;
        let fx = Fixture::new(&[MainMenu]);
        let navigator = fx.navigator();

        let result = fx.run(async {
            fx.pump.connect().unwrap();
            navigator.verify_menu_is_displayed(TbrMenu, None).await
        });

        let message = result.unwrap_err().to_string();
        assert!(message.contains("expected to be in menu TBR_MENU"));
        assert!(message.contains("current menu is MAIN_MENU"));
    }

    #[test]
    fn test_press_key_fails_when_link_down() {
        let fx = Fixture::new(&[MenuType::MainMenu]);

        let result = block_on(fx.navigator().press_key(Key::Up));
        assert!(matches!(result, Err(ScripterError::Connection { .. })));
    }
}
