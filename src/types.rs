use crate::error::ScripterError;
use heapless::FnvIndexMap;
use log::warn;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Screens the pump can display. The order of the main menu cycle is fixed by
/// the device; `WarningOrError` can appear on top of any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MenuType {
    MainMenu,
    StopMenu,
    BolusMenu,
    BolusEnter,
    ExtendedBolusMenu,
    MultiwaveBolusMenu,
    TbrMenu,
    TbrSet,
    TbrDuration,
    MyDataMenu,
    BasalMenu,
    TimeMenu,
    AlarmMenu,
    MenuSettingsMenu,
    BluetoothMenu,
    TherapyMenu,
    PumpMenu,
    WarningOrError,
}

impl MenuType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MenuType::MainMenu => "MAIN_MENU",
            MenuType::StopMenu => "STOP_MENU",
            MenuType::BolusMenu => "BOLUS_MENU",
            MenuType::BolusEnter => "BOLUS_ENTER",
            MenuType::ExtendedBolusMenu => "EXTENDED_BOLUS_MENU",
            MenuType::MultiwaveBolusMenu => "MULTIWAVE_BOLUS_MENU",
            MenuType::TbrMenu => "TBR_MENU",
            MenuType::TbrSet => "TBR_SET",
            MenuType::TbrDuration => "TBR_DURATION",
            MenuType::MyDataMenu => "MY_DATA_MENU",
            MenuType::BasalMenu => "BASAL_MENU",
            MenuType::TimeMenu => "TIME_MENU",
            MenuType::AlarmMenu => "ALARM_MENU",
            MenuType::MenuSettingsMenu => "MENU_SETTINGS_MENU",
            MenuType::BluetoothMenu => "BLUETOOTH_MENU",
            MenuType::TherapyMenu => "THERAPY_MENU",
            MenuType::PumpMenu => "PUMP_MENU",
            MenuType::WarningOrError => "WARNING_OR_ERROR",
        }
    }
}

impl fmt::Display for MenuType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribute kinds a menu snapshot may carry. Which ones are populated depends
/// on the menu type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MenuAttribute {
    Runtime,
    Bolus,
    BolusRemaining,
    BasalRate,
    BasalSelected,
    Tbr,
    Message,
    Warning,
    Error,
    Time,
    LowBattery,
    InsulinState,
    LockState,
}

impl MenuAttribute {
    pub fn as_str(&self) -> &'static str {
        match self {
            MenuAttribute::Runtime => "RUNTIME",
            MenuAttribute::Bolus => "BOLUS",
            MenuAttribute::BolusRemaining => "BOLUS_REMAINING",
            MenuAttribute::BasalRate => "BASAL_RATE",
            MenuAttribute::BasalSelected => "BASAL_SELECTED",
            MenuAttribute::Tbr => "TBR",
            MenuAttribute::Message => "MESSAGE",
            MenuAttribute::Warning => "WARNING",
            MenuAttribute::Error => "ERROR",
            MenuAttribute::Time => "TIME",
            MenuAttribute::LowBattery => "LOW_BATTERY",
            MenuAttribute::InsulinState => "INSULIN_STATE",
            MenuAttribute::LockState => "LOCK_STATE",
        }
    }
}

impl fmt::Display for MenuAttribute {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hour/minute duration as shown on the pump display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuTime {
    pub hour: u8,
    pub minute: u8,
}

impl MenuTime {
    pub fn new(hour: u8, minute: u8) -> Self {
        Self { hour, minute }
    }

    pub fn total_minutes(&self) -> u32 {
        self.hour as u32 * 60 + self.minute as u32
    }
}

impl fmt::Display for MenuTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MenuValue {
    Number(f64),
    Duration(MenuTime),
    Text(String),
    Flag(bool),
}

impl fmt::Display for MenuValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MenuValue::Number(value) => write!(f, "{}", value),
            MenuValue::Duration(time) => write!(f, "{}", time),
            MenuValue::Text(text) => f.write_str(text),
            MenuValue::Flag(flag) => write!(f, "{}", flag),
        }
    }
}

pub const MAX_MENU_ATTRIBUTES: usize = 16;

/// One snapshot of the pump display. A new one arrives with every push from
/// the driver and replaces the previous one wholesale.
#[derive(Debug, Clone, Serialize)]
pub struct Menu {
    menu_type: MenuType,
    attributes: FnvIndexMap<MenuAttribute, MenuValue, MAX_MENU_ATTRIBUTES>,
}

impl Menu {
    pub fn new(menu_type: MenuType) -> Self {
        Self {
            menu_type,
            attributes: FnvIndexMap::new(),
        }
    }

    pub fn with_attribute(mut self, attribute: MenuAttribute, value: MenuValue) -> Self {
        if self.attributes.insert(attribute, value).is_err() {
            warn!(
                "Menu {} has no room for attribute {}, dropping it",
                self.menu_type, attribute
            );
        }
        self
    }

    pub fn menu_type(&self) -> MenuType {
        self.menu_type
    }

    pub fn attribute(&self, attribute: MenuAttribute) -> Option<&MenuValue> {
        self.attributes.get(&attribute)
    }

    pub fn number(&self, attribute: MenuAttribute) -> Option<f64> {
        match self.attribute(attribute) {
            Some(MenuValue::Number(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn time(&self, attribute: MenuAttribute) -> Option<MenuTime> {
        match self.attribute(attribute) {
            Some(MenuValue::Duration(time)) => Some(*time),
            _ => None,
        }
    }

    pub fn text(&self, attribute: MenuAttribute) -> Option<&str> {
        match self.attribute(attribute) {
            Some(MenuValue::Text(text)) => Some(text.as_str()),
            _ => None,
        }
    }

    /// Populated attributes in the order the driver reported them.
    pub fn attributes(&self) -> impl Iterator<Item = (&MenuAttribute, &MenuValue)> {
        self.attributes.iter()
    }
}

/// Button codes understood by the pump's remote-terminal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Key {
    NoKey = 0x00,
    Menu = 0x03,
    Check = 0x0C,
    Up = 0x30,
    Down = 0xC0,
}

impl Key {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(Key::NoKey),
            0x03 => Some(Key::Menu),
            0x0C => Some(Key::Check),
            0x30 => Some(Key::Up),
            0xC0 => Some(Key::Down),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Key::NoKey => "no",
            Key::Menu => "menu",
            Key::Check => "check",
            Key::Up => "up",
            Key::Down => "down",
        }
    }
}

/// Normalized snapshot derived from whatever menu was displayed when it was
/// read. Never mutated after construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PumpState {
    tbr_active: bool,
    tbr_percent: u32,
    tbr_remaining_duration: u32,
    tbr_rate: f64,
    is_error_or_warning: bool,
    error_msg: Option<String>,
}

impl PumpState {
    /// Main menu without an active temporary basal rate.
    pub fn normal() -> Self {
        Self::default()
    }

    pub fn temporary_rate(percent: u32, remaining_minutes: u32, rate: f64) -> Self {
        Self {
            tbr_active: true,
            tbr_percent: percent,
            tbr_remaining_duration: remaining_minutes,
            tbr_rate: rate,
            ..Self::default()
        }
    }

    pub fn error_or_warning(message: Option<String>) -> Self {
        Self {
            is_error_or_warning: true,
            error_msg: message,
            ..Self::default()
        }
    }

    /// Dump of an unexpected menu, kept for post-hoc diagnosis.
    pub fn diagnostic(dump: String) -> Self {
        Self {
            error_msg: Some(dump),
            ..Self::default()
        }
    }

    pub fn tbr_active(&self) -> bool {
        self.tbr_active
    }

    pub fn tbr_percent(&self) -> u32 {
        self.tbr_percent
    }

    pub fn tbr_remaining_duration(&self) -> u32 {
        self.tbr_remaining_duration
    }

    pub fn tbr_rate(&self) -> f64 {
        self.tbr_rate
    }

    pub fn is_error_or_warning(&self) -> bool {
        self.is_error_or_warning
    }

    pub fn error_msg(&self) -> Option<&str> {
        self.error_msg.as_deref()
    }
}

/// Outcome of one command run. Every path through the executor produces
/// exactly one of these.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CommandResult {
    pub success: bool,
    pub enacted: bool,
    pub message: Option<String>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<ScripterError>,
    pub state: Option<PumpState>,
}

fn serialize_error<S: Serializer>(
    error: &Option<ScripterError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(error) => serializer.collect_str(error),
        None => serializer.serialize_none(),
    }
}

impl CommandResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    pub fn enacted(mut self, enacted: bool) -> Self {
        self.enacted = enacted;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn error(mut self, error: ScripterError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn state(mut self, state: PumpState) -> Self {
        self.state = Some(state);
        self
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "CommandResult(success={}, enacted={}, message={:?}",
            self.success, self.enacted, self.message
        )?;
        if let Some(ref error) = self.error {
            write!(f, ", error={}", error)?;
        }
        if let Some(ref state) = self.state {
            write!(f, ", state={:?}", state)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_time_minutes() {
        assert_eq!(MenuTime::new(0, 30).total_minutes(), 30);
        assert_eq!(MenuTime::new(2, 15).total_minutes(), 135);
    }

    #[test]
    fn test_menu_attributes_keep_insertion_order() {
        let menu = Menu::new(MenuType::BolusMenu)
            .with_attribute(MenuAttribute::Bolus, MenuValue::Number(2.5))
            .with_attribute(MenuAttribute::Runtime, MenuValue::Duration(MenuTime::new(0, 5)))
            .with_attribute(MenuAttribute::Message, MenuValue::Text("hi".to_string()));

        let order: Vec<MenuAttribute> = menu.attributes().map(|(a, _)| *a).collect();
        assert_eq!(
            order,
            vec![MenuAttribute::Bolus, MenuAttribute::Runtime, MenuAttribute::Message]
        );
        assert_eq!(menu.number(MenuAttribute::Bolus), Some(2.5));
        assert_eq!(menu.number(MenuAttribute::Runtime), None);
        assert_eq!(menu.text(MenuAttribute::Message), Some("hi"));
    }

    #[test]
    fn test_key_codes() {
        assert_eq!(Key::Menu.code(), 0x03);
        assert_eq!(Key::Down.code(), 0xC0);
        assert_eq!(Key::from_code(0x0C), Some(Key::Check));
        assert_eq!(Key::from_code(0x42), None);
    }

    #[test]
    fn test_command_result_serializes_error_as_text() {
        let result = CommandResult::new()
            .message("Command timed out")
            .error(ScripterError::CommandTimeout("bolus".to_string()));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Command bolus timed out");
    }
}
