use crate::error::ScripterError;
use crate::types::{Menu, MenuAttribute, MenuType, PumpState};
use std::fmt::Write;

const NORMAL_BASAL_PERCENT: f64 = 100.0;

/// Derive a pump state snapshot from the displayed menu.
///
/// Main menu: TBR details if a temporary rate is running. Warning/error menu:
/// the device message. Anything else: a dump of every attribute so an
/// unexpected screen can be diagnosed afterwards.
pub fn read_pump_state(menu: Option<&Menu>) -> Result<PumpState, ScripterError> {
    let menu = menu.ok_or(ScripterError::NoMenu)?;
    match menu.menu_type() {
        MenuType::MainMenu => read_main_menu(menu),
        MenuType::WarningOrError => Ok(PumpState::error_or_warning(
            menu.text(MenuAttribute::Message).map(str::to_string),
        )),
        _ => Ok(PumpState::diagnostic(describe_menu(menu))),
    }
}

fn read_main_menu(menu: &Menu) -> Result<PumpState, ScripterError> {
    let tbr_percent = menu
        .number(MenuAttribute::Tbr)
        .ok_or_else(|| missing_attribute(menu, MenuAttribute::Tbr))?;
    if tbr_percent == NORMAL_BASAL_PERCENT {
        return Ok(PumpState::normal());
    }

    let remaining = menu
        .time(MenuAttribute::Runtime)
        .ok_or_else(|| missing_attribute(menu, MenuAttribute::Runtime))?;
    let rate = menu
        .number(MenuAttribute::BasalRate)
        .ok_or_else(|| missing_attribute(menu, MenuAttribute::BasalRate))?;

    Ok(PumpState::temporary_rate(
        tbr_percent as u32,
        remaining.total_minutes(),
        rate,
    ))
}

fn missing_attribute(menu: &Menu, attribute: MenuAttribute) -> ScripterError {
    ScripterError::Unexpected(format!(
        "Menu {} is missing attribute {}",
        menu.menu_type(),
        attribute
    ))
}

fn describe_menu(menu: &Menu) -> String {
    let mut dump = format!(
        "Pump is on menu {}, listing attributes: \n",
        menu.menu_type()
    );
    for (attribute, value) in menu.attributes() {
        let _ = writeln!(dump, "{}: {}", attribute, value);
    }
    dump
}
