use crate::driver::DriverError;
use crate::types::{CommandResult, MenuType};

/// Everything that can go wrong while driving the pump. All of these are
/// turned into a failed `CommandResult` at the executor boundary.
#[derive(Debug, Clone)]
pub enum ScripterError {
    Connection {
        message: String,
        source: Option<DriverError>,
    },
    MenuTimeout,
    MenuLeaveTimeout(MenuType),
    NavigationNotFound(MenuType),
    VerificationFailed(String),
    CommandTimeout(String),
    PumpErrorState(String),
    NoMenu,
    Cancelled,
    Unexpected(String),
}

impl ScripterError {
    pub fn connection(message: &str, source: DriverError) -> Self {
        ScripterError::Connection {
            message: message.to_string(),
            source: Some(source),
        }
    }

    pub fn into_command_result(self) -> CommandResult {
        CommandResult::new()
            .success(false)
            .enacted(false)
            .message(self.to_string())
            .error(self)
    }
}

impl std::fmt::Display for ScripterError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ScripterError::Connection { message, source } => match source {
                Some(source) => write!(f, "{}: {}", message, source),
                None => write!(f, "{}", message),
            },
            ScripterError::MenuTimeout => write!(f, "Timeout waiting for menu update"),
            ScripterError::MenuLeaveTimeout(menu) => {
                write!(f, "Timeout waiting for menu {} to be left", menu)
            }
            ScripterError::NavigationNotFound(menu) => write!(
                f,
                "Menu not found searching for {}. Check menu settings on your pump to ensure it's not hidden.",
                menu
            ),
            ScripterError::VerificationFailed(message) => write!(f, "{}", message),
            ScripterError::CommandTimeout(command) => write!(f, "Command {} timed out", command),
            ScripterError::PumpErrorState(message) => {
                write!(f, "Pump is in an error state: {}", message)
            }
            ScripterError::NoMenu => write!(f, "No menu displayed, pump link is not up"),
            ScripterError::Cancelled => write!(f, "Command was interrupted"),
            ScripterError::Unexpected(message) => write!(f, "Unexpected error: {}", message),
        }
    }
}

impl std::error::Error for ScripterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScripterError::Connection {
                source: Some(source),
                ..
            } => Some(source),
            _ => None,
        }
    }
}

impl From<DriverError> for ScripterError {
    fn from(error: DriverError) -> Self {
        ScripterError::connection("Driver call failed", error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_converts_to_failed_result() {
        let result = ScripterError::NavigationNotFound(MenuType::TbrMenu).into_command_result();
        assert!(!result.success);
        assert!(!result.enacted);
        assert!(result.message.unwrap().contains("TBR_MENU"));
        assert!(matches!(
            result.error,
            Some(ScripterError::NavigationNotFound(MenuType::TbrMenu))
        ));
    }

    #[test]
    fn test_connection_error_keeps_driver_source() {
        let error = ScripterError::connection(
            "Error while pressing buttons",
            DriverError::SendFailed("link lost".to_string()),
        );
        assert_eq!(
            error.to_string(),
            "Error while pressing buttons: Send failed: link lost"
        );
        assert!(std::error::Error::source(&error).is_some());
    }
}
