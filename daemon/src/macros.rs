//! Custom macros for reducing code repetition in paperswitcher

/// Log an error and continue execution (non-fatal error handling)
///
/// # Example
/// ```
/// log_and_continue!(controller.tick(), "rotate wallpaper on timer tick");
/// ```
#[macro_export]
macro_rules! log_and_continue {
    ($expr:expr, $context:expr) => {
        if let Err(e) = $expr {
            log::error!("Failed to {}: {}", $context, e);
        }
    };
}

/// Validate an enum-like string value
///
/// # Example
/// ```
/// validate_enum!(format, "png", "bmp", "jpeg");
/// validate_enum!(source, "wayland", "static");
/// ```
#[macro_export]
macro_rules! validate_enum {
    ($value:expr, $($variant:expr),+) => {
        match $value {
            $($variant)|+ => Ok(()),
            _ => anyhow::bail!("Invalid value: {} (expected one of: {})", $value, [$($variant),+].join(", ")),
        }
    };
}

/// Convert an error into a [`common::Response::Error`] with the given variant
///
/// # Example
/// ```
/// return error_response!(Ipc, "Failed to send command: {}", e);
/// ```
#[macro_export]
macro_rules! error_response {
    ($variant:ident, $($arg:tt)+) => {
        common::Response::Error(common::PaperError::$variant(format!($($arg)+)))
    };
}
