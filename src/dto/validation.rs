//! Validation helpers for DTOs.

use time::{Date, macros::format_description};
use validator::ValidationError;

/// Validates a `#rrggbb` team color.
///
/// # Examples
///
/// ```ignore
/// validate_hex_color("#e53935") // Ok
/// validate_hex_color("e53935")  // Err - missing hash
/// validate_hex_color("#e539")   // Err - too short
/// ```
pub fn validate_hex_color(color: &str) -> Result<(), ValidationError> {
    let Some(digits) = color.strip_prefix('#') else {
        let mut err = ValidationError::new("color_format");
        err.message = Some("Color must start with `#`".into());
        return Err(err);
    };

    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        let mut err = ValidationError::new("color_format");
        err.message = Some("Color must be six hexadecimal digits".into());
        return Err(err);
    }

    Ok(())
}

/// Validates a calendar date written as `YYYY-MM-DD`.
pub fn validate_event_date(date: &str) -> Result<(), ValidationError> {
    Date::parse(date, format_description!("[year]-[month]-[day]"))
        .map(|_| ())
        .map_err(|_| {
            let mut err = ValidationError::new("date_format");
            err.message = Some(format!("`{date}` is not a YYYY-MM-DD date").into());
            err
        })
}

/// Validates a two-letter country code used for team flags.
pub fn validate_flag_code(code: &str) -> Result<(), ValidationError> {
    if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("flag_code");
        err.message = Some("Flag code must be a two-letter country code".into());
        Err(err)
    }
}
