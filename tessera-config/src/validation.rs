//! Configuration validation utilities
//!
//! The helpers return [`ConfigResult`] so they can be used on their own or
//! plugged into a descriptor with
//! [`validate_with`](crate::ConfigDescriptor::validate_with):
//!
//! ```
//! use tessera_config::descriptor::port;
//! use tessera_config::validation::validate_port;
//!
//! let listener = port("port").validate_with(|p| validate_port(*p, "port"));
//! ```

use crate::descriptor::{ConfigDescriptor, ConfigType};
use crate::error::{ConfigError, ConfigResult};
use validator::Validate;

impl<A: ConfigType + Validate> ConfigDescriptor<A> {
    /// Run the type's `validator` rules after reading
    pub fn validated(self) -> ConfigDescriptor<A> {
        self.validate_with(|value: &A| value.validate())
    }
}

/// Validate a required string field
pub fn validate_non_empty(value: &str, field_name: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "{} cannot be empty",
            field_name
        )));
    }
    Ok(())
}

/// Validate a positive number
pub fn validate_positive<T>(value: T, field_name: &str) -> ConfigResult<()>
where
    T: PartialOrd + Default + std::fmt::Display,
{
    if value <= T::default() {
        return Err(ConfigError::ValidationError(format!(
            "{} must be greater than 0, got {}",
            field_name, value
        )));
    }
    Ok(())
}

/// Validate a URL
pub fn validate_url(url: &str, field_name: &str) -> ConfigResult<()> {
    validate_non_empty(url, field_name)?;

    url::Url::parse(url).map_err(|e| {
        ConfigError::ValidationError(format!("{} has invalid URL format: {}", field_name, e))
    })?;

    Ok(())
}

/// Validate a value against a fixed set of choices, ignoring case
pub fn validate_one_of<T>(value: &str, valid_choices: &[T], field_name: &str) -> ConfigResult<()>
where
    T: AsRef<str>,
{
    let valid: Vec<&str> = valid_choices.iter().map(|c| c.as_ref()).collect();

    if !valid.iter().any(|&v| v.eq_ignore_ascii_case(value)) {
        return Err(ConfigError::ValidationError(format!(
            "{} has invalid value '{}'. Valid choices: {}",
            field_name,
            value,
            valid.join(", ")
        )));
    }

    Ok(())
}

/// Validate a port number
pub fn validate_port(port: u16, field_name: &str) -> ConfigResult<()> {
    if port == 0 {
        return Err(ConfigError::ValidationError(format!(
            "{} cannot be 0",
            field_name
        )));
    }

    // Port 1-1023 are typically reserved for system services
    if port <= 1023 {
        log::warn!("{} port {} is in the reserved range (1-1023)", field_name, port);
    }

    Ok(())
}
