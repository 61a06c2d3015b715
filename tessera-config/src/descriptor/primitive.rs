//! Scalar types that can be read from a single leaf value

use super::ConfigType;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// A value parsed from (and printed back to) one leaf string
pub trait Primitive: ConfigType {
    /// Human readable name used in parse errors
    const TYPE_NAME: &'static str;

    fn parse(raw: &str) -> Result<Self, String>;

    fn print(&self) -> String;
}

macro_rules! from_str_primitive {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl Primitive for $ty {
                const TYPE_NAME: &'static str = $name;

                fn parse(raw: &str) -> Result<Self, String> {
                    raw.trim()
                        .parse::<$ty>()
                        .map_err(|e| format!("'{}' is not a valid {}: {}", raw, $name, e))
                }

                fn print(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

from_str_primitive! {
    i8 => "i8",
    i16 => "i16",
    i32 => "int",
    i64 => "long",
    i128 => "i128",
    isize => "isize",
    u8 => "u8",
    u16 => "u16",
    u32 => "u32",
    u64 => "u64",
    u128 => "u128",
    usize => "usize",
    f32 => "float",
    f64 => "double",
}

impl Primitive for String {
    const TYPE_NAME: &'static str = "string";

    fn parse(raw: &str) -> Result<Self, String> {
        Ok(raw.to_string())
    }

    fn print(&self) -> String {
        self.clone()
    }
}

impl Primitive for bool {
    const TYPE_NAME: &'static str = "boolean";

    fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(format!("'{}' is not a valid boolean", raw)),
        }
    }

    fn print(&self) -> String {
        self.to_string()
    }
}

impl Primitive for char {
    const TYPE_NAME: &'static str = "char";

    fn parse(raw: &str) -> Result<Self, String> {
        let mut chars = raw.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(format!("'{}' is not a single character", raw)),
        }
    }

    fn print(&self) -> String {
        self.to_string()
    }
}

impl Primitive for PathBuf {
    const TYPE_NAME: &'static str = "path";

    fn parse(raw: &str) -> Result<Self, String> {
        if raw.is_empty() {
            return Err("path cannot be empty".to_string());
        }
        Ok(PathBuf::from(raw))
    }

    fn print(&self) -> String {
        self.display().to_string()
    }
}

impl Primitive for Url {
    const TYPE_NAME: &'static str = "url";

    fn parse(raw: &str) -> Result<Self, String> {
        Url::parse(raw.trim()).map_err(|e| format!("'{}' is not a valid url: {}", raw, e))
    }

    fn print(&self) -> String {
        self.to_string()
    }
}

impl Primitive for Duration {
    const TYPE_NAME: &'static str = "duration";

    fn parse(raw: &str) -> Result<Self, String> {
        humantime::parse_duration(raw.trim())
            .map_err(|e| format!("'{}' is not a valid duration: {}", raw, e))
    }

    fn print(&self) -> String {
        humantime::format_duration(*self).to_string()
    }
}

impl Primitive for NaiveDate {
    const TYPE_NAME: &'static str = "date";

    fn parse(raw: &str) -> Result<Self, String> {
        NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map_err(|e| format!("'{}' is not a valid date (YYYY-MM-DD): {}", raw, e))
    }

    fn print(&self) -> String {
        self.format("%Y-%m-%d").to_string()
    }
}

impl Primitive for NaiveDateTime {
    const TYPE_NAME: &'static str = "local date-time";

    fn parse(raw: &str) -> Result<Self, String> {
        NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%dT%H:%M:%S%.f")
            .map_err(|e| format!("'{}' is not a valid local date-time: {}", raw, e))
    }

    fn print(&self) -> String {
        self.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
    }
}

impl Primitive for DateTime<FixedOffset> {
    const TYPE_NAME: &'static str = "date-time";

    fn parse(raw: &str) -> Result<Self, String> {
        DateTime::parse_from_rfc3339(raw.trim())
            .map_err(|e| format!("'{}' is not a valid RFC 3339 date-time: {}", raw, e))
    }

    fn print(&self) -> String {
        self.to_rfc3339()
    }
}
