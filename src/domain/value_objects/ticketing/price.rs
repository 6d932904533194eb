use serde::{Deserialize, Serialize};
use std::fmt;

/// 金額（最小通貨単位、例: セント）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Price(i64);

impl Price {
    pub fn from_cents(cents: i64) -> Result<Self, String> {
        if cents < 0 {
            return Err(format!("Price cannot be negative: {cents}"));
        }
        Ok(Self(cents))
    }

    /// リモートの numeric 列（例: 12.5）から変換する。
    pub fn from_decimal(value: f64) -> Result<Self, String> {
        if !value.is_finite() {
            return Err("Price must be a finite number".to_string());
        }
        Self::from_cents((value * 100.0).round() as i64)
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn as_decimal(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}
