use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

const PREFIX: &str = "MG";
const RANDOM_LEN: usize = 8;
// 0/O, 1/I/L を除外した英数字（手入力でも読み違えない）
const ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";

/// チケットに印字されるQR/バーコードの文字列。IDとは別に採番する。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanCode(String);

impl ScanCode {
    pub fn generate(now: DateTime<Utc>) -> Self {
        let mut rng = rand::thread_rng();
        let random: String = (0..RANDOM_LEN)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        let millis = u64::try_from(now.timestamp_millis()).unwrap_or_default();
        Self(format!("{PREFIX}-{}-{random}", to_base36(millis)))
    }

    /// スキャナ入力を正規化する（前後の空白・改行を除去し大文字化）。
    pub fn parse(value: &str) -> Result<Self, String> {
        let normalized = value.trim().to_ascii_uppercase();
        if normalized.is_empty() {
            return Err("Scan code cannot be empty".to_string());
        }
        if !normalized
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(format!("Scan code contains invalid characters: {normalized}"));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if value == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while value > 0 {
        buf.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).unwrap_or_default()
}

impl fmt::Display for ScanCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ScanCode> for String {
    fn from(code: ScanCode) -> Self {
        code.0
    }
}

impl FromStr for ScanCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
