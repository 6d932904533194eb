use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

macro_rules! string_identifier {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: String) -> Result<Self, String> {
                Self::validate(&value)?;
                Ok(Self(value))
            }

            pub fn parse(value: &str) -> Result<Self, String> {
                Self::validate(value)?;
                Ok(Self(value.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            fn validate(value: &str) -> Result<(), String> {
                if value.trim().is_empty() {
                    return Err(concat!($label, " cannot be empty").to_string());
                }
                Ok(())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

string_identifier!(
    /// チケットの主キー。端末側で採番し、リモートでもそのまま主キーになる。
    TicketId,
    "Ticket ID"
);
string_identifier!(
    /// 入場（クレジット消費）イベントの主キー。
    UsageId,
    "Usage ID"
);
string_identifier!(MuseumId, "Museum ID");
string_identifier!(TicketTypeId, "Ticket type ID");
string_identifier!(MuseumPriceId, "Museum price ID");
string_identifier!(SessionId, "Session ID");
string_identifier!(UserId, "User ID");

impl TicketId {
    /// UUIDv7（時刻 + 乱数）で採番する。再送しても同じIDなので冪等になる。
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

impl UsageId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn empty_identifiers_are_rejected() {
        assert!(MuseumId::new("  ".into()).is_err());
        assert!(TicketId::parse("").is_err());
        assert_eq!(
            UserId::parse("").unwrap_err(),
            "User ID cannot be empty".to_string()
        );
    }

    #[test]
    fn generated_ticket_ids_are_unique() {
        let ids: HashSet<TicketId> = (0..2_000).map(|_| TicketId::generate()).collect();
        assert_eq!(ids.len(), 2_000);
    }

    #[test]
    fn generated_ids_parse_back() {
        let id = UsageId::generate();
        let parsed: UsageId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }
}
