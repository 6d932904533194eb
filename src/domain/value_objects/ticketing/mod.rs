pub mod identifier;
pub mod price;
pub mod scan_code;

pub use identifier::{
    MuseumId, MuseumPriceId, SessionId, TicketId, TicketTypeId, UsageId, UserId,
};
pub use price::Price;
pub use scan_code::ScanCode;
