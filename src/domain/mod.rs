pub mod entities;
pub mod value_objects;

pub use entities::ticketing::{LocalTicket, PendingTicket, PendingUsage};
pub use value_objects::ticketing::{MuseumId, ScanCode, TicketId, UsageId};
