pub mod reference;
pub mod sale;
pub mod sync_report;
pub mod ticket;
pub mod usage;
pub mod validation;

pub use reference::{
    CachedMuseum, CachedMuseumPrice, CachedSession, CachedTicketType, ReferenceKind,
    ReferenceSnapshot,
};
pub use sale::{CartItem, GeneratedTicket, SaleRequest};
pub use sync_report::{ConnectivityState, PendingCount, SyncReport, SyncSkipReason, SyncTally};
pub use ticket::{CreditConsumption, LocalTicket, PendingTicket};
pub use usage::PendingUsage;
pub use validation::{RejectReason, ValidationOutcome};
