use crate::application::ports::remote_store::{RemoteError, RemoteStore};
use crate::domain::entities::ticketing::{
    CachedMuseum, CachedMuseumPrice, CachedSession, CachedTicketType, PendingTicket, PendingUsage,
    ReferenceKind, ReferenceSnapshot,
};
use crate::domain::value_objects::ticketing::{TicketId, UsageId};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// リモート側で保持しているチケットの状態。
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTicket {
    pub ticket: PendingTicket,
    pub remaining_credits: u32,
    pub is_used: bool,
    pub used_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct RemoteState {
    available: bool,
    tickets: HashMap<TicketId, RemoteTicket>,
    usage: HashMap<UsageId, PendingUsage>,
    museums: Vec<CachedMuseum>,
    ticket_types: Vec<CachedTicketType>,
    museum_prices: Vec<CachedMuseumPrice>,
    sessions: Vec<CachedSession>,
    failing_tickets: HashSet<TicketId>,
    failing_usage: HashSet<UsageId>,
    failing_references: HashSet<ReferenceKind>,
    fail_remaining_updates: bool,
    insert_attempts: u64,
}

/// プロセス内で完結するリモートストア。障害注入ができる。
pub struct InMemoryRemoteStore {
    state: Mutex<RemoteState>,
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RemoteState {
                available: true,
                ..RemoteState::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RemoteState> {
        // 注入状態だけなのでポイズンしても中身はそのまま使う
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn guard(&self) -> Result<MutexGuard<'_, RemoteState>, RemoteError> {
        let state = self.lock();
        if !state.available {
            return Err(RemoteError::Unavailable("remote store unreachable".into()));
        }
        Ok(state)
    }

    pub fn set_available(&self, available: bool) {
        self.lock().available = available;
    }

    pub fn fail_ticket(&self, id: &TicketId) {
        self.lock().failing_tickets.insert(id.clone());
    }

    pub fn fail_usage(&self, id: &UsageId) {
        self.lock().failing_usage.insert(id.clone());
    }

    pub fn fail_reference(&self, kind: ReferenceKind) {
        self.lock().failing_references.insert(kind);
    }

    pub fn fail_remaining_updates(&self, fail: bool) {
        self.lock().fail_remaining_updates = fail;
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.failing_tickets.clear();
        state.failing_usage.clear();
        state.failing_references.clear();
        state.fail_remaining_updates = false;
    }

    /// 既に反映済みのチケットとして登録する（前回の部分的な同期の再現用）。
    pub fn seed_ticket(&self, ticket: &PendingTicket) {
        let mut state = self.lock();
        state.tickets.insert(ticket.id.clone(), remote_ticket(ticket));
    }

    pub fn seed_usage(&self, usage: &PendingUsage) {
        let mut state = self.lock();
        state.usage.insert(usage.id.clone(), usage.clone());
    }

    pub fn set_reference(&self, snapshot: ReferenceSnapshot) {
        let mut state = self.lock();
        match snapshot {
            ReferenceSnapshot::Museums(items) => state.museums = items,
            ReferenceSnapshot::TicketTypes(items) => state.ticket_types = items,
            ReferenceSnapshot::MuseumPrices(items) => state.museum_prices = items,
            ReferenceSnapshot::Sessions(items) => state.sessions = items,
        }
    }

    pub fn ticket(&self, id: &TicketId) -> Option<RemoteTicket> {
        self.lock().tickets.get(id).cloned()
    }

    pub fn ticket_count(&self) -> usize {
        self.lock().tickets.len()
    }

    pub fn usage_count(&self) -> usize {
        self.lock().usage.len()
    }

    pub fn insert_attempts(&self) -> u64 {
        self.lock().insert_attempts
    }

    fn check_reference(state: &RemoteState, kind: ReferenceKind) -> Result<(), RemoteError> {
        if state.failing_references.contains(&kind) {
            return Err(RemoteError::Unavailable(format!("{kind} fetch failed")));
        }
        Ok(())
    }
}

fn remote_ticket(ticket: &PendingTicket) -> RemoteTicket {
    RemoteTicket {
        ticket: ticket.clone(),
        remaining_credits: ticket.initial_credits,
        is_used: ticket.initial_credits == 0,
        used_at: None,
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn ping(&self) -> Result<(), RemoteError> {
        self.guard().map(|_| ())
    }

    async fn insert_ticket(&self, ticket: &PendingTicket) -> Result<(), RemoteError> {
        let mut state = self.guard()?;
        state.insert_attempts += 1;
        if state.failing_tickets.contains(&ticket.id) {
            return Err(RemoteError::Rejected(format!("ticket {} refused", ticket.id)));
        }
        if state.tickets.contains_key(&ticket.id) {
            return Err(RemoteError::DuplicateKey(format!("tickets_pkey {}", ticket.id)));
        }
        state
            .tickets
            .insert(ticket.id.clone(), remote_ticket(ticket));
        Ok(())
    }

    async fn insert_usage_event(&self, usage: &PendingUsage) -> Result<(), RemoteError> {
        let mut state = self.guard()?;
        state.insert_attempts += 1;
        if state.failing_usage.contains(&usage.id) {
            return Err(RemoteError::Rejected(format!("usage {} refused", usage.id)));
        }
        if !state.tickets.contains_key(&usage.ticket_id) {
            return Err(RemoteError::Rejected(format!(
                "ticket_usage_ticket_id_fkey: ticket {} does not exist",
                usage.ticket_id
            )));
        }
        if state.usage.contains_key(&usage.id) {
            return Err(RemoteError::DuplicateKey(format!("ticket_usage_pkey {}", usage.id)));
        }
        state.usage.insert(usage.id.clone(), usage.clone());
        Ok(())
    }

    async fn sum_usage_credits(&self, ticket_id: &TicketId) -> Result<u32, RemoteError> {
        let state = self.guard()?;
        Ok(state
            .usage
            .values()
            .filter(|usage| &usage.ticket_id == ticket_id)
            .fold(0u32, |acc, usage| acc.saturating_add(usage.credits_used)))
    }

    async fn ticket_initial_credits(&self, ticket_id: &TicketId) -> Result<u32, RemoteError> {
        let state = self.guard()?;
        state
            .tickets
            .get(ticket_id)
            .map(|remote| remote.ticket.initial_credits)
            .ok_or_else(|| RemoteError::Rejected(format!("ticket {ticket_id} not found")))
    }

    async fn update_ticket_remaining_credits(
        &self,
        ticket_id: &TicketId,
        remaining: u32,
        is_used: bool,
        used_at: Option<DateTime<Utc>>,
    ) -> Result<(), RemoteError> {
        let mut state = self.guard()?;
        if state.fail_remaining_updates {
            return Err(RemoteError::Unavailable("ticket update timed out".into()));
        }
        let remote = state
            .tickets
            .get_mut(ticket_id)
            .ok_or_else(|| RemoteError::Rejected(format!("ticket {ticket_id} not found")))?;
        remote.remaining_credits = remaining;
        remote.is_used = is_used;
        remote.used_at = used_at;
        Ok(())
    }

    async fn fetch_active_museums(&self) -> Result<Vec<CachedMuseum>, RemoteError> {
        let state = self.guard()?;
        Self::check_reference(&state, ReferenceKind::Museums)?;
        Ok(state
            .museums
            .iter()
            .filter(|museum| museum.is_active)
            .cloned()
            .collect())
    }

    async fn fetch_active_ticket_types(&self) -> Result<Vec<CachedTicketType>, RemoteError> {
        let state = self.guard()?;
        Self::check_reference(&state, ReferenceKind::TicketTypes)?;
        Ok(state
            .ticket_types
            .iter()
            .filter(|ticket_type| ticket_type.is_active)
            .cloned()
            .collect())
    }

    async fn fetch_active_museum_prices(&self) -> Result<Vec<CachedMuseumPrice>, RemoteError> {
        let state = self.guard()?;
        Self::check_reference(&state, ReferenceKind::MuseumPrices)?;
        Ok(state
            .museum_prices
            .iter()
            .filter(|price| price.is_active)
            .cloned()
            .collect())
    }

    async fn fetch_todays_active_sessions(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<CachedSession>, RemoteError> {
        let state = self.guard()?;
        Self::check_reference(&state, ReferenceKind::Sessions)?;
        Ok(state
            .sessions
            .iter()
            .filter(|session| session.is_active && session.session_date == date)
            .cloned()
            .collect())
    }
}
