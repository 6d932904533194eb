use crate::application::ports::remote_store::{RemoteError, RemoteStore};
use crate::domain::entities::ticketing::{
    CachedMuseum, CachedMuseumPrice, CachedSession, CachedTicketType, PendingTicket, PendingUsage,
};
use crate::domain::value_objects::ticketing::{
    MuseumId, MuseumPriceId, Price, SessionId, TicketId, TicketTypeId,
};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Postgres の一意制約違反
const UNIQUE_VIOLATION: &str = "23505";

/// PostgREST 互換 API のクライアント。
#[derive(Clone)]
pub struct RestRemoteStore {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl RestRemoteStore {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let trimmed = base_url.trim();
        if trimmed.is_empty() {
            return Err(AppError::ConfigurationError(
                "remote base url is empty".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::ConfigurationError(format!("http client: {err}")))?;

        Ok(Self {
            base_url: trimmed.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|value| !value.trim().is_empty()),
            http,
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let builder = self.http.request(method, url);
        if let Some(key) = &self.api_key {
            builder
                .header("apikey", key)
                .header("Authorization", format!("Bearer {key}"))
        } else {
            builder
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<String, RemoteError> {
        let response = builder
            .send()
            .await
            .map_err(|err| RemoteError::Unavailable(err.to_string()))?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status.is_success() {
            return Ok(body);
        }
        Err(classify_failure(status, &body))
    }

    async fn insert<T: Serialize + Sync>(&self, table: &str, row: &T) -> Result<(), RemoteError> {
        let builder = self
            .request(Method::POST, table)
            .header("Prefer", "return=minimal")
            .json(row);
        self.send(builder).await.map(|_| ())
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, RemoteError> {
        let builder = self.request(Method::GET, table).query(query);
        let body = self.send(builder).await?;
        serde_json::from_str(&body).map_err(|err| RemoteError::InvalidResponse(err.to_string()))
    }
}

#[async_trait]
impl RemoteStore for RestRemoteStore {
    async fn ping(&self) -> Result<(), RemoteError> {
        let builder = self
            .request(Method::GET, "museums")
            .query(&[("select", "id"), ("limit", "1")]);
        self.send(builder).await.map(|_| ())
    }

    async fn insert_ticket(&self, ticket: &PendingTicket) -> Result<(), RemoteError> {
        self.insert("tickets", &TicketInsert::from(ticket)).await
    }

    async fn insert_usage_event(&self, usage: &PendingUsage) -> Result<(), RemoteError> {
        self.insert("ticket_usage", &UsageInsert::from(usage)).await
    }

    async fn sum_usage_credits(&self, ticket_id: &TicketId) -> Result<u32, RemoteError> {
        let rows: Vec<UsageCreditsRow> = self
            .select(
                "ticket_usage",
                &[
                    ("select", "credits_used".to_string()),
                    ("ticket_id", format!("eq.{ticket_id}")),
                ],
            )
            .await?;
        Ok(rows
            .iter()
            .fold(0u32, |acc, row| acc.saturating_add(row.credits_used)))
    }

    async fn ticket_initial_credits(&self, ticket_id: &TicketId) -> Result<u32, RemoteError> {
        let rows: Vec<InitialCreditsRow> = self
            .select(
                "tickets",
                &[
                    ("select", "initial_credits".to_string()),
                    ("id", format!("eq.{ticket_id}")),
                ],
            )
            .await?;
        rows.first()
            .map(|row| row.initial_credits)
            .ok_or_else(|| RemoteError::Rejected(format!("ticket {ticket_id} not found")))
    }

    async fn update_ticket_remaining_credits(
        &self,
        ticket_id: &TicketId,
        remaining: u32,
        is_used: bool,
        used_at: Option<DateTime<Utc>>,
    ) -> Result<(), RemoteError> {
        let builder = self
            .request(Method::PATCH, "tickets")
            .query(&[("id", format!("eq.{ticket_id}"))])
            .header("Prefer", "return=minimal")
            .json(&RemainingCreditsPatch {
                remaining_credits: remaining,
                is_used,
                used_at,
            });
        self.send(builder).await.map(|_| ())
    }

    async fn fetch_active_museums(&self) -> Result<Vec<CachedMuseum>, RemoteError> {
        let rows: Vec<MuseumDto> = self
            .select(
                "museums",
                &[
                    ("select", "id,name,address,is_active".to_string()),
                    ("is_active", "eq.true".to_string()),
                ],
            )
            .await?;
        rows.into_iter().map(MuseumDto::into_cached).collect()
    }

    async fn fetch_active_ticket_types(&self) -> Result<Vec<CachedTicketType>, RemoteError> {
        let rows: Vec<TicketTypeDto> = self
            .select(
                "ticket_types",
                &[
                    (
                        "select",
                        "id,name,description,price,credits,is_combo,is_active".to_string(),
                    ),
                    ("is_active", "eq.true".to_string()),
                ],
            )
            .await?;
        rows.into_iter().map(TicketTypeDto::into_cached).collect()
    }

    async fn fetch_active_museum_prices(&self) -> Result<Vec<CachedMuseumPrice>, RemoteError> {
        let rows: Vec<MuseumPriceDto> = self
            .select(
                "museum_ticket_prices",
                &[
                    (
                        "select",
                        "id,museum_id,ticket_type_id,price,is_active".to_string(),
                    ),
                    ("is_active", "eq.true".to_string()),
                ],
            )
            .await?;
        rows.into_iter().map(MuseumPriceDto::into_cached).collect()
    }

    async fn fetch_todays_active_sessions(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<CachedSession>, RemoteError> {
        let rows: Vec<SessionDto> = self
            .select(
                "sessions",
                &[
                    (
                        "select",
                        "id,museum_id,session_date,start_time,end_time,capacity,is_active"
                            .to_string(),
                    ),
                    ("is_active", "eq.true".to_string()),
                    ("session_date", format!("eq.{}", date.format("%Y-%m-%d"))),
                ],
            )
            .await?;
        rows.into_iter().map(SessionDto::into_cached).collect()
    }
}

/// PostgREST のエラーボディ。`code` は Postgres の SQLSTATE。
#[derive(Debug, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
}

/// HTTP ステータスとボディから失敗種別を決める。
/// 重複扱いはボディの SQLSTATE が一意制約違反のときだけ。
pub(crate) fn classify_failure(status: StatusCode, body: &str) -> RemoteError {
    let detail = format!("{status} - {body}");
    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        return RemoteError::Unavailable(detail);
    }

    let code = serde_json::from_str::<PostgrestError>(body)
        .ok()
        .and_then(|error| error.code);
    if code.as_deref() == Some(UNIQUE_VIOLATION) {
        return RemoteError::DuplicateKey(detail);
    }
    RemoteError::Rejected(detail)
}

fn invalid(err: String) -> RemoteError {
    RemoteError::InvalidResponse(err)
}

#[derive(Debug, Serialize)]
struct TicketInsert<'a> {
    id: &'a str,
    qr_code: &'a str,
    ticket_type_id: &'a str,
    museum_id: &'a str,
    session_id: Option<&'a str>,
    price: f64,
    sold_by: &'a str,
    initial_credits: u32,
    remaining_credits: u32,
    is_used: bool,
    created_at: DateTime<Utc>,
}

impl<'a> From<&'a PendingTicket> for TicketInsert<'a> {
    fn from(ticket: &'a PendingTicket) -> Self {
        Self {
            id: ticket.id.as_str(),
            qr_code: ticket.scan_code.as_str(),
            ticket_type_id: ticket.ticket_type_id.as_str(),
            museum_id: ticket.museum_id.as_str(),
            session_id: ticket.session_id.as_ref().map(|id| id.as_str()),
            price: ticket.price.as_decimal(),
            sold_by: ticket.sold_by.as_str(),
            initial_credits: ticket.initial_credits,
            remaining_credits: ticket.initial_credits,
            is_used: ticket.initial_credits == 0,
            created_at: ticket.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct UsageInsert<'a> {
    id: &'a str,
    ticket_id: &'a str,
    museum_id: &'a str,
    credits_used: u32,
    used_by: Option<&'a str>,
    used_at: DateTime<Utc>,
}

impl<'a> From<&'a PendingUsage> for UsageInsert<'a> {
    fn from(usage: &'a PendingUsage) -> Self {
        Self {
            id: usage.id.as_str(),
            ticket_id: usage.ticket_id.as_str(),
            museum_id: usage.museum_id.as_str(),
            credits_used: usage.credits_used,
            used_by: usage.used_by.as_ref().map(|id| id.as_str()),
            used_at: usage.used_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct RemainingCreditsPatch {
    remaining_credits: u32,
    is_used: bool,
    used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct UsageCreditsRow {
    credits_used: u32,
}

#[derive(Debug, Deserialize)]
struct InitialCreditsRow {
    initial_credits: u32,
}

#[derive(Debug, Deserialize)]
struct MuseumDto {
    id: String,
    name: String,
    #[serde(default)]
    address: Option<String>,
    #[serde(default = "default_true")]
    is_active: bool,
}

impl MuseumDto {
    fn into_cached(self) -> Result<CachedMuseum, RemoteError> {
        Ok(CachedMuseum {
            id: MuseumId::new(self.id).map_err(invalid)?,
            name: self.name,
            address: self.address,
            is_active: self.is_active,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TicketTypeDto {
    id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    price: f64,
    #[serde(default = "default_credits")]
    credits: u32,
    #[serde(default)]
    is_combo: bool,
    #[serde(default = "default_true")]
    is_active: bool,
}

impl TicketTypeDto {
    fn into_cached(self) -> Result<CachedTicketType, RemoteError> {
        Ok(CachedTicketType {
            id: TicketTypeId::new(self.id).map_err(invalid)?,
            name: self.name,
            description: self.description,
            default_price: Price::from_decimal(self.price).map_err(invalid)?,
            credits: self.credits,
            is_combo: self.is_combo,
            is_active: self.is_active,
        })
    }
}

#[derive(Debug, Deserialize)]
struct MuseumPriceDto {
    id: String,
    museum_id: String,
    ticket_type_id: String,
    price: f64,
    #[serde(default = "default_true")]
    is_active: bool,
}

impl MuseumPriceDto {
    fn into_cached(self) -> Result<CachedMuseumPrice, RemoteError> {
        Ok(CachedMuseumPrice {
            id: MuseumPriceId::new(self.id).map_err(invalid)?,
            museum_id: MuseumId::new(self.museum_id).map_err(invalid)?,
            ticket_type_id: TicketTypeId::new(self.ticket_type_id).map_err(invalid)?,
            price: Price::from_decimal(self.price).map_err(invalid)?,
            is_active: self.is_active,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SessionDto {
    id: String,
    museum_id: String,
    session_date: NaiveDate,
    #[serde(default)]
    start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    capacity: Option<u32>,
    #[serde(default = "default_true")]
    is_active: bool,
}

impl SessionDto {
    fn into_cached(self) -> Result<CachedSession, RemoteError> {
        Ok(CachedSession {
            id: SessionId::new(self.id).map_err(invalid)?,
            museum_id: MuseumId::new(self.museum_id).map_err(invalid)?,
            session_date: self.session_date,
            starts_at: self.start_time,
            ends_at: self.end_time,
            capacity: self.capacity,
            is_active: self.is_active,
        })
    }
}

fn default_true() -> bool {
    true
}

fn default_credits() -> u32 {
    1
}
