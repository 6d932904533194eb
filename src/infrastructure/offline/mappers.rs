use super::rows::{
    CachedMuseumPriceRow, CachedMuseumRow, CachedSessionRow, CachedTicketTypeRow, LocalTicketRow,
    PendingTicketRow, PendingUsageRow,
};
use crate::domain::entities::ticketing::{
    CachedMuseum, CachedMuseumPrice, CachedSession, CachedTicketType, LocalTicket, PendingTicket,
    PendingUsage,
};
use crate::domain::value_objects::ticketing::{
    MuseumId, MuseumPriceId, Price, ScanCode, SessionId, TicketId, TicketTypeId, UsageId, UserId,
};
use crate::shared::error::AppError;
use chrono::{DateTime, NaiveDate, Utc};

pub fn pending_ticket_from_row(row: PendingTicketRow) -> Result<PendingTicket, AppError> {
    Ok(PendingTicket {
        id: TicketId::new(row.id).map_err(AppError::DeserializationError)?,
        scan_code: ScanCode::parse(&row.scan_code).map_err(AppError::DeserializationError)?,
        ticket_type_id: TicketTypeId::new(row.ticket_type_id)
            .map_err(AppError::DeserializationError)?,
        museum_id: MuseumId::new(row.museum_id).map_err(AppError::DeserializationError)?,
        session_id: row
            .session_id
            .map(SessionId::new)
            .transpose()
            .map_err(AppError::DeserializationError)?,
        price: Price::from_cents(row.price_cents).map_err(AppError::DeserializationError)?,
        sold_by: UserId::new(row.sold_by).map_err(AppError::DeserializationError)?,
        initial_credits: credits_from_i64(row.initial_credits)?,
        created_at: timestamp_to_datetime(row.created_at)?,
        synced: row.synced,
    })
}

pub fn local_ticket_from_row(row: LocalTicketRow) -> Result<LocalTicket, AppError> {
    Ok(LocalTicket {
        id: TicketId::new(row.id).map_err(AppError::DeserializationError)?,
        scan_code: ScanCode::parse(&row.scan_code).map_err(AppError::DeserializationError)?,
        ticket_type_id: TicketTypeId::new(row.ticket_type_id)
            .map_err(AppError::DeserializationError)?,
        museum_id: MuseumId::new(row.museum_id).map_err(AppError::DeserializationError)?,
        remaining_credits: credits_from_i64(row.remaining_credits)?,
        is_used: row.is_used,
        created_at: timestamp_to_datetime(row.created_at)?,
    })
}

pub fn pending_usage_from_row(row: PendingUsageRow) -> Result<PendingUsage, AppError> {
    Ok(PendingUsage {
        id: UsageId::new(row.id).map_err(AppError::DeserializationError)?,
        ticket_id: TicketId::new(row.ticket_id).map_err(AppError::DeserializationError)?,
        museum_id: MuseumId::new(row.museum_id).map_err(AppError::DeserializationError)?,
        credits_used: credits_from_i64(row.credits_used)?,
        used_by: row
            .used_by
            .map(UserId::new)
            .transpose()
            .map_err(AppError::DeserializationError)?,
        used_at: timestamp_to_datetime(row.used_at)?,
        synced: row.synced,
    })
}

pub fn museum_from_row(row: CachedMuseumRow) -> Result<CachedMuseum, AppError> {
    Ok(CachedMuseum {
        id: MuseumId::new(row.id).map_err(AppError::DeserializationError)?,
        name: row.name,
        address: row.address,
        is_active: row.is_active,
    })
}

pub fn ticket_type_from_row(row: CachedTicketTypeRow) -> Result<CachedTicketType, AppError> {
    Ok(CachedTicketType {
        id: TicketTypeId::new(row.id).map_err(AppError::DeserializationError)?,
        name: row.name,
        description: row.description,
        default_price: Price::from_cents(row.default_price_cents)
            .map_err(AppError::DeserializationError)?,
        credits: credits_from_i64(row.credits)?,
        is_combo: row.is_combo,
        is_active: row.is_active,
    })
}

pub fn museum_price_from_row(row: CachedMuseumPriceRow) -> Result<CachedMuseumPrice, AppError> {
    Ok(CachedMuseumPrice {
        id: MuseumPriceId::new(row.id).map_err(AppError::DeserializationError)?,
        museum_id: MuseumId::new(row.museum_id).map_err(AppError::DeserializationError)?,
        ticket_type_id: TicketTypeId::new(row.ticket_type_id)
            .map_err(AppError::DeserializationError)?,
        price: Price::from_cents(row.price_cents).map_err(AppError::DeserializationError)?,
        is_active: row.is_active,
    })
}

pub fn session_from_row(row: CachedSessionRow) -> Result<CachedSession, AppError> {
    let session_date = NaiveDate::parse_from_str(&row.session_date, "%Y-%m-%d").map_err(|err| {
        AppError::DeserializationError(format!("Invalid session date {}: {err}", row.session_date))
    })?;
    Ok(CachedSession {
        id: SessionId::new(row.id).map_err(AppError::DeserializationError)?,
        museum_id: MuseumId::new(row.museum_id).map_err(AppError::DeserializationError)?,
        session_date,
        starts_at: row.starts_at.map(timestamp_to_datetime).transpose()?,
        ends_at: row.ends_at.map(timestamp_to_datetime).transpose()?,
        capacity: row.capacity.map(credits_from_i64).transpose()?,
        is_active: row.is_active,
    })
}

pub fn timestamp_to_datetime(millis: i64) -> Result<DateTime<Utc>, AppError> {
    DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
        AppError::DeserializationError(format!("Invalid timestamp in offline store: {millis}"))
    })
}

pub fn credits_from_i64(value: i64) -> Result<u32, AppError> {
    u32::try_from(value).map_err(|_| {
        AppError::DeserializationError(format!("Credit count out of range: {value}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_credit_counts_are_rejected() {
        assert!(credits_from_i64(-1).is_err());
        assert_eq!(credits_from_i64(4).unwrap(), 4);
    }

    #[test]
    fn session_row_with_bad_date_fails() {
        let row = CachedSessionRow {
            id: "s1".into(),
            museum_id: "m1".into(),
            session_date: "yesterday".into(),
            starts_at: None,
            ends_at: None,
            capacity: Some(20),
            is_active: true,
        };
        assert!(matches!(
            session_from_row(row),
            Err(AppError::DeserializationError(_))
        ));
    }
}
