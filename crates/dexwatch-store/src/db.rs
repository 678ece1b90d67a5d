//! Offer database: schema, upserts, deletes and reads.

use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use dexwatch_core::{CurrencyAmount, CurrencyLeg, Offer, OfferEvent, OfferEventKind, TrackedPair};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS offers (
    offer_id TEXT PRIMARY KEY,
    account TEXT,
    taker_gets_currency TEXT NOT NULL,
    taker_gets_issuer TEXT,
    taker_gets_value TEXT NOT NULL,
    taker_pays_currency TEXT NOT NULL,
    taker_pays_issuer TEXT,
    taker_pays_value TEXT NOT NULL,
    flags INTEGER,
    expiration TEXT,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_offers_account ON offers(account);
CREATE INDEX IF NOT EXISTS idx_offers_pair
    ON offers(taker_gets_currency, taker_pays_currency);

CREATE TABLE IF NOT EXISTS offer_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    offer_id TEXT NOT NULL,
    account TEXT,
    taker_gets_currency TEXT NOT NULL,
    taker_gets_issuer TEXT,
    taker_gets_value TEXT NOT NULL,
    taker_pays_currency TEXT NOT NULL,
    taker_pays_issuer TEXT,
    taker_pays_value TEXT NOT NULL,
    event_type TEXT NOT NULL,
    event_time TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_history_offer ON offer_history(offer_id, id);
CREATE INDEX IF NOT EXISTS idx_history_time ON offer_history(event_time);

CREATE TABLE IF NOT EXISTS tracked_pairs (
    taker_gets_currency TEXT NOT NULL,
    taker_gets_issuer TEXT,
    taker_pays_currency TEXT NOT NULL,
    taker_pays_issuer TEXT,
    active INTEGER NOT NULL DEFAULT 1
);
"#;

/// Filter for live-offer reads.
#[derive(Debug, Clone, Default)]
pub struct OfferFilter {
    pub account: Option<String>,
    pub taker_gets_currency: Option<String>,
    pub taker_pays_currency: Option<String>,
    /// Sort column; anything outside the whitelist falls back to
    /// `updated_at`.
    pub sort: Option<String>,
    pub ascending: bool,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Filter for history reads.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub offer_id: Option<String>,
    pub account: Option<String>,
    pub event_type: Option<String>,
    /// Sort column; anything outside the whitelist falls back to
    /// `event_time`.
    pub sort: Option<String>,
    pub ascending: bool,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

const DEFAULT_READ_LIMIT: u32 = 20;

/// Sort columns are interpolated into SQL, so they pass a whitelist; user
/// input never reaches the statement text.
fn sort_column<'a>(requested: Option<&'a str>, allowed: &[&'a str], fallback: &'a str) -> &'a str {
    match requested {
        Some(col) if allowed.contains(&col) => col,
        _ => fallback,
    }
}

/// The offer database.
///
/// One connection behind a mutex: the reconciliation pipeline is the only
/// writer, reads come from the facade, and SQLite serializes the rest.
pub struct OfferDb {
    conn: Mutex<Connection>,
}

impl OfferDb {
    /// Open (or create) the database at `path` and initialize the schema.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %path.display(), "offer store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (tests).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Cheap connectivity probe for health reporting.
    pub fn ping(&self) -> bool {
        self.conn
            .lock()
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }

    /// Insert or update the live row for an offer, last writer wins.
    ///
    /// Overwrites every field and `updated_at`; both live reconciliation
    /// and backfill go through this, which is what makes them idempotent
    /// against each other.
    pub fn upsert_offer(&self, offer: &Offer) -> StoreResult<()> {
        self.conn.lock().execute(
            "INSERT INTO offers (
                offer_id, account, taker_gets_currency, taker_gets_issuer, taker_gets_value,
                taker_pays_currency, taker_pays_issuer, taker_pays_value, flags, expiration,
                updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(offer_id) DO UPDATE SET
                account = excluded.account,
                taker_gets_currency = excluded.taker_gets_currency,
                taker_gets_issuer = excluded.taker_gets_issuer,
                taker_gets_value = excluded.taker_gets_value,
                taker_pays_currency = excluded.taker_pays_currency,
                taker_pays_issuer = excluded.taker_pays_issuer,
                taker_pays_value = excluded.taker_pays_value,
                flags = excluded.flags,
                expiration = excluded.expiration,
                updated_at = excluded.updated_at",
            params![
                offer.offer_id,
                offer.account,
                offer.taker_gets.currency,
                offer.taker_gets.issuer,
                offer.taker_gets.value.to_string(),
                offer.taker_pays.currency,
                offer.taker_pays.issuer,
                offer.taker_pays.value.to_string(),
                offer.flags,
                offer.expiration.map(|t| t.to_rfc3339()),
                offer.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Remove the live row for an offer.
    ///
    /// Returns whether a row existed. Absence is not an error: the row may
    /// never have been seen (cancelled before backfill, untracked at the
    /// time, etc.).
    pub fn delete_offer(&self, offer_id: &str) -> StoreResult<bool> {
        let affected = self
            .conn
            .lock()
            .execute("DELETE FROM offers WHERE offer_id = ?1", params![offer_id])?;
        Ok(affected > 0)
    }

    /// Append one immutable history row. Insert-only, never updated.
    pub fn append_event(&self, event: &OfferEvent) -> StoreResult<()> {
        self.conn.lock().execute(
            "INSERT INTO offer_history (
                offer_id, account, taker_gets_currency, taker_gets_issuer, taker_gets_value,
                taker_pays_currency, taker_pays_issuer, taker_pays_value, event_type, event_time
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                event.offer_id,
                event.account,
                event.taker_gets.currency,
                event.taker_gets.issuer,
                event.taker_gets.value.to_string(),
                event.taker_pays.currency,
                event.taker_pays.issuer,
                event.taker_pays.value.to_string(),
                event.kind.as_str(),
                event.event_time.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Load the active tracked pairs.
    pub fn load_tracked_pairs(&self) -> StoreResult<Vec<TrackedPair>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT taker_gets_currency, taker_gets_issuer,
                    taker_pays_currency, taker_pays_issuer
             FROM tracked_pairs WHERE active = 1",
        )?;
        let pairs = stmt
            .query_map([], |row| {
                Ok(TrackedPair::new(
                    CurrencyLeg::new(row.get::<_, String>(0)?, row.get(1)?),
                    CurrencyLeg::new(row.get::<_, String>(2)?, row.get(3)?),
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pairs)
    }

    /// Insert a tracked pair (seeding and tests).
    pub fn add_tracked_pair(&self, pair: &TrackedPair) -> StoreResult<()> {
        self.conn.lock().execute(
            "INSERT INTO tracked_pairs (
                taker_gets_currency, taker_gets_issuer,
                taker_pays_currency, taker_pays_issuer, active
             ) VALUES (?1, ?2, ?3, ?4, 1)",
            params![
                pair.taker_gets.currency,
                pair.taker_gets.issuer,
                pair.taker_pays.currency,
                pair.taker_pays.issuer,
            ],
        )?;
        Ok(())
    }

    /// Mark a tracked pair inactive.
    pub fn deactivate_tracked_pair(&self, pair: &TrackedPair) -> StoreResult<bool> {
        let affected = self.conn.lock().execute(
            "UPDATE tracked_pairs SET active = 0
             WHERE taker_gets_currency = ?1
               AND taker_gets_issuer IS ?2
               AND taker_pays_currency = ?3
               AND taker_pays_issuer IS ?4",
            params![
                pair.taker_gets.currency,
                pair.taker_gets.issuer,
                pair.taker_pays.currency,
                pair.taker_pays.issuer,
            ],
        )?;
        Ok(affected > 0)
    }

    /// List live offers, newest first.
    pub fn list_offers(&self, filter: &OfferFilter) -> StoreResult<Vec<Offer>> {
        let mut sql = String::from(
            "SELECT offer_id, account, taker_gets_currency, taker_gets_issuer, taker_gets_value,
                    taker_pays_currency, taker_pays_issuer, taker_pays_value, flags, expiration,
                    updated_at
             FROM offers",
        );
        let mut clauses = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(account) = &filter.account {
            values.push(Box::new(account.clone()));
            clauses.push(format!("account = ?{}", values.len()));
        }
        if let Some(currency) = &filter.taker_gets_currency {
            values.push(Box::new(currency.clone()));
            clauses.push(format!("taker_gets_currency = ?{}", values.len()));
        }
        if let Some(currency) = &filter.taker_pays_currency {
            values.push(Box::new(currency.clone()));
            clauses.push(format!("taker_pays_currency = ?{}", values.len()));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        let column = sort_column(
            filter.sort.as_deref(),
            &[
                "updated_at",
                "account",
                "taker_gets_currency",
                "taker_pays_currency",
            ],
            "updated_at",
        );
        let direction = if filter.ascending { "ASC" } else { "DESC" };
        sql.push_str(&format!(" ORDER BY {column} {direction} LIMIT ? OFFSET ?"));

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let mut params_vec: Vec<&dyn rusqlite::ToSql> =
            values.iter().map(|v| v.as_ref()).collect();
        let limit = filter.limit.unwrap_or(DEFAULT_READ_LIMIT);
        let offset = filter.offset.unwrap_or(0);
        params_vec.push(&limit);
        params_vec.push(&offset);

        let rows = stmt.query_map(params_vec.as_slice(), offer_from_row)?;
        let mut offers = Vec::new();
        for row in rows {
            offers.push(row??);
        }
        Ok(offers)
    }

    /// List history rows, newest first (ties broken by insertion id).
    pub fn list_history(&self, filter: &HistoryFilter) -> StoreResult<Vec<OfferEvent>> {
        let mut sql = String::from(
            "SELECT offer_id, account, taker_gets_currency, taker_gets_issuer, taker_gets_value,
                    taker_pays_currency, taker_pays_issuer, taker_pays_value, event_type,
                    event_time
             FROM offer_history",
        );
        let mut clauses = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(offer_id) = &filter.offer_id {
            values.push(Box::new(offer_id.clone()));
            clauses.push(format!("offer_id = ?{}", values.len()));
        }
        if let Some(account) = &filter.account {
            values.push(Box::new(account.clone()));
            clauses.push(format!("account = ?{}", values.len()));
        }
        if let Some(event_type) = &filter.event_type {
            values.push(Box::new(event_type.clone()));
            clauses.push(format!("event_type = ?{}", values.len()));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        let column = sort_column(
            filter.sort.as_deref(),
            &["event_time", "event_type", "account", "offer_id"],
            "event_time",
        );
        let direction = if filter.ascending { "ASC" } else { "DESC" };
        sql.push_str(&format!(
            " ORDER BY {column} {direction}, id {direction} LIMIT ? OFFSET ?"
        ));

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let mut params_vec: Vec<&dyn rusqlite::ToSql> =
            values.iter().map(|v| v.as_ref()).collect();
        let limit = filter.limit.unwrap_or(DEFAULT_READ_LIMIT);
        let offset = filter.offset.unwrap_or(0);
        params_vec.push(&limit);
        params_vec.push(&offset);

        let rows = stmt.query_map(params_vec.as_slice(), event_from_row)?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row??);
        }
        Ok(events)
    }

    /// Ordered history for one offer, oldest first.
    pub fn history_for_offer(&self, offer_id: &str) -> StoreResult<Vec<OfferEvent>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT offer_id, account, taker_gets_currency, taker_gets_issuer, taker_gets_value,
                    taker_pays_currency, taker_pays_issuer, taker_pays_value, event_type,
                    event_time
             FROM offer_history WHERE offer_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![offer_id], event_from_row)?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row??);
        }
        Ok(events)
    }

    /// Number of live offers.
    pub fn offer_count(&self) -> StoreResult<u64> {
        let count: i64 =
            self.conn
                .lock()
                .query_row("SELECT COUNT(*) FROM offers", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Number of history rows.
    pub fn history_count(&self) -> StoreResult<u64> {
        let count: i64 =
            self.conn
                .lock()
                .query_row("SELECT COUNT(*) FROM offer_history", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

type RowResult<T> = rusqlite::Result<StoreResult<T>>;

fn parse_value(raw: &str) -> StoreResult<Decimal> {
    Decimal::from_str(raw).map_err(|_| StoreError::MalformedRow(format!("bad decimal: {raw}")))
}

fn parse_time(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| StoreError::MalformedRow(format!("bad timestamp: {raw}")))
}

fn amount_from_columns(
    currency: String,
    issuer: Option<String>,
    value: &str,
) -> StoreResult<CurrencyAmount> {
    Ok(CurrencyAmount {
        currency,
        issuer,
        value: parse_value(value)?,
    })
}

/// Split per the query_map contract: sqlite column errors surface as the
/// outer error, value-parse errors as the inner one.
fn offer_from_row(row: &Row<'_>) -> RowResult<Offer> {
    let offer_id: String = row.get(0)?;
    let account: Option<String> = row.get(1)?;
    let gets = amount_from_columns(row.get(2)?, row.get(3)?, &row.get::<_, String>(4)?);
    let pays = amount_from_columns(row.get(5)?, row.get(6)?, &row.get::<_, String>(7)?);
    let flags: Option<u32> = row.get(8)?;
    let expiration: Option<String> = row.get(9)?;
    let updated_at: String = row.get(10)?;

    Ok(build_offer(
        offer_id, account, gets, pays, flags, expiration, updated_at,
    ))
}

fn build_offer(
    offer_id: String,
    account: Option<String>,
    gets: StoreResult<CurrencyAmount>,
    pays: StoreResult<CurrencyAmount>,
    flags: Option<u32>,
    expiration: Option<String>,
    updated_at: String,
) -> StoreResult<Offer> {
    Ok(Offer {
        offer_id,
        account,
        taker_gets: gets?,
        taker_pays: pays?,
        flags,
        expiration: expiration.as_deref().map(parse_time).transpose()?,
        updated_at: parse_time(&updated_at)?,
    })
}

fn event_from_row(row: &Row<'_>) -> RowResult<OfferEvent> {
    let offer_id: String = row.get(0)?;
    let account: Option<String> = row.get(1)?;
    let gets = amount_from_columns(row.get(2)?, row.get(3)?, &row.get::<_, String>(4)?);
    let pays = amount_from_columns(row.get(5)?, row.get(6)?, &row.get::<_, String>(7)?);
    let kind: String = row.get(8)?;
    let event_time: String = row.get(9)?;

    Ok(build_event(offer_id, account, gets, pays, kind, event_time))
}

fn build_event(
    offer_id: String,
    account: Option<String>,
    gets: StoreResult<CurrencyAmount>,
    pays: StoreResult<CurrencyAmount>,
    kind: String,
    event_time: String,
) -> StoreResult<OfferEvent> {
    Ok(OfferEvent {
        offer_id,
        account,
        taker_gets: gets?,
        taker_pays: pays?,
        kind: OfferEventKind::parse(&kind),
        event_time: parse_time(&event_time)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn offer(id: &str, gets: Decimal, secs: i64) -> Offer {
        Offer {
            offer_id: id.to_string(),
            account: Some("rAccount".to_string()),
            taker_gets: CurrencyAmount::xrp(gets),
            taker_pays: CurrencyAmount::issued("USD", "rIssuer", dec!(50)),
            flags: None,
            expiration: None,
            updated_at: ts(secs),
        }
    }

    fn event(id: &str, kind: OfferEventKind, secs: i64) -> OfferEvent {
        OfferEvent {
            offer_id: id.to_string(),
            account: Some("rAccount".to_string()),
            taker_gets: CurrencyAmount::xrp(dec!(100)),
            taker_pays: CurrencyAmount::issued("USD", "rIssuer", dec!(50)),
            kind,
            event_time: ts(secs),
        }
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let db = OfferDb::open_in_memory().unwrap();
        db.upsert_offer(&offer("A", dec!(100), 0)).unwrap();
        db.upsert_offer(&offer("A", dec!(100), 0)).unwrap();
        assert_eq!(db.offer_count().unwrap(), 1);
    }

    #[test]
    fn test_upsert_last_writer_wins() {
        let db = OfferDb::open_in_memory().unwrap();
        db.upsert_offer(&offer("A", dec!(100), 0)).unwrap();
        db.upsert_offer(&offer("A", dec!(75), 10)).unwrap();

        let offers = db.list_offers(&OfferFilter::default()).unwrap();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].taker_gets.value, dec!(75));
        assert_eq!(offers[0].updated_at, ts(10));
    }

    #[test]
    fn test_delete_missing_is_not_an_error() {
        let db = OfferDb::open_in_memory().unwrap();
        assert!(!db.delete_offer("never-seen").unwrap());
        db.upsert_offer(&offer("A", dec!(100), 0)).unwrap();
        assert!(db.delete_offer("A").unwrap());
        assert_eq!(db.offer_count().unwrap(), 0);
    }

    #[test]
    fn test_history_preserves_order() {
        let db = OfferDb::open_in_memory().unwrap();
        db.append_event(&event("A", OfferEventKind::Created, 0))
            .unwrap();
        db.append_event(&event("A", OfferEventKind::Modified, 1))
            .unwrap();
        db.append_event(&event("A", OfferEventKind::Cancelled, 2))
            .unwrap();

        let history = db.history_for_offer("A").unwrap();
        let kinds: Vec<_> = history.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                OfferEventKind::Created,
                OfferEventKind::Modified,
                OfferEventKind::Cancelled
            ]
        );
    }

    #[test]
    fn test_tracked_pairs_round_trip() {
        let db = OfferDb::open_in_memory().unwrap();
        let pair = TrackedPair::new(
            CurrencyLeg::new("XRP", None),
            CurrencyLeg::new("USD", Some("rIssuer".to_string())),
        );
        db.add_tracked_pair(&pair).unwrap();
        assert_eq!(db.load_tracked_pairs().unwrap(), vec![pair.clone()]);

        assert!(db.deactivate_tracked_pair(&pair).unwrap());
        assert!(db.load_tracked_pairs().unwrap().is_empty());
    }

    #[test]
    fn test_offer_filters() {
        let db = OfferDb::open_in_memory().unwrap();
        db.upsert_offer(&offer("A", dec!(100), 0)).unwrap();
        let mut other = offer("B", dec!(10), 1);
        other.account = Some("rSomeoneElse".to_string());
        db.upsert_offer(&other).unwrap();

        let filtered = db
            .list_offers(&OfferFilter {
                account: Some("rSomeoneElse".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].offer_id, "B");
    }

    #[test]
    fn test_sort_whitelist_and_direction() {
        let db = OfferDb::open_in_memory().unwrap();
        db.upsert_offer(&offer("A", dec!(100), 5)).unwrap();
        db.upsert_offer(&offer("B", dec!(10), 0)).unwrap();

        let ascending = db
            .list_offers(&OfferFilter {
                ascending: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(ascending[0].offer_id, "B");

        // A column outside the whitelist falls back to updated_at DESC
        let bogus = db
            .list_offers(&OfferFilter {
                sort: Some("taker_gets_value; DROP TABLE offers".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(bogus[0].offer_id, "A");
        assert_eq!(db.offer_count().unwrap(), 2);
    }

    #[test]
    fn test_history_filter_by_event_type() {
        let db = OfferDb::open_in_memory().unwrap();
        db.append_event(&event("A", OfferEventKind::Created, 0))
            .unwrap();
        db.append_event(&event("B", OfferEventKind::Cancelled, 1))
            .unwrap();

        let cancelled = db
            .list_history(&HistoryFilter {
                event_type: Some("cancelled".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].offer_id, "B");
    }

    #[test]
    fn test_ping() {
        let db = OfferDb::open_in_memory().unwrap();
        assert!(db.ping());
    }
}
