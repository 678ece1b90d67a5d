//! Paginated snapshot loading.

use crate::error::{BackfillError, BackfillResult};
use chrono::Utc;
use dexwatch_core::{currency_to_ledger_hex, CurrencyLeg, TrackedPair, XRP};
use dexwatch_feed::EventParser;
use dexwatch_store::OfferDb;
use dexwatch_telemetry::metrics;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Snapshot API configuration.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Ledger JSON-RPC HTTP endpoint.
    pub url: String,
    /// Page size for `book_offers` requests.
    pub page_limit: u32,
    /// Per-request timeout.
    pub request_timeout_ms: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            page_limit: 200,
            request_timeout_ms: 10_000,
        }
    }
}

/// What one backfill run accomplished.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BackfillReport {
    pub offers_upserted: u64,
    pub pairs_completed: usize,
    pub pairs_failed: usize,
}

/// One page of resting orders plus the continuation marker, if any.
struct SnapshotPage {
    offers: Vec<Value>,
    marker: Option<Value>,
}

/// The backfill loader.
pub struct BackfillLoader {
    client: Client,
    config: SnapshotConfig,
    db: Arc<OfferDb>,
    parser: EventParser,
}

impl BackfillLoader {
    pub fn new(config: SnapshotConfig, db: Arc<OfferDb>) -> BackfillResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self {
            client,
            config,
            db,
            parser: EventParser::new(),
        })
    }

    /// Backfill every tracked pair, sequentially.
    ///
    /// Per-pair failures are contained: the pair is abandoned, logged and
    /// counted, and the run continues. The report is therefore always
    /// produced.
    pub async fn run(&self, pairs: &[TrackedPair]) -> BackfillReport {
        info!(pairs = pairs.len(), "starting backfill of resting offers");
        let mut report = BackfillReport::default();

        for pair in pairs {
            match self.backfill_pair(pair).await {
                Ok(count) => {
                    report.offers_upserted += count;
                    report.pairs_completed += 1;
                    debug!(pair = %pair, offers = count, "pair backfill complete");
                }
                Err(e) => {
                    report.pairs_failed += 1;
                    warn!(pair = %pair, error = %e, "pair backfill aborted");
                }
            }
        }

        info!(
            offers = report.offers_upserted,
            completed = report.pairs_completed,
            failed = report.pairs_failed,
            "backfill complete"
        );
        report
    }

    /// Page through one pair's book until no marker is returned.
    async fn backfill_pair(&self, pair: &TrackedPair) -> BackfillResult<u64> {
        let mut marker: Option<Value> = None;
        let mut page_num = 1u32;
        let mut upserted = 0u64;

        loop {
            let page = self.fetch_page(pair, marker.take()).await?;
            debug!(pair = %pair, page = page_num, offers = page.offers.len(), "snapshot page");

            for raw_offer in &page.offers {
                let event = match self.parser.parse_resting_offer(raw_offer) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(pair = %pair, error = %e, "skipping malformed resting offer");
                        continue;
                    }
                };
                match self.db.upsert_offer(&event.to_offer(Utc::now())) {
                    Ok(()) => {
                        upserted += 1;
                        metrics::BACKFILL_OFFERS_TOTAL.inc();
                    }
                    Err(e) => {
                        metrics::STORE_ERRORS_TOTAL
                            .with_label_values(&["backfill_upsert"])
                            .inc();
                        warn!(offer_id = %event.offer_id, error = %e, "backfill upsert failed");
                    }
                }
            }

            match page.marker {
                Some(m) => {
                    marker = Some(m);
                    page_num += 1;
                }
                None => break,
            }
        }

        Ok(upserted)
    }

    async fn fetch_page(
        &self,
        pair: &TrackedPair,
        marker: Option<Value>,
    ) -> BackfillResult<SnapshotPage> {
        let mut params = json!({
            "taker_gets": leg_to_wire(&pair.taker_gets),
            "taker_pays": leg_to_wire(&pair.taker_pays),
            "limit": self.config.page_limit,
        });
        if let Some(marker) = marker {
            params["marker"] = marker;
        }
        let body = json!({ "method": "book_offers", "params": [params] });

        let response = self.client.post(&self.config.url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackfillError::MalformedPage(format!("http status {status}")));
        }

        let payload: Value = response.json().await?;
        parse_page(&payload)
    }
}

/// Validate and dissect one `book_offers` response body.
///
/// A missing or non-list `offers` field marks the page malformed, which
/// aborts the pair (never the process).
fn parse_page(payload: &Value) -> BackfillResult<SnapshotPage> {
    let result = payload
        .get("result")
        .ok_or_else(|| BackfillError::MalformedPage("no result object".to_string()))?;

    let offers = result
        .get("offers")
        .and_then(Value::as_array)
        .ok_or_else(|| BackfillError::MalformedPage("offers missing or not a list".to_string()))?
        .clone();

    let marker = result.get("marker").filter(|m| !m.is_null()).cloned();

    Ok(SnapshotPage { offers, marker })
}

/// Wire form of one currency leg for the snapshot request.
fn leg_to_wire(leg: &CurrencyLeg) -> Value {
    if leg.currency == XRP {
        return json!({ "currency": XRP });
    }
    let mut wire = json!({ "currency": currency_to_ledger_hex(&leg.currency) });
    if let Some(issuer) = &leg.issuer {
        wire["issuer"] = json!(issuer);
    }
    wire
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page_happy_path() {
        let payload = json!({
            "result": {
                "offers": [ { "index": "A" }, { "index": "B" } ],
                "marker": "page-2"
            }
        });
        let page = parse_page(&payload).unwrap();
        assert_eq!(page.offers.len(), 2);
        assert_eq!(page.marker, Some(json!("page-2")));
    }

    #[test]
    fn test_parse_page_terminal() {
        let payload = json!({ "result": { "offers": [] } });
        let page = parse_page(&payload).unwrap();
        assert!(page.offers.is_empty());
        assert!(page.marker.is_none());
    }

    #[test]
    fn test_parse_page_null_marker_is_terminal() {
        let payload = json!({ "result": { "offers": [], "marker": null } });
        assert!(parse_page(&payload).unwrap().marker.is_none());
    }

    #[test]
    fn test_parse_page_malformed() {
        // offers as a non-list
        let payload = json!({ "result": { "offers": "oops" } });
        assert!(matches!(
            parse_page(&payload),
            Err(BackfillError::MalformedPage(_))
        ));

        // error response with no result at all
        let payload = json!({ "error": "tooBusy" });
        assert!(parse_page(&payload).is_err());
    }

    #[test]
    fn test_leg_to_wire() {
        let xrp = leg_to_wire(&CurrencyLeg::new("XRP", None));
        assert_eq!(xrp, json!({ "currency": "XRP" }));

        let usd = leg_to_wire(&CurrencyLeg::new("USD", Some("rIssuer".to_string())));
        assert_eq!(usd["issuer"], "rIssuer");
        assert_eq!(usd["currency"].as_str().unwrap().len(), 40);
    }
}
