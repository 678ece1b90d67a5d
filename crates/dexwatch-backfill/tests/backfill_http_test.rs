//! Backfill integration tests against a local snapshot endpoint.
//!
//! Exercises pagination via markers, per-pair abort on a malformed page,
//! and idempotence of repeated runs.

use axum::routing::post;
use axum::{Json, Router};
use dexwatch_backfill::{BackfillLoader, SnapshotConfig};
use dexwatch_core::{normalize_currency, CurrencyLeg, TrackedPair};
use dexwatch_store::{OfferDb, OfferFilter};
use serde_json::{json, Value};
use std::sync::Arc;

/// Serve a canned `book_offers` endpoint:
/// - USD book: two pages joined by a marker (offers U1, U2, then U3)
/// - EUR book: a single page (offer E1)
/// - BAD book: `offers` is not a list
async fn start_snapshot_server() -> String {
    async fn handler(Json(body): Json<Value>) -> Json<Value> {
        let params = &body["params"][0];
        let pays_currency = params["taker_pays"]["currency"].as_str().unwrap_or("");
        let marker = params.get("marker").and_then(Value::as_str);

        let response = match (normalize_currency(pays_currency).as_str(), marker) {
            ("USD", None) => json!({
                "result": {
                    "offers": [resting("U1", "1000000"), resting("U2", "2000000")],
                    "marker": "usd-page-2"
                }
            }),
            ("USD", Some("usd-page-2")) => json!({
                "result": { "offers": [resting("U3", "3000000")] }
            }),
            ("EUR", None) => json!({
                "result": { "offers": [resting("E1", "500000")] }
            }),
            ("BAD", _) => json!({ "result": { "offers": "not-a-list" } }),
            _ => json!({ "result": { "offers": [] } }),
        };
        Json(response)
    }

    fn resting(index: &str, drops: &str) -> Value {
        json!({
            "index": index,
            "Account": "rMaker",
            "TakerGets": drops,
            "TakerPays": {
                "currency": "5553440000000000000000000000000000000000",
                "issuer": "rIssuer",
                "value": "10"
            },
            "Flags": 0
        })
    }

    let app = Router::new().route("/", post(handler));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/")
}

fn pair(currency: &str) -> TrackedPair {
    TrackedPair::new(
        CurrencyLeg::new("XRP", None),
        CurrencyLeg::new(currency, Some("rIssuer".to_string())),
    )
}

fn loader_for(url: &str, db: Arc<OfferDb>) -> BackfillLoader {
    BackfillLoader::new(
        SnapshotConfig {
            url: url.to_string(),
            page_limit: 2,
            ..Default::default()
        },
        db,
    )
    .unwrap()
}

#[tokio::test]
async fn test_backfill_pages_through_markers() {
    let url = start_snapshot_server().await;
    let db = Arc::new(OfferDb::open_in_memory().unwrap());

    let report = loader_for(&url, db.clone()).run(&[pair("USD")]).await;
    assert_eq!(report.offers_upserted, 3);
    assert_eq!(report.pairs_completed, 1);
    assert_eq!(report.pairs_failed, 0);
    assert_eq!(db.offer_count().unwrap(), 3);

    // Backfill is snapshot reconciliation, not a lifecycle event
    assert_eq!(db.history_count().unwrap(), 0);
}

#[tokio::test]
async fn test_backfill_is_idempotent() {
    let url = start_snapshot_server().await;
    let db = Arc::new(OfferDb::open_in_memory().unwrap());
    let loader = loader_for(&url, db.clone());

    loader.run(&[pair("USD")]).await;
    loader.run(&[pair("USD")]).await;

    assert_eq!(db.offer_count().unwrap(), 3);
}

#[tokio::test]
async fn test_malformed_page_aborts_only_that_pair() {
    let url = start_snapshot_server().await;
    let db = Arc::new(OfferDb::open_in_memory().unwrap());

    let report = loader_for(&url, db.clone())
        .run(&[pair("USD"), pair("BAD"), pair("EUR")])
        .await;

    assert_eq!(report.pairs_failed, 1);
    assert_eq!(report.pairs_completed, 2);

    // USD and EUR rows survived the BAD pair's failure
    assert_eq!(db.offer_count().unwrap(), 4);
    let offers = db
        .list_offers(&OfferFilter {
            limit: Some(100),
            ..Default::default()
        })
        .unwrap();
    assert!(offers.iter().any(|o| o.offer_id == "E1"));
}
