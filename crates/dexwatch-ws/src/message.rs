//! Wire messages: subscribe commands out, stream notifications in.

use dexwatch_core::{currency_to_ledger_hex, CurrencyLeg, TrackedPair, XRP};
use serde::Serialize;
use serde_json::Value;

/// A currency reference in the ledger's wire form: literal `XRP` or
/// 40-hex-digit code plus issuer.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerCurrency {
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
}

impl From<&CurrencyLeg> for LedgerCurrency {
    fn from(leg: &CurrencyLeg) -> Self {
        if leg.currency == XRP {
            Self {
                currency: XRP.to_string(),
                issuer: None,
            }
        } else {
            Self {
                currency: currency_to_ledger_hex(&leg.currency),
                issuer: leg.issuer.clone(),
            }
        }
    }
}

/// One order-book descriptor in a subscribe command.
#[derive(Debug, Clone, Serialize)]
pub struct BookDescriptor {
    pub taker_gets: LedgerCurrency,
    pub taker_pays: LedgerCurrency,
    pub snapshot: bool,
    pub both: bool,
}

impl From<&TrackedPair> for BookDescriptor {
    fn from(pair: &TrackedPair) -> Self {
        Self {
            taker_gets: (&pair.taker_gets).into(),
            taker_pays: (&pair.taker_pays).into(),
            snapshot: true,
            both: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct SubscribeRequest {
    id: u64,
    command: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    streams: Option<Vec<&'static str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    books: Option<Vec<BookDescriptor>>,
}

/// Subscribe command for the global transaction stream.
pub fn subscribe_stream_request(id: u64) -> String {
    serde_json::to_string(&SubscribeRequest {
        id,
        command: "subscribe",
        streams: Some(vec!["transactions"]),
        books: None,
    })
    .expect("static request serializes")
}

/// Subscribe command for one or more order books.
pub fn subscribe_books_request(id: u64, pairs: &[TrackedPair]) -> String {
    serde_json::to_string(&SubscribeRequest {
        id,
        command: "subscribe",
        streams: None,
        books: Some(pairs.iter().map(BookDescriptor::from).collect()),
    })
    .expect("static request serializes")
}

/// Classified inbound message.
#[derive(Debug, Clone)]
pub enum LedgerMessage {
    /// A transaction notification (may carry offer mutations in its meta).
    Transaction(Value),
    /// Ledger close notice.
    LedgerClosed { ledger_index: u64 },
    /// Response to a request we sent, correlated by id.
    Response {
        id: u64,
        success: bool,
        result: Value,
    },
    /// Anything else (server info, unsolicited notices).
    Other(Value),
}

impl LedgerMessage {
    /// Classify one inbound JSON message.
    pub fn classify(value: Value) -> Self {
        match value.get("type").and_then(Value::as_str) {
            Some("transaction") => return Self::Transaction(value),
            Some("ledgerClosed") => {
                let ledger_index = value
                    .get("ledger_index")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                return Self::LedgerClosed { ledger_index };
            }
            Some("response") | None => {}
            Some(_) => return Self::Other(value),
        }

        if let Some(id) = value.get("id").and_then(Value::as_u64) {
            let success = value.get("status").and_then(Value::as_str) == Some("success");
            let result = value.get("result").cloned().unwrap_or(Value::Null);
            return Self::Response {
                id,
                success,
                result,
            };
        }

        Self::Other(value)
    }
}
