//! Core domain types for the dexwatch ledger monitor.
//!
//! This crate provides the types shared by every other crate:
//! - `CurrencyAmount`: one leg of an offer (currency, issuer, decimal value)
//! - `Offer`, `OfferEvent`: live order-book rows and their lifecycle history
//! - `TrackedPair`, `PairKey`: configured pairs and the canonical
//!   order-independent pair identifier
//! - pure normalizers for ledger-native encodings (hex currency codes,
//!   drops, ledger-epoch timestamps)

pub mod amount;
pub mod currency;
pub mod error;
pub mod offer;
pub mod pair;

pub use amount::CurrencyAmount;
pub use currency::{
    currency_to_ledger_hex, drops_to_xrp, ledger_epoch_to_utc, normalize_currency, XRP,
};
pub use error::{CoreError, Result};
pub use offer::{Offer, OfferEvent, OfferEventKind};
pub use pair::{CurrencyLeg, PairKey, TrackedPair};
