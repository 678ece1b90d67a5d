//! Offer leg amounts.

use crate::currency::XRP;
use crate::pair::CurrencyLeg;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One leg of an offer: a currency, its issuer, and a decimal amount.
///
/// XRP legs have no issuer. All values are exact decimals; drops have
/// already been converted by the time an amount is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyAmount {
    pub currency: String,
    pub issuer: Option<String>,
    pub value: Decimal,
}

impl CurrencyAmount {
    /// An XRP amount (no issuer).
    pub fn xrp(value: Decimal) -> Self {
        Self {
            currency: XRP.to_string(),
            issuer: None,
            value,
        }
    }

    /// An issued-currency amount.
    pub fn issued(currency: impl Into<String>, issuer: impl Into<String>, value: Decimal) -> Self {
        Self {
            currency: currency.into(),
            issuer: Some(issuer.into()),
            value,
        }
    }

    pub fn is_xrp(&self) -> bool {
        self.currency == XRP
    }

    /// The (currency, issuer) identity of this leg, without the amount.
    pub fn leg(&self) -> CurrencyLeg {
        CurrencyLeg {
            currency: self.currency.clone(),
            issuer: self.issuer.clone(),
        }
    }
}

impl fmt::Display for CurrencyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.issuer {
            Some(issuer) => write!(f, "{} {}.{}", self.value, self.currency, issuer),
            None => write!(f, "{} {}", self.value, self.currency),
        }
    }
}
