//! Value Objects for orders

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Amount in Algerian dinars. The shop never deals in fractions of a dinar.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);
    pub fn dzd(amount: i64) -> Self { Self(amount) }
    pub fn amount(&self) -> i64 { self.0 }
    pub fn add(&self, other: Money) -> Money { Money(self.0.saturating_add(other.0)) }
    pub fn multiply(&self, qty: u32) -> Money { Money(self.0.saturating_mul(i64::from(qty))) }
    pub fn checked_add(&self, other: Money) -> Option<Money> { self.0.checked_add(other.0).map(Money) }
    pub fn checked_mul(&self, qty: u32) -> Option<Money> { self.0.checked_mul(i64::from(qty)).map(Money) }

    /// Applies a percentage discount, rounding half up to the nearest dinar.
    pub fn discounted(&self, percent: u8) -> Money {
        let keep = i128::from(100u8.saturating_sub(percent));
        let kept = (i128::from(self.0) * keep + 50).div_euclid(100);
        Money(i64::try_from(kept).unwrap_or(self.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{} DA", self.0) }
}

/// Order identifier of the form `CMD-<millis>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

static LAST_ORDER_MILLIS: AtomicI64 = AtomicI64::new(0);

impl OrderId {
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into().trim().to_string();
        if value.is_empty() { None } else { Some(Self(value)) }
    }

    /// Allocates a fresh id. Ids are strictly increasing within the process even
    /// when two checkouts land in the same millisecond.
    pub fn generate() -> Self {
        let now = Utc::now().timestamp_millis();
        let mut last = LAST_ORDER_MILLIS.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match LAST_ORDER_MILLIS.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => return Self(format!("CMD-{next}")),
                Err(actual) => last = actual,
            }
        }
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Six-digit code read out by the customer when the call center phones them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfirmationCode(String);

impl ConfirmationCode {
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into().trim().to_string();
        if value.is_empty() { None } else { Some(Self(value)) }
    }
    pub fn generate() -> Self { Self(rand::random::<u32>().rem_euclid(900_000).saturating_add(100_000).to_string()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

/// Carrier tracking number, normalised to uppercase.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TrackingId(String);

impl TrackingId {
    pub fn new(value: impl AsRef<str>) -> Option<Self> {
        let value = value.as_ref().trim().to_uppercase();
        if value.is_empty() { None } else { Some(Self(value)) }
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for TrackingId {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(&value).ok_or_else(|| "empty tracking id".to_string()) }
}

impl From<TrackingId> for String {
    fn from(t: TrackingId) -> Self { t.0 }
}

impl fmt::Display for TrackingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Wilaya code, e.g. `16` for Alger.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneCode(String);

impl ZoneCode {
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into().trim().to_string();
        if value.is_empty() { return None; }
        // "9" and "09" name the same wilaya
        if value.len() == 1 && value.chars().all(|c| c.is_ascii_digit()) { return Some(Self(format!("0{value}"))); }
        Some(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for ZoneCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryMethod {
    #[default]
    #[serde(alias = "domicile")]
    Home,
    /// Pickup at a carrier stop-desk.
    #[serde(alias = "yalidine", alias = "stopdesk")]
    CarrierOffice,
}

impl DeliveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Home => "home", Self::CarrierOffice => "carrier-office" }
    }
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "home" | "domicile" => Some(Self::Home),
            "carrier-office" | "yalidine" | "stopdesk" => Some(Self::CarrierOffice),
            _ => None,
        }
    }
}

impl fmt::Display for DeliveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}
