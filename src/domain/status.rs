//! Order State Machine
//!
//! Call-center attempts and callbacks move freely among themselves; once an
//! order reaches `delivered`, `returned` or `cancelled` it is sticky. Carrier
//! pushes may arrive late, twice, or out of order, so leaving a terminal state
//! is reported as [`Transition::Unchanged`] rather than an error.
//!
//! ```text
//!   attempt-1 <-> attempt-2 <-> attempt-3 <-> callback-requested <-> confirmed
//!       \______________ operator ______________/                      |
//!                       |                                    operator |
//!                       v                                            v
//!                   cancelled          carrier (any state)   delivered / returned
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::OrdersError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    #[default]
    #[serde(rename = "attempt-1")]
    Attempt1,
    #[serde(rename = "attempt-2")]
    Attempt2,
    #[serde(rename = "attempt-3")]
    Attempt3,
    CallbackRequested,
    Confirmed,
    Delivered,
    Returned,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 8] = [
        Self::Attempt1,
        Self::Attempt2,
        Self::Attempt3,
        Self::CallbackRequested,
        Self::Confirmed,
        Self::Delivered,
        Self::Returned,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attempt1 => "attempt-1",
            Self::Attempt2 => "attempt-2",
            Self::Attempt3 => "attempt-3",
            Self::CallbackRequested => "callback-requested",
            Self::Confirmed => "confirmed",
            Self::Delivered => "delivered",
            Self::Returned => "returned",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Returned | Self::Cancelled)
    }

    /// Parses a stored status, accepting the names written by earlier releases
    /// of the back office.
    pub fn from_stored(value: &str) -> Option<Self> {
        let value = value.trim();
        LEGACY_NAMES
            .iter()
            .find(|(name, _)| *name == value)
            .map(|(_, status)| *status)
            .or_else(|| value.parse().ok())
    }

    /// Every spelling a stored row may use for this status.
    pub fn stored_spellings(&self) -> Vec<&'static str> {
        let mut names = vec![self.as_str()];
        names.extend(LEGACY_NAMES.iter().filter(|(_, s)| s == self).map(|(name, _)| *name));
        names
    }
}

const LEGACY_NAMES: [(&str, OrderStatus); 7] = [
    ("pending", OrderStatus::Attempt1),
    ("tentative1", OrderStatus::Attempt1),
    ("tentative2", OrderStatus::Attempt2),
    ("tentative3", OrderStatus::Attempt3),
    ("callback", OrderStatus::CallbackRequested),
    ("livre", OrderStatus::Delivered),
    ("retourne", OrderStatus::Returned),
];

impl FromStr for OrderStatus {
    type Err = OrdersError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| OrdersError::InvalidStatus(s.to_string()))
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Who is asking for the transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
    /// Confirmation or admin console.
    Operator,
    /// Webhook push or polling pull.
    Carrier,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Applied { from: OrderStatus, to: OrderStatus },
    Unchanged,
}

impl Transition {
    pub fn is_applied(&self) -> bool { matches!(self, Self::Applied { .. }) }
}

/// Decides whether `actor` may move an order from `from` to `to`.
pub fn transition(from: OrderStatus, to: OrderStatus, actor: Actor) -> Result<Transition, OrdersError> {
    if from == to || from.is_terminal() {
        return Ok(Transition::Unchanged);
    }
    let allowed = match actor {
        Actor::Carrier => to.is_terminal(),
        Actor::Operator => match to {
            OrderStatus::Delivered | OrderStatus::Returned => from == OrderStatus::Confirmed,
            _ => true,
        },
    };
    if allowed {
        Ok(Transition::Applied { from, to })
    } else {
        Err(OrdersError::IllegalTransition { from, to })
    }
}
