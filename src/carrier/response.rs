//! Carrier response shapes.
//!
//! The carrier has answered parcel creation and status queries in several
//! layouts over time. Each layout is a variant here and is tried in a fixed
//! order; the first one that yields a usable value wins.

use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::carrier::{CarrierError, StopDeskInfo};
use crate::domain::value_objects::TrackingId;

const TRACKING_FIELDS: [&str; 2] = ["tracking", "tracking_number"];
const STATUS_TRACKING_FIELDS: [&str; 3] = ["tracking", "tracking_number", "id"];
const STATUS_FIELDS: [&str; 4] = ["status", "state", "etat", "last_status"];
const MESSAGE_FIELDS: [&str; 3] = ["error", "message", "detail"];
const ENVELOPE_FIELDS: [&str; 2] = ["data", "parcels"];

/// Where a parcel-creation answer keeps the created parcel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreationShape {
    /// `{"data": {"<order id>": {...}}}` or `{"<order id>": {...}}`
    ByOrderKey,
    /// `{"data": [{...}]}` or `[{...}]`
    Positional,
    /// `{"tracking": "..."}`
    Flat,
}

impl CreationShape {
    pub const ORDER: [CreationShape; 3] = [Self::ByOrderKey, Self::Positional, Self::Flat];

    fn locate<'a>(&self, body: &'a Value, order_id: &str) -> Option<&'a Value> {
        let data = body.get("data").unwrap_or(body);
        match self {
            Self::ByOrderKey => data.get(order_id).or_else(|| body.get(order_id)),
            Self::Positional => data.as_array().and_then(|a| a.first()),
            Self::Flat => Some(body),
        }
    }
}

/// Extracts the tracking number from a parcel-creation answer.
pub fn parse_creation(body: &Value, order_id: &str) -> Result<TrackingId, CarrierError> {
    let mut message = None;
    for shape in CreationShape::ORDER {
        let Some(parcel) = shape.locate(body, order_id) else { continue };
        if let Some(tracking) = string_field(parcel, &TRACKING_FIELDS).and_then(TrackingId::new) {
            return Ok(tracking);
        }
        message = message.or_else(|| error_message(parcel));
    }
    Err(CarrierError::NoTrackingReturned(
        message.or_else(|| error_message(body)).unwrap_or_else(|| "response carried no tracking field".to_string()),
    ))
}

/// How a status answer lists parcels.
#[derive(Debug)]
pub enum StatusShape<'a> {
    List(&'a [Value]),
    Enveloped(&'a [Value]),
    Keyed(&'a Map<String, Value>),
}

impl<'a> StatusShape<'a> {
    pub fn of(body: &'a Value) -> Option<Self> {
        if let Some(list) = body.as_array() {
            return Some(Self::List(list.as_slice()));
        }
        let map = body.as_object()?;
        ENVELOPE_FIELDS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
            .map(|list| Self::Enveloped(list.as_slice()))
            .or(Some(Self::Keyed(map)))
    }

    fn entries(&self) -> Vec<(TrackingId, String)> {
        match self {
            Self::List(list) | Self::Enveloped(list) => list
                .iter()
                .filter_map(|entry| {
                    let tracking = string_field(entry, &STATUS_TRACKING_FIELDS).and_then(TrackingId::new)?;
                    Some((tracking, string_field(entry, &STATUS_FIELDS)?))
                })
                .collect(),
            Self::Keyed(map) => map
                .iter()
                .filter_map(|(key, entry)| {
                    let tracking = TrackingId::new(key)?;
                    let status = match entry {
                        Value::String(s) => Some(s.trim().to_string()),
                        other => string_field(other, &STATUS_FIELDS),
                    }?;
                    (!status.is_empty()).then_some((tracking, status))
                })
                .collect(),
        }
    }
}

/// Raw status per tracking number. Entries missing either half are dropped.
pub fn parse_statuses(body: &Value) -> HashMap<TrackingId, String> {
    StatusShape::of(body).map(|shape| shape.entries().into_iter().collect()).unwrap_or_default()
}

pub fn parse_stop_desks(body: &Value) -> Vec<StopDeskInfo> {
    let list = body.as_array().or_else(|| body.get("data").and_then(Value::as_array));
    list.into_iter()
        .flatten()
        .filter_map(|entry| {
            Some(StopDeskInfo {
                id: string_field(entry, &["center_id", "id"])?,
                name: string_field(entry, &["name"])?,
                address: string_field(entry, &["address"]),
                zone: string_field(entry, &["wilaya_name", "commune_name"]),
            })
        })
        .collect()
}

/// Human-readable reason carried by an error answer, if any.
pub fn error_message(body: &Value) -> Option<String> {
    MESSAGE_FIELDS.iter().find_map(|key| match body.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(inner) => inner.get("message").and_then(Value::as_str).map(str::to_string),
        _ => None,
    })
}

/// First non-empty field among `names`; numbers are accepted as text.
fn string_field(value: &Value, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| match value.get(*name)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tracking(body: Value) -> Result<TrackingId, CarrierError> { parse_creation(&body, "CMD-1") }

    #[test]
    fn test_creation_keyed_by_order_id() {
        let body = json!({"data": {"CMD-1": {"success": true, "tracking": "yal-abc123"}}});
        assert_eq!(tracking(body).unwrap().as_str(), "YAL-ABC123");
        assert_eq!(tracking(json!({"CMD-1": {"tracking_number": "yal-9"}})).unwrap().as_str(), "YAL-9");
    }

    #[test]
    fn test_creation_positional_and_flat() {
        assert_eq!(tracking(json!({"data": [{"tracking": "yal-1"}]})).unwrap().as_str(), "YAL-1");
        assert_eq!(tracking(json!([{"tracking": "yal-2"}])).unwrap().as_str(), "YAL-2");
        assert_eq!(tracking(json!({"tracking_number": "yal-3"})).unwrap().as_str(), "YAL-3");
    }

    #[test]
    fn test_creation_without_tracking_keeps_carrier_message() {
        let body = json!({"data": {"CMD-1": {"success": false, "message": "wilaya inconnue"}}});
        assert!(matches!(tracking(body), Err(CarrierError::NoTrackingReturned(m)) if m == "wilaya inconnue"));
        assert!(matches!(tracking(json!({"ok": true})), Err(CarrierError::NoTrackingReturned(_))));
        assert!(tracking(json!({"tracking": "   "})).is_err());
    }

    #[test]
    fn test_statuses_from_list_and_envelope() {
        let list = json!([{"tracking": "yal-1", "last_status": "Livré"}, {"tracking": "yal-2"}]);
        let map = parse_statuses(&list);
        assert_eq!(map.len(), 1);
        assert_eq!(map[&TrackingId::new("YAL-1").unwrap()], "Livré");

        let env = json!({"has_more": false, "data": [{"tracking_number": "yal-3", "status": "Retourné"}]});
        assert_eq!(parse_statuses(&env)[&TrackingId::new("yal-3").unwrap()], "Retourné");
        let env = json!({"parcels": [{"id": "yal-4", "etat": "En cours"}]});
        assert_eq!(parse_statuses(&env)[&TrackingId::new("yal-4").unwrap()], "En cours");
    }

    #[test]
    fn test_statuses_keyed_by_tracking() {
        let body = json!({"yal-1": {"state": "Annulé"}, "yal-2": "Livré", "yal-3": 12});
        let map = parse_statuses(&body);
        assert_eq!(map.len(), 2);
        assert_eq!(map[&TrackingId::new("YAL-2").unwrap()], "Livré");
    }

    #[test]
    fn test_statuses_unparseable_body_is_empty() {
        assert!(parse_statuses(&json!("nope")).is_empty());
    }

    #[test]
    fn test_stop_desks() {
        let body = json!({"data": [
            {"center_id": 161201, "name": "Bab Ezzouar", "address": "Cité 5 juillet", "wilaya_name": "Alger"},
            {"name": "missing id"}
        ]});
        let desks = parse_stop_desks(&body);
        assert_eq!(desks.len(), 1);
        assert_eq!(desks[0].id, "161201");
        assert_eq!(desks[0].zone.as_deref(), Some("Alger"));
    }

    #[test]
    fn test_error_message_nested() {
        assert_eq!(error_message(&json!({"error": {"message": "bad token"}})).as_deref(), Some("bad token"));
        assert_eq!(error_message(&json!({"detail": "quota"})).as_deref(), Some("quota"));
    }
}
