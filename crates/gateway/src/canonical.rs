//! Canonical request bytes.
//!
//! The bytes produced here are both the input to the signer and the body
//! sent to the remote endpoint, so the remote side can verify the
//! `DigitalSignature` header against exactly what it received.

use axum::body::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::GatewayError;

/// Canonical form of an empty or absent body.
pub const EMPTY_BODY: &[u8] = b"{}";

/// Identifying fields a caller submits for a signed request.
///
/// Field order here is the order on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityRequest {
    #[serde(rename = "MachineName")]
    pub machine_name: String,
    #[serde(rename = "UserName")]
    pub user_name: String,
    #[serde(rename = "TimeStamp", with = "utc_timestamp")]
    pub time_stamp: DateTime<Utc>,
}

/// A decoded caller payload.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayRequest {
    Identity(IdentityRequest),
    /// Any other JSON document, passed through after canonicalization.
    Raw(Value),
    Empty,
}

impl GatewayRequest {
    /// Classifies an inbound body. Only non-JSON input is rejected.
    pub fn parse(body: &[u8]) -> Result<Self, GatewayError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(GatewayRequest::Empty);
        }
        if let Ok(identity) = serde_json::from_slice::<IdentityRequest>(body) {
            return Ok(GatewayRequest::Identity(identity));
        }
        serde_json::from_slice::<Value>(body)
            .map(GatewayRequest::Raw)
            .map_err(|err| GatewayError::BadRequest(format!("body is not valid JSON: {err}")))
    }
}

/// The exact bytes that are signed and transmitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalMessage(Bytes);

impl CanonicalMessage {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    /// Hex SHA-256 of the message, safe to log.
    pub fn digest_hex(&self) -> String {
        hex::encode(Sha256::digest(&self.0))
    }
}

/// Builds the canonical message for `request`. Pure: equal inputs give
/// byte-identical output.
pub fn build_canonical_message(request: &GatewayRequest) -> Result<CanonicalMessage, GatewayError> {
    let bytes = match request {
        GatewayRequest::Identity(identity) => serde_json::to_vec(identity)
            .map_err(|err| GatewayError::MessageBuild(err.to_string()))?,
        GatewayRequest::Raw(value) => serde_json::to_vec(&sort_keys(value))
            .map_err(|err| GatewayError::MessageBuild(err.to_string()))?,
        GatewayRequest::Empty => EMPTY_BODY.to_vec(),
    };
    Ok(CanonicalMessage(Bytes::from(bytes)))
}

/// Rebuilds `value` with every object's keys in lexicographic order,
/// independent of how serde_json's map type orders entries.
fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            let sorted: Map<String, Value> = entries
                .into_iter()
                .map(|(key, value)| (key.clone(), sort_keys(value)))
                .collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// RFC 3339 in UTC with a `Z` suffix; any offset is accepted on input.
mod utc_timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SCENARIO_BODY: &str =
        r#"{"MachineName":"M1","UserName":"U1","TimeStamp":"2024-01-01T00:00:00Z"}"#;

    fn canonical(body: &str) -> Vec<u8> {
        let request = GatewayRequest::parse(body.as_bytes()).unwrap();
        build_canonical_message(&request).unwrap().as_bytes().to_vec()
    }

    #[test]
    fn identity_body_is_reproduced_exactly() {
        assert_eq!(canonical(SCENARIO_BODY), SCENARIO_BODY.as_bytes());
    }

    #[test]
    fn identity_fields_are_parsed() {
        let request = GatewayRequest::parse(SCENARIO_BODY.as_bytes()).unwrap();
        assert_eq!(
            request,
            GatewayRequest::Identity(IdentityRequest {
                machine_name: "M1".into(),
                user_name: "U1".into(),
                time_stamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            })
        );
    }

    #[test]
    fn identity_field_order_and_whitespace_are_normalized() {
        let shuffled = r#"{ "TimeStamp": "2024-01-01T00:00:00Z",
                            "UserName": "U1", "MachineName": "M1" }"#;
        assert_eq!(canonical(shuffled), SCENARIO_BODY.as_bytes());
    }

    #[test]
    fn timestamp_offsets_normalize_to_utc() {
        let offset = r#"{"MachineName":"M1","UserName":"U1","TimeStamp":"2024-01-01T02:00:00+02:00"}"#;
        assert_eq!(canonical(offset), SCENARIO_BODY.as_bytes());
    }

    #[test]
    fn fractional_seconds_are_kept() {
        let body = r#"{"MachineName":"M1","UserName":"U1","TimeStamp":"2024-01-01T00:00:00.250Z"}"#;
        assert_eq!(canonical(body), body.as_bytes());
    }

    #[test]
    fn raw_json_keys_are_sorted_recursively() {
        let body = r#"{"b": 2, "a": {"z": [ {"y": 1, "x": 2} ], "c": null}}"#;
        assert_eq!(canonical(body), br#"{"a":{"c":null,"z":[{"x":2,"y":1}]},"b":2}"#);
    }

    #[test]
    fn raw_numbers_keep_their_exact_text() {
        let body = r#"{"rate":0.10000000000000000001,"amount":12345678901234567890123}"#;
        assert_eq!(
            canonical(body),
            br#"{"amount":12345678901234567890123,"rate":0.10000000000000000001}"#
        );
        assert_eq!(canonical(r#"[1.0, 1e2, -0]"#), b"[1.0,1e2,-0]");
    }

    #[test]
    fn identity_with_extra_fields_passes_through_as_raw() {
        let body = r#"{"MachineName":"M1","UserName":"U1","TimeStamp":"2024-01-01T00:00:00Z","Amount":5}"#;
        let request = GatewayRequest::parse(body.as_bytes()).unwrap();
        assert!(matches!(request, GatewayRequest::Raw(_)));
        assert_eq!(
            canonical(body),
            br#"{"Amount":5,"MachineName":"M1","TimeStamp":"2024-01-01T00:00:00Z","UserName":"U1"}"#
        );
    }

    #[test]
    fn empty_body_has_placeholder_form() {
        assert_eq!(GatewayRequest::parse(b"").unwrap(), GatewayRequest::Empty);
        assert_eq!(GatewayRequest::parse(b" \n\t").unwrap(), GatewayRequest::Empty);
        assert_eq!(canonical(""), EMPTY_BODY);
    }

    #[test]
    fn non_json_body_is_rejected() {
        let err = GatewayRequest::parse(b"MachineName=M1").unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest(_)));
    }

    #[test]
    fn deterministic_encoding() {
        let request = GatewayRequest::parse(br#"{"b": 2, "a": 1}"#).unwrap();
        let first = build_canonical_message(&request).unwrap();
        let second = build_canonical_message(&request).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.digest_hex(), second.digest_hex());
    }

    #[test]
    fn digest_matches_sha256() {
        let message = build_canonical_message(&GatewayRequest::Empty).unwrap();
        assert_eq!(message.digest_hex(), hex::encode(Sha256::digest(b"{}")));
        assert_eq!(message.len(), 2);
    }
}
