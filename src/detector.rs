//! Query-type detection and normalization.
//!
//! Inspects a loosely-structured key-value payload and classifies it into
//! exactly one query kind, extracting normalized parameters along the way.
//! Classification is total: every payload maps to a vehicle query, a
//! customer query, or `Unrecognized`.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

use crate::models::{CustomerParams, VehicleParams};

/// Outcome of classifying a raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    Vehicle(VehicleParams),
    Customer(CustomerParams),
    Unrecognized,
}

/// Colombian plate shapes: three letters plus 2-3 digits with an optional
/// trailing letter (cars, motorcycles), or 2-3 letters plus 2-4 digits
/// (older and diplomatic series).
fn plate_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Z]{3}\d{2,3}[A-Z]?$|^[A-Z]{2,3}\d{2,4}$")
            .expect("plate pattern is a valid regex")
    })
}

/// Canonical form for plates and document types: trimmed, uppercase.
/// Idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(value: &str) -> String {
    value.trim().to_uppercase()
}

/// Stringify a JSON value the way the query-string path already delivers
/// strings. Clients send plates and document numbers as bare numbers often
/// enough that rejecting them would be gratuitous.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Classifies a payload into a query kind with normalized parameters.
///
/// Precedence, first match wins:
/// 1. a `placa` key means a vehicle query, unconditionally — even when
///    document keys are also present;
/// 2. `tipoDocumento` plus `numeroDocumento` means a customer query;
/// 3. a single-key payload falls back to pattern heuristics: plate-shaped
///    values become vehicle queries, all-digit values of six or more
///    characters become customer queries with `tipoDocumento` defaulting
///    to `CC`;
/// 4. anything else is `Unrecognized`.
pub fn detect(payload: &Map<String, Value>) -> Detection {
    if let Some(raw) = payload.get("placa") {
        return Detection::Vehicle(VehicleParams {
            placa: normalize(&value_to_string(raw)),
        });
    }

    if let (Some(tipo), Some(numero)) =
        (payload.get("tipoDocumento"), payload.get("numeroDocumento"))
    {
        return Detection::Customer(CustomerParams {
            tipo_documento: normalize(&value_to_string(tipo)),
            numero_documento: value_to_string(numero).trim().to_string(),
        });
    }

    // Best-effort fallback: a lone value can still identify itself.
    if payload.len() == 1 {
        if let Some((_, raw)) = payload.iter().next() {
            let candidate = normalize(&value_to_string(raw));

            if plate_pattern().is_match(&candidate) {
                return Detection::Vehicle(VehicleParams { placa: candidate });
            }

            if candidate.len() >= 6 && candidate.chars().all(|c| c.is_ascii_digit()) {
                return Detection::Customer(CustomerParams {
                    tipo_documento: "CC".to_string(),
                    numero_documento: candidate,
                });
            }
        }
    }

    Detection::Unrecognized
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("test payload must be an object, got {other}"),
        }
    }

    #[test]
    fn placa_key_detects_vehicle_and_normalizes() {
        let detection = detect(&payload(json!({ "placa": "  abc123 " })));
        assert_eq!(
            detection,
            Detection::Vehicle(VehicleParams {
                placa: "ABC123".to_string()
            })
        );
    }

    #[test]
    fn document_keys_detect_customer() {
        let detection = detect(&payload(json!({
            "tipoDocumento": "cc",
            "numeroDocumento": " 1234567890 "
        })));
        assert_eq!(
            detection,
            Detection::Customer(CustomerParams {
                tipo_documento: "CC".to_string(),
                numero_documento: "1234567890".to_string()
            })
        );
    }

    #[test]
    fn vehicle_wins_when_both_shapes_present() {
        let detection = detect(&payload(json!({
            "placa": "xyz789",
            "tipoDocumento": "CC",
            "numeroDocumento": "1234567890"
        })));
        assert_eq!(
            detection,
            Detection::Vehicle(VehicleParams {
                placa: "XYZ789".to_string()
            })
        );
    }

    #[test]
    fn single_key_plate_pattern_detects_vehicle() {
        for value in ["ABC123", "abc12", "AB1234", "ABC123D", "XY99"] {
            let detection = detect(&payload(json!({ "consulta": value })));
            assert!(
                matches!(detection, Detection::Vehicle(_)),
                "expected {value} to classify as vehicle"
            );
        }
    }

    #[test]
    fn single_key_digits_detect_customer_with_default_type() {
        let detection = detect(&payload(json!({ "consulta": "1032456789" })));
        assert_eq!(
            detection,
            Detection::Customer(CustomerParams {
                tipo_documento: "CC".to_string(),
                numero_documento: "1032456789".to_string()
            })
        );
    }

    #[test]
    fn single_key_short_digits_unrecognized() {
        // Five digits is too short for the document heuristic and has no
        // letters for the plate one.
        assert_eq!(
            detect(&payload(json!({ "consulta": "12345" }))),
            Detection::Unrecognized
        );
    }

    #[test]
    fn numeric_json_values_are_stringified() {
        let detection = detect(&payload(json!({ "consulta": 1032456789 })));
        assert_eq!(
            detection,
            Detection::Customer(CustomerParams {
                tipo_documento: "CC".to_string(),
                numero_documento: "1032456789".to_string()
            })
        );
    }

    #[test]
    fn empty_and_multi_key_payloads_unrecognized() {
        assert_eq!(detect(&payload(json!({}))), Detection::Unrecognized);
        assert_eq!(
            detect(&payload(json!({ "a": "ABC123", "b": "DEF456" }))),
            Detection::Unrecognized
        );
    }

    #[test]
    fn normalize_is_idempotent() {
        for input in ["ABC123", "  abc123 ", "Abc 123", ""] {
            let once = normalize(input);
            assert_eq!(normalize(&once), once);
        }
    }
}
