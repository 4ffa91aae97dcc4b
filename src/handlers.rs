use axum::{
    body::Bytes,
    extract::{Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::detector::value_to_string;
use crate::dispatcher::{elapsed_ms, PayloadSource, QueryService};
use crate::models::ResponseEnvelope;
use crate::validator::VALID_DOCUMENT_TYPES;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Parameterized query service (detector + validator + upstream client).
    pub service: Arc<QueryService>,
}

const SERVICE_NAME: &str = "Consulta Unificada API";

const AVAILABLE_ENDPOINTS: [&str; 6] = [
    "POST /api/v1/clientes/consultar",
    "GET /api/v1/clientes/consultar",
    "POST /api/v1/vehiculos/consultar",
    "GET /api/v1/health",
    "GET /api/v1/info",
    "GET /",
];

fn envelope_response(status: StatusCode, envelope: ResponseEnvelope) -> Response {
    (status, Json(envelope)).into_response()
}

fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_ascii_lowercase().starts_with("application/json"))
        .unwrap_or(false)
}

/// Parses a request body into the generic payload the detector consumes.
/// Anything that is not a JSON object counts as an empty/invalid body;
/// an empty object is a *valid* body that the detector will then reject
/// with the shape-listing message.
fn parse_body(body: &Bytes) -> Option<Map<String, Value>> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// POST /api/v1/clientes/consultar
///
/// Unified query endpoint: the JSON body is classified automatically as a
/// vehicle or customer query (see the detector for the precedence rules).
pub async fn consultar_unificado(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    tracing::info!("POST /api/v1/clientes/consultar");

    if !is_json_content_type(&headers) {
        return envelope_response(
            StatusCode::BAD_REQUEST,
            ResponseEnvelope::failure(
                "Content-Type debe ser application/json",
                "Invalid content type",
                elapsed_ms(started),
            ),
        );
    }

    let Some(payload) = parse_body(&body) else {
        return envelope_response(
            StatusCode::BAD_REQUEST,
            ResponseEnvelope::failure(
                "Body JSON vacío o inválido",
                "Empty or invalid JSON body",
                elapsed_ms(started),
            ),
        );
    };

    let (status, envelope) = state
        .service
        .consultar(&payload, PayloadSource::JsonBody, started)
        .await;
    envelope_response(status, envelope)
}

/// GET /api/v1/clientes/consultar
///
/// Same classification applied to the URL query parameters.
pub async fn consultar_unificado_get(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let started = Instant::now();
    tracing::info!("GET /api/v1/clientes/consultar");

    let payload: Map<String, Value> = params
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect();

    let (status, envelope) = state
        .service
        .consultar(&payload, PayloadSource::QueryString, started)
        .await;
    envelope_response(status, envelope)
}

/// POST /api/v1/vehiculos/consultar
///
/// Dedicated plate endpoint; takes `{"placa": "..."}` and bypasses
/// detection entirely.
pub async fn consultar_placa(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    tracing::info!("POST /api/v1/vehiculos/consultar");

    if !is_json_content_type(&headers) {
        return envelope_response(
            StatusCode::BAD_REQUEST,
            ResponseEnvelope::failure(
                "Content-Type debe ser application/json",
                "Invalid content type",
                elapsed_ms(started),
            ),
        );
    }

    let Some(payload) = parse_body(&body) else {
        return envelope_response(
            StatusCode::BAD_REQUEST,
            ResponseEnvelope::failure(
                "Body JSON vacío o inválido",
                "Empty or invalid JSON body",
                elapsed_ms(started),
            ),
        );
    };

    // Missing key validates as an empty plate ("La placa es requerida").
    let placa_raw = payload
        .get("placa")
        .map(value_to_string)
        .unwrap_or_default();

    let (status, envelope) = state.service.consultar_placa(&placa_raw, started).await;
    envelope_response(status, envelope)
}

/// GET /api/v1/health
///
/// Static service metadata; never touches the upstream provider.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let capabilities = state.service.capabilities();
    let mut features = vec![];
    if capabilities.customers {
        features.push("consulta_clientes");
    }
    if capabilities.vehicles {
        features.push("consulta_vehiculos");
    }
    features.push("deteccion_automatica");

    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": SERVICE_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": Utc::now().to_rfc3339(),
            "uptime": "N/A",
            "environment": state.config.environment,
            "features": features,
        })),
    )
}

/// GET /api/v1/info
///
/// Static documentation of the supported input shapes with examples.
pub async fn api_info() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "name": SERVICE_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "description": "API unificada para consultar información de clientes por documento y vehículos por placa con detección automática",
            "endpoints": {
                "POST /api/v1/clientes/consultar": "Consultar datos con detección automática",
                "GET /api/v1/clientes/consultar": "Consultar datos por parámetros",
                "POST /api/v1/vehiculos/consultar": "Consultar vehículo por placa",
                "GET /api/v1/health": "Verificación de salud del servicio",
                "GET /api/v1/info": "Información de la API"
            },
            "usage": {
                "cliente": {
                    "method": "POST",
                    "url": "/api/v1/clientes/consultar",
                    "headers": { "Content-Type": "application/json" },
                    "body": { "tipoDocumento": "CC", "numeroDocumento": "1234567890" }
                },
                "vehiculo": {
                    "method": "POST",
                    "url": "/api/v1/clientes/consultar",
                    "headers": { "Content-Type": "application/json" },
                    "body": { "placa": "ABC123" }
                }
            },
            "valid_document_types": VALID_DOCUMENT_TYPES,
            "examples": {
                "curl_cliente": "curl -X POST https://tu-api.com/api/v1/clientes/consultar -H 'Content-Type: application/json' -d '{\"tipoDocumento\": \"CC\", \"numeroDocumento\": \"1234567890\"}'",
                "curl_vehiculo": "curl -X POST https://tu-api.com/api/v1/clientes/consultar -H 'Content-Type: application/json' -d '{\"placa\": \"ABC123\"}'",
                "get_cliente": "curl 'https://tu-api.com/api/v1/clientes/consultar?tipoDocumento=CC&numeroDocumento=1234567890'",
                "get_vehiculo": "curl 'https://tu-api.com/api/v1/clientes/consultar?placa=ABC123'"
            },
            "timestamp": Utc::now().to_rfc3339(),
        })),
    )
}

/// GET /
pub async fn root() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "message": SERVICE_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "documentation": "/api/v1/info",
            "health_check": "/api/v1/health",
            "main_endpoint": "/api/v1/clientes/consultar",
            "features": [
                "Consulta de clientes por documento",
                "Consulta de vehículos por placa",
                "Detección automática del tipo de consulta"
            ]
        })),
    )
}

/// Fallback for unmatched routes.
pub async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "error": "Endpoint no encontrado",
            "timestamp": Utc::now().to_rfc3339(),
            "available_endpoints": AVAILABLE_ENDPOINTS,
            "errors": "Not found",
            "execution_time_ms": 0
        })),
    )
        .into_response()
}

/// Rewrites the framework's bare 405 into the uniform envelope shape.
pub async fn method_not_allowed_envelope(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    if response.status() != StatusCode::METHOD_NOT_ALLOWED {
        return response;
    }
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({
            "success": false,
            "error": "Método no permitido",
            "timestamp": Utc::now().to_rfc3339(),
            "errors": "Method not allowed",
            "execution_time_ms": 0
        })),
    )
        .into_response()
}

/// Converts a panic anywhere in request handling into the generic 500
/// envelope. The panic detail is logged server-side and never echoed.
pub fn handle_panic(err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!("Unhandled panic while processing request: {}", detail);

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "success": false,
            "error": "Error interno del servidor",
            "timestamp": Utc::now().to_rfc3339(),
            "errors": "Internal server error",
            "execution_time_ms": 0
        })),
    )
        .into_response()
}
