//! Request dispatch and response shaping.
//!
//! One parameterized service replaces the historical trio of copy-paste
//! variants (plate-only, customer-only, unified): a capability set decides
//! which query kinds a deployment accepts, and every path funnels into the
//! same envelope shaping.

use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::time::Instant;

use crate::detector::{detect, normalize, Detection};
use crate::models::{CustomerParams, QueryKind, ResponseEnvelope, VehicleParams};
use crate::upstream::ConectaClient;
use crate::validator::{validate_documento, PlatePolicy};

/// Which query kinds this deployment answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Capabilities {
    pub vehicles: bool,
    pub customers: bool,
}

impl Capabilities {
    pub fn all() -> Self {
        Self {
            vehicles: true,
            customers: true,
        }
    }

    /// Parses a comma-separated capability list, e.g. `"vehiculo,cliente"`.
    pub fn parse(list: &str) -> Result<Self, String> {
        let mut capabilities = Self {
            vehicles: false,
            customers: false,
        };
        for entry in list.split(',') {
            match entry.trim().to_ascii_lowercase().as_str() {
                "" => {}
                "vehiculo" | "vehiculos" => capabilities.vehicles = true,
                "cliente" | "clientes" => capabilities.customers = true,
                other => return Err(format!("unknown query kind '{}'", other)),
            }
        }
        if !capabilities.vehicles && !capabilities.customers {
            return Err("at least one query kind must be enabled".to_string());
        }
        Ok(capabilities)
    }

    pub fn accepts(&self, kind: QueryKind) -> bool {
        match kind {
            QueryKind::Vehicle => self.vehicles,
            QueryKind::Customer => self.customers,
        }
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds = Vec::new();
        if self.vehicles {
            kinds.push("vehiculo");
        }
        if self.customers {
            kinds.push("cliente");
        }
        write!(f, "{}", kinds.join(","))
    }
}

/// Where the raw payload came from. Only affects the wording of the
/// detection-failure message, kept distinct for compatibility with the
/// historical surfaces.
#[derive(Debug, Clone, Copy)]
pub enum PayloadSource {
    JsonBody,
    QueryString,
}

impl PayloadSource {
    fn detection_failure_message(&self) -> &'static str {
        match self {
            PayloadSource::JsonBody => {
                "No se pudo detectar el tipo de consulta. Envíe 'tipoDocumento' y \
                 'numeroDocumento' para cliente, o 'placa' para vehículo"
            }
            PayloadSource::QueryString => {
                "Parámetros inválidos. Use 'tipoDocumento' y 'numeroDocumento' para \
                 cliente, o 'placa' para vehículo"
            }
        }
    }
}

pub fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

pub struct QueryService {
    client: ConectaClient,
    plate_policy: PlatePolicy,
    capabilities: Capabilities,
}

impl QueryService {
    pub fn new(client: ConectaClient, plate_policy: PlatePolicy, capabilities: Capabilities) -> Self {
        Self {
            client,
            plate_policy,
            capabilities,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Unified entry point: classify the payload, then run the matching
    /// query. `started` is the moment the request was received, so the
    /// envelope timing covers body parsing too.
    pub async fn consultar(
        &self,
        payload: &Map<String, Value>,
        source: PayloadSource,
        started: Instant,
    ) -> (StatusCode, ResponseEnvelope) {
        match detect(payload) {
            Detection::Vehicle(params) => {
                tracing::info!("Tipo de consulta detectado: vehiculo ({})", params.placa);
                self.consultar_vehiculo(params, started).await
            }
            Detection::Customer(params) => {
                tracing::info!(
                    "Tipo de consulta detectado: cliente ({} {})",
                    params.tipo_documento,
                    params.numero_documento
                );
                self.consultar_cliente(params, started).await
            }
            Detection::Unrecognized => (
                StatusCode::BAD_REQUEST,
                ResponseEnvelope::failure(
                    source.detection_failure_message(),
                    "Unable to detect query type",
                    elapsed_ms(started),
                ),
            ),
        }
    }

    /// Plate-only entry point for the dedicated vehicle endpoint; skips
    /// detection but shares validation and shaping with the unified path.
    pub async fn consultar_placa(
        &self,
        placa_raw: &str,
        started: Instant,
    ) -> (StatusCode, ResponseEnvelope) {
        let params = VehicleParams {
            placa: normalize(placa_raw),
        };
        self.consultar_vehiculo(params, started).await
    }

    async fn consultar_vehiculo(
        &self,
        params: VehicleParams,
        started: Instant,
    ) -> (StatusCode, ResponseEnvelope) {
        if let Some(rejected) = self.reject_disabled(QueryKind::Vehicle, started) {
            return rejected;
        }

        if let Err(reason) = self.plate_policy.validate(&params.placa) {
            return (
                StatusCode::BAD_REQUEST,
                ResponseEnvelope::invalid(
                    QueryKind::Vehicle,
                    params.identifying(),
                    reason,
                    elapsed_ms(started),
                ),
            );
        }

        match self.client.query_vehicle(&params.placa).await {
            Ok(response) => {
                if collection_found(response.data.as_ref(), "vehiculos") {
                    tracing::info!(
                        "Consulta exitosa para vehículo: {} en {}ms",
                        params.placa,
                        elapsed_ms(started)
                    );
                    (
                        StatusCode::OK,
                        ResponseEnvelope::found(
                            QueryKind::Vehicle,
                            params.identifying(),
                            response.data,
                            response.errors,
                            elapsed_ms(started),
                        ),
                    )
                } else {
                    tracing::info!("No se encontraron datos para vehículo {}", params.placa);
                    (
                        StatusCode::NOT_FOUND,
                        ResponseEnvelope::no_data(
                            QueryKind::Vehicle,
                            params.identifying(),
                            "No se encontraron datos para el vehículo especificado",
                            elapsed_ms(started),
                        ),
                    )
                }
            }
            Err(err) => {
                tracing::error!("Error en consulta para vehículo {}: {}", params.placa, err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ResponseEnvelope::upstream_failure(
                        QueryKind::Vehicle,
                        params.identifying(),
                        "Error interno al consultar el vehículo",
                        "Internal server error - Unable to fetch vehicle data",
                        elapsed_ms(started),
                    ),
                )
            }
        }
    }

    async fn consultar_cliente(
        &self,
        params: CustomerParams,
        started: Instant,
    ) -> (StatusCode, ResponseEnvelope) {
        if let Some(rejected) = self.reject_disabled(QueryKind::Customer, started) {
            return rejected;
        }

        if let Err(reason) = validate_documento(&params.tipo_documento, &params.numero_documento) {
            return (
                StatusCode::BAD_REQUEST,
                ResponseEnvelope::invalid(
                    QueryKind::Customer,
                    params.identifying(),
                    reason,
                    elapsed_ms(started),
                ),
            );
        }

        match self
            .client
            .query_customer(&params.tipo_documento, &params.numero_documento)
            .await
        {
            Ok(response) => {
                if collection_found(response.data.as_ref(), "cliente") {
                    tracing::info!(
                        "Consulta exitosa para cliente: {} {} en {}ms",
                        params.tipo_documento,
                        params.numero_documento,
                        elapsed_ms(started)
                    );
                    (
                        StatusCode::OK,
                        ResponseEnvelope::found(
                            QueryKind::Customer,
                            params.identifying(),
                            response.data,
                            response.errors,
                            elapsed_ms(started),
                        ),
                    )
                } else {
                    tracing::info!(
                        "No se encontraron datos para cliente {} {}",
                        params.tipo_documento,
                        params.numero_documento
                    );
                    (
                        StatusCode::NOT_FOUND,
                        ResponseEnvelope::no_data(
                            QueryKind::Customer,
                            params.identifying(),
                            "No se encontraron datos para el cliente especificado",
                            elapsed_ms(started),
                        ),
                    )
                }
            }
            Err(err) => {
                tracing::error!(
                    "Error en consulta para cliente {} {}: {}",
                    params.tipo_documento,
                    params.numero_documento,
                    err
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ResponseEnvelope::upstream_failure(
                        QueryKind::Customer,
                        params.identifying(),
                        "Error interno al consultar el cliente",
                        "Internal server error - Unable to fetch client data",
                        elapsed_ms(started),
                    ),
                )
            }
        }
    }

    fn reject_disabled(
        &self,
        kind: QueryKind,
        started: Instant,
    ) -> Option<(StatusCode, ResponseEnvelope)> {
        if self.capabilities.accepts(kind) {
            return None;
        }
        tracing::warn!("Consulta '{}' no habilitada en este despliegue", kind.as_str());
        Some((
            StatusCode::BAD_REQUEST,
            ResponseEnvelope::failure(
                format!(
                    "El tipo de consulta '{}' no está habilitado en este despliegue",
                    kind.as_str()
                ),
                "Query kind not enabled",
                elapsed_ms(started),
            ),
        ))
    }
}

/// Truthiness check over the kind-specific result slot inside `data`:
/// a missing key, `null`, an empty array, or an empty object all mean
/// "nothing matched".
fn collection_found(data: Option<&Value>, key: &str) -> bool {
    let Some(value) = data.and_then(|d| d.get(key)) else {
        return false;
    };
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}
