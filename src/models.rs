use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The two query kinds the upstream provider can answer.
///
/// Serialized with the wire vocabulary of the consulta API
/// (`tipo_consulta` field in every envelope).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryKind {
    #[serde(rename = "vehiculo")]
    Vehicle,
    #[serde(rename = "cliente")]
    Customer,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Vehicle => "vehiculo",
            QueryKind::Customer => "cliente",
        }
    }
}

/// Normalized parameters for a vehicle query.
///
/// Invariant: `placa` is uppercase with no surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleParams {
    pub placa: String,
}

impl VehicleParams {
    /// Identifying params echoed back in every envelope for this query.
    pub fn identifying(&self) -> Map<String, Value> {
        let mut params = Map::new();
        params.insert("placa".to_string(), Value::String(self.placa.clone()));
        params
    }
}

/// Normalized parameters for a customer query.
///
/// Invariant: `tipo_documento` is uppercase and trimmed; `numero_documento`
/// is trimmed. Membership in the valid document-type set is the validator's
/// job, not an invariant here (invalid params are still echoed back).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerParams {
    pub tipo_documento: String,
    pub numero_documento: String,
}

impl CustomerParams {
    pub fn identifying(&self) -> Map<String, Value> {
        let mut params = Map::new();
        params.insert(
            "tipo_documento".to_string(),
            Value::String(self.tipo_documento.clone()),
        );
        params.insert(
            "numero_documento".to_string(),
            Value::String(self.numero_documento.clone()),
        );
        params
    }
}

/// OAuth2 token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Raw GraphQL response document. `errors` is passed through to callers
/// untouched; its presence alone does not mark the call as failed.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphqlResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Option<Value>,
}

/// The uniform response wrapper returned by every query endpoint.
///
/// Constructed once per request and never mutated afterwards. `timestamp`
/// is the request-completion time and `execution_time_ms` the wall-clock
/// duration since the request was received, so callers can measure latency
/// even on failure paths.
#[derive(Debug, Serialize)]
pub struct ResponseEnvelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tipo_consulta: Option<QueryKind>,
    #[serde(flatten)]
    pub parametros: Map<String, Value>,
    pub data: Option<Value>,
    pub errors: Option<Value>,
    pub execution_time_ms: u64,
}

impl ResponseEnvelope {
    fn base(success: bool, execution_time_ms: u64) -> Self {
        Self {
            success,
            error: None,
            message: None,
            timestamp: Utc::now().to_rfc3339(),
            tipo_consulta: None,
            parametros: Map::new(),
            data: None,
            errors: None,
            execution_time_ms,
        }
    }

    /// Request rejected before a query kind could be established
    /// (content-type, body shape, or detection failure).
    pub fn failure(
        error: impl Into<String>,
        errors: impl Into<String>,
        execution_time_ms: u64,
    ) -> Self {
        let mut envelope = Self::base(false, execution_time_ms);
        envelope.error = Some(error.into());
        envelope.errors = Some(Value::String(errors.into()));
        envelope
    }

    /// Validation failure; echoes back the parsed (possibly invalid) params.
    pub fn invalid(
        kind: QueryKind,
        parametros: Map<String, Value>,
        reason: impl Into<String>,
        execution_time_ms: u64,
    ) -> Self {
        let reason = reason.into();
        let mut envelope = Self::base(false, execution_time_ms);
        envelope.error = Some(reason.clone());
        envelope.errors = Some(Value::String(reason));
        envelope.tipo_consulta = Some(kind);
        envelope.parametros = parametros;
        envelope
    }

    /// Token or transport failure. The caller sees a generic message only;
    /// the specific upstream error never leaves the server logs.
    pub fn upstream_failure(
        kind: QueryKind,
        parametros: Map<String, Value>,
        error: impl Into<String>,
        errors: impl Into<String>,
        execution_time_ms: u64,
    ) -> Self {
        let mut envelope = Self::base(false, execution_time_ms);
        envelope.error = Some(error.into());
        envelope.errors = Some(Value::String(errors.into()));
        envelope.tipo_consulta = Some(kind);
        envelope.parametros = parametros;
        envelope
    }

    /// Well-formed query that matched nothing upstream. This is a successful
    /// outcome, not an error, hence `success: true` with HTTP 404.
    pub fn no_data(
        kind: QueryKind,
        parametros: Map<String, Value>,
        message: impl Into<String>,
        execution_time_ms: u64,
    ) -> Self {
        let mut envelope = Self::base(true, execution_time_ms);
        envelope.message = Some(message.into());
        envelope.tipo_consulta = Some(kind);
        envelope.parametros = parametros;
        envelope
    }

    /// Upstream answered with data. Upstream `errors` ride along untouched.
    pub fn found(
        kind: QueryKind,
        parametros: Map<String, Value>,
        data: Option<Value>,
        errors: Option<Value>,
        execution_time_ms: u64,
    ) -> Self {
        let mut envelope = Self::base(true, execution_time_ms);
        envelope.tipo_consulta = Some(kind);
        envelope.parametros = parametros;
        envelope.data = data;
        envelope.errors = errors;
        envelope
    }
}
