//! Client for the Conecta GraphQL provider.
//!
//! Every query is a two-step exchange: an OAuth2 client-credentials token
//! acquisition followed by a single authenticated GraphQL POST. Tokens are
//! cached until shortly before expiry; transport errors are retried a
//! bounded number of times; the GraphQL endpoint sits behind a circuit
//! breaker so a failing provider is not hammered.

use chrono::{DateTime, Utc};
use failsafe::futures::CircuitBreaker;
use moka::future::Cache;
use serde_json::json;
use std::time::Duration;

use crate::circuit_breaker::{create_upstream_circuit_breaker, UpstreamCircuitBreaker};
use crate::config::Config;
use crate::errors::AppError;
use crate::models::{GraphqlResponse, TokenResponse};

const TOKEN_TIMEOUT: Duration = Duration::from_secs(30);
const GRAPHQL_TIMEOUT: Duration = Duration::from_secs(60);

/// Refresh the cached token this long before the provider expires it.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;
/// Fallback lifetime when the token response omits `expires_in`.
const TOKEN_DEFAULT_TTL_SECS: u64 = 3600;

/// Extra attempts after a failed send. Applies to transport errors only;
/// validation failures never reach this layer.
const TRANSPORT_RETRIES: u32 = 2;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

pub struct ConectaClient {
    client: reqwest::Client,
    auth_url: String,
    graphql_cliente_url: String,
    graphql_vehiculo_url: String,
    client_id: String,
    client_secret: String,
    user_key: String,
    api_key: String,
    token_cache: Cache<String, CachedToken>,
    breaker: UpstreamCircuitBreaker,
}

impl ConectaClient {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let client = reqwest::Client::builder().build().map_err(|e| {
            AppError::InternalError(format!("Failed to create Conecta client: {}", e))
        })?;

        // One entry per client id; the TTL is a backstop, expiry is
        // enforced against `expires_at` on every read.
        let token_cache = Cache::builder()
            .time_to_live(Duration::from_secs(TOKEN_DEFAULT_TTL_SECS))
            .max_capacity(4)
            .build();

        Ok(Self {
            client,
            auth_url: config.conecta_auth_url.clone(),
            graphql_cliente_url: config.conecta_graphql_cliente_url.clone(),
            graphql_vehiculo_url: config.conecta_graphql_vehiculo_url.clone(),
            client_id: config.conecta_client_id.clone(),
            client_secret: config.conecta_client_secret.clone(),
            user_key: config.conecta_user_key.clone(),
            api_key: config.conecta_api_key.clone(),
            token_cache,
            breaker: create_upstream_circuit_breaker(),
        })
    }

    /// Obtains a bearer token via the client-credentials exchange, reusing
    /// the cached one while it has comfortably more life left than
    /// [`TOKEN_EXPIRY_MARGIN_SECS`].
    pub async fn acquire_token(&self) -> Result<String, AppError> {
        if let Some(cached) = self.token_cache.get(&self.client_id).await {
            if cached.expires_at - Utc::now() > chrono::Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS)
            {
                tracing::debug!("Reusing cached access token");
                return Ok(cached.access_token);
            }
            self.token_cache.invalidate(&self.client_id).await;
        }

        tracing::info!("Requesting access token");
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let response = self
            .send_with_retry(|| {
                self.client
                    .post(&self.auth_url)
                    .timeout(TOKEN_TIMEOUT)
                    .form(&form)
            })
            .await
            .map_err(|e| AppError::UpstreamAuth(format!("Token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!("Token endpoint returned {}: {}", status, error_text);
            return Err(AppError::UpstreamAuth(format!(
                "Token endpoint returned status {}",
                status
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            AppError::UpstreamAuth(format!("Failed to parse token response: {}", e))
        })?;

        let ttl = token.expires_in.unwrap_or(TOKEN_DEFAULT_TTL_SECS);
        self.token_cache
            .insert(
                self.client_id.clone(),
                CachedToken {
                    access_token: token.access_token.clone(),
                    expires_at: Utc::now() + chrono::Duration::seconds(ttl as i64),
                },
            )
            .await;

        tracing::info!("Access token acquired (expires in {}s)", ttl);
        Ok(token.access_token)
    }

    /// Looks up a vehicle by plate. Returns the raw `{data, errors}` pair.
    pub async fn query_vehicle(&self, placa: &str) -> Result<GraphqlResponse, AppError> {
        tracing::info!("Consultando vehículo con placa: {}", placa);
        let query = vehicle_query(placa);
        self.execute(&self.graphql_vehiculo_url, &query).await
    }

    /// Looks up a customer by document type and number.
    pub async fn query_customer(
        &self,
        tipo_documento: &str,
        numero_documento: &str,
    ) -> Result<GraphqlResponse, AppError> {
        tracing::info!(
            "Consultando cliente: {} {}",
            tipo_documento,
            numero_documento
        );
        let query = customer_query(tipo_documento, numero_documento);
        self.execute(&self.graphql_cliente_url, &query).await
    }

    async fn execute(&self, url: &str, query: &str) -> Result<GraphqlResponse, AppError> {
        let token = self.acquire_token().await?;

        match self.breaker.call(self.post_graphql(url, &token, query)).await {
            Ok(response) => Ok(response),
            Err(failsafe::Error::Inner(err)) => Err(err),
            Err(failsafe::Error::Rejected) => {
                tracing::warn!("Upstream circuit breaker open, failing fast");
                Err(AppError::UpstreamTransport(
                    "Upstream circuit breaker open".to_string(),
                ))
            }
        }
    }

    async fn post_graphql(
        &self,
        url: &str,
        token: &str,
        query: &str,
    ) -> Result<GraphqlResponse, AppError> {
        let payload = json!({ "query": query });

        let response = self
            .send_with_retry(|| {
                self.client
                    .post(url)
                    .timeout(GRAPHQL_TIMEOUT)
                    .header("Authorization", format!("Bearer {}", token))
                    .header("x-user-key", &self.user_key)
                    .header("x-api-key", &self.api_key)
                    .json(&payload)
            })
            .await
            .map_err(|e| AppError::UpstreamTransport(format!("GraphQL request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!("GraphQL endpoint returned {}: {}", status, error_text);
            return Err(AppError::UpstreamTransport(format!(
                "GraphQL endpoint returned status {}",
                status
            )));
        }

        response.json::<GraphqlResponse>().await.map_err(|e| {
            AppError::UpstreamTransport(format!("Failed to parse GraphQL response: {}", e))
        })
    }

    /// Sends a request, retrying with exponential backoff when the send
    /// itself fails. Non-2xx responses are not retried; the provider
    /// answered, it just didn't like us.
    async fn send_with_retry<F>(&self, build: F) -> Result<reqwest::Response, reqwest::Error>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            match build().send().await {
                Ok(response) => return Ok(response),
                Err(err) if attempt < TRANSPORT_RETRIES => {
                    let delay = Duration::from_millis(250 * 2u64.pow(attempt));
                    tracing::warn!(
                        "Transport error ({}), retry {}/{} in {:?}",
                        err,
                        attempt + 1,
                        TRANSPORT_RETRIES,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// GraphQL string literal with quotes and escapes applied.
fn graphql_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", value))
}

fn vehicle_query(placa: &str) -> String {
    format!(
        r#"
        query Vehiculos {{
            vehiculos(placa: {placa}) {{
                placa
                origenRegistro
                fechaRegistro
                organismoTransito
                modelo
                color
                marca
                linea
                numeroMotor
                numeroChasis
                vin
                cilindraje
                numeroPasajeros
                codigoFasecolda
                claseVehiculo
                servicio
                uso
                tipo
                blindaje
                polizas {{
                    codigoRamoEmision
                    nombreRamoEmision
                    codigoProducto
                    nombreProducto
                    numeroSecuenciaPoliza
                    numeroPoliza
                    fechaInicioPoliza
                    fechaFinPoliza
                    primaTotal
                    valorAsegurado
                    estadoPoliza
                    rol
                    pk
                }}
                siniestros {{
                    numeroSiniestro
                    estadoSiniestro
                    fechaSiniestro
                    fechaAviso
                    descripcionCausa
                    descripcionSiniestro
                    coberturasAfectadas
                    numeroPoliza
                    codigoRamoEmision
                    nombreRamoEmision
                    totalIncurridoBolivar
                    totalLiquidadoBolivar
                }}
            }}
        }}
        "#,
        placa = graphql_string(placa)
    )
}

fn customer_query(tipo_documento: &str, numero_documento: &str) -> String {
    // numeroDocumento is a bare literal, not a string. Upstream schema
    // contract; quoting it makes the provider reject the query.
    format!(
        r#"
        query Cliente {{
            cliente(cliente: {{ tipoDocumento: {tipo}, numeroDocumento: {numero} }}) {{
                tipoDocumento
                numeroDocumento
                tipoPersona
                nombreEmpresa
                estadoCliente
                nombreCompleto
                portafolioVigente {{
                    codigoRamoEmision
                    nombreRamoEmision
                    codigoProducto
                    nombreProducto
                    numeroSecuenciaPoliza
                    numeroPoliza
                    fechaInicioPoliza
                    fechaFinPoliza
                    primaTotal
                    valorAsegurado
                    estadoPoliza
                    rol
                    pk
                }}
                demografica {{
                    sexo
                    fechaNacimiento
                    estratoSocial
                    nacionalidad
                    direccion
                    municipio
                    departamento
                    edad
                }}
                siniestros {{
                    numeroSiniestro
                    estadoSiniestro
                    fechaSiniestro
                    fechaAviso
                    descripcionCausa
                    descripcionSiniestro
                    coberturasAfectadas
                    numeroPoliza
                    codigoRamoEmision
                    nombreRamoEmision
                    totalIncurridoBolivar
                    totalLiquidadoBolivar
                }}
            }}
        }}
        "#,
        tipo = graphql_string(tipo_documento),
        numero = numero_documento
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vehicle_query_quotes_the_plate() {
        let query = vehicle_query("ABC123");
        assert!(query.contains(r#"vehiculos(placa: "ABC123")"#));
        assert!(query.contains("polizas"));
        assert!(query.contains("siniestros"));
    }

    #[test]
    fn customer_query_uses_bare_document_number() {
        let query = customer_query("CC", "1234567890");
        assert!(query.contains(r#"tipoDocumento: "CC""#));
        assert!(query.contains("numeroDocumento: 1234567890 "));
        assert!(!query.contains(r#"numeroDocumento: "1234567890""#));
    }

    #[test]
    fn graphql_string_escapes_quotes() {
        assert_eq!(graphql_string(r#"AB"C"#), r#""AB\"C""#);
    }
}
