use serde::Deserialize;

use crate::dispatcher::Capabilities;
use crate::validator::PlatePolicy;

/// Production Conecta endpoints. Deployment-fixed: overridable from the
/// environment for staging/test deployments, never per request.
const DEFAULT_AUTH_URL: &str = "https://api-conecta.segurosbolivar.com/prod/oauth2/token";
const DEFAULT_GRAPHQL_CLIENTE_URL: &str =
    "https://api-conecta.segurosbolivar.com/prod/dataops/graphql/cliente";
// The vehicle query goes through a different gateway path than the
// customer query. Inherited upstream contract.
const DEFAULT_GRAPHQL_VEHICULO_URL: &str =
    "https://api-conecta.segurosbolivar.com/prod/api/dataops/graphql/cliente";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub debug: bool,
    pub environment: String,
    pub plate_policy: PlatePolicy,
    pub capabilities: Capabilities,
    pub conecta_auth_url: String,
    pub conecta_graphql_cliente_url: String,
    pub conecta_graphql_vehiculo_url: String,
    pub conecta_client_id: String,
    pub conecta_client_secret: String,
    pub conecta_user_key: String,
    pub conecta_api_key: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            debug: std::env::var("DEBUG")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            plate_policy: match std::env::var("PLATE_POLICY") {
                Ok(label) => PlatePolicy::parse(&label).ok_or_else(|| {
                    anyhow::anyhow!("PLATE_POLICY must be 'strict' or 'lenient', got '{}'", label)
                })?,
                Err(_) => PlatePolicy::Strict,
            },
            capabilities: match std::env::var("QUERY_KINDS") {
                Ok(list) => Capabilities::parse(&list)
                    .map_err(|e| anyhow::anyhow!("QUERY_KINDS invalid: {}", e))?,
                Err(_) => Capabilities::all(),
            },
            conecta_auth_url: url_var("CONECTA_AUTH_URL", DEFAULT_AUTH_URL)?,
            conecta_graphql_cliente_url: url_var(
                "CONECTA_GRAPHQL_CLIENTE_URL",
                DEFAULT_GRAPHQL_CLIENTE_URL,
            )?,
            conecta_graphql_vehiculo_url: url_var(
                "CONECTA_GRAPHQL_VEHICULO_URL",
                DEFAULT_GRAPHQL_VEHICULO_URL,
            )?,
            conecta_client_id: required_var("CONECTA_CLIENT_ID")?,
            conecta_client_secret: required_var("CONECTA_CLIENT_SECRET")?,
            conecta_user_key: required_var("CONECTA_USER_KEY")?,
            conecta_api_key: required_var("CONECTA_API_KEY")?,
        };

        // Log successful configuration load (without sensitive values)
        tracing::debug!("Auth URL: {}", config.conecta_auth_url);
        tracing::debug!(
            "GraphQL URLs: cliente={} vehiculo={}",
            config.conecta_graphql_cliente_url,
            config.conecta_graphql_vehiculo_url
        );
        tracing::debug!(
            "Server: {}:{} ({})",
            config.host,
            config.port,
            config.environment
        );
        tracing::debug!(
            "Plate policy: {}, capabilities: {}",
            config.plate_policy.as_str(),
            config.capabilities
        );

        Ok(config)
    }
}

/// Reads an endpoint URL from the environment, falling back to the
/// production default; either way it must parse as an http(s) URL.
fn url_var(name: &str, default: &str) -> anyhow::Result<String> {
    let value = std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string());

    let parsed = url::Url::parse(&value)
        .map_err(|e| anyhow::anyhow!("{} is not a valid URL ({}): {}", name, value, e))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        anyhow::bail!("{} must start with http:// or https://", name);
    }

    Ok(value)
}

fn required_var(name: &str) -> anyhow::Result<String> {
    std::env::var(name)
        .map_err(|_| anyhow::anyhow!("{} environment variable required", name))
        .and_then(|value| {
            if value.trim().is_empty() {
                anyhow::bail!("{} cannot be empty", name);
            }
            Ok(value)
        })
}
