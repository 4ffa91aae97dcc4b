/// Integration tests with a mocked upstream provider.
/// Exercises the full dispatch path (detection, validation, token
/// exchange, GraphQL call, envelope shaping) without hitting Conecta.
use axum::http::StatusCode;
use serde_json::{json, Map, Value};
use std::time::Instant;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rust_consulta_api::config::Config;
use rust_consulta_api::dispatcher::{Capabilities, PayloadSource, QueryService};
use rust_consulta_api::upstream::ConectaClient;
use rust_consulta_api::validator::PlatePolicy;

/// Helper function to create test config pointing at a mock server
fn create_test_config(base_url: &str) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 8080,
        debug: false,
        environment: "test".to_string(),
        plate_policy: PlatePolicy::Strict,
        capabilities: Capabilities::all(),
        conecta_auth_url: format!("{}/oauth2/token", base_url),
        conecta_graphql_cliente_url: format!("{}/graphql/cliente", base_url),
        conecta_graphql_vehiculo_url: format!("{}/graphql/vehiculo", base_url),
        conecta_client_id: "test_client".to_string(),
        conecta_client_secret: "test_secret".to_string(),
        conecta_user_key: "test_user_key".to_string(),
        conecta_api_key: "test_api_key".to_string(),
    }
}

fn create_service(config: &Config) -> QueryService {
    let client = ConectaClient::new(config).expect("client construction");
    QueryService::new(client, config.plate_policy, config.capabilities)
}

fn payload(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("test payload must be an object, got {other}"),
    }
}

async fn mount_token_mock(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "test-token-123",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_vehicle_found() {
    let mock_server = MockServer::start().await;
    mount_token_mock(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/graphql/vehiculo"))
        .and(header("Authorization", "Bearer test-token-123"))
        .and(header("x-user-key", "test_user_key"))
        .and(body_string_contains("ABC123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "vehiculos": [{
                    "placa": "ABC123",
                    "marca": "RENAULT",
                    "modelo": "2019"
                }]
            },
            "errors": null
        })))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());
    let service = create_service(&config);

    // Lowercase input normalizes before reaching the upstream call.
    let (status, envelope) = service
        .consultar(
            &payload(json!({ "placa": "abc123" })),
            PayloadSource::JsonBody,
            Instant::now(),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    let body = serde_json::to_value(&envelope).unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["tipo_consulta"], "vehiculo");
    assert_eq!(body["placa"], "ABC123");
    assert_eq!(body["data"]["vehiculos"][0]["marca"], "RENAULT");
    assert_eq!(body["errors"], Value::Null);
}

#[tokio::test]
async fn test_vehicle_not_found_is_successful_404() {
    let mock_server = MockServer::start().await;
    mount_token_mock(&mock_server).await;

    // Empty collection = well-formed query that matched nothing.
    Mock::given(method("POST"))
        .and(path("/graphql/vehiculo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "vehiculos": [] },
            "errors": null
        })))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());
    let service = create_service(&config);

    let (status, envelope) = service
        .consultar(
            &payload(json!({ "placa": "ZZZ999" })),
            PayloadSource::JsonBody,
            Instant::now(),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    let body = serde_json::to_value(&envelope).unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"], Value::Null);
    assert_eq!(
        body["message"],
        "No se encontraron datos para el vehículo especificado"
    );
}

#[tokio::test]
async fn test_customer_found() {
    let mock_server = MockServer::start().await;
    mount_token_mock(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/graphql/cliente"))
        .and(body_string_contains("numeroDocumento: 1032456789"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "cliente": {
                    "tipoDocumento": "CC",
                    "numeroDocumento": "1032456789",
                    "nombreCompleto": "ANA MARIA PEREZ"
                }
            },
            "errors": null
        })))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());
    let service = create_service(&config);

    let (status, envelope) = service
        .consultar(
            &payload(json!({ "tipoDocumento": "cc", "numeroDocumento": "1032456789" })),
            PayloadSource::JsonBody,
            Instant::now(),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    let body = serde_json::to_value(&envelope).unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["tipo_consulta"], "cliente");
    assert_eq!(body["tipo_documento"], "CC");
    assert_eq!(body["numero_documento"], "1032456789");
    assert_eq!(body["data"]["cliente"]["nombreCompleto"], "ANA MARIA PEREZ");
}

#[tokio::test]
async fn test_customer_not_found_when_cliente_null() {
    let mock_server = MockServer::start().await;
    mount_token_mock(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/graphql/cliente"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "cliente": null },
            "errors": null
        })))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());
    let service = create_service(&config);

    let (status, envelope) = service
        .consultar(
            &payload(json!({ "tipoDocumento": "CC", "numeroDocumento": "999999999" })),
            PayloadSource::JsonBody,
            Instant::now(),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    let body = serde_json::to_value(&envelope).unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"], Value::Null);
    assert_eq!(
        body["message"],
        "No se encontraron datos para el cliente especificado"
    );
}

#[tokio::test]
async fn test_partial_data_with_upstream_errors_passes_through() {
    let mock_server = MockServer::start().await;
    mount_token_mock(&mock_server).await;

    // Partial data plus errors is still a dispatcher success; the errors
    // field rides along untouched.
    Mock::given(method("POST"))
        .and(path("/graphql/vehiculo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "vehiculos": [{ "placa": "ABC123" }] },
            "errors": [{ "message": "siniestros resolver timed out" }]
        })))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());
    let service = create_service(&config);

    let (status, envelope) = service
        .consultar(
            &payload(json!({ "placa": "ABC123" })),
            PayloadSource::JsonBody,
            Instant::now(),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    let body = serde_json::to_value(&envelope).unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["errors"][0]["message"], "siniestros resolver timed out");
}

#[tokio::test]
async fn test_token_failure_is_generic_500() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(403).set_body_string("invalid_client secret xyz"))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());
    let service = create_service(&config);

    let (status, envelope) = service
        .consultar(
            &payload(json!({ "placa": "ABC123" })),
            PayloadSource::JsonBody,
            Instant::now(),
        )
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let body = serde_json::to_value(&envelope).unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Error interno al consultar el vehículo");
    assert_eq!(
        body["errors"],
        "Internal server error - Unable to fetch vehicle data"
    );
    // The upstream detail must never leak to the caller.
    assert!(!body.to_string().contains("invalid_client"));
}

#[tokio::test]
async fn test_graphql_http_error_is_generic_500() {
    let mock_server = MockServer::start().await;
    mount_token_mock(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/graphql/cliente"))
        .respond_with(ResponseTemplate::new(502).set_body_string("upstream gateway detail"))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());
    let service = create_service(&config);

    let (status, envelope) = service
        .consultar(
            &payload(json!({ "tipoDocumento": "CC", "numeroDocumento": "1032456789" })),
            PayloadSource::JsonBody,
            Instant::now(),
        )
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let body = serde_json::to_value(&envelope).unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Error interno al consultar el cliente");
    assert!(!body.to_string().contains("upstream gateway detail"));
}

#[tokio::test]
async fn test_detection_failure_lists_both_shapes() {
    // No mocks mounted: the upstream must never be contacted.
    let mock_server = MockServer::start().await;
    let config = create_test_config(&mock_server.uri());
    let service = create_service(&config);

    let (status, envelope) = service
        .consultar(&payload(json!({})), PayloadSource::JsonBody, Instant::now())
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body = serde_json::to_value(&envelope).unwrap();
    assert_eq!(body["success"], false);
    let error = body["error"].as_str().unwrap();
    assert!(error.contains("tipoDocumento"));
    assert!(error.contains("numeroDocumento"));
    assert!(error.contains("placa"));
    assert_eq!(body["errors"], "Unable to detect query type");
}

#[tokio::test]
async fn test_validation_failure_echoes_params_without_upstream_call() {
    let mock_server = MockServer::start().await;
    let config = create_test_config(&mock_server.uri());
    let service = create_service(&config);

    // Strict policy: 5 characters is too short.
    let (status, envelope) = service
        .consultar(
            &payload(json!({ "placa": "ab123" })),
            PayloadSource::JsonBody,
            Instant::now(),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body = serde_json::to_value(&envelope).unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["placa"], "AB123");
    assert_eq!(body["error"], "La placa debe tener entre 6 y 7 caracteres");
}

#[tokio::test]
async fn test_invalid_document_type_names_accepted_set() {
    let mock_server = MockServer::start().await;
    let config = create_test_config(&mock_server.uri());
    let service = create_service(&config);

    let (status, envelope) = service
        .consultar(
            &payload(json!({ "tipoDocumento": "XX", "numeroDocumento": "123456" })),
            PayloadSource::JsonBody,
            Instant::now(),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body = serde_json::to_value(&envelope).unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["tipo_documento"], "XX");
    assert!(body["error"].as_str().unwrap().contains("Tipos válidos"));
}

#[tokio::test]
async fn test_disabled_query_kind_rejected() {
    let mock_server = MockServer::start().await;
    let mut config = create_test_config(&mock_server.uri());
    config.capabilities = Capabilities {
        vehicles: false,
        customers: true,
    };
    let service = create_service(&config);

    let (status, envelope) = service
        .consultar(
            &payload(json!({ "placa": "ABC123" })),
            PayloadSource::JsonBody,
            Instant::now(),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body = serde_json::to_value(&envelope).unwrap();
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("vehiculo"));
}

#[tokio::test]
async fn test_token_reused_across_queries() {
    let mock_server = MockServer::start().await;

    // Exactly one token exchange for two queries.
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "test-token-123",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/graphql/vehiculo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "vehiculos": [{ "placa": "ABC123" }] },
            "errors": null
        })))
        .expect(2)
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());
    let service = create_service(&config);

    for _ in 0..2 {
        let (status, _) = service
            .consultar(
                &payload(json!({ "placa": "ABC123" })),
                PayloadSource::JsonBody,
                Instant::now(),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }
}

#[tokio::test]
async fn test_single_key_heuristic_routes_to_customer() {
    let mock_server = MockServer::start().await;
    mount_token_mock(&mock_server).await;

    // Default document type CC must reach the upstream query.
    Mock::given(method("POST"))
        .and(path("/graphql/cliente"))
        .and(body_string_contains(r#"tipoDocumento: \"CC\""#))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "cliente": { "nombreCompleto": "LUIS" } },
            "errors": null
        })))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());
    let service = create_service(&config);

    let (status, envelope) = service
        .consultar(
            &payload(json!({ "consulta": "1032456789" })),
            PayloadSource::QueryString,
            Instant::now(),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    let body = serde_json::to_value(&envelope).unwrap();
    assert_eq!(body["tipo_consulta"], "cliente");
    assert_eq!(body["tipo_documento"], "CC");
}

#[tokio::test]
async fn test_concurrent_queries() {
    let mock_server = MockServer::start().await;
    mount_token_mock(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/graphql/vehiculo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "vehiculos": [{ "placa": "ABC123" }] },
            "errors": null
        })))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());
    let service = std::sync::Arc::new(create_service(&config));

    let mut handles = vec![];
    for _ in 0..10 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service
                .consultar(
                    &payload(json!({ "placa": "ABC123" })),
                    PayloadSource::JsonBody,
                    Instant::now(),
                )
                .await
        }));
    }

    for handle in handles {
        let (status, _) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
    }
}
