//! Unified Insurance Lookup API Library
//!
//! This library provides the core functionality for the unified consulta
//! API: query-type detection over loosely-structured payloads, syntactic
//! validation, dispatch to the Conecta GraphQL provider, and uniform
//! response-envelope shaping.
//!
//! # Modules
//!
//! - `circuit_breaker`: Circuit breaker guarding the upstream endpoint.
//! - `config`: Configuration management.
//! - `detector`: Query-type detection and normalization.
//! - `dispatcher`: Request dispatch and response shaping.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `models`: Core data models and the response envelope.
//! - `upstream`: Conecta GraphQL client (OAuth2 + GraphQL transport).
//! - `validator`: Parameter validation and plate policies.

pub mod circuit_breaker;
pub mod config;
pub mod detector;
pub mod dispatcher;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod upstream;
pub mod validator;
