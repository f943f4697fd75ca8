//! Gateway de avaliação.
//!
//! - [`coordinator`] - Decide, por requisição, entre cache, admissão e avaliação
//! - [`http`] - Endpoint HTTP, limite de corpo e CORS

pub mod coordinator;
pub mod http;

pub use coordinator::{Gateway, GatewaySettings};
pub use http::{router, serve, AppState, CorsPolicy};
