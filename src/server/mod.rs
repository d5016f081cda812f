//! HTTP and WebSocket surface
//!
//! Routes requests onto the relay service. Every request carries the shared
//! token and user key headers; WebSocket upgrades additionally carry the
//! device's client id, which becomes its connection id in the registry.

pub mod config;
pub mod listener;
pub mod response;
pub mod routes;
pub mod ws;

pub use config::{ServerConfig, DEFAULT_MAX_REQUEST_BODY};
pub use listener::ClipServer;
pub use response::{ApiError, ApiResponse};
pub use routes::{router, AppState, AUTH_TOKEN_HEADER, CLIENT_ID_HEADER, USER_KEY_HEADER};
pub use ws::WsTransport;
