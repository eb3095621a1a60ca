//! Callroom relay server library.
//!
//! Exposes the relay server for use in tests and embedding. The server
//! accepts WebSocket connections, lets each client join named rooms, and fans
//! `voice-data` out to the other members of a room. It also serves a health
//! check and a language-model connectivity probe over HTTP.

pub mod api;
pub mod config;
pub mod hub;
pub mod probe;
pub mod rate_limit;
pub mod relay;
pub mod server;
