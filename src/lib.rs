//! A reverse proxy that synthesizes OpenAI-style tool calling over chat-completions
//! endpoints that only speak plain text.
//!
//! The public surface is deliberately small: [`config::AppConfig`] and [`logger`]
//! for process startup, [`proxy::ProxyState`] and [`proxy::router`] to assemble the
//! HTTP service, and the [`markers`]/[`transcode`] modules for the protocol itself.
//! Everything else is wiring.

pub mod clock;
pub mod config;
pub mod error;
pub mod http_client;
pub mod logger;
pub mod markers;
pub mod protocol;
pub mod proxy;
pub mod request_log;
pub mod system_prompt;
pub mod transcode;
