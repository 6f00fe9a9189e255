//! Server-side protocol engine for WeChat official-account webhooks.
//!
//! The platform delivers user messages and events as XML over HTTP, signed
//! with a per-account token and optionally wrapped in an AES-256-CBC
//! envelope. This crate authenticates each request, opens and re-seals the
//! envelope, decodes the platform's XML shapes, dispatches to handlers
//! registered by message or event type, and guarantees exactly one response
//! per request.
//!
//! ```no_run
//! use std::sync::Arc;
//! use wechat_webhook::{Context, MemoryStore, WebhookServer};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let store = MemoryStore::new();
//!     store.set_token("wx_app_1", "token123");
//!
//!     let server = WebhookServer::new(Arc::new(store))
//!         .on_msg("text", |ctx: &mut Context| ctx.reply_text("hello"))
//!         .on_event("subscribe", |ctx: &mut Context| ctx.reply_text("welcome"));
//!
//!     server.serve("0.0.0.0:8080".parse().unwrap()).await
//! }
//! ```

pub mod context;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod message;
pub mod server;
pub mod store;

pub use context::{CallbackQuery, Context, WebhookResponse};
pub use envelope::Envelope;
pub use error::Error;
pub use message::{Article, InboundMessage, ReplyBody, ReplyHeader};
pub use server::{Handler, WebhookServer};
pub use store::{MemoryStore, SecretStore};
