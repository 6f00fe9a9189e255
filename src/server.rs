//! The request pipeline: parse, authenticate, verify-or-deliver, decrypt,
//! dispatch, finalize. Each inbound request is processed start to finish on
//! its own task; the only state shared between requests is the secret store.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{Method, StatusCode};
use axum::routing::any;
use axum::Router;

use crate::context::{CallbackQuery, Context, WebhookResponse, MIME_PLAIN};
use crate::crypto;
use crate::envelope;
use crate::error::Error;
use crate::message::{self, InboundMessage, MSG_TYPE_EVENT};
use crate::store::SecretStore;

/// Application callback, registered per message-type or event-type string.
///
/// Invoked with the request context; may call at most one reply method and
/// must not assume it is the only writer of the response (the engine's
/// fallback acknowledgment runs after it either way).
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: &mut Context) -> Result<(), Error>;
}

/// Plain functions and closures over the context are handlers too.
#[async_trait]
impl<F> Handler for F
where
    F: for<'a> Fn(&'a mut Context) -> Result<(), Error> + Send + Sync,
{
    async fn handle(&self, ctx: &mut Context) -> Result<(), Error> {
        self(ctx)
    }
}

/// The webhook protocol engine.
///
/// Handler tables are built before serving and read-only afterwards; the
/// consuming builder makes late registration unrepresentable.
pub struct WebhookServer {
    store: Arc<dyn SecretStore>,
    default_handler: Option<Arc<dyn Handler>>,
    msg_handlers: HashMap<String, Arc<dyn Handler>>,
    event_handlers: HashMap<String, Arc<dyn Handler>>,
}

impl WebhookServer {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self {
            store,
            default_handler: None,
            msg_handlers: HashMap::new(),
            event_handlers: HashMap::new(),
        }
    }

    /// Register a handler for an ordinary message type (`text`, `image`, ...).
    pub fn on_msg(mut self, msg_type: impl Into<String>, handler: impl Handler + 'static) -> Self {
        self.msg_handlers.insert(msg_type.into(), Arc::new(handler));
        self
    }

    /// Register a handler for an event type (`subscribe`, `CLICK`, ...).
    pub fn on_event(
        mut self,
        event_type: impl Into<String>,
        handler: impl Handler + 'static,
    ) -> Self {
        self.event_handlers
            .insert(event_type.into(), Arc::new(handler));
        self
    }

    /// Fallback handler for types with no specific registration.
    pub fn on_default(mut self, handler: impl Handler + 'static) -> Self {
        self.default_handler = Some(Arc::new(handler));
        self
    }

    /// Process one request. The transport-independent entry point; the axum
    /// route below is a thin shim over it.
    pub async fn handle(&self, method: Method, query: CallbackQuery, body: &[u8]) -> WebhookResponse {
        let mut ctx = Context::new(query);
        if let Err(err) = self.process(&method, &mut ctx, body).await {
            tracing::warn!(app_id = %ctx.app_id(), "webhook request failed: {err}");
            ctx.respond_error(&err);
        }
        ctx.into_response()
    }

    async fn process(&self, method: &Method, ctx: &mut Context, body: &[u8]) -> Result<(), Error> {
        let delivery = *method == Method::POST;
        if delivery {
            ctx.msg = message::decode_inbound(body)?;
        }

        self.authenticate(ctx).await?;

        // The platform's one-time URL-ownership probe: echo and stop.
        if !delivery {
            let echo = ctx.query().echostr.clone().into_bytes();
            ctx.respond(StatusCode::OK, MIME_PLAIN, echo);
            return Ok(());
        }

        if ctx.safe_mode() {
            self.decrypt_inbound(ctx).await?;
        }

        if let Some(handler) = self.match_handler(&ctx.msg) {
            tracing::debug!(
                msg_type = %ctx.msg.msg_type,
                event = %ctx.msg.event,
                "dispatching webhook message"
            );
            handler.handle(ctx).await?;
        }

        Ok(())
    }

    /// Resolve the account token and check the supplied signature against the
    /// locally computed one. Safe mode signs the ciphertext too and uses the
    /// `msg_signature` parameter.
    async fn authenticate(&self, ctx: &mut Context) -> Result<(), Error> {
        ctx.token = self.store.token(ctx.app_id()).await?;

        let query = ctx.query();
        let (expected, supplied) = if ctx.safe_mode() {
            (
                crypto::sign(
                    &ctx.token,
                    &query.timestamp,
                    &query.nonce,
                    Some(&ctx.msg.encrypt),
                ),
                query.msg_signature.as_str(),
            )
        } else {
            (
                crypto::sign(&ctx.token, &query.timestamp, &query.nonce, None),
                query.signature.as_str(),
            )
        };

        if expected != supplied {
            return Err(Error::SignatureMismatch);
        }
        Ok(())
    }

    /// Open the envelope carried in the `Encrypt` field and re-decode the
    /// authenticated inner XML over the request's message. Only runs after
    /// the signature check passed.
    async fn decrypt_inbound(&self, ctx: &mut Context) -> Result<(), Error> {
        let encoded = self.store.encoding_aes_key(ctx.app_id()).await?;
        let key = crypto::decode_aes_key(&encoded)?;
        let inner = envelope::open(&ctx.msg.encrypt, &key)?;
        ctx.msg = message::decode_inbound(&inner)?;
        ctx.aes_key = Some(key);
        Ok(())
    }

    fn match_handler(&self, msg: &InboundMessage) -> Option<&Arc<dyn Handler>> {
        let keyed = if msg.msg_type == MSG_TYPE_EVENT {
            self.event_handlers.get(&msg.event)
        } else {
            self.msg_handlers.get(&msg.msg_type)
        };
        keyed.or(self.default_handler.as_ref())
    }

    /// Mount the engine at `/`, answering both the GET verification probe and
    /// POST deliveries.
    pub fn into_router(self) -> Router {
        Router::new()
            .route("/", any(callback))
            .with_state(Arc::new(self))
    }

    /// Bind and serve. Convenience over `into_router` for deployments without
    /// an existing axum app; deadlines and shutdown stay the caller's job.
    pub async fn serve(self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("webhook server listening on {addr}");
        axum::serve(listener, self.into_router()).await
    }
}

async fn callback(
    State(server): State<Arc<WebhookServer>>,
    method: Method,
    Query(query): Query<CallbackQuery>,
    body: Bytes,
) -> WebhookResponse {
    server.handle(method, query, &body).await
}
