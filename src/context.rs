//! Per-request state: the parsed inbound message, the resolved secrets and a
//! write-once slot for the HTTP response.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::crypto::AES_KEY_LEN;
use crate::envelope;
use crate::error::Error;
use crate::message::{self, Article, InboundMessage, ReplyBody, ReplyHeader};

pub(crate) const MIME_XML: &str = "text/xml; charset=utf-8";
pub(crate) const MIME_PLAIN: &str = "text/plain; charset=utf-8";

/// Query parameters the platform attaches to every callback.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct CallbackQuery {
    pub signature: String,
    pub msg_signature: String,
    pub timestamp: String,
    pub nonce: String,
    pub echostr: String,
    pub appid: String,
    pub encrypt_type: String,
}

/// The single response a request produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl IntoResponse for WebhookResponse {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CONTENT_TYPE, self.content_type)],
            self.body,
        )
            .into_response()
    }
}

/// State for one request-response cycle. One instance per request; never
/// reused, never shared between requests.
///
/// All reply methods funnel through the same write-once guard: the first
/// write wins and every later attempt (a second handler reply, the engine's
/// fallback acknowledgment) is silently dropped.
pub struct Context {
    /// The inbound message. Populated once by XML decoding, then again from
    /// the decrypted inner payload when the request came in safe mode.
    pub msg: InboundMessage,

    query: CallbackQuery,
    pub(crate) token: String,
    pub(crate) aes_key: Option<[u8; AES_KEY_LEN]>,
    response: Option<WebhookResponse>,
}

impl Context {
    pub(crate) fn new(query: CallbackQuery) -> Self {
        Self {
            msg: InboundMessage::default(),
            query,
            token: String::new(),
            aes_key: None,
            response: None,
        }
    }

    /// Account identifier this callback targets, from the `appid` parameter.
    pub fn app_id(&self) -> &str {
        &self.query.appid
    }

    /// Whether the request selected the encrypted-envelope transport.
    pub fn safe_mode(&self) -> bool {
        self.query.encrypt_type == "aes"
    }

    pub(crate) fn query(&self) -> &CallbackQuery {
        &self.query
    }

    pub fn reply_text(&mut self, content: impl Into<String>) -> Result<(), Error> {
        self.reply(ReplyBody::Text {
            content: content.into(),
        })
    }

    pub fn reply_image(&mut self, media_id: impl Into<String>) -> Result<(), Error> {
        self.reply(ReplyBody::Image {
            media_id: media_id.into(),
        })
    }

    pub fn reply_voice(&mut self, media_id: impl Into<String>) -> Result<(), Error> {
        self.reply(ReplyBody::Voice {
            media_id: media_id.into(),
        })
    }

    pub fn reply_video(
        &mut self,
        media_id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<(), Error> {
        self.reply(ReplyBody::Video {
            media_id: media_id.into(),
            title: title.into(),
            description: description.into(),
        })
    }

    pub fn reply_music(
        &mut self,
        title: impl Into<String>,
        description: impl Into<String>,
        music_url: impl Into<String>,
        hq_music_url: impl Into<String>,
        thumb_media_id: impl Into<String>,
    ) -> Result<(), Error> {
        self.reply(ReplyBody::Music {
            title: title.into(),
            description: description.into(),
            music_url: music_url.into(),
            hq_music_url: hq_music_url.into(),
            thumb_media_id: thumb_media_id.into(),
        })
    }

    pub fn reply_news(&mut self, articles: Vec<Article>) -> Result<(), Error> {
        self.reply(ReplyBody::News { articles })
    }

    /// Forward the conversation to customer service; an empty account name
    /// lets the platform pick an agent.
    pub fn transfer_customer_service(
        &mut self,
        kf_account: impl Into<String>,
    ) -> Result<(), Error> {
        self.reply(ReplyBody::TransferCustomerService {
            kf_account: kf_account.into(),
        })
    }

    /// Build and write a reply of the given body, echoing the inbound header
    /// reversed. Sealed into an encrypted envelope when the request came in
    /// safe mode.
    pub fn reply(&mut self, body: ReplyBody) -> Result<(), Error> {
        let header = ReplyHeader {
            to_user_name: self.msg.from_user_name.clone(),
            from_user_name: self.msg.to_user_name.clone(),
            create_time: envelope::unix_timestamp(),
        };
        let mut data = message::encode_reply(&header, &body)?;

        if self.safe_mode() {
            let key = self.aes_key.as_ref().ok_or(Error::AesKeyNotFound)?;
            let sealed = envelope::seal(&data, self.app_id(), key, &self.token)?;
            data = message::encode_envelope(&sealed)?;
        }

        self.respond(StatusCode::OK, MIME_XML, data);
        Ok(())
    }

    /// The fixed acknowledgment the platform requires when no handler
    /// produced a reply. A no-op once anything was written.
    pub fn no_reply(&mut self) {
        self.respond(StatusCode::OK, MIME_PLAIN, b"success".to_vec());
    }

    pub(crate) fn respond(&mut self, status: StatusCode, content_type: &'static str, body: Vec<u8>) {
        if self.response.is_none() {
            self.response = Some(WebhookResponse {
                status,
                content_type,
                body,
            });
        }
    }

    pub(crate) fn respond_error(&mut self, err: &Error) {
        self.respond(err.status(), MIME_PLAIN, err.to_string().into_bytes());
    }

    pub(crate) fn into_response(mut self) -> WebhookResponse {
        self.no_reply();
        self.response.take().unwrap_or(WebhookResponse {
            status: StatusCode::OK,
            content_type: MIME_PLAIN,
            body: b"success".to_vec(),
        })
    }
}
