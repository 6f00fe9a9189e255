//! The platform's XML message shapes.
//!
//! Inbound requests decode into one flat record covering every message and
//! event subtype; only the subset matching `MsgType`/`Event` is meaningful,
//! the rest stays at zero value. Outbound replies are a closed family of
//! bodies sharing one header, serialized with every leaf wrapped in CDATA so
//! user content never fights the XML escaper.

use std::io;

use quick_xml::events::{BytesCData, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use serde::Deserialize;

use crate::envelope::Envelope;
use crate::error::Error;

// Message types.
pub const MSG_TYPE_TEXT: &str = "text";
pub const MSG_TYPE_IMAGE: &str = "image";
pub const MSG_TYPE_VOICE: &str = "voice";
pub const MSG_TYPE_VIDEO: &str = "video";
pub const MSG_TYPE_SHORT_VIDEO: &str = "shortvideo";
pub const MSG_TYPE_LOCATION: &str = "location";
pub const MSG_TYPE_LINK: &str = "link";
pub const MSG_TYPE_EVENT: &str = "event";

// Event types. Scan/location/menu events arrive upper-cased on the wire.
pub const EVENT_SUBSCRIBE: &str = "subscribe";
pub const EVENT_UNSUBSCRIBE: &str = "unsubscribe";
pub const EVENT_SCAN: &str = "SCAN";
pub const EVENT_LOCATION: &str = "LOCATION";
pub const EVENT_CLICK: &str = "CLICK";
pub const EVENT_VIEW: &str = "VIEW";

/// Flat view of an inbound request. Unknown elements are ignored so new
/// platform fields do not break decoding.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct InboundMessage {
    #[serde(rename = "Encrypt")]
    pub encrypt: String,
    #[serde(rename = "ToUserName")]
    pub to_user_name: String,
    #[serde(rename = "FromUserName")]
    pub from_user_name: String,
    #[serde(rename = "CreateTime")]
    pub create_time: i64,
    #[serde(rename = "MsgType")]
    pub msg_type: String,

    // Ordinary message fields.
    #[serde(rename = "Content")]
    pub content: String,
    #[serde(rename = "PicUrl")]
    pub pic_url: String,
    #[serde(rename = "MediaId")]
    pub media_id: String,
    #[serde(rename = "Format")]
    pub format: String,
    #[serde(rename = "Recognition")]
    pub recognition: String,
    #[serde(rename = "ThumbMediaId")]
    pub thumb_media_id: String,
    #[serde(rename = "Location_X")]
    pub location_x: f64,
    #[serde(rename = "Location_Y")]
    pub location_y: f64,
    #[serde(rename = "Scale")]
    pub scale: i64,
    #[serde(rename = "Label")]
    pub label: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Url")]
    pub url: String,
    #[serde(rename = "MsgId")]
    pub msg_id: i64,

    // Event push fields.
    #[serde(rename = "Event")]
    pub event: String,
    #[serde(rename = "EventKey")]
    pub event_key: String,
    #[serde(rename = "Ticket")]
    pub ticket: String,
    #[serde(rename = "Latitude")]
    pub latitude: f64,
    #[serde(rename = "Longitude")]
    pub longitude: f64,
    #[serde(rename = "Precision")]
    pub precision: f64,
}

/// Decode the raw request body (or a decrypted inner payload).
pub fn decode_inbound(raw: &[u8]) -> Result<InboundMessage, Error> {
    Ok(quick_xml::de::from_reader(raw)?)
}

/// Shared header of every reply; destination and source are the inbound
/// identities reversed.
#[derive(Debug, Clone)]
pub struct ReplyHeader {
    pub to_user_name: String,
    pub from_user_name: String,
    pub create_time: u64,
}

/// One entry of a news reply.
#[derive(Debug, Clone, Default)]
pub struct Article {
    pub title: String,
    pub description: String,
    pub pic_url: String,
    pub url: String,
}

/// The closed set of passive reply bodies.
#[derive(Debug, Clone)]
pub enum ReplyBody {
    Text {
        content: String,
    },
    Image {
        media_id: String,
    },
    Voice {
        media_id: String,
    },
    Video {
        media_id: String,
        title: String,
        description: String,
    },
    Music {
        title: String,
        description: String,
        music_url: String,
        hq_music_url: String,
        thumb_media_id: String,
    },
    News {
        articles: Vec<Article>,
    },
    /// Hands the conversation to a human agent, optionally a named one.
    TransferCustomerService {
        kf_account: String,
    },
}

impl ReplyBody {
    /// Wire value of the reply's `MsgType` element.
    pub fn msg_type(&self) -> &'static str {
        match self {
            ReplyBody::Text { .. } => "text",
            ReplyBody::Image { .. } => "image",
            ReplyBody::Voice { .. } => "voice",
            ReplyBody::Video { .. } => "video",
            ReplyBody::Music { .. } => "music",
            ReplyBody::News { .. } => "news",
            ReplyBody::TransferCustomerService { .. } => "transfer_customer_service",
        }
    }
}

/// Serialize a reply. Media bodies nest under their type-named wrapper
/// element; news repeats an `item` per article with an explicit count.
pub fn encode_reply(header: &ReplyHeader, body: &ReplyBody) -> Result<Vec<u8>, Error> {
    let mut writer = Writer::new(Vec::new());
    start(&mut writer, "xml")?;

    cdata(&mut writer, "ToUserName", &header.to_user_name)?;
    cdata(&mut writer, "FromUserName", &header.from_user_name)?;
    cdata(&mut writer, "CreateTime", &header.create_time.to_string())?;
    cdata(&mut writer, "MsgType", body.msg_type())?;

    match body {
        ReplyBody::Text { content } => {
            cdata(&mut writer, "Content", content)?;
        }
        ReplyBody::Image { media_id } => {
            start(&mut writer, "Image")?;
            cdata(&mut writer, "MediaId", media_id)?;
            end(&mut writer, "Image")?;
        }
        ReplyBody::Voice { media_id } => {
            start(&mut writer, "Voice")?;
            cdata(&mut writer, "MediaId", media_id)?;
            end(&mut writer, "Voice")?;
        }
        ReplyBody::Video {
            media_id,
            title,
            description,
        } => {
            start(&mut writer, "Video")?;
            cdata(&mut writer, "MediaId", media_id)?;
            cdata(&mut writer, "Title", title)?;
            cdata(&mut writer, "Description", description)?;
            end(&mut writer, "Video")?;
        }
        ReplyBody::Music {
            title,
            description,
            music_url,
            hq_music_url,
            thumb_media_id,
        } => {
            start(&mut writer, "Music")?;
            cdata(&mut writer, "Title", title)?;
            cdata(&mut writer, "Description", description)?;
            cdata(&mut writer, "MusicUrl", music_url)?;
            cdata(&mut writer, "HQMusicUrl", hq_music_url)?;
            cdata(&mut writer, "ThumbMediaId", thumb_media_id)?;
            end(&mut writer, "Music")?;
        }
        ReplyBody::News { articles } => {
            cdata(&mut writer, "ArticleCount", &articles.len().to_string())?;
            start(&mut writer, "Articles")?;
            for article in articles {
                start(&mut writer, "item")?;
                cdata(&mut writer, "Title", &article.title)?;
                cdata(&mut writer, "Description", &article.description)?;
                cdata(&mut writer, "PicUrl", &article.pic_url)?;
                cdata(&mut writer, "Url", &article.url)?;
                end(&mut writer, "item")?;
            }
            end(&mut writer, "Articles")?;
        }
        ReplyBody::TransferCustomerService { kf_account } => {
            start(&mut writer, "TransInfo")?;
            cdata(&mut writer, "KfAccount", kf_account)?;
            end(&mut writer, "TransInfo")?;
        }
    }

    end(&mut writer, "xml")?;
    Ok(writer.into_inner())
}

/// Serialize the safe-mode reply wrapper around a sealed envelope.
pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>, Error> {
    let mut writer = Writer::new(Vec::new());
    start(&mut writer, "xml")?;
    cdata(&mut writer, "Encrypt", &envelope.encrypt)?;
    cdata(&mut writer, "MsgSignature", &envelope.msg_signature)?;
    cdata(&mut writer, "TimeStamp", &envelope.timestamp)?;
    cdata(&mut writer, "Nonce", &envelope.nonce)?;
    end(&mut writer, "xml")?;
    Ok(writer.into_inner())
}

fn start(writer: &mut Writer<Vec<u8>>, tag: &str) -> io::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))
}

fn end(writer: &mut Writer<Vec<u8>>, tag: &str) -> io::Result<()> {
    writer.write_event(Event::End(BytesEnd::new(tag)))
}

fn cdata(writer: &mut Writer<Vec<u8>>, tag: &str, value: &str) -> io::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    // "]]>" cannot appear inside a CDATA section; split it across two
    // sections ("]]" ends one, ">" opens the next) so the value survives
    // round-tripping instead of terminating the section early.
    let mut rest = value;
    while let Some(pos) = rest.find("]]>") {
        let head = format!("{}]]", &rest[..pos]);
        writer.write_event(Event::CData(BytesCData::new(head)))?;
        rest = &rest[pos + 2..];
    }
    writer.write_event(Event::CData(BytesCData::new(rest)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))
}
