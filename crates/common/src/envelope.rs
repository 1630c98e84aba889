//! Inbound event envelope and its typed payloads.
//!
//! The wire format is one JSON object per event:
//! `{"rid": "...", "platform": "...", "type": "<EventKind>", "data": {...}}`.
//! The `type` field selects which payload schema `data` is parsed with.

use std::{fmt, str::FromStr};

use {
    serde::{Deserialize, Deserializer, Serialize},
    serde_json::Value,
};

use crate::{error::DecodeError, formatted::FormattedEnvelope};

// ── Platform ────────────────────────────────────────────────────────────────

/// Source platform tag. Unknown platforms are carried verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Platform(String);

impl Platform {
    pub const DOUYIN: &'static str = "douyin";
    pub const BILIBILI: &'static str = "bilibili";
    pub const KUAISHOU: &'static str = "kuaishou";
    pub const DOUYU: &'static str = "douyu";
    pub const HUYA: &'static str = "huya";

    /// Platforms the remote capture service knows how to connect to.
    pub const KNOWN: &'static [&'static str] = &[
        Self::DOUYIN,
        Self::BILIBILI,
        Self::KUAISHOU,
        Self::DOUYU,
        Self::HUYA,
    ];

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_known(&self) -> bool {
        Self::KNOWN.contains(&self.0.as_str())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Platform {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ── EventKind ───────────────────────────────────────────────────────────────

/// The closed set of event kinds the stream can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Chat,
    Gift,
    Like,
    EnterRoom,
    Subscribe,
    SuperChat,
    EndLive,
}

impl EventKind {
    /// All variants, for iteration.
    pub const ALL: &'static [EventKind] = &[
        Self::Chat,
        Self::Gift,
        Self::Like,
        Self::EnterRoom,
        Self::Subscribe,
        Self::SuperChat,
        Self::EndLive,
    ];

    /// Name used on the wire and in configuration allow-lists.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "Chat",
            Self::Gift => "Gift",
            Self::Like => "Like",
            Self::EnterRoom => "EnterRoom",
            Self::Subscribe => "Subscribe",
            Self::SuperChat => "SuperChat",
            Self::EndLive => "EndLive",
        }
    }

    /// Lowercase label used by formatted envelopes and the dashboard.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Gift => "gift",
            Self::Like => "like",
            Self::EnterRoom => "enterroom",
            Self::Subscribe => "subscribe",
            Self::SuperChat => "superchat",
            Self::EndLive => "endlive",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| DecodeError::UnknownKind(s.to_string()))
    }
}

// ── Payloads ────────────────────────────────────────────────────────────────

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatData {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub avatar: String,
    #[serde(deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(deserialize_with = "null_as_default")]
    pub emoticon: Vec<String>,
    pub raw: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GiftData {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub avatar: String,
    #[serde(deserialize_with = "null_as_default")]
    pub item: String,
    #[serde(deserialize_with = "null_as_default")]
    pub num: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub price: f64,
    #[serde(rename = "giftIcon", deserialize_with = "null_as_default")]
    pub gift_icon: String,
    pub raw: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LikeData {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub avatar: String,
    #[serde(deserialize_with = "null_as_default")]
    pub count: i64,
    pub raw: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnterRoomData {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub avatar: String,
    pub raw: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscribeData {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub avatar: String,
    #[serde(deserialize_with = "null_as_default")]
    pub item: String,
    #[serde(deserialize_with = "null_as_default")]
    pub num: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub price: f64,
    pub raw: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuperChatData {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub avatar: String,
    #[serde(deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(deserialize_with = "null_as_default")]
    pub price: f64,
    pub raw: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndLiveData {
    pub raw: Value,
}

/// Decoded payload, one variant per [`EventKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Chat(ChatData),
    Gift(GiftData),
    Like(LikeData),
    EnterRoom(EnterRoomData),
    Subscribe(SubscribeData),
    SuperChat(SuperChatData),
    EndLive(EndLiveData),
}

impl Payload {
    fn decode(kind: EventKind, data: Value) -> Result<Self, DecodeError> {
        let shape = |source| DecodeError::Shape {
            kind: kind.to_string(),
            source,
        };
        Ok(match kind {
            EventKind::Chat => Self::Chat(serde_json::from_value(data).map_err(shape)?),
            EventKind::Gift => Self::Gift(serde_json::from_value(data).map_err(shape)?),
            EventKind::Like => Self::Like(serde_json::from_value(data).map_err(shape)?),
            EventKind::EnterRoom => Self::EnterRoom(serde_json::from_value(data).map_err(shape)?),
            EventKind::Subscribe => Self::Subscribe(serde_json::from_value(data).map_err(shape)?),
            EventKind::SuperChat => Self::SuperChat(serde_json::from_value(data).map_err(shape)?),
            EventKind::EndLive => Self::EndLive(serde_json::from_value(data).map_err(shape)?),
        })
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::Chat(_) => EventKind::Chat,
            Self::Gift(_) => EventKind::Gift,
            Self::Like(_) => EventKind::Like,
            Self::EnterRoom(_) => EventKind::EnterRoom,
            Self::Subscribe(_) => EventKind::Subscribe,
            Self::SuperChat(_) => EventKind::SuperChat,
            Self::EndLive(_) => EventKind::EndLive,
        }
    }

    /// Sender display name. Stream-end events have no sender.
    pub fn sender(&self) -> Option<&str> {
        match self {
            Self::Chat(d) => Some(&d.name),
            Self::Gift(d) => Some(&d.name),
            Self::Like(d) => Some(&d.name),
            Self::EnterRoom(d) => Some(&d.name),
            Self::Subscribe(d) => Some(&d.name),
            Self::SuperChat(d) => Some(&d.name),
            Self::EndLive(_) => None,
        }
    }

    pub fn avatar(&self) -> Option<&str> {
        match self {
            Self::Chat(d) => Some(&d.avatar),
            Self::Gift(d) => Some(&d.avatar),
            Self::Like(d) => Some(&d.avatar),
            Self::EnterRoom(d) => Some(&d.avatar),
            Self::Subscribe(d) => Some(&d.avatar),
            Self::SuperChat(d) => Some(&d.avatar),
            Self::EndLive(_) => None,
        }
    }
}

// ── Envelope ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    rid: String,
    #[serde(default)]
    platform: String,
    #[serde(rename = "type")]
    kind: String,
    data: Option<Value>,
}

/// One decoded inbound event.
///
/// Decoding happens once, at ingestion. An envelope that exists always carries
/// a payload matching its kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub room_id: String,
    pub platform: Platform,
    pub kind: EventKind,
    /// The `data` object exactly as received.
    pub raw: Value,
    pub payload: Payload,
    /// Display projection, set by the format transform.
    pub formatted: Option<FormattedEnvelope>,
}

impl Envelope {
    pub fn new(room_id: impl Into<String>, platform: impl Into<Platform>, payload: Payload) -> Self {
        Self {
            room_id: room_id.into(),
            platform: platform.into(),
            kind: payload.kind(),
            raw: Value::Null,
            payload,
            formatted: None,
        }
    }

    /// Decode one wire message. Fails closed: an unknown kind, a missing
    /// `data` object or a payload of the wrong shape yields an error and no
    /// envelope.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let wire: WireMessage = serde_json::from_str(text).map_err(DecodeError::Malformed)?;
        let kind: EventKind = wire.kind.parse()?;
        let raw = wire.data.ok_or_else(|| DecodeError::MissingData {
            kind: kind.to_string(),
        })?;
        let payload = Payload::decode(kind, raw.clone())?;
        Ok(Self {
            room_id: wire.rid,
            platform: Platform::new(wire.platform),
            kind,
            raw,
            payload,
            formatted: None,
        })
    }

    pub fn with_formatted(mut self, formatted: FormattedEnvelope) -> Self {
        self.formatted = Some(formatted);
        self
    }
}
