//! Event envelope types shared by every danmu crate.

pub mod envelope;
pub mod error;
pub mod formatted;

pub use {
    envelope::{
        ChatData, EndLiveData, EnterRoomData, Envelope, EventKind, GiftData, LikeData, Payload,
        Platform, SubscribeData, SuperChatData,
    },
    error::DecodeError,
    formatted::FormattedEnvelope,
};
