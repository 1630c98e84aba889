use {
    chrono::{DateTime, Local},
    serde::Serialize,
};

use crate::envelope::EventKind;

/// Display-ready projection of an [`crate::Envelope`].
///
/// Serialized as the JSON pushed to dashboard viewers; the original kind stays
/// in memory only.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedEnvelope {
    pub user_name: String,
    pub platform: String,
    pub avatar: String,
    pub content: String,
    pub timestamp: DateTime<Local>,
    #[serde(rename = "type")]
    pub label: String,
    #[serde(skip)]
    pub kind: EventKind,
}

impl FormattedEnvelope {
    pub fn new(
        kind: EventKind,
        user_name: impl Into<String>,
        platform: impl Into<String>,
        avatar: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            user_name: user_name.into(),
            platform: platform.into(),
            avatar: avatar.into(),
            content: content.into(),
            timestamp: Local::now(),
            label: kind.label().to_string(),
            kind,
        }
    }
}
