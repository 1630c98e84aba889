use thiserror::Error;

/// A single inbound message that could not be turned into an [`crate::Envelope`].
///
/// Always scoped to one message; the connection that produced it stays open.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed message: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("unknown event kind: {0}")]
    UnknownKind(String),

    #[error("message of kind {kind} has no data")]
    MissingData { kind: String },

    #[error("{kind} payload does not match its schema: {source}")]
    Shape {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

impl DecodeError {
    /// Kind tag the failing message carried, when it got that far.
    pub fn kind(&self) -> Option<&str> {
        match self {
            Self::Malformed(_) => None,
            Self::UnknownKind(kind) | Self::MissingData { kind } | Self::Shape { kind, .. } => {
                Some(kind)
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_reported_once_known() {
        let malformed = DecodeError::Malformed(serde_json::from_str::<u8>("x").unwrap_err());
        assert_eq!(malformed.kind(), None);
        assert_eq!(DecodeError::UnknownKind("Dance".into()).kind(), Some("Dance"));
        let missing = DecodeError::MissingData {
            kind: "Gift".into(),
        };
        assert_eq!(missing.kind(), Some("Gift"));
        assert_eq!(missing.to_string(), "message of kind Gift has no data");
    }
}
