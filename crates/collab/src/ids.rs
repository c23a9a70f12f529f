use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use snafu::ensure;

use super::error::{CollabError, CollabResult, InvalidIdSnafu};

// Chat SDK ids are opaque strings; every wrapper rejects blank input the same way.
macro_rules! define_collab_id {
    ($name:ident, $id_type:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            pub fn parse(raw: &str) -> CollabResult<Self> {
                let trimmed = raw.trim();
                ensure!(
                    !trimmed.is_empty(),
                    InvalidIdSnafu {
                        stage: "parse-collab-id",
                        id_type: $id_type,
                        raw: raw.to_string(),
                    }
                );
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }

        impl FromStr for $name {
            type Err = CollabError;

            fn from_str(raw: &str) -> CollabResult<Self> {
                Self::parse(raw)
            }
        }
    };
}

define_collab_id!(MessageId, "message-id");
define_collab_id!(ConversationId, "conversation-id");
define_collab_id!(UserId, "user-id");
define_collab_id!(AttachmentId, "attachment-id");
define_collab_id!(AssetId, "asset-id");

impl AssetId {
    /// Mints a time-ordered id for a freshly captured audio asset.
    pub fn new_v7() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trims_and_rejects_blank_ids() {
        let parsed = MessageId::parse("  m-1 ").expect("valid id");
        assert_eq!(parsed.as_str(), "m-1");

        let error = ConversationId::parse("   ").expect_err("blank id");
        assert!(matches!(
            error,
            CollabError::InvalidId {
                id_type: "conversation-id",
                ..
            }
        ));
    }

    #[test]
    fn minted_asset_ids_are_unique() {
        assert_ne!(AssetId::new_v7(), AssetId::new_v7());
    }
}
