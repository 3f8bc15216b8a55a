//! Conversation content blocks, generalized from `neuron-turn::types::ContentPart`
//! and `layer0::content::ContentBlock` down to exactly what the LMM gateway
//! needs: text and base64 images. Images are carried as opaque base64 text
//! end to end — nothing in this crate decodes `ImageSource::Base64`.

use serde::{Deserialize, Serialize};

/// Role of a message author in a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System / instruction message.
    System,
    /// User-authored message (the LMM call we make).
    User,
    /// Model-authored message (the LMM's reply).
    Assistant,
}

/// Where an image's bytes came from, carried as opaque base64 text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageSource {
    /// Base64-encoded image data. Never decoded by this crate.
    Base64 {
        /// The base64 payload, as received from the object store.
        data: String,
    },
}

/// A single block within a message's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// An image, passed through untouched.
    Image {
        /// Where the bytes came from.
        source: ImageSource,
        /// MIME type, e.g. `image/png`.
        media_type: String,
    },
}

impl ContentBlock {
    /// Build a text block.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Build a base64 image block.
    #[must_use]
    pub fn image_base64(data: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self::Image {
            source: ImageSource::Base64 { data: data.into() },
            media_type: media_type.into(),
        }
    }

    /// Borrow this block's text, if it is a text block.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Image { .. } => None,
        }
    }
}

/// One structured `thinking` content block the model returned, carrying
/// enough shape for a downstream reviewer to trace a decision back to the
/// reasoning that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningBlock {
    /// When the model emitted this block, in epoch milliseconds.
    pub timestamp: u64,
    /// Which pipeline component the block was captured from.
    pub component: String,
    /// Which stage was running when the block was captured.
    pub stage: String,
    /// The decision the model reached, if it stated one explicitly.
    pub decision: Option<String>,
    /// The reasoning text itself.
    pub reasoning: String,
    /// The model's stated confidence in `decision`, if given.
    pub confidence: Option<f64>,
}

/// A single conversation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent it.
    pub role: Role,
    /// Its content blocks, in order.
    pub content: Vec<ContentBlock>,
}

impl Message {
    /// Build a user message from content blocks.
    #[must_use]
    pub fn user(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content,
        }
    }

    /// Build an assistant message from content blocks.
    #[must_use]
    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }

    /// Concatenate all text blocks in this message, ignoring images.
    #[must_use]
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_block_never_exposes_decoded_bytes() {
        let block = ContentBlock::image_base64("aGVsbG8=", "image/png");
        match block {
            ContentBlock::Image { source: ImageSource::Base64 { data }, .. } => {
                assert_eq!(data, "aGVsbG8=");
            }
            _ => panic!("expected image block"),
        }
    }

    #[test]
    fn message_text_concatenates_only_text_blocks() {
        let msg = Message::user(vec![
            ContentBlock::text("hello "),
            ContentBlock::image_base64("xx", "image/png"),
            ContentBlock::text("world"),
        ]);
        assert_eq!(msg.text(), "hello world");
    }
}
