//! Chat message types.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One message of a chat conversation, in the server's wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Base64-encoded images attached to the message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            images: Vec::new(),
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Attach raw image bytes; they are base64-encoded for the wire.
    pub fn with_image(mut self, bytes: impl AsRef<[u8]>) -> Self {
        self.images.push(STANDARD.encode(bytes));
        self
    }

    /// Attach an image that is already base64-encoded.
    pub fn with_image_base64(mut self, data: impl Into<String>) -> Self {
        self.images.push(data.into());
        self
    }

    /// Drop attached images to save context space.
    pub fn strip_images(&mut self) {
        self.images.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_wire_shape() {
        let msg = ChatMessage::user("Hello");
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"role": "user", "content": "Hello"})
        );
    }

    #[test]
    fn test_message_with_image() {
        let mut msg = ChatMessage::user("Look at this").with_image(b"png");
        assert_eq!(msg.images, vec!["cG5n".to_string()]);
        assert_eq!(serde_json::to_value(&msg).unwrap()["images"][0], "cG5n");

        msg.strip_images();
        assert!(msg.images.is_empty());
    }

    #[test]
    fn test_message_roundtrip_without_images() {
        let msg: ChatMessage =
            serde_json::from_value(json!({"role": "assistant", "content": "hi"})).unwrap();
        assert_eq!(msg, ChatMessage::assistant("hi"));
    }
}
