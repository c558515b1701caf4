use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::attachment::Attachment;

/// Role of a chat participant, serialized lowercase on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Function,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Function => "function",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed function invocation: name plus free-form keyword arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: Map<String, Value>,
}

/// One turn in a conversation.
///
/// The content buffer is append-only while a turn is streaming and can be
/// replaced wholesale with [`set_content`](Message::set_content). Identity,
/// role and name are fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    id: String,
    role: Role,
    name: Option<String>,
    content: String,
    function_call: Option<FunctionCall>,
    attachments: Vec<Attachment>,
    images: Vec<Vec<u8>>,
}

impl Message {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            name: None,
            content: String::new(),
            function_call: None,
            attachments: Vec::new(),
            images: Vec::new(),
        }
    }

    /// A user message.
    pub fn user(id: impl Into<String>) -> Self {
        Self::new(id, Role::User)
    }

    /// An assistant message.
    pub fn assistant(id: impl Into<String>) -> Self {
        Self::new(id, Role::Assistant)
    }

    /// A function-result message; `name` identifies the function that ran.
    pub fn function(id: impl Into<String>, name: impl Into<String>) -> Self {
        let mut m = Self::new(id, Role::Function);
        m.name = Some(name.into());
        m
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.content = text.into();
        self
    }

    pub fn with_function_call(mut self, call: FunctionCall) -> Self {
        self.function_call = Some(call);
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Attach a raw inline image (bytes, not yet base64-encoded).
    pub fn with_image(mut self, bytes: Vec<u8>) -> Self {
        self.images.push(bytes);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Append a streamed delta to the content buffer.
    pub fn append(&mut self, delta: &str) {
        self.content.push_str(delta);
    }

    /// Replace the content buffer.
    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
    }

    pub fn function_call(&self) -> Option<&FunctionCall> {
        self.function_call.as_ref()
    }

    pub fn set_function_call(&mut self, call: FunctionCall) {
        self.function_call = Some(call);
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn images(&self) -> &[Vec<u8>] {
        &self.images
    }
}

/// An ordered sequence of messages; insertion order is turn order.
///
/// Owned by the caller. The client reads a conversation when building a
/// request but never mutates it.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_buffer_appends_in_order() {
        let mut m = Message::assistant("1");
        m.append("Hel");
        m.append("lo");
        assert_eq!(m.content(), "Hello");

        m.set_content("replaced");
        assert_eq!(m.content(), "replaced");
    }

    #[test]
    fn conversation_preserves_insertion_order() {
        let mut c = Conversation::new();
        c.add(Message::user("1").with_text("first"));
        c.add(Message::assistant("2").with_text("second"));

        let roles: Vec<Role> = c.messages().iter().map(|m| m.role()).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
    }

    #[test]
    fn function_message_carries_name() {
        let m = Message::function("3", "get_current_weather");
        assert_eq!(m.role(), Role::Function);
        assert_eq!(m.name(), Some("get_current_weather"));
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Role::Assistant).unwrap(), "assistant");
        assert_eq!(Role::Function.to_string(), "function");
    }
}
