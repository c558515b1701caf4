use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Out-of-band material attached to a message.
///
/// An attachment may yield a text fragment, raw image bytes, both absent, or
/// one of each capability. The request builder asks for whichever it needs
/// and skips attachments that cannot provide it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Attachment {
    text: Option<String>,
    image: Option<Vec<u8>>,
}

impl Attachment {
    pub fn text(fragment: impl Into<String>) -> Self {
        Self {
            text: Some(fragment.into()),
            image: None,
        }
    }

    pub fn image(bytes: Vec<u8>) -> Self {
        Self {
            text: None,
            image: Some(bytes),
        }
    }

    pub fn with_image(mut self, bytes: Vec<u8>) -> Self {
        self.image = Some(bytes);
        self
    }

    pub fn as_text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn as_image_bytes(&self) -> Option<&[u8]> {
        self.image.as_deref()
    }
}

/// Base64-encode JPEG bytes for embedding in a request.
pub fn to_base64_jpeg(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Data URL for an inline JPEG, as expected by vision-capable models.
pub fn image_data_url(bytes: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", to_base64_jpeg(bytes))
}
