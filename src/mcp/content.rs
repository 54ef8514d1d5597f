//! Typed view over raw `tools/call` results.
//!
//! Tool servers return a loosely shaped JSON object (`content`, `isError`,
//! `structuredContent`). [`ToolPayload`] parses that object once and gives
//! each content block an explicit variant with its own text-extraction rule.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// A single content block from a tool result.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    /// Plain text.
    Text { text: String },
    /// Base64 image data.
    Image { data: String, mime_type: String },
    /// Base64 audio data.
    Audio { data: String, mime_type: String },
    /// An embedded resource, possibly carrying text.
    Resource { resource: EmbeddedResource },
    /// A link to a resource the server can serve later.
    ResourceLink { uri: String, name: Option<String> },
    /// Anything without a recognised `type` tag.
    Other(Value),
}

/// Resource contents embedded in a [`ContentBlock::Resource`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedResource {
    pub uri: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub blob: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TaggedBlock {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Audio {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Resource {
        resource: EmbeddedResource,
    },
    ResourceLink {
        uri: String,
        #[serde(default)]
        name: Option<String>,
    },
}

impl From<TaggedBlock> for ContentBlock {
    fn from(block: TaggedBlock) -> Self {
        match block {
            TaggedBlock::Text { text } => Self::Text { text },
            TaggedBlock::Image { data, mime_type } => Self::Image { data, mime_type },
            TaggedBlock::Audio { data, mime_type } => Self::Audio { data, mime_type },
            TaggedBlock::Resource { resource } => Self::Resource { resource },
            TaggedBlock::ResourceLink { uri, name } => Self::ResourceLink { uri, name },
        }
    }
}

impl ContentBlock {
    /// Classify a raw block. Blocks that don't match a known tag are kept verbatim.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match TaggedBlock::deserialize(&value) {
            Ok(block) => block.into(),
            Err(_) => Self::Other(value),
        }
    }

    /// Human-readable text carried by this block, if any.
    ///
    /// Untagged blocks still yield their `text` field when it is a string,
    /// since some servers omit the `type` tag on plain text.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Resource { resource } => resource.text.as_deref(),
            Self::Other(value) => value.get("text").and_then(Value::as_str),
            Self::Image { .. } | Self::Audio { .. } | Self::ResourceLink { .. } => None,
        }
    }
}

/// The raw result had a shape no tool server should produce.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("tool result `content` must be an array, found {found}")]
    ContentNotArray { found: &'static str },
}

/// Parsed `tools/call` result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolPayload {
    /// `None` when the result carried no `content` field at all.
    pub content: Option<Vec<ContentBlock>>,
    pub is_error: bool,
    pub structured_content: Option<Value>,
}

impl ToolPayload {
    /// Parse a raw result.
    ///
    /// Non-object results (a bare string from an in-process tool, say) parse
    /// to an empty payload. Only a `content` field that is present but not an
    /// array is rejected.
    pub fn from_value(raw: &Value) -> Result<Self, PayloadError> {
        let Some(obj) = raw.as_object() else {
            return Ok(Self::default());
        };

        let content = match obj.get("content") {
            None | Some(Value::Null) => None,
            Some(Value::Array(blocks)) => Some(
                blocks
                    .iter()
                    .cloned()
                    .map(ContentBlock::from_value)
                    .collect(),
            ),
            Some(other) => {
                return Err(PayloadError::ContentNotArray {
                    found: json_type_name(other),
                });
            }
        };

        Ok(Self {
            content,
            is_error: obj.get("isError").and_then(Value::as_bool).unwrap_or(false),
            structured_content: obj.get("structuredContent").cloned(),
        })
    }

    /// Text of the first content block, when that block has non-empty text.
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        self.content
            .as_deref()
            .and_then(<[ContentBlock]>::first)
            .and_then(ContentBlock::text)
            .filter(|text| !text.is_empty())
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
