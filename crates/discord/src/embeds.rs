use serde::Serialize;
use serde_json::json;

use brobot_core::review::{WorkType, COMMENT_MAX_CHARS, TITLE_MAX_CHARS};

/// `MessageFlags::EPHEMERAL`, only the invoking user sees the reply.
const EPHEMERAL_FLAG: u64 = 64;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmbedImage {
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmbedAuthor {
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<EmbedAuthor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl Embed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField { name: name.into(), value: value.into(), inline });
        self
    }

    pub fn footer(mut self, text: impl Into<String>) -> Self {
        self.footer = Some(EmbedFooter { text: text.into() });
        self
    }

    pub fn image(mut self, url: impl Into<String>) -> Self {
        self.image = Some(EmbedImage { url: url.into() });
        self
    }

    pub fn author(mut self, name: impl Into<String>) -> Self {
        self.author = Some(EmbedAuthor { name: name.into() });
        self
    }

    pub fn timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }
}

/// Single-line (`Short`) or multi-line (`Paragraph`) modal text input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextInputStyle {
    Short,
    Paragraph,
}

impl TextInputStyle {
    fn code(self) -> u8 {
        match self {
            Self::Short => 1,
            Self::Paragraph => 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextInput {
    pub custom_id: String,
    pub label: String,
    pub style: TextInputStyle,
    pub required: bool,
    pub max_length: Option<u32>,
    pub placeholder: Option<String>,
}

impl Serialize for TextInput {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut value = json!({
            "type": 4,
            "custom_id": self.custom_id,
            "label": self.label,
            "style": self.style.code(),
            "required": self.required,
        });
        if let Some(max_length) = self.max_length {
            value["max_length"] = json!(max_length);
        }
        if let Some(ref placeholder) = self.placeholder {
            value["placeholder"] = json!(placeholder);
        }
        value.serialize(serializer)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Modal {
    pub custom_id: String,
    pub title: String,
    pub inputs: Vec<TextInput>,
}

impl Serialize for Modal {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Each input sits in its own action row, per the interactions API.
        let components: Vec<_> = self
            .inputs
            .iter()
            .map(|input| json!({ "type": 1, "components": [input] }))
            .collect();
        json!({
            "custom_id": self.custom_id,
            "title": self.title,
            "components": components,
        })
        .serialize(serializer)
    }
}

pub const REVIEW_MODAL_PREFIX: &str = "review_modal_";
pub const REVIEW_TITLE_INPUT: &str = "title";
pub const REVIEW_RATING_INPUT: &str = "rating";
pub const REVIEW_COMMENT_INPUT: &str = "comment";

/// The review form opened by `/review`; the chosen work type travels in the
/// modal's custom ID so the submission needs no free-text type field.
pub fn review_modal(work_type: WorkType) -> Modal {
    Modal {
        custom_id: format!("{REVIEW_MODAL_PREFIX}{}", work_type.as_str()),
        title: format!("✨ Ajouter une review - {}", work_type.label()),
        inputs: vec![
            TextInput {
                custom_id: REVIEW_TITLE_INPUT.to_owned(),
                label: "Titre de l'œuvre".to_owned(),
                style: TextInputStyle::Short,
                required: true,
                max_length: Some(TITLE_MAX_CHARS as u32),
                placeholder: Some("Ex: The Matrix, One Piece...".to_owned()),
            },
            TextInput {
                custom_id: REVIEW_RATING_INPUT.to_owned(),
                label: "Note (0-5)".to_owned(),
                style: TextInputStyle::Short,
                required: true,
                max_length: Some(1),
                placeholder: Some("Entre 0 et 5".to_owned()),
            },
            TextInput {
                custom_id: REVIEW_COMMENT_INPUT.to_owned(),
                label: "Commentaire".to_owned(),
                style: TextInputStyle::Paragraph,
                required: true,
                max_length: Some(COMMENT_MAX_CHARS as u32),
                placeholder: Some("Votre avis sur cette œuvre...".to_owned()),
            },
        ],
    }
}

/// Message body for `POST /channels/{id}/messages`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub embeds: Vec<Embed>,
}

impl OutboundMessage {
    pub fn embed(embed: Embed) -> Self {
        Self { content: None, embeds: vec![embed] }
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

/// What the bot sends back through the interaction callback endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InteractionResponse {
    Pong,
    Message { content: Option<String>, embeds: Vec<Embed>, ephemeral: bool },
    Modal(Modal),
}

impl InteractionResponse {
    pub fn ephemeral_text(content: impl Into<String>) -> Self {
        Self::Message { content: Some(content.into()), embeds: Vec::new(), ephemeral: true }
    }

    pub fn ephemeral_embed(embed: Embed) -> Self {
        Self::Message { content: None, embeds: vec![embed], ephemeral: true }
    }

    pub fn to_payload(&self) -> serde_json::Value {
        match self {
            Self::Pong => json!({ "type": 1 }),
            Self::Message { content, embeds, ephemeral } => {
                let mut data = json!({});
                if let Some(content) = content {
                    data["content"] = json!(content);
                }
                if !embeds.is_empty() {
                    data["embeds"] = json!(embeds);
                }
                if *ephemeral {
                    data["flags"] = json!(EPHEMERAL_FLAG);
                }
                json!({ "type": 4, "data": data })
            }
            Self::Modal(modal) => json!({ "type": 9, "data": modal }),
        }
    }
}
