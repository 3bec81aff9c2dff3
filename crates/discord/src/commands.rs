use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use brobot_core::errors::BotError;
use brobot_core::news::NewsCategory;
use brobot_core::review::WorkType;

use crate::embeds::{InteractionResponse, REVIEW_MODAL_PREFIX};

pub const REVIEW_COMMAND: &str = "review";
pub const MY_REVIEWS_COMMAND: &str = "mes-reviews";
pub const NEWS_CONFIG_COMMAND: &str = "news-config";

// Application command option types, per the Discord API.
const OPTION_SUB_COMMAND: u8 = 1;
const OPTION_STRING: u8 = 3;
const OPTION_INTEGER: u8 = 4;
const OPTION_BOOLEAN: u8 = 5;
const OPTION_CHANNEL: u8 = 7;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CommandChoice {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CommandOption {
    #[serde(rename = "type")]
    pub kind: u8,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<CommandChoice>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<CommandOption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_value: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_value: Option<i64>,
}

impl CommandOption {
    fn new(kind: u8, name: &str, description: &str, required: bool) -> Self {
        Self {
            kind,
            name: name.to_owned(),
            description: description.to_owned(),
            required,
            choices: Vec::new(),
            options: Vec::new(),
            min_value: None,
            max_value: None,
        }
    }
}

/// Registration payload for `PUT /applications/{id}/commands`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CommandSpec {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<CommandOption>,
    /// Bitfield rendered as a string, as the API expects.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_member_permissions: Option<String>,
}

// PermissionFlags::MANAGE_CHANNELS
const MANAGE_CHANNELS: u64 = 1 << 4;

/// The full command set the bot registers at startup.
pub fn command_specs() -> Vec<CommandSpec> {
    vec![review_spec(), my_reviews_spec(), news_config_spec()]
}

fn review_spec() -> CommandSpec {
    let mut work_type = CommandOption::new(
        OPTION_STRING,
        "type",
        "Type d'œuvre à critiquer",
        true,
    );
    work_type.choices = WorkType::ALL
        .iter()
        .map(|wt| CommandChoice { name: wt.label().to_owned(), value: wt.as_str().to_owned() })
        .collect();

    CommandSpec {
        name: REVIEW_COMMAND.to_owned(),
        description: "Écrire une review d'un film, d'une série, d'un livre...".to_owned(),
        options: vec![work_type],
        default_member_permissions: None,
    }
}

fn my_reviews_spec() -> CommandSpec {
    CommandSpec {
        name: MY_REVIEWS_COMMAND.to_owned(),
        description: "Afficher vos dernières reviews".to_owned(),
        options: Vec::new(),
        default_member_permissions: None,
    }
}

fn news_config_spec() -> CommandSpec {
    let channel = |description| CommandOption::new(OPTION_CHANNEL, "channel", description, true);
    let mut categories = CommandOption::new(
        OPTION_STRING,
        "categories",
        "Catégories de news (séparées par des virgules)",
        true,
    );
    categories.choices = NewsCategory::ALL
        .iter()
        .map(|c| CommandChoice { name: c.label().to_owned(), value: c.as_str().to_owned() })
        .collect();
    let threads = CommandOption::new(
        OPTION_BOOLEAN,
        "threads",
        "Créer des threads pour chaque news",
        false,
    );
    let reactions = CommandOption::new(
        OPTION_BOOLEAN,
        "reactions",
        "Ajouter des réactions aux news",
        false,
    );
    let mut max = CommandOption::new(
        OPTION_INTEGER,
        "max-par-heure",
        "Nombre maximum de news par heure",
        false,
    );
    max.min_value = Some(1);
    max.max_value = Some(10);
    let enabled =
        CommandOption::new(OPTION_BOOLEAN, "enabled", "Activer/désactiver les news", false);

    let mut add = CommandOption::new(
        OPTION_SUB_COMMAND,
        "add",
        "Activer les news pour ce channel",
        false,
    );
    add.options =
        vec![channel("Channel où envoyer les news"), categories, threads.clone(), reactions.clone(), max.clone()];

    let mut remove = CommandOption::new(
        OPTION_SUB_COMMAND,
        "remove",
        "Désactiver les news pour un channel",
        false,
    );
    remove.options = vec![channel("Channel à désactiver")];

    let list =
        CommandOption::new(OPTION_SUB_COMMAND, "list", "Voir la configuration des news", false);

    let mut update = CommandOption::new(
        OPTION_SUB_COMMAND,
        "update",
        "Modifier la configuration d'un channel",
        false,
    );
    update.options = vec![channel("Channel à modifier"), enabled, threads, reactions, max];

    CommandSpec {
        name: NEWS_CONFIG_COMMAND.to_owned(),
        description: "Configurer les news pour un channel".to_owned(),
        options: vec![add, remove, list, update],
        default_member_permissions: Some(MANAGE_CHANNELS.to_string()),
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpecValidationError {
    #[error("command name `{0}` must be lowercase, 1-32 chars")]
    InvalidName(String),
    #[error("description for `{0}` must be 1-100 chars")]
    InvalidDescription(String),
    #[error("option `{command}.{option}` has more than 25 choices")]
    TooManyChoices { command: String, option: String },
}

/// Sanity-checks the registration payload before it is sent; catches
/// constraint drift at startup instead of as a 400 from Discord.
pub fn validate_specs(specs: &[CommandSpec]) -> Result<(), SpecValidationError> {
    for spec in specs {
        let name_ok = !spec.name.is_empty()
            && spec.name.len() <= 32
            && spec.name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !name_ok {
            return Err(SpecValidationError::InvalidName(spec.name.clone()));
        }
        if spec.description.is_empty() || spec.description.chars().count() > 100 {
            return Err(SpecValidationError::InvalidDescription(spec.name.clone()));
        }
        for option in flatten_options(&spec.options) {
            if option.description.is_empty() || option.description.chars().count() > 100 {
                return Err(SpecValidationError::InvalidDescription(format!(
                    "{}.{}",
                    spec.name, option.name
                )));
            }
            if option.choices.len() > 25 {
                return Err(SpecValidationError::TooManyChoices {
                    command: spec.name.clone(),
                    option: option.name.clone(),
                });
            }
        }
    }
    Ok(())
}

fn flatten_options(options: &[CommandOption]) -> Vec<&CommandOption> {
    let mut flat = Vec::new();
    for option in options {
        flat.push(option);
        flat.extend(flatten_options(&option.options));
    }
    flat
}

#[derive(Clone, Debug, PartialEq)]
pub enum OptionValue {
    String(String),
    Integer(i64),
    Boolean(bool),
}

/// A slash command invocation, flattened one level (subcommand options are
/// hoisted into `options`).
#[derive(Clone, Debug, PartialEq)]
pub struct CommandInvocation {
    pub interaction_id: String,
    pub token: String,
    pub command: String,
    pub subcommand: Option<String>,
    pub options: BTreeMap<String, OptionValue>,
    pub channel_id: String,
    pub user_id: String,
    pub username: String,
}

impl CommandInvocation {
    pub fn option_str(&self, name: &str) -> Option<&str> {
        match self.options.get(name) {
            Some(OptionValue::String(value)) => Some(value),
            _ => None,
        }
    }

    pub fn option_int(&self, name: &str) -> Option<i64> {
        match self.options.get(name) {
            Some(OptionValue::Integer(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn option_bool(&self, name: &str) -> Option<bool> {
        match self.options.get(name) {
            Some(OptionValue::Boolean(value)) => Some(*value),
            _ => None,
        }
    }
}

/// A submitted modal, with text inputs flattened out of their action rows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModalSubmission {
    pub interaction_id: String,
    pub token: String,
    pub custom_id: String,
    pub fields: BTreeMap<String, String>,
    pub user_id: String,
    pub username: String,
}

impl ModalSubmission {
    pub fn field(&self, custom_id: &str) -> Option<&str> {
        self.fields.get(custom_id).map(String::as_str)
    }

    /// The work type slug embedded in the modal custom ID, if this is a
    /// review form submission.
    pub fn review_work_type(&self) -> Option<&str> {
        self.custom_id.strip_prefix(REVIEW_MODAL_PREFIX)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum InboundInteraction {
    Ping { interaction_id: String, token: String },
    Command(CommandInvocation),
    ModalSubmit(ModalSubmission),
    Unsupported { kind: u64 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InteractionParseError {
    #[error("interaction is missing field `{0}`")]
    MissingField(&'static str),
}

fn str_field(value: &Value, key: &'static str) -> Result<String, InteractionParseError> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or(InteractionParseError::MissingField(key))
}

fn invoker(value: &Value) -> Result<(String, String), InteractionParseError> {
    // Guild interactions nest the user under `member`; DMs put it at the top.
    let user = value
        .pointer("/member/user")
        .or_else(|| value.get("user"))
        .ok_or(InteractionParseError::MissingField("user"))?;
    Ok((str_field(user, "id")?, str_field(user, "username")?))
}

/// Parses a raw gateway `INTERACTION_CREATE` payload.
pub fn parse_interaction(value: &Value) -> Result<InboundInteraction, InteractionParseError> {
    let kind = value.get("type").and_then(Value::as_u64).unwrap_or(0);
    match kind {
        1 => Ok(InboundInteraction::Ping {
            interaction_id: str_field(value, "id")?,
            token: str_field(value, "token")?,
        }),
        2 => parse_command(value).map(InboundInteraction::Command),
        5 => parse_modal_submit(value).map(InboundInteraction::ModalSubmit),
        other => Ok(InboundInteraction::Unsupported { kind: other }),
    }
}

fn parse_command(value: &Value) -> Result<CommandInvocation, InteractionParseError> {
    let data = value.get("data").ok_or(InteractionParseError::MissingField("data"))?;
    let (user_id, username) = invoker(value)?;

    let mut subcommand = None;
    let mut options = BTreeMap::new();
    let raw_options = data.get("options").and_then(Value::as_array);
    if let Some(raw_options) = raw_options {
        for option in raw_options {
            let kind = option.get("type").and_then(Value::as_u64).unwrap_or(0);
            if kind == u64::from(OPTION_SUB_COMMAND) {
                subcommand = option.get("name").and_then(Value::as_str).map(str::to_owned);
                if let Some(nested) = option.get("options").and_then(Value::as_array) {
                    for nested_option in nested {
                        collect_option(nested_option, &mut options);
                    }
                }
            } else {
                collect_option(option, &mut options);
            }
        }
    }

    Ok(CommandInvocation {
        interaction_id: str_field(value, "id")?,
        token: str_field(value, "token")?,
        command: str_field(data, "name")?,
        subcommand,
        options,
        channel_id: str_field(value, "channel_id")?,
        user_id,
        username,
    })
}

fn collect_option(option: &Value, into: &mut BTreeMap<String, OptionValue>) {
    let Some(name) = option.get("name").and_then(Value::as_str) else {
        return;
    };
    let parsed = match option.get("value") {
        Some(Value::String(s)) => Some(OptionValue::String(s.clone())),
        Some(Value::Bool(b)) => Some(OptionValue::Boolean(*b)),
        Some(Value::Number(n)) => n.as_i64().map(OptionValue::Integer),
        _ => None,
    };
    if let Some(parsed) = parsed {
        into.insert(name.to_owned(), parsed);
    }
}

fn parse_modal_submit(value: &Value) -> Result<ModalSubmission, InteractionParseError> {
    let data = value.get("data").ok_or(InteractionParseError::MissingField("data"))?;
    let (user_id, username) = invoker(value)?;

    let mut fields = BTreeMap::new();
    if let Some(rows) = data.get("components").and_then(Value::as_array) {
        for row in rows {
            let Some(inputs) = row.get("components").and_then(Value::as_array) else {
                continue;
            };
            for input in inputs {
                let Some(custom_id) = input.get("custom_id").and_then(Value::as_str) else {
                    continue;
                };
                let value = input.get("value").and_then(Value::as_str).unwrap_or_default();
                fields.insert(custom_id.to_owned(), value.to_owned());
            }
        }
    }

    Ok(ModalSubmission {
        interaction_id: str_field(value, "id")?,
        token: str_field(value, "token")?,
        custom_id: str_field(data, "custom_id")?,
        fields,
        user_id,
        username,
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NewsConfigAction {
    Add,
    Remove,
    List,
    Update,
}

/// How a command invocation maps onto the bot's feature set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BotCommand {
    Review,
    MyReviews,
    NewsConfig(NewsConfigAction),
    Unknown,
}

pub fn classify(invocation: &CommandInvocation) -> BotCommand {
    match invocation.command.as_str() {
        REVIEW_COMMAND => BotCommand::Review,
        MY_REVIEWS_COMMAND => BotCommand::MyReviews,
        NEWS_CONFIG_COMMAND => match invocation.subcommand.as_deref() {
            Some("add") => BotCommand::NewsConfig(NewsConfigAction::Add),
            Some("remove") => BotCommand::NewsConfig(NewsConfigAction::Remove),
            Some("list") => BotCommand::NewsConfig(NewsConfigAction::List),
            Some("update") => BotCommand::NewsConfig(NewsConfigAction::Update),
            _ => BotCommand::Unknown,
        },
        _ => BotCommand::Unknown,
    }
}

/// Implemented by the application layer; the handlers stay transport-only.
#[async_trait]
pub trait CommandService: Send + Sync {
    async fn open_review_modal(
        &self,
        invocation: &CommandInvocation,
    ) -> Result<InteractionResponse, BotError>;

    async fn submit_review(
        &self,
        submission: &ModalSubmission,
    ) -> Result<InteractionResponse, BotError>;

    async fn list_my_reviews(
        &self,
        invocation: &CommandInvocation,
    ) -> Result<InteractionResponse, BotError>;

    async fn configure_news(
        &self,
        action: NewsConfigAction,
        invocation: &CommandInvocation,
    ) -> Result<InteractionResponse, BotError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        classify, command_specs, parse_interaction, validate_specs, BotCommand,
        InboundInteraction, NewsConfigAction, OptionValue,
    };

    #[test]
    fn registration_payload_passes_discord_constraints() {
        let specs = command_specs();
        assert_eq!(specs.len(), 3);
        validate_specs(&specs).expect("specs should satisfy API limits");

        let review = &specs[0];
        assert_eq!(review.name, "review");
        assert_eq!(review.options[0].choices.len(), 8);

        let payload = serde_json::to_value(&specs).expect("serialize");
        assert_eq!(payload[0]["options"][0]["type"], 3);
        assert_eq!(payload[0]["options"][0]["required"], true);
        // Optional flags are omitted rather than serialized as false.
        assert!(payload[1].get("options").is_none());
    }

    #[test]
    fn parses_a_review_invocation() {
        let raw = json!({
            "id": "int-1",
            "type": 2,
            "token": "tok",
            "channel_id": "chan-1",
            "member": { "user": { "id": "42", "username": "brice" } },
            "data": {
                "name": "review",
                "options": [ { "type": 3, "name": "type", "value": "film" } ]
            }
        });

        let parsed = parse_interaction(&raw).expect("parse");
        let InboundInteraction::Command(invocation) = parsed else {
            panic!("expected a command");
        };
        assert_eq!(classify(&invocation), BotCommand::Review);
        assert_eq!(invocation.option_str("type"), Some("film"));
        assert_eq!(invocation.user_id, "42");
    }

    #[test]
    fn hoists_subcommand_options() {
        let raw = json!({
            "id": "int-2",
            "type": 2,
            "token": "tok",
            "channel_id": "chan-1",
            "user": { "id": "42", "username": "brice" },
            "data": {
                "name": "news-config",
                "options": [{
                    "type": 1,
                    "name": "add",
                    "options": [
                        { "type": 7, "name": "channel", "value": "chan-7" },
                        { "type": 3, "name": "categories", "value": "sports,gaming" },
                        { "type": 4, "name": "max-par-heure", "value": 5 },
                        { "type": 5, "name": "threads", "value": true }
                    ]
                }]
            }
        });

        let parsed = parse_interaction(&raw).expect("parse");
        let InboundInteraction::Command(invocation) = parsed else {
            panic!("expected a command");
        };
        assert_eq!(classify(&invocation), BotCommand::NewsConfig(NewsConfigAction::Add));
        assert_eq!(invocation.option_str("channel"), Some("chan-7"));
        assert_eq!(invocation.option_int("max-par-heure"), Some(5));
        assert_eq!(invocation.option_bool("threads"), Some(true));
        assert_eq!(
            invocation.options.get("categories"),
            Some(&OptionValue::String("sports,gaming".to_owned()))
        );
    }

    #[test]
    fn parses_a_modal_submission() {
        let raw = json!({
            "id": "int-3",
            "type": 5,
            "token": "tok",
            "channel_id": "chan-1",
            "member": { "user": { "id": "42", "username": "brice" } },
            "data": {
                "custom_id": "review_modal_serie",
                "components": [
                    { "type": 1, "components": [
                        { "type": 4, "custom_id": "title", "value": "Dark" }
                    ]},
                    { "type": 1, "components": [
                        { "type": 4, "custom_id": "rating", "value": "5" }
                    ]},
                    { "type": 1, "components": [
                        { "type": 4, "custom_id": "comment", "value": "Superbe série" }
                    ]}
                ]
            }
        });

        let parsed = parse_interaction(&raw).expect("parse");
        let InboundInteraction::ModalSubmit(submission) = parsed else {
            panic!("expected a modal submission");
        };
        assert_eq!(submission.review_work_type(), Some("serie"));
        assert_eq!(submission.field("title"), Some("Dark"));
        assert_eq!(submission.field("rating"), Some("5"));
    }

    #[test]
    fn unknown_interaction_types_are_tolerated() {
        let raw = json!({ "id": "int-4", "type": 3, "token": "tok" });
        let parsed = parse_interaction(&raw).expect("parse");
        assert_eq!(parsed, InboundInteraction::Unsupported { kind: 3 });
    }
}
