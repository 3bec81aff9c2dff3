//! Application layer behind the slash commands. The Discord crate stays
//! transport-only; everything stateful happens here, against the
//! repository traits.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use brobot_core::errors::BotError;
use brobot_core::news::{
    parse_category_list, ChannelConfig, ChannelConfigUpdate, NewChannelConfig,
};
use brobot_core::review::{
    format_rating, format_work_type, validate_authorization, validate_comment,
    validate_rating_strict, validate_title, validate_work_type_strict, NewReview,
};
use brobot_db::{NewsConfigRepository, RepositoryError, ReviewRepository, UserRepository};
use brobot_discord::commands::{
    CommandInvocation, CommandService, ModalSubmission, NewsConfigAction,
};
use brobot_discord::embeds::{
    review_modal, Embed, InteractionResponse, REVIEW_COMMENT_INPUT, REVIEW_RATING_INPUT,
    REVIEW_TITLE_INPUT,
};

const CONFIRMATION_COMMENT_CHARS: usize = 200;
const LIST_COMMENT_CHARS: usize = 100;
const LIST_LIMIT: u32 = 10;
const MAX_PER_HOUR_DEFAULT: u8 = 3;

pub struct BotCommandService {
    users: Arc<dyn UserRepository>,
    reviews: Arc<dyn ReviewRepository>,
    configs: Arc<dyn NewsConfigRepository>,
    authorized_users: Vec<String>,
    commands_handled: AtomicU64,
}

impl BotCommandService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        reviews: Arc<dyn ReviewRepository>,
        configs: Arc<dyn NewsConfigRepository>,
        authorized_users: Vec<String>,
    ) -> Self {
        Self { users, reviews, configs, authorized_users, commands_handled: AtomicU64::new(0) }
    }

    /// Total interactions routed through this service since startup.
    pub fn commands_handled(&self) -> u64 {
        self.commands_handled.load(Ordering::Relaxed)
    }

    fn count(&self) {
        self.commands_handled.fetch_add(1, Ordering::Relaxed);
    }
}

fn repo_error(operation: &str, error: RepositoryError) -> BotError {
    tracing::error!(operation, error = %error, "repository call failed");
    BotError::database(operation)
}

fn mention(channel_id: &str) -> String {
    format!("<#{channel_id}>")
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_owned()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "✅"
    } else {
        "❌"
    }
}

fn status_label(enabled: bool) -> &'static str {
    if enabled {
        "🟢 Actif"
    } else {
        "🔴 Inactif"
    }
}

fn category_labels(config: &ChannelConfig) -> String {
    config.categories.iter().map(|c| c.label()).collect::<Vec<_>>().join(", ")
}

fn required_channel(invocation: &CommandInvocation) -> Result<&str, BotError> {
    invocation
        .option_str("channel")
        .ok_or_else(|| BotError::validation("channel", "channel requis".to_owned()))
}

#[async_trait]
impl CommandService for BotCommandService {
    async fn open_review_modal(
        &self,
        invocation: &CommandInvocation,
    ) -> Result<InteractionResponse, BotError> {
        self.count();
        validate_authorization(&invocation.user_id, &self.authorized_users)?;

        let raw = invocation
            .option_str("type")
            .ok_or_else(|| BotError::validation("type", "type d'œuvre requis".to_owned()))?;
        let work_type = validate_work_type_strict(raw)?;

        info!(
            event_name = "review.modal_shown",
            user_id = %invocation.user_id,
            username = %invocation.username,
            work_type = work_type.as_str(),
            "review modal shown"
        );
        Ok(InteractionResponse::Modal(review_modal(work_type)))
    }

    async fn submit_review(
        &self,
        submission: &ModalSubmission,
    ) -> Result<InteractionResponse, BotError> {
        self.count();
        validate_authorization(&submission.user_id, &self.authorized_users)?;

        let slug = submission
            .review_work_type()
            .ok_or_else(|| BotError::validation("type", "type d'œuvre requis".to_owned()))?;
        let work_type = validate_work_type_strict(slug)?;

        let title = validate_title(submission.field(REVIEW_TITLE_INPUT).unwrap_or_default())?;
        let rating = validate_rating_strict(submission.field(REVIEW_RATING_INPUT).unwrap_or_default())?;
        let comment = validate_comment(submission.field(REVIEW_COMMENT_INPUT).unwrap_or_default())?;

        let user = self
            .users
            .find_or_create(&submission.user_id, &submission.username)
            .await
            .map_err(|e| repo_error("user.find_or_create", e))?;
        let review = self
            .reviews
            .create(user.id, NewReview { title, work_type, rating, comment })
            .await
            .map_err(|e| repo_error("review.create", e))?;

        info!(
            event_name = "review.created",
            user_id = %submission.user_id,
            username = %submission.username,
            review_id = review.id,
            work_type = work_type.as_str(),
            rating,
            "review created"
        );

        let embed = Embed::new()
            .color(0x00FF7F)
            .title("✅ Review ajoutée !")
            .field("🎯 Œuvre", review.title.as_str(), true)
            .field("📂 Type", format_work_type(work_type), true)
            .field("⭐ Note", format_rating(rating), true)
            .field("💭 Commentaire", preview(&review.comment, CONFIRMATION_COMMENT_CHARS), false)
            .footer(submission.username.as_str())
            .timestamp(Utc::now().to_rfc3339());

        Ok(InteractionResponse::Message { content: None, embeds: vec![embed], ephemeral: false })
    }

    async fn list_my_reviews(
        &self,
        invocation: &CommandInvocation,
    ) -> Result<InteractionResponse, BotError> {
        self.count();
        validate_authorization(&invocation.user_id, &self.authorized_users)?;

        let user = self
            .users
            .find_or_create(&invocation.user_id, &invocation.username)
            .await
            .map_err(|e| repo_error("user.find_or_create", e))?;
        let reviews = self
            .reviews
            .list_for_user(user.id, LIST_LIMIT)
            .await
            .map_err(|e| repo_error("review.list_for_user", e))?;

        if reviews.is_empty() {
            let embed = Embed::new()
                .color(0xFFA500)
                .title("📚 Vos reviews")
                .description(
                    "Vous n'avez pas encore de reviews.\n\
                     Utilisez `/review` pour ajouter votre première review !",
                )
                .footer(invocation.username.as_str());
            return Ok(InteractionResponse::Message {
                content: None,
                embeds: vec![embed],
                ephemeral: false,
            });
        }

        let mut embed = Embed::new()
            .color(0x0099FF)
            .title(format!("📚 Vos reviews ({})", reviews.len()))
            .footer(invocation.username.as_str())
            .timestamp(Utc::now().to_rfc3339());

        for (index, review) in reviews.iter().enumerate() {
            let date = review.created_at.format("%d/%m/%Y");
            embed = embed.field(
                format!("{}. {}", index + 1, review.title),
                format!(
                    "{} • {}\n📅 {date}\n💭 {}",
                    format_work_type(review.work_type),
                    format_rating(review.rating),
                    preview(&review.comment, LIST_COMMENT_CHARS),
                ),
                false,
            );
        }

        info!(
            event_name = "review.list_shown",
            user_id = %invocation.user_id,
            review_count = reviews.len(),
            "reviews list shown"
        );
        Ok(InteractionResponse::Message { content: None, embeds: vec![embed], ephemeral: false })
    }

    async fn configure_news(
        &self,
        action: NewsConfigAction,
        invocation: &CommandInvocation,
    ) -> Result<InteractionResponse, BotError> {
        self.count();
        validate_authorization(&invocation.user_id, &self.authorized_users)?;

        match action {
            NewsConfigAction::Add => self.add_config(invocation).await,
            NewsConfigAction::Remove => self.remove_config(invocation).await,
            NewsConfigAction::List => self.list_configs().await,
            NewsConfigAction::Update => self.update_config(invocation).await,
        }
    }
}

impl BotCommandService {
    async fn add_config(
        &self,
        invocation: &CommandInvocation,
    ) -> Result<InteractionResponse, BotError> {
        let channel_id = required_channel(invocation)?;
        let categories = parse_category_list(invocation.option_str("categories").unwrap_or_default());
        if categories.is_empty() {
            return Ok(InteractionResponse::ephemeral_text("❌ Aucune catégorie valide fournie"));
        }

        let existing =
            self.configs.get(channel_id).await.map_err(|e| repo_error("news_config.get", e))?;
        if existing.is_some() {
            return Ok(InteractionResponse::ephemeral_text(format!(
                "❌ Une configuration existe déjà pour {}. Utilisez `/news-config update` pour la modifier.",
                mention(channel_id)
            )));
        }

        let new_config = NewChannelConfig {
            channel_id: channel_id.to_owned(),
            categories,
            create_threads: invocation.option_bool("threads").unwrap_or(false),
            add_reactions: invocation.option_bool("reactions").unwrap_or(true),
            max_per_hour: invocation
                .option_int("max-par-heure")
                .map(|v| v.clamp(1, 10) as u8)
                .unwrap_or(MAX_PER_HOUR_DEFAULT),
            enabled: true,
        };

        let config = match self.configs.create(new_config).await {
            Ok(config) => config,
            // Lost a create race; same answer as the pre-check.
            Err(RepositoryError::ConfigAlreadyExists { channel_id }) => {
                return Ok(InteractionResponse::ephemeral_text(format!(
                    "❌ Une configuration existe déjà pour {}. Utilisez `/news-config update` pour la modifier.",
                    mention(&channel_id)
                )));
            }
            Err(e) => return Err(repo_error("news_config.create", e)),
        };

        info!(
            event_name = "news_config.created",
            channel_id = %config.channel_id,
            user_id = %invocation.user_id,
            "news config created"
        );

        let embed = Embed::new()
            .color(0x00FF00)
            .title("✅ Configuration des news créée")
            .field("Channel", mention(&config.channel_id), true)
            .field("Catégories", category_labels(&config), true)
            .field("Max/heure", config.max_per_hour.to_string(), true)
            .field("Threads", on_off(config.create_threads), true)
            .field("Réactions", on_off(config.add_reactions), true);
        Ok(InteractionResponse::ephemeral_embed(embed))
    }

    async fn remove_config(
        &self,
        invocation: &CommandInvocation,
    ) -> Result<InteractionResponse, BotError> {
        let channel_id = required_channel(invocation)?;

        let existing =
            self.configs.get(channel_id).await.map_err(|e| repo_error("news_config.get", e))?;
        if existing.is_none() {
            return Ok(InteractionResponse::ephemeral_text(format!(
                "❌ Aucune configuration trouvée pour {}",
                mention(channel_id)
            )));
        }

        self.configs.delete(channel_id).await.map_err(|e| repo_error("news_config.delete", e))?;

        info!(
            event_name = "news_config.removed",
            channel_id,
            user_id = %invocation.user_id,
            "news config removed"
        );
        Ok(InteractionResponse::ephemeral_text(format!(
            "✅ Configuration des news supprimée pour {}",
            mention(channel_id)
        )))
    }

    async fn list_configs(&self) -> Result<InteractionResponse, BotError> {
        let configs = self
            .configs
            .list_enabled()
            .await
            .map_err(|e| repo_error("news_config.list_enabled", e))?;

        if configs.is_empty() {
            return Ok(InteractionResponse::ephemeral_text("📝 Aucune configuration de news active"));
        }

        let mut embed = Embed::new()
            .color(0x0099FF)
            .title("📰 Configurations des news")
            .description(format!("{} channel(s) configuré(s)", configs.len()));

        for config in &configs {
            embed = embed.field(
                mention(&config.channel_id),
                format!(
                    "**Catégories:** {}\n**Max/heure:** {}\n**Threads:** {}\n**Réactions:** {}\n**Statut:** {}",
                    category_labels(config),
                    config.max_per_hour,
                    on_off(config.create_threads),
                    on_off(config.add_reactions),
                    status_label(config.enabled),
                ),
                false,
            );
        }

        Ok(InteractionResponse::ephemeral_embed(embed))
    }

    async fn update_config(
        &self,
        invocation: &CommandInvocation,
    ) -> Result<InteractionResponse, BotError> {
        let channel_id = required_channel(invocation)?;

        let update = ChannelConfigUpdate {
            categories: None,
            create_threads: invocation.option_bool("threads"),
            add_reactions: invocation.option_bool("reactions"),
            max_per_hour: invocation.option_int("max-par-heure").map(|v| v.clamp(1, 10) as u8),
            enabled: invocation.option_bool("enabled"),
        };
        if update.is_empty() {
            return Ok(InteractionResponse::ephemeral_text("❌ Aucune modification spécifiée"));
        }

        let config = match self.configs.update(channel_id, update.clone()).await {
            Ok(config) => config,
            Err(RepositoryError::ConfigNotFound { channel_id }) => {
                return Ok(InteractionResponse::ephemeral_text(format!(
                    "❌ Aucune configuration trouvée pour {}",
                    mention(&channel_id)
                )));
            }
            Err(e) => return Err(repo_error("news_config.update", e)),
        };

        info!(
            event_name = "news_config.updated",
            channel_id = %config.channel_id,
            user_id = %invocation.user_id,
            "news config updated"
        );

        let mut embed = Embed::new()
            .color(0x00FF00)
            .title("✅ Configuration mise à jour")
            .field("Channel", mention(&config.channel_id), true);
        if let Some(enabled) = update.enabled {
            embed = embed.field("Statut", status_label(enabled), true);
        }
        if let Some(create_threads) = update.create_threads {
            embed = embed.field("Threads", on_off(create_threads), true);
        }
        if let Some(add_reactions) = update.add_reactions {
            embed = embed.field("Réactions", on_off(add_reactions), true);
        }
        if let Some(max_per_hour) = update.max_per_hour {
            embed = embed.field("Max/heure", max_per_hour.to_string(), true);
        }
        Ok(InteractionResponse::ephemeral_embed(embed))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use brobot_core::errors::BotError;
    use brobot_db::{
        InMemoryNewsConfigRepository, InMemoryReviewRepository, InMemoryUserRepository,
        ReviewRepository, UserRepository,
    };
    use brobot_discord::commands::{
        CommandInvocation, CommandService, ModalSubmission, NewsConfigAction, OptionValue,
    };
    use brobot_discord::embeds::InteractionResponse;

    use super::BotCommandService;

    fn service() -> (BotCommandService, Arc<InMemoryReviewRepository>, Arc<InMemoryUserRepository>)
    {
        let users = Arc::new(InMemoryUserRepository::default());
        let reviews = Arc::new(InMemoryReviewRepository::default());
        let configs = Arc::new(InMemoryNewsConfigRepository::default());
        let service = BotCommandService::new(
            users.clone(),
            reviews.clone(),
            configs,
            vec!["42".to_string()],
        );
        (service, reviews, users)
    }

    fn invocation(
        command: &str,
        subcommand: Option<&str>,
        user_id: &str,
        options: BTreeMap<String, OptionValue>,
    ) -> CommandInvocation {
        CommandInvocation {
            interaction_id: "int-1".to_string(),
            token: "tok".to_string(),
            command: command.to_string(),
            subcommand: subcommand.map(str::to_owned),
            options,
            channel_id: "chan-1".to_string(),
            user_id: user_id.to_string(),
            username: "brice".to_string(),
        }
    }

    fn review_submission(user_id: &str) -> ModalSubmission {
        let mut fields = BTreeMap::new();
        fields.insert("title".to_string(), "The Matrix".to_string());
        fields.insert("rating".to_string(), "5".to_string());
        fields.insert("comment".to_string(), "Un classique absolu.".to_string());
        ModalSubmission {
            interaction_id: "int-2".to_string(),
            token: "tok".to_string(),
            custom_id: "review_modal_film".to_string(),
            fields,
            user_id: user_id.to_string(),
            username: "brice".to_string(),
        }
    }

    #[tokio::test]
    async fn authorized_review_submission_persists_and_confirms() {
        let (service, reviews, users) = service();

        let response =
            service.submit_review(&review_submission("42")).await.expect("submission succeeds");

        let user = users.find_or_create("42", "brice").await.expect("user exists");
        let stored = reviews.list_for_user(user.id, 10).await.expect("list");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].title, "The Matrix");
        assert_eq!(stored[0].rating, 5);

        let InteractionResponse::Message { embeds, ephemeral, .. } = response else {
            panic!("expected a message response");
        };
        assert!(!ephemeral, "confirmation is public");
        let payload = serde_json::to_value(&embeds[0]).expect("serialize");
        assert_eq!(payload["fields"][0]["value"], "The Matrix");
        assert_eq!(payload["fields"][2]["value"], "5/5 ⭐⭐⭐⭐⭐");
    }

    #[tokio::test]
    async fn unauthorized_caller_is_rejected_before_any_write() {
        let (service, reviews, users) = service();

        let error = service
            .submit_review(&review_submission("999"))
            .await
            .expect_err("unauthorized caller must be rejected");
        assert_eq!(error, BotError::Authorization);

        let user = users.find_or_create("999", "brice").await.expect("probe user");
        let stored = reviews.list_for_user(user.id, 10).await.expect("list");
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn invalid_rating_surfaces_a_validation_error() {
        let (service, _, _) = service();

        let mut submission = review_submission("42");
        submission.fields.insert("rating".to_string(), "9".to_string());

        let error = service.submit_review(&submission).await.expect_err("must fail");
        assert!(matches!(error, BotError::Validation { .. }));
    }

    #[tokio::test]
    async fn review_command_opens_the_work_type_modal() {
        let (service, _, _) = service();

        let mut options = BTreeMap::new();
        options.insert("type".to_string(), OptionValue::String("manga".to_string()));
        let response = service
            .open_review_modal(&invocation("review", None, "42", options))
            .await
            .expect("modal opens");

        let InteractionResponse::Modal(modal) = response else {
            panic!("expected a modal response");
        };
        assert_eq!(modal.custom_id, "review_modal_manga");
    }

    #[tokio::test]
    async fn empty_review_list_gets_the_onboarding_reply() {
        let (service, _, _) = service();

        let response = service
            .list_my_reviews(&invocation("mes-reviews", None, "42", BTreeMap::new()))
            .await
            .expect("list succeeds");

        let InteractionResponse::Message { embeds, .. } = response else {
            panic!("expected a message response");
        };
        let payload = serde_json::to_value(&embeds[0]).expect("serialize");
        assert_eq!(payload["title"], "📚 Vos reviews");
        assert!(payload["description"]
            .as_str()
            .expect("description")
            .contains("première review"));
    }

    #[tokio::test]
    async fn duplicate_config_add_points_at_update() {
        let (service, _, _) = service();
        let mut options = BTreeMap::new();
        options.insert("channel".to_string(), OptionValue::String("chan-9".to_string()));
        options.insert("categories".to_string(), OptionValue::String("films,gaming".to_string()));
        let add = invocation("news-config", Some("add"), "42", options);

        let first = service
            .configure_news(NewsConfigAction::Add, &add)
            .await
            .expect("first add succeeds");
        let InteractionResponse::Message { embeds, ephemeral: true, .. } = &first else {
            panic!("expected the creation embed");
        };
        let payload = serde_json::to_value(&embeds[0]).expect("serialize");
        assert_eq!(payload["title"], "✅ Configuration des news créée");

        let second = service
            .configure_news(NewsConfigAction::Add, &add)
            .await
            .expect("second add still answers");
        let InteractionResponse::Message { content: Some(content), .. } = second else {
            panic!("expected a text reply");
        };
        assert!(content.contains("existe déjà"));
        assert!(content.contains("news-config update"));
    }

    #[tokio::test]
    async fn add_with_no_valid_category_is_refused() {
        let (service, _, _) = service();
        let mut options = BTreeMap::new();
        options.insert("channel".to_string(), OptionValue::String("chan-9".to_string()));
        options.insert("categories".to_string(), OptionValue::String("poterie".to_string()));

        let response = service
            .configure_news(
                NewsConfigAction::Add,
                &invocation("news-config", Some("add"), "42", options),
            )
            .await
            .expect("answers");
        let InteractionResponse::Message { content: Some(content), .. } = response else {
            panic!("expected a text reply");
        };
        assert_eq!(content, "❌ Aucune catégorie valide fournie");
    }

    #[tokio::test]
    async fn empty_update_is_refused_and_missing_config_reported() {
        let (service, _, _) = service();
        let mut options = BTreeMap::new();
        options.insert("channel".to_string(), OptionValue::String("chan-9".to_string()));
        let bare = invocation("news-config", Some("update"), "42", options.clone());

        let response = service
            .configure_news(NewsConfigAction::Update, &bare)
            .await
            .expect("answers");
        let InteractionResponse::Message { content: Some(content), .. } = response else {
            panic!("expected a text reply");
        };
        assert_eq!(content, "❌ Aucune modification spécifiée");

        options.insert("enabled".to_string(), OptionValue::Boolean(false));
        let response = service
            .configure_news(
                NewsConfigAction::Update,
                &invocation("news-config", Some("update"), "42", options),
            )
            .await
            .expect("answers");
        let InteractionResponse::Message { content: Some(content), .. } = response else {
            panic!("expected a text reply");
        };
        assert!(content.contains("Aucune configuration trouvée"));
    }
}
