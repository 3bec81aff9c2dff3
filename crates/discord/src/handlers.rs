use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};

use brobot_core::errors::{BotError, UNEXPECTED_ERROR_MESSAGE};

use crate::api::DiscordApi;
use crate::commands::{
    classify, parse_interaction, BotCommand, CommandInvocation, CommandService,
    InboundInteraction, InteractionParseError, ModalSubmission,
};
use crate::embeds::InteractionResponse;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Parse(#[from] InteractionParseError),
}

/// Parses inbound interactions, routes them to the command service and
/// always answers the interaction, including on failure.
pub struct InteractionHandler {
    service: Arc<dyn CommandService>,
    api: Arc<dyn DiscordApi>,
}

impl InteractionHandler {
    pub fn new(service: Arc<dyn CommandService>, api: Arc<dyn DiscordApi>) -> Self {
        Self { service, api }
    }

    pub async fn handle(&self, payload: &Value) -> Result<(), HandlerError> {
        match parse_interaction(payload)? {
            InboundInteraction::Ping { interaction_id, token } => {
                self.reply(&interaction_id, &token, InteractionResponse::Pong).await;
            }
            InboundInteraction::Command(invocation) => {
                self.handle_command(invocation).await;
            }
            InboundInteraction::ModalSubmit(submission) => {
                self.handle_modal(submission).await;
            }
            InboundInteraction::Unsupported { kind } => {
                debug!(event_name = "interaction.ignored", kind, "unsupported interaction type");
            }
        }
        Ok(())
    }

    async fn handle_command(&self, invocation: CommandInvocation) {
        let result = match classify(&invocation) {
            BotCommand::Review => self.service.open_review_modal(&invocation).await,
            BotCommand::MyReviews => self.service.list_my_reviews(&invocation).await,
            BotCommand::NewsConfig(action) => {
                self.service.configure_news(action, &invocation).await
            }
            BotCommand::Unknown => {
                warn!(
                    event_name = "interaction.unknown_command",
                    command = %invocation.command,
                    "unrecognized command name"
                );
                Ok(InteractionResponse::ephemeral_text("❌ Commande inconnue"))
            }
        };

        let response = self.resolve(result, &invocation.command, &invocation.user_id);
        self.reply(&invocation.interaction_id, &invocation.token, response).await;
    }

    async fn handle_modal(&self, submission: ModalSubmission) {
        if submission.review_work_type().is_none() {
            warn!(
                event_name = "interaction.unknown_modal",
                custom_id = %submission.custom_id,
                "modal submission with unrecognized custom id"
            );
            self.reply(
                &submission.interaction_id,
                &submission.token,
                InteractionResponse::ephemeral_text(UNEXPECTED_ERROR_MESSAGE),
            )
            .await;
            return;
        }

        let result = self.service.submit_review(&submission).await;
        let response = self.resolve(result, &submission.custom_id, &submission.user_id);
        self.reply(&submission.interaction_id, &submission.token, response).await;
    }

    /// Maps a service failure onto an ephemeral reply. Expected rejections
    /// (validation, authorization) log at warn; the rest at error.
    fn resolve(
        &self,
        result: Result<InteractionResponse, BotError>,
        source: &str,
        user_id: &str,
    ) -> InteractionResponse {
        match result {
            Ok(response) => response,
            Err(bot_error @ (BotError::Validation { .. } | BotError::Authorization)) => {
                warn!(
                    event_name = "interaction.rejected",
                    code = bot_error.code(),
                    source,
                    user_id,
                    error = %bot_error,
                    "command rejected"
                );
                InteractionResponse::ephemeral_text(bot_error.user_message())
            }
            Err(bot_error) => {
                error!(
                    event_name = "interaction.failed",
                    code = bot_error.code(),
                    source,
                    user_id,
                    error = %bot_error,
                    "command failed unexpectedly"
                );
                InteractionResponse::ephemeral_text(bot_error.user_message())
            }
        }
    }

    /// The reply itself is best-effort; a dead interaction token must not
    /// take the event loop down.
    async fn reply(&self, interaction_id: &str, token: &str, response: InteractionResponse) {
        if let Err(api_error) = self.api.respond(interaction_id, token, &response).await {
            error!(
                event_name = "interaction.reply_failed",
                interaction_id,
                error = %api_error,
                "failed to answer interaction"
            );
        }
    }
}
