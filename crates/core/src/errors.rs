use thiserror::Error;

/// Classified bot failures. Every variant carries a stable code and a
/// user-safe French message; anything outside this enum is treated as
/// unexpected by the interaction error path.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BotError {
    #[error("{field}: {message}")]
    Validation { field: String, message: String },
    #[error("caller is not on the authorization allow-list")]
    Authorization,
    #[error("persistence operation failed: {operation}")]
    Database { operation: String },
    #[error("discord call failed: {0}")]
    Discord(String),
}

impl BotError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation { field: field.into(), message: message.into() }
    }

    pub fn database(operation: impl Into<String>) -> Self {
        Self::Database { operation: operation.into() }
    }

    /// Stable machine-readable code, logged alongside warn-level entries.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Authorization => "AUTHORIZATION_ERROR",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Discord(_) => "DISCORD_ERROR",
        }
    }

    /// Short, non-technical message shown to the end user. Never exposes
    /// internal error shapes or codes.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation { field, message } => format!("❌ {field} : {message}"),
            Self::Authorization => {
                "❌ Vous n'êtes pas autorisé à utiliser cette commande".to_owned()
            }
            Self::Database { .. } => "❌ Erreur de base de données, veuillez réessayer".to_owned(),
            Self::Discord(_) => "❌ Erreur Discord, veuillez réessayer".to_owned(),
        }
    }
}

/// Fallback reply for errors that are not a [`BotError`].
pub const UNEXPECTED_ERROR_MESSAGE: &str =
    "❌ Une erreur inattendue s'est produite. Veuillez réessayer.";

#[cfg(test)]
mod tests {
    use super::BotError;

    #[test]
    fn codes_are_stable() {
        assert_eq!(BotError::validation("note", "hors limites").code(), "VALIDATION_ERROR");
        assert_eq!(BotError::Authorization.code(), "AUTHORIZATION_ERROR");
        assert_eq!(BotError::database("create_review").code(), "DATABASE_ERROR");
        assert_eq!(BotError::Discord("timeout".into()).code(), "DISCORD_ERROR");
    }

    #[test]
    fn user_messages_never_leak_operation_context() {
        let error = BotError::database("create_review");
        assert!(!error.user_message().contains("create_review"));
    }

    #[test]
    fn validation_message_is_field_scoped() {
        let error = BotError::validation("titre", "ne peut pas être vide");
        assert_eq!(error.user_message(), "❌ titre : ne peut pas être vide");
    }
}
