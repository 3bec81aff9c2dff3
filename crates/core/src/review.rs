use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::BotError;

pub const TITLE_MAX_CHARS: usize = 100;
pub const COMMENT_MAX_CHARS: usize = 1000;

/// The fixed set of reviewable work types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkType {
    Film,
    Serie,
    Manga,
    Comics,
    Roman,
    Livre,
    Anime,
    Jeu,
}

impl WorkType {
    pub const ALL: [WorkType; 8] = [
        Self::Film,
        Self::Serie,
        Self::Manga,
        Self::Comics,
        Self::Roman,
        Self::Livre,
        Self::Anime,
        Self::Jeu,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Film => "film",
            Self::Serie => "serie",
            Self::Manga => "manga",
            Self::Comics => "comics",
            Self::Roman => "roman",
            Self::Livre => "livre",
            Self::Anime => "anime",
            Self::Jeu => "jeu",
        }
    }

    /// Emoji-prefixed French display label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Film => "🎬 Film",
            Self::Serie => "📺 Série",
            Self::Manga => "🗾 Manga",
            Self::Comics => "📚 Comics",
            Self::Roman => "📖 Roman",
            Self::Livre => "📕 Livre",
            Self::Anime => "🍜 Anime",
            Self::Jeu => "🎮 Jeu vidéo",
        }
    }
}

/// A registered reviewer, created on first interaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub discord_id: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// A persisted review. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Review {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub work_type: WorkType,
    pub rating: u8,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// Validated review fields, ready to persist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewReview {
    pub title: String,
    pub work_type: WorkType,
    pub rating: u8,
    pub comment: String,
}

pub fn is_authorized(discord_id: &str, allow_list: &[String]) -> bool {
    allow_list.iter().any(|id| id == discord_id)
}

pub fn validate_authorization(discord_id: &str, allow_list: &[String]) -> Result<(), BotError> {
    if is_authorized(discord_id, allow_list) {
        Ok(())
    } else {
        Err(BotError::Authorization)
    }
}

/// Lower-cases, trims and resolves the fixed synonym map before checking
/// membership in the work-type enumeration. Returns `None` for anything
/// outside the canonical-plus-synonym set.
pub fn validate_work_type(input: &str) -> Option<WorkType> {
    let normalized = input.trim().to_lowercase();
    let canonical = match normalized.as_str() {
        "films" | "movie" => "film",
        "series" | "tv" => "serie",
        "mangas" => "manga",
        "comic" | "bd" => "comics",
        "romans" => "roman",
        "book" | "livres" => "livre",
        "animes" => "anime",
        "jeux" | "game" => "jeu",
        other => other,
    };

    WorkType::ALL.into_iter().find(|work_type| work_type.as_str() == canonical)
}

pub fn validate_work_type_strict(input: &str) -> Result<WorkType, BotError> {
    validate_work_type(input)
        .ok_or_else(|| BotError::validation("type", format!("type d'œuvre inconnu : {input}")))
}

/// Parses the leading integer of the input, accepting only 0 through 5.
pub fn validate_rating(input: &str) -> Option<u8> {
    let trimmed = input.trim();
    let mut end = 0;
    for (index, ch) in trimmed.char_indices() {
        if ch == '-' && index == 0 {
            end = ch.len_utf8();
        } else if ch.is_ascii_digit() {
            end = index + ch.len_utf8();
        } else {
            break;
        }
    }

    let value: i32 = trimmed[..end].parse().ok()?;
    (0..=5).contains(&value).then_some(value as u8)
}

pub fn validate_rating_strict(input: &str) -> Result<u8, BotError> {
    validate_rating(input)
        .ok_or_else(|| BotError::validation("note", "la note doit être un entier entre 0 et 5"))
}

pub fn validate_title(input: &str) -> Result<String, BotError> {
    bounded_text("titre", input, TITLE_MAX_CHARS)
}

pub fn validate_comment(input: &str) -> Result<String, BotError> {
    bounded_text("commentaire", input, COMMENT_MAX_CHARS)
}

fn bounded_text(field: &str, input: &str, max_chars: usize) -> Result<String, BotError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(BotError::validation(field, "ne peut pas être vide"));
    }
    if trimmed.chars().count() > max_chars {
        return Err(BotError::validation(field, format!("dépasse {max_chars} caractères")));
    }

    Ok(trimmed.to_owned())
}

pub fn format_work_type(work_type: WorkType) -> &'static str {
    work_type.label()
}

/// `"r/5"` followed by exactly `r` filled and `5 - r` open star glyphs.
pub fn format_rating(rating: u8) -> String {
    let rating = rating.min(5) as usize;
    format!("{rating}/5 {}{}", "⭐".repeat(rating), "☆".repeat(5 - rating))
}

#[cfg(test)]
mod tests {
    use super::{
        format_rating, is_authorized, validate_comment, validate_rating, validate_rating_strict,
        validate_title, validate_work_type, validate_work_type_strict, WorkType,
    };
    use crate::errors::BotError;

    #[test]
    fn format_rating_always_renders_five_glyphs() {
        for rating in 0..=5u8 {
            let rendered = format_rating(rating);
            let filled = rendered.chars().filter(|&ch| ch == '⭐').count();
            let open = rendered.chars().filter(|&ch| ch == '☆').count();
            assert_eq!(filled, rating as usize);
            assert_eq!(open, 5 - rating as usize);
            assert!(rendered.starts_with(&format!("{rating}/5")));
        }
    }

    #[test]
    fn work_type_is_idempotent_on_canonical_inputs() {
        for work_type in WorkType::ALL {
            assert_eq!(validate_work_type(work_type.as_str()), Some(work_type));
        }
    }

    #[test]
    fn work_type_resolves_every_documented_synonym() {
        let cases = [
            ("films", WorkType::Film),
            ("movie", WorkType::Film),
            ("series", WorkType::Serie),
            ("tv", WorkType::Serie),
            ("mangas", WorkType::Manga),
            ("comic", WorkType::Comics),
            ("bd", WorkType::Comics),
            ("romans", WorkType::Roman),
            ("book", WorkType::Livre),
            ("livres", WorkType::Livre),
            ("animes", WorkType::Anime),
            ("jeux", WorkType::Jeu),
            ("game", WorkType::Jeu),
        ];

        for (input, expected) in cases {
            assert_eq!(validate_work_type(input), Some(expected), "synonym {input}");
        }
    }

    #[test]
    fn work_type_normalizes_case_and_whitespace() {
        assert_eq!(validate_work_type("  Movie "), Some(WorkType::Film));
        assert_eq!(validate_work_type("FILM"), Some(WorkType::Film));
    }

    #[test]
    fn work_type_rejects_unknown_values() {
        assert_eq!(validate_work_type("podcast"), None);
        assert!(matches!(
            validate_work_type_strict("podcast"),
            Err(BotError::Validation { .. })
        ));
    }

    #[test]
    fn rating_accepts_zero_through_five_only() {
        assert_eq!(validate_rating("3"), Some(3));
        assert_eq!(validate_rating("0"), Some(0));
        assert_eq!(validate_rating("5"), Some(5));
        assert_eq!(validate_rating("6"), None);
        assert_eq!(validate_rating("-1"), None);
        assert_eq!(validate_rating("x"), None);
        assert!(validate_rating_strict("6").is_err());
    }

    #[test]
    fn rating_parses_leading_integer() {
        assert_eq!(validate_rating(" 4 étoiles"), Some(4));
        assert_eq!(validate_rating("5/5"), Some(5));
    }

    #[test]
    fn title_and_comment_trim_and_bound() {
        assert_eq!(validate_title("  Dune  ").expect("valid title"), "Dune");
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"x".repeat(101)).is_err());
        assert_eq!(validate_comment("Très bon").expect("valid comment"), "Très bon");
        assert!(validate_comment(&"y".repeat(1001)).is_err());
        assert!(validate_comment(&"y".repeat(1000)).is_ok());
    }

    #[test]
    fn allow_list_membership() {
        let allow_list = vec!["123".to_owned(), "456".to_owned()];
        assert!(is_authorized("123", &allow_list));
        assert!(!is_authorized("789", &allow_list));
        assert!(!is_authorized("123", &[]));
    }
}
