use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use tracing::error;

use brobot_core::review::{NewReview, Review, WorkType};

use super::user::parse_timestamp;
use super::{RepositoryError, ReviewRepository};
use crate::DbPool;

pub struct SqlReviewRepository {
    pool: DbPool,
}

impl SqlReviewRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_work_type(value: &str) -> Result<WorkType, RepositoryError> {
    WorkType::ALL
        .into_iter()
        .find(|work_type| work_type.as_str() == value)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown work type `{value}`")))
}

fn row_to_review(row: &sqlx::sqlite::SqliteRow) -> Result<Review, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let user_id: i64 =
        row.try_get("user_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let title: String =
        row.try_get("title").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let work_type_str: String =
        row.try_get("work_type").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let rating: i64 =
        row.try_get("rating").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let comment: String =
        row.try_get("comment").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Review {
        id,
        user_id,
        title,
        work_type: parse_work_type(&work_type_str)?,
        rating: rating.clamp(0, 5) as u8,
        comment,
        created_at: parse_timestamp(&created_at_str),
    })
}

#[async_trait]
impl ReviewRepository for SqlReviewRepository {
    async fn create(&self, user_id: i64, review: NewReview) -> Result<Review, RepositoryError> {
        let row = sqlx::query(
            "INSERT INTO reviews (user_id, title, work_type, rating, comment, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING id, user_id, title, work_type, rating, comment, created_at",
        )
        .bind(user_id)
        .bind(&review.title)
        .bind(review.work_type.as_str())
        .bind(i64::from(review.rating))
        .bind(&review.comment)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!(operation = "review.create", user_id, error = %e, "review insert failed");
            RepositoryError::from(e)
        })?;

        row_to_review(&row)
    }

    async fn list_for_user(
        &self,
        user_id: i64,
        limit: u32,
    ) -> Result<Vec<Review>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, user_id, title, work_type, rating, comment, created_at
             FROM reviews WHERE user_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(operation = "review.list_for_user", user_id, error = %e, "review query failed");
            RepositoryError::from(e)
        })?;

        rows.iter().map(row_to_review).collect()
    }
}

#[cfg(test)]
mod tests {
    use brobot_core::review::{NewReview, WorkType};

    use super::SqlReviewRepository;
    use crate::repositories::{ReviewRepository, SqlUserRepository, UserRepository};
    use crate::{connect_with_settings, migrations};

    async fn test_pool() -> crate::DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        pool
    }

    #[tokio::test]
    async fn review_round_trip_preserves_all_fields() {
        let pool = test_pool().await;
        let users = SqlUserRepository::new(pool.clone());
        let reviews = SqlReviewRepository::new(pool.clone());

        let user = users.find_or_create("42", "brice").await.expect("user");
        let created = reviews
            .create(
                user.id,
                NewReview {
                    title: "T".to_string(),
                    work_type: WorkType::Film,
                    rating: 4,
                    comment: "C".to_string(),
                },
            )
            .await
            .expect("create review");

        let listed = reviews.list_for_user(user.id, 10).await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "T");
        assert_eq!(listed[0].work_type, WorkType::Film);
        assert_eq!(listed[0].rating, 4);
        assert_eq!(listed[0].comment, "C");
        assert_eq!(listed[0].created_at, created.created_at);

        pool.close().await;
    }

    #[tokio::test]
    async fn listing_is_most_recent_first_and_capped() {
        let pool = test_pool().await;
        let users = SqlUserRepository::new(pool.clone());
        let reviews = SqlReviewRepository::new(pool.clone());

        let user = users.find_or_create("42", "brice").await.expect("user");
        for index in 0..12 {
            reviews
                .create(
                    user.id,
                    NewReview {
                        title: format!("title-{index:02}"),
                        work_type: WorkType::Jeu,
                        rating: 3,
                        comment: "ok".to_string(),
                    },
                )
                .await
                .expect("create review");
            // SQLite text timestamps need distinct values for a stable order.
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let listed = reviews.list_for_user(user.id, 10).await.expect("list");
        assert_eq!(listed.len(), 10);
        assert_eq!(listed[0].title, "title-11");
        assert_eq!(listed[9].title, "title-02");

        pool.close().await;
    }
}
