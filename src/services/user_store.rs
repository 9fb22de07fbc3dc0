// src/services/user_store.rs
//! Persistent user profiles keyed by the issuer's subject

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::common::Failure;

/// Stored user profile. `subject` is unique and never changes; only
/// `last_login`, `full_name` and `picture_url` move after creation.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct UserProfile {
    pub id: String,
    pub subject: String,
    pub email: String,
    pub full_name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub picture_url: Option<String>,
    pub locale: Option<String>,
    pub last_login: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    /// True when this row was inserted by `upsert` rather than refreshed.
    /// A new row carries the id proposed by the upsert; an existing row keeps
    /// its own, so two logins with the same timestamp still tell apart.
    pub fn was_created_by(&self, upsert: &ProfileUpsert) -> bool {
        self.id == upsert.id
    }
}

/// Values for one insert-or-refresh. `id` and the immutable fields are only
/// used when the subject is new.
#[derive(Debug, Clone)]
pub struct ProfileUpsert {
    pub id: String,
    pub subject: String,
    pub email: String,
    pub full_name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub picture_url: Option<String>,
    pub locale: Option<String>,
    pub seen_at: DateTime<Utc>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_subject(&self, subject: &str) -> Result<Option<UserProfile>, Failure>;

    async fn find_by_id(&self, id: &str) -> Result<Option<UserProfile>, Failure>;

    /// Atomic insert-or-refresh keyed on the unique subject. Must be one
    /// conditional write in the store, never a read followed by a write.
    async fn upsert(&self, profile: &ProfileUpsert) -> Result<UserProfile, Failure>;
}

const PROFILE_COLUMNS: &str = "id, subject, email, full_name, given_name, family_name, \
     picture_url, locale, last_login, created_at";

#[derive(Debug, Clone)]
pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn find_by_subject(&self, subject: &str) -> Result<Option<UserProfile>, Failure> {
        let sql = format!("SELECT {} FROM users WHERE subject = ?", PROFILE_COLUMNS);
        let row = sqlx::query_as::<_, UserProfile>(&sql)
            .bind(subject)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<UserProfile>, Failure> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", PROFILE_COLUMNS);
        let row = sqlx::query_as::<_, UserProfile>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn upsert(&self, profile: &ProfileUpsert) -> Result<UserProfile, Failure> {
        // A late-arriving older login must not roll the mutable fields back.
        let sql = format!(
            r#"
            INSERT INTO users (id, subject, email, full_name, given_name, family_name,
                               picture_url, locale, last_login, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(subject) DO UPDATE SET
                full_name = CASE WHEN julianday(excluded.last_login) >= julianday(users.last_login)
                                 THEN excluded.full_name ELSE users.full_name END,
                picture_url = CASE WHEN julianday(excluded.last_login) >= julianday(users.last_login)
                                   THEN excluded.picture_url ELSE users.picture_url END,
                last_login = CASE WHEN julianday(excluded.last_login) >= julianday(users.last_login)
                                  THEN excluded.last_login ELSE users.last_login END
            RETURNING {}
            "#,
            PROFILE_COLUMNS
        );

        let row = sqlx::query_as::<_, UserProfile>(&sql)
            .bind(&profile.id)
            .bind(&profile.subject)
            .bind(&profile.email)
            .bind(profile.full_name.as_deref())
            .bind(profile.given_name.as_deref())
            .bind(profile.family_name.as_deref())
            .bind(profile.picture_url.as_deref())
            .bind(profile.locale.as_deref())
            .bind(profile.seen_at)
            .bind(profile.seen_at)
            .fetch_one(&self.pool)
            .await?;

        debug!(
            user_id = %row.id,
            subject = %row.subject,
            created = row.was_created_by(profile),
            "User profile upserted"
        );
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_store() -> SqliteUserStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::common::migrations::run_migrations(&pool).await.unwrap();
        SqliteUserStore::new(pool)
    }

    fn upsert_for(subject: &str, name: &str, seen_at: DateTime<Utc>) -> ProfileUpsert {
        ProfileUpsert {
            id: crate::common::generate_user_id(),
            subject: subject.to_string(),
            email: format!("{}@example.com", subject),
            full_name: Some(name.to_string()),
            given_name: Some("Ada".to_string()),
            family_name: Some("Lovelace".to_string()),
            picture_url: Some(format!("https://img.example.com/{}.png", name)),
            locale: Some("en".to_string()),
            seen_at,
        }
    }

    #[tokio::test]
    async fn test_upsert_creates_then_refreshes() {
        let store = setup_test_store().await;
        let first_seen = Utc::now();

        let insert = upsert_for("sub-1", "Ada", first_seen);
        let created = store.upsert(&insert).await.unwrap();
        assert!(created.was_created_by(&insert));
        assert_eq!(created.full_name.as_deref(), Some("Ada"));

        let later = first_seen + Duration::seconds(30);
        let mut refresh = upsert_for("sub-1", "Ada L.", later);
        refresh.email = "changed@example.com".to_string();
        refresh.locale = Some("fr".to_string());

        let refreshed = store.upsert(&refresh).await.unwrap();
        assert_eq!(refreshed.id, created.id);
        assert_eq!(refreshed.created_at, created.created_at);
        assert_eq!(refreshed.last_login, later);
        assert_eq!(refreshed.full_name.as_deref(), Some("Ada L."));
        assert_eq!(refreshed.email, "sub-1@example.com");
        assert_eq!(refreshed.locale.as_deref(), Some("en"));
        assert!(!refreshed.was_created_by(&refresh));
    }

    #[tokio::test]
    async fn test_same_timestamp_refresh_is_not_a_create() {
        let store = setup_test_store().await;
        let seen_at = Utc::now();

        let first = upsert_for("sub-same", "Ada", seen_at);
        let second = upsert_for("sub-same", "Ada", seen_at);

        let inserted = store.upsert(&first).await.unwrap();
        let refreshed = store.upsert(&second).await.unwrap();

        assert!(inserted.was_created_by(&first));
        assert_eq!(refreshed.id, inserted.id);
        assert_eq!(refreshed.created_at, refreshed.last_login);
        assert!(!refreshed.was_created_by(&second));
    }

    #[tokio::test]
    async fn test_older_login_does_not_roll_back() {
        let store = setup_test_store().await;
        let now = Utc::now();

        store.upsert(&upsert_for("sub-2", "Newest", now)).await.unwrap();
        let stale = store
            .upsert(&upsert_for("sub-2", "Stale", now - Duration::minutes(5)))
            .await
            .unwrap();

        assert_eq!(stale.last_login, now);
        assert_eq!(stale.full_name.as_deref(), Some("Newest"));
    }

    #[tokio::test]
    async fn test_find_by_subject_and_id() {
        let store = setup_test_store().await;
        assert!(store.find_by_subject("missing").await.unwrap().is_none());

        let created = store
            .upsert(&upsert_for("sub-3", "Grace", Utc::now()))
            .await
            .unwrap();

        let by_subject = store.find_by_subject("sub-3").await.unwrap().unwrap();
        let by_id = store.find_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(by_subject, created);
        assert_eq!(by_id, created);
    }

    #[tokio::test]
    async fn test_email_collision_is_a_persistence_failure() {
        let store = setup_test_store().await;
        store
            .upsert(&upsert_for("sub-4", "Owner", Utc::now()))
            .await
            .unwrap();

        let mut other = upsert_for("sub-5", "Intruder", Utc::now());
        other.email = "sub-4@example.com".to_string();

        let result = store.upsert(&other).await;
        assert!(matches!(result, Err(Failure::PersistenceFailure(_))));
    }
}
