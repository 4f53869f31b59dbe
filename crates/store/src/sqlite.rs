//! SQLite-backed token store for the CLI.
//!
//! One row per `(profile, kind)` in `session_tokens`. Token fields are
//! stored as columns so an expired grant can be spotted with plain SQL.

use async_trait::async_trait;
use mailbridge_types::{OAuthToken, SessionKey, TokenKind, TokenStore, traits::Result};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use std::str::FromStr;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS session_tokens (
    session_key   TEXT    NOT NULL,
    kind          TEXT    NOT NULL CHECK (kind IN ('backend', 'google')),
    access_token  TEXT    NOT NULL,
    refresh_token TEXT,
    expires_at    INTEGER,
    token_type    TEXT,
    updated_at    INTEGER NOT NULL DEFAULT (unixepoch()),
    PRIMARY KEY (session_key, kind)
)";

type TokenRow = (String, Option<String>, Option<i64>, Option<String>);

/// Tokens for every local profile, kept between CLI invocations.
pub struct SqliteTokenStore {
    pool: SqlitePool,
}

impl SqliteTokenStore {
    /// Open (creating if needed) the database at `database_url`, e.g.
    /// `sqlite:///home/me/.mailbridge/tokens.db` or `sqlite::memory:`.
    ///
    /// # Errors
    ///
    /// Returns a [`sqlx::Error`] if the file cannot be opened or the table
    /// cannot be created.
    pub async fn new(database_url: &str) -> std::result::Result<Self, sqlx::Error> {
        let opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        // A single connection keeps `sqlite::memory:` one database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }
}

fn to_token((access_token, refresh_token, expires_at, token_type): TokenRow) -> OAuthToken {
    OAuthToken {
        access_token,
        refresh_token,
        expires_at: expires_at.and_then(|at| u64::try_from(at).ok()),
        token_type,
    }
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    async fn load(&self, session: &SessionKey, kind: TokenKind) -> Result<Option<OAuthToken>> {
        let row: Option<TokenRow> = sqlx::query_as(
            "SELECT access_token, refresh_token, expires_at, token_type
             FROM session_tokens WHERE session_key = ? AND kind = ?",
        )
        .bind(session.as_str())
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(to_token))
    }

    async fn save(&self, session: &SessionKey, kind: TokenKind, token: &OAuthToken) -> Result<()> {
        let expires_at = token.expires_at.and_then(|at| i64::try_from(at).ok());
        sqlx::query(
            "INSERT INTO session_tokens
                 (session_key, kind, access_token, refresh_token, expires_at, token_type)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(session_key, kind) DO UPDATE SET
                 access_token  = excluded.access_token,
                 refresh_token = excluded.refresh_token,
                 expires_at    = excluded.expires_at,
                 token_type    = excluded.token_type,
                 updated_at    = unixepoch()",
        )
        .bind(session.as_str())
        .bind(kind.as_str())
        .bind(&token.access_token)
        .bind(token.refresh_token.as_deref())
        .bind(expires_at)
        .bind(token.token_type.as_deref())
        .execute(&self.pool)
        .await?;
        tracing::debug!(session = %session, kind = %kind, "token saved");
        Ok(())
    }

    async fn remove(&self, session: &SessionKey, kind: TokenKind) -> Result<()> {
        sqlx::query("DELETE FROM session_tokens WHERE session_key = ? AND kind = ?")
            .bind(session.as_str())
            .bind(kind.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove_session(&self, session: &SessionKey) -> Result<()> {
        let done = sqlx::query("DELETE FROM session_tokens WHERE session_key = ?")
            .bind(session.as_str())
            .execute(&self.pool)
            .await?;
        tracing::debug!(session = %session, removed = done.rows_affected(), "session cleared");
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionKey>> {
        let keys: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT session_key FROM session_tokens ORDER BY 1")
                .fetch_all(&self.pool)
                .await?;
        Ok(keys.into_iter().map(SessionKey::new).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteTokenStore {
        SqliteTokenStore::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_google_grant_keeps_every_field() {
        let s = store().await;
        let profile = SessionKey::new("default");
        let grant = OAuthToken::new("ya29.a0")
            .with_expiry(3599)
            .with_refresh("1//0g");
        s.save(&profile, TokenKind::Google, &grant).await.unwrap();

        let back = s.load(&profile, TokenKind::Google).await.unwrap().unwrap();
        assert_eq!(back.access_token, "ya29.a0");
        assert_eq!(back.refresh_token.as_deref(), Some("1//0g"));
        assert_eq!(back.expires_at, grant.expires_at);
        assert_eq!(back.token_type.as_deref(), Some("Bearer"));
        assert!(
            s.load(&profile, TokenKind::Backend)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_refreshed_grant_replaces_row() {
        let s = store().await;
        let profile = SessionKey::new("work");
        let first = OAuthToken::new("ya29.old").with_refresh("1//r");
        s.save(&profile, TokenKind::Google, &first).await.unwrap();
        s.save(&profile, TokenKind::Google, &OAuthToken::new("ya29.new"))
            .await
            .unwrap();

        let back = s.load(&profile, TokenKind::Google).await.unwrap().unwrap();
        assert_eq!(back.access_token, "ya29.new");
        assert!(back.refresh_token.is_none());

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM session_tokens")
            .fetch_one(&s.pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn test_logout_clears_only_that_profile() {
        let s = store().await;
        let ada = SessionKey::new("ada");
        let bob = SessionKey::new("bob");
        for kind in TokenKind::all() {
            s.save(&ada, *kind, &OAuthToken::new("t")).await.unwrap();
        }
        s.save(&bob, TokenKind::Backend, &OAuthToken::new("t"))
            .await
            .unwrap();
        assert_eq!(s.list_sessions().await.unwrap(), vec![ada.clone(), bob.clone()]);

        s.remove_session(&ada).await.unwrap();
        assert_eq!(s.list_sessions().await.unwrap(), vec![bob]);
    }

    #[tokio::test]
    async fn test_remove_single_kind() {
        let s = store().await;
        let profile = SessionKey::new("default");
        s.save(&profile, TokenKind::Backend, &OAuthToken::new("jwt"))
            .await
            .unwrap();
        s.save(&profile, TokenKind::Google, &OAuthToken::new("ya29"))
            .await
            .unwrap();
        s.remove(&profile, TokenKind::Backend).await.unwrap();
        // Removing again is a no-op.
        s.remove(&profile, TokenKind::Backend).await.unwrap();

        assert!(s.load(&profile, TokenKind::Backend).await.unwrap().is_none());
        assert!(s.load(&profile, TokenKind::Google).await.unwrap().is_some());
    }
}
