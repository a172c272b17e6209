//! Account persistence and the self-service mutation rules.
//!
//! Every mutation derives its target from the verified [`Identity`]; the
//! update path additionally requires the path username to match the token.

use chrono::Utc;
use thiserror::Error;

use crate::auth::{AuthError, CredentialStore, Identity};
use crate::db::{Account, DbPool, UpdateAccountRequest};

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("accounts can only be modified by their owner")]
    Forbidden,

    #[error("no updatable fields supplied")]
    NoFields,

    #[error("account not found")]
    NotFound,

    #[error("username or email already exists")]
    Conflict,

    #[error(transparent)]
    Credential(#[from] AuthError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// The closed set of fields a user may change on their own account.
#[derive(Default)]
pub struct AccountUpdate {
    pub email: Option<String>,
    /// Plaintext; hashed before it reaches the database
    pub password: Option<String>,
    pub daily_calorie_goal: Option<i64>,
    pub dietary_preferences: Option<String>,
}

impl AccountUpdate {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.password.is_none()
            && self.daily_calorie_goal.is_none()
            && self.dietary_preferences.is_none()
    }
}

impl From<UpdateAccountRequest> for AccountUpdate {
    fn from(req: UpdateAccountRequest) -> Self {
        Self {
            email: req.email.map(|e| e.trim().to_string()),
            password: req.password,
            daily_calorie_goal: req.daily_calorie_goal,
            dietary_preferences: req.dietary_preferences,
        }
    }
}

#[derive(Clone)]
pub struct AccountService {
    db: DbPool,
    credentials: CredentialStore,
}

impl AccountService {
    pub fn new(db: DbPool, credentials: CredentialStore) -> Self {
        Self { db, credentials }
    }

    /// Create an account. Fails with `Conflict` when the username or email is taken.
    pub async fn create(&self, username: &str, email: &str, password: &str) -> Result<Account, AccountError> {
        let existing: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM accounts WHERE username = ? OR email = ? LIMIT 1")
                .bind(username)
                .bind(email)
                .fetch_optional(&self.db)
                .await?;
        if existing.is_some() {
            return Err(AccountError::Conflict);
        }

        let password_hash = self.credentials.hash_blocking(password.to_string()).await?;
        let now = Utc::now().to_rfc3339();

        let account = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (username, email, password_hash, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(&password_hash)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(user_id = account.id, username = %account.username, "Account created");
        Ok(account)
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<Account>, AccountError> {
        Ok(sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?)
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<Account>, AccountError> {
        Ok(sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.db)
            .await?)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AccountError> {
        Ok(sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.db)
            .await?)
    }

    /// Apply a partial update to the caller's own account.
    ///
    /// Only the fields present in `update` are written, in a single UPDATE
    /// keyed by the caller's immutable id. A password is hashed first.
    pub async fn update_fields(
        &self,
        acting: &Identity,
        target_username: &str,
        update: AccountUpdate,
    ) -> Result<Account, AccountError> {
        authorize_owner(acting, target_username)?;
        if update.is_empty() {
            return Err(AccountError::NoFields);
        }

        let password_hash = match update.password {
            Some(password) => Some(self.credentials.hash_blocking(password).await?),
            None => None,
        };

        let now = Utc::now().to_rfc3339();

        let account = sqlx::query_as::<_, Account>(
            r#"
            UPDATE accounts SET
                email = COALESCE(?, email),
                password_hash = COALESCE(?, password_hash),
                daily_calorie_goal = COALESCE(?, daily_calorie_goal),
                dietary_preferences = COALESCE(?, dietary_preferences),
                updated_at = ?
            WHERE id = ? AND username = ?
            RETURNING *
            "#,
        )
        .bind(&update.email)
        .bind(&password_hash)
        .bind(update.daily_calorie_goal)
        .bind(&update.dietary_preferences)
        .bind(&now)
        .bind(acting.id)
        .bind(target_username)
        .fetch_optional(&self.db)
        .await?
        .ok_or(AccountError::NotFound)?;

        tracing::info!(user_id = account.id, "Account updated");
        Ok(account)
    }

    /// Delete the caller's own account. The target is always the verified id.
    pub async fn delete_account(&self, acting: &Identity) -> Result<(), AccountError> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(acting.id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AccountError::NotFound);
        }

        tracing::info!(user_id = acting.id, username = %acting.username, "Account deleted");
        Ok(())
    }
}

/// The caller may only address its own account by name
pub fn authorize_owner(acting: &Identity, target_username: &str) -> Result<(), AccountError> {
    if acting.username != target_username {
        tracing::warn!(
            user_id = acting.id,
            username = %acting.username,
            target = %target_username,
            "Refused update of another user's account"
        );
        return Err(AccountError::Forbidden);
    }
    Ok(())
}
