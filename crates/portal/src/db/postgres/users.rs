//! User account and credential repositories.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use supply_desk_core::{Email, NewUserAccount, UserAccount, UserAccountId};

use crate::db::{RepositoryError, map_unique_violation};

/// Internal row type for `PostgreSQL` user queries.
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i32,
    given_name: String,
    family_name: String,
    email: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for UserAccount {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;
        let role = row
            .role
            .parse()
            .map_err(|e| RepositoryError::DataCorruption(format!("user {}: {e}", row.id)))?;

        Ok(Self {
            id: UserAccountId::new(row.id),
            given_name: row.given_name,
            family_name: row.family_name,
            email,
            role,
            created_at: row.created_at,
        })
    }
}

const COLUMNS: &str = "id, given_name, family_name, email, role, created_at";

/// Repository for user profiles.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List all users, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the data is invalid.
    pub async fn list_all(&self) -> Result<Vec<UserAccount>, RepositoryError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {COLUMNS} FROM portal.user_account ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Get a user by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: UserAccountId) -> Result<Option<UserAccount>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {COLUMNS} FROM portal.user_account WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Get a user by email.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_email(&self, email: &Email) -> Result<Option<UserAccount>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {COLUMNS} FROM portal.user_account WHERE email = $1"
        ))
        .bind(email.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Create a user profile.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email already exists.
    pub async fn create(&self, input: &NewUserAccount) -> Result<UserAccount, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r"
            INSERT INTO portal.user_account (given_name, family_name, email, role)
            VALUES ($1, $2, $3, $4)
            RETURNING {COLUMNS}
            "
        ))
        .bind(&input.given_name)
        .bind(&input.family_name)
        .bind(input.email.as_str())
        .bind(input.role.as_str())
        .fetch_one(self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "email already exists"))?;

        row.try_into()
    }

    /// Update names and role.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn update(&self, account: &UserAccount) -> Result<UserAccount, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r"
            UPDATE portal.user_account
            SET given_name = $2, family_name = $3, role = $4
            WHERE id = $1
            RETURNING {COLUMNS}
            "
        ))
        .bind(account.id)
        .bind(&account.given_name)
        .bind(&account.family_name)
        .bind(account.role.as_str())
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    /// Delete a user profile.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn delete(&self, id: UserAccountId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM portal.user_account WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

/// Repository for password credentials.
pub struct CredentialRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CredentialRepository<'a> {
    /// Create a new credential repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get the password hash stored for an email.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn password_hash(&self, email: &Email) -> Result<Option<String>, RepositoryError> {
        let hash = sqlx::query_scalar::<_, String>(
            "SELECT password_hash FROM portal.credential WHERE email = $1",
        )
        .bind(email.as_str())
        .fetch_optional(self.pool)
        .await?;

        Ok(hash)
    }

    /// Store a new credential.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email already has one.
    pub async fn create(&self, email: &Email, password_hash: &str) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO portal.credential (email, password_hash) VALUES ($1, $2)")
            .bind(email.as_str())
            .bind(password_hash)
            .execute(self.pool)
            .await
            .map_err(|e| map_unique_violation(e, "email already registered"))?;
        Ok(())
    }

    /// Remove a credential. Removing a missing credential is not an error.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    pub async fn delete(&self, email: &Email) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM portal.credential WHERE email = $1")
            .bind(email.as_str())
            .execute(self.pool)
            .await?;
        Ok(())
    }
}
