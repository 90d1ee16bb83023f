//! User administration: list, create, edit and delete accounts.

use thiserror::Error;
use tracing::instrument;

use supply_desk_core::{Role, Session, UserAccount, UserAccountId, UserChanges};

use super::auth::{AccountForm, AuthError, AuthService};
use crate::db::{PortalStore, RepositoryError};

/// Errors from user administration.
#[derive(Debug, Error)]
pub enum UserAdminError {
    #[error("user not found")]
    NotFound,

    /// The email of an account cannot change.
    #[error("email cannot be changed")]
    EmailImmutable,

    /// Only administrators may change roles.
    #[error("only administrators can change roles")]
    RoleChangeForbidden,

    /// Administrators cannot delete their own account.
    #[error("you cannot delete your own account")]
    CannotDeleteSelf,

    #[error("{0} cannot be empty")]
    EmptyName(&'static str),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// User administration service.
pub struct UserAdminService<'a> {
    store: &'a dyn PortalStore,
}

impl<'a> UserAdminService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn PortalStore) -> Self {
        Self { store }
    }

    /// All accounts, newest first.
    ///
    /// # Errors
    ///
    /// Returns `UserAdminError::Repository` if the store fails.
    pub async fn list(&self) -> Result<Vec<UserAccount>, UserAdminError> {
        Ok(self.store.list_users().await?)
    }

    /// Create a technician account.
    ///
    /// # Errors
    ///
    /// Returns `UserAdminError::Auth` for any validation failure.
    pub async fn create(&self, form: &AccountForm) -> Result<UserAccount, UserAdminError> {
        Ok(AuthService::new(self.store).create_account(form).await?)
    }

    /// Edit a user's names and, for administrators, role.
    ///
    /// # Errors
    ///
    /// Returns `UserAdminError::EmailImmutable` for a differing email,
    /// `UserAdminError::RoleChangeForbidden` when a non-admin changes a role,
    /// and `UserAdminError::NotFound` for an unknown user.
    #[instrument(skip(self, actor, changes), fields(actor = %actor.email))]
    pub async fn edit(
        &self,
        actor: &Session,
        id: UserAccountId,
        changes: &UserChanges,
    ) -> Result<UserAccount, UserAdminError> {
        let mut account = self
            .store
            .get_user(id)
            .await?
            .ok_or(UserAdminError::NotFound)?;

        if changes
            .email
            .as_ref()
            .is_some_and(|email| *email != account.email)
        {
            return Err(UserAdminError::EmailImmutable);
        }
        if let Some(role) = changes.role
            && role != account.role
        {
            if actor.role != Role::Admin {
                return Err(UserAdminError::RoleChangeForbidden);
            }
            account.role = role;
        }
        if let Some(given_name) = &changes.given_name {
            account.given_name = non_empty(given_name, "given name")?;
        }
        if let Some(family_name) = &changes.family_name {
            account.family_name = non_empty(family_name, "family name")?;
        }

        let updated = self.store.update_user(&account).await.map_err(not_found)?;
        tracing::info!(user_id = %id, role = %updated.role, "User updated");
        Ok(updated)
    }

    /// Delete a user's profile and credential.
    ///
    /// # Errors
    ///
    /// Returns `UserAdminError::CannotDeleteSelf` when the actor targets
    /// their own account and `UserAdminError::NotFound` for an unknown user.
    #[instrument(skip(self, actor), fields(actor = %actor.email))]
    pub async fn delete(&self, actor: &Session, id: UserAccountId) -> Result<(), UserAdminError> {
        let account = self
            .store
            .get_user(id)
            .await?
            .ok_or(UserAdminError::NotFound)?;
        if account.email == actor.email {
            return Err(UserAdminError::CannotDeleteSelf);
        }

        self.store.delete_user(id).await.map_err(not_found)?;
        self.store.delete_credential(&account.email).await?;
        tracing::info!(user_id = %id, email = %account.email, "User deleted");
        Ok(())
    }
}

fn non_empty(value: &str, field: &'static str) -> Result<String, UserAdminError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(UserAdminError::EmptyName(field));
    }
    Ok(trimmed.to_owned())
}

fn not_found(e: RepositoryError) -> UserAdminError {
    match e {
        RepositoryError::NotFound => UserAdminError::NotFound,
        other => UserAdminError::Repository(other),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use supply_desk_core::Email;

    use super::*;
    use crate::db::MemoryStore;

    fn form(email: &str) -> AccountForm {
        AccountForm {
            given_name: "Luis".into(),
            family_name: "Rey".into(),
            email: email.into(),
            password: "secreto".into(),
            confirm_password: "secreto".into(),
        }
    }

    fn session(email: &str, role: Role) -> Session {
        Session {
            email: Email::parse(email).unwrap(),
            given_name: "X".into(),
            family_name: "Y".into(),
            role,
        }
    }

    #[tokio::test]
    async fn test_edit_names_and_role() {
        let store = MemoryStore::new();
        let users = UserAdminService::new(&store);
        let luis = users.create(&form("luis@flota.com")).await.unwrap();

        let changes = UserChanges {
            given_name: Some(" Luisa ".into()),
            role: Some(Role::Admin),
            ..UserChanges::default()
        };
        let admin = session("jefe@flota.com", Role::Admin);
        let updated = users.edit(&admin, luis.id, &changes).await.unwrap();
        assert_eq!(updated.given_name, "Luisa");
        assert_eq!(updated.role, Role::Admin);
        assert_eq!(updated.email, luis.email);
    }

    #[tokio::test]
    async fn test_role_change_needs_admin() {
        let store = MemoryStore::new();
        let users = UserAdminService::new(&store);
        let luis = users.create(&form("luis@flota.com")).await.unwrap();

        let changes = UserChanges {
            role: Some(Role::Admin),
            ..UserChanges::default()
        };
        let tech = session("otro@flota.com", Role::Tecnico);
        assert!(matches!(
            users.edit(&tech, luis.id, &changes).await,
            Err(UserAdminError::RoleChangeForbidden)
        ));

        // Sending the unchanged role is not a role change.
        let same = UserChanges {
            role: Some(Role::Tecnico),
            family_name: Some("Reyes".into()),
            ..UserChanges::default()
        };
        assert_eq!(
            users.edit(&tech, luis.id, &same).await.unwrap().family_name,
            "Reyes"
        );
    }

    #[tokio::test]
    async fn test_email_is_immutable() {
        let store = MemoryStore::new();
        let users = UserAdminService::new(&store);
        let luis = users.create(&form("luis@flota.com")).await.unwrap();
        let admin = session("jefe@flota.com", Role::Admin);

        let changes = UserChanges {
            email: Some(Email::parse("nuevo@flota.com").unwrap()),
            ..UserChanges::default()
        };
        assert!(matches!(
            users.edit(&admin, luis.id, &changes).await,
            Err(UserAdminError::EmailImmutable)
        ));

        let unchanged = UserChanges {
            email: Some(luis.email.clone()),
            ..UserChanges::default()
        };
        assert!(users.edit(&admin, luis.id, &unchanged).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_removes_profile_and_credential() {
        let store = MemoryStore::new();
        let users = UserAdminService::new(&store);
        let luis = users.create(&form("luis@flota.com")).await.unwrap();
        let admin = session("jefe@flota.com", Role::Admin);

        users.delete(&admin, luis.id).await.unwrap();
        assert!(store.get_user(luis.id).await.unwrap().is_none());
        assert!(store.password_hash(&luis.email).await.unwrap().is_none());
        assert!(matches!(
            users.delete(&admin, luis.id).await,
            Err(UserAdminError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_cannot_delete_self() {
        let store = MemoryStore::new();
        let users = UserAdminService::new(&store);
        let me = users.create(&form("jefe@flota.com")).await.unwrap();
        let admin = session("jefe@flota.com", Role::Admin);

        assert!(matches!(
            users.delete(&admin, me.id).await,
            Err(UserAdminError::CannotDeleteSelf)
        ));
    }
}
