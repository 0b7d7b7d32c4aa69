use async_trait::async_trait;
use uuid::Uuid;

use crate::error::UserError;
use crate::users::dto::{NewUser, UserUpdate};
use crate::users::password::PasswordHasher;
use crate::users::repo_types::User;

/// Optimistic update retries before giving up on a record that keeps changing.
pub const MAX_UPDATE_ATTEMPTS: u32 = 3;

/// Storage for [`User`] records.
///
/// Implementations validate, run
/// [`hash_password_on_save`](crate::users::services::hash_password_on_save)
/// and enforce email uniqueness on every write. A failed write leaves nothing
/// behind.
#[async_trait]
pub trait UserRepository: Send + Sync {
    fn hasher(&self) -> &PasswordHasher;

    async fn create(&self, new_user: NewUser) -> Result<User, UserError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, UserError>;

    /// Lookup is done on the normalized (trimmed, lower-cased) address.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserError>;

    async fn update(&self, id: Uuid, update: UserUpdate) -> Result<User, UserError>;

    async fn delete(&self, id: Uuid) -> Result<(), UserError>;

    /// `None` for an unknown email or a wrong password.
    async fn authenticate(&self, email: &str, candidate: &str) -> Result<Option<User>, UserError> {
        let Some(user) = self.find_by_email(email).await? else {
            return Ok(None);
        };
        if user.verify_password(candidate, self.hasher())? {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }
}
