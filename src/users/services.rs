use time::OffsetDateTime;
use tracing::{debug, instrument};

use crate::error::UserError;
use crate::users::dto::{NewUser, UserUpdate};
use crate::users::password::PasswordHasher;
use crate::users::repo_types::{ModifiedFields, User, UserField};

/// Pre-save hook. Replaces the staged plaintext password with a salted hash,
/// but only when the password is part of this save; otherwise the stored hash
/// is left byte-for-byte as it was.
#[instrument(skip_all, fields(user_id = %user.id))]
pub fn hash_password_on_save(
    user: &mut User,
    modified: &ModifiedFields,
    hasher: &PasswordHasher,
) -> Result<(), UserError> {
    if !modified.contains(UserField::Password) {
        debug!("password untouched, keeping stored hash");
        return Ok(());
    }
    user.password = hasher.hash(&user.password)?;
    debug!(scheme = %hasher.scheme(), "password hashed");
    Ok(())
}

impl User {
    pub fn verify_password(
        &self,
        candidate: &str,
        hasher: &PasswordHasher,
    ) -> Result<bool, UserError> {
        Ok(hasher.verify(candidate, &self.password)?)
    }
}

/// Validation, defaults and hashing for a new record, ready to insert.
pub fn prepare_create(new_user: NewUser, hasher: &PasswordHasher) -> Result<User, UserError> {
    let mut user = User::stage_new(new_user, OffsetDateTime::now_utc())?;
    hash_password_on_save(&mut user, &ModifiedFields::all(), hasher)?;
    Ok(user)
}

/// Applies `update` to `user` and runs the pre-save hook. On error `user` may
/// hold a partially prepared state and must be discarded by the caller.
pub fn prepare_update(
    user: &mut User,
    update: UserUpdate,
    hasher: &PasswordHasher,
) -> Result<ModifiedFields, UserError> {
    let modified = user.apply(update)?;
    hash_password_on_save(user, &modified, hasher)?;
    if !modified.is_empty() {
        user.updated_at = OffsetDateTime::now_utc();
    }
    Ok(modified)
}
