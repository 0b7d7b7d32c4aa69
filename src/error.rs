use crate::users::validation::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Email {email} is already registered")]
    Conflict { email: String },
    #[error("User not found")]
    NotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl UserError {
    pub fn is_validation(&self) -> bool {
        matches!(self, UserError::Validation(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, UserError::Conflict { .. })
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, UserError::Internal(_))
    }
}
