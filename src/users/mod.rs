pub mod dto;
pub mod memory;
pub mod password;
pub mod pg;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod validation;

pub use dto::{NewUser, UserUpdate};
pub use password::{PasswordHasher, PasswordScheme};
pub use repo::UserRepository;
pub use repo_types::{Address, Event, ModifiedFields, OrderSummary, Recurrence, User, UserField};
pub use services::hash_password_on_save;
pub use validation::{FieldViolation, ValidationError};
