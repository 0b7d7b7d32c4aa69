use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::users::dto::{NewUser, UserUpdate};
use crate::users::repo_types::{ModifiedFields, User, UserField};

pub const MIN_PASSWORD_LEN: usize = 6;
pub const DEFAULT_LOGIN_STREAK: i32 = 1;
pub const DEFAULT_COINS: i32 = 10;

/// A single field that failed validation. `field` is the serialized field
/// path: a [`UserField::as_str`] name, or a nested one such as `recurrence`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: &'static str,
    pub message: String,
}

/// One or more field violations reported for a single save attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            violations: vec![FieldViolation {
                field,
                message: message.into(),
            }],
        }
    }

    pub fn violations(&self) -> &[FieldViolation] {
        &self.violations
    }

    pub fn message_for(&self, field: &str) -> Option<&str> {
        self.violations
            .iter()
            .find(|v| v.field == field)
            .map(|v| v.message.as_str())
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for v in &self.violations {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", v.field, v.message)?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Default)]
struct Violations(Vec<FieldViolation>);

impl Violations {
    fn check<T>(&mut self, result: Result<T, FieldViolation>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(v) => {
                self.0.push(v);
                None
            }
        }
    }

    fn into_error(self) -> ValidationError {
        ValidationError { violations: self.0 }
    }

    fn finish(self) -> Result<(), ValidationError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self.into_error())
        }
    }
}

fn violation(field: UserField, message: &str) -> FieldViolation {
    FieldViolation {
        field: field.as_str(),
        message: message.to_owned(),
    }
}

/// ASCII word characters only, with 2-3 character top-level segments (`.co.uk` matches).
pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(
            r"^[A-Za-z0-9_]+([.-]?[A-Za-z0-9_]+)*@[A-Za-z0-9_]+([.-]?[A-Za-z0-9_]+)*(\.[A-Za-z0-9_]{2,3})+$"
        )
        .unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn required_trimmed(
    raw: Option<&str>,
    field: UserField,
    message: &str,
) -> Result<String, FieldViolation> {
    match raw.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_owned()),
        _ => Err(violation(field, message)),
    }
}

fn check_name(raw: Option<&str>) -> Result<String, FieldViolation> {
    required_trimmed(raw, UserField::Name, "Name is required")
}

fn check_phone(raw: Option<&str>) -> Result<String, FieldViolation> {
    required_trimmed(raw, UserField::Phone, "Phone number is required")
}

fn check_email(raw: Option<&str>) -> Result<String, FieldViolation> {
    let email = normalize_email(raw.unwrap_or_default());
    if email.is_empty() {
        return Err(violation(UserField::Email, "Email is required"));
    }
    if !is_valid_email(&email) {
        return Err(violation(UserField::Email, "Please enter a valid email"));
    }
    Ok(email)
}

// Length is counted in UTF-16 code units on the password as entered, untrimmed.
fn check_password(raw: Option<&str>) -> Result<String, FieldViolation> {
    match raw {
        None | Some("") => Err(violation(UserField::Password, "Password is required")),
        Some(p) if p.encode_utf16().count() < MIN_PASSWORD_LEN => Err(violation(
            UserField::Password,
            "Password must be at least 6 characters",
        )),
        Some(p) => Ok(p.to_owned()),
    }
}

impl User {
    /// Validate and normalize a registration, filling bookkeeping defaults.
    /// The returned record still carries the plaintext password; it must go
    /// through [`hash_password_on_save`](crate::users::services::hash_password_on_save)
    /// before it is written anywhere.
    pub fn stage_new(new_user: NewUser, now: OffsetDateTime) -> Result<User, ValidationError> {
        let mut violations = Violations::default();
        let name = violations.check(check_name(new_user.name.as_deref()));
        let email = violations.check(check_email(new_user.email.as_deref()));
        let phone = violations.check(check_phone(new_user.phone.as_deref()));
        let password = violations.check(check_password(new_user.password.as_deref()));

        let (Some(name), Some(email), Some(phone), Some(password)) = (name, email, phone, password)
        else {
            return Err(violations.into_error());
        };
        Ok(User {
            id: Uuid::new_v4(),
            name,
            email,
            phone,
            password,
            created_at: now,
            last_login_date: now,
            login_streak: DEFAULT_LOGIN_STREAK,
            coins: DEFAULT_COINS,
            addresses: Vec::new(),
            orders: Vec::new(),
            events: Vec::new(),
            updated_at: now,
        })
    }

    /// Validate `update` and apply it in place. Nothing is changed when any
    /// field fails validation.
    pub fn apply(&mut self, update: UserUpdate) -> Result<ModifiedFields, ValidationError> {
        let mut violations = Violations::default();
        let name = update
            .name
            .as_deref()
            .and_then(|n| violations.check(check_name(Some(n))));
        let email = update
            .email
            .as_deref()
            .and_then(|e| violations.check(check_email(Some(e))));
        let phone = update
            .phone
            .as_deref()
            .and_then(|p| violations.check(check_phone(Some(p))));
        let password = update
            .password
            .as_deref()
            .and_then(|p| violations.check(check_password(Some(p))));
        violations.finish()?;

        let mut modified = ModifiedFields::default();
        if let Some(name) = name {
            self.name = name;
            modified.insert(UserField::Name);
        }
        if let Some(email) = email {
            self.email = email;
            modified.insert(UserField::Email);
        }
        if let Some(phone) = phone {
            self.phone = phone;
            modified.insert(UserField::Phone);
        }
        if let Some(password) = password {
            self.password = password;
            modified.insert(UserField::Password);
        }
        if let Some(at) = update.last_login_date {
            self.last_login_date = at;
            modified.insert(UserField::LastLoginDate);
        }
        if let Some(streak) = update.login_streak {
            self.login_streak = streak;
            modified.insert(UserField::LoginStreak);
        }
        if let Some(coins) = update.coins {
            self.coins = coins;
            modified.insert(UserField::Coins);
        }
        if let Some(addresses) = update.addresses {
            self.addresses = addresses;
            modified.insert(UserField::Addresses);
        }
        if !update.push_addresses.is_empty() {
            self.addresses.extend(update.push_addresses);
            modified.insert(UserField::Addresses);
        }
        if let Some(orders) = update.orders {
            self.orders = orders;
            modified.insert(UserField::Orders);
        }
        if !update.push_orders.is_empty() {
            self.orders.extend(update.push_orders);
            modified.insert(UserField::Orders);
        }
        if let Some(events) = update.events {
            self.events = events;
            modified.insert(UserField::Events);
        }
        if !update.push_events.is_empty() {
            self.events.extend(update.push_events);
            modified.insert(UserField::Events);
        }
        Ok(modified)
    }
}
