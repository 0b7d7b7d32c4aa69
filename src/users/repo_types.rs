use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::users::validation::ValidationError;

/// Account holder record as persisted by a [`UserRepository`](crate::users::repo::UserRepository).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String, // trimmed, lower-cased, unique
    pub phone: String,
    #[serde(skip_serializing)]
    pub password: String, // salted hash once saved
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_login_date: OffsetDateTime,
    pub login_streak: i32,
    pub coins: i32,
    pub addresses: Vec<Address>,
    pub orders: Vec<OrderSummary>,
    pub events: Vec<Event>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Shipping address owned by a single user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Address {
    pub name: String,
    pub phone: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub is_default: bool,
}

/// Summary of a placed order. Line items are opaque to this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    #[serde(default)]
    pub order_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub occasion: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<Recurrence>,
}

/// How often an [`Event`] repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    Once,
    Weekly,
    Monthly,
    Yearly,
}

impl Recurrence {
    pub const ALL: [Recurrence; 4] = [
        Recurrence::Once,
        Recurrence::Weekly,
        Recurrence::Monthly,
        Recurrence::Yearly,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Recurrence::Once => "once",
            Recurrence::Weekly => "weekly",
            Recurrence::Monthly => "monthly",
            Recurrence::Yearly => "yearly",
        }
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Recurrence {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Recurrence::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| {
                ValidationError::single(
                    "recurrence",
                    format!("`{s}` is not a valid recurrence (once, weekly, monthly, yearly)"),
                )
            })
    }
}

/// Writable fields of a [`User`]. `id` and `created_at` never change after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UserField {
    Name,
    Email,
    Phone,
    Password,
    LastLoginDate,
    LoginStreak,
    Coins,
    Addresses,
    Orders,
    Events,
}

impl UserField {
    pub fn as_str(self) -> &'static str {
        match self {
            UserField::Name => "name",
            UserField::Email => "email",
            UserField::Phone => "phone",
            UserField::Password => "password",
            UserField::LastLoginDate => "lastLoginDate",
            UserField::LoginStreak => "loginStreak",
            UserField::Coins => "coins",
            UserField::Addresses => "addresses",
            UserField::Orders => "orders",
            UserField::Events => "events",
        }
    }
}

/// Set of fields touched by a pending save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModifiedFields(BTreeSet<UserField>);

impl ModifiedFields {
    /// Every field, as on initial creation.
    pub fn all() -> Self {
        use UserField::*;
        Self(
            [
                Name,
                Email,
                Phone,
                Password,
                LastLoginDate,
                LoginStreak,
                Coins,
                Addresses,
                Orders,
                Events,
            ]
            .into_iter()
            .collect(),
        )
    }

    pub fn insert(&mut self, field: UserField) {
        self.0.insert(field);
    }

    pub fn contains(&self, field: UserField) -> bool {
        self.0.contains(&field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = UserField> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<UserField> for ModifiedFields {
    fn from_iter<I: IntoIterator<Item = UserField>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
