use std::fmt;

use serde::Deserialize;
use time::OffsetDateTime;

use crate::users::repo_types::{Address, Event, OrderSummary};

/// Registration input. Absent fields are reported by validation, not by serde.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password: Option<String>, // plaintext
}

impl NewUser {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        phone: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: Some(name.into()),
            email: Some(email.into()),
            phone: Some(phone.into()),
            password: Some(password.into()),
        }
    }
}

impl fmt::Debug for NewUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewUser")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("phone", &self.phone)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Partial update of a stored user. `None` leaves a field untouched; the
/// `push_*` lists are appended after any replacement of the same sequence.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login_date: Option<OffsetDateTime>,
    pub login_streak: Option<i32>,
    pub coins: Option<i32>,
    pub addresses: Option<Vec<Address>>,
    pub orders: Option<Vec<OrderSummary>>,
    pub events: Option<Vec<Event>>,
    pub push_addresses: Vec<Address>,
    pub push_orders: Vec<OrderSummary>,
    pub push_events: Vec<Event>,
}

impl UserUpdate {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn last_login_date(mut self, at: OffsetDateTime) -> Self {
        self.last_login_date = Some(at);
        self
    }

    pub fn login_streak(mut self, streak: i32) -> Self {
        self.login_streak = Some(streak);
        self
    }

    pub fn coins(mut self, coins: i32) -> Self {
        self.coins = Some(coins);
        self
    }

    pub fn addresses(mut self, addresses: Vec<Address>) -> Self {
        self.addresses = Some(addresses);
        self
    }

    pub fn orders(mut self, orders: Vec<OrderSummary>) -> Self {
        self.orders = Some(orders);
        self
    }

    pub fn events(mut self, events: Vec<Event>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn push_address(mut self, address: Address) -> Self {
        self.push_addresses.push(address);
        self
    }

    pub fn push_order(mut self, order: OrderSummary) -> Self {
        self.push_orders.push(order);
        self
    }

    pub fn push_event(mut self, event: Event) -> Self {
        self.push_events.push(event);
        self
    }
}

impl fmt::Debug for UserUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserUpdate")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("phone", &self.phone)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("last_login_date", &self.last_login_date)
            .field("login_streak", &self.login_streak)
            .field("coins", &self.coins)
            .field("addresses", &self.addresses)
            .field("orders", &self.orders)
            .field("events", &self.events)
            .field("push_addresses", &self.push_addresses)
            .field("push_orders", &self.push_orders)
            .field("push_events", &self.push_events)
            .finish()
    }
}
