use anyhow::Context;
use async_trait::async_trait;
use sqlx::{types::Json, FromRow, PgPool};
use time::OffsetDateTime;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use crate::error::UserError;
use crate::users::dto::{NewUser, UserUpdate};
use crate::users::password::PasswordHasher;
use crate::users::repo::{UserRepository, MAX_UPDATE_ATTEMPTS};
use crate::users::repo_types::{Address, Event, OrderSummary, User};
use crate::users::services::{prepare_create, prepare_update};
use crate::users::validation::normalize_email;

const USER_COLUMNS: &str = "id, name, email, phone, password, created_at, last_login_date, \
     login_streak, coins, addresses, orders, events, updated_at";

/// Row shape of the `users` table; nested sequences live in JSONB columns.
#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    phone: String,
    password: String,
    created_at: OffsetDateTime,
    last_login_date: OffsetDateTime,
    login_streak: i32,
    coins: i32,
    addresses: Json<Vec<Address>>,
    orders: Json<Vec<OrderSummary>>,
    events: Json<Vec<Event>>,
    updated_at: OffsetDateTime,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        Self {
            id: r.id,
            name: r.name,
            email: r.email,
            phone: r.phone,
            password: r.password,
            created_at: r.created_at,
            last_login_date: r.last_login_date,
            login_streak: r.login_streak,
            coins: r.coins,
            addresses: r.addresses.0,
            orders: r.orders.0,
            events: r.events.0,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgUserRepository {
    pool: PgPool,
    hasher: PasswordHasher,
}

impl PgUserRepository {
    pub fn new(pool: PgPool, hasher: PasswordHasher) -> Self {
        Self { pool, hasher }
    }
}

/// Unique violations become [`UserError::Conflict`]; anything else is internal.
fn write_error(err: sqlx::Error, email: &str, what: &'static str) -> UserError {
    if err
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation())
    {
        warn!(email, "email already registered");
        return UserError::Conflict {
            email: email.to_owned(),
        };
    }
    error!(error = %err, "{what} failed");
    UserError::Internal(anyhow::Error::new(err).context(what))
}

#[async_trait]
impl UserRepository for PgUserRepository {
    fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    #[instrument(skip(self))]
    async fn create(&self, new_user: NewUser) -> Result<User, UserError> {
        let user = prepare_create(new_user, &self.hasher)?;

        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (id, name, email, phone, password, created_at, last_login_date,
                               login_streak, coins, addresses, orders, events, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.password)
        .bind(user.created_at)
        .bind(user.last_login_date)
        .bind(user.login_streak)
        .bind(user.coins)
        .bind(Json(&user.addresses))
        .bind(Json(&user.orders))
        .bind(Json(&user.events))
        .bind(user.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error(e, &user.email, "insert user"))?;

        debug!(user_id = %row.id, "user created");
        Ok(row.into())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, UserError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("find user by id")?;
        Ok(row.map(User::from))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await
        .context("find user by email")?;
        Ok(row.map(User::from))
    }

    #[instrument(skip(self, update))]
    async fn update(&self, id: Uuid, update: UserUpdate) -> Result<User, UserError> {
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let snapshot = self.find_by_id(id).await?.ok_or(UserError::NotFound)?;

            // No row lock or connection is held while the password hashes.
            let mut user = snapshot.clone();
            let modified = prepare_update(&mut user, update.clone(), &self.hasher)?;
            if modified.is_empty() {
                return Ok(user);
            }

            // created_at is not part of the SET list.
            let row = sqlx::query_as::<_, UserRow>(&format!(
                r#"
                UPDATE users
                   SET name = $2, email = $3, phone = $4, password = $5, last_login_date = $6,
                       login_streak = $7, coins = $8, addresses = $9, orders = $10, events = $11,
                       updated_at = $12
                 WHERE id = $1 AND updated_at = $13
                RETURNING {USER_COLUMNS}
                "#
            ))
            .bind(id)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.phone)
            .bind(&user.password)
            .bind(user.last_login_date)
            .bind(user.login_streak)
            .bind(user.coins)
            .bind(Json(&user.addresses))
            .bind(Json(&user.orders))
            .bind(Json(&user.events))
            .bind(user.updated_at)
            .bind(snapshot.updated_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| write_error(e, &user.email, "update user"))?;

            match row {
                Some(row) => {
                    debug!(user_id = %id, fields = ?modified, "user updated");
                    return Ok(row.into());
                }
                None => debug!(user_id = %id, attempt, "user changed during update, retrying"),
            }
        }
        Err(UserError::Internal(anyhow::anyhow!(
            "user {id} kept changing during update"
        )))
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: Uuid) -> Result<(), UserError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("delete user")?;
        if result.rows_affected() == 0 {
            return Err(UserError::NotFound);
        }
        debug!(user_id = %id, "user deleted");
        Ok(())
    }
}
