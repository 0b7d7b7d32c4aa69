use std::collections::{hash_map::Entry, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::UserError;
use crate::users::dto::{NewUser, UserUpdate};
use crate::users::password::PasswordHasher;
use crate::users::repo::{UserRepository, MAX_UPDATE_ATTEMPTS};
use crate::users::repo_types::{User, UserField};
use crate::users::services::{prepare_create, prepare_update};
use crate::users::validation::normalize_email;

#[derive(Debug, Default)]
struct InMemoryUserState {
    users_by_id: HashMap<Uuid, User>,
    ids_by_email: HashMap<String, Uuid>,
}

/// Process-local store. The write lock stands in for a unique index on email.
#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    state: RwLock<InMemoryUserState>,
    hasher: PasswordHasher,
}

impl InMemoryUserRepository {
    pub fn new(hasher: PasswordHasher) -> Self {
        Self {
            state: RwLock::default(),
            hasher,
        }
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.users_by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    #[instrument(skip(self))]
    async fn create(&self, new_user: NewUser) -> Result<User, UserError> {
        let user = prepare_create(new_user, &self.hasher)?;

        let mut guard = self.state.write().await;
        match guard.ids_by_email.entry(user.email.clone()) {
            Entry::Occupied(_) => {
                warn!(email = %user.email, "email already registered");
                return Err(UserError::Conflict { email: user.email });
            }
            Entry::Vacant(entry) => entry.insert(user.id),
        };
        guard.users_by_id.insert(user.id, user.clone());

        debug!(user_id = %user.id, "user created");
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, UserError> {
        Ok(self.state.read().await.users_by_id.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserError> {
        let guard = self.state.read().await;
        Ok(guard
            .ids_by_email
            .get(&normalize_email(email))
            .and_then(|id| guard.users_by_id.get(id))
            .cloned())
    }

    #[instrument(skip(self, update))]
    async fn update(&self, id: Uuid, update: UserUpdate) -> Result<User, UserError> {
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let snapshot = self
                .state
                .read()
                .await
                .users_by_id
                .get(&id)
                .cloned()
                .ok_or(UserError::NotFound)?;

            // Hashing runs with no lock held; the write below only lands if
            // the record still matches the snapshot.
            let mut staged = snapshot.clone();
            let modified = prepare_update(&mut staged, update.clone(), &self.hasher)?;

            let mut guard = self.state.write().await;
            match guard.users_by_id.get(&id) {
                None => return Err(UserError::NotFound),
                Some(current) if *current != snapshot => {
                    debug!(user_id = %id, attempt, "user changed during update, retrying");
                    continue;
                }
                Some(_) => {}
            }

            if modified.contains(UserField::Email) && staged.email != snapshot.email {
                if guard.ids_by_email.contains_key(&staged.email) {
                    warn!(email = %staged.email, "email already registered");
                    return Err(UserError::Conflict {
                        email: staged.email,
                    });
                }
                guard.ids_by_email.remove(&snapshot.email);
                guard.ids_by_email.insert(staged.email.clone(), id);
            }
            guard.users_by_id.insert(id, staged.clone());

            debug!(user_id = %id, fields = ?modified, "user updated");
            return Ok(staged);
        }
        Err(UserError::Internal(anyhow::anyhow!(
            "user {id} kept changing during update"
        )))
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: Uuid) -> Result<(), UserError> {
        let mut guard = self.state.write().await;
        let user = guard.users_by_id.remove(&id).ok_or(UserError::NotFound)?;
        guard.ids_by_email.remove(&user.email);
        debug!(user_id = %id, "user deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo_types::{Address, Event, OrderSummary, Recurrence};
    use time::OffsetDateTime;

    fn repo() -> InMemoryUserRepository {
        InMemoryUserRepository::new(PasswordHasher::bcrypt(4))
    }

    fn jo() -> NewUser {
        NewUser::new("Jo", "jo@example.com", "555", "secret1")
    }

    #[tokio::test]
    async fn create_applies_defaults() {
        let store = repo();
        let user = store.create(jo()).await.expect("create");
        assert_eq!(user.login_streak, 1);
        assert_eq!(user.coins, 10);
        assert!(user.addresses.is_empty());
        assert!(user.orders.is_empty());
        assert!(user.events.is_empty());
        assert_eq!(user.created_at, user.last_login_date);
        assert_ne!(user.password, "secret1");
    }

    #[tokio::test]
    async fn missing_field_persists_nothing() {
        let store = repo();
        for new_user in [
            NewUser { name: None, ..jo() },
            NewUser { email: None, ..jo() },
            NewUser { phone: None, ..jo() },
            NewUser { password: None, ..jo() },
        ] {
            let err = store.create(new_user).await.unwrap_err();
            let UserError::Validation(v) = err else {
                panic!("expected validation error, got {err:?}");
            };
            assert_eq!(v.violations().len(), 1);
        }
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn invalid_email_and_short_password_rejected() {
        let store = repo();
        for email in ["not-an-email", "a@b"] {
            let err = store
                .create(NewUser::new("Jo", email, "555", "secret1"))
                .await
                .unwrap_err();
            assert!(err.is_validation());
        }
        let err = store
            .create(NewUser::new("Jo", "jo@example.com", "555", "abc12"))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(store
            .create(NewUser::new("Jo", "jo@example.com", "555", "abc123"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let store = repo();
        store
            .create(NewUser::new("A", "a@example.com", "1", "secret1"))
            .await
            .expect("first");
        let err = store
            .create(NewUser::new("B", " A@Example.com ", "2", "secret2"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn name_only_update_keeps_hash_identical() {
        let store = repo();
        let user = store.create(jo()).await.expect("create");
        let updated = store
            .update(user.id, UserUpdate::default().name("Joanna"))
            .await
            .expect("update");
        assert_eq!(updated.name, "Joanna");
        assert_eq!(updated.password, user.password);
        assert_eq!(updated.created_at, user.created_at);
    }

    #[tokio::test]
    async fn authenticate_round_trip() {
        let store = repo();
        let user = store.create(jo()).await.expect("create");
        let found = store
            .authenticate("JO@example.com", "secret1")
            .await
            .expect("authenticate");
        assert_eq!(found.map(|u| u.id), Some(user.id));
        assert!(store
            .authenticate("jo@example.com", "wrongpass")
            .await
            .expect("authenticate")
            .is_none());
        assert!(store
            .authenticate("nobody@example.com", "secret1")
            .await
            .expect("authenticate")
            .is_none());
    }

    #[tokio::test]
    async fn password_change_is_hashed() {
        let store = repo();
        let user = store.create(jo()).await.expect("create");
        let updated = store
            .update(user.id, UserUpdate::default().password("n3wsecret"))
            .await
            .expect("update");
        assert_ne!(updated.password, "n3wsecret");
        assert_ne!(updated.password, user.password);
        assert!(store
            .authenticate("jo@example.com", "n3wsecret")
            .await
            .expect("authenticate")
            .is_some());
    }

    #[tokio::test]
    async fn failed_update_leaves_record_untouched() {
        let store = repo();
        let user = store.create(jo()).await.expect("create");
        let err = store
            .update(user.id, UserUpdate::default().name("X").password("abc"))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        let stored = store.find_by_id(user.id).await.expect("find").expect("exists");
        assert_eq!(stored, user);
    }

    #[tokio::test]
    async fn email_change_conflict_and_reindex() {
        let store = repo();
        let a = store
            .create(NewUser::new("A", "a@example.com", "1", "secret1"))
            .await
            .expect("a");
        store
            .create(NewUser::new("B", "b@example.com", "2", "secret2"))
            .await
            .expect("b");

        let err = store
            .update(a.id, UserUpdate::default().email("b@example.com"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        store
            .update(a.id, UserUpdate::default().email("c@example.com"))
            .await
            .expect("move email");
        assert!(store.find_by_email("a@example.com").await.expect("find").is_none());
        assert_eq!(
            store.find_by_email("c@example.com").await.expect("find").map(|u| u.id),
            Some(a.id)
        );
    }

    #[tokio::test]
    async fn nested_sequences_keep_insertion_order() {
        let store = repo();
        let user = store.create(jo()).await.expect("create");
        let order = |id: &str| OrderSummary {
            order_id: id.into(),
            date: OffsetDateTime::now_utc(),
            items: vec![serde_json::json!({ "sku": id })],
            total: 12.5,
            status: "placed".into(),
        };
        store
            .update(
                user.id,
                UserUpdate::default()
                    .push_order(order("o-1"))
                    .push_order(order("o-2"))
                    .push_address(Address {
                        name: "Home".into(),
                        is_default: true,
                        ..Address::default()
                    }),
            )
            .await
            .expect("first push");
        let updated = store
            .update(
                user.id,
                UserUpdate::default()
                    .push_order(order("o-3"))
                    .push_event(Event {
                        name: "Mum".into(),
                        occasion: "birthday".into(),
                        recurrence: Some(Recurrence::Yearly),
                        ..Event::default()
                    }),
            )
            .await
            .expect("second push");
        let ids: Vec<_> = updated.orders.iter().map(|o| o.order_id.as_str()).collect();
        assert_eq!(ids, ["o-1", "o-2", "o-3"]);
        assert_eq!(updated.addresses.len(), 1);
        assert_eq!(updated.events[0].recurrence, Some(Recurrence::Yearly));
    }

    #[tokio::test]
    async fn delete_removes_record_and_frees_email() {
        let store = repo();
        let user = store.create(jo()).await.expect("create");
        store.delete(user.id).await.expect("delete");
        assert!(store.find_by_id(user.id).await.expect("find").is_none());
        assert!(matches!(
            store.delete(user.id).await,
            Err(UserError::NotFound)
        ));
        assert!(store.create(jo()).await.is_ok());
    }

    #[tokio::test]
    async fn update_unknown_id_is_not_found() {
        let store = repo();
        let err = store
            .update(Uuid::new_v4(), UserUpdate::default().coins(1))
            .await
            .unwrap_err();
        assert!(matches!(err, UserError::NotFound));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reads_proceed_while_password_update_hashes() {
        let store = std::sync::Arc::new(InMemoryUserRepository::new(PasswordHasher::default()));
        let id = store.create(jo()).await.expect("create").id;

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .update(id, UserUpdate::default().password("n3wsecret"))
                    .await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let read = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            store.find_by_id(id),
        )
        .await
        .expect("read must not wait for hashing")
        .expect("find");
        assert!(read.is_some());

        let updated = writer.await.expect("join").expect("update");
        assert!(updated
            .verify_password("n3wsecret", store.hasher())
            .expect("verify"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_updates_are_not_lost() {
        let store = std::sync::Arc::new(repo());
        let id = store.create(jo()).await.expect("create").id;

        let password = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .update(id, UserUpdate::default().password("n3wsecret"))
                    .await
            })
        };
        let coins = {
            let store = store.clone();
            tokio::spawn(async move { store.update(id, UserUpdate::default().coins(50)).await })
        };
        password.await.expect("join").expect("password update");
        coins.await.expect("join").expect("coins update");

        let stored = store.find_by_id(id).await.expect("find").expect("exists");
        assert_eq!(stored.coins, 50);
        assert!(stored
            .verify_password("n3wsecret", store.hasher())
            .expect("verify"));
    }

    #[tokio::test]
    async fn hashing_failure_persists_nothing() {
        let store = InMemoryUserRepository::new(PasswordHasher::bcrypt(99));
        let err = store.create(jo()).await.unwrap_err();
        assert!(err.is_internal());
        assert!(store.is_empty().await);
    }
}
