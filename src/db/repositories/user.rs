use std::sync::Arc;

use tracing::instrument;

use crate::constants::{TABLE_USER_AUTH, TABLE_USERS};
use crate::db::StoreResult;
use crate::db::models::user::{User, UserAuth};
use crate::db::repositories::Repository;
use crate::db::store::Store;
use crate::util::identity::IdentityUser;

pub struct UserRepository {
    store: Arc<dyn Store>,
}

impl Repository for UserRepository {
    type Output = User;

    const TABLE_NAME: &'static str = TABLE_USERS;
    const BASE_FIELDS: &'static str = "id, name, email, created_at";

    fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }
}

impl UserRepository {
    /// Makes sure both the user row and its provider link exist for `identity`.
    ///
    /// Both writes are insert-or-ignore keyed on the user id. Returns `true` if this call
    /// created the user.
    #[instrument(skip(self, identity), fields(user_id = %identity.id))]
    pub async fn provision(&self, identity: &IdentityUser) -> StoreResult<bool> {
        let created = self
            .insert_if_absent(&User::from(identity), "id")
            .await?;

        let linked = UserAuthRepository::new(self.store.clone())
            .insert_if_absent(&UserAuth::from(identity), "user_id")
            .await?;

        if created || linked {
            tracing::info!(created, linked, "provisioned user on first sight");
        }

        Ok(created)
    }
}

pub struct UserAuthRepository {
    store: Arc<dyn Store>,
}

impl Repository for UserAuthRepository {
    type Output = UserAuth;

    const TABLE_NAME: &'static str = TABLE_USER_AUTH;
    const BASE_FIELDS: &'static str = "user_id, provider, provider_user_id, auth_payload";

    fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }
}
