use tracing::{info, warn};

use crate::users::{
    error::UserError,
    model::{NewUser, User},
    repo::UserStore,
    token::JwtKeys,
};

/// Validates, hashes and inserts a new account.
pub async fn create_user(
    store: &dyn UserStore,
    input: NewUser,
    cost: u32,
) -> Result<User, UserError> {
    let mut user = User::new(input)?;
    save_user(store, &mut user, cost).await?;
    info!(user_id = %user.id, role = %user.role, "user created");
    Ok(user)
}

/// Persists `user`, inserting or updating as appropriate.
///
/// Always runs [`User::prepare_for_persist`] first, so a modified password is
/// hashed and an unmodified one is left alone. On success `user` is replaced
/// with the stored record.
pub async fn save_user(store: &dyn UserStore, user: &mut User, cost: u32) -> Result<(), UserError> {
    let write = user.prepare_for_persist(cost).await?;
    let stored = if user.is_new() {
        store.insert(user, &write).await?
    } else {
        store.update(user, &write).await?
    };
    *user = stored;
    Ok(())
}

/// A verified user together with a freshly issued token.
#[derive(Debug)]
pub struct LoginGrant {
    pub user: User,
    pub token: String,
}

/// Checks credentials and issues a token. `Ok(None)` means bad credentials.
pub async fn authenticate(
    store: &dyn UserStore,
    keys: &JwtKeys,
    email: &str,
    password: &str,
) -> Result<Option<LoginGrant>, UserError> {
    let Some(user) = store.find_by_email_with_password(email).await? else {
        warn!("login unknown email");
        return Ok(None);
    };
    if !user.compare_password(password).await? {
        warn!(user_id = %user.id, "login invalid password");
        return Ok(None);
    }
    let token = user.generate_auth_token(keys).await?;
    info!(user_id = %user.id, "user logged in");
    Ok(Some(LoginGrant { user, token }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::JwtConfig,
        users::{
            error::ValidationError, memory::MemoryUserStore, model::Role,
            validation::is_valid_role,
        },
    };
    use time::{Duration, OffsetDateTime};
    use uuid::Uuid;

    const TEST_COST: u32 = 4;

    fn keys() -> JwtKeys {
        JwtKeys::from_config(&JwtConfig {
            secret: Some("test-secret".into()),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            ttl_minutes: 60,
        })
        .expect("keys")
    }

    fn input(email: &str) -> NewUser {
        NewUser {
            first_name: Some("Ann".into()),
            email: Some(email.into()),
            password: Some("secret123".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_normalizes_and_hashes() {
        let store = MemoryUserStore::default();
        let user = create_user(
            &store,
            NewUser {
                role: Some("ADMIN".into()),
                ..input("Ann@Example.com")
            },
            TEST_COST,
        )
        .await
        .unwrap();

        assert_eq!(user.email, "ann@example.com");
        assert_eq!(user.role, Role::Admin);
        assert!(!user.is_new());
        assert!(user.compare_password("secret123").await.unwrap());
        assert!(!user.compare_password("wrong").await.unwrap());

        let raw = store.raw(user.id).await.unwrap();
        assert_ne!(raw.password.as_deref(), Some("secret123"));
        assert!(raw.password.unwrap().starts_with("$2b$"));
    }

    #[tokio::test]
    async fn duplicate_email_fails_case_insensitively() {
        let store = MemoryUserStore::default();
        create_user(&store, input("ann@example.com"), TEST_COST)
            .await
            .unwrap();
        let err = create_user(&store, input("ANN@example.com"), TEST_COST)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UserError::Validation(ValidationError::DuplicateEmail(ref e)) if e == "ann@example.com"
        ));
    }

    #[tokio::test]
    async fn invalid_roles_are_rejected() {
        let store = MemoryUserStore::default();
        for (i, role) in ["superuser", "Admins", "content-creator", "root"]
            .into_iter()
            .enumerate()
        {
            assert!(!is_valid_role(role));
            let err = create_user(
                &store,
                NewUser {
                    role: Some(role.into()),
                    ..input(&format!("u{i}@example.com"))
                },
                TEST_COST,
            )
            .await
            .unwrap_err();
            assert!(matches!(
                err,
                UserError::Validation(ValidationError::InvalidRole(_))
            ));
        }
    }

    #[tokio::test]
    async fn valid_roles_store_lowercase() {
        let store = MemoryUserStore::default();
        for (i, role) in ["Admin", "CONTENT CREATOR", "uSeR"].into_iter().enumerate() {
            let user = create_user(
                &store,
                NewUser {
                    role: Some(role.into()),
                    ..input(&format!("r{i}@example.com"))
                },
                TEST_COST,
            )
            .await
            .unwrap();
            assert_eq!(user.role.as_str(), role.to_lowercase());
        }
    }

    #[tokio::test]
    async fn phone_numbers_must_have_ten_digits() {
        let store = MemoryUserStore::default();
        for (i, phone) in ["123", "12345678901", "abcdefghij", "12345 6789"]
            .into_iter()
            .enumerate()
        {
            let err = create_user(
                &store,
                NewUser {
                    phone_number: Some(phone.into()),
                    ..input(&format!("p{i}@example.com"))
                },
                TEST_COST,
            )
            .await
            .unwrap_err();
            assert!(matches!(
                err,
                UserError::Validation(ValidationError::InvalidPhoneNumber)
            ));
        }

        let user = create_user(
            &store,
            NewUser {
                phone_number: Some("5551234567".into()),
                ..input("ok@example.com")
            },
            TEST_COST,
        )
        .await
        .unwrap();
        assert_eq!(user.phone_number.as_deref(), Some("5551234567"));
    }

    #[tokio::test]
    async fn malformed_email_is_rejected() {
        let store = MemoryUserStore::default();
        let err = create_user(&store, input("not-an-email"), TEST_COST)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UserError::Validation(ValidationError::InvalidEmail(_))
        ));
    }

    #[tokio::test]
    async fn hashing_failure_aborts_persist() {
        let store = MemoryUserStore::default();
        let err = create_user(&store, input("ann@example.com"), 99)
            .await
            .unwrap_err();
        assert!(matches!(err, UserError::Hashing(_)));
        assert!(store.find_by_email("ann@example.com").await.unwrap().is_none());

        let mut user = User::new(input("ann@example.com")).unwrap();
        let err = save_user(&store, &mut user, 99).await.unwrap_err();
        assert!(matches!(err, UserError::Hashing(_)));
        assert!(user.is_new());
        assert!(user.is_password_modified());
        assert!(user.password.is_none());
        assert!(store.raw(user.id).await.is_none());

        save_user(&store, &mut user, TEST_COST).await.unwrap();
        assert!(!user.is_new());
        assert!(user.compare_password("secret123").await.unwrap());
    }

    #[tokio::test]
    async fn resave_without_password_change_keeps_hash() {
        let store = MemoryUserStore::default();
        let user = create_user(&store, input("ann@example.com"), TEST_COST)
            .await
            .unwrap();
        let original = store.raw(user.id).await.unwrap().password;

        let mut loaded = store.find_by_id(user.id).await.unwrap().unwrap();
        loaded.last_name = Some("Smith".into());
        save_user(&store, &mut loaded, TEST_COST).await.unwrap();

        let raw = store.raw(user.id).await.unwrap();
        assert_eq!(raw.password, original);
        assert_eq!(raw.last_name.as_deref(), Some("Smith"));
    }

    #[tokio::test]
    async fn changing_password_rehashes() {
        let store = MemoryUserStore::default();
        let user = create_user(&store, input("ann@example.com"), TEST_COST)
            .await
            .unwrap();
        let mut loaded = store.find_by_id(user.id).await.unwrap().unwrap();
        loaded.set_password("new-secret");
        save_user(&store, &mut loaded, TEST_COST).await.unwrap();

        let fetched = store
            .find_by_email_with_password("ann@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(fetched.compare_password("new-secret").await.unwrap());
        assert!(!fetched.compare_password("secret123").await.unwrap());
    }

    #[tokio::test]
    async fn update_cannot_take_another_users_email() {
        let store = MemoryUserStore::default();
        create_user(&store, input("ann@example.com"), TEST_COST)
            .await
            .unwrap();
        let mut bob = create_user(&store, input("bob@example.com"), TEST_COST)
            .await
            .unwrap();
        bob.email = "Ann@Example.com".into();
        let err = save_user(&store, &mut bob, TEST_COST).await.unwrap_err();
        assert!(matches!(
            err,
            UserError::Validation(ValidationError::DuplicateEmail(_))
        ));
    }

    #[tokio::test]
    async fn default_reads_exclude_password() {
        let store = MemoryUserStore::default();
        let user = create_user(&store, input("ann@example.com"), TEST_COST)
            .await
            .unwrap();

        let by_id = store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(by_id.password.is_none());
        let by_email = store.find_by_email("ANN@example.com").await.unwrap().unwrap();
        assert!(by_email.password.is_none());
        assert!(matches!(
            by_email.compare_password("secret123").await,
            Err(UserError::PasswordNotLoaded)
        ));
    }

    #[tokio::test]
    async fn authenticate_issues_token_for_user() {
        let store = MemoryUserStore::default();
        let keys = keys();
        let user = create_user(&store, input("ann@example.com"), TEST_COST)
            .await
            .unwrap();

        let grant = authenticate(&store, &keys, "Ann@Example.com", "secret123")
            .await
            .unwrap()
            .expect("valid credentials");
        let claims = keys.verify(&grant.token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.exp - claims.iat, 60 * 60);

        assert!(authenticate(&store, &keys, "ann@example.com", "wrong")
            .await
            .unwrap()
            .is_none());
        assert!(authenticate(&store, &keys, "nobody@example.com", "secret123")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn reset_token_lookup_ignores_expired_tokens() {
        let store = MemoryUserStore::default();
        let mut user = create_user(&store, input("ann@example.com"), TEST_COST)
            .await
            .unwrap();
        user.reset_password_token = Some("tok".into());
        user.reset_password_expire = Some(OffsetDateTime::now_utc() + Duration::minutes(10));
        save_user(&store, &mut user, TEST_COST).await.unwrap();

        let found = store.find_by_reset_password_token("tok").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(user.id));

        user.reset_password_expire = Some(OffsetDateTime::now_utc() - Duration::minutes(1));
        save_user(&store, &mut user, TEST_COST).await.unwrap();
        assert!(store
            .find_by_reset_password_token("tok")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn favourites_are_weak_references() {
        let store = MemoryUserStore::default();
        let user = create_user(&store, input("ann@example.com"), TEST_COST)
            .await
            .unwrap();
        let property = Uuid::new_v4();

        store.add_favourite(user.id, property).await.unwrap();
        let updated = store.add_favourite(user.id, property).await.unwrap();
        assert_eq!(updated.favourites, vec![property]);

        let updated = store.remove_favourite(user.id, property).await.unwrap();
        assert!(updated.favourites.is_empty());

        assert!(matches!(
            store.add_favourite(Uuid::new_v4(), property).await,
            Err(UserError::NotFound)
        ));
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let store = MemoryUserStore::default();
        let user = create_user(&store, input("ann@example.com"), TEST_COST)
            .await
            .unwrap();
        assert!(store.delete(user.id).await.unwrap());
        assert!(!store.delete(user.id).await.unwrap());
        assert!(store.find_by_id(user.id).await.unwrap().is_none());
    }
}
