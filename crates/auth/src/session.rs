//! Session workflows: login, refresh, logout (revoke) and personal tokens.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use warden_core::{PersonalTokenId, Role, User, UserId};

use crate::claims::{Claims, TokenBody, TokenKind};
use crate::error::AuthError;
use crate::issuer::{IssuedToken, TokenIssuer};
use crate::password::PasswordVerifier;
use crate::store::{BlacklistColumn, NewPersonalToken, PersonalTokenRecord, RevocationRecord, UserDirectory};
use crate::subject::Subject;
use crate::verifier::{Authenticated, TokenVerifier};

/// Access and refresh token minted together.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

/// A new personal token together with its whitelist row.
#[derive(Debug, Clone)]
pub struct PersonalToken {
    pub record: PersonalTokenRecord,
    pub token: IssuedToken,
}

/// Result of a logout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RevokeOutcome {
    Revoked,
    /// The pair (or one of its halves) was already blacklisted; nothing was written.
    AlreadyRevoked,
}

#[derive(Clone)]
pub struct SessionService {
    issuer: TokenIssuer,
    verifier: TokenVerifier,
    directory: Arc<dyn UserDirectory>,
    passwords: Arc<dyn PasswordVerifier>,
}

impl SessionService {
    pub fn new(
        issuer: TokenIssuer,
        verifier: TokenVerifier,
        directory: Arc<dyn UserDirectory>,
        passwords: Arc<dyn PasswordVerifier>,
    ) -> Self {
        Self {
            issuer,
            verifier,
            directory,
            passwords,
        }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// Password login. Unknown user, deleted user and wrong password are
    /// indistinguishable to the caller.
    #[instrument(skip(self, password, now))]
    pub async fn login(&self, username: &str, password: &str, now: DateTime<Utc>) -> Result<TokenPair, AuthError> {
        let user = match self.directory.find_user_by_username(username).await? {
            Some(user) if !user.is_deleted() => user,
            _ => {
                self.passwords.verify_absent(password);
                tracing::debug!("login for unknown or deleted user");
                return Err(AuthError::InvalidCredentials);
            }
        };
        if !self.passwords.verify(password, &user.password_hash) {
            tracing::debug!(user_id = %user.id, "password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        let roles = self.directory.roles_of(user.id).await?;
        let pair = self.issue_pair(&user, &roles, now)?;
        tracing::info!(user_id = %user.id, access_jti = %pair.access.jti(), "login");
        Ok(pair)
    }

    /// Mint a fresh pair from a usable refresh token. The presented pair
    /// stays valid until it expires or is revoked.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str, now: DateTime<Utc>) -> Result<TokenPair, AuthError> {
        let auth = self.verifier.verify(refresh_token, TokenKind::Refresh, now).await?;
        let roles = self.verifier.subjects().roles(auth.subject()).await?;
        let pair = self.issue_pair(auth.subject().user(), roles, now)?;
        tracing::info!(
            user_id = %auth.user_id(),
            refresh_jti = %auth.jti(),
            access_jti = %pair.access.jti(),
            "access token refreshed"
        );
        Ok(pair)
    }

    /// Blacklist an access/refresh pair.
    ///
    /// Both tokens must pass the stateless checks for their kind and name the
    /// same subject. Revoking an already revoked pair, including losing a
    /// concurrent race for the same pair, reports `AlreadyRevoked`.
    #[instrument(skip_all)]
    pub async fn revoke(
        &self,
        access_token: &str,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<RevokeOutcome, AuthError> {
        let access = self.verifier.inspect(access_token, TokenKind::Access, now)?;
        let refresh = self.verifier.inspect(refresh_token, TokenKind::Refresh, now)?;
        let user_id = session_owner(&access, &refresh)?;

        let blacklist = self.verifier.revocation().blacklist_store();
        if blacklist.is_blacklisted(BlacklistColumn::AccessToken, access.jti).await?
            || blacklist.is_blacklisted(BlacklistColumn::RefreshToken, refresh.jti).await?
        {
            tracing::debug!(%user_id, "session already revoked");
            return Ok(RevokeOutcome::AlreadyRevoked);
        }

        let record = RevocationRecord {
            user_id,
            access_token_id: access.jti,
            refresh_token_id: refresh.jti,
            created_at: now,
        };
        match blacklist.blacklist(record).await {
            Ok(()) => {
                tracing::info!(%user_id, access_jti = %access.jti, refresh_jti = %refresh.jti, "session revoked");
                Ok(RevokeOutcome::Revoked)
            }
            Err(e) if e.is_conflict() => {
                tracing::debug!(%user_id, "concurrent revoke of the same session");
                Ok(RevokeOutcome::AlreadyRevoked)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Issue a personal token and whitelist its jti.
    #[instrument(skip(self, subject, scopes, now), fields(user_id = %subject.id()), err)]
    pub async fn create_personal_token(
        &self,
        subject: &Subject,
        description: &str,
        scopes: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<PersonalToken, AuthError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(AuthError::invalid_argument("personal token description must not be empty"));
        }

        let token = self
            .issuer
            .issue_default(subject.user(), TokenBody::Personal { scopes }, now)?;
        let record = self
            .verifier
            .revocation()
            .whitelist_store()
            .insert(NewPersonalToken {
                user_id: subject.id(),
                description: description.to_string(),
                token_id: token.jti(),
                created_at: now,
            })
            .await?;

        tracing::info!(user_id = %subject.id(), id = %record.id, jti = %record.token_id, "personal token created");
        Ok(PersonalToken { record, token })
    }

    pub async fn list_personal_tokens(&self, user_id: UserId) -> Result<Vec<PersonalTokenRecord>, AuthError> {
        Ok(self.verifier.revocation().whitelist_store().list(user_id).await?)
    }

    /// Remove the owner's whitelist row; `false` when there is none.
    pub async fn delete_personal_token(&self, user_id: UserId, id: PersonalTokenId) -> Result<bool, AuthError> {
        let deleted = self
            .verifier
            .revocation()
            .whitelist_store()
            .delete(user_id, id)
            .await?;
        if deleted {
            tracing::info!(%user_id, %id, "personal token deleted");
        }
        Ok(deleted)
    }

    /// Authenticate a presented token of the given kind.
    pub async fn authenticate(
        &self,
        token: &str,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<Authenticated, AuthError> {
        self.verifier.verify(token, kind, now).await
    }

    fn issue_pair(&self, user: &User, roles: &[Role], now: DateTime<Utc>) -> Result<TokenPair, AuthError> {
        let access = self.issuer.issue_default(
            user,
            TokenBody::Access {
                roles: roles.iter().map(|r| r.name.clone()).collect(),
                attributes: user.attributes.clone(),
            },
            now,
        )?;
        let refresh = self.issuer.issue_default(user, TokenBody::Refresh, now)?;
        Ok(TokenPair { access, refresh })
    }
}

fn session_owner(access: &Claims, refresh: &Claims) -> Result<UserId, AuthError> {
    if access.subject != refresh.subject {
        tracing::debug!("access and refresh tokens belong to different subjects");
        return Err(AuthError::InvalidToken);
    }
    access
        .subject
        .as_deref()
        .and_then(|sub| sub.parse().ok())
        .ok_or(AuthError::InvalidToken)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Duration;
    use serde_json::json;

    use warden_core::{Attributes, StoreResult, TokenId};

    use super::*;
    use crate::issuer::tests::test_config;
    use crate::memory::InMemoryStore;
    use crate::password::Argon2Passwords;
    use crate::revocation::RevocationGuard;
    use crate::store::RevocationStore;
    use crate::subject::SubjectResolver;

    struct Fixture {
        store: Arc<InMemoryStore>,
        sessions: SessionService,
        user: User,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let passwords = Argon2Passwords::new();
        let hash = passwords.hash("hunter2").unwrap();
        let user = store
            .create_user("alice", &hash, Attributes::from([("team".to_string(), json!("ops"))]))
            .unwrap();
        let role = store.create_role("operator").unwrap();
        store.assign_role(user.id, role.id).unwrap();

        let sessions = sessions_over(&store, Arc::new(passwords), store.clone());
        Fixture { store, sessions, user }
    }

    fn sessions_over(
        store: &Arc<InMemoryStore>,
        passwords: Arc<dyn PasswordVerifier>,
        blacklist: Arc<dyn RevocationStore>,
    ) -> SessionService {
        let verifier = TokenVerifier::new(
            test_config(),
            RevocationGuard::new(blacklist, store.clone()),
            SubjectResolver::new(store.clone()),
        );
        SessionService::new(TokenIssuer::new(test_config()), verifier, store.clone(), passwords)
    }

    /// Counts every password check, real or placeholder.
    #[derive(Default)]
    struct CountingPasswords {
        inner: Argon2Passwords,
        checks: AtomicUsize,
    }

    impl PasswordVerifier for CountingPasswords {
        fn verify(&self, password: &str, stored_hash: &str) -> bool {
            self.checks.fetch_add(1, Ordering::SeqCst);
            self.inner.verify(password, stored_hash)
        }

        fn verify_absent(&self, password: &str) {
            self.checks.fetch_add(1, Ordering::SeqCst);
            self.inner.verify_absent(password);
        }
    }

    /// Blacklist whose pre-check never sees a row, as when two logouts of the
    /// same session interleave.
    struct LateBlacklist(Arc<InMemoryStore>);

    #[async_trait]
    impl RevocationStore for LateBlacklist {
        async fn is_blacklisted(&self, _column: BlacklistColumn, _jti: TokenId) -> StoreResult<bool> {
            Ok(false)
        }

        async fn blacklist(&self, record: RevocationRecord) -> StoreResult<()> {
            self.0.blacklist(record).await
        }
    }

    #[tokio::test]
    async fn login_embeds_roles_and_attributes() {
        let f = fixture();
        let now = Utc::now();
        let pair = f.sessions.login("alice", "hunter2", now).await.unwrap();

        let auth = f.sessions.authenticate(&pair.access.token, TokenKind::Access, now).await.unwrap();
        assert_eq!(auth.user_id(), f.user.id);
        assert_eq!(auth.claims().roles(), ["operator".to_string()]);
        assert_eq!(auth.claims().attributes().unwrap()["team"], json!("ops"));
        assert_eq!(
            pair.refresh.expires_at().unwrap().timestamp(),
            now.timestamp() + 7 * 24 * 3600
        );
    }

    #[tokio::test]
    async fn login_failures_are_uniform() {
        let f = fixture();
        let now = Utc::now();
        assert_eq!(
            f.sessions.login("alice", "wrong", now).await.unwrap_err(),
            AuthError::InvalidCredentials
        );
        assert_eq!(
            f.sessions.login("mallory", "hunter2", now).await.unwrap_err(),
            AuthError::InvalidCredentials
        );
        f.store.soft_delete_user(f.user.id).unwrap();
        assert_eq!(
            f.sessions.login("alice", "hunter2", now).await.unwrap_err(),
            AuthError::InvalidCredentials
        );
    }

    #[tokio::test]
    async fn unknown_users_cost_a_password_check() {
        let f = fixture();
        let passwords = Arc::new(CountingPasswords::default());
        let sessions = sessions_over(&f.store, passwords.clone(), f.store.clone());
        let now = Utc::now();

        assert_eq!(
            sessions.login("mallory", "hunter2", now).await.unwrap_err(),
            AuthError::InvalidCredentials
        );
        assert_eq!(passwords.checks.load(Ordering::SeqCst), 1);

        f.store.soft_delete_user(f.user.id).unwrap();
        assert_eq!(
            sessions.login("alice", "hunter2", now).await.unwrap_err(),
            AuthError::InvalidCredentials
        );
        assert_eq!(passwords.checks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn losing_a_revoke_race_is_already_revoked() {
        let f = fixture();
        let sessions = sessions_over(
            &f.store,
            Arc::new(Argon2Passwords::new()),
            Arc::new(LateBlacklist(f.store.clone())),
        );
        let now = Utc::now();
        let pair = sessions.login("alice", "hunter2", now).await.unwrap();

        let first = sessions.revoke(&pair.access.token, &pair.refresh.token, now).await.unwrap();
        let second = sessions.revoke(&pair.access.token, &pair.refresh.token, now).await.unwrap();
        assert_eq!(first, RevokeOutcome::Revoked);
        assert_eq!(second, RevokeOutcome::AlreadyRevoked);
        assert_eq!(f.store.revocations().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn refresh_reloads_roles() {
        let f = fixture();
        let now = Utc::now();
        let pair = f.sessions.login("alice", "hunter2", now).await.unwrap();

        let auditor = f.store.create_role("auditor").unwrap();
        f.store.assign_role(f.user.id, auditor.id).unwrap();

        let later = now + Duration::minutes(90);
        let fresh = f.sessions.refresh(&pair.refresh.token, later).await.unwrap();
        let auth = f.sessions.authenticate(&fresh.access.token, TokenKind::Access, later).await.unwrap();
        assert_eq!(auth.claims().roles().len(), 2);

        // An access token is not a refresh token.
        assert_eq!(
            f.sessions.refresh(&pair.access.token, now).await.unwrap_err(),
            AuthError::InvalidToken
        );
    }

    #[tokio::test]
    async fn revoke_kills_both_halves_and_login_recovers() {
        let f = fixture();
        let now = Utc::now();
        let pair = f.sessions.login("alice", "hunter2", now).await.unwrap();

        let outcome = f
            .sessions
            .revoke(&pair.access.token, &pair.refresh.token, now)
            .await
            .unwrap();
        assert_eq!(outcome, RevokeOutcome::Revoked);

        assert_eq!(
            f.sessions.authenticate(&pair.access.token, TokenKind::Access, now).await.unwrap_err(),
            AuthError::InvalidToken
        );
        assert_eq!(
            f.sessions.refresh(&pair.refresh.token, now).await.unwrap_err(),
            AuthError::InvalidToken
        );

        let again = f
            .sessions
            .revoke(&pair.access.token, &pair.refresh.token, now)
            .await
            .unwrap();
        assert_eq!(again, RevokeOutcome::AlreadyRevoked);
        assert_eq!(f.store.revocations().unwrap().len(), 1);

        let fresh = f.sessions.login("alice", "hunter2", now).await.unwrap();
        assert!(f.sessions.authenticate(&fresh.access.token, TokenKind::Access, now).await.is_ok());
    }

    #[tokio::test]
    async fn revoke_with_one_half_already_blacklisted_writes_nothing() {
        let f = fixture();
        let now = Utc::now();
        let first = f.sessions.login("alice", "hunter2", now).await.unwrap();
        let second = f.sessions.login("alice", "hunter2", now).await.unwrap();
        f.sessions
            .revoke(&first.access.token, &first.refresh.token, now)
            .await
            .unwrap();

        let outcome = f
            .sessions
            .revoke(&first.access.token, &second.refresh.token, now)
            .await
            .unwrap();
        assert_eq!(outcome, RevokeOutcome::AlreadyRevoked);
        assert!(!f
            .store
            .is_blacklisted(BlacklistColumn::RefreshToken, second.refresh.jti())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn revoke_requires_matching_kinds_and_subjects() {
        let f = fixture();
        let now = Utc::now();
        let mine = f.sessions.login("alice", "hunter2", now).await.unwrap();

        let bob_hash = Argon2Passwords::new().hash("pw").unwrap();
        f.store.create_user("bob", &bob_hash, Attributes::new()).unwrap();
        let theirs = f.sessions.login("bob", "pw", now).await.unwrap();

        assert_eq!(
            f.sessions.revoke(&mine.access.token, &theirs.refresh.token, now).await.unwrap_err(),
            AuthError::InvalidToken
        );
        assert_eq!(
            f.sessions.revoke(&mine.refresh.token, &mine.access.token, now).await.unwrap_err(),
            AuthError::InvalidToken
        );
    }

    #[tokio::test]
    async fn personal_token_lifecycle() {
        let f = fixture();
        let now = Utc::now();
        let subject = Subject::new(f.user.clone());

        let created = f
            .sessions
            .create_personal_token(&subject, " deploy bot ", vec!["deploy".into()], now)
            .await
            .unwrap();
        assert_eq!(created.record.description, "deploy bot");
        assert_eq!(created.record.token_id, created.token.jti());

        let auth = f
            .sessions
            .authenticate(&created.token.token, TokenKind::Personal, now)
            .await
            .unwrap();
        assert_eq!(auth.claims().scopes(), ["deploy".to_string()]);

        let listed = f.sessions.list_personal_tokens(f.user.id).await.unwrap();
        assert_eq!(listed, vec![created.record.clone()]);

        assert!(!f.sessions.delete_personal_token(UserId::new(99), created.record.id).await.unwrap());
        assert!(f.sessions.delete_personal_token(f.user.id, created.record.id).await.unwrap());
        assert_eq!(
            f.sessions
                .authenticate(&created.token.token, TokenKind::Personal, now)
                .await
                .unwrap_err(),
            AuthError::InvalidToken
        );
    }

    #[tokio::test]
    async fn personal_token_needs_a_description() {
        let f = fixture();
        let subject = Subject::new(f.user.clone());
        let err = f
            .sessions
            .create_personal_token(&subject, "  ", vec![], Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidArgument(_)));
    }
}
