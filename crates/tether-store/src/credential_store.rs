//! Async `CredentialStore` over `SQLite`.

use async_trait::async_trait;
use tether_core::{Account, CredentialError, CredentialStore, Identity};

use crate::accounts::AccountRepo;
use crate::database::Database;
use crate::error::StoreError;

/// Runs [`AccountRepo`] lookups on the blocking pool so the event loop
/// never waits on `SQLite`.
#[derive(Clone)]
pub struct SqliteCredentialStore {
    repo: AccountRepo,
}

impl SqliteCredentialStore {
    /// Wrap an open database.
    pub fn new(db: Database) -> Self {
        Self {
            repo: AccountRepo::new(db),
        }
    }

    /// The underlying repository, for admin operations.
    pub fn repo(&self) -> &AccountRepo {
        &self.repo
    }

    async fn run<F, T>(&self, f: F) -> Result<T, CredentialError>
    where
        F: FnOnce(AccountRepo) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let repo = self.repo.clone();
        tokio::task::spawn_blocking(move || f(repo))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
            .map_err(CredentialError::from)
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn find_by_credentials(
        &self,
        identity: &Identity,
        secret: &str,
    ) -> Result<Option<Account>, CredentialError> {
        let identity = identity.clone();
        let secret = secret.to_owned();
        self.run(move |repo| repo.find_by_credentials(&identity, &secret))
            .await
    }

    async fn find_by_identity(&self, identity: &Identity) -> Result<Option<Account>, CredentialError> {
        let identity = identity.clone();
        self.run(move |repo| repo.find_by_identity(&identity)).await
    }
}
