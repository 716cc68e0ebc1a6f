//! In-memory account store (non-persistent).

use super::{now_string, password, Account, AccountStore, AccountStoreError, NewAccount};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct InMemoryAccountStore {
    accounts: Arc<RwLock<HashMap<String, Account>>>,
    attempts: Arc<RwLock<Vec<NewAccount>>>,
    profile_fields: HashSet<String>,
    exists_error: Option<AccountStoreError>,
    create_error: Option<AccountStoreError>,
    latency: Option<Duration>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept these profile fields on creation; others are `UnknownField`.
    pub fn with_profile_fields(mut self, fields: &[&str]) -> Self {
        self.profile_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Fail every existence check with `error`.
    pub fn failing_exists(mut self, error: AccountStoreError) -> Self {
        self.exists_error = Some(error);
        self
    }

    /// Fail every creation attempt with `error`.
    pub fn failing_creates(mut self, error: AccountStoreError) -> Self {
        self.create_error = Some(error);
        self
    }

    /// Delay every call, to exercise caller timeouts.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Every field set passed to `create_admin`, in order.
    pub async fn attempts(&self) -> Vec<NewAccount> {
        self.attempts.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.accounts.read().await.is_empty()
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    fn is_persistent(&self) -> bool {
        false
    }

    async fn exists(&self, username: &str) -> Result<bool, AccountStoreError> {
        self.simulate_latency().await;
        if let Some(error) = &self.exists_error {
            return Err(error.clone());
        }
        Ok(self.accounts.read().await.contains_key(username))
    }

    async fn get_account(&self, username: &str) -> Result<Option<Account>, AccountStoreError> {
        Ok(self.accounts.read().await.get(username).cloned())
    }

    async fn create_admin(&self, account: &NewAccount) -> Result<(), AccountStoreError> {
        self.attempts.write().await.push(account.clone());
        self.simulate_latency().await;

        if let Some(error) = &self.create_error {
            return Err(error.clone());
        }
        account.validate()?;
        if let Some((name, _)) = account
            .profile
            .iter()
            .find(|(name, _)| !self.profile_fields.contains(name))
        {
            return Err(AccountStoreError::UnknownField(name.clone()));
        }

        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&account.username) {
            return Err(AccountStoreError::AlreadyExists(account.username.clone()));
        }
        accounts.insert(
            account.username.clone(),
            Account {
                username: account.username.clone(),
                email: account.email.trim().to_string(),
                password_hash: password::hash_password(&account.password),
                is_superuser: true,
                is_staff: true,
                profile: account.profile.iter().cloned().collect::<BTreeMap<_, _>>(),
                created_at: now_string(),
            },
        );
        Ok(())
    }
}
