//! Identity provider trait and in-memory implementation.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{TenantId, UserId};
use serde::Serialize;

use crate::error::ProvisioningError;

/// Multi-valued account attributes.
pub type Attributes = BTreeMap<String, Vec<String>>;

/// An account as stored by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityUser {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub attributes: Attributes,
}

/// Data for a new identity provider account.
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub attributes: Attributes,
}

/// A short-lived token the owner uses to enter the new tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginToken {
    pub access_token: String,
    /// Lifetime in seconds.
    pub expires_in: u64,
}

/// External identity provider. The source of truth for user ids.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Creates an account and returns the provider-issued id.
    async fn create_user(&self, user: NewIdentity) -> Result<UserId, ProvisioningError>;

    /// Sets the account's password credential.
    async fn set_password(&self, user_id: UserId, password: &str)
    -> Result<(), ProvisioningError>;

    /// Looks an account up by email.
    async fn get_user_by_email(&self, email: &str)
    -> Result<Option<IdentityUser>, ProvisioningError>;

    /// Replaces the account's attributes.
    async fn update_attributes(
        &self,
        user_id: UserId,
        attributes: Attributes,
    ) -> Result<(), ProvisioningError>;

    /// Assigns a realm role. Assigning a role twice is a no-op.
    async fn assign_role(&self, user_id: UserId, role: &str) -> Result<(), ProvisioningError>;

    /// Checks a password against the account's credential.
    async fn verify_password(
        &self,
        user_id: UserId,
        password: &str,
    ) -> Result<bool, ProvisioningError>;

    /// Issues a login token scoped to a tenant.
    async fn issue_token(
        &self,
        user_id: UserId,
        tenant_id: TenantId,
    ) -> Result<LoginToken, ProvisioningError>;
}

#[derive(Debug, Clone)]
struct StoredAccount {
    user: IdentityUser,
    password: Option<String>,
    roles: Vec<String>,
}

#[derive(Debug, Default)]
struct InMemoryIdentityState {
    accounts: HashMap<UserId, StoredAccount>,
    tokens_issued: u32,
    create_calls: u32,
    fail_on_create: bool,
    fail_on_lookup: bool,
    fail_on_token: bool,
}

/// In-memory identity provider for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIdentityProvider {
    state: Arc<RwLock<InMemoryIdentityState>>,
}

impl InMemoryIdentityProvider {
    /// Creates a new in-memory identity provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures account creation to fail.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create = fail;
    }

    /// Configures email lookups to fail.
    pub fn set_fail_on_lookup(&self, fail: bool) {
        self.state.write().unwrap().fail_on_lookup = fail;
    }

    /// Configures token issuance to fail.
    pub fn set_fail_on_token(&self, fail: bool) {
        self.state.write().unwrap().fail_on_token = fail;
    }

    /// Seeds an existing account.
    pub fn insert_account(&self, user: IdentityUser, password: Option<&str>) {
        self.state.write().unwrap().accounts.insert(
            user.id,
            StoredAccount {
                user,
                password: password.map(str::to_string),
                roles: Vec::new(),
            },
        );
    }

    /// Returns the number of accounts.
    pub fn account_count(&self) -> usize {
        self.state.read().unwrap().accounts.len()
    }

    /// Returns how many times `create_user` succeeded.
    pub fn create_calls(&self) -> u32 {
        self.state.read().unwrap().create_calls
    }

    /// Returns how many login tokens were issued.
    pub fn tokens_issued(&self) -> u32 {
        self.state.read().unwrap().tokens_issued
    }

    /// Returns an account by id.
    pub fn account(&self, user_id: UserId) -> Option<IdentityUser> {
        self.state
            .read()
            .unwrap()
            .accounts
            .get(&user_id)
            .map(|a| a.user.clone())
    }

    /// Returns the realm roles assigned to an account.
    pub fn roles(&self, user_id: UserId) -> Vec<String> {
        self.state
            .read()
            .unwrap()
            .accounts
            .get(&user_id)
            .map(|a| a.roles.clone())
            .unwrap_or_default()
    }
}

fn no_account(user_id: UserId) -> ProvisioningError {
    ProvisioningError::Identity(format!("account {user_id} does not exist"))
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn create_user(&self, user: NewIdentity) -> Result<UserId, ProvisioningError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_create {
            return Err(ProvisioningError::Identity(
                "identity provider rejected account creation".to_string(),
            ));
        }
        if state.accounts.values().any(|a| a.user.email == user.email) {
            return Err(ProvisioningError::Identity(format!(
                "account {} already exists",
                user.email
            )));
        }

        let id = UserId::new();
        state.accounts.insert(
            id,
            StoredAccount {
                user: IdentityUser {
                    id,
                    email: user.email,
                    first_name: user.first_name,
                    last_name: user.last_name,
                    attributes: user.attributes,
                },
                password: None,
                roles: Vec::new(),
            },
        );
        state.create_calls += 1;
        Ok(id)
    }

    async fn set_password(
        &self,
        user_id: UserId,
        password: &str,
    ) -> Result<(), ProvisioningError> {
        let mut state = self.state.write().unwrap();
        let account = state
            .accounts
            .get_mut(&user_id)
            .ok_or_else(|| no_account(user_id))?;
        account.password = Some(password.to_string());
        Ok(())
    }

    async fn get_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<IdentityUser>, ProvisioningError> {
        let state = self.state.read().unwrap();

        if state.fail_on_lookup {
            return Err(ProvisioningError::Identity(
                "identity provider lookup failed".to_string(),
            ));
        }

        Ok(state
            .accounts
            .values()
            .find(|a| a.user.email == email)
            .map(|a| a.user.clone()))
    }

    async fn update_attributes(
        &self,
        user_id: UserId,
        attributes: Attributes,
    ) -> Result<(), ProvisioningError> {
        let mut state = self.state.write().unwrap();
        let account = state
            .accounts
            .get_mut(&user_id)
            .ok_or_else(|| no_account(user_id))?;
        account.user.attributes = attributes;
        Ok(())
    }

    async fn assign_role(&self, user_id: UserId, role: &str) -> Result<(), ProvisioningError> {
        let mut state = self.state.write().unwrap();
        let account = state
            .accounts
            .get_mut(&user_id)
            .ok_or_else(|| no_account(user_id))?;
        if !account.roles.iter().any(|r| r == role) {
            account.roles.push(role.to_string());
        }
        Ok(())
    }

    async fn verify_password(
        &self,
        user_id: UserId,
        password: &str,
    ) -> Result<bool, ProvisioningError> {
        let state = self.state.read().unwrap();
        let account = state.accounts.get(&user_id).ok_or_else(|| no_account(user_id))?;
        Ok(account.password.as_deref() == Some(password))
    }

    async fn issue_token(
        &self,
        user_id: UserId,
        tenant_id: TenantId,
    ) -> Result<LoginToken, ProvisioningError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_token {
            return Err(ProvisioningError::Identity("token endpoint failed".to_string()));
        }
        if !state.accounts.contains_key(&user_id) {
            return Err(no_account(user_id));
        }

        state.tokens_issued += 1;
        Ok(LoginToken {
            access_token: format!("tok-{tenant_id}-{user_id}-{:04}", state.tokens_issued),
            expires_in: 3600,
        })
    }
}
