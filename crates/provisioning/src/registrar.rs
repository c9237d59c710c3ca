//! Owner identity registration against the external identity provider.

use common::{TenantId, UserId};
use domain::Slug;

use crate::error::{ProvisioningError, Result};
use crate::services::{Attributes, IdentityProvider, LoginToken, NewIdentity};

/// Realm role granted to every tenant owner.
pub const OWNER_REALM_ROLE: &str = "tenant_owner";

/// Attribute listing the tenants an account owns.
pub const TENANT_ID_ATTRIBUTE: &str = "tenant_id";

/// Attribute listing the slugs of the tenants an account owns.
pub const TENANT_SLUG_ATTRIBUTE: &str = "tenant_slug";

/// Input for [`IdentityRegistrar::register_or_link_owner`].
#[derive(Clone)]
pub struct OwnerRegistration {
    pub email: String,
    /// Required to create a new account; verified when linking an existing one.
    pub password: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub tenant_id: TenantId,
    pub tenant_slug: Slug,
}

impl std::fmt::Debug for OwnerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnerRegistration")
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("tenant_id", &self.tenant_id)
            .field("tenant_slug", &self.tenant_slug)
            .finish()
    }
}

/// Result of registering or linking an owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationOutcome {
    /// The provider-issued id, canonical for all local records.
    pub user_id: UserId,
    /// True if the account was created by this call.
    pub created: bool,
    /// True if the account already listed this tenant.
    pub already_linked: bool,
}

/// Creates or links tenant owners in the identity provider.
pub struct IdentityRegistrar<I> {
    identity: I,
}

impl<I> IdentityRegistrar<I>
where
    I: IdentityProvider,
{
    /// Creates a new identity registrar.
    pub fn new(identity: I) -> Self {
        Self { identity }
    }

    /// Returns the underlying identity provider.
    pub fn provider(&self) -> &I {
        &self.identity
    }

    /// Ensures an account for `registration.email` exists and lists the tenant.
    ///
    /// An absent account is created with the password and the tenant
    /// attributes. An existing account has its password verified (when one is
    /// supplied) and the tenant appended to its attribute lists unless already
    /// present. Every error is fatal to the caller; nothing is retried.
    #[tracing::instrument(
        skip(self, registration),
        fields(email = %registration.email, tenant_id = %registration.tenant_id)
    )]
    pub async fn register_or_link_owner(
        &self,
        registration: &OwnerRegistration,
    ) -> Result<RegistrationOutcome> {
        let email = registration.email.trim().to_lowercase();

        let outcome = match self.identity.get_user_by_email(&email).await? {
            None => {
                let Some(password) = registration.password.as_deref() else {
                    return Err(ProvisioningError::Identity(format!(
                        "no account for {email} and no password to create one"
                    )));
                };

                let mut attributes = Attributes::new();
                append_tenant(&mut attributes, registration.tenant_id, &registration.tenant_slug);

                let user_id = self
                    .identity
                    .create_user(NewIdentity {
                        email: email.clone(),
                        first_name: registration.first_name.clone(),
                        last_name: registration.last_name.clone(),
                        attributes,
                    })
                    .await?;
                self.identity.set_password(user_id, password).await?;

                tracing::info!(user_id = %user_id, "Owner account created");
                RegistrationOutcome {
                    user_id,
                    created: true,
                    already_linked: false,
                }
            }
            Some(existing) => {
                if let Some(password) = registration.password.as_deref() {
                    if !self.identity.verify_password(existing.id, password).await? {
                        return Err(ProvisioningError::InvalidCredentials);
                    }
                }

                let mut attributes = existing.attributes.clone();
                let appended =
                    append_tenant(&mut attributes, registration.tenant_id, &registration.tenant_slug);
                if appended {
                    self.identity
                        .update_attributes(existing.id, attributes)
                        .await?;
                    tracing::info!(user_id = %existing.id, "Tenant linked to existing owner account");
                }

                RegistrationOutcome {
                    user_id: existing.id,
                    created: false,
                    already_linked: !appended,
                }
            }
        };

        self.identity
            .assign_role(outcome.user_id, OWNER_REALM_ROLE)
            .await?;

        Ok(outcome)
    }

    /// Issues a login token for the owner, scoped to the tenant.
    #[tracing::instrument(skip(self))]
    pub async fn issue_login_token(
        &self,
        user_id: UserId,
        tenant_id: TenantId,
    ) -> Result<LoginToken> {
        self.identity.issue_token(user_id, tenant_id).await
    }
}

/// Appends the tenant to the multi-valued attributes. Returns false if the
/// tenant id was already listed.
fn append_tenant(attributes: &mut Attributes, tenant_id: TenantId, slug: &Slug) -> bool {
    let tenant_id = tenant_id.to_string();
    let ids = attributes
        .entry(TENANT_ID_ATTRIBUTE.to_string())
        .or_default();
    if ids.contains(&tenant_id) {
        return false;
    }
    ids.push(tenant_id);
    attributes
        .entry(TENANT_SLUG_ATTRIBUTE.to_string())
        .or_default()
        .push(slug.to_string());
    true
}
