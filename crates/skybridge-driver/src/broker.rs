//! Credential broker
//!
//! Negotiates remote sessions on behalf of tenants and caches one session
//! per project id. Also hosts the administrative identity operations used to
//! provision a least-privilege remote identity for a tenant.

use chrono::Duration;
use skybridge_cloud::service::optional;
use skybridge_cloud::{
    CloudError, Credential, DelegatedScope, IdentityService, IdentitySession, Result, RetryConfig,
    ServiceUserRequest, Session, TenantContext, TrustRequest, retry_transient,
};
use skybridge_config::IdentityConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Fixed service principal the bridge authenticates as
#[derive(Clone, PartialEq)]
pub struct ServiceIdentity {
    pub username: String,
    pub password: String,
    pub project_id: String,
}

impl ServiceIdentity {
    fn credential(&self) -> Credential {
        Credential::Password {
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

impl std::fmt::Debug for ServiceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceIdentity")
            .field("username", &self.username)
            .field("project_id", &self.project_id)
            .finish()
    }
}

/// Cached tenant session and the identity request that produced it
struct CachedSession {
    request: IdentitySession,
    session: Session,
}

pub struct CredentialBroker {
    identity: Arc<dyn IdentityService>,
    service: Option<ServiceIdentity>,
    expiry_margin: Duration,
    delete_retry: RetryConfig,

    /// Tenant sessions by project id
    sessions: RwLock<HashMap<String, CachedSession>>,

    /// Service-identity session for user administration
    service_session: RwLock<Option<Session>>,
}

impl CredentialBroker {
    pub fn new(identity: Arc<dyn IdentityService>) -> Self {
        Self {
            identity,
            service: None,
            expiry_margin: Duration::seconds(60),
            delete_retry: RetryConfig::default(),
            sessions: RwLock::new(HashMap::new()),
            service_session: RwLock::new(None),
        }
    }

    /// Broker configured from the identity section
    pub fn from_config(
        identity: Arc<dyn IdentityService>,
        config: &IdentityConfig,
        delete_retry: RetryConfig,
    ) -> Self {
        let service = match (
            &config.service_user,
            &config.service_password,
            &config.service_project,
        ) {
            (Some(username), Some(password), Some(project_id)) => Some(ServiceIdentity {
                username: username.clone(),
                password: password.clone(),
                project_id: project_id.clone(),
            }),
            _ => None,
        };

        let broker = Self::new(identity)
            .with_expiry_margin(Duration::seconds(
                i64::try_from(config.token_expiry_margin_secs).unwrap_or(i64::MAX),
            ))
            .with_delete_retry(delete_retry);

        match service {
            Some(service) => broker.with_service_identity(service),
            None => broker,
        }
    }

    pub fn with_service_identity(mut self, service: ServiceIdentity) -> Self {
        self.service = Some(service);
        self
    }

    pub fn with_expiry_margin(mut self, margin: Duration) -> Self {
        self.expiry_margin = margin;
        self
    }

    pub fn with_delete_retry(mut self, retry: RetryConfig) -> Self {
        self.delete_retry = retry;
        self
    }

    fn service_identity(&self) -> Result<&ServiceIdentity> {
        self.service
            .as_ref()
            .ok_or_else(|| CloudError::Authorization("no service identity configured".into()))
    }

    /// Identity request for a tenant, in resolution order: delegation
    /// trust, bearer token, username/password
    fn session_request(&self, ctx: &TenantContext) -> Result<IdentitySession> {
        if let Some(trust_id) = &ctx.trust_id {
            return Ok(IdentitySession::DelegatedAuth {
                credential: self.service_identity()?.credential(),
                scope: DelegatedScope::Trust(trust_id.clone()),
            });
        }

        let credential = ctx.credential().ok_or_else(|| {
            CloudError::Authorization(format!(
                "no credentials supplied for project {}",
                ctx.project_id
            ))
        })?;

        Ok(IdentitySession::BasicAuth {
            credential,
            project_id: ctx.project_id.clone(),
        })
    }

    /// Session for the tenant's project
    ///
    /// A cached session is only reused for the same credentials it was
    /// negotiated with. After a trust re-scope the impersonation token is written back into
    /// `ctx.auth_token`.
    pub async fn get_session(&self, ctx: &mut TenantContext) -> Result<Session> {
        let request = self.session_request(ctx)?;
        let delegated = ctx.trust_id.is_some();

        let cached = {
            let sessions = self.sessions.read().await;
            sessions
                .get(&ctx.project_id)
                .filter(|c| c.request == request)
                .map(|c| &c.session)
                .filter(|s| s.is_valid(self.expiry_margin))
                .filter(|s| s.trust_id == ctx.trust_id)
                .cloned()
        };
        if let Some(session) = cached {
            if delegated {
                ctx.auth_token = Some(session.token.clone());
            }
            return Ok(session);
        }

        tracing::debug!(
            project = %ctx.project_id,
            protocol = request.protocol(),
            "Negotiating session"
        );
        let session = self.identity.authenticate(&request).await?;

        if delegated {
            if !session.is_trust_scoped() {
                return Err(CloudError::Authorization(format!(
                    "re-scope for project {} did not yield a trust-scoped token",
                    ctx.project_id
                )));
            }
            ctx.auth_token = Some(session.token.clone());
        }

        self.sessions.write().await.insert(
            ctx.project_id.clone(),
            CachedSession {
                request,
                session: session.clone(),
            },
        );
        Ok(session)
    }

    /// Drop the cached session of a project
    pub async fn invalidate(&self, project_id: &str) {
        if self.sessions.write().await.remove(project_id).is_some() {
            tracing::debug!(project = %project_id, "Session invalidated");
        }
    }

    async fn service_session(&self) -> Result<Session> {
        if let Some(session) = self
            .service_session
            .read()
            .await
            .as_ref()
            .filter(|s| s.is_valid(self.expiry_margin))
        {
            return Ok(session.clone());
        }

        let service = self.service_identity()?;
        let session = self
            .identity
            .authenticate(&IdentitySession::BasicAuth {
                credential: service.credential(),
                project_id: service.project_id.clone(),
            })
            .await?;

        *self.service_session.write().await = Some(session.clone());
        Ok(session)
    }

    /// v3 session of the tenant's own user, scoped to its project
    async fn trustor_session(&self, ctx: &TenantContext) -> Result<Session> {
        let credential = ctx.credential().ok_or_else(|| {
            CloudError::Authorization(format!(
                "no trustor credentials supplied for project {}",
                ctx.project_id
            ))
        })?;

        self.identity
            .authenticate(&IdentitySession::DelegatedAuth {
                credential,
                scope: DelegatedScope::Project(ctx.project_id.clone()),
            })
            .await
    }

    /// Create an impersonating trust from the tenant's user to `trustee_user_id`
    pub async fn create_delegation_trust(
        &self,
        ctx: &TenantContext,
        trustee_user_id: &str,
        roles: &[String],
    ) -> Result<String> {
        let session = self.trustor_session(ctx).await?;
        let trustor_user_id = ctx
            .user_id
            .clone()
            .or_else(|| session.user_id.clone())
            .ok_or_else(|| {
                CloudError::Authorization("trustor user id could not be determined".into())
            })?;

        let trust_id = self
            .identity
            .create_trust(
                &session,
                &TrustRequest {
                    trustor_user_id,
                    trustee_user_id: trustee_user_id.to_string(),
                    project_id: ctx.project_id.clone(),
                    roles: roles.to_vec(),
                    impersonation: true,
                },
            )
            .await?;

        tracing::info!(project = %ctx.project_id, trust = %trust_id, "Delegation trust created");
        Ok(trust_id)
    }

    /// Delete a trust; an already-missing trust counts as deleted
    pub async fn delete_delegation_trust(&self, ctx: &TenantContext, trust_id: &str) -> Result<()> {
        let session = self.trustor_session(ctx).await?;
        match optional(self.identity.delete_trust(&session, trust_id).await)? {
            Some(()) => tracing::info!(trust = %trust_id, "Delegation trust deleted"),
            None => tracing::debug!(trust = %trust_id, "Delegation trust already gone"),
        }
        Ok(())
    }

    /// Create a least-privilege remote user for a tenant project
    pub async fn create_service_user(
        &self,
        project_id: &str,
        name: &str,
        password: &str,
    ) -> Result<String> {
        let session = self.service_session().await?;
        let user_id = self
            .identity
            .create_user(
                &session,
                &ServiceUserRequest {
                    name: name.to_string(),
                    password: password.to_string(),
                    project_id: project_id.to_string(),
                    email: None,
                },
            )
            .await?;

        tracing::info!(project = %project_id, user = %user_id, "Service user created");
        Ok(user_id)
    }

    /// Delete a service user, retrying transient rejections
    ///
    /// NotFound counts as success. Exhausting the retry budget yields
    /// [`CloudError::TransientRemoteFailure`].
    pub async fn delete_service_user(&self, user_id: &str) -> Result<()> {
        let session = self.service_session().await?;
        let identity = &self.identity;
        let session = &session;

        retry_transient(&self.delete_retry, "delete service user", move || async move {
            optional(identity.delete_user(session, user_id).await).map(|_| ())
        })
        .await?;

        tracing::info!(user = %user_id, "Service user deleted");
        Ok(())
    }
}
