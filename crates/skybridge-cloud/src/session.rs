//! Remote identity sessions and the tenant context they are negotiated from

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{CloudError, Result};

/// Remote control-plane services reachable through a session's catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Identity,
    Compute,
    Volume,
    Image,
}

impl ServiceType {
    /// Parse a service-catalog `type` field
    pub fn from_catalog(kind: &str) -> Option<Self> {
        match kind {
            "identity" => Some(ServiceType::Identity),
            "compute" => Some(ServiceType::Compute),
            "volume" | "volumev2" | "volumev3" | "block-storage" => Some(ServiceType::Volume),
            "image" => Some(ServiceType::Image),
            _ => None,
        }
    }
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceType::Identity => write!(f, "identity"),
            ServiceType::Compute => write!(f, "compute"),
            ServiceType::Volume => write!(f, "volume"),
            ServiceType::Image => write!(f, "image"),
        }
    }
}

/// Negotiated remote session for a single tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token
    pub token: String,

    /// Token expiry
    pub expires_at: DateTime<Utc>,

    /// Project the token is scoped to
    pub project_id: String,

    /// User the token was issued to
    pub user_id: Option<String>,

    /// Catalog endpoints by service
    pub endpoints: HashMap<ServiceType, String>,

    /// Delegation trust the token is scoped to
    pub trust_id: Option<String>,

    /// Trustor being impersonated through the trust
    pub impersonated_user_id: Option<String>,
}

impl Session {
    /// Endpoint for a service, without trailing slash
    pub fn endpoint(&self, service: ServiceType) -> Result<&str> {
        self.endpoints
            .get(&service)
            .map(|url| url.trim_end_matches('/'))
            .ok_or_else(|| {
                CloudError::InvalidConfig(format!(
                    "no {} endpoint in service catalog for project {}",
                    service, self.project_id
                ))
            })
    }

    /// Whether the token is still usable `margin` from now
    pub fn is_valid(&self, margin: Duration) -> bool {
        self.expires_at - margin > Utc::now()
    }

    pub fn is_trust_scoped(&self) -> bool {
        self.trust_id.is_some()
    }
}

/// Credential material used to authenticate
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Password { username: String, password: String },
    Token(String),
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Credential::Token(_) => f.debug_tuple("Token").field(&"***").finish(),
        }
    }
}

/// Scope requested from the v3 identity flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelegatedScope {
    Project(String),
    Trust(String),
}

/// Identity protocol capability, chosen per call
///
/// `BasicAuth` is the legacy v2 flow (tenant tokens, user management);
/// `DelegatedAuth` is the v3 flow required for anything touching trusts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentitySession {
    BasicAuth {
        credential: Credential,
        project_id: String,
    },
    DelegatedAuth {
        credential: Credential,
        scope: DelegatedScope,
    },
}

impl IdentitySession {
    pub fn protocol(&self) -> &'static str {
        match self {
            IdentitySession::BasicAuth { .. } => "v2",
            IdentitySession::DelegatedAuth { .. } => "v3",
        }
    }
}

/// Tenant context carried by each orchestration request
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct TenantContext {
    pub project_id: String,

    #[serde(default)]
    pub user_id: Option<String>,

    /// Existing bearer token; replaced by the impersonation token after a
    /// trust re-scope
    #[serde(default)]
    pub auth_token: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Delegation trust to impersonate through
    #[serde(default)]
    pub trust_id: Option<String>,
}

impl TenantContext {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            ..Default::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_password(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_trust(mut self, trust_id: impl Into<String>) -> Self {
        self.trust_id = Some(trust_id.into());
        self
    }

    /// User credential in resolution order: bearer token, then password
    pub fn credential(&self) -> Option<Credential> {
        if let Some(token) = &self.auth_token {
            return Some(Credential::Token(token.clone()));
        }
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some(Credential::Password {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }
}

impl std::fmt::Debug for TenantContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantContext")
            .field("project_id", &self.project_id)
            .field("user_id", &self.user_id)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "***"))
            .field("username", &self.username)
            .field("trust_id", &self.trust_id)
            .finish()
    }
}
