//! Identity adapter (v2 + v3 token flows, trusts, users)
//!
//! v2 is used for tenant tokens and user management, v3 for anything that
//! involves delegation trusts. The request variant picks the protocol.

use crate::http::{ApiClient, Subject};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};
use skybridge_cloud::{
    CloudError, Credential, DelegatedScope, IdentityService, IdentitySession, Result, ServiceType,
    ServiceUserRequest, Session, TrustRequest,
};
use std::collections::HashMap;

const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

/// Identity endpoints of the provider cloud
#[derive(Debug, Clone)]
pub struct IdentityEndpoints {
    /// e.g. `https://keystone.example.com:5000/v2.0`
    pub v2_url: String,

    /// e.g. `https://keystone.example.com:5000/v3`
    pub v3_url: String,

    /// Domain for v3 password authentication
    pub user_domain: String,
}

impl IdentityEndpoints {
    pub fn new(v2_url: impl Into<String>, v3_url: impl Into<String>) -> Self {
        Self {
            v2_url: v2_url.into().trim_end_matches('/').to_string(),
            v3_url: v3_url.into().trim_end_matches('/').to_string(),
            user_domain: "default".to_string(),
        }
    }
}

/// Identity service client
pub struct IdentityClient {
    api: ApiClient,
    endpoints: IdentityEndpoints,
}

impl IdentityClient {
    pub fn new(api: ApiClient, endpoints: IdentityEndpoints) -> Self {
        Self { api, endpoints }
    }

    async fn authenticate_v2(&self, credential: &Credential, project_id: &str) -> Result<Session> {
        let auth = match credential {
            Credential::Password { username, password } => json!({
                "passwordCredentials": { "username": username, "password": password },
                "tenantId": project_id,
            }),
            Credential::Token(token) => json!({
                "token": { "id": token },
                "tenantId": project_id,
            }),
        };

        let url = format!("{}/tokens", self.endpoints.v2_url);
        let reply = self
            .api
            .execute(
                self.api
                    .request(Method::POST, &url)
                    .json(&json!({ "auth": auth })),
                None,
                Subject::new("token", project_id),
            )
            .await?;

        let response: V2TokenResponse = reply.json()?;
        let access = response.access;

        Ok(Session {
            token: access.token.id,
            expires_at: parse_expiry(&access.token.expires)?,
            project_id: access
                .token
                .tenant
                .map(|t| t.id)
                .unwrap_or_else(|| project_id.to_string()),
            user_id: access.user.map(|u| u.id),
            endpoints: catalog_v2(&access.service_catalog),
            trust_id: None,
            impersonated_user_id: None,
        })
    }

    async fn authenticate_v3(&self, credential: &Credential, scope: &DelegatedScope) -> Result<Session> {
        let identity = match credential {
            Credential::Password { username, password } => json!({
                "methods": ["password"],
                "password": {
                    "user": {
                        "name": username,
                        "password": password,
                        "domain": { "id": self.endpoints.user_domain },
                    }
                },
            }),
            Credential::Token(token) => json!({
                "methods": ["token"],
                "token": { "id": token },
            }),
        };

        let (scope_body, subject_id) = match scope {
            DelegatedScope::Project(project_id) => {
                (json!({ "project": { "id": project_id } }), project_id.as_str())
            }
            DelegatedScope::Trust(trust_id) => {
                (json!({ "OS-TRUST:trust": { "id": trust_id } }), trust_id.as_str())
            }
        };

        let url = format!("{}/auth/tokens", self.endpoints.v3_url);
        let reply = self
            .api
            .execute(
                self.api.request(Method::POST, &url).json(&json!({
                    "auth": { "identity": identity, "scope": scope_body }
                })),
                None,
                Subject::new("token", subject_id),
            )
            .await?;

        let token_id = reply
            .header(SUBJECT_TOKEN_HEADER)
            .map(|t| t.to_string())
            .ok_or_else(|| {
                CloudError::Authorization("identity response carried no subject token".into())
            })?;
        let response: V3TokenResponse = reply.json()?;
        let token = response.token;

        let project_id = match (&token.project, scope) {
            (Some(project), _) => project.id.clone(),
            (None, DelegatedScope::Project(project_id)) => project_id.clone(),
            (None, DelegatedScope::Trust(_)) => String::new(),
        };

        Ok(Session {
            token: token_id,
            expires_at: parse_expiry(&token.expires_at)?,
            project_id,
            user_id: token.user.map(|u| u.id),
            endpoints: catalog_v3(&token.catalog),
            impersonated_user_id: token
                .trust
                .as_ref()
                .and_then(|t| t.trustor_user.as_ref())
                .map(|u| u.id.clone()),
            trust_id: token.trust.map(|t| t.id),
        })
    }
}

#[async_trait]
impl IdentityService for IdentityClient {
    async fn authenticate(&self, request: &IdentitySession) -> Result<Session> {
        tracing::debug!("Authenticating over identity {}", request.protocol());
        match request {
            IdentitySession::BasicAuth {
                credential,
                project_id,
            } => self.authenticate_v2(credential, project_id).await,
            IdentitySession::DelegatedAuth { credential, scope } => {
                self.authenticate_v3(credential, scope).await
            }
        }
    }

    async fn create_trust(&self, session: &Session, trust: &TrustRequest) -> Result<String> {
        let url = format!("{}/OS-TRUST/trusts", self.endpoints.v3_url);
        let roles: Vec<Value> = trust.roles.iter().map(|r| json!({ "name": r })).collect();
        let body = json!({
            "trust": {
                "trustor_user_id": trust.trustor_user_id,
                "trustee_user_id": trust.trustee_user_id,
                "project_id": trust.project_id,
                "impersonation": trust.impersonation,
                "roles": roles,
            }
        });

        let reply = self
            .api
            .execute(
                self.api.request(Method::POST, &url).json(&body),
                Some(&session.token),
                Subject::new("trust", &trust.trustee_user_id),
            )
            .await?;

        let response: TrustEnvelope = reply.json()?;
        tracing::info!(
            "Created trust {} ({} -> {})",
            response.trust.id,
            trust.trustor_user_id,
            trust.trustee_user_id
        );
        Ok(response.trust.id)
    }

    async fn delete_trust(&self, session: &Session, trust_id: &str) -> Result<()> {
        let url = format!("{}/OS-TRUST/trusts/{}", self.endpoints.v3_url, trust_id);
        self.api
            .execute(
                self.api.request(Method::DELETE, &url),
                Some(&session.token),
                Subject::new("trust", trust_id),
            )
            .await?;
        Ok(())
    }

    async fn create_user(&self, session: &Session, user: &ServiceUserRequest) -> Result<String> {
        let url = format!("{}/users", self.endpoints.v2_url);
        let body = json!({
            "user": {
                "name": user.name,
                "password": user.password,
                "tenantId": user.project_id,
                "email": user.email,
                "enabled": true,
            }
        });

        let reply = self
            .api
            .execute(
                self.api.request(Method::POST, &url).json(&body),
                Some(&session.token),
                Subject::new("user", &user.name),
            )
            .await?;

        let response: UserEnvelope = reply.json()?;
        Ok(response.user.id)
    }

    async fn delete_user(&self, session: &Session, user_id: &str) -> Result<()> {
        let url = format!("{}/users/{}", self.endpoints.v2_url, user_id);
        self.api
            .execute(
                self.api.request(Method::DELETE, &url),
                Some(&session.token),
                Subject::new("user", user_id),
            )
            .await?;
        Ok(())
    }
}

fn parse_expiry(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CloudError::Authorization(format!("unparseable token expiry '{}': {}", raw, e)))
}

fn catalog_v2(catalog: &[V2CatalogEntry]) -> HashMap<ServiceType, String> {
    catalog
        .iter()
        .filter_map(|entry| {
            let service = ServiceType::from_catalog(&entry.r#type)?;
            let url = entry.endpoints.first()?.public_url.clone();
            Some((service, url))
        })
        .collect()
}

fn catalog_v3(catalog: &[V3CatalogEntry]) -> HashMap<ServiceType, String> {
    catalog
        .iter()
        .filter_map(|entry| {
            let service = ServiceType::from_catalog(&entry.r#type)?;
            let url = entry
                .endpoints
                .iter()
                .find(|e| e.interface == "public")
                .or_else(|| entry.endpoints.first())?
                .url
                .clone();
            Some((service, url))
        })
        .collect()
}

// ============ API Types ============

#[derive(Debug, Deserialize)]
struct V2TokenResponse {
    access: V2Access,
}

#[derive(Debug, Deserialize)]
struct V2Access {
    token: V2Token,
    user: Option<IdRef>,
    #[serde(rename = "serviceCatalog", default)]
    service_catalog: Vec<V2CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct V2Token {
    id: String,
    expires: String,
    tenant: Option<IdRef>,
}

#[derive(Debug, Deserialize)]
struct V2CatalogEntry {
    #[serde(rename = "type")]
    r#type: String,
    #[serde(default)]
    endpoints: Vec<V2Endpoint>,
}

#[derive(Debug, Deserialize)]
struct V2Endpoint {
    #[serde(rename = "publicURL")]
    public_url: String,
}

#[derive(Debug, Deserialize)]
struct V3TokenResponse {
    token: V3Token,
}

#[derive(Debug, Deserialize)]
struct V3Token {
    expires_at: String,
    user: Option<IdRef>,
    project: Option<IdRef>,
    #[serde(default)]
    catalog: Vec<V3CatalogEntry>,
    #[serde(rename = "OS-TRUST:trust")]
    trust: Option<V3Trust>,
}

#[derive(Debug, Deserialize)]
struct V3Trust {
    id: String,
    trustor_user: Option<IdRef>,
}

#[derive(Debug, Deserialize)]
struct V3CatalogEntry {
    #[serde(rename = "type")]
    r#type: String,
    #[serde(default)]
    endpoints: Vec<V3Endpoint>,
}

#[derive(Debug, Deserialize)]
struct V3Endpoint {
    interface: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct IdRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TrustEnvelope {
    trust: IdRef,
}

#[derive(Debug, Deserialize)]
struct UserEnvelope {
    user: IdRef,
}
