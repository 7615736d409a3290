//! Minimal platform REST client.
//!
//! Only the calls the workspace tools need. Every request carries the bearer
//! token from the call's [`CallContext`](crate::compose::CallContext); the
//! client itself holds no credentials.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// A workspace (owner) visible to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// One entry of the owners listing.
#[derive(Debug, Deserialize)]
struct OwnerWithCursor {
    owner: Owner,
}

/// HTTP client for the platform API.
///
/// This type is cheap to clone - reqwest pools connections internally.
#[derive(Debug, Clone)]
pub struct PlatformClient {
    http: reqwest::Client,
    host: String,
}

impl PlatformClient {
    /// Creates a client for the API rooted at `host` (e.g. `https://api.render.com/v1`).
    pub fn new(host: impl Into<String>) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("skyport/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            host: host.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Lists the workspaces the token can act on.
    pub async fn list_owners(&self, token: Option<&str>) -> Result<Vec<Owner>, AppError> {
        let token = token.ok_or(AppError::AuthenticationRequired)?;
        let url = format!("{}/owners", self.host);

        tracing::debug!(url = %url, "Listing owners");

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&[("limit", "100")])
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AppError::AuthenticationRequired);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "GET /owners returned {}: {}",
                status, body
            )));
        }

        let owners: Vec<OwnerWithCursor> = response.json().await?;
        Ok(owners.into_iter().map(|o| o.owner).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_trailing_slash_is_trimmed() {
        let client = PlatformClient::new("https://api.example/v1/").unwrap();
        assert_eq!(client.host(), "https://api.example/v1");
    }

    #[tokio::test]
    async fn test_list_owners_requires_token() {
        let client = PlatformClient::new("http://127.0.0.1:1").unwrap();
        assert!(matches!(
            client.list_owners(None).await,
            Err(AppError::AuthenticationRequired)
        ));
    }

    #[test]
    fn test_owner_listing_decodes() {
        let json = r#"[
            {"cursor": "c1", "owner": {"id": "tea-1", "name": "Team", "email": "t@example.com", "type": "team"}},
            {"cursor": "c2", "owner": {"id": "usr-2", "name": "Me", "type": "user"}}
        ]"#;
        let owners: Vec<OwnerWithCursor> = serde_json::from_str(json).unwrap();
        assert_eq!(owners.len(), 2);
        assert_eq!(owners[0].owner.kind, "team");
        assert_eq!(owners[1].owner.email, "");
    }
}
