//! Client for the external file browser's admin API.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::FileBrowserConfig;

#[derive(Debug, thiserror::Error)]
pub enum FileBrowserError {
    #[error("file browser request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("file browser returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct FileSession {
    pub url: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
struct RemoteUser {
    id: u64,
    username: String,
}

pub struct FileBrowser {
    client: reqwest::Client,
    config: FileBrowserConfig,
}

impl FileBrowser {
    pub fn new(config: FileBrowserConfig) -> Result<Self, FileBrowserError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, config })
    }

    /// Create or update the user so it can log in with `password`, scoped to `scope`.
    pub async fn ensure_user(
        &self,
        username: &str,
        password: &str,
        scope: &str,
    ) -> Result<FileSession, FileBrowserError> {
        let token = self.admin_token().await?;
        let users_url = format!("{}/users", self.config.api_url);

        match self.find_user(&token, username).await? {
            Some(existing) => {
                let mut data = user_payload(username, password, scope);
                data["id"] = json!(existing.id);
                let resp = self
                    .client
                    .put(format!("{users_url}/{}", existing.id))
                    .header("X-Auth", &token)
                    .json(&json!({ "what": "user", "which": ["all"], "data": data }))
                    .send()
                    .await?;
                check(resp).await?;
                tracing::info!(username, "File browser user updated");
            }
            None => {
                let resp = self
                    .client
                    .post(&users_url)
                    .header("X-Auth", &token)
                    .json(&json!({
                        "what": "user",
                        "which": [],
                        "data": user_payload(username, password, scope),
                    }))
                    .send()
                    .await?;
                check(resp).await?;
                tracing::info!(username, "File browser user created");
            }
        }

        Ok(FileSession {
            url: self.config.public_url.clone(),
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// Delete the user if it exists. Returns whether anything was removed.
    pub async fn remove_user(&self, username: &str) -> Result<bool, FileBrowserError> {
        let token = self.admin_token().await?;
        let Some(existing) = self.find_user(&token, username).await? else {
            return Ok(false);
        };
        let resp = self
            .client
            .delete(format!("{}/users/{}", self.config.api_url, existing.id))
            .header("X-Auth", &token)
            .send()
            .await?;
        check(resp).await?;
        Ok(true)
    }

    async fn admin_token(&self) -> Result<String, FileBrowserError> {
        let resp = self
            .client
            .post(format!("{}/login", self.config.api_url))
            .json(&json!({
                "username": self.config.admin_user,
                "password": self.config.admin_pass,
            }))
            .send()
            .await?;
        Ok(check(resp).await?.text().await?)
    }

    async fn find_user(
        &self,
        token: &str,
        username: &str,
    ) -> Result<Option<RemoteUser>, FileBrowserError> {
        let resp = self
            .client
            .get(format!("{}/users", self.config.api_url))
            .header("X-Auth", token)
            .send()
            .await?;
        let users: Vec<RemoteUser> = check(resp).await?.json().await?;
        Ok(users.into_iter().find(|u| u.username == username))
    }
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response, FileBrowserError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(FileBrowserError::Status { status, body })
}

fn user_payload(username: &str, password: &str, scope: &str) -> Value {
    json!({
        "scope": scope,
        "locale": "en",
        "viewMode": "list",
        "singleClick": false,
        "sorting": { "by": "name", "asc": false },
        "perm": {
            "admin": false,
            "execute": true,
            "create": true,
            "rename": true,
            "modify": true,
            "delete": true,
            "share": true,
            "download": true,
        },
        "commands": [],
        "hideDotfiles": false,
        "dateFormat": false,
        "username": username,
        "password": password,
        "rules": [],
        "lockPassword": false,
    })
}
