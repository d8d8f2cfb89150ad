use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use nordik_client::ApiClientConfig;
use nordik_core::{AdminUser, Catalog, Role, SelectOption, Session};
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub admin_email: String,
    pub page_size: u32,
    pub http_timeout_secs: u64,
    pub user_agent: String,
    pub downloads_dir: PathBuf,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".to_string(),
            api_token: None,
            admin_email: "admin@localhost".to_string(),
            page_size: 25,
            http_timeout_secs: 20,
            user_agent: "nordik-console/0.1".to_string(),
            downloads_dir: PathBuf::from("./downloads"),
        }
    }
}

impl ConsoleConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base_url: std::env::var("NORDIK_API_URL").unwrap_or(defaults.api_base_url),
            api_token: std::env::var("NORDIK_API_TOKEN")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            admin_email: std::env::var("NORDIK_ADMIN_EMAIL").unwrap_or(defaults.admin_email),
            page_size: std::env::var("NORDIK_PAGE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.page_size),
            http_timeout_secs: std::env::var("NORDIK_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.http_timeout_secs),
            user_agent: std::env::var("NORDIK_USER_AGENT").unwrap_or(defaults.user_agent),
            downloads_dir: std::env::var("NORDIK_DOWNLOADS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.downloads_dir),
        }
    }

    pub fn api_client_config(&self) -> ApiClientConfig {
        ApiClientConfig {
            base_url: self.api_base_url.clone(),
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
        }
    }

    /// Session for a pre-issued API token; `None` when no token is configured.
    pub fn session(&self) -> Option<Session> {
        let token = self.api_token.clone()?;
        Some(Session {
            token,
            user: AdminUser {
                id: 0,
                email: self.admin_email.clone(),
                role: Role::Admin,
            },
            signed_in_at: Utc::now(),
        })
    }
}

/// Optional YAML overrides, e.g.
///
/// ```yaml
/// page_size: 50
/// select_options:
///   status:
///     - { value: approved, label: Approved }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConsoleFile {
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub select_options: BTreeMap<String, Vec<SelectOption>>,
}

impl ConsoleFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&yaml).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn apply(&self, config: &mut ConsoleConfig, catalog: &mut Catalog) {
        if let Some(page_size) = self.page_size.filter(|p| *p > 0) {
            config.page_size = page_size;
        }
        catalog.apply_option_overrides(&self.select_options);
    }
}
