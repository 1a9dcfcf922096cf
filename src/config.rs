use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::service::{CredentialSource, StaticToken};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Root of the REST API, e.g. `https://labs.example.edu/api`
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    pub bearer_token: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/api".to_string(),
            timeout_secs: 30,
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AppConfig {
    /// Load configuration from defaults, `labres.toml` and `LABRES_*`
    /// environment variables, in increasing precedence.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        config = config.add_source(config::File::with_name("labres").required(false));

        // LABRES_BACKEND__BASE_URL, LABRES_AUTH__BEARER_TOKEN, ...
        config = config.add_source(
            config::Environment::with_prefix("LABRES")
                .prefix_separator("_")
                .separator("__"),
        );

        let app_config: AppConfig = config.build()?.try_deserialize()?;
        Ok(app_config)
    }

    pub fn credentials(&self) -> Arc<dyn CredentialSource> {
        Arc::new(StaticToken(self.auth.bearer_token.clone()))
    }
}
