use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::CostError;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub backend: BackendSettings,
    pub session: SessionSettings,
    pub log: LogSettings,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BackendSettings {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub plot_costs_fn: String,
    pub details_fn: String,
    /// Budget for the plot cost query
    pub timeout_secs: u64,
    /// Client-level timeout; the only bound on drill-down queries
    pub transport_timeout_secs: u64,
    /// Directory with CSV exports; takes precedence over `base_url`
    pub data_dir: Option<String>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            plot_costs_fn: "custo_por_talhao".to_string(),
            details_fn: "detalhes_custo_talhao".to_string(),
            timeout_secs: 15,
            transport_timeout_secs: 60,
            data_dir: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SessionSettings {
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Where cost data comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendKind {
    Http { base_url: String, api_key: String },
    Files { dir: String },
}

impl Settings {
    /// `config/default`, then `config/{RUN_MODE}`, then `ZE_SAFRA__*`
    /// environment variables (`ZE_SAFRA__BACKEND__BASE_URL`, ...).
    pub fn new() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(Environment::with_prefix("ZE_SAFRA").separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(s, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    pub fn backend_kind(&self) -> Result<BackendKind, CostError> {
        let non_empty = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        if let Some(dir) = non_empty(&self.backend.data_dir) {
            return Ok(BackendKind::Files { dir });
        }
        let base_url = non_empty(&self.backend.base_url).ok_or_else(|| {
            CostError::Config("set backend.base_url or backend.data_dir".to_string())
        })?;
        let api_key = non_empty(&self.backend.api_key)
            .ok_or_else(|| CostError::Config("backend.api_key is required".to_string()))?;
        Ok(BackendKind::Http { base_url, api_key })
    }

    pub fn cost_timeout(&self) -> Result<Duration, CostError> {
        if self.backend.timeout_secs == 0 {
            return Err(CostError::Config("backend.timeout_secs must be positive".to_string()));
        }
        Ok(Duration::from_secs(self.backend.timeout_secs))
    }

    pub fn transport_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.transport_timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::from_toml("").unwrap();
        assert_eq!(s.backend.timeout_secs, 15);
        assert_eq!(s.backend.plot_costs_fn, "custo_por_talhao");
        assert_eq!(s.log.level, "info");
        assert!(s.session.user_id.is_none());
        assert!(s.backend_kind().is_err());
    }

    #[test]
    fn test_http_backend() {
        let s = Settings::from_toml(
            r#"
            [backend]
            base_url = "https://projeto.supabase.co"
            api_key = "anon"
            timeout_secs = 20

            [session]
            user_id = "8c1f"
            "#,
        )
        .unwrap();
        assert_eq!(
            s.backend_kind().unwrap(),
            BackendKind::Http {
                base_url: "https://projeto.supabase.co".to_string(),
                api_key: "anon".to_string()
            }
        );
        assert_eq!(s.cost_timeout().unwrap(), Duration::from_secs(20));
        assert_eq!(s.session.user_id.as_deref(), Some("8c1f"));
    }

    #[test]
    fn test_data_dir_wins_and_zero_timeout_rejected() {
        let s = Settings::from_toml(
            r#"
            [backend]
            base_url = "https://projeto.supabase.co"
            data_dir = "exportacoes"
            timeout_secs = 0
            "#,
        )
        .unwrap();
        assert_eq!(
            s.backend_kind().unwrap(),
            BackendKind::Files {
                dir: "exportacoes".to_string()
            }
        );
        assert!(s.cost_timeout().is_err());
    }
}
