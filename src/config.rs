use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// PostgreSQL connection URL for the order/account/ledger stores
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub approval: ApprovalConfig,
    #[serde(default)]
    pub sweeper: SweeperSettings,
}

/// Approval guard settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ApprovalConfig {
    /// Minutes before an undecided approval prompt is refused
    pub window_minutes: i64,
    /// Single-use token cache capacity
    pub token_capacity: usize,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            window_minutes: 60,
            token_capacity: 4096,
        }
    }
}

/// Expiry sweeper settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SweeperSettings {
    pub enabled: bool,
    pub scan_interval_secs: u64,
    pub batch_size: usize,
}

impl Default for SweeperSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_interval_secs: 300,
            batch_size: 100,
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Self {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .unwrap_or_else(|_| panic!("Failed to read config file: {}", config_path));
        serde_yaml::from_str(&content).expect("Failed to parse config yaml")
    }

    /// Guard configuration derived from the approval settings
    pub fn guard_config(&self) -> crate::approval::GuardConfig {
        crate::approval::GuardConfig {
            approval_window: chrono::Duration::minutes(self.approval.window_minutes),
            token_capacity: self.approval.token_capacity,
        }
    }

    /// Sweeper configuration derived from the settings
    pub fn sweeper_config(&self) -> crate::order::SweeperConfig {
        crate::order::SweeperConfig {
            scan_interval: std::time::Duration::from_secs(self.sweeper.scan_interval_secs),
            approval_window: chrono::Duration::minutes(self.approval.window_minutes),
            batch_size: self.sweeper.batch_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let approval = ApprovalConfig::default();
        assert_eq!(approval.window_minutes, 60);
        assert_eq!(approval.token_capacity, 4096);

        let sweeper = SweeperSettings::default();
        assert!(sweeper.enabled);
        assert_eq!(sweeper.scan_interval_secs, 300);
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
log_level: info
log_dir: ./logs
log_file: paydesk.log
use_json: false
rotation: daily
approval:
  window_minutes: 30
  token_capacity: 128
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.approval.window_minutes, 30);
        assert_eq!(config.approval.token_capacity, 128);
        // Missing sections fall back to defaults
        assert!(config.sweeper.enabled);
        assert!(config.postgres_url.is_none());

        let guards = config.guard_config();
        assert_eq!(guards.approval_window, chrono::Duration::minutes(30));
        assert_eq!(guards.token_capacity, 128);
    }
}
