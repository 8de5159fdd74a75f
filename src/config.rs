//! Environment-driven configuration.
//!
//! Every knob is settable via CLI flag or environment variable. Secrets are
//! wrapped in `SecretString` right after parsing so they never appear in
//! `Debug` output or logs.

use std::path::PathBuf;

use clap::Parser;
use secrecy::SecretString;

/// Default grouping property in the Notion database.
pub const DEFAULT_PROPERTY_NAME: &str = "Kurzus";

/// Raw command line / environment arguments.
#[derive(Debug, Parser)]
#[command(name = "kurzus-export", about = "Notion → grouped XLSX/CSV export")]
pub struct Cli {
    /// Notion integration token.
    #[arg(long, env = "NOTION_API_KEY", hide_env_values = true)]
    pub notion_api_key: String,

    /// Notion database to export.
    #[arg(long, env = "NOTION_DATABASE_ID")]
    pub notion_database_id: String,

    /// Property used for grouping pages.
    #[arg(long, env = "NOTION_PROPERTY_NAME", default_value = DEFAULT_PROPERTY_NAME)]
    pub notion_property_name: String,

    /// Notion API base URL (override for tests).
    #[arg(long, env = "NOTION_BASE_URL", default_value = "https://api.notion.com")]
    pub notion_base_url: String,

    /// Shared access password. When unset, the gate is disabled (dev mode).
    #[arg(long, env = "APP_PASSWORD", hide_env_values = true)]
    pub app_password: Option<String>,

    /// Directory for export artifacts.
    #[arg(long, env = "EXPORT_DIR", default_value = "export")]
    pub export_dir: PathBuf,

    /// Base URL of the remote spreadsheet service. Mirroring is enabled only
    /// when this, the spreadsheet id, and the credentials are all set.
    #[arg(long, env = "MIRROR_BASE_URL")]
    pub mirror_base_url: Option<String>,

    /// Identifier of the remote spreadsheet.
    #[arg(long, env = "MIRROR_SPREADSHEET_ID")]
    pub mirror_spreadsheet_id: Option<String>,

    /// Service credential blob (JSON) for the remote spreadsheet.
    #[arg(long, env = "MIRROR_CREDENTIALS", hide_env_values = true)]
    pub mirror_credentials: Option<String>,

    /// Wall-clock budget for a single invocation, in seconds.
    #[arg(long, env = "WATCHDOG_BUDGET_SECS", default_value_t = 840)]
    pub watchdog_budget_secs: u64,

    /// Maximum groups processed per invocation. 0 means unlimited.
    #[arg(long, env = "MAX_GROUPS_PER_RUN", default_value_t = 0)]
    pub max_groups_per_run: usize,

    /// Restart the export automatically after a budget stop.
    #[arg(long, env = "AUTO_RESUME", default_value_t = false)]
    pub auto_resume: bool,

    /// Address the web server binds to.
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:8080")]
    pub bind_addr: String,
}

/// Settings for the optional remote spreadsheet mirror.
#[derive(Clone)]
pub struct MirrorConfig {
    pub base_url: String,
    pub spreadsheet_id: String,
    /// Raw credential blob; parsed by the mirror client.
    pub credentials: SecretString,
}

/// Validated application configuration with secrets wrapped.
#[derive(Clone)]
pub struct Config {
    pub notion_api_key: SecretString,
    pub notion_database_id: String,
    pub notion_property_name: String,
    pub notion_base_url: String,
    pub app_password: Option<SecretString>,
    pub export_dir: PathBuf,
    pub mirror: Option<MirrorConfig>,
    pub watchdog_budget_secs: u64,
    pub max_groups_per_run: usize,
    pub auto_resume: bool,
    pub bind_addr: String,
}

impl Config {
    /// Builds the runtime configuration from parsed arguments.
    ///
    /// Mirroring requires all three mirror settings; a partial set is treated
    /// as disabled so a missing credential never half-configures the feature.
    pub fn from_cli(cli: Cli) -> Self {
        let mirror = match (
            cli.mirror_base_url,
            cli.mirror_spreadsheet_id,
            cli.mirror_credentials,
        ) {
            (Some(base_url), Some(spreadsheet_id), Some(credentials)) => Some(MirrorConfig {
                base_url,
                spreadsheet_id,
                credentials: SecretString::from(credentials),
            }),
            _ => None,
        };

        Self {
            notion_api_key: SecretString::from(cli.notion_api_key),
            notion_database_id: cli.notion_database_id,
            notion_property_name: cli.notion_property_name,
            notion_base_url: cli.notion_base_url,
            app_password: cli.app_password.map(SecretString::from),
            export_dir: cli.export_dir,
            mirror,
            watchdog_budget_secs: cli.watchdog_budget_secs,
            max_groups_per_run: cli.max_groups_per_run,
            auto_resume: cli.auto_resume,
            bind_addr: cli.bind_addr,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("notion_api_key", &"[REDACTED]")
            .field("notion_database_id", &self.notion_database_id)
            .field("notion_property_name", &self.notion_property_name)
            .field("notion_base_url", &self.notion_base_url)
            .field(
                "app_password",
                &self.app_password.as_ref().map(|_| "[REDACTED]"),
            )
            .field("export_dir", &self.export_dir)
            .field("mirror_enabled", &self.mirror.is_some())
            .field("watchdog_budget_secs", &self.watchdog_budget_secs)
            .field("max_groups_per_run", &self.max_groups_per_run)
            .field("auto_resume", &self.auto_resume)
            .field("bind_addr", &self.bind_addr)
            .finish()
    }
}

impl std::fmt::Debug for MirrorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorConfig")
            .field("base_url", &self.base_url)
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("credentials", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Vec<&'static str> {
        vec![
            "kurzus-export",
            "--notion-api-key",
            "secret_test_token",
            "--notion-database-id",
            "db-123",
        ]
    }

    #[test]
    fn defaults_are_applied() {
        let cli = Cli::try_parse_from(base_args()).expect("parse");
        let config = Config::from_cli(cli);

        assert_eq!(config.notion_property_name, DEFAULT_PROPERTY_NAME);
        assert_eq!(config.notion_base_url, "https://api.notion.com");
        assert_eq!(config.watchdog_budget_secs, 840);
        assert_eq!(config.max_groups_per_run, 0);
        assert!(!config.auto_resume);
        assert!(config.app_password.is_none());
        assert!(config.mirror.is_none());
    }

    #[test]
    fn partial_mirror_settings_disable_mirroring() {
        let mut args = base_args();
        args.extend(["--mirror-base-url", "https://sheets.example.com"]);
        let cli = Cli::try_parse_from(args).expect("parse");
        let config = Config::from_cli(cli);

        assert!(config.mirror.is_none());
    }

    #[test]
    fn full_mirror_settings_enable_mirroring() {
        let mut args = base_args();
        args.extend([
            "--mirror-base-url",
            "https://sheets.example.com",
            "--mirror-spreadsheet-id",
            "sheet-1",
            "--mirror-credentials",
            r#"{"token":"abc"}"#,
        ]);
        let cli = Cli::try_parse_from(args).expect("parse");
        let config = Config::from_cli(cli);

        let mirror = config.mirror.expect("mirror enabled");
        assert_eq!(mirror.spreadsheet_id, "sheet-1");
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let mut args = base_args();
        args.extend(["--app-password", "hunter2"]);
        let cli = Cli::try_parse_from(args).expect("parse");
        let config = Config::from_cli(cli);

        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("secret_test_token"));
        assert!(!debug_output.contains("hunter2"));
        assert!(debug_output.contains("[REDACTED]"));
    }
}
