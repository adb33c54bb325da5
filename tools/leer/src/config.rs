use crate::errors::LeerError;
use crate::runtime::FileSystem;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffMode {
    #[default]
    Off,
    Previous,
    Permanent,
}

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub interval_seconds: Option<f64>,
    pub line_numbers: bool,
    pub differences: Option<DiffMode>,
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub schedule: ScheduleConfig,
    pub display: DisplayConfig,
    pub execution: ExecutionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleConfig {
    pub interval_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DisplayConfig {
    pub line_numbers: bool,
    pub differences: DiffMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionConfig {
    pub shell: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub path: Option<PathBuf>,
    pub max_payload_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schedule: ScheduleConfig {
                interval_seconds: 2.0,
            },
            display: DisplayConfig {
                line_numbers: false,
                differences: DiffMode::Off,
            },
            execution: ExecutionConfig {
                shell: "sh".to_string(),
            },
            logging: LoggingConfig {
                path: None,
                max_payload_bytes: 4096,
            },
        }
    }
}

impl AppConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.schedule.interval_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialAppConfig {
    schedule: Option<PartialScheduleConfig>,
    display: Option<PartialDisplayConfig>,
    execution: Option<PartialExecutionConfig>,
    logging: Option<PartialLoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialScheduleConfig {
    interval_seconds: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialDisplayConfig {
    line_numbers: Option<bool>,
    differences: Option<DiffMode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialExecutionConfig {
    shell: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialLoggingConfig {
    path: Option<PathBuf>,
    max_payload_bytes: Option<usize>,
}

pub fn load_config(overrides: &CliOverrides, fs: &dyn FileSystem) -> Result<AppConfig, LeerError> {
    let mut cfg = AppConfig::default();

    if let Some(path) = &overrides.config_path {
        let file_contents = fs.read_to_string(path)?;
        let partial: PartialAppConfig = toml::from_str(&file_contents)
            .map_err(|e| LeerError::ConfigParse(format!("{}: {e}", path.display())))?;
        merge_partial_config(&mut cfg, partial);
    }

    apply_cli_overrides(&mut cfg, overrides);
    validate_config(&cfg)?;
    Ok(cfg)
}

fn merge_partial_config(cfg: &mut AppConfig, partial: PartialAppConfig) {
    if let Some(schedule) = partial.schedule {
        if let Some(value) = schedule.interval_seconds {
            cfg.schedule.interval_seconds = value;
        }
    }

    if let Some(display) = partial.display {
        if let Some(value) = display.line_numbers {
            cfg.display.line_numbers = value;
        }
        if let Some(value) = display.differences {
            cfg.display.differences = value;
        }
    }

    if let Some(execution) = partial.execution {
        if let Some(value) = execution.shell {
            cfg.execution.shell = value;
        }
    }

    if let Some(logging) = partial.logging {
        if let Some(value) = logging.path {
            cfg.logging.path = Some(value);
        }
        if let Some(value) = logging.max_payload_bytes {
            cfg.logging.max_payload_bytes = value;
        }
    }
}

fn apply_cli_overrides(cfg: &mut AppConfig, overrides: &CliOverrides) {
    if let Some(interval) = overrides.interval_seconds {
        cfg.schedule.interval_seconds = interval;
    }
    if overrides.line_numbers {
        cfg.display.line_numbers = true;
    }
    if let Some(mode) = overrides.differences {
        cfg.display.differences = mode;
    }
    if let Some(path) = &overrides.log_file {
        cfg.logging.path = Some(path.clone());
    }
}

fn validate_config(cfg: &AppConfig) -> Result<(), LeerError> {
    let interval = cfg.schedule.interval_seconds;
    if !interval.is_finite() || interval < 0.0 {
        return Err(LeerError::InvalidConfig(format!(
            "schedule.interval_seconds must be a non-negative number, got {interval}"
        )));
    }
    if Duration::try_from_secs_f64(interval).is_err() {
        return Err(LeerError::InvalidConfig(format!(
            "schedule.interval_seconds is too large: {interval}"
        )));
    }

    if cfg.execution.shell.trim().is_empty() {
        return Err(LeerError::InvalidConfig(
            "execution.shell must not be empty".to_string(),
        ));
    }

    if cfg.logging.max_payload_bytes == 0 {
        return Err(LeerError::InvalidConfig(
            "logging.max_payload_bytes must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

/// Parses an interval in seconds. Either `.` or `,` is accepted as the
/// decimal separator regardless of locale.
pub fn parse_interval(raw: &str) -> Result<f64, String> {
    let normalized = raw.trim().replace(',', ".");
    let value = normalized
        .parse::<f64>()
        .map_err(|_| format!("`{raw}` is not a number of seconds"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("`{raw}` must be a non-negative number of seconds"));
    }
    Ok(value)
}

pub fn parse_diff_mode(raw: &str) -> Result<DiffMode, String> {
    match raw.trim() {
        "" | "on" | "previous" => Ok(DiffMode::Previous),
        "permanent" => Ok(DiffMode::Permanent),
        "off" => Ok(DiffMode::Off),
        other => Err(format!(
            "`{other}` is not a differences mode (expected `permanent`)"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::{load_config, parse_diff_mode, parse_interval, AppConfig, CliOverrides, DiffMode};
    use crate::errors::LeerError;
    use crate::runtime::FakeFileSystem;
    use std::path::PathBuf;
    use std::time::Duration;

    fn overrides_with_file(path: &str) -> CliOverrides {
        CliOverrides {
            config_path: Some(PathBuf::from(path)),
            ..CliOverrides::default()
        }
    }

    #[test]
    fn interval_accepts_both_decimal_separators() {
        assert_eq!(parse_interval("2"), Ok(2.0));
        assert_eq!(parse_interval("0.5"), Ok(0.5));
        assert_eq!(parse_interval("0,5"), Ok(0.5));
        assert_eq!(parse_interval("0"), Ok(0.0));
        assert!(parse_interval("-1").is_err());
        assert!(parse_interval("abc").is_err());
        assert!(parse_interval("inf").is_err());
        assert!(parse_interval("NaN").is_err());
    }

    #[test]
    fn diff_mode_values() {
        assert_eq!(parse_diff_mode("on"), Ok(DiffMode::Previous));
        assert_eq!(parse_diff_mode("permanent"), Ok(DiffMode::Permanent));
        assert!(parse_diff_mode("sometimes").is_err());
    }

    #[test]
    fn defaults_apply_without_file() {
        let cfg = load_config(&CliOverrides::default(), &FakeFileSystem::default())
            .expect("default config");
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.interval(), Duration::from_secs(2));
    }

    #[test]
    fn partial_file_merges_and_cli_wins() {
        let fs = FakeFileSystem::with_file(
            "/cfg/leer.toml",
            r#"
[schedule]
interval_seconds = 5.0

[display]
differences = "permanent"

[logging]
path = "/tmp/leer.jsonl"
"#,
        );
        let mut overrides = overrides_with_file("/cfg/leer.toml");
        let cfg = load_config(&overrides, &fs).expect("file config");
        assert_eq!(cfg.schedule.interval_seconds, 5.0);
        assert_eq!(cfg.display.differences, DiffMode::Permanent);
        assert!(!cfg.display.line_numbers);
        assert_eq!(cfg.execution.shell, "sh");
        assert_eq!(cfg.logging.path, Some(PathBuf::from("/tmp/leer.jsonl")));

        overrides.interval_seconds = Some(0.25);
        overrides.line_numbers = true;
        overrides.differences = Some(DiffMode::Previous);
        let cfg = load_config(&overrides, &fs).expect("overridden config");
        assert_eq!(cfg.schedule.interval_seconds, 0.25);
        assert!(cfg.display.line_numbers);
        assert_eq!(cfg.display.differences, DiffMode::Previous);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let fs = FakeFileSystem::with_file("/cfg/bad.toml", "[schedule]\ninterval_seconds = -3.0\n");
        let err = load_config(&overrides_with_file("/cfg/bad.toml"), &fs).expect_err("negative");
        assert!(matches!(err, LeerError::InvalidConfig(_)));

        let fs = FakeFileSystem::with_file("/cfg/shell.toml", "[execution]\nshell = \" \"\n");
        let err = load_config(&overrides_with_file("/cfg/shell.toml"), &fs).expect_err("shell");
        assert!(matches!(err, LeerError::InvalidConfig(_)));
    }

    #[test]
    fn parse_errors_and_missing_files_surface() {
        let fs = FakeFileSystem::with_file("/cfg/typo.toml", "[schedule]\nintervall = 1\n");
        let err = load_config(&overrides_with_file("/cfg/typo.toml"), &fs).expect_err("typo");
        assert!(matches!(err, LeerError::ConfigParse(_)));

        let err = load_config(&overrides_with_file("/cfg/missing.toml"), &FakeFileSystem::default())
            .expect_err("missing");
        assert!(matches!(err, LeerError::Io(_)));
    }
}
