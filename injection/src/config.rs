use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

pub const CONFIG_FILE: &str = "config.toml";

/// Settings shared by the supervisor and the interception module.
///
/// Both sides read the same `config.toml`, which lives next to the supervisor
/// executable and the module DLL.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Executable base name of the application whose main window is kept alive.
    pub target_executable: String,
    /// Interception module. Relative paths resolve against the config directory.
    pub module: PathBuf,
    pub poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_executable: "olk.exe".to_owned(),
            module: PathBuf::from("hide_on_close_hook.dll"),
            poll_interval_ms: 500,
        }
    }
}

impl Config {
    /// Loads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let config = match fs::read_to_string(path) {
            Ok(config) => config,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()))
            }
        };

        Self::parse(&config).with_context(|| format!("invalid config in {}", path.display()))
    }

    pub fn parse(config: &str) -> Result<Self> {
        let config: Self = toml::from_str(config)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let name = self.target_executable.trim();
        if name.is_empty() {
            bail!("`target_executable` must not be empty");
        }
        if name.contains(|c| c == '/' || c == '\\') {
            bail!("`target_executable` must be a file name, got `{name}`");
        }
        if self.poll_interval_ms == 0 {
            bail!("`poll_interval_ms` must be greater than zero");
        }
        Ok(())
    }

    pub fn module_path(&self, base: &Path) -> PathBuf {
        if self.module.is_absolute() {
            self.module.clone()
        } else {
            base.join(&self.module)
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn is_target(&self, executable: &str) -> bool {
        executable.eq_ignore_ascii_case(self.target_executable.trim())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn partial_config_keeps_other_defaults() {
        let config = Config::parse(r#"target_executable = "notepad.exe""#).unwrap();
        assert_eq!(config.target_executable, "notepad.exe");
        assert_eq!(config.module, PathBuf::from("hide_on_close_hook.dll"));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Config::parse(r#"target_executable = "  ""#).is_err());
        assert!(Config::parse(r#"target_executable = "C:\\apps\\olk.exe""#).is_err());
        assert!(Config::parse("poll_interval_ms = 0").is_err());
        assert!(Config::parse("unknown = 1").is_err());
    }

    #[test]
    fn target_match_ignores_case() {
        let config = Config::default();
        assert!(config.is_target("OLK.EXE"));
        assert!(config.is_target("olk.exe"));
        assert!(!config.is_target("outlook.exe"));
    }

    #[test]
    fn module_path_resolves_against_base() {
        let base = Path::new("base");
        let config = Config::default();
        assert_eq!(
            config.module_path(base),
            base.join("hide_on_close_hook.dll")
        );

        let absolute = std::env::temp_dir().join("hook.dll");
        let config = Config {
            module: absolute.clone(),
            ..Config::default()
        };
        assert_eq!(config.module_path(base), absolute);
    }

    #[test]
    fn load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "target_executable = \"app.exe\"\npoll_interval_ms = 250\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.target_executable, "app.exe");
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
    }

    #[test]
    fn load_reports_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "poll_interval_ms = \"soon\"").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("invalid config"));
    }
}
