use std::{
    env,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use hide_on_close_hook::config::{Config, CONFIG_FILE};

#[derive(Debug)]
pub struct Settings {
    pub config: Config,
    /// Absolute path of the interception module.
    pub module: PathBuf,
}

impl Settings {
    /// Reads `path`, or `config.toml` next to the executable when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => env::current_exe()?
                .parent()
                .context("executable has no parent directory")?
                .join(CONFIG_FILE),
        };
        let path = absolute(path)?;

        let config = Config::load(&path)?;
        let base = path.parent().context("config path has no parent directory")?;
        let module = config.module_path(base);

        Ok(Self { config, module })
    }
}

fn absolute(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }
    Ok(env::current_dir()?.join(path))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn module_resolves_next_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "module = \"hooks/custom.dll\"\n").unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.module, dir.path().join("hooks/custom.dll"));
        assert!(settings.module.is_absolute());
    }

    #[test]
    fn missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(Some(&dir.path().join(CONFIG_FILE))).unwrap();

        assert_eq!(settings.config, Config::default());
        assert_eq!(settings.module, dir.path().join("hide_on_close_hook.dll"));
    }
}
