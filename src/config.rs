use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Default)]
struct ConfigFile {
    api_key: Option<String>,
}

fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("sqlitem").join("config.toml"))
}

/// Resolve the AI backend key: `ANTHROPIC_API_KEY`, else the user config
/// file. Failure here disables the AI features, nothing else.
pub fn api_key() -> Result<String> {
    if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
        let key: String = key.chars().filter(|c| !c.is_whitespace()).collect();
        if !key.is_empty() {
            return Ok(key);
        }
    }

    let path = config_path().context("could not determine config directory")?;
    if let Some(key) = read_key_from(&path)? {
        return Ok(key);
    }

    anyhow::bail!(
        "no API key configured: set ANTHROPIC_API_KEY or add api_key to {}",
        path.display()
    )
}

fn read_key_from(path: &Path) -> Result<Option<String>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(_) => return Ok(None),
    };

    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("invalid config file: {}", path.display()))?;

    Ok(config.api_key.filter(|k| !k.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reads_key_from_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "api_key = \"sk-test\"\n").unwrap();

        assert_eq!(read_key_from(&path).unwrap(), Some("sk-test".to_string()));
    }

    #[test]
    fn missing_file_or_key_is_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert_eq!(read_key_from(&path).unwrap(), None);

        std::fs::write(&path, "other = 1\n").unwrap();
        assert_eq!(read_key_from(&path).unwrap(), None);
    }

    #[test]
    fn malformed_config_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "api_key = [not toml").unwrap();
        assert!(read_key_from(&path).is_err());
    }
}
