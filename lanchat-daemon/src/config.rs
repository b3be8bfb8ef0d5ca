//! Loads the TOML configuration document described in SPEC_FULL.md §6.

use std::path::Path;

use lanchat_types::Config;

pub async fn load(path: &Path) -> anyhow::Result<Config> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("reading config file {path:?}: {e}"))?;
    let cfg: Config = toml::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("parsing config file {path:?}: {e}"))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn loads_a_valid_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, "handle = \"alice\"\nport = 5001\nwhoisport = 4000\n")
            .await
            .unwrap();
        let cfg = load(&path).await.unwrap();
        assert_eq!(cfg.port(), 5001);
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let result = load(&dir.path().join("nope.toml")).await;
        assert!(result.is_err());
    }
}
