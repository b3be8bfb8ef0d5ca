//! On-disk TOML configuration shape.
//!
//! Mirrors the original tool's `config.toml`: `port` is accepted either as
//! a bare integer or a single-element array, since both shapes appear in
//! the wild from the original implementation's config writer.

use serde::{Deserialize, Serialize};

use crate::handle::Handle;

fn default_imagepath() -> String {
    "./receive".to_string()
}

fn default_autoreply() -> String {
    "I'm currently away.".to_string()
}

/// Accepts either `port = 5001` or `port = [5001]` in the TOML document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortField {
    Bare(u16),
    List([u16; 1]),
}

impl PortField {
    pub fn value(&self) -> u16 {
        match self {
            PortField::Bare(p) => *p,
            PortField::List([p]) => *p,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub handle: Handle,
    pub port: PortField,
    pub whoisport: u16,
    #[serde(default = "default_imagepath")]
    pub imagepath: String,
    #[serde(default = "default_autoreply")]
    pub autoreply: String,
    #[serde(default)]
    pub away: bool,
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_port() {
        let toml_text = r#"
            handle = "alice"
            port = 5001
            whoisport = 4000
        "#;
        let cfg: Config = toml::from_str(toml_text).unwrap();
        assert_eq!(cfg.port(), 5001);
        assert_eq!(cfg.imagepath, "./receive");
        assert!(!cfg.away);
    }

    #[test]
    fn parses_list_port_and_overrides() {
        let toml_text = r#"
            handle = "bob"
            port = [5002]
            whoisport = 4000
            imagepath = "/tmp/images"
            autoreply = "brb"
            away = true
        "#;
        let cfg: Config = toml::from_str(toml_text).unwrap();
        assert_eq!(cfg.port(), 5002);
        assert_eq!(cfg.imagepath, "/tmp/images");
        assert_eq!(cfg.autoreply, "brb");
        assert!(cfg.away);
    }
}
