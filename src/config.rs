//! Service settings persisted as a flat `KEY=VALUE` file (`.env.local`).

use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_API_HOST: &str = "localhost";
pub const DEFAULT_API_PORT: u16 = 4317;
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
pub const DEFAULT_CORPUS_PATH: &str = "./data/corpus";
pub const DEFAULT_DB_PATH: &str = "./data/db";
pub const DEFAULT_DESKTOP_PORT: u16 = 3000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: API_PORT must be an integer between 0 and 65535, got {value:?}")]
    InvalidPort { line: usize, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub api_host: String,
    pub api_port: u16,
    pub ollama_url: String,
    pub corpus_path: String,
    pub db_path: String,
    pub desktop_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_host: DEFAULT_API_HOST.into(),
            api_port: DEFAULT_API_PORT,
            ollama_url: DEFAULT_OLLAMA_URL.into(),
            corpus_path: DEFAULT_CORPUS_PATH.into(),
            db_path: DEFAULT_DB_PATH.into(),
            desktop_port: DEFAULT_DESKTOP_PORT,
        }
    }
}

/// Parse a port value as typed by the user or read from the file.
pub fn parse_port(value: &str) -> Option<u16> {
    value.trim().parse::<u16>().ok()
}

impl Config {
    /// Parse file contents. Any malformed `API_PORT` rejects the whole file.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut cfg = Config::default();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "API_HOST" => cfg.api_host = value.to_string(),
                "API_PORT" => {
                    cfg.api_port = parse_port(value).ok_or_else(|| ConfigError::InvalidPort {
                        line: idx + 1,
                        value: value.to_string(),
                    })?;
                }
                "OLLAMA_URL" => cfg.ollama_url = value.to_string(),
                "CORPUS_PATH" => cfg.corpus_path = value.to_string(),
                "DB_PATH" => cfg.db_path = value.to_string(),
                _ => {}
            }
        }
        Ok(cfg)
    }

    /// Read the file if present. A missing file yields the defaults.
    pub fn try_load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Config::parse(&text)
    }

    /// Like [`Config::try_load`], but never fails: errors are logged and defaults kept.
    pub fn load(path: &Path) -> Self {
        match Config::try_load(path) {
            Ok(cfg) => {
                tracing::debug!(path = %path.display(), "configuration loaded");
                cfg
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "could not load configuration, using defaults: {e}");
                Config::default()
            }
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("API_HOST={}\n", self.api_host));
        out.push_str(&format!("API_PORT={}\n", self.api_port));
        out.push_str(&format!("OLLAMA_URL={}\n", self.ollama_url));
        out.push_str(&format!("CORPUS_PATH={}\n", self.corpus_path));
        out.push_str(&format!("DB_PATH={}\n", self.db_path));
        out
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, self.render()).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn api_base_url(&self) -> String {
        format!("http://{}:{}", self.api_host, self.api_port)
    }

    pub fn desktop_url(&self) -> String {
        format!("http://localhost:{}", self.desktop_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load(&dir.path().join(".env.local"));
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.api_base_url(), "http://localhost:4317");
    }

    #[test]
    fn parses_known_keys_and_ignores_the_rest() {
        let cfg = Config::parse(
            "# local overrides\nAPI_HOST=10.0.0.5\nAPI_PORT=8080\nFOO=bar\nnot a pair\nDB_PATH=/var/db\n",
        )
        .unwrap();
        assert_eq!(cfg.api_host, "10.0.0.5");
        assert_eq!(cfg.api_port, 8080);
        assert_eq!(cfg.db_path, "/var/db");
        assert_eq!(cfg.ollama_url, DEFAULT_OLLAMA_URL);
        assert_eq!(cfg.corpus_path, DEFAULT_CORPUS_PATH);
    }

    #[test]
    fn values_may_contain_equals_signs() {
        let cfg = Config::parse("OLLAMA_URL=http://host:11434/?a=b\n").unwrap();
        assert_eq!(cfg.ollama_url, "http://host:11434/?a=b");
    }

    #[test]
    fn commented_port_is_ignored() {
        let cfg = Config::parse("#API_PORT=abc\n").unwrap();
        assert_eq!(cfg.api_port, DEFAULT_API_PORT);
    }

    #[test]
    fn invalid_port_fails_parse_with_line_number() {
        let err = Config::parse("API_HOST=example\nAPI_PORT=abc\n").unwrap_err();
        match err {
            ConfigError::InvalidPort { line, value } => {
                assert_eq!(line, 2);
                assert_eq!(value, "abc");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_port_keeps_defaults_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env.local");
        std::fs::write(&path, "API_HOST=example\nAPI_PORT=abc\n").unwrap();

        let cfg = Config::load(&path);
        assert_eq!(cfg.api_port, DEFAULT_API_PORT);
        assert_eq!(cfg.api_host, DEFAULT_API_HOST);
    }

    #[test]
    fn out_of_range_port_is_rejected() {
        assert!(parse_port("70000").is_none());
        assert!(parse_port("-1").is_none());
        assert_eq!(parse_port(" 4317 "), Some(4317));
    }

    #[test]
    fn save_then_load_preserves_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env.local");
        let cfg = Config {
            api_host: "api.internal".into(),
            api_port: 9000,
            corpus_path: "/srv/corpus".into(),
            ..Config::default()
        };
        cfg.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("API_HOST=api.internal\nAPI_PORT=9000\n"));
        assert_eq!(Config::load(&path), cfg);
    }
}
