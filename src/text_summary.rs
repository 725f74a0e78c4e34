//! Text report for `--check`.
//!
//! Pure formatting over check results so the one-shot mode and its tests share
//! the same output.

use crate::client::ConnectionCheck;
use crate::config::Config;
use crate::model::OllamaHealth;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
    /// Whether every check came back healthy.
    pub healthy: bool,
}

/// Build the environment report from check results.
pub(crate) fn build_check_report(
    config: &Config,
    api: &ConnectionCheck,
    ollama: &OllamaHealth,
    tools: &[(String, Option<String>)],
) -> TextSummary {
    let mut lines = Vec::new();
    let mut healthy = true;

    lines.push(format!("API endpoint:  {}", config.api_base_url()));
    lines.push(format!("Ollama URL:    {}", config.ollama_url));
    lines.push(format!("Corpus path:   {}", config.corpus_path));
    lines.push(format!("Database path: {}", config.db_path));
    lines.push(String::new());

    let api_line = match api {
        ConnectionCheck::Healthy => "healthy".to_string(),
        ConnectionCheck::HttpStatus(code) => format!("HTTP {code}"),
        ConnectionCheck::Unreachable => "not running (mock responses in use)".to_string(),
        ConnectionCheck::Failed(e) => format!("error: {e}"),
    };
    healthy &= api.is_healthy();
    lines.push(format!("API server: {api_line}"));

    let ollama_line = match ollama {
        OllamaHealth::Running { models } => format!("running, {models} models"),
        OllamaHealth::Error { status } => format!("error (HTTP {status})"),
        OllamaHealth::NotRunning { reason } => format!("not accessible ({reason})"),
        OllamaHealth::Unknown => "unknown".to_string(),
    };
    healthy &= matches!(ollama, OllamaHealth::Running { .. });
    lines.push(format!("Ollama:     {ollama_line}"));

    for (tool, version) in tools {
        match version {
            Some(v) => lines.push(format!("{tool}: {v}")),
            None => {
                healthy = false;
                lines.push(format!("{tool}: not found"));
            }
        }
    }

    TextSummary { lines, healthy }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_environment() {
        let report = build_check_report(
            &Config::default(),
            &ConnectionCheck::Healthy,
            &OllamaHealth::Running { models: 3 },
            &[("node".into(), Some("v20.11.0".into()))],
        );
        assert!(report.healthy);
        assert!(report.lines.contains(&"API server: healthy".to_string()));
        assert!(report.lines.contains(&"Ollama:     running, 3 models".to_string()));
        assert!(report.lines.contains(&"node: v20.11.0".to_string()));
        assert_eq!(report.lines[0], "API endpoint:  http://localhost:4317");
    }

    #[test]
    fn missing_pieces_mark_unhealthy() {
        let report = build_check_report(
            &Config::default(),
            &ConnectionCheck::Unreachable,
            &OllamaHealth::Error { status: 404 },
            &[("pnpm".into(), None)],
        );
        assert!(!report.healthy);
        assert!(report.lines.iter().any(|l| l == "pnpm: not found"));
        assert!(report.lines.iter().any(|l| l.contains("HTTP 404")));
    }
}
