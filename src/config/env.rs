//! Key lookup for [`StudioConfig::api_key`](super::StudioConfig::api_key).
//!
//! A dotenv file is read once into memory and consulted before the process
//! environment. Blank process variables count as unset.

use std::collections::BTreeMap;
use std::path::Path;

use crate::Result;

#[derive(Clone, Default)]
pub struct Env {
    pub dotenv: BTreeMap<String, String>,
}

// Values are credentials; only the names are printed.
impl std::fmt::Debug for Env {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.dotenv.keys()).finish()
    }
}

impl Env {
    pub fn parse_dotenv(contents: &str) -> Self {
        Self {
            dotenv: parse_dotenv(contents),
        }
    }

    pub async fn load_dotenv(path: impl AsRef<Path>) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await?;
        Ok(Self::parse_dotenv(&contents))
    }

    /// Dotenv entry for `name`, else a non-blank process variable.
    pub fn get(&self, name: &str) -> Option<String> {
        self.dotenv.get(name).cloned().or_else(|| {
            std::env::var(name)
                .ok()
                .filter(|value| !value.trim().is_empty())
        })
    }
}

/// Reads `NAME=value` assignments; later lines override earlier ones.
///
/// Accepts an `export ` prefix and one layer of matching single or double
/// quotes. Comments, malformed lines and empty values are dropped.
pub fn parse_dotenv(contents: &str) -> BTreeMap<String, String> {
    contents.lines().filter_map(assignment).collect()
}

fn assignment(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").map_or(line, str::trim_start);
    let (name, value) = line.split_once('=')?;
    let name = name.trim();
    let value = strip_quotes(value.trim());
    if name.is_empty() || value.trim().is_empty() {
        return None;
    }
    Some((name.to_string(), value.to_string()))
}

fn strip_quotes(value: &str) -> &str {
    ['"', '\'']
        .into_iter()
        .find_map(|quote| value.strip_prefix(quote)?.strip_suffix(quote))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_exports_quotes_and_comments() {
        let parsed = parse_dotenv(
            "# keys\nexport GEMINI_API_KEY=\"abc\"\nAPI_KEY='def'\nEMPTY=\n=novalue\nBROKEN\n",
        );
        assert_eq!(parsed.get("GEMINI_API_KEY").map(String::as_str), Some("abc"));
        assert_eq!(parsed.get("API_KEY").map(String::as_str), Some("def"));
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn later_assignment_wins_and_mismatched_quotes_stay() {
        let parsed = parse_dotenv("KEY=first\nKEY=second\nODD=\"half'\n");
        assert_eq!(parsed.get("KEY").map(String::as_str), Some("second"));
        assert_eq!(parsed.get("ODD").map(String::as_str), Some("\"half'"));
    }

    #[test]
    fn dotenv_values_win_over_process_env() {
        let env = Env::parse_dotenv("PATH=/from/dotenv");
        assert_eq!(env.get("PATH").as_deref(), Some("/from/dotenv"));
    }

    #[test]
    fn debug_lists_names_only() {
        let env = Env::parse_dotenv("GEMINI_API_KEY=very-secret");
        let printed = format!("{env:?}");
        assert!(printed.contains("GEMINI_API_KEY"));
        assert!(!printed.contains("very-secret"));
    }
}
