//! `.env` file support
//!
//! Values are only used for keys missing from the process environment, so
//! files are read into a map instead of being exported into the process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Collect `KEY=VALUE` pairs, skipping lines that do not parse
fn collect<I>(path: &Path, iter: I) -> HashMap<String, String>
where
    I: Iterator<Item = dotenvy::Result<(String, String)>>,
{
    iter.filter_map(|item| match item {
        Ok(pair) => Some(pair),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "skipping malformed env line");
            None
        }
    })
    .collect()
}

/// Parse `.env` formatted text
#[must_use]
pub fn parse(content: &str) -> HashMap<String, String> {
    collect(Path::new("<inline>"), dotenvy::from_read_iter(content.as_bytes()))
}

/// Read one `.env` file; a missing file yields no values
#[must_use]
pub fn read(path: &Path) -> HashMap<String, String> {
    match dotenvy::from_path_iter(path) {
        Ok(iter) => {
            tracing::debug!(path = %path.display(), "loaded env file");
            collect(path, iter)
        }
        Err(e) if e.not_found() => HashMap::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read env file");
            HashMap::new()
        }
    }
}

/// Standard `.env` locations, earliest wins
fn default_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dir) = super::file::config_dir() {
        paths.push(dir.join(".env"));
    }
    paths.push(PathBuf::from(".env"));
    paths
}

/// Merge all standard `.env` files
#[must_use]
pub fn load_default_env_files() -> HashMap<String, String> {
    let mut merged = HashMap::new();
    for path in default_paths() {
        for (key, value) in read(&path) {
            merged.entry(key).or_insert(value);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_lines() {
        let vars = parse("# keys\nGROQ_API_KEY=gsk_123\n\nexport HA_URL=\"http://ha.local:8123\"\n");

        assert_eq!(vars.get("GROQ_API_KEY").map(String::as_str), Some("gsk_123"));
        assert_eq!(
            vars.get("HA_URL").map(String::as_str),
            Some("http://ha.local:8123")
        );
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn test_value_may_contain_equals() {
        let vars = parse("TOKEN=abc=def");
        assert_eq!(vars.get("TOKEN").map(String::as_str), Some("abc=def"));
    }

    #[test]
    fn test_file_values_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "ELEVENLABS_VOICE_ID=abc\n").unwrap();

        assert_eq!(read(&path).get("ELEVENLABS_VOICE_ID").map(String::as_str), Some("abc"));
        assert!(read(&dir.path().join("nope.env")).is_empty());
    }
}
