use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::RecallConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["recall.toml", "recall.yaml", "recall.yml", "recall.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<RecallConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Load config from `explicit` if given, otherwise from standard locations.
///
/// Search order without an explicit path:
/// 1. `./recall.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/recall/recall.{toml,yaml,yml,json}` (user-global)
///
/// An explicit path that fails to load is an error. A discovered file that
/// fails to load is logged and replaced by defaults, as is a missing one.
pub fn discover_and_load(explicit: Option<&Path>) -> anyhow::Result<RecallConfig> {
    if let Some(path) = explicit {
        debug!(path = %path.display(), "loading config");
        return load_config(path);
    }
    let Some(path) = find_config_file() else {
        debug!("no config file found, using defaults");
        return Ok(RecallConfig::default());
    };
    debug!(path = %path.display(), "loading config");
    match load_config(&path) {
        Ok(cfg) => Ok(cfg),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            Ok(RecallConfig::default())
        },
    }
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    find_in(Path::new(".")).or_else(|| config_dir().and_then(|dir| find_in(&dir)))
}

fn find_in(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user config directory: `~/.config/recall/` on all platforms.
pub fn config_dir() -> Option<PathBuf> {
    home_dir().map(|h| h.join(".config").join("recall"))
}

/// Returns the data directory: `~/.recall/` on all platforms.
pub fn data_dir() -> PathBuf {
    home_dir()
        .map(|h| h.join(".recall"))
        .unwrap_or_else(|| PathBuf::from(".recall"))
}

fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<RecallConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::schema::Eviction};

    #[test]
    fn loads_each_format() {
        let dir = tempfile::tempdir().unwrap();

        let toml_path = dir.path().join("recall.toml");
        std::fs::write(&toml_path, "[memory]\nworking_memory_size = 7\n").unwrap();
        assert_eq!(load_config(&toml_path).unwrap().memory.working_memory_size, 7);

        let yaml_path = dir.path().join("recall.yaml");
        std::fs::write(&yaml_path, "embeddings:\n  eviction: lru\n").unwrap();
        assert_eq!(load_config(&yaml_path).unwrap().embeddings.eviction, Eviction::Lru);

        let json_path = dir.path().join("recall.json");
        std::fs::write(&json_path, r#"{"search":{"limit":5}}"#).unwrap();
        assert_eq!(load_config(&json_path).unwrap().search.limit, 5);
    }

    #[test]
    fn unresolved_placeholders_survive_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recall.toml");
        std::fs::write(
            &path,
            "[embeddings]\napi_key = \"${RECALL_UNSET_KEY_XYZ}\"\n",
        )
        .unwrap();
        assert_eq!(
            load_config(&path).unwrap().embeddings.api_key.as_deref(),
            Some("${RECALL_UNSET_KEY_XYZ}")
        );
    }

    #[test]
    fn unsupported_extension_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recall.ini");
        std::fs::write(&path, "x=1").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn explicit_path_errors_propagate() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(discover_and_load(Some(&missing)).is_err());

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[memory\n").unwrap();
        assert!(discover_and_load(Some(&bad)).is_err());
    }

    #[test]
    fn find_in_respects_filename_order() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_in(dir.path()).is_none());
        std::fs::write(dir.path().join("recall.json"), "{}").unwrap();
        std::fs::write(dir.path().join("recall.yaml"), "{}").unwrap();
        assert_eq!(find_in(dir.path()), Some(dir.path().join("recall.yaml")));
    }
}
