//! Plugin manifests.
//!
//! A plugin directory carries one manifest, in the first format found:
//! ```text
//! # plugin.toml
//! name = "weather"
//! version = "1.2.0"
//! category = "tools"
//! requires = ["http"]
//!
//! [config]
//! city = "Tehran"
//!
//! [[commands]]
//! name = "weather"
//! usage = ".weather <city>"
//! ```

use std::path::{Component, Path, PathBuf};

use {
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

use crate::{Error, Result};

/// Manifest file names, in lookup order.
pub const MANIFEST_FILENAMES: &[&str] = &["plugin.toml", "plugin.yaml", "plugin.yml", "plugin.json"];

fn default_category() -> String {
    "general".into()
}

fn default_true() -> bool {
    true
}

/// A command a plugin exposes, as listed in its descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub usage: String,
    /// Handler name declared in the manifest. Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
}

/// Everything known about a plugin, persisted in the catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub name: String,
    pub version: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "dependencies")]
    pub requires: Vec<String>,
    /// Key into the compiled plugin registry. Defaults to `name`.
    #[serde(default)]
    pub module: String,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default = "default_true")]
    pub is_enabled: bool,
    #[serde(skip)]
    pub is_loaded: bool,
    #[serde(default)]
    pub commands: Vec<CommandInfo>,
    /// Directory the manifest was found in; `None` for built-in plugins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl PluginDescriptor {
    /// A minimal descriptor, for built-in plugins and tests.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            module: name.clone(),
            name,
            version: version.into(),
            category: default_category(),
            author: String::new(),
            description: String::new(),
            requires: Vec::new(),
            config: Map::new(),
            is_enabled: true,
            is_loaded: false,
            commands: Vec::new(),
            path: None,
        }
    }

    #[must_use]
    pub fn in_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    #[must_use]
    pub fn requiring(mut self, dependency: impl Into<String>) -> Self {
        self.requires.push(dependency.into());
        self
    }

    #[must_use]
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    #[must_use]
    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    fn normalize(mut self) -> Self {
        if self.module.is_empty() {
            self.module = self.name.clone();
        }
        if self.category.is_empty() {
            self.category = default_category();
        }
        self
    }
}

/// Locate the manifest inside `dir`.
pub fn find_manifest(dir: &Path) -> Option<PathBuf> {
    MANIFEST_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.is_file())
}

/// Read and validate a manifest file. `path` on the result is its directory.
pub fn load_manifest(path: &Path) -> Result<PluginDescriptor> {
    let content = std::fs::read_to_string(path)?;
    let mut descriptor = parse_manifest(&content, path)?;
    descriptor.path = path.parent().map(Path::to_path_buf);
    Ok(descriptor)
}

/// Parse manifest content; the format follows the file extension.
pub fn parse_manifest(content: &str, path: &Path) -> Result<PluginDescriptor> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("toml");

    let descriptor: PluginDescriptor = match ext {
        "toml" => toml::from_str(content).map_err(|e| Error::manifest(path, e.to_string()))?,
        "yaml" | "yml" => {
            serde_yaml::from_str(content).map_err(|e| Error::manifest(path, e.to_string()))?
        },
        "json" => serde_json::from_str(content).map_err(|e| Error::manifest(path, e.to_string()))?,
        other => return Err(Error::manifest(path, format!("unsupported format: {other}"))),
    };

    if descriptor.name.trim().is_empty() {
        return Err(Error::manifest(path, "name must not be empty"));
    }
    if descriptor.requires.iter().any(|d| d == &descriptor.name) {
        return Err(Error::manifest(path, "plugin cannot require itself"));
    }

    let descriptor = descriptor.normalize();
    for (field, value) in [("name", &descriptor.name), ("category", &descriptor.category)] {
        if !is_path_segment(value) {
            return Err(Error::manifest(
                path,
                format!("{field} must be a single directory name, got '{value}'"),
            ));
        }
    }
    Ok(descriptor)
}

/// Whether `value` is exactly one plain path component: no separators,
/// no `.` or `..`, no root or drive prefix.
fn is_path_segment(value: &str) -> bool {
    if value.is_empty() || value.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(value).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(c)), None) if c == value
    )
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    const TOML: &str = r#"
name = "weather"
version = "1.2.0"
category = "tools"
requires = ["http"]

[config]
city = "Tehran"

[[commands]]
name = "weather"
handler = "weather_cmd"
usage = ".weather <city>"
"#;

    #[test]
    fn parses_toml_manifest() {
        let d = parse_manifest(TOML, Path::new("/p/weather/plugin.toml")).unwrap();
        assert_eq!(d.name, "weather");
        assert_eq!(d.module, "weather");
        assert_eq!(d.category, "tools");
        assert_eq!(d.requires, vec!["http"]);
        assert_eq!(d.config["city"], "Tehran");
        assert_eq!(d.commands[0].usage, ".weather <city>");
        assert!(d.is_enabled);
        assert!(!d.is_loaded);
    }

    #[rstest]
    #[case("plugin.yaml", "name: notes\nversion: '0.1'\ndependencies: [db]\n")]
    #[case("plugin.yml", "name: notes\nversion: '0.1'\nrequires: [db]\n")]
    #[case("plugin.json", r#"{"name": "notes", "version": "0.1", "dependencies": ["db"]}"#)]
    fn parses_other_formats_and_alias(#[case] file: &str, #[case] content: &str) {
        let d = parse_manifest(content, &Path::new("/p/notes").join(file)).unwrap();
        assert_eq!(d.name, "notes");
        assert_eq!(d.category, "general");
        assert_eq!(d.requires, vec!["db"]);
    }

    #[rstest]
    #[case("version = \"1\"")]
    #[case("name = \"\"\nversion = \"1\"")]
    #[case("name = \"a/b\"\nversion = \"1\"")]
    #[case("name = \"..\"\nversion = \"1\"")]
    #[case("name = \".\"\nversion = \"1\"")]
    #[case("name = \"victim\"\nversion = \"1\"\ncategory = \"..\"")]
    #[case("name = \"victim\"\nversion = \"1\"\ncategory = \".\"")]
    #[case("name = \"victim\"\nversion = \"1\"\ncategory = \"a\\\\b\"")]
    #[case("name = \"loop\"\nversion = \"1\"\nrequires = [\"loop\"]")]
    #[case("not toml at all [")]
    fn rejects_bad_manifests(#[case] content: &str) {
        let err = parse_manifest(content, Path::new("/p/x/plugin.toml")).unwrap_err();
        assert!(matches!(err, Error::Manifest { .. }), "{err}");
    }

    #[test]
    fn runtime_state_is_not_persisted() {
        let mut d = PluginDescriptor::new("help", "1.0");
        d.is_loaded = true;
        let yaml = serde_yaml::to_string(&d).unwrap();
        assert!(!yaml.contains("is_loaded"));
        let back: PluginDescriptor = serde_yaml::from_str(&yaml).unwrap();
        assert!(!back.is_loaded);
    }

    #[test]
    fn find_manifest_prefers_toml() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("plugin.json"), "{}").unwrap();
        std::fs::write(tmp.path().join("plugin.toml"), "").unwrap();
        assert_eq!(find_manifest(tmp.path()), Some(tmp.path().join("plugin.toml")));
        assert_eq!(find_manifest(&tmp.path().join("missing")), None);
    }
}
