//! Plugin discovery from filesystem roots.
//!
//! A plugin lives at `<root>/<plugin>/` or `<root>/<category>/<plugin>/` and is
//! recognized by its manifest file. Roots are scanned in order; the first
//! plugin seen under a given name wins.

use std::{collections::HashSet, path::PathBuf};

use {
    tracing::{debug, warn},
    walkdir::WalkDir,
};

use crate::manifest::{MANIFEST_FILENAMES, PluginDescriptor, load_manifest};

/// Scan `roots` and return every valid plugin manifest found.
///
/// Missing roots are skipped. Malformed manifests are logged and skipped.
pub fn discover_plugins(roots: &[PathBuf]) -> Vec<PluginDescriptor> {
    let mut found = Vec::new();
    let mut seen = HashSet::new();

    for root in roots {
        if !root.is_dir() {
            debug!(root = %root.display(), "plugin root missing, skipping");
            continue;
        }

        let mut manifests: Vec<PathBuf> = WalkDir::new(root)
            .min_depth(2)
            .max_depth(3)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|n| MANIFEST_FILENAMES.contains(&n))
            })
            .map(|entry| entry.into_path())
            .collect();
        // One manifest per directory, by format precedence.
        manifests.sort_by_key(|p| {
            let rank = p
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| MANIFEST_FILENAMES.iter().position(|m| *m == n))
                .unwrap_or(usize::MAX);
            (p.parent().map(PathBuf::from), rank)
        });
        manifests.dedup_by(|a, b| a.parent() == b.parent());

        // A flat plugin's own subdirectories are part of it, not plugins.
        let plugin_dirs: HashSet<PathBuf> = manifests
            .iter()
            .filter_map(|p| p.parent().map(PathBuf::from))
            .collect();
        manifests.retain(|p| {
            let nested = p
                .parent()
                .and_then(|dir| dir.parent())
                .is_some_and(|above| above != root.as_path() && plugin_dirs.contains(above));
            if nested {
                debug!(path = %p.display(), "ignoring manifest inside another plugin");
            }
            !nested
        });

        for path in manifests {
            match load_manifest(&path) {
                Ok(descriptor) => {
                    if !seen.insert(descriptor.name.clone()) {
                        warn!(
                            plugin = %descriptor.name,
                            path = %path.display(),
                            "duplicate plugin name, keeping the first"
                        );
                        continue;
                    }
                    debug!(plugin = %descriptor.name, path = %path.display(), "plugin discovered");
                    found.push(descriptor);
                },
                Err(e) => warn!(path = %path.display(), error = %e, "skipping invalid plugin manifest"),
            }
        }
    }

    found
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::path::Path, tempfile::TempDir};

    fn write(dir: &Path, file: &str, content: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(file), content).unwrap();
    }

    #[test]
    fn finds_flat_and_categorized_plugins() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("plugins");
        write(&root.join("notes"), "plugin.toml", "name = \"notes\"\nversion = \"1\"");
        write(
            &root.join("tools").join("weather"),
            "plugin.yaml",
            "name: weather\nversion: '2'\ncategory: tools\n",
        );

        let found = discover_plugins(&[root.clone()]);
        let names: Vec<&str> = found.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["notes", "weather"]);
        assert_eq!(found[1].path.as_deref(), Some(root.join("tools/weather").as_path()));
    }

    #[test]
    fn skips_missing_roots_and_bad_manifests() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().to_path_buf();
        write(&root.join("broken"), "plugin.json", "{nope");
        write(&root.join("readme-only"), "README.md", "hello");
        write(&root.join("ok"), "plugin.json", r#"{"name": "ok", "version": "1"}"#);

        let found = discover_plugins(&[PathBuf::from("/nonexistent/plugins"), root]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "ok");
    }

    #[test]
    fn first_root_wins_on_duplicate_names() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        write(&a.join("dup"), "plugin.toml", "name = \"dup\"\nversion = \"1\"");
        write(&b.join("dup"), "plugin.toml", "name = \"dup\"\nversion = \"2\"");

        let found = discover_plugins(&[a, b]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].version, "1");
    }

    #[test]
    fn manifests_inside_a_flat_plugin_are_not_plugins() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("plugins");
        let notes = root.join("notes");
        write(&notes, "plugin.toml", "name = \"notes\"\nversion = \"1\"");
        write(
            &notes.join("samples"),
            "plugin.json",
            r#"{"name": "sample", "version": "1"}"#,
        );
        write(
            &root.join("tools").join("weather"),
            "plugin.toml",
            "name = \"weather\"\nversion = \"1\"",
        );

        let found = discover_plugins(&[root]);
        let names: Vec<&str> = found.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["notes", "weather"]);
    }

    #[test]
    fn one_manifest_per_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("multi");
        write(&dir, "plugin.json", r#"{"name": "from-json", "version": "1"}"#);
        write(&dir, "plugin.toml", "name = \"from-toml\"\nversion = \"1\"");

        let found = discover_plugins(&[tmp.path().to_path_buf()]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "from-toml");
    }
}
