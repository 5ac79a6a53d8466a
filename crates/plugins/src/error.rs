use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    #[error("invalid plugin manifest at {path}: {reason}")]
    Manifest { path: PathBuf, reason: String },

    #[error("unknown plugin: {name}")]
    UnknownPlugin { name: String },

    #[error("plugin {name} is disabled")]
    Disabled { name: String },

    #[error("plugin {plugin} names module {module}, which is not compiled in")]
    UnknownModule { plugin: String, module: String },

    #[error("plugin {plugin} requires {dependency}, which is {reason}")]
    Dependency {
        plugin: String,
        dependency: String,
        reason: String,
    },

    #[error("plugin {plugin} failed to initialize: {reason}")]
    Initialize { plugin: String, reason: String },

    #[error("{message}")]
    Message { message: String },

    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn manifest(path: &Path, reason: impl Into<String>) -> Self {
        Self::Manifest {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn unknown_plugin(name: impl Into<String>) -> Self {
        Self::UnknownPlugin { name: name.into() }
    }

    #[must_use]
    pub fn dependency(
        plugin: impl Into<String>,
        dependency: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Dependency {
            plugin: plugin.into(),
            dependency: dependency.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn initialize(plugin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Initialize {
            plugin: plugin.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

impl selfbot_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

selfbot_common::impl_context!();
