use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Scheduler(#[from] selfbot_scheduler::Error),

    #[error(transparent)]
    Plugins(#[from] selfbot_plugins::Error),

    #[error("transport {transport} failed to {action}: {reason}")]
    Transport {
        transport: String,
        action: &'static str,
        reason: String,
    },

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn transport(transport: &str, action: &'static str, err: &anyhow::Error) -> Self {
        Self::Transport {
            transport: transport.to_string(),
            action,
            reason: format!("{err:#}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
