use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "No configuration file found. Looked in:\n\
        - $SKYBRIDGE_CONFIG\n\
        - ./skybridge.yaml\n\
        - ./.skybridge/skybridge.yaml\n\
        - ~/.config/skybridge/skybridge.yaml"
    )]
    ConfigFileNotFound,

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
