use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "manifest not found. Looked in:\n\
        - the TOKENFLOW_MANIFEST environment variable\n\
        - current directory: tokens.local.yaml, tokens.yaml, tokens.yml\n\
        - ./.tokenflow/ directory\n\
        - ~/.config/tokenflow/tokens.yaml"
    )]
    ManifestNotFound,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
