use thiserror::Error;

#[derive(Debug, Error)]
pub enum LeerError {
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("{0}")]
    Cli(String),
    #[error("process error: {0}")]
    Process(String),
    #[error("terminal error: {0}")]
    Terminal(String),
}
