use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A credential required for sync is absent or blank.
    #[display("missing credential: {_0}")]
    MissingCredential(#[error(not(source))] &'static str),
    /// The settings sources could not be read or merged.
    #[display("invalid settings: {_0}")]
    Invalid(#[error(not(source))] String),
    /// No home directory to derive default locations from.
    #[display("could not determine the configuration directory")]
    NoConfigDirectory,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        false
    }
}
