use {thiserror::Error, wicket_protocol::ParseError};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid charset: {0}")]
    Charset(#[from] ParseError),

    #[error("gave up after {retries} failed connection attempts")]
    RetriesExhausted { retries: u32 },
}
