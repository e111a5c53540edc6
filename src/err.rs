#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("buffer holds fewer bytes than the packet it claims to contain")]
    ShortBuffer,

    #[error("decoded header has an invalid flag combination: {0:#x}")]
    InvalidFlags(u8),

    #[error("invalid address: {0}")]
    InvalidAddr(String),
}

pub type Result<T> = std::result::Result<T, Error>;
