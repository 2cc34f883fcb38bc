use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to load PDF: {0}")]
    Parse(String),

    #[error("Failed to save PDF: {0}")]
    Save(String),

    #[error("Image transcode failed: {0}")]
    Transcode(#[from] TranscodeError),

    #[error("Page rendering failed: {0}")]
    Render(String),

    #[error("Backend unavailable: {0}")]
    Backend(String),

    #[error("Target size must be a positive number of MB, got {0}")]
    InvalidTarget(f64),

    #[error("cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<lopdf::Error> for Error {
    fn from(e: lopdf::Error) -> Self {
        Error::Parse(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode JPEG: {0}")]
    Encode(String),

    #[error("Sample buffer of {actual} bytes does not match {width}x{height}x{channels}")]
    SampleLength {
        width: u32,
        height: u32,
        channels: u8,
        actual: usize,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
