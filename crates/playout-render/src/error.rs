//! 输出错误定义

use playout_core::error::RenderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PNG encode error: {0}")]
    Png(#[from] png::EncodingError),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("No page in progress")]
    NoPage,

    #[error("Document already finished")]
    Finished,
}

impl From<OutputError> for RenderError {
    fn from(e: OutputError) -> Self {
        match e {
            OutputError::Io(e) => RenderError::Io(e),
            other => RenderError::Device(other.to_string()),
        }
    }
}
