//! 文件操作错误定义

use playout_core::error::XmlError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(XmlError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported version: {0}")]
    UnsupportedVersion(String),
}

impl From<XmlError> for FileError {
    fn from(e: XmlError) -> Self {
        match e {
            XmlError::UnsupportedVersion(version) => FileError::UnsupportedVersion(version),
            other => FileError::Xml(other),
        }
    }
}
