//! 核心错误定义

use thiserror::Error;

use crate::item::ItemId;
use crate::multiframe::MultiFrameId;

/// 撤销命令记录错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("a command is already being recorded on this stream")]
    AlreadyRecording,

    #[error("no command is being recorded on this stream")]
    NotRecording,

    #[error("item {0:?} does not exist")]
    UnknownItem(ItemId),

    #[error("multi-frame {0:?} does not exist")]
    UnknownMultiFrame(MultiFrameId),
}

/// 文档片段读写错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum XmlError {
    #[error("XML parse error: {0}")]
    Parse(String),

    #[error("missing element <{0}>")]
    MissingElement(String),

    #[error("missing attribute '{attribute}' on <{element}>")]
    MissingAttribute { element: String, attribute: String },

    #[error("invalid value '{value}' for attribute '{attribute}'")]
    InvalidAttribute { attribute: String, value: String },

    #[error("unsupported document version: {0}")]
    UnsupportedVersion(String),
}

/// 渲染/导出错误
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("output device error: {0}")]
    Device(String),

    #[error("page {page} out of range (composition has {num_pages} pages)")]
    InvalidPage { page: usize, num_pages: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 表达式编译/求值错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("cannot parse expression '{expression}': {message}")]
    Parse { expression: String, message: String },

    #[error("expression evaluation failed: {0}")]
    Eval(String),
}
