//! PLayout 文件处理
//!
//! 支持：
//! - `.qpt` 版面模板读写
//! - JSON 场景配置
//! - JSON 图集覆盖数据

pub mod atlas;
pub mod config;
pub mod error;
pub mod template;

pub use atlas::{load_coverage, save_coverage};
pub use config::{load_config, save_config};
pub use error::FileError;
pub use template::{load_layout, load_template, read_template_text, save_template, TEMPLATE_EXTENSION};
