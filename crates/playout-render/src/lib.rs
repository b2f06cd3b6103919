//! PLayout 输出设备
//!
//! 支持：
//! - 软件栅格画布 [`RgbaImage`]，可保存为 PNG
//! - 分页 PDF 设备 [`PdfDevice`]
//! - 世界文件（`.pgw` 等）写出

pub mod error;
pub mod layout;
pub mod pdf;
pub mod raster;
pub mod world_file;

pub use error::OutputError;
pub use pdf::PdfDevice;
pub use raster::RgbaImage;
pub use world_file::{world_file_contents, world_file_path, write_world_file};
