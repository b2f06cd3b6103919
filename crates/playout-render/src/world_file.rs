//! 世界文件
//!
//! 六行文本，顺序为 a、d、b、e、c、f（像素尺寸、旋转项、左上角像素中心坐标）。

use std::fs;
use std::path::{Path, PathBuf};

use playout_core::composition::WorldFileParameters;

use crate::error::OutputError;

/// 生成世界文件内容
pub fn world_file_contents(params: &WorldFileParameters) -> String {
    let [a, b, c, d, e, f] = *params;
    [a, d, b, e, c, f]
        .iter()
        .map(|v| format!("{:.10}\n", v))
        .collect()
}

/// 图像对应的世界文件路径
///
/// 扩展名取图像扩展名的首尾字符加 `w`（`png` → `pgw`），无扩展名时用 `wld`。
pub fn world_file_path(image_path: &Path) -> PathBuf {
    let ext = image_path
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.chars().count() >= 2);
    let world_ext = match ext {
        Some(ext) => {
            let mut chars = ext.chars();
            let first = chars.next().unwrap_or('w');
            let last = chars.last().unwrap_or('w');
            format!("{}{}w", first, last)
        }
        None => "wld".to_string(),
    };
    image_path.with_extension(world_ext)
}

pub fn write_world_file(path: &Path, params: &WorldFileParameters) -> Result<(), OutputError> {
    fs::write(path, world_file_contents(params))?;
    tracing::info!("Wrote world file {}", path.display());
    Ok(())
}
