//! 场景配置
//!
//! 构造 [`Composition`](crate::composition::Composition) 时显式传入，
//! 不读取任何全局设置。

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::item::FontDescription;
use crate::page::PageLayout;
use crate::snap::SnapSettings;

/// 场景配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositionConfig {
    /// 新建标签等使用的默认字体
    pub default_font: FontDescription,
    /// 新建标签是否绘制背景
    pub label_background: bool,
    pub page: PageLayout,
    /// 打印分辨率（DPI）
    pub print_resolution: u32,
    /// 启用透明度与混合模式等高级效果
    pub use_advanced_effects: bool,
    pub snap: SnapSettings,
    /// 富内容加载等待上限（毫秒）
    pub content_timeout_ms: u64,
    /// 单页栅格输出的最大字节数
    pub max_raster_bytes: u64,
}

impl Default for CompositionConfig {
    fn default() -> Self {
        Self {
            default_font: FontDescription::new("Sans", 10.0),
            label_background: false,
            page: PageLayout::default(),
            print_resolution: 300,
            use_advanced_effects: true,
            snap: SnapSettings::default(),
            content_timeout_ms: 20_000,
            max_raster_bytes: 512 * 1024 * 1024,
        }
    }
}

impl CompositionConfig {
    pub fn content_timeout(&self) -> Duration {
        Duration::from_millis(self.content_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompositionConfig::default();
        assert_eq!(config.default_font.point_size, 10.0);
        assert!(!config.label_background);
        assert_eq!(config.page.num_pages, 1);
        assert_eq!(config.content_timeout(), Duration::from_secs(20));
        assert_eq!(config.snap.tolerance_px, 5.0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: CompositionConfig =
            serde_json::from_str(r#"{ "print_resolution": 150, "page": { "width": 210, "height": 297, "spacing": 5, "num_pages": 2 } }"#)
                .unwrap();
        assert_eq!(config.print_resolution, 150);
        assert_eq!(config.page.num_pages, 2);
        assert_eq!(config.max_raster_bytes, 512 * 1024 * 1024);
        assert!(config.use_advanced_effects);
    }
}
