//! 页面布局
//!
//! 所有页面尺寸相同，自上而下排列，页间距固定：
//!
//! ```text
//! 第 n 页顶边 = n * (页高 + 间距)
//! ```

use serde::{Deserialize, Serialize};

use crate::math::{Point2, Rect};

/// 纸张方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaperOrientation {
    Portrait,
    Landscape,
}

impl PaperOrientation {
    /// 解析 "portrait" / "landscape"（忽略大小写与首尾空白）
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "portrait" => Some(PaperOrientation::Portrait),
            "landscape" => Some(PaperOrientation::Landscape),
            _ => None,
        }
    }

    /// 按方向调整宽高
    pub fn apply(&self, width: f64, height: f64) -> (f64, f64) {
        let (short, long) = if width <= height { (width, height) } else { (height, width) };
        match self {
            PaperOrientation::Portrait => (short, long),
            PaperOrientation::Landscape => (long, short),
        }
    }
}

/// 预设纸张，尺寸为纵向（宽, 高）毫米
const PAPER_PRESETS: &[(&str, f64, f64)] = &[
    ("A6", 105.0, 148.0),
    ("A5", 148.0, 210.0),
    ("A4", 210.0, 297.0),
    ("A3", 297.0, 420.0),
    ("A2", 420.0, 594.0),
    ("A1", 594.0, 841.0),
    ("A0", 841.0, 1189.0),
    ("B6", 125.0, 176.0),
    ("B5", 176.0, 250.0),
    ("B4", 250.0, 353.0),
    ("B3", 353.0, 500.0),
    ("B2", 500.0, 707.0),
    ("B1", 707.0, 1000.0),
    ("B0", 1000.0, 1414.0),
    ("Legal", 215.9, 355.6),
    ("Letter", 215.9, 279.4),
    ("ANSI A", 215.9, 279.4),
    ("ANSI B", 279.4, 431.8),
    ("ANSI C", 431.8, 558.8),
    ("ANSI D", 558.8, 863.6),
    ("ANSI E", 863.6, 1117.6),
    ("Arch A", 228.6, 304.8),
    ("Arch B", 304.8, 457.2),
    ("Arch C", 457.2, 609.6),
    ("Arch D", 609.6, 914.4),
    ("Arch E", 914.4, 1219.2),
    ("Arch E1", 762.0, 1066.8),
];

/// 按名称（忽略大小写）查找预设纸张的纵向尺寸
pub fn paper_size_for_preset(name: &str) -> Option<(f64, f64)> {
    let name = name.trim();
    PAPER_PRESETS
        .iter()
        .find(|(preset, _, _)| preset.eq_ignore_ascii_case(name))
        .map(|(_, w, h)| (*w, *h))
}

/// 页面布局参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageLayout {
    pub width: f64,
    pub height: f64,
    /// 页间距（毫米）
    pub spacing: f64,
    pub num_pages: usize,
}

impl Default for PageLayout {
    fn default() -> Self {
        Self {
            width: 297.0,
            height: 210.0,
            spacing: 10.0,
            num_pages: 1,
        }
    }
}

impl PageLayout {
    pub fn new(width: f64, height: f64, spacing: f64, num_pages: usize) -> Self {
        Self {
            width,
            height,
            spacing,
            num_pages: num_pages.max(1),
        }
    }

    /// 页面步长：页高 + 间距
    pub fn page_stride(&self) -> f64 {
        self.height + self.spacing
    }

    /// 第 `page` 页（从 0 开始）顶边的场景 Y
    pub fn page_top(&self, page: usize) -> f64 {
        page as f64 * self.page_stride()
    }

    /// 第 `page` 页的场景矩形
    pub fn page_rect(&self, page: usize) -> Rect {
        Rect::new(0.0, self.page_top(page), self.width, self.height)
    }

    pub fn page_rects(&self) -> Vec<Rect> {
        (0..self.num_pages).map(|p| self.page_rect(p)).collect()
    }

    /// 场景中所有页面（含页间距）的总高度
    pub fn total_height(&self) -> f64 {
        self.num_pages as f64 * self.page_stride() - self.spacing
    }

    /// 未截断的页码：floor(y / 步长)
    fn raw_page_index(&self, y: f64) -> i64 {
        let stride = self.page_stride();
        if stride <= 0.0 {
            return 0;
        }
        (y / stride).floor() as i64
    }

    /// 场景坐标 → 页面局部坐标
    ///
    /// 页码不做截断，页面范围外的点也按同一公式换算。
    pub fn position_on_page(&self, point: Point2) -> Point2 {
        let page = self.raw_page_index(point.y);
        Point2::new(point.x, point.y - page as f64 * self.page_stride())
    }

    /// 点所在页码，截断到 [0, 页数-1]
    pub fn page_number_for_point(&self, point: Point2) -> usize {
        let last = self.num_pages.saturating_sub(1) as i64;
        self.raw_page_index(point.y).clamp(0, last) as usize
    }

    /// 点是否落在某个页面上（不含页间距），返回页码
    pub fn page_at(&self, point: Point2) -> Option<usize> {
        (0..self.num_pages).find(|p| self.page_rect(*p).contains(&point))
    }

    /// 页面局部坐标 → 场景坐标
    pub fn scene_position(&self, page: usize, local: Point2) -> Point2 {
        Point2::new(local.x, local.y + self.page_top(page))
    }
}
