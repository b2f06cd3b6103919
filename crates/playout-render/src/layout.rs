//! 文本行排布
//!
//! 栅格设备与 PDF 设备共用的简单排版：按换行拆分，
//! 用近似字宽计算每行的矩形，再按对齐方式放入目标区域。

use playout_core::item::{ApproximateTextMetrics, TextMetrics};
use playout_core::math::Rect;
use playout_core::paint::TextStyle;
use playout_core::style::{HAlign, VAlign};

/// 一行文本及其占位矩形（局部坐标，毫米）
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine<'a> {
    pub text: &'a str,
    pub rect: Rect,
}

/// 按样式排布 `text` 中的各行
pub fn layout_lines<'a>(rect: Rect, text: &'a str, style: &TextStyle) -> Vec<TextLine<'a>> {
    let metrics = ApproximateTextMetrics;
    let line_height = metrics.font_height_mm(&style.font);
    let lines: Vec<&str> = text.lines().collect();
    let total = line_height * lines.len() as f64;

    let top = match style.valign {
        VAlign::Top => rect.y,
        VAlign::Bottom => rect.bottom() - total,
        VAlign::Center => rect.y + (rect.height - total) / 2.0,
    };

    lines
        .into_iter()
        .enumerate()
        .map(|(i, line)| {
            let width = metrics.text_width_mm(&style.font, line).min(rect.width);
            let x = match style.halign {
                HAlign::Left | HAlign::Justify => rect.x,
                HAlign::Right => rect.right() - width,
                HAlign::Center => rect.x + (rect.width - width) / 2.0,
            };
            TextLine {
                text: line,
                rect: Rect::new(x, top + i as f64 * line_height, width, line_height),
            }
        })
        .collect()
}
