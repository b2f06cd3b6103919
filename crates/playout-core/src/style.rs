//! 视觉样式
//!
//! 颜色、边框、背景、混合模式以及文本对齐标志。

use serde::{Deserialize, Serialize};

use crate::dom::Element;

/// RGBA 颜色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// 归一化分量 (0.0..=1.0)
    pub fn to_f64(&self) -> [f64; 4] {
        [
            self.r as f64 / 255.0,
            self.g as f64 / 255.0,
            self.b as f64 / 255.0,
            self.a as f64 / 255.0,
        ]
    }

    /// 以 `red`/`green`/`blue`/`alpha` 属性写入元素
    pub fn write_attributes(&self, element: &mut Element) {
        element.set_attribute("red", self.r);
        element.set_attribute("green", self.g);
        element.set_attribute("blue", self.b);
        element.set_attribute("alpha", self.a);
    }

    /// 读取颜色属性，缺失分量取 0（alpha 取 255）
    pub fn read_attributes(element: &Element) -> Self {
        Self {
            r: element.attr_or("red", 0),
            g: element.attr_or("green", 0),
            b: element.attr_or("blue", 0),
            a: element.attr_or("alpha", 255),
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

/// 边框样式
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameStyle {
    pub enabled: bool,
    pub color: Color,
    /// 线宽（毫米）
    pub width: f64,
}

impl FrameStyle {
    /// 实际占用的线宽，未启用时为 0
    pub fn pen_width(&self) -> f64 {
        if self.enabled {
            self.width
        } else {
            0.0
        }
    }
}

impl Default for FrameStyle {
    fn default() -> Self {
        Self {
            enabled: false,
            color: Color::BLACK,
            width: 0.3,
        }
    }
}

/// 背景样式
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackgroundStyle {
    pub enabled: bool,
    pub color: Color,
}

impl Default for BackgroundStyle {
    fn default() -> Self {
        Self {
            enabled: true,
            color: Color::WHITE,
        }
    }
}

/// 图层混合模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BlendMode {
    #[default]
    Normal,
    Lighten,
    Screen,
    Dodge,
    Addition,
    Darken,
    Multiply,
    Burn,
    Overlay,
    SoftLight,
    HardLight,
    Difference,
    Subtract,
}

impl BlendMode {
    pub const ALL: [BlendMode; 13] = [
        BlendMode::Normal,
        BlendMode::Lighten,
        BlendMode::Screen,
        BlendMode::Dodge,
        BlendMode::Addition,
        BlendMode::Darken,
        BlendMode::Multiply,
        BlendMode::Burn,
        BlendMode::Overlay,
        BlendMode::SoftLight,
        BlendMode::HardLight,
        BlendMode::Difference,
        BlendMode::Subtract,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BlendMode::Normal => "normal",
            BlendMode::Lighten => "lighten",
            BlendMode::Screen => "screen",
            BlendMode::Dodge => "dodge",
            BlendMode::Addition => "addition",
            BlendMode::Darken => "darken",
            BlendMode::Multiply => "multiply",
            BlendMode::Burn => "burn",
            BlendMode::Overlay => "overlay",
            BlendMode::SoftLight => "soft light",
            BlendMode::HardLight => "hard light",
            BlendMode::Difference => "difference",
            BlendMode::Subtract => "subtract",
        }
    }

    /// 按名称解析（忽略大小写与首尾空白）
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        Self::ALL.iter().copied().find(|m| m.name() == name)
    }

    pub fn code(&self) -> u8 {
        Self::ALL.iter().position(|m| m == self).unwrap_or(0) as u8
    }

    pub fn from_code(code: u8) -> Self {
        Self::ALL.get(code as usize).copied().unwrap_or_default()
    }
}

/// 水平对齐（数值与文档片段中的对齐码一致）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HAlign {
    #[default]
    Left,
    Right,
    Center,
    Justify,
}

impl HAlign {
    pub fn code(&self) -> u32 {
        match self {
            HAlign::Left => 1,
            HAlign::Right => 2,
            HAlign::Center => 4,
            HAlign::Justify => 8,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(HAlign::Left),
            2 => Some(HAlign::Right),
            4 => Some(HAlign::Center),
            8 => Some(HAlign::Justify),
            _ => None,
        }
    }
}

/// 垂直对齐
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VAlign {
    #[default]
    Top,
    Bottom,
    Center,
}

impl VAlign {
    pub fn code(&self) -> u32 {
        match self {
            VAlign::Top => 32,
            VAlign::Bottom => 64,
            VAlign::Center => 128,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            32 => Some(VAlign::Top),
            64 => Some(VAlign::Bottom),
            128 => Some(VAlign::Center),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_codes() {
        for h in [HAlign::Left, HAlign::Right, HAlign::Center, HAlign::Justify] {
            assert_eq!(HAlign::from_code(h.code()), Some(h));
        }
        for v in [VAlign::Top, VAlign::Bottom, VAlign::Center] {
            assert_eq!(VAlign::from_code(v.code()), Some(v));
        }
        assert_eq!(HAlign::from_code(3), None);
    }

    #[test]
    fn test_blend_mode_names() {
        assert_eq!(BlendMode::from_name(" Multiply "), Some(BlendMode::Multiply));
        assert_eq!(BlendMode::from_name("soft light"), Some(BlendMode::SoftLight));
        assert_eq!(BlendMode::from_name("nonsense"), None);
        assert_eq!(BlendMode::from_code(BlendMode::Overlay.code()), BlendMode::Overlay);
    }

    #[test]
    fn test_color_attributes() {
        let mut e = Element::new("FontColor");
        Color::rgb(10, 20, 30).write_attributes(&mut e);
        assert_eq!(Color::read_attributes(&e), Color::rgb(10, 20, 30));
        assert_eq!(Color::read_attributes(&Element::new("x")), Color::BLACK);
    }

    #[test]
    fn test_frame_pen_width() {
        let mut frame = FrameStyle::default();
        assert_eq!(frame.pen_width(), 0.0);
        frame.enabled = true;
        assert_eq!(frame.pen_width(), 0.3);
    }
}
