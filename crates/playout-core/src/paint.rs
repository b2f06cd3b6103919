//! 绘制接口
//!
//! 图元只通过 [`Painter`] 绘制自身，具体输出设备（栅格、PDF、显示列表）
//! 在 playout-render 中实现。坐标单位为毫米，变换作用于局部坐标。

use serde::Serialize;

use crate::content::RichContent;
use crate::item::FontDescription;
use crate::math::{Point2, Rect, Transform2D};
use crate::style::{BlendMode, Color, HAlign, VAlign};

/// 文本样式
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextStyle {
    pub font: FontDescription,
    pub color: Color,
    pub halign: HAlign,
    pub valign: VAlign,
}

impl TextStyle {
    pub fn new(font: FontDescription) -> Self {
        Self {
            font,
            color: Color::BLACK,
            halign: HAlign::Left,
            valign: VAlign::Top,
        }
    }

    pub fn aligned(mut self, halign: HAlign, valign: VAlign) -> Self {
        self.halign = halign;
        self.valign = valign;
        self
    }
}

/// 画笔
pub trait Painter {
    fn save(&mut self);
    fn restore(&mut self);
    fn translate(&mut self, dx: f64, dy: f64);
    /// 顺时针旋转，单位：度
    fn rotate(&mut self, degrees: f64);
    fn scale(&mut self, sx: f64, sy: f64);
    /// 不透明度 (0.0..=1.0)，与已保存状态相乘
    fn set_opacity(&mut self, opacity: f64);
    fn set_blend_mode(&mut self, mode: BlendMode);

    fn fill_rect(&mut self, rect: Rect, color: Color);
    fn stroke_rect(&mut self, rect: Rect, color: Color, width: f64);
    fn draw_line(&mut self, from: Point2, to: Point2, color: Color, width: f64);
    fn fill_polygon(&mut self, points: &[Point2], color: Color);
    fn draw_ellipse(&mut self, rect: Rect, fill: Option<Color>, stroke: Option<(Color, f64)>);
    fn draw_text(&mut self, rect: Rect, text: &str, style: &TextStyle);
    fn draw_rich_text(&mut self, rect: Rect, content: &RichContent);
}

/// 图元绘制时由场景提供的上下文
#[derive(Debug, Clone, Copy, Default)]
pub struct ItemPaintContext<'a> {
    /// 展开后的标签文本
    pub display_text: Option<&'a str>,
    /// 已加载的富内容（HTML 标签、多帧）
    pub rich_content: Option<&'a RichContent>,
}

/// 画笔状态栈：变换、不透明度与混合模式
///
/// 输出设备用它维护 save/restore 语义。
#[derive(Debug, Clone)]
pub struct PainterState {
    pub transform: Transform2D,
    pub opacity: f64,
    pub blend_mode: BlendMode,
    stack: Vec<(Transform2D, f64, BlendMode)>,
}

impl PainterState {
    pub fn new(base: Transform2D) -> Self {
        Self {
            transform: base,
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            stack: Vec::new(),
        }
    }

    pub fn save(&mut self) {
        self.stack.push((self.transform, self.opacity, self.blend_mode));
    }

    /// 多余的 restore 被忽略
    pub fn restore(&mut self) {
        if let Some((transform, opacity, blend_mode)) = self.stack.pop() {
            self.transform = transform;
            self.opacity = opacity;
            self.blend_mode = blend_mode;
        }
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.transform = self.transform.translate(dx, dy);
    }

    pub fn rotate(&mut self, degrees: f64) {
        self.transform = self.transform.rotate(degrees);
    }

    pub fn scale(&mut self, sx: f64, sy: f64) {
        self.transform = self.transform.scale(sx, sy);
    }

    pub fn set_opacity(&mut self, opacity: f64) {
        let base = self.stack.last().map(|s| s.1).unwrap_or(1.0);
        self.opacity = base * opacity.clamp(0.0, 1.0);
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

impl Default for PainterState {
    fn default() -> Self {
        Self::new(Transform2D::identity())
    }
}

/// 显示列表中的一条绘制指令
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PaintCommand {
    Save,
    Restore,
    Translate { dx: f64, dy: f64 },
    Rotate { degrees: f64 },
    Scale { sx: f64, sy: f64 },
    Opacity { opacity: f64 },
    Blend { mode: BlendMode },
    FillRect { rect: Rect, color: Color },
    StrokeRect { rect: Rect, color: Color, width: f64 },
    Line { from: Point2, to: Point2, color: Color, width: f64 },
    Polygon { points: Vec<Point2>, color: Color },
    Ellipse { rect: Rect, fill: Option<Color>, stroke: Option<(Color, f64)> },
    Text { rect: Rect, text: String, style: TextStyle },
    RichText { rect: Rect, content: RichContent },
}

/// 记录绘制指令的画笔
#[derive(Debug, Clone, Default, Serialize)]
pub struct DisplayList {
    pub commands: Vec<PaintCommand>,
}

impl DisplayList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// 所有绘制的文本（按顺序）
    pub fn texts(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                PaintCommand::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// 重放到另一个画笔
    pub fn replay(&self, painter: &mut dyn Painter) {
        for command in &self.commands {
            match command {
                PaintCommand::Save => painter.save(),
                PaintCommand::Restore => painter.restore(),
                PaintCommand::Translate { dx, dy } => painter.translate(*dx, *dy),
                PaintCommand::Rotate { degrees } => painter.rotate(*degrees),
                PaintCommand::Scale { sx, sy } => painter.scale(*sx, *sy),
                PaintCommand::Opacity { opacity } => painter.set_opacity(*opacity),
                PaintCommand::Blend { mode } => painter.set_blend_mode(*mode),
                PaintCommand::FillRect { rect, color } => painter.fill_rect(*rect, *color),
                PaintCommand::StrokeRect { rect, color, width } => painter.stroke_rect(*rect, *color, *width),
                PaintCommand::Line { from, to, color, width } => painter.draw_line(*from, *to, *color, *width),
                PaintCommand::Polygon { points, color } => painter.fill_polygon(points, *color),
                PaintCommand::Ellipse { rect, fill, stroke } => painter.draw_ellipse(*rect, *fill, *stroke),
                PaintCommand::Text { rect, text, style } => painter.draw_text(*rect, text, style),
                PaintCommand::RichText { rect, content } => painter.draw_rich_text(*rect, content),
            }
        }
    }
}

impl Painter for DisplayList {
    fn save(&mut self) {
        self.commands.push(PaintCommand::Save);
    }

    fn restore(&mut self) {
        self.commands.push(PaintCommand::Restore);
    }

    fn translate(&mut self, dx: f64, dy: f64) {
        self.commands.push(PaintCommand::Translate { dx, dy });
    }

    fn rotate(&mut self, degrees: f64) {
        self.commands.push(PaintCommand::Rotate { degrees });
    }

    fn scale(&mut self, sx: f64, sy: f64) {
        self.commands.push(PaintCommand::Scale { sx, sy });
    }

    fn set_opacity(&mut self, opacity: f64) {
        self.commands.push(PaintCommand::Opacity { opacity });
    }

    fn set_blend_mode(&mut self, mode: BlendMode) {
        self.commands.push(PaintCommand::Blend { mode });
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        self.commands.push(PaintCommand::FillRect { rect, color });
    }

    fn stroke_rect(&mut self, rect: Rect, color: Color, width: f64) {
        self.commands.push(PaintCommand::StrokeRect { rect, color, width });
    }

    fn draw_line(&mut self, from: Point2, to: Point2, color: Color, width: f64) {
        self.commands.push(PaintCommand::Line { from, to, color, width });
    }

    fn fill_polygon(&mut self, points: &[Point2], color: Color) {
        self.commands.push(PaintCommand::Polygon {
            points: points.to_vec(),
            color,
        });
    }

    fn draw_ellipse(&mut self, rect: Rect, fill: Option<Color>, stroke: Option<(Color, f64)>) {
        self.commands.push(PaintCommand::Ellipse { rect, fill, stroke });
    }

    fn draw_text(&mut self, rect: Rect, text: &str, style: &TextStyle) {
        self.commands.push(PaintCommand::Text {
            rect,
            text: text.to_string(),
            style: style.clone(),
        });
    }

    fn draw_rich_text(&mut self, rect: Rect, content: &RichContent) {
        self.commands.push(PaintCommand::RichText {
            rect,
            content: content.clone(),
        });
    }
}
