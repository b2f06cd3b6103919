//! 软件栅格画布
//!
//! 基于 tiny-skia 的抗锯齿画布。文本以灰条示意（greeking），
//! 精确字形由 PDF 输出负责。

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use playout_core::composition::RasterSurface;
use playout_core::content::RichContent;
use playout_core::dom::plain_text;
use playout_core::math::{Point2, Rect, Transform2D};
use playout_core::paint::{Painter, PainterState, TextStyle};
use playout_core::style::{BlendMode, Color};
use tiny_skia::{FillRule, IntSize, Paint, Path as SkPath, PathBuilder, Pixmap, Stroke, Transform};

use crate::error::OutputError;
use crate::layout::layout_lines;

/// 文本示意条高度占行高的比例
const GREEK_BAR_RATIO: f64 = 0.5;

/// RGBA8 图像（内部为预乘像素）
#[derive(Debug, Clone)]
pub struct RgbaImage {
    pixmap: Pixmap,
    state: PainterState,
}

impl RgbaImage {
    /// 创建全透明图像，尺寸为零或过大时返回 None
    pub fn new(width: u32, height: u32) -> Option<Self> {
        Some(Self {
            pixmap: Pixmap::new(width, height)?,
            state: PainterState::default(),
        })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// 行优先 RGBA，非预乘
    pub fn pixels(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.pixmap.data().len());
        for px in self.pixmap.pixels() {
            let c = px.demultiply();
            data.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
        }
        data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        let c = self.pixmap.pixel(x, y)?.demultiply();
        Some(Color::rgba(c.red(), c.green(), c.blue(), c.alpha()))
    }

    /// 用单色覆盖整幅图像
    pub fn clear(&mut self, color: Color) {
        self.pixmap
            .fill(tiny_skia::Color::from_rgba8(color.r, color.g, color.b, color.a));
    }

    /// 编码为 PNG；给出 `dpi` 时写入 pHYs 块
    pub fn encode_png<W: Write>(&self, writer: W, dpi: Option<u32>) -> Result<(), OutputError> {
        let mut encoder = png::Encoder::new(writer, self.width(), self.height());
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        if let Some(dpi) = dpi {
            let ppm = (dpi as f64 / 0.0254).round() as u32;
            encoder.set_pixel_dims(Some(png::PixelDimensions {
                xppu: ppm,
                yppu: ppm,
                unit: png::Unit::Meter,
            }));
        }
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&self.pixels())?;
        writer.finish()?;
        Ok(())
    }

    pub fn save_png(&self, path: &Path, dpi: Option<u32>) -> Result<(), OutputError> {
        let file = File::create(path)?;
        self.encode_png(BufWriter::new(file), dpi)?;

        tracing::info!("Saved {}x{} px image to {}", self.width(), self.height(), path.display());
        Ok(())
    }

    fn paint(&self, color: Color) -> Paint<'static> {
        let mut c = tiny_skia::Color::from_rgba8(color.r, color.g, color.b, color.a);
        c.apply_opacity(self.state.opacity as f32);

        let mut paint = Paint::default();
        paint.set_color(c);
        paint.anti_alias = true;
        paint.blend_mode = sk_blend_mode(self.state.blend_mode);
        paint
    }

    fn transform(&self) -> Transform {
        sk_transform(&self.state.transform)
    }

    fn fill_path(&mut self, path: &SkPath, color: Color) {
        let paint = self.paint(color);
        let transform = self.transform();
        self.pixmap.fill_path(path, &paint, FillRule::EvenOdd, transform, None);
    }

    fn stroke_path(&mut self, path: &SkPath, color: Color, width: f64) {
        let paint = self.paint(color);
        let stroke = Stroke {
            width: self.min_local_width(width) as f32,
            ..Stroke::default()
        };
        let transform = self.transform();
        self.pixmap.stroke_path(path, &paint, &stroke, transform, None);
    }

    /// 线宽至少一个像素
    fn min_local_width(&self, width: f64) -> f64 {
        let scale = self.state.transform.scale_factor();
        if scale > 0.0 {
            width.max(1.0 / scale)
        } else {
            width
        }
    }

    fn greek_text(&mut self, rect: Rect, text: &str, style: &TextStyle) {
        for line in layout_lines(rect, text, style) {
            if line.text.trim().is_empty() {
                continue;
            }
            let bar_height = line.rect.height * GREEK_BAR_RATIO;
            let bar = Rect::new(
                line.rect.x,
                line.rect.y + (line.rect.height - bar_height) / 2.0,
                line.rect.width,
                bar_height,
            );
            let mut color = style.color;
            color.a = (color.a as f64 * 0.6).round() as u8;
            self.fill_rect(bar, color);
        }
    }
}

fn sk_transform(transform: &Transform2D) -> Transform {
    let m = transform.matrix();
    Transform::from_row(
        m[(0, 0)] as f32,
        m[(1, 0)] as f32,
        m[(0, 1)] as f32,
        m[(1, 1)] as f32,
        m[(0, 2)] as f32,
        m[(1, 2)] as f32,
    )
}

fn sk_rect(rect: Rect) -> Option<tiny_skia::Rect> {
    tiny_skia::Rect::from_xywh(rect.x as f32, rect.y as f32, rect.width as f32, rect.height as f32)
}

fn polyline(points: &[Point2], close: bool) -> Option<SkPath> {
    let (first, rest) = points.split_first()?;
    let mut pb = PathBuilder::new();
    pb.move_to(first.x as f32, first.y as f32);
    for p in rest {
        pb.line_to(p.x as f32, p.y as f32);
    }
    if close {
        pb.close();
    }
    pb.finish()
}

/// tiny-skia 没有减法混合，用差值近似
fn sk_blend_mode(mode: BlendMode) -> tiny_skia::BlendMode {
    match mode {
        BlendMode::Normal => tiny_skia::BlendMode::SourceOver,
        BlendMode::Lighten => tiny_skia::BlendMode::Lighten,
        BlendMode::Darken => tiny_skia::BlendMode::Darken,
        BlendMode::Multiply => tiny_skia::BlendMode::Multiply,
        BlendMode::Screen => tiny_skia::BlendMode::Screen,
        BlendMode::Dodge => tiny_skia::BlendMode::ColorDodge,
        BlendMode::Burn => tiny_skia::BlendMode::ColorBurn,
        BlendMode::Addition => tiny_skia::BlendMode::Plus,
        BlendMode::Subtract | BlendMode::Difference => tiny_skia::BlendMode::Difference,
        BlendMode::HardLight => tiny_skia::BlendMode::HardLight,
        BlendMode::Overlay => tiny_skia::BlendMode::Overlay,
        BlendMode::SoftLight => tiny_skia::BlendMode::SoftLight,
    }
}

impl Painter for RgbaImage {
    fn save(&mut self) {
        self.state.save();
    }

    fn restore(&mut self) {
        self.state.restore();
    }

    fn translate(&mut self, dx: f64, dy: f64) {
        self.state.translate(dx, dy);
    }

    fn rotate(&mut self, degrees: f64) {
        self.state.rotate(degrees);
    }

    fn scale(&mut self, sx: f64, sy: f64) {
        self.state.scale(sx, sy);
    }

    fn set_opacity(&mut self, opacity: f64) {
        self.state.set_opacity(opacity);
    }

    fn set_blend_mode(&mut self, mode: BlendMode) {
        self.state.blend_mode = mode;
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        if let Some(r) = sk_rect(rect) {
            self.fill_path(&PathBuilder::from_rect(r), color);
        }
    }

    fn stroke_rect(&mut self, rect: Rect, color: Color, width: f64) {
        if let Some(r) = sk_rect(rect) {
            self.stroke_path(&PathBuilder::from_rect(r), color, width);
        }
    }

    fn draw_line(&mut self, from: Point2, to: Point2, color: Color, width: f64) {
        if from == to {
            return;
        }
        if let Some(path) = polyline(&[from, to], false) {
            self.stroke_path(&path, color, width);
        }
    }

    fn fill_polygon(&mut self, points: &[Point2], color: Color) {
        if points.len() < 3 {
            return;
        }
        if let Some(path) = polyline(points, true) {
            self.fill_path(&path, color);
        }
    }

    fn draw_ellipse(&mut self, rect: Rect, fill: Option<Color>, stroke: Option<(Color, f64)>) {
        let Some(path) = sk_rect(rect).and_then(PathBuilder::from_oval) else {
            return;
        };
        if let Some(color) = fill {
            self.fill_path(&path, color);
        }
        if let Some((color, width)) = stroke {
            self.stroke_path(&path, color, width);
        }
    }

    fn draw_text(&mut self, rect: Rect, text: &str, style: &TextStyle) {
        self.greek_text(rect, text, style);
    }

    fn draw_rich_text(&mut self, rect: Rect, content: &RichContent) {
        let text = plain_text(&content.html);
        let style = TextStyle::new(Default::default());
        self.greek_text(rect, &text, &style);
    }
}

impl RasterSurface for RgbaImage {
    /// 像素缓冲按需预留，内存不足时返回 None 而不是中止
    fn allocate(width: u32, height: u32) -> Option<Self> {
        let size = IntSize::from_wh(width, height)?;
        let len = (width as usize).checked_mul(height as usize)?.checked_mul(4)?;
        let mut data = Vec::new();
        data.try_reserve_exact(len).ok()?;
        data.resize(len, 0);
        Some(Self {
            pixmap: Pixmap::from_vec(data, size)?,
            state: PainterState::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: u8, b: u8) -> bool {
        (a as i32 - b as i32).abs() <= 1
    }

    #[test]
    fn test_fill_rect_on_pixel_grid() {
        let mut image = RgbaImage::new(10, 10).unwrap();
        image.fill_rect(Rect::new(2.0, 2.0, 3.0, 3.0), Color::rgb(255, 0, 0));

        assert_eq!(image.pixel(2, 2), Some(Color::rgb(255, 0, 0)));
        assert_eq!(image.pixel(4, 4), Some(Color::rgb(255, 0, 0)));
        assert_eq!(image.pixel(5, 5).map(|c| c.a), Some(0));
        assert_eq!(image.pixel(1, 2).map(|c| c.a), Some(0));
        assert_eq!(image.pixel(10, 0), None);
    }

    #[test]
    fn test_edges_are_antialiased() {
        let mut image = RgbaImage::new(10, 10).unwrap();
        image.fill_rect(Rect::new(2.5, 2.0, 3.0, 3.0), Color::BLACK);

        // 左边缘落在像素中间，覆盖一半
        let edge = image.pixel(2, 3).unwrap().a;
        assert!(edge > 64 && edge < 192, "edge alpha {}", edge);
        assert_eq!(image.pixel(3, 3).map(|c| c.a), Some(255));
    }

    #[test]
    fn test_transform_and_restore() {
        let mut image = RgbaImage::new(20, 20).unwrap();
        image.save();
        image.scale(2.0, 2.0);
        image.translate(1.0, 1.0);
        image.fill_rect(Rect::new(0.0, 0.0, 2.0, 2.0), Color::BLACK);
        image.restore();
        image.fill_rect(Rect::new(0.0, 0.0, 1.0, 1.0), Color::WHITE);

        // (1,1)-(3,3) 缩放后占 (2,2)-(6,6)
        assert_eq!(image.pixel(2, 2), Some(Color::BLACK));
        assert_eq!(image.pixel(5, 5), Some(Color::BLACK));
        assert_eq!(image.pixel(6, 6).map(|c| c.a), Some(0));
        assert_eq!(image.pixel(0, 0), Some(Color::WHITE));
    }

    #[test]
    fn test_opacity_blends_over_white() {
        let mut image = RgbaImage::new(4, 4).unwrap();
        image.clear(Color::WHITE);
        image.save();
        image.set_opacity(0.5);
        image.fill_rect(Rect::new(0.0, 0.0, 4.0, 4.0), Color::BLACK);
        image.restore();

        let px = image.pixel(1, 1).unwrap();
        assert!((px.r as i32 - 128).abs() <= 2);
        assert_eq!(px.a, 255);
    }

    #[test]
    fn test_multiply_blend() {
        let mut image = RgbaImage::new(2, 2).unwrap();
        image.clear(Color::rgb(200, 100, 50));
        image.set_blend_mode(BlendMode::Multiply);
        image.fill_rect(Rect::new(0.0, 0.0, 2.0, 2.0), Color::rgb(128, 255, 0));

        let px = image.pixel(0, 0).unwrap();
        assert!(close(px.r, 100));
        assert!(close(px.g, 100));
        assert_eq!(px.b, 0);
    }

    #[test]
    fn test_hairline_is_visible() {
        let mut image = RgbaImage::new(10, 10).unwrap();
        image.draw_line(Point2::new(0.0, 5.5), Point2::new(10.0, 5.5), Color::BLACK, 0.0);
        assert!(image.pixel(3, 5).unwrap().a >= 250);
    }

    #[test]
    fn test_text_is_greeked() {
        let mut image = RgbaImage::new(200, 50).unwrap();
        image.scale(4.0, 4.0);
        let style = TextStyle::new(Default::default());
        image.draw_text(Rect::new(0.0, 0.0, 50.0, 10.0), "Title", &style);

        let painted = image.pixels().chunks_exact(4).filter(|px| px[3] > 0).count();
        assert!(painted > 0);
    }

    #[test]
    fn test_allocate_and_encode() {
        let image = RgbaImage::allocate(3, 2).unwrap();
        assert_eq!(image.pixels().len(), 24);
        assert!(RgbaImage::allocate(0, 10).is_none());

        let mut bytes = Vec::new();
        image.encode_png(&mut bytes, Some(300)).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
    }
}
