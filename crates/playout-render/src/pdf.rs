//! PDF 分页设备
//!
//! 每页的绘制命令直接转换为 PDF 内容流运算符，坐标在写出前就已变换到
//! 页面空间（点，原点左下角），因此不使用 `cm`。文本使用标准 Helvetica 字体。

use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use playout_core::composition::{DocumentDevice, PagedDevice};
use playout_core::content::RichContent;
use playout_core::dom::plain_text;
use playout_core::error::RenderError;
use playout_core::item::MM_PER_POINT;
use playout_core::math::{Point2, Rect, Transform2D, Vector2};
use playout_core::paint::{Painter, PainterState, TextStyle};
use playout_core::style::{BlendMode, Color};

use crate::error::OutputError;
use crate::layout::layout_lines;

/// 每毫米的 PDF 点数
const POINTS_PER_MM: f64 = 72.0 / 25.4;

const ELLIPSE_SEGMENTS: usize = 48;

/// 基线相对行顶的位置（行高比例）
const BASELINE_RATIO: f64 = 0.8;

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

/// PDF 混合模式名；没有对应的模式按 Normal 处理
fn blend_mode_name(mode: BlendMode) -> &'static str {
    match mode {
        BlendMode::Lighten => "Lighten",
        BlendMode::Screen => "Screen",
        BlendMode::Dodge => "ColorDodge",
        BlendMode::Darken => "Darken",
        BlendMode::Multiply => "Multiply",
        BlendMode::Burn => "ColorBurn",
        BlendMode::Overlay => "Overlay",
        BlendMode::SoftLight => "SoftLight",
        BlendMode::HardLight => "HardLight",
        BlendMode::Difference => "Difference",
        BlendMode::Normal | BlendMode::Addition | BlendMode::Subtract => "Normal",
    }
}

/// 图形状态键：(不透明度百分比, 混合模式码)
type GraphicsStateKey = (u8, u8);

fn graphics_state_name(key: GraphicsStateKey) -> String {
    format!("GS{}_{}", key.0, key.1)
}

/// 正在绘制的一页
#[derive(Debug, Clone)]
pub struct PdfPage {
    width_pt: f64,
    height_pt: f64,
    operations: Vec<Operation>,
    state: PainterState,
    graphics_states: BTreeSet<GraphicsStateKey>,
}

impl PdfPage {
    fn new(width_mm: f64, height_mm: f64) -> Self {
        let width_pt = width_mm * POINTS_PER_MM;
        let height_pt = height_mm * POINTS_PER_MM;
        // 毫米、Y 向下 → 点、Y 向上
        let base = Transform2D::identity()
            .translate(0.0, height_pt)
            .scale(POINTS_PER_MM, -POINTS_PER_MM);
        Self {
            width_pt,
            height_pt,
            operations: Vec::new(),
            state: PainterState::new(base),
            graphics_states: BTreeSet::new(),
        }
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    fn op(&mut self, operator: &str, operands: Vec<Object>) {
        self.operations.push(Operation::new(operator, operands));
    }

    fn page_point(&self, point: Point2) -> Point2 {
        self.state.transform.apply(point)
    }

    /// 进入带颜色和透明度的局部绘制状态
    fn begin_paint(&mut self, color: Color) {
        self.op("q", vec![]);
        let alpha = color.a as f64 / 255.0 * self.state.opacity;
        let key = (
            (alpha.clamp(0.0, 1.0) * 100.0).round() as u8,
            self.state.blend_mode.code(),
        );
        if key.0 < 100 || self.state.blend_mode != BlendMode::Normal {
            self.graphics_states.insert(key);
            self.op("gs", vec![Object::Name(graphics_state_name(key).into_bytes())]);
        }
    }

    fn end_paint(&mut self) {
        self.op("Q", vec![]);
    }

    fn color_operands(color: Color) -> Vec<Object> {
        let [r, g, b, _] = color.to_f64();
        vec![real(r), real(g), real(b)]
    }

    fn path(&mut self, points: &[Point2], close: bool) {
        for (i, point) in points.iter().enumerate() {
            let p = self.page_point(*point);
            let operator = if i == 0 { "m" } else { "l" };
            self.op(operator, vec![real(p.x), real(p.y)]);
        }
        if close {
            self.op("h", vec![]);
        }
    }

    fn fill_path(&mut self, points: &[Point2], color: Color) {
        if points.len() < 3 {
            return;
        }
        self.begin_paint(color);
        self.op("rg", Self::color_operands(color));
        self.path(points, true);
        self.op("f", vec![]);
        self.end_paint();
    }

    fn stroke_path(&mut self, points: &[Point2], close: bool, color: Color, width: f64) {
        if points.len() < 2 {
            return;
        }
        self.begin_paint(color);
        self.op("RG", Self::color_operands(color));
        self.op("w", vec![real(width * self.state.transform.scale_factor())]);
        self.path(points, close);
        self.op("S", vec![]);
        self.end_paint();
    }

    fn rect_points(rect: Rect) -> [Point2; 4] {
        [
            Point2::new(rect.left(), rect.top()),
            Point2::new(rect.right(), rect.top()),
            Point2::new(rect.right(), rect.bottom()),
            Point2::new(rect.left(), rect.bottom()),
        ]
    }

    fn write_text(&mut self, rect: Rect, text: &str, style: &TextStyle) {
        let font_size = style.font.point_size * MM_PER_POINT;
        let font = if style.font.is_bold() { "F2" } else { "F1" };
        let lines: Vec<(Point2, Vec<u8>)> = layout_lines(rect, text, style)
            .into_iter()
            .filter(|line| !line.text.is_empty())
            .map(|line| {
                let baseline = Point2::new(line.rect.x, line.rect.y + line.rect.height * BASELINE_RATIO);
                (baseline, encode_text(line.text))
            })
            .collect();
        if lines.is_empty() {
            return;
        }

        self.begin_paint(style.color);
        self.op("rg", Self::color_operands(style.color));
        self.op("BT", vec![]);
        self.op("Tf", vec![Object::Name(font.as_bytes().to_vec()), Object::Integer(1)]);
        for (baseline, encoded) in lines {
            // 文本空间单位 = 字号，Y 轴朝上
            let origin = self.page_point(baseline);
            let ex: Vector2 = self.page_point(baseline + Vector2::new(font_size, 0.0)) - origin;
            let ey: Vector2 = self.page_point(baseline + Vector2::new(0.0, -font_size)) - origin;
            self.op(
                "Tm",
                vec![real(ex.x), real(ex.y), real(ey.x), real(ey.y), real(origin.x), real(origin.y)],
            );
            self.op("Tj", vec![Object::string_literal(encoded)]);
        }
        self.op("ET", vec![]);
        self.end_paint();
    }
}

/// Helvetica 标准编码之外的字符替换为 `?`
fn encode_text(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c as u8 } else { b'?' })
        .collect()
}

impl Painter for PdfPage {
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
        self.fill_path(&Self::rect_points(rect), color);
    }

    fn stroke_rect(&mut self, rect: Rect, color: Color, width: f64) {
        self.stroke_path(&Self::rect_points(rect), true, color, width);
    }

    fn draw_line(&mut self, from: Point2, to: Point2, color: Color, width: f64) {
        self.stroke_path(&[from, to], false, color, width);
    }

    fn fill_polygon(&mut self, points: &[Point2], color: Color) {
        self.fill_path(points, color);
    }

    fn draw_ellipse(&mut self, rect: Rect, fill: Option<Color>, stroke: Option<(Color, f64)>) {
        let center = rect.center();
        let points: Vec<Point2> = (0..ELLIPSE_SEGMENTS)
            .map(|i| {
                let t = i as f64 / ELLIPSE_SEGMENTS as f64 * std::f64::consts::TAU;
                Point2::new(
                    center.x + rect.width / 2.0 * t.cos(),
                    center.y + rect.height / 2.0 * t.sin(),
                )
            })
            .collect();
        if let Some(color) = fill {
            self.fill_path(&points, color);
        }
        if let Some((color, width)) = stroke {
            self.stroke_path(&points, true, color, width);
        }
    }

    fn draw_text(&mut self, rect: Rect, text: &str, style: &TextStyle) {
        self.write_text(rect, text, style);
    }

    fn draw_rich_text(&mut self, rect: Rect, content: &RichContent) {
        let text = plain_text(&content.html);
        self.write_text(rect, &text, &TextStyle::new(Default::default()));
    }
}

/// 分页 PDF 文档
pub struct PdfDevice {
    document: Document,
    pages_id: ObjectId,
    page_ids: Vec<ObjectId>,
    page: PdfPage,
    in_page: bool,
    finished: bool,
    graphics_states: BTreeSet<GraphicsStateKey>,
}

impl PdfDevice {
    pub fn new() -> Self {
        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();
        Self {
            document,
            pages_id,
            page_ids: Vec::new(),
            page: PdfPage::new(0.0, 0.0),
            in_page: false,
            finished: false,
            graphics_states: BTreeSet::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    fn resources(&self) -> Dictionary {
        let mut states = Dictionary::new();
        for key in &self.graphics_states {
            let alpha = real(key.0 as f64 / 100.0);
            let mode = blend_mode_name(BlendMode::from_code(key.1));
            states.set(
                graphics_state_name(*key),
                dictionary! {
                    "Type" => "ExtGState",
                    "ca" => alpha.clone(),
                    "CA" => alpha,
                    "BM" => mode,
                },
            );
        }
        dictionary! {
            "Font" => dictionary! {
                "F1" => dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => "Helvetica",
                    "Encoding" => "WinAnsiEncoding",
                },
                "F2" => dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => "Helvetica-Bold",
                    "Encoding" => "WinAnsiEncoding",
                },
            },
            "ExtGState" => states,
        }
    }

    fn close_page(&mut self) -> Result<(), OutputError> {
        if !self.in_page {
            return Err(OutputError::NoPage);
        }
        self.in_page = false;

        let page = std::mem::replace(&mut self.page, PdfPage::new(0.0, 0.0));
        let content = Content {
            operations: page.operations,
        };
        let content_id = self.document.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = self.document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![Object::Integer(0), Object::Integer(0), real(page.width_pt), real(page.height_pt)],
        });
        self.page_ids.push(page_id);
        self.graphics_states.extend(page.graphics_states);
        Ok(())
    }

    fn finish_document(&mut self) -> Result<(), OutputError> {
        if self.finished {
            return Ok(());
        }
        if self.in_page {
            self.close_page()?;
        }
        let resources_id = self.document.add_object(self.resources());
        let kids: Vec<Object> = self.page_ids.iter().map(|id| (*id).into()).collect();
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => self.page_ids.len() as i64,
            "Resources" => resources_id,
        };
        self.document.objects.insert(self.pages_id, Object::Dictionary(pages));

        let catalog_id = self.document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        let info_id = self.document.add_object(dictionary! {
            "Producer" => Object::string_literal("PLayout"),
        });
        self.document.trailer.set("Root", catalog_id);
        self.document.trailer.set("Info", info_id);
        self.document.compress();
        self.finished = true;
        Ok(())
    }

    /// 完成文档并序列化到内存
    pub fn to_bytes(&mut self) -> Result<Vec<u8>, OutputError> {
        self.finish_document()?;
        let mut bytes = Vec::new();
        self.document.save_to(&mut bytes)?;
        Ok(bytes)
    }
}

impl Default for PdfDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl PagedDevice for PdfDevice {
    fn begin_page(&mut self, width_mm: f64, height_mm: f64, _dpi: u32) -> Result<(), RenderError> {
        if self.finished {
            return Err(OutputError::Finished.into());
        }
        if self.in_page {
            self.close_page()?;
        }
        self.page = PdfPage::new(width_mm, height_mm);
        self.in_page = true;
        Ok(())
    }

    fn painter(&mut self) -> &mut dyn Painter {
        &mut self.page
    }

    fn end_page(&mut self) -> Result<(), RenderError> {
        Ok(self.close_page()?)
    }

    fn finish(&mut self) -> Result<(), RenderError> {
        Ok(self.finish_document()?)
    }
}

impl DocumentDevice for PdfDevice {
    fn write_to(&mut self, path: &Path) -> Result<(), RenderError> {
        self.finish_document()?;
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.document.save_to(&mut writer).map_err(OutputError::from)?;

        tracing::info!("Saved {} page PDF to {}", self.page_ids.len(), path.display());
        Ok(())
    }
}
