//! 具体图元内容
//!
//! 地图、图例、比例尺等的可视内容由外部渲染，这里只保存能够往返
//! 序列化的参数，并绘制简化的示意内容。

use serde::{Deserialize, Serialize};

use crate::dom::Element;
use crate::item::label::FontDescription;
use crate::math::{relative_position, Point2, Rect, Vector2};
use crate::multiframe::MultiFrameId;
use crate::paint::{ItemPaintContext, Painter, TextStyle};
use crate::style::{Color, HAlign, VAlign};

const PLACEHOLDER_FILL: Color = Color::rgb(235, 235, 235);
const PLACEHOLDER_LINE: Color = Color::rgb(128, 128, 128);

fn optional_map_id(element: &Element) -> Option<u32> {
    element.attr::<i64>("map").filter(|id| *id >= 0).map(|id| id as u32)
}

fn write_map_id(element: &mut Element, map_id: Option<u32>) {
    element.set_attribute("map", map_id.map(i64::from).unwrap_or(-1));
}

/// 地图范围（地图坐标，Y 轴向上）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapExtent {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl MapExtent {
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self { xmin, ymin, xmax, ymax }
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    pub fn center(&self) -> Point2 {
        Point2::new((self.xmin + self.xmax) / 2.0, (self.ymin + self.ymax) / 2.0)
    }
}

impl Default for MapExtent {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, 1.0)
    }
}

/// 地图
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MapItem {
    /// 版面内的地图编号，供图例/比例尺引用
    pub map_id: u32,
    pub extent: MapExtent,
    /// 地图内容相对图元的旋转（度）
    pub map_rotation: f64,
}

impl MapItem {
    pub fn new(extent: MapExtent) -> Self {
        Self {
            map_id: 0,
            extent,
            map_rotation: 0.0,
        }
    }

    /// 毫米 → 地图单位的比例（按宽度）
    pub fn map_units_per_mm(&self, item_width: f64) -> f64 {
        if item_width <= 0.0 {
            return 0.0;
        }
        self.extent.width() / item_width
    }

    fn write_payload(&self, element: &mut Element) {
        element.set_attribute("id", self.map_id);
        element.set_attribute("mapRotation", self.map_rotation);
        element.append_child(
            Element::new("Extent")
                .with_attribute("xmin", self.extent.xmin)
                .with_attribute("ymin", self.extent.ymin)
                .with_attribute("xmax", self.extent.xmax)
                .with_attribute("ymax", self.extent.ymax),
        );
    }

    fn read_payload(element: &Element) -> Self {
        let extent = element
            .first_child("Extent")
            .map(|e| {
                MapExtent::new(
                    e.attr_or("xmin", 0.0),
                    e.attr_or("ymin", 0.0),
                    e.attr_or("xmax", 1.0),
                    e.attr_or("ymax", 1.0),
                )
            })
            .unwrap_or_default();
        Self {
            map_id: element.attr_or("id", 0),
            extent,
            map_rotation: element.attr_or("mapRotation", 0.0),
        }
    }

    fn paint(&self, painter: &mut dyn Painter, rect: Rect) {
        painter.fill_rect(rect, PLACEHOLDER_FILL);
        // 以十分之一范围画经纬网示意
        for i in 1..10 {
            let t = i as f64 / 10.0;
            let x = rect.x + rect.width * t;
            let y = rect.y + rect.height * t;
            painter.draw_line(Point2::new(x, rect.top()), Point2::new(x, rect.bottom()), Color::WHITE, 0.2);
            painter.draw_line(Point2::new(rect.left(), y), Point2::new(rect.right(), y), Color::WHITE, 0.2);
        }
        let text = format!(
            "Map {} [{:.2}, {:.2} : {:.2}, {:.2}]",
            self.map_id, self.extent.xmin, self.extent.ymin, self.extent.xmax, self.extent.ymax
        );
        painter.draw_text(
            rect,
            &text,
            &TextStyle::new(FontDescription::default()).aligned(HAlign::Center, VAlign::Center),
        );
    }
}

/// 图例
#[derive(Debug, Clone, PartialEq)]
pub struct LegendItem {
    pub title: String,
    pub map_id: Option<u32>,
    pub entries: Vec<String>,
    pub font: FontDescription,
}

impl Default for LegendItem {
    fn default() -> Self {
        Self {
            title: "Legend".to_string(),
            map_id: None,
            entries: Vec::new(),
            font: FontDescription::default(),
        }
    }
}

impl LegendItem {
    fn write_payload(&self, element: &mut Element) {
        element.set_attribute("title", &self.title);
        write_map_id(element, self.map_id);
        element.set_attribute("font", self.font.to_description());
        for entry in &self.entries {
            element.append_child(Element::new("LegendEntry").with_attribute("text", entry));
        }
    }

    fn read_payload(element: &Element, default_font: &FontDescription) -> Self {
        Self {
            title: element.attribute("title").unwrap_or_default().to_string(),
            map_id: optional_map_id(element),
            entries: element
                .children_named("LegendEntry")
                .filter_map(|e| e.attribute("text").map(str::to_string))
                .collect(),
            font: element
                .attribute("font")
                .and_then(FontDescription::from_description)
                .unwrap_or_else(|| default_font.clone()),
        }
    }

    fn paint(&self, painter: &mut dyn Painter, rect: Rect) {
        let line_height = self.font.point_size * crate::item::label::MM_PER_POINT * 1.2;
        let mut title_font = self.font.clone();
        title_font.point_size *= 1.4;
        title_font.weight = 75;

        let mut y = rect.y + 2.0;
        painter.draw_text(
            Rect::new(rect.x + 2.0, y, rect.width - 4.0, line_height * 1.4),
            &self.title,
            &TextStyle::new(title_font),
        );
        y += line_height * 1.4 + 2.0;

        for entry in &self.entries {
            if y + line_height > rect.bottom() {
                break;
            }
            let symbol = Rect::new(rect.x + 2.0, y + line_height * 0.15, 6.0, line_height * 0.7);
            painter.fill_rect(symbol, PLACEHOLDER_FILL);
            painter.stroke_rect(symbol, PLACEHOLDER_LINE, 0.2);
            painter.draw_text(
                Rect::new(rect.x + 10.0, y, (rect.width - 12.0).max(0.0), line_height),
                entry,
                &TextStyle::new(self.font.clone()),
            );
            y += line_height + 1.0;
        }
    }
}

/// 比例尺
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleBarItem {
    pub map_id: Option<u32>,
    pub units_per_segment: f64,
    pub num_segments: u32,
    pub unit_label: String,
}

impl Default for ScaleBarItem {
    fn default() -> Self {
        Self {
            map_id: None,
            units_per_segment: 1000.0,
            num_segments: 4,
            unit_label: "m".to_string(),
        }
    }
}

impl ScaleBarItem {
    fn write_payload(&self, element: &mut Element) {
        write_map_id(element, self.map_id);
        element.set_attribute("unitsPerSegment", self.units_per_segment);
        element.set_attribute("numSegments", self.num_segments);
        element.set_attribute("unitLabel", &self.unit_label);
    }

    fn read_payload(element: &Element) -> Self {
        let defaults = Self::default();
        Self {
            map_id: optional_map_id(element),
            units_per_segment: element.attr_or("unitsPerSegment", defaults.units_per_segment),
            num_segments: element.attr_or("numSegments", defaults.num_segments).max(1),
            unit_label: element
                .attribute("unitLabel")
                .map(str::to_string)
                .unwrap_or(defaults.unit_label),
        }
    }

    fn paint(&self, painter: &mut dyn Painter, rect: Rect) {
        let n = self.num_segments.max(1);
        let bar_height = (rect.height / 3.0).min(3.0);
        let segment_width = (rect.width - 4.0).max(0.0) / n as f64;
        let bar_y = rect.y + 1.0;
        let style = TextStyle::new(FontDescription::new("Sans", 7.0)).aligned(HAlign::Center, VAlign::Top);

        for i in 0..n {
            let segment = Rect::new(rect.x + 2.0 + segment_width * i as f64, bar_y, segment_width, bar_height);
            let fill = if i % 2 == 0 { Color::BLACK } else { Color::WHITE };
            painter.fill_rect(segment, fill);
            painter.stroke_rect(segment, Color::BLACK, 0.2);
        }
        for i in 0..=n {
            let x = rect.x + 2.0 + segment_width * i as f64;
            let mut label = format!("{}", self.units_per_segment * i as f64);
            if i == n {
                label.push(' ');
                label.push_str(&self.unit_label);
            }
            painter.draw_text(
                Rect::new(x - segment_width / 2.0, bar_y + bar_height + 0.5, segment_width, rect.height - bar_height - 1.5),
                &label,
                &style,
            );
        }
    }
}

/// 图片
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PictureItem {
    pub source: String,
}

impl PictureItem {
    fn paint(&self, painter: &mut dyn Painter, rect: Rect) {
        painter.fill_rect(rect, PLACEHOLDER_FILL);
        painter.draw_line(rect.top_left(), Point2::new(rect.right(), rect.bottom()), PLACEHOLDER_LINE, 0.3);
        painter.draw_line(Point2::new(rect.right(), rect.top()), Point2::new(rect.left(), rect.bottom()), PLACEHOLDER_LINE, 0.3);
        if !self.source.is_empty() {
            painter.draw_text(
                rect,
                &self.source,
                &TextStyle::new(FontDescription::new("Sans", 6.0)).aligned(HAlign::Center, VAlign::Bottom),
            );
        }
    }
}

/// 基本形状
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShapeType {
    Ellipse,
    #[default]
    Rectangle,
    Triangle,
}

impl ShapeType {
    pub fn code(&self) -> u8 {
        match self {
            ShapeType::Ellipse => 0,
            ShapeType::Rectangle => 1,
            ShapeType::Triangle => 2,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0 => ShapeType::Ellipse,
            2 => ShapeType::Triangle,
            _ => ShapeType::Rectangle,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShapeItem {
    pub shape: ShapeType,
    pub fill: Color,
    pub outline: Color,
    pub outline_width: f64,
}

impl Default for ShapeItem {
    fn default() -> Self {
        Self {
            shape: ShapeType::Rectangle,
            fill: Color::WHITE,
            outline: Color::BLACK,
            outline_width: 0.3,
        }
    }
}

impl ShapeItem {
    fn write_payload(&self, element: &mut Element) {
        element.set_attribute("shapeType", self.shape.code());
        element.set_attribute("outlineWidth", self.outline_width);
        self.fill.write_attributes(element.append_child(Element::new("FillColor")));
        self.outline.write_attributes(element.append_child(Element::new("OutlineColor")));
    }

    fn read_payload(element: &Element) -> Self {
        let defaults = Self::default();
        Self {
            shape: ShapeType::from_code(element.attr_or("shapeType", 1)),
            fill: element
                .first_child("FillColor")
                .map(Color::read_attributes)
                .unwrap_or(defaults.fill),
            outline: element
                .first_child("OutlineColor")
                .map(Color::read_attributes)
                .unwrap_or(defaults.outline),
            outline_width: element.attr_or("outlineWidth", defaults.outline_width),
        }
    }

    fn paint(&self, painter: &mut dyn Painter, rect: Rect) {
        match self.shape {
            ShapeType::Ellipse => {
                painter.draw_ellipse(rect, Some(self.fill), Some((self.outline, self.outline_width)))
            }
            ShapeType::Rectangle => {
                painter.fill_rect(rect, self.fill);
                painter.stroke_rect(rect, self.outline, self.outline_width);
            }
            ShapeType::Triangle => {
                let pts = [
                    Point2::new(rect.left(), rect.bottom()),
                    Point2::new(rect.right(), rect.bottom()),
                    Point2::new(rect.h_center(), rect.top()),
                ];
                painter.fill_polygon(&pts, self.fill);
                for i in 0..3 {
                    painter.draw_line(pts[i], pts[(i + 1) % 3], self.outline, self.outline_width);
                }
            }
        }
    }
}

/// 箭头，端点为图元局部坐标
#[derive(Debug, Clone, PartialEq)]
pub struct ArrowItem {
    pub start: Point2,
    pub stop: Point2,
    pub head_width: f64,
    pub line_width: f64,
    pub color: Color,
}

impl ArrowItem {
    pub fn new(start: Point2, stop: Point2) -> Self {
        Self {
            start,
            stop,
            head_width: 4.0,
            line_width: 1.0,
            color: Color::BLACK,
        }
    }

    /// 图元尺寸变化后按比例移动端点
    fn resize(&mut self, old: &Rect, new: &Rect) {
        let map = |p: Point2| {
            Point2::new(
                relative_position(p.x, 0.0, old.width, 0.0, new.width),
                relative_position(p.y, 0.0, old.height, 0.0, new.height),
            )
        };
        self.start = map(self.start);
        self.stop = map(self.stop);
    }

    fn write_payload(&self, element: &mut Element) {
        element.set_attribute("arrowHeadWidth", self.head_width);
        element.set_attribute("outlineWidth", self.line_width);
        element.append_child(
            Element::new("StartPoint")
                .with_attribute("x", self.start.x)
                .with_attribute("y", self.start.y),
        );
        element.append_child(
            Element::new("StopPoint")
                .with_attribute("x", self.stop.x)
                .with_attribute("y", self.stop.y),
        );
        self.color.write_attributes(element.append_child(Element::new("ArrowColor")));
    }

    fn read_payload(element: &Element) -> Self {
        let point = |name: &str| {
            element
                .first_child(name)
                .map(|p| Point2::new(p.attr_or("x", 0.0), p.attr_or("y", 0.0)))
                .unwrap_or_else(Point2::origin)
        };
        Self {
            start: point("StartPoint"),
            stop: point("StopPoint"),
            head_width: element.attr_or("arrowHeadWidth", 4.0),
            line_width: element.attr_or("outlineWidth", 1.0),
            color: element
                .first_child("ArrowColor")
                .map(Color::read_attributes)
                .unwrap_or(Color::BLACK),
        }
    }

    fn paint(&self, painter: &mut dyn Painter) {
        let d: Vector2 = self.stop - self.start;
        let length = d.norm();
        if length <= f64::EPSILON {
            return;
        }
        let dir = d / length;
        let normal = Vector2::new(-dir.y, dir.x);
        let head_length = (self.head_width * 1.5).min(length);
        let base = self.stop - dir * head_length;

        painter.draw_line(self.start, base, self.color, self.line_width);
        painter.fill_polygon(
            &[
                self.stop,
                base + normal * (self.head_width / 2.0),
                base - normal * (self.head_width / 2.0),
            ],
            self.color,
        );
    }
}

/// 属性表
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeTableItem {
    pub map_id: Option<u32>,
    pub columns: Vec<String>,
    pub max_features: u32,
    pub show_grid: bool,
    pub header_font: FontDescription,
}

impl Default for AttributeTableItem {
    fn default() -> Self {
        Self {
            map_id: None,
            columns: Vec::new(),
            max_features: 5,
            show_grid: true,
            header_font: FontDescription::default(),
        }
    }
}

impl AttributeTableItem {
    fn write_payload(&self, element: &mut Element) {
        write_map_id(element, self.map_id);
        element.set_attribute("maxFeatures", self.max_features);
        element.set_attribute("showGrid", self.show_grid);
        element.set_attribute("headerFont", self.header_font.to_description());
        for column in &self.columns {
            element.append_child(Element::new("Column").with_attribute("attribute", column));
        }
    }

    fn read_payload(element: &Element, default_font: &FontDescription) -> Self {
        Self {
            map_id: optional_map_id(element),
            columns: element
                .children_named("Column")
                .filter_map(|c| c.attribute("attribute").map(str::to_string))
                .collect(),
            max_features: element.attr_or("maxFeatures", 5),
            show_grid: element.attr_bool("showGrid", true),
            header_font: element
                .attribute("headerFont")
                .and_then(FontDescription::from_description)
                .unwrap_or_else(|| default_font.clone()),
        }
    }

    fn paint(&self, painter: &mut dyn Painter, rect: Rect) {
        if self.columns.is_empty() {
            painter.stroke_rect(rect, PLACEHOLDER_LINE, 0.2);
            return;
        }
        let row_height = self.header_font.point_size * crate::item::label::MM_PER_POINT * 1.2 + 2.0;
        let cell_width = rect.width / self.columns.len() as f64;
        let style = TextStyle::new(self.header_font.clone()).aligned(HAlign::Center, VAlign::Center);
        for (i, column) in self.columns.iter().enumerate() {
            let cell = Rect::new(rect.x + cell_width * i as f64, rect.y, cell_width, row_height.min(rect.height));
            painter.fill_rect(cell, PLACEHOLDER_FILL);
            if self.show_grid {
                painter.stroke_rect(cell, Color::BLACK, 0.2);
            }
            painter.draw_text(cell, column, &style);
        }
    }
}

/// 多帧中的一帧
#[derive(Debug, Clone, PartialEq)]
pub struct FrameItem {
    pub multi_frame: MultiFrameId,
    /// 本帧显示的内容区域（内容坐标，毫米）
    pub section: Rect,
}

impl FrameItem {
    pub fn new(multi_frame: MultiFrameId) -> Self {
        Self {
            multi_frame,
            section: Rect::default(),
        }
    }

    fn write_payload(&self, element: &mut Element) {
        element.set_attribute("multiFrame", self.multi_frame.0);
        element.set_attribute("sectionX", self.section.x);
        element.set_attribute("sectionY", self.section.y);
        element.set_attribute("sectionWidth", self.section.width);
        element.set_attribute("sectionHeight", self.section.height);
    }

    fn read_payload(element: &Element) -> Self {
        Self {
            multi_frame: MultiFrameId(element.attr_or("multiFrame", 0)),
            section: Rect::new(
                element.attr_or("sectionX", 0.0),
                element.attr_or("sectionY", 0.0),
                element.attr_or("sectionWidth", 0.0),
                element.attr_or("sectionHeight", 0.0),
            ),
        }
    }
}

/// 图元种类标签，同时是文档片段中的元素名
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemType {
    Paper,
    Label,
    Map,
    Legend,
    ScaleBar,
    Picture,
    Shape,
    Arrow,
    AttributeTable,
    Frame,
}

impl ItemType {
    pub const SERIALIZABLE: [ItemType; 9] = [
        ItemType::Label,
        ItemType::Map,
        ItemType::Legend,
        ItemType::ScaleBar,
        ItemType::Picture,
        ItemType::Shape,
        ItemType::Arrow,
        ItemType::AttributeTable,
        ItemType::Frame,
    ];

    pub fn element_name(&self) -> &'static str {
        match self {
            ItemType::Paper => "Paper",
            ItemType::Label => "Label",
            ItemType::Map => "Map",
            ItemType::Legend => "Legend",
            ItemType::ScaleBar => "ScaleBar",
            ItemType::Picture => "Picture",
            ItemType::Shape => "Shape",
            ItemType::Arrow => "Arrow",
            ItemType::AttributeTable => "AttributeTable",
            ItemType::Frame => "Frame",
        }
    }

    /// 可序列化种类的元素名解析（纸张不在其中）
    pub fn from_element_name(name: &str) -> Option<Self> {
        Self::SERIALIZABLE.iter().copied().find(|t| t.element_name() == name)
    }
}

/// 图元内容
#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    Paper,
    Label(crate::item::label::Label),
    Map(MapItem),
    Legend(LegendItem),
    ScaleBar(ScaleBarItem),
    Picture(PictureItem),
    Shape(ShapeItem),
    Arrow(ArrowItem),
    AttributeTable(AttributeTableItem),
    Frame(FrameItem),
}

impl ItemKind {
    pub fn item_type(&self) -> ItemType {
        match self {
            ItemKind::Paper => ItemType::Paper,
            ItemKind::Label(_) => ItemType::Label,
            ItemKind::Map(_) => ItemType::Map,
            ItemKind::Legend(_) => ItemType::Legend,
            ItemKind::ScaleBar(_) => ItemType::ScaleBar,
            ItemKind::Picture(_) => ItemType::Picture,
            ItemKind::Shape(_) => ItemType::Shape,
            ItemKind::Arrow(_) => ItemType::Arrow,
            ItemKind::AttributeTable(_) => ItemType::AttributeTable,
            ItemKind::Frame(_) => ItemType::Frame,
        }
    }

    pub fn write_payload(&self, element: &mut Element) {
        match self {
            ItemKind::Paper => {}
            ItemKind::Label(label) => label.write_payload(element),
            ItemKind::Map(map) => map.write_payload(element),
            ItemKind::Legend(legend) => legend.write_payload(element),
            ItemKind::ScaleBar(bar) => bar.write_payload(element),
            ItemKind::Picture(picture) => element.set_attribute("file", &picture.source),
            ItemKind::Shape(shape) => shape.write_payload(element),
            ItemKind::Arrow(arrow) => arrow.write_payload(element),
            ItemKind::AttributeTable(table) => table.write_payload(element),
            ItemKind::Frame(frame) => frame.write_payload(element),
        }
    }

    pub fn read_payload(
        item_type: ItemType,
        element: &Element,
        default_font: &FontDescription,
    ) -> Result<Self, crate::error::XmlError> {
        Ok(match item_type {
            ItemType::Paper => ItemKind::Paper,
            ItemType::Label => ItemKind::Label(crate::item::label::Label::read_payload(element, default_font)?),
            ItemType::Map => ItemKind::Map(MapItem::read_payload(element)),
            ItemType::Legend => ItemKind::Legend(LegendItem::read_payload(element, default_font)),
            ItemType::ScaleBar => ItemKind::ScaleBar(ScaleBarItem::read_payload(element)),
            ItemType::Picture => ItemKind::Picture(PictureItem {
                source: element.attribute("file").unwrap_or_default().to_string(),
            }),
            ItemType::Shape => ItemKind::Shape(ShapeItem::read_payload(element)),
            ItemType::Arrow => ItemKind::Arrow(ArrowItem::read_payload(element)),
            ItemType::AttributeTable => {
                ItemKind::AttributeTable(AttributeTableItem::read_payload(element, default_font))
            }
            ItemType::Frame => ItemKind::Frame(FrameItem::read_payload(element)),
        })
    }

    /// 绘制内容（局部坐标，`rect` 为内容区域）
    pub fn paint_content(&self, painter: &mut dyn Painter, rect: Rect, ctx: &ItemPaintContext<'_>) {
        match self {
            ItemKind::Paper => {
                painter.fill_rect(rect, Color::WHITE);
            }
            ItemKind::Label(label) => {
                let inset = label.margin;
                let text_rect = Rect::new(
                    rect.x + inset,
                    rect.y + inset,
                    (rect.width - 2.0 * inset).max(0.0),
                    (rect.height - 2.0 * inset).max(0.0),
                );
                if label.html {
                    if let Some(content) = ctx.rich_content {
                        painter.draw_rich_text(text_rect, content);
                    }
                } else {
                    let text = ctx.display_text.unwrap_or(&label.text);
                    let style = TextStyle {
                        font: label.font.clone(),
                        color: label.font_color,
                        halign: label.halign,
                        valign: label.valign,
                    };
                    painter.draw_text(text_rect, text, &style);
                }
            }
            ItemKind::Map(map) => map.paint(painter, rect),
            ItemKind::Legend(legend) => legend.paint(painter, rect),
            ItemKind::ScaleBar(bar) => bar.paint(painter, rect),
            ItemKind::Picture(picture) => picture.paint(painter, rect),
            ItemKind::Shape(shape) => shape.paint(painter, rect),
            ItemKind::Arrow(arrow) => arrow.paint(painter),
            ItemKind::AttributeTable(table) => table.paint(painter, rect),
            ItemKind::Frame(_) => {
                if let Some(content) = ctx.rich_content {
                    painter.draw_rich_text(rect, content);
                }
            }
        }
    }

    /// 图元尺寸变化通知
    pub fn resized(&mut self, old: &Rect, new: &Rect) {
        if let ItemKind::Arrow(arrow) = self {
            arrow.resize(old, new);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paint::{DisplayList, PaintCommand};

    fn round_trip(kind: &ItemKind) -> ItemKind {
        let mut e = Element::new(kind.item_type().element_name());
        kind.write_payload(&mut e);
        let parsed = Element::parse(&e.to_xml_string()).unwrap();
        let ty = ItemType::from_element_name(parsed.name()).unwrap();
        ItemKind::read_payload(ty, &parsed, &FontDescription::default()).unwrap()
    }

    #[test]
    fn test_payloads_round_trip() {
        let kinds = vec![
            ItemKind::Map(MapItem {
                map_id: 2,
                extent: MapExtent::new(100.0, 200.0, 300.0, 400.0),
                map_rotation: 15.0,
            }),
            ItemKind::Legend(LegendItem {
                title: "Key".to_string(),
                map_id: Some(2),
                entries: vec!["Roads".to_string(), "Rivers".to_string()],
                font: FontDescription::new("Serif", 9.0),
            }),
            ItemKind::ScaleBar(ScaleBarItem::default()),
            ItemKind::Picture(PictureItem {
                source: "north.svg".to_string(),
            }),
            ItemKind::Shape(ShapeItem {
                shape: ShapeType::Triangle,
                ..Default::default()
            }),
            ItemKind::Arrow(ArrowItem::new(Point2::new(0.0, 5.0), Point2::new(20.0, 5.0))),
            ItemKind::AttributeTable(AttributeTableItem {
                columns: vec!["name".to_string(), "pop".to_string()],
                ..Default::default()
            }),
            ItemKind::Frame(FrameItem {
                multi_frame: MultiFrameId(3),
                section: Rect::new(0.0, 50.0, 100.0, 50.0),
            }),
        ];
        for kind in &kinds {
            assert_eq!(&round_trip(kind), kind);
        }
    }

    #[test]
    fn test_unknown_element_name() {
        assert_eq!(ItemType::from_element_name("Paper"), None);
        assert_eq!(ItemType::from_element_name("Label"), Some(ItemType::Label));
    }

    #[test]
    fn test_arrow_resize_scales_points() {
        let mut kind = ItemKind::Arrow(ArrowItem::new(Point2::new(0.0, 5.0), Point2::new(20.0, 5.0)));
        kind.resized(&Rect::new(0.0, 0.0, 20.0, 10.0), &Rect::new(0.0, 0.0, 40.0, 20.0));
        match kind {
            ItemKind::Arrow(a) => {
                assert_eq!(a.stop, Point2::new(40.0, 10.0));
                assert_eq!(a.start, Point2::new(0.0, 10.0));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_label_paints_display_text() {
        let kind = ItemKind::Label(crate::item::label::Label::new("raw"));
        let mut list = DisplayList::new();
        let ctx = ItemPaintContext {
            display_text: Some("expanded"),
            rich_content: None,
        };
        kind.paint_content(&mut list, Rect::new(0.0, 0.0, 50.0, 10.0), &ctx);
        assert_eq!(list.texts(), vec!["expanded"]);
    }

    #[test]
    fn test_html_label_without_content_draws_nothing() {
        let mut label = crate::item::label::Label::new("<b>x</b>");
        label.html = true;
        let mut list = DisplayList::new();
        ItemKind::Label(label).paint_content(&mut list, Rect::new(0.0, 0.0, 5.0, 5.0), &ItemPaintContext::default());
        assert!(!list.commands.iter().any(|c| matches!(c, PaintCommand::Text { .. })));
    }
}
