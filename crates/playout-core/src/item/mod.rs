//! 版面图元
//!
//! 所有可放置元素共享同一个 [`Item`] 结构：
//! - 场景矩形（未旋转，绕中心旋转）
//! - 旋转角、Z 值、边框/背景、透明度、混合模式
//! - 选中/锁定标志与数据驱动覆盖
//!
//! 具体内容通过 [`ItemKind`] 区分。场景以 [`ItemId`] 为键持有全部图元，
//! 图元之间互不拥有。

mod kinds;
mod label;

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use kinds::{
    ArrowItem, AttributeTableItem, FrameItem, ItemKind, ItemType, LegendItem, MapExtent, MapItem, PictureItem,
    ScaleBarItem, ShapeItem, ShapeType,
};
pub use label::{
    replace_date_text, replace_expression_text, ApproximateTextMetrics, FontDescription, Label, LabelTextContext,
    TextMetrics, MM_PER_POINT,
};

use crate::data_defined::DataDefinedMap;
use crate::dom::Element;
use crate::error::XmlError;
use crate::math::{normalize_degrees, Point2, Rect, Transform2D};
use crate::paint::{ItemPaintContext, Painter};
use crate::style::{BackgroundStyle, BlendMode, Color, FrameStyle};

/// 场景内的图元键（单调递增）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item#{}", self.0)
    }
}

/// 定位参考点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ItemPositionMode {
    #[default]
    UpperLeft,
    UpperMiddle,
    UpperRight,
    MiddleLeft,
    Middle,
    MiddleRight,
    LowerLeft,
    LowerMiddle,
    LowerRight,
}

impl ItemPositionMode {
    const ALL: [ItemPositionMode; 9] = [
        ItemPositionMode::UpperLeft,
        ItemPositionMode::UpperMiddle,
        ItemPositionMode::UpperRight,
        ItemPositionMode::MiddleLeft,
        ItemPositionMode::Middle,
        ItemPositionMode::MiddleRight,
        ItemPositionMode::LowerLeft,
        ItemPositionMode::LowerMiddle,
        ItemPositionMode::LowerRight,
    ];

    pub fn code(&self) -> u8 {
        Self::ALL.iter().position(|m| m == self).unwrap_or(0) as u8
    }

    pub fn from_code(code: u8) -> Self {
        Self::ALL.get(code as usize).copied().unwrap_or_default()
    }

    /// 参考点在宽高上的比例 (0, 0.5, 1)
    pub fn fractions(&self) -> (f64, f64) {
        let code = self.code();
        ((code % 3) as f64 / 2.0, (code / 3) as f64 / 2.0)
    }
}

/// 版面图元
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub uuid: Uuid,
    /// 用户标识（不要求唯一）
    pub id: String,
    rect: Rect,
    rotation: f64,
    evaluated_rotation: f64,
    pub z_value: f64,
    pub frame: FrameStyle,
    pub background: BackgroundStyle,
    pub blend_mode: BlendMode,
    evaluated_blend_mode: BlendMode,
    /// 透明度 (0..=100)
    pub transparency: u8,
    evaluated_transparency: u8,
    pub locked: bool,
    pub selected: bool,
    /// 最近一次定位使用的参考点
    pub position_mode: ItemPositionMode,
    pub data_defined: DataDefinedMap,
    pub kind: ItemKind,
}

impl Item {
    pub fn new(kind: ItemKind, rect: Rect) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            id: String::new(),
            rect,
            rotation: 0.0,
            evaluated_rotation: 0.0,
            z_value: 0.0,
            frame: FrameStyle::default(),
            background: BackgroundStyle::default(),
            blend_mode: BlendMode::Normal,
            evaluated_blend_mode: BlendMode::Normal,
            transparency: 0,
            evaluated_transparency: 0,
            locked: false,
            selected: false,
            position_mode: ItemPositionMode::UpperLeft,
            data_defined: DataDefinedMap::new(),
            kind,
        }
    }

    pub fn item_type(&self) -> ItemType {
        self.kind.item_type()
    }

    /// 是否为纸张（页面）图元
    pub fn is_paper(&self) -> bool {
        matches!(self.kind, ItemKind::Paper)
    }

    pub fn as_label(&self) -> Option<&Label> {
        match &self.kind {
            ItemKind::Label(label) => Some(label),
            _ => None,
        }
    }

    pub fn as_label_mut(&mut self) -> Option<&mut Label> {
        match &mut self.kind {
            ItemKind::Label(label) => Some(label),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapItem> {
        match &self.kind {
            ItemKind::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_frame(&self) -> Option<&FrameItem> {
        match &self.kind {
            ItemKind::Frame(frame) => Some(frame),
            _ => None,
        }
    }

    /// 场景矩形（未旋转）
    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// 设置场景矩形，尺寸变化会通知具体内容
    pub fn set_rect(&mut self, rect: Rect) {
        let old = self.rect;
        self.rect = Rect::new(rect.x, rect.y, rect.width.max(0.0), rect.height.max(0.0));
        if (old.width - self.rect.width).abs() > f64::EPSILON || (old.height - self.rect.height).abs() > f64::EPSILON {
            self.kind.resized(&old, &self.rect);
        }
    }

    pub fn move_by(&mut self, dx: f64, dy: f64) {
        self.rect = self.rect.translated(dx, dy);
    }

    /// 以参考点定位：`point` 为参考点应处的场景坐标
    pub fn set_position(&mut self, point: Point2, mode: ItemPositionMode) {
        let (fx, fy) = mode.fractions();
        self.rect.x = point.x - self.rect.width * fx;
        self.rect.y = point.y - self.rect.height * fy;
        self.position_mode = mode;
    }

    /// 参考点的场景坐标
    pub fn reference_point(&self, mode: ItemPositionMode) -> Point2 {
        let (fx, fy) = mode.fractions();
        Point2::new(self.rect.x + self.rect.width * fx, self.rect.y + self.rect.height * fy)
    }

    /// 静态旋转角 [0, 360)
    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    /// 数据驱动覆盖后的旋转角
    pub fn evaluated_rotation(&self) -> f64 {
        self.evaluated_rotation
    }

    pub fn set_rotation(&mut self, degrees: f64) {
        self.rotation = normalize_degrees(degrees);
        self.evaluated_rotation = self.rotation;
    }

    pub(crate) fn set_evaluated_rotation(&mut self, degrees: f64) {
        self.evaluated_rotation = normalize_degrees(degrees);
    }

    pub fn evaluated_transparency(&self) -> u8 {
        self.evaluated_transparency
    }

    pub fn set_transparency(&mut self, transparency: u8) {
        self.transparency = transparency.min(100);
        self.evaluated_transparency = self.transparency;
    }

    pub(crate) fn set_evaluated_transparency(&mut self, transparency: u8) {
        self.evaluated_transparency = transparency.min(100);
    }

    pub fn evaluated_blend_mode(&self) -> BlendMode {
        self.evaluated_blend_mode
    }

    pub fn set_blend_mode(&mut self, mode: BlendMode) {
        self.blend_mode = mode;
        self.evaluated_blend_mode = mode;
    }

    pub(crate) fn set_evaluated_blend_mode(&mut self, mode: BlendMode) {
        self.evaluated_blend_mode = mode;
    }

    /// 旋转后的场景包围盒
    pub fn bounding_rect(&self) -> Rect {
        self.rect.rotated_bounds(self.evaluated_rotation)
    }

    /// 局部坐标 → 场景坐标的变换
    pub fn scene_transform(&self) -> Transform2D {
        let half_w = self.rect.width / 2.0;
        let half_h = self.rect.height / 2.0;
        Transform2D::identity()
            .translate(self.rect.x + half_w, self.rect.y + half_h)
            .rotate(self.evaluated_rotation)
            .translate(-half_w, -half_h)
    }

    /// 场景点是否落在（旋转后的）图元内
    pub fn contains(&self, point: &Point2) -> bool {
        match self.scene_transform().inverse() {
            Some(inverse) => {
                let local = inverse.apply(*point);
                Rect::new(0.0, 0.0, self.rect.width, self.rect.height).contains(&local)
            }
            None => false,
        }
    }

    /// 在局部坐标中绘制：背景、内容、边框
    ///
    /// 调用方负责将画笔变换到图元局部坐标（见 [`Item::scene_transform`]）。
    pub fn paint(&self, painter: &mut dyn Painter, ctx: &ItemPaintContext<'_>) {
        let local = Rect::new(0.0, 0.0, self.rect.width, self.rect.height);
        painter.save();
        painter.set_opacity(1.0 - self.evaluated_transparency as f64 / 100.0);
        painter.set_blend_mode(self.evaluated_blend_mode);

        if self.background.enabled && !self.is_paper() {
            painter.fill_rect(local, self.background.color);
        }

        let pen = self.frame.pen_width();
        let content = Rect::new(
            pen,
            pen,
            (local.width - 2.0 * pen).max(0.0),
            (local.height - 2.0 * pen).max(0.0),
        );
        self.kind.paint_content(painter, content, ctx);

        if self.frame.enabled {
            painter.stroke_rect(local, self.frame.color, self.frame.width);
        }
        painter.restore();
    }

    /// 写出 `<种类><…内容…><Item …/></种类>`
    pub fn write_xml(&self) -> Element {
        let mut element = Element::new(self.item_type().element_name());
        self.kind.write_payload(&mut element);
        element.append_child(self.write_generic_xml());
        element
    }

    fn write_generic_xml(&self) -> Element {
        let mut e = Element::new("Item")
            .with_attribute("uuid", self.uuid)
            .with_attribute("id", &self.id)
            .with_attribute("x", self.rect.x)
            .with_attribute("y", self.rect.y)
            .with_attribute("width", self.rect.width)
            .with_attribute("height", self.rect.height)
            .with_attribute("positionMode", self.position_mode.code())
            .with_attribute("itemRotation", self.rotation)
            .with_attribute("zValue", self.z_value)
            .with_attribute("frame", self.frame.enabled)
            .with_attribute("outlineWidth", self.frame.width)
            .with_attribute("background", self.background.enabled)
            .with_attribute("positionLock", self.locked)
            .with_attribute("transparency", self.transparency)
            .with_attribute("blendMode", self.blend_mode.name());
        write_color(&mut e, "FrameColor", self.frame.color);
        write_color(&mut e, "BackgroundColor", self.background.color);
        self.data_defined.write_xml(&mut e);
        e
    }

    /// 读取种类元素
    ///
    /// 旧文档在 `<Item>` 上使用 `rotation` 属性；非零时通过
    /// [`Item::set_rotation`] 应用，存在 `itemRotation` 时以后者为准。
    pub fn read_xml(element: &Element, default_font: &FontDescription) -> Result<Item, XmlError> {
        let item_type = ItemType::from_element_name(element.name())
            .ok_or_else(|| XmlError::MissingElement(format!("item kind <{}>", element.name())))?;
        let kind = ItemKind::read_payload(item_type, element, default_font)?;
        let generic = element
            .first_child("Item")
            .ok_or_else(|| XmlError::MissingElement("Item".to_string()))?;

        let rect = Rect::new(
            generic.required_attr("x")?,
            generic.required_attr("y")?,
            generic.required_attr("width")?,
            generic.required_attr("height")?,
        );
        let mut item = Item::new(kind, rect);

        if let Some(uuid) = generic.attribute("uuid").and_then(|u| Uuid::parse_str(u).ok()) {
            item.uuid = uuid;
        }
        item.id = generic.attribute("id").unwrap_or_default().to_string();
        item.position_mode = ItemPositionMode::from_code(generic.attr_or("positionMode", 0));

        let legacy_rotation: f64 = generic.attr_or("rotation", 0.0);
        if legacy_rotation != 0.0 {
            item.set_rotation(legacy_rotation);
        }
        if let Some(rotation) = generic.attr::<f64>("itemRotation") {
            item.set_rotation(rotation);
        }

        item.z_value = generic.attr_or("zValue", 0.0);
        item.frame.enabled = generic.attr_bool("frame", false);
        item.frame.width = generic.attr_or("outlineWidth", item.frame.width);
        item.background.enabled = generic.attr_bool("background", true);
        item.locked = generic.attr_bool("positionLock", false);
        item.set_transparency(generic.attr_or("transparency", 0));
        item.set_blend_mode(
            generic
                .attribute("blendMode")
                .and_then(BlendMode::from_name)
                .unwrap_or_default(),
        );
        if let Some(c) = generic.first_child("FrameColor") {
            item.frame.color = Color::read_attributes(c);
        }
        if let Some(c) = generic.first_child("BackgroundColor") {
            item.background.color = Color::read_attributes(c);
        }
        item.data_defined = DataDefinedMap::read_xml(generic);
        Ok(item)
    }
}

fn write_color(parent: &mut Element, name: &str, color: Color) {
    color.write_attributes(parent.append_child(Element::new(name)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_defined::{DataDefined, DataDefinedProperty};
    use crate::paint::{DisplayList, PaintCommand};
    use crate::style::{HAlign, VAlign};

    fn label_item() -> Item {
        let mut label = Label::new("Hello");
        label.margin = 2.0;
        label.halign = HAlign::Right;
        label.valign = VAlign::Center;
        label.font = FontDescription::new("Serif", 12.0);
        label.font_color = Color::rgb(1, 2, 3);
        Item::new(ItemKind::Label(label), Rect::new(10.0, 20.0, 40.0, 10.0))
    }

    #[test]
    fn test_position_mode_fractions() {
        assert_eq!(ItemPositionMode::UpperLeft.fractions(), (0.0, 0.0));
        assert_eq!(ItemPositionMode::Middle.fractions(), (0.5, 0.5));
        assert_eq!(ItemPositionMode::LowerRight.fractions(), (1.0, 1.0));
        assert_eq!(ItemPositionMode::from_code(7), ItemPositionMode::LowerMiddle);
        assert_eq!(ItemPositionMode::from_code(42), ItemPositionMode::UpperLeft);
    }

    #[test]
    fn test_set_position_by_reference_point() {
        let mut item = label_item();
        item.set_position(Point2::new(100.0, 100.0), ItemPositionMode::LowerRight);
        assert_eq!(item.rect(), Rect::new(60.0, 90.0, 40.0, 10.0));
        assert_eq!(item.reference_point(ItemPositionMode::Middle), Point2::new(80.0, 95.0));
    }

    #[test]
    fn test_rotation_normalised() {
        let mut item = label_item();
        item.set_rotation(-90.0);
        assert_eq!(item.rotation(), 270.0);
        item.set_rotation(720.0);
        assert_eq!(item.rotation(), 0.0);
    }

    #[test]
    fn test_contains_honours_rotation() {
        let mut item = Item::new(ItemKind::Paper, Rect::new(0.0, 0.0, 40.0, 10.0));
        assert!(!item.contains(&Point2::new(20.0, -10.0)));
        item.set_rotation(90.0);
        // 绕中心 (20, 5) 旋转后纵向延伸到 y = -15..25
        assert!(item.contains(&Point2::new(20.0, -10.0)));
        assert!(!item.contains(&Point2::new(2.0, 5.0)));
    }

    #[test]
    fn test_label_round_trip() {
        let mut item = label_item();
        item.id = "title".to_string();
        item.set_rotation(30.0);
        item.frame.enabled = true;
        item.locked = true;
        item.set_transparency(40);
        item.set_blend_mode(BlendMode::Multiply);
        item.data_defined
            .set(DataDefinedProperty::PositionX, DataDefined::from_field("x"));

        let text = item.write_xml().to_xml_string();
        let parsed = Element::parse(&text).unwrap();
        let read = Item::read_xml(&parsed, &FontDescription::default()).unwrap();
        assert_eq!(read, item);
    }

    #[test]
    fn test_legacy_rotation_attribute() {
        let xml = r#"<Label labelText="x"><Item x="0" y="0" width="10" height="5" rotation="-45"/></Label>"#;
        let item = Item::read_xml(&Element::parse(xml).unwrap(), &FontDescription::default()).unwrap();
        assert_eq!(item.rotation(), 315.0);
        assert_eq!(item.evaluated_rotation(), 315.0);

        let xml = r#"<Label labelText="x"><Item x="0" y="0" width="10" height="5" rotation="45" itemRotation="10"/></Label>"#;
        let item = Item::read_xml(&Element::parse(xml).unwrap(), &FontDescription::default()).unwrap();
        assert_eq!(item.rotation(), 10.0);
    }

    #[test]
    fn test_read_requires_geometry() {
        let xml = r#"<Label labelText="x"><Item x="0" y="0" width="abc" height="5"/></Label>"#;
        let result = Item::read_xml(&Element::parse(xml).unwrap(), &FontDescription::default());
        assert!(matches!(result, Err(XmlError::InvalidAttribute { .. })));

        let xml = r#"<Label labelText="x"/>"#;
        let result = Item::read_xml(&Element::parse(xml).unwrap(), &FontDescription::default());
        assert!(matches!(result, Err(XmlError::MissingElement(_))));
    }

    #[test]
    fn test_paint_order_background_content_frame() {
        let mut item = label_item();
        item.frame.enabled = true;
        let mut list = DisplayList::new();
        item.paint(&mut list, &ItemPaintContext::default());
        let kinds: Vec<&str> = list
            .commands
            .iter()
            .filter_map(|c| match c {
                PaintCommand::FillRect { .. } => Some("fill"),
                PaintCommand::Text { .. } => Some("text"),
                PaintCommand::StrokeRect { .. } => Some("stroke"),
                _ => None,
            })
            .collect();
        assert_eq!(kinds, vec!["fill", "text", "stroke"]);
    }
}
