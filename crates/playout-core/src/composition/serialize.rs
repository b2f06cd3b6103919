//! 文档片段读写
//!
//! ```text
//! <Composer formatVersion="1">
//!   <Composition paperWidth=… paperHeight=… numPages=… …>
//!     <Grid …/> <SnapLine …/>* <Atlas …/>? <dataDefinedProperties>?
//!   </Composition>
//!   <Label>…</Label> <Map>…</Map> …            （按 Z 序自底向上）
//!   <HtmlMultiFrame resizeMode=…><ContentHtml/><Frame>…</Frame>*</HtmlMultiFrame>
//! </Composer>
//! ```

use std::collections::BTreeMap;

use uuid::Uuid;

use super::Composition;
use crate::command::{AddRemoveState, Command, FrameSlot};
use crate::data_defined::DataDefinedMap;
use crate::dom::Element;
use crate::error::XmlError;
use crate::item::{Item, ItemId, ItemKind, ItemType};
use crate::math::Point2;
use crate::multiframe::MultiFrame;
use crate::snap::{SnapLineOrientation, SnapSettings};
use crate::template::{substitute, SubstitutionMap};

pub const FORMAT_VERSION: &str = "1";

/// `<Composition>` 元素中的场景设置，先完整校验再应用
struct CompositionSettings {
    paper_width: f64,
    paper_height: f64,
    num_pages: usize,
    spacing: f64,
    print_resolution: u32,
    use_advanced_effects: bool,
    print_as_raster: bool,
    generate_world_file: bool,
    world_file_map: Option<u32>,
    snap: SnapSettings,
    snap_lines: Vec<(SnapLineOrientation, f64)>,
    atlas: Option<(bool, Vec<String>, String)>,
    data_defined: DataDefinedMap,
}

impl CompositionSettings {
    fn read(element: &Element, defaults: &Composition) -> Result<Self, XmlError> {
        let positive = |name: &str| -> Result<f64, XmlError> {
            let value: f64 = element.required_attr(name)?;
            if value > 0.0 && value.is_finite() {
                Ok(value)
            } else {
                Err(XmlError::InvalidAttribute {
                    attribute: name.to_string(),
                    value: value.to_string(),
                })
            }
        };

        let mut snap = defaults.snapper.settings().clone();
        if let Some(grid) = element.first_child("Grid") {
            snap.snap_to_grid = grid.attr_bool("snapping", snap.snap_to_grid);
            snap.grid_visible = grid.attr_bool("visible", snap.grid_visible);
            snap.grid_resolution = grid.attr_or("resolution", snap.grid_resolution);
            snap.grid_offset_x = grid.attr_or("offsetX", snap.grid_offset_x);
            snap.grid_offset_y = grid.attr_or("offsetY", snap.grid_offset_y);
            snap.snap_lines_visible = grid.attr_bool("snapLinesVisible", snap.snap_lines_visible);
            snap.alignment_snap = grid.attr_bool("alignmentSnap", snap.alignment_snap);
            snap.smart_guides = grid.attr_bool("smartGuides", snap.smart_guides);
            snap.tolerance_px = grid.attr_or("tolerance", snap.tolerance_px);
        }

        let mut snap_lines = Vec::new();
        for line in element.children_named("SnapLine") {
            let orientation = match line.attribute("orientation") {
                Some("horizontal") => SnapLineOrientation::Horizontal,
                Some("vertical") => SnapLineOrientation::Vertical,
                other => {
                    return Err(XmlError::InvalidAttribute {
                        attribute: "orientation".to_string(),
                        value: other.unwrap_or_default().to_string(),
                    })
                }
            };
            snap_lines.push((orientation, line.required_attr("position")?));
        }

        let atlas = element.first_child("Atlas").map(|a| {
            let fields = a
                .attribute("fields")
                .map(|f| f.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect())
                .unwrap_or_default();
            (
                a.attr_bool("enabled", false),
                fields,
                a.attribute("filenamePattern").unwrap_or_default().to_string(),
            )
        });

        Ok(Self {
            paper_width: positive("paperWidth")?,
            paper_height: positive("paperHeight")?,
            num_pages: element.attr_or("numPages", 1usize).max(1),
            spacing: element.attr_or("spaceBetweenPages", defaults.layout.spacing),
            print_resolution: element.attr_or("printResolution", defaults.print_resolution).max(1),
            use_advanced_effects: element.attr_bool("useAdvancedEffects", true),
            print_as_raster: element.attr_bool("printAsRaster", false),
            generate_world_file: element.attr_bool("generateWorldFile", false),
            world_file_map: element.attr("worldFileMap"),
            snap,
            snap_lines,
            atlas,
            data_defined: DataDefinedMap::read_xml(element),
        })
    }

    fn apply(self, composition: &mut Composition) {
        composition.layout.spacing = self.spacing;
        composition.static_num_pages = self.num_pages;
        composition.apply_num_pages(self.num_pages);
        composition.set_paper_size(self.paper_width, self.paper_height);
        composition.update_paper_items();
        composition.print_resolution = self.print_resolution;
        composition.use_advanced_effects = self.use_advanced_effects;
        composition.print_as_raster = self.print_as_raster;
        composition.generate_world_file = self.generate_world_file;
        *composition.snapper.settings_mut() = self.snap;
        composition.clear_snap_lines();
        for (orientation, position) in self.snap_lines {
            composition.add_snap_line(orientation, position);
        }
        if let Some((enabled, fields, pattern)) = self.atlas {
            composition.atlas.enabled = enabled;
            composition.atlas.fields = fields;
            composition.atlas.filename_pattern = pattern;
        }
        composition.data_defined = self.data_defined;
        composition.resolver.clear();
    }
}

/// 取出 `<Composer>` 中的 `<Composition>`，并检查格式版本
fn composition_element(root: &Element) -> Result<&Element, XmlError> {
    if root.name() == "Composition" {
        return Ok(root);
    }
    if root.name() != "Composer" {
        return Err(XmlError::MissingElement("Composer".to_string()));
    }
    if let Some(version) = root.attribute("formatVersion") {
        if version != FORMAT_VERSION {
            return Err(XmlError::UnsupportedVersion(version.to_string()));
        }
    }
    root.first_child("Composition")
        .ok_or_else(|| XmlError::MissingElement("Composition".to_string()))
}

fn set_frame_owner(item: &mut Item, owner: crate::multiframe::MultiFrameId) {
    if let ItemKind::Frame(frame) = &mut item.kind {
        frame.multi_frame = owner;
    }
}

impl Composition {
    /// 整个场景的文档片段
    pub fn write_xml(&self) -> Element {
        let mut root = Element::new("Composer").with_attribute("formatVersion", FORMAT_VERSION);
        root.append_child(self.write_composition_element());

        for id in self.z_order.iter() {
            let Some(item) = self.items.get(&id) else {
                continue;
            };
            if item.item_type() == ItemType::Frame {
                continue;
            }
            root.append_child(item.write_xml());
        }

        for (id, mf) in &self.multi_frames {
            let mut element = mf.write_xml().with_attribute("id", id.0);
            for frame in mf.frames() {
                if let Some(item) = self.items.get(frame) {
                    element.append_child(item.write_xml());
                }
            }
            root.append_child(element);
        }
        root
    }

    fn write_composition_element(&self) -> Element {
        let mut element = Element::new("Composition")
            .with_attribute("paperWidth", self.static_paper_size.0)
            .with_attribute("paperHeight", self.static_paper_size.1)
            .with_attribute("numPages", self.static_num_pages)
            .with_attribute("spaceBetweenPages", self.layout.spacing)
            .with_attribute("printResolution", self.print_resolution)
            .with_attribute("useAdvancedEffects", self.use_advanced_effects)
            .with_attribute("printAsRaster", self.print_as_raster)
            .with_attribute("generateWorldFile", self.generate_world_file);
        if let Some(map_id) = self
            .world_file_map
            .and_then(|id| self.items.get(&id))
            .and_then(Item::as_map)
            .map(|m| m.map_id)
        {
            element.set_attribute("worldFileMap", map_id);
        }

        let snap = self.snapper.settings();
        element.append_child(
            Element::new("Grid")
                .with_attribute("snapping", snap.snap_to_grid)
                .with_attribute("visible", snap.grid_visible)
                .with_attribute("resolution", snap.grid_resolution)
                .with_attribute("offsetX", snap.grid_offset_x)
                .with_attribute("offsetY", snap.grid_offset_y)
                .with_attribute("snapLinesVisible", snap.snap_lines_visible)
                .with_attribute("alignmentSnap", snap.alignment_snap)
                .with_attribute("smartGuides", snap.smart_guides)
                .with_attribute("tolerance", snap.tolerance_px),
        );
        for line in &self.snap_lines {
            let orientation = match line.orientation {
                SnapLineOrientation::Horizontal => "horizontal",
                SnapLineOrientation::Vertical => "vertical",
            };
            element.append_child(
                Element::new("SnapLine")
                    .with_attribute("orientation", orientation)
                    .with_attribute("position", line.position),
            );
        }
        if self.atlas.enabled || !self.atlas.fields.is_empty() {
            element.append_child(
                Element::new("Atlas")
                    .with_attribute("enabled", self.atlas.enabled)
                    .with_attribute("fields", self.atlas.fields.join(","))
                    .with_attribute("filenamePattern", &self.atlas.filename_pattern),
            );
        }
        self.data_defined.write_xml(&mut element);
        element
    }

    /// 序列化为完整 XML 文档
    pub fn to_xml_string(&self) -> String {
        self.write_xml().to_document_string()
    }

    /// 从文档片段恢复整个场景
    ///
    /// 设置校验失败时场景不变；单个图元元素损坏时跳过并记录警告。
    pub fn read_xml(&mut self, root: &Element) -> Result<(), XmlError> {
        let settings = CompositionSettings::read(composition_element(root)?, self)?;
        let world_file_map = settings.world_file_map;

        self.item_recorder.cancel();
        self.multi_frame_recorder.cancel();
        self.clear_items();
        self.undo_stack.clear();
        self.world_file_map = None;
        self.atlas_mode = crate::atlas::AtlasMode::Off;
        self.atlas.end_render();
        settings.apply(self);

        self.read_items(root, None, false, false);
        self.refresh_z_list();
        self.world_file_map = world_file_map.and_then(|map_id| self.map_by_id(map_id));
        self.refresh_items();
        Ok(())
    }

    /// 从 XML 文本恢复整个场景
    pub fn load_from_xml(&mut self, text: &str) -> Result<(), XmlError> {
        self.read_xml(&Element::parse(text)?)
    }

    /// 从模板加载：先替换占位符，清除图元 uuid 后按整个场景读取
    ///
    /// 返回读入的图元数。`add_undo` 时每个图元生成一条添加命令。
    pub fn load_from_template(
        &mut self,
        text: &str,
        substitutions: &SubstitutionMap,
        add_undo: bool,
    ) -> Result<usize, XmlError> {
        let text = substitute(text, substitutions);
        let mut root = Element::parse(&text)?;
        root.for_each_descendant_mut("Item", &mut |item| {
            item.remove_attribute("uuid");
        });
        self.read_xml(&root)?;

        let count = self.item_count();
        if add_undo {
            let commands = self.add_commands(&self.z_order.iter().collect::<Vec<_>>());
            self.push_group("Items added", commands);
        }
        tracing::info!("Loaded template with {} items", count);
        Ok(count)
    }

    /// 把片段中的图元添加到场景顶层（粘贴）
    ///
    /// - `paste_position`：图元整体左上角移到该点；
    /// - `paste_in_place`：保持页面局部位置，只换到该点所在页。
    ///
    /// 返回新图元，按 Z 序自底向上。
    pub fn add_items_from_xml(
        &mut self,
        root: &Element,
        paste_position: Option<Point2>,
        paste_in_place: bool,
        add_undo: bool,
    ) -> Vec<ItemId> {
        let added = self.read_items(root, paste_position, paste_in_place, true);
        if add_undo {
            let commands = self.add_commands(&added);
            self.push_group("Items added", commands);
        }
        added
    }

    fn add_commands(&self, ids: &[ItemId]) -> Vec<Command> {
        ids.iter()
            .filter_map(|id| {
                let item = self.items.get(id)?;
                let slot = item.as_frame().and_then(|f| {
                    let index = self.multi_frames.get(&f.multi_frame)?.frame_index(*id)?;
                    Some(FrameSlot {
                        multi_frame: f.multi_frame,
                        index,
                    })
                });
                let mut state = item.clone();
                state.selected = false;
                Some(Command::AddRemove {
                    id: *id,
                    item: Box::new(state),
                    state: AddRemoveState::Added,
                    slot,
                    world_file_map: self.world_file_map == Some(*id),
                    text: "Item added".to_string(),
                })
            })
            .collect()
    }

    /// 读取根元素下的图元与多帧
    fn read_items(
        &mut self,
        root: &Element,
        paste_position: Option<Point2>,
        paste_in_place: bool,
        on_top: bool,
    ) -> Vec<ItemId> {
        let default_font = self.config.default_font.clone();
        let read = |element: &Element| match Item::read_xml(element, &default_font) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!("Skipping malformed <{}> element: {}", element.name(), e);
                None
            }
        };

        // (图元, 所属多帧在片段中的序号)
        let mut loaded: Vec<(Item, Option<usize>)> = Vec::new();
        let mut multi_frames = Vec::new();
        for child in root.children() {
            if child.name() == "HtmlMultiFrame" {
                let index = multi_frames.len();
                multi_frames.push(MultiFrame::read_xml(child));
                for frame in child.children_named("Frame") {
                    if let Some(item) = read(frame) {
                        loaded.push((item, Some(index)));
                    }
                }
            } else if child.name() == "Frame" {
                tracing::warn!("Skipping frame outside of a multi-frame");
            } else if ItemType::from_element_name(child.name()).is_some() {
                if let Some(item) = read(child) {
                    loaded.push((item, None));
                }
            }
        }

        if let Some(position) = paste_position {
            self.place_pasted(&mut loaded, position, paste_in_place);
        }
        // 保持片段内的相对 Z 序
        loaded.sort_by(|a, b| a.0.z_value.total_cmp(&b.0.z_value));

        let owners: Vec<_> = multi_frames
            .into_iter()
            .map(|mf| self.add_multi_frame(mf))
            .collect();
        let mut frames_by_owner: BTreeMap<usize, Vec<(usize, ItemId)>> = BTreeMap::new();
        let mut added = Vec::with_capacity(loaded.len());
        for (order, (mut item, owner)) in loaded.into_iter().enumerate() {
            if self.item_by_uuid(item.uuid).is_some() || item.uuid.is_nil() {
                item.uuid = Uuid::new_v4();
            }
            if let Some(owner) = owner {
                set_frame_owner(&mut item, owners[owner]);
            }
            let id = self.allocate_item_id();
            self.insert_with_id(id, item, on_top);
            if let Some(owner) = owner {
                frames_by_owner.entry(owner).or_default().push((order, id));
            }
            added.push(id);
        }
        // 帧顺序以片段中的书写顺序为准
        for (owner, frames) in frames_by_owner {
            let mut frames = frames;
            frames.sort_by_key(|(order, _)| *order);
            if let Some(mf) = self.multi_frames.get_mut(&owners[owner]) {
                for (_, id) in frames {
                    mf.add_frame(id);
                }
            }
        }
        added
    }

    fn place_pasted(&self, loaded: &mut [(Item, Option<usize>)], position: Point2, in_place: bool) {
        if in_place {
            let page = self.layout.page_number_for_point(position);
            for (item, _) in loaded.iter_mut() {
                let rect = item.rect();
                let local = self.layout.position_on_page(rect.top_left());
                let target = self.layout.scene_position(page, local);
                item.move_by(target.x - rect.x, target.y - rect.y);
            }
            return;
        }
        let Some((min_x, min_y)) = loaded
            .iter()
            .map(|(item, _)| item.rect().top_left())
            .fold(None, |acc: Option<(f64, f64)>, p| match acc {
                Some((x, y)) => Some((x.min(p.x), y.min(p.y))),
                None => Some((p.x, p.y)),
            })
        else {
            return;
        };
        for (item, _) in loaded.iter_mut() {
            item.move_by(position.x - min_x, position.y - min_y);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompositionConfig;
    use crate::data_defined::{DataDefined, DataDefinedProperty};
    use crate::item::{Label, MapItem, ShapeItem};
    use crate::math::Rect;

    fn sample() -> Composition {
        let mut c = Composition::new(CompositionConfig::default());
        c.set_paper_size(210.0, 297.0);
        c.set_num_pages(2);
        c.set_print_resolution(150);
        c.snap_settings_mut().snap_to_grid = true;
        c.add_snap_line(SnapLineOrientation::Vertical, 42.0);
        c.set_data_defined_property(DataDefinedProperty::NumPages, DataDefined::from_field("pages"));
        let label = c.add_label(Label::new("Title"), Rect::new(10.0, 10.0, 50.0, 10.0));
        c.modify_item(label, |i| i.id = "title".to_string());
        let map = c.add_map(MapItem::default(), Rect::new(10.0, 30.0, 100.0, 100.0));
        c.set_world_file_map(Some(map));
        let shape = c.add_shape(ShapeItem::default(), Rect::new(20.0, 320.0, 10.0, 10.0));
        c.move_item_to_bottom(shape);
        let mf = c.add_multi_frame(MultiFrame::new("<b>html</b>"));
        c.add_html_frame(mf, Rect::new(0.0, 200.0, 40.0, 40.0));
        c.add_html_frame(mf, Rect::new(0.0, 400.0, 40.0, 40.0));
        c
    }

    #[test]
    fn test_document_round_trip() {
        let original = sample();
        let text = original.to_xml_string();
        let mut restored = Composition::default();
        restored.load_from_xml(&text).unwrap();

        assert_eq!(restored.paper_width(), 210.0);
        assert_eq!(restored.num_pages(), 2);
        assert_eq!(restored.print_resolution(), 150);
        assert!(restored.snap_settings().snap_to_grid);
        assert_eq!(restored.snap_lines().len(), 1);
        assert!(restored
            .data_defined_property(DataDefinedProperty::NumPages)
            .is_some());
        assert_eq!(restored.item_count(), 5);
        assert!(restored.undo_stack().is_empty());

        let types: Vec<ItemType> = restored
            .z_order()
            .iter()
            .map(|id| restored.item(id).unwrap().item_type())
            .collect();
        assert_eq!(types[0], ItemType::Shape);
        assert_eq!(&types[1..3], &[ItemType::Label, ItemType::Map]);

        let title = restored.item_by_id("title").unwrap();
        let uuid = original.item(original.item_by_id("title").unwrap()).unwrap().uuid;
        assert_eq!(restored.item(title).unwrap().uuid, uuid);

        let map = restored.world_file_map().unwrap();
        assert!(restored.item(map).unwrap().as_map().is_some());

        let (_, mf) = restored.multi_frames().next().unwrap();
        assert_eq!(mf.html, "<b>html</b>");
        assert_eq!(mf.frames().len(), 2);
        let first = restored.item(mf.frames()[0]).unwrap();
        assert_eq!(first.rect().y, 200.0);
    }

    #[test]
    fn test_invalid_document_leaves_scene_untouched() {
        let mut c = sample();
        let before = c.item_count();
        let bad = r#"<Composer formatVersion="1"><Composition paperWidth="-4" paperHeight="10"/></Composer>"#;
        assert!(matches!(c.load_from_xml(bad), Err(XmlError::InvalidAttribute { .. })));
        assert_eq!(c.item_count(), before);

        let newer = r#"<Composer formatVersion="7"><Composition paperWidth="4" paperHeight="10"/></Composer>"#;
        assert_eq!(c.load_from_xml(newer), Err(XmlError::UnsupportedVersion("7".to_string())));
        assert!(matches!(c.load_from_xml("<Other/>"), Err(XmlError::MissingElement(_))));
        assert!(matches!(c.load_from_xml("<Composer>"), Err(XmlError::Parse(_))));
        assert_eq!(c.item_count(), before);
    }

    #[test]
    fn test_malformed_item_is_skipped() {
        let text = r#"<Composer formatVersion="1">
            <Composition paperWidth="100" paperHeight="100"/>
            <Shape shapeType="0"><Item x="1" y="2" width="3" height="4"/></Shape>
            <Shape shapeType="0"><Item x="1" y="2"/></Shape>
            <Legend title="no generic part"/>
        </Composer>"#;
        let mut c = Composition::default();
        c.load_from_xml(text).unwrap();
        assert_eq!(c.item_count(), 1);
        assert_eq!(c.paper_width(), 100.0);
    }

    #[test]
    fn test_template_substitution_strips_uuids() {
        let original = sample();
        let text = original.to_xml_string().replace("Title", "[title]");
        let mut subs = SubstitutionMap::new();
        subs.insert("title".to_string(), "Rivers & Lakes".to_string());

        let mut c = Composition::default();
        let count = c.load_from_template(&text, &subs, true).unwrap();
        assert_eq!(count, 5);
        let title = c.item_by_id("title").unwrap();
        assert_eq!(c.item(title).unwrap().as_label().unwrap().text, "Rivers & Lakes");
        let old_uuid = original.item(original.item_by_id("title").unwrap()).unwrap().uuid;
        assert_ne!(c.item(title).unwrap().uuid, old_uuid);

        assert_eq!(c.undo_stack().undo_text(), Some("Items added"));
        c.undo().unwrap();
        assert_eq!(c.item_count(), 0);
        c.redo().unwrap();
        assert_eq!(c.item_count(), 5);
    }

    #[test]
    fn test_paste_goes_on_top_at_position() {
        let source = sample();
        let fragment = source.write_xml();
        let mut c = Composition::default();
        let existing = c.add_shape(ShapeItem::default(), Rect::new(0.0, 0.0, 5.0, 5.0));

        let added = c.add_items_from_xml(&fragment, Some(Point2::new(100.0, 50.0)), false, true);
        assert_eq!(added.len(), 5);
        assert_eq!(c.z_order().as_slice()[0], existing);
        assert_eq!(&c.z_order().as_slice()[1..], added.as_slice());
        let min_x = added.iter().map(|id| c.item(*id).unwrap().rect().x).fold(f64::MAX, f64::min);
        let min_y = added.iter().map(|id| c.item(*id).unwrap().rect().y).fold(f64::MAX, f64::min);
        assert_eq!((min_x, min_y), (100.0, 50.0));

        // 再次粘贴：uuid 不重复
        let again = c.add_items_from_xml(&fragment, None, false, false);
        for (a, b) in added.iter().zip(again.iter()) {
            assert_ne!(c.item(*a).unwrap().uuid, c.item(*b).unwrap().uuid);
        }

        c.undo().unwrap();
        assert!(added.iter().all(|id| c.item(*id).is_none()));
    }

    #[test]
    fn test_paste_in_place_keeps_page_offset() {
        let mut source = Composition::default();
        source.add_shape(ShapeItem::default(), Rect::new(12.0, 30.0, 5.0, 5.0));
        let fragment = source.write_xml();

        let mut c = Composition::default();
        c.set_num_pages(3);
        // 第三页：顶边 2 * 220
        let added = c.add_items_from_xml(&fragment, Some(Point2::new(0.0, 450.0)), true, false);
        assert_eq!(c.item(added[0]).unwrap().rect().top_left(), Point2::new(12.0, 470.0));
    }
}
