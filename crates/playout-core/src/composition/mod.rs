//! 版面场景
//!
//! [`Composition`] 是打印版面的聚合根，独占持有：
//! - 图元集合（以 [`ItemId`] 为键的 arena，含每页一个纸张图元）
//! - Z 序登记表、多帧对象、捕捉线与捕捉设置
//! - 撤销栈与两条命令记录流（图元 / 多帧）
//! - 图集迭代状态与场景级数据驱动属性
//!
//! 所有修改都经过场景的方法，变更通知写入事件队列，由调用方通过
//! [`Composition::take_events`] 取走。

mod refresh;
mod render;
mod serialize;

use std::collections::BTreeMap;

use uuid::Uuid;

pub use render::{DocumentDevice, PagedDevice, RasterSurface, WorldFileParameters};
pub use serialize::FORMAT_VERSION;

use crate::atlas::{AtlasComposition, AtlasMode};
use crate::command::{
    AddRemoveState, Command, CommandRecorder, CommandTarget, FrameSlot, MergeContext, UndoStack,
};
use crate::config::CompositionConfig;
use crate::content::{ContentLoader, InlineContentLoader};
use crate::data_defined::{
    BasicEvaluator, DataDefined, DataDefinedMap, DataDefinedOwner, DataDefinedProperty, DataDefinedResolver,
    ExpressionEvaluator,
};
use crate::error::CommandError;
use crate::item::{
    ApproximateTextMetrics, ArrowItem, AttributeTableItem, FrameItem, Item, ItemId, ItemKind, ItemPositionMode,
    ItemType, Label, LegendItem, MapItem, PictureItem, ScaleBarItem, ShapeItem, TextMetrics, MM_PER_POINT,
};
use crate::math::{Point2, Rect};
use crate::multiframe::{MultiFrame, MultiFrameId};
use crate::page::PageLayout;
use crate::snap::{
    nearest_snap_line, AlignTargets, SnapEngine, SnapLine, SnapLineId, SnapLineOrientation, SnapResult, SnapSettings,
};
use crate::zorder::ZOrderList;

/// 输出风格
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlotStyle {
    #[default]
    Preview,
    Print,
    Postscript,
}

/// 按 Z 序切换选择的方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZValueDirection {
    Below,
    Above,
}

/// 选中图元的对齐方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Left,
    HCenter,
    Right,
    Top,
    VCenter,
    Bottom,
}

impl Alignment {
    fn command_text(&self) -> &'static str {
        match self {
            Alignment::Left => "Aligned items left",
            Alignment::HCenter => "Aligned items horizontal center",
            Alignment::Right => "Aligned items right",
            Alignment::Top => "Aligned items top",
            Alignment::VCenter => "Aligned items vertical center",
            Alignment::Bottom => "Aligned items bottom",
        }
    }
}

/// 场景变更通知
#[derive(Debug, Clone, PartialEq)]
pub enum CompositionEvent {
    ItemAdded { id: ItemId, item_type: ItemType },
    ItemRemoved(ItemId),
    ItemChanged(ItemId),
    PaperSizeChanged,
    PagesChanged,
    PrintResolutionChanged,
    SelectedItemChanged(Option<ItemId>),
    RefreshItemsTriggered,
    AtlasFeatureChanged(Option<usize>),
    StatusMessage(String),
}

/// 打印版面场景
pub struct Composition {
    config: CompositionConfig,

    items: BTreeMap<ItemId, Item>,
    next_item_id: u64,
    /// 每页的纸张图元
    pages: Vec<ItemId>,
    layout: PageLayout,
    /// 用户设置的纸张尺寸与页数（数据驱动覆盖前）
    static_paper_size: (f64, f64),
    static_num_pages: usize,
    z_order: ZOrderList,

    multi_frames: BTreeMap<MultiFrameId, MultiFrame>,
    next_multi_frame_id: u64,

    snapper: SnapEngine,
    snap_lines: Vec<SnapLine>,
    next_snap_line_id: u64,

    undo_stack: UndoStack,
    item_recorder: CommandRecorder<ItemId, Item>,
    multi_frame_recorder: CommandRecorder<MultiFrameId, MultiFrame>,

    print_resolution: u32,
    use_advanced_effects: bool,
    print_as_raster: bool,
    generate_world_file: bool,
    world_file_map: Option<ItemId>,
    plot_style: PlotStyle,

    atlas: AtlasComposition,
    atlas_mode: AtlasMode,
    data_defined: DataDefinedMap,
    resolver: DataDefinedResolver,
    evaluator: Box<dyn ExpressionEvaluator>,
    content_loader: Box<dyn ContentLoader>,
    text_metrics: Box<dyn TextMetrics>,

    events: Vec<CompositionEvent>,
    status_message: String,
}

/// 命令快照：不含选中状态
fn snapshot(item: &Item) -> Item {
    let mut state = item.clone();
    state.selected = false;
    state
}

impl Composition {
    pub fn new(config: CompositionConfig) -> Self {
        let layout = PageLayout::new(
            config.page.width,
            config.page.height,
            config.page.spacing,
            config.page.num_pages,
        );
        let mut composition = Self {
            items: BTreeMap::new(),
            next_item_id: 1,
            pages: Vec::new(),
            layout,
            static_paper_size: (layout.width, layout.height),
            static_num_pages: layout.num_pages,
            z_order: ZOrderList::new(),
            multi_frames: BTreeMap::new(),
            next_multi_frame_id: 1,
            snapper: SnapEngine::new(config.snap.clone()),
            snap_lines: Vec::new(),
            next_snap_line_id: 1,
            undo_stack: UndoStack::new(),
            item_recorder: CommandRecorder::new(),
            multi_frame_recorder: CommandRecorder::new(),
            print_resolution: config.print_resolution,
            use_advanced_effects: config.use_advanced_effects,
            print_as_raster: false,
            generate_world_file: false,
            world_file_map: None,
            plot_style: PlotStyle::Preview,
            atlas: AtlasComposition::default(),
            atlas_mode: AtlasMode::Off,
            data_defined: DataDefinedMap::new(),
            resolver: DataDefinedResolver::new(),
            evaluator: Box::new(BasicEvaluator),
            content_loader: Box::new(InlineContentLoader),
            text_metrics: Box::new(ApproximateTextMetrics),
            events: Vec::new(),
            status_message: String::new(),
            config,
        };
        composition.update_paper_items();
        composition
    }

    pub fn config(&self) -> &CompositionConfig {
        &self.config
    }

    pub fn set_expression_evaluator(&mut self, evaluator: Box<dyn ExpressionEvaluator>) {
        self.evaluator = evaluator;
        self.resolver.clear();
    }

    pub fn set_content_loader(&mut self, loader: Box<dyn ContentLoader>) {
        self.content_loader = loader;
    }

    pub fn set_text_metrics(&mut self, metrics: Box<dyn TextMetrics>) {
        self.text_metrics = metrics;
    }

    /// 取走累积的变更通知
    pub fn take_events(&mut self) -> Vec<CompositionEvent> {
        std::mem::take(&mut self.events)
    }

    fn emit(&mut self, event: CompositionEvent) {
        self.events.push(event);
    }

    pub fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.emit(CompositionEvent::StatusMessage(self.status_message.clone()));
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    // ---------------------------------------------------------------
    // 页面
    // ---------------------------------------------------------------

    pub fn layout(&self) -> &PageLayout {
        &self.layout
    }

    pub fn paper_width(&self) -> f64 {
        self.layout.width
    }

    pub fn paper_height(&self) -> f64 {
        self.layout.height
    }

    pub fn space_between_pages(&self) -> f64 {
        self.layout.spacing
    }

    pub fn num_pages(&self) -> usize {
        self.layout.num_pages
    }

    /// 各页纸张图元（按页序）
    pub fn pages(&self) -> &[ItemId] {
        &self.pages
    }

    /// 设置纸张尺寸
    ///
    /// 图元与水平捕捉线保持相对所在页面左上角的偏移不变。
    pub fn set_paper_size(&mut self, width: f64, height: f64) {
        if width <= 0.0 || height <= 0.0 {
            tracing::warn!("Ignoring invalid paper size {} x {}", width, height);
            return;
        }
        self.static_paper_size = (width, height);
        self.apply_paper_size(width, height);
    }

    fn apply_paper_size(&mut self, width: f64, height: f64) {
        if width == self.layout.width && height == self.layout.height {
            return;
        }
        let old = self.layout;
        let new = PageLayout {
            width,
            height,
            ..old
        };

        for item in self.items.values_mut().filter(|i| !i.is_paper()) {
            let rect = item.rect();
            let page = old.page_number_for_point(rect.top_left());
            let offset = rect.y - old.page_top(page);
            item.move_by(0.0, new.page_top(page) + offset - rect.y);
        }
        for line in self.snap_lines.iter_mut().filter(|l| l.is_horizontal()) {
            let page = old.page_number_for_point(Point2::new(0.0, line.position));
            let offset = line.position - old.page_top(page);
            line.position = new.page_top(page) + offset;
        }

        self.layout = new;
        self.update_paper_items();
        self.emit(CompositionEvent::PaperSizeChanged);
    }

    /// 设置页数，小于 1 时忽略
    pub fn set_num_pages(&mut self, pages: usize) {
        if pages < 1 {
            tracing::warn!("Ignoring request for {} pages", pages);
            return;
        }
        self.static_num_pages = pages;
        self.apply_num_pages(pages);
    }

    fn apply_num_pages(&mut self, pages: usize) {
        if pages < 1 || (pages == self.layout.num_pages && self.pages.len() == pages) {
            return;
        }
        self.layout.num_pages = pages;
        self.update_paper_items();
        self.emit(CompositionEvent::PagesChanged);
    }

    /// 按当前布局重建纸张图元
    fn update_paper_items(&mut self) {
        while self.pages.len() > self.layout.num_pages {
            if let Some(id) = self.pages.pop() {
                self.items.remove(&id);
            }
        }
        while self.pages.len() < self.layout.num_pages {
            let id = self.allocate_item_id();
            let mut paper = Item::new(ItemKind::Paper, Rect::default());
            paper.z_value = 0.0;
            paper.frame.enabled = false;
            self.items.insert(id, paper);
            self.pages.push(id);
        }
        for (page, id) in self.pages.iter().enumerate() {
            if let Some(paper) = self.items.get_mut(id) {
                paper.set_rect(self.layout.page_rect(page));
            }
        }
    }

    /// 场景坐标 → 页面局部坐标
    pub fn position_on_page(&self, point: Point2) -> Point2 {
        self.layout.position_on_page(point)
    }

    /// 点所在页码（从 0 开始，截断到有效范围）
    pub fn page_number_for_point(&self, point: Point2) -> usize {
        self.layout.page_number_for_point(point)
    }

    /// 与 [`Composition::page_number_for_point`] 相同的页码规则
    pub fn page_number_at(&self, point: Point2) -> usize {
        self.layout.page_number_for_point(point)
    }

    /// 图元左上角所在页码
    pub fn item_page_number(&self, id: ItemId) -> Option<usize> {
        let item = self.items.get(&id)?;
        Some(self.layout.page_number_for_point(item.rect().top_left()))
    }

    /// 图元参考点的页面局部坐标
    pub fn item_position_on_page(&self, id: ItemId, mode: ItemPositionMode) -> Option<Point2> {
        let item = self.items.get(&id)?;
        Some(self.layout.position_on_page(item.reference_point(mode)))
    }

    /// 以参考点定位图元，`page` 给出时 `point` 为该页的局部坐标
    pub fn set_item_position(&mut self, id: ItemId, point: Point2, mode: ItemPositionMode, page: Option<usize>) -> bool {
        let target = match page {
            Some(page) => self.layout.scene_position(page, point),
            None => point,
        };
        let Some(item) = self.items.get_mut(&id) else {
            return false;
        };
        item.set_position(target, mode);
        self.emit(CompositionEvent::ItemChanged(id));
        true
    }

    /// 所有图元（含纸张）的包围盒，四周外扩页宽的 5%
    pub fn composition_bounds(&self) -> Rect {
        let bounds = self
            .items
            .values()
            .map(Item::bounding_rect)
            .reduce(|a, b| a.united(&b))
            .unwrap_or_default();
        let margin = self.layout.width * 0.05;
        Rect::new(
            bounds.x - margin,
            bounds.y - margin,
            bounds.width + 2.0 * margin,
            bounds.height + 2.0 * margin,
        )
    }

    // ---------------------------------------------------------------
    // 输出设置
    // ---------------------------------------------------------------

    pub fn print_resolution(&self) -> u32 {
        self.print_resolution
    }

    pub fn set_print_resolution(&mut self, dpi: u32) {
        if dpi == 0 || dpi == self.print_resolution {
            return;
        }
        self.print_resolution = dpi;
        self.emit(CompositionEvent::PrintResolutionChanged);
    }

    pub fn use_advanced_effects(&self) -> bool {
        self.use_advanced_effects
    }

    pub fn set_use_advanced_effects(&mut self, enabled: bool) {
        self.use_advanced_effects = enabled;
    }

    pub fn print_as_raster(&self) -> bool {
        self.print_as_raster
    }

    pub fn set_print_as_raster(&mut self, enabled: bool) {
        self.print_as_raster = enabled;
    }

    pub fn generate_world_file(&self) -> bool {
        self.generate_world_file
    }

    pub fn set_generate_world_file(&mut self, enabled: bool) {
        self.generate_world_file = enabled;
    }

    pub fn world_file_map(&self) -> Option<ItemId> {
        self.world_file_map
    }

    /// 指定世界文件参考地图，非地图图元被拒绝
    pub fn set_world_file_map(&mut self, map: Option<ItemId>) -> bool {
        if let Some(id) = map {
            if self.items.get(&id).and_then(Item::as_map).is_none() {
                return false;
            }
        }
        self.world_file_map = map;
        true
    }

    pub fn plot_style(&self) -> PlotStyle {
        self.plot_style
    }

    pub fn set_plot_style(&mut self, style: PlotStyle) {
        self.plot_style = style;
    }

    /// 磅 → 像素字号（四舍五入）
    pub fn pixel_font_size(&self, point_size: f64) -> i32 {
        (point_size * MM_PER_POINT).round() as i32
    }

    pub fn point_font_size(&self, pixel_size: i32) -> f64 {
        pixel_size as f64 / MM_PER_POINT
    }

    // ---------------------------------------------------------------
    // 图元查询
    // ---------------------------------------------------------------

    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    /// 所有图元（含纸张），按键排序
    pub fn items(&self) -> impl Iterator<Item = (ItemId, &Item)> {
        self.items.iter().map(|(id, item)| (*id, item))
    }

    pub fn item_count(&self) -> usize {
        self.items.len() - self.pages.len()
    }

    pub fn z_order(&self) -> &ZOrderList {
        &self.z_order
    }

    /// 修改图元并发出变更通知
    pub fn modify_item<R>(&mut self, id: ItemId, f: impl FnOnce(&mut Item) -> R) -> Option<R> {
        let item = self.items.get_mut(&id)?;
        let result = f(item);
        self.emit(CompositionEvent::ItemChanged(id));
        Some(result)
    }

    /// 按用户标识查找第一个图元
    pub fn item_by_id(&self, user_id: &str) -> Option<ItemId> {
        self.items
            .iter()
            .find(|(_, item)| !item.is_paper() && item.id == user_id)
            .map(|(id, _)| *id)
    }

    pub fn item_by_uuid(&self, uuid: Uuid) -> Option<ItemId> {
        self.items
            .iter()
            .find(|(_, item)| !item.is_paper() && item.uuid == uuid)
            .map(|(id, _)| *id)
    }

    /// 所有地图图元
    pub fn map_items(&self) -> Vec<ItemId> {
        self.items
            .iter()
            .filter(|(_, item)| item.as_map().is_some())
            .map(|(id, _)| *id)
            .collect()
    }

    /// 按地图编号查找
    pub fn map_by_id(&self, map_id: u32) -> Option<ItemId> {
        self.items
            .iter()
            .find(|(_, item)| item.as_map().map(|m| m.map_id) == Some(map_id))
            .map(|(id, _)| *id)
    }

    /// 帧图元所属的多帧
    pub fn multi_frame_for_item(&self, id: ItemId) -> Option<MultiFrameId> {
        self.items.get(&id)?.as_frame().map(|f| f.multi_frame)
    }

    /// 场景点处最上层的图元
    ///
    /// 忽略纸张；给出 `below` 时返回位于它之下的第一个图元。
    pub fn item_at(&self, point: Point2, below: Option<ItemId>, ignore_locked: bool) -> Option<ItemId> {
        let mut found_below = false;
        for id in self.z_order.iter().rev() {
            let Some(item) = self.items.get(&id) else {
                continue;
            };
            if !item.contains(&point) {
                continue;
            }
            if (below.is_none() || found_below) && !(ignore_locked && item.locked) {
                return Some(id);
            }
            if Some(id) == below {
                found_below = true;
            }
        }
        None
    }

    pub fn item_below(&self, id: ItemId) -> Option<ItemId> {
        self.z_order.below(id)
    }

    pub fn item_above(&self, id: ItemId) -> Option<ItemId> {
        self.z_order.above(id)
    }

    // ---------------------------------------------------------------
    // 添加与删除
    // ---------------------------------------------------------------

    fn allocate_item_id(&mut self) -> ItemId {
        let id = ItemId(self.next_item_id);
        self.next_item_id += 1;
        id
    }

    /// 插入新图元，放到 Z 序最顶层
    pub fn add_item(&mut self, item: Item) -> ItemId {
        let id = self.allocate_item_id();
        self.insert_with_id(id, item, true);
        id
    }

    fn insert_with_id(&mut self, id: ItemId, mut item: Item, on_top: bool) {
        if item.is_paper() {
            tracing::warn!("Paper items are managed by the page layout, ignoring {}", id);
            return;
        }
        item.selected = false;
        let item_type = item.item_type();
        self.next_item_id = self.next_item_id.max(id.0 + 1);
        self.z_order.add(id);
        if on_top {
            item.z_value = self.z_order.len() as f64;
        }
        self.items.insert(id, item);
        tracing::debug!("Added {:?} {}", item_type, id);
        self.emit(CompositionEvent::ItemAdded { id, item_type });
    }

    pub fn add_label(&mut self, label: Label, rect: Rect) -> ItemId {
        let mut item = Item::new(ItemKind::Label(label), rect);
        item.background.enabled = self.config.label_background;
        self.add_item(item)
    }

    /// 添加地图，编号冲突时分配新编号
    pub fn add_map(&mut self, mut map: MapItem, rect: Rect) -> ItemId {
        if self.map_by_id(map.map_id).is_some() {
            map.map_id = self
                .items
                .values()
                .filter_map(|i| i.as_map().map(|m| m.map_id + 1))
                .max()
                .unwrap_or(0);
        }
        self.add_item(Item::new(ItemKind::Map(map), rect))
    }

    pub fn add_legend(&mut self, legend: LegendItem, rect: Rect) -> ItemId {
        self.add_item(Item::new(ItemKind::Legend(legend), rect))
    }

    pub fn add_scale_bar(&mut self, scale_bar: ScaleBarItem, rect: Rect) -> ItemId {
        self.add_item(Item::new(ItemKind::ScaleBar(scale_bar), rect))
    }

    pub fn add_picture(&mut self, picture: PictureItem, rect: Rect) -> ItemId {
        self.add_item(Item::new(ItemKind::Picture(picture), rect))
    }

    pub fn add_shape(&mut self, shape: ShapeItem, rect: Rect) -> ItemId {
        self.add_item(Item::new(ItemKind::Shape(shape), rect))
    }

    pub fn add_arrow(&mut self, arrow: ArrowItem, rect: Rect) -> ItemId {
        self.add_item(Item::new(ItemKind::Arrow(arrow), rect))
    }

    pub fn add_attribute_table(&mut self, table: AttributeTableItem, rect: Rect) -> ItemId {
        self.add_item(Item::new(ItemKind::AttributeTable(table), rect))
    }

    /// 为多帧追加一帧
    pub fn add_html_frame(&mut self, multi_frame: MultiFrameId, rect: Rect) -> Option<ItemId> {
        if !self.multi_frames.contains_key(&multi_frame) {
            return None;
        }
        let id = self.add_item(Item::new(ItemKind::Frame(FrameItem::new(multi_frame)), rect));
        if let Some(mf) = self.multi_frames.get_mut(&multi_frame) {
            mf.add_frame(id);
        }
        Some(id)
    }

    /// 删除图元
    ///
    /// 纸张图元不能删除。`create_command` 为真时压入可撤销的删除命令。
    pub fn remove_item(&mut self, id: ItemId, create_command: bool) -> bool {
        match self.items.get(&id) {
            Some(item) if !item.is_paper() => {}
            _ => return false,
        }
        let world_file_map = self.world_file_map == Some(id);
        let slot = self.detach_item(id);
        let Some(item) = self.items.remove(&id) else {
            return false;
        };
        if create_command {
            self.undo_stack.push(Command::AddRemove {
                id,
                item: Box::new(snapshot(&item)),
                state: AddRemoveState::Removed,
                slot,
                world_file_map,
                text: "Item deleted".to_string(),
            });
        }
        tracing::debug!("Removed {:?} {}", item.item_type(), id);
        self.emit(CompositionEvent::ItemRemoved(id));
        true
    }

    /// 从 Z 序、多帧与其他引用中解除，返回原帧位置
    ///
    /// 其余图元的 Z 值重新编号，保持与名次一致。
    fn detach_item(&mut self, id: ItemId) -> Option<FrameSlot> {
        if self.z_order.remove(id) {
            self.update_z_values(false);
        }
        self.resolver.invalidate(DataDefinedOwner::Item(id));
        if self.world_file_map == Some(id) {
            self.world_file_map = None;
        }
        let multi_frame = self.multi_frame_for_item(id)?;
        let index = self.multi_frames.get_mut(&multi_frame)?.remove_frame(id)?;
        Some(FrameSlot { multi_frame, index })
    }

    /// 为已添加的图元压入添加/删除命令
    pub fn push_add_remove_command(&mut self, id: ItemId, text: &str, state: AddRemoveState) -> bool {
        let Some(item) = self.items.get(&id) else {
            return false;
        };
        let slot = item.as_frame().and_then(|f| {
            let index = self.multi_frames.get(&f.multi_frame)?.frame_index(id)?;
            Some(FrameSlot {
                multi_frame: f.multi_frame,
                index,
            })
        });
        self.undo_stack.push(Command::AddRemove {
            id,
            item: Box::new(snapshot(item)),
            state,
            slot,
            world_file_map: self.world_file_map == Some(id),
            text: text.to_string(),
        });
        true
    }

    /// 删除全部非纸张图元与多帧，不产生命令
    pub fn clear_items(&mut self) {
        let ids: Vec<ItemId> = self.z_order.iter().collect();
        for id in ids {
            self.remove_item(id, false);
        }
        self.multi_frames.clear();
    }

    // ---------------------------------------------------------------
    // 多帧
    // ---------------------------------------------------------------

    pub fn add_multi_frame(&mut self, multi_frame: MultiFrame) -> MultiFrameId {
        let id = MultiFrameId(self.next_multi_frame_id);
        self.next_multi_frame_id += 1;
        self.multi_frames.insert(id, multi_frame);
        id
    }

    /// 删除多帧及其全部帧
    pub fn remove_multi_frame(&mut self, id: MultiFrameId) -> bool {
        let Some(mf) = self.multi_frames.get(&id) else {
            return false;
        };
        for frame in mf.frames().to_vec() {
            self.remove_item(frame, false);
        }
        self.multi_frames.remove(&id);
        true
    }

    pub fn multi_frame(&self, id: MultiFrameId) -> Option<&MultiFrame> {
        self.multi_frames.get(&id)
    }

    pub fn multi_frames(&self) -> impl Iterator<Item = (MultiFrameId, &MultiFrame)> {
        self.multi_frames.iter().map(|(id, mf)| (*id, mf))
    }

    pub fn modify_multi_frame<R>(&mut self, id: MultiFrameId, f: impl FnOnce(&mut MultiFrame) -> R) -> Option<R> {
        self.multi_frames.get_mut(&id).map(f)
    }

    // ---------------------------------------------------------------
    // 选择
    // ---------------------------------------------------------------

    /// 选中图元（按 Z 序从底到顶）
    pub fn selected_items(&self) -> Vec<ItemId> {
        self.z_order
            .iter()
            .filter(|id| self.items.get(id).map(|i| i.selected).unwrap_or(false))
            .collect()
    }

    pub fn clear_selection(&mut self) {
        for item in self.items.values_mut() {
            item.selected = false;
        }
    }

    /// 只选中 `id`，None 时清空选择
    pub fn set_selected_item(&mut self, id: Option<ItemId>) {
        self.clear_selection();
        let selected = id.filter(|id| match self.items.get_mut(id) {
            Some(item) if !item.is_paper() => {
                item.selected = true;
                true
            }
            _ => false,
        });
        self.emit(CompositionEvent::SelectedItemChanged(selected));
    }

    pub fn select_item(&mut self, id: ItemId, selected: bool) -> bool {
        match self.items.get_mut(&id) {
            Some(item) if !item.is_paper() => {
                item.selected = selected;
                true
            }
            _ => false,
        }
    }

    /// 选中当前选择（第一个）相邻的上/下层图元，边界处不变
    pub fn select_next_by_z_order(&mut self, direction: ZValueDirection) -> Option<ItemId> {
        let current = *self.selected_items().first()?;
        let next = match direction {
            ZValueDirection::Below => self.item_below(current),
            ZValueDirection::Above => self.item_above(current),
        }?;
        self.set_selected_item(Some(next));
        Some(next)
    }

    // ---------------------------------------------------------------
    // Z 序
    // ---------------------------------------------------------------

    /// 把 Z 序名次写回图元，`add_undo` 时为变化的图元生成一组命令
    fn update_z_values(&mut self, add_undo: bool) {
        let mut commands = Vec::new();
        let ranks: Vec<(ItemId, f64)> = self.z_order.z_values().collect();
        for (id, z) in ranks {
            let Some(item) = self.items.get_mut(&id) else {
                continue;
            };
            if item.z_value == z {
                continue;
            }
            let before = snapshot(item);
            item.z_value = z;
            if add_undo {
                commands.push(Command::Item {
                    id,
                    before: Box::new(before),
                    after: Box::new(snapshot(item)),
                    text: String::new(),
                    context: MergeContext::Unknown,
                });
            }
        }
        if !commands.is_empty() {
            self.undo_stack.push(Command::Group {
                text: "Item z-order changed".to_string(),
                commands,
            });
        }
    }

    /// 按图元当前 Z 值重建 Z 序（批量读取或撤销之后）
    pub fn refresh_z_list(&mut self) {
        let entries: Vec<(ItemId, f64)> = self
            .items
            .iter()
            .filter(|(_, item)| !item.is_paper())
            .map(|(id, item)| (*id, item.z_value))
            .collect();
        self.z_order.rebuild(entries);
        self.update_z_values(false);
    }

    /// 与 [`Composition::refresh_z_list`] 相同，用于读取文档后恢复确定顺序
    pub fn sort_z_list(&mut self) {
        self.refresh_z_list();
    }

    pub fn raise_item(&mut self, id: ItemId) -> bool {
        let changed = self.z_order.raise(id);
        self.update_z_values(true);
        changed
    }

    pub fn lower_item(&mut self, id: ItemId) -> bool {
        let changed = self.z_order.lower(id);
        self.update_z_values(true);
        changed
    }

    pub fn move_item_to_top(&mut self, id: ItemId) -> bool {
        let changed = self.z_order.move_to_top(id);
        self.update_z_values(true);
        changed
    }

    pub fn move_item_to_bottom(&mut self, id: ItemId) -> bool {
        let changed = self.z_order.move_to_bottom(id);
        self.update_z_values(true);
        changed
    }

    /// 上移选中图元，先处理上层的以保持相对顺序
    pub fn raise_selected_items(&mut self) {
        for id in self.selected_items().into_iter().rev() {
            self.z_order.raise(id);
        }
        self.update_z_values(true);
    }

    pub fn lower_selected_items(&mut self) {
        for id in self.selected_items() {
            self.z_order.lower(id);
        }
        self.update_z_values(true);
    }

    pub fn move_selected_items_to_top(&mut self) {
        for id in self.selected_items() {
            self.z_order.move_to_top(id);
        }
        self.update_z_values(true);
    }

    pub fn move_selected_items_to_bottom(&mut self) {
        for id in self.selected_items().into_iter().rev() {
            self.z_order.move_to_bottom(id);
        }
        self.update_z_values(true);
    }

    // ---------------------------------------------------------------
    // 对齐、移动与锁定
    // ---------------------------------------------------------------

    /// 以选中图元的整体包围盒对齐，锁定图元不动；整体作为一步撤销
    pub fn align_selected_items(&mut self, alignment: Alignment) -> bool {
        let selected = self.selected_items();
        let Some(bounds) = selected
            .iter()
            .filter_map(|id| self.items.get(id))
            .map(Item::bounding_rect)
            .reduce(|a, b| a.united(&b))
        else {
            return false;
        };

        let mut commands = Vec::new();
        for id in selected {
            let Some(item) = self.items.get_mut(&id) else {
                continue;
            };
            if item.locked {
                continue;
            }
            let current = item.bounding_rect();
            let (dx, dy) = match alignment {
                Alignment::Left => (bounds.left() - current.left(), 0.0),
                Alignment::HCenter => (bounds.h_center() - current.h_center(), 0.0),
                Alignment::Right => (bounds.right() - current.right(), 0.0),
                Alignment::Top => (0.0, bounds.top() - current.top()),
                Alignment::VCenter => (0.0, bounds.v_center() - current.v_center()),
                Alignment::Bottom => (0.0, bounds.bottom() - current.bottom()),
            };
            let before = snapshot(item);
            item.move_by(dx, dy);
            if let Some(command) = Self::state_command(id, before, snapshot(item)) {
                commands.push(command);
            }
            self.events.push(CompositionEvent::ItemChanged(id));
        }
        self.push_group(alignment.command_text(), commands)
    }

    pub fn align_selected_items_left(&mut self) -> bool {
        self.align_selected_items(Alignment::Left)
    }

    pub fn align_selected_items_hcenter(&mut self) -> bool {
        self.align_selected_items(Alignment::HCenter)
    }

    pub fn align_selected_items_right(&mut self) -> bool {
        self.align_selected_items(Alignment::Right)
    }

    pub fn align_selected_items_top(&mut self) -> bool {
        self.align_selected_items(Alignment::Top)
    }

    pub fn align_selected_items_vcenter(&mut self) -> bool {
        self.align_selected_items(Alignment::VCenter)
    }

    pub fn align_selected_items_bottom(&mut self) -> bool {
        self.align_selected_items(Alignment::Bottom)
    }

    /// 平移选中的未锁定图元
    pub fn move_selected_items(&mut self, dx: f64, dy: f64) -> bool {
        let mut commands = Vec::new();
        for id in self.selected_items() {
            let Some(item) = self.items.get_mut(&id) else {
                continue;
            };
            if item.locked {
                continue;
            }
            let before = snapshot(item);
            item.move_by(dx, dy);
            if let Some(command) = Self::state_command(id, before, snapshot(item)) {
                commands.push(command);
            }
            self.events.push(CompositionEvent::ItemChanged(id));
        }
        self.push_group("Items moved", commands)
    }

    /// 锁定选中图元并取消选择
    pub fn lock_selected_items(&mut self) -> bool {
        let mut commands = Vec::new();
        for id in self.selected_items() {
            if let Some(item) = self.items.get_mut(&id) {
                let before = snapshot(item);
                item.locked = true;
                if let Some(command) = Self::state_command(id, before, snapshot(item)) {
                    commands.push(command);
                }
            }
        }
        self.clear_selection();
        self.push_group("Items locked", commands)
    }

    /// 解锁所有图元，并选中被解锁的图元
    pub fn unlock_all_items(&mut self) -> bool {
        self.clear_selection();
        let mut commands = Vec::new();
        for (id, item) in self.items.iter_mut() {
            if item.is_paper() || !item.locked {
                continue;
            }
            let before = snapshot(item);
            item.locked = false;
            item.selected = true;
            if let Some(command) = Self::state_command(*id, before, snapshot(item)) {
                commands.push(command);
            }
        }
        self.push_group("Items unlocked", commands)
    }

    fn state_command(id: ItemId, before: Item, after: Item) -> Option<Command> {
        if before == after {
            return None;
        }
        Some(Command::Item {
            id,
            before: Box::new(before),
            after: Box::new(after),
            text: String::new(),
            context: MergeContext::Unknown,
        })
    }

    fn push_group(&mut self, text: &str, commands: Vec<Command>) -> bool {
        if commands.is_empty() {
            return false;
        }
        self.undo_stack.push(Command::Group {
            text: text.to_string(),
            commands,
        });
        true
    }

    // ---------------------------------------------------------------
    // 捕捉
    // ---------------------------------------------------------------

    pub fn snap_settings(&self) -> &SnapSettings {
        self.snapper.settings()
    }

    pub fn snap_settings_mut(&mut self) -> &mut SnapSettings {
        self.snapper.settings_mut()
    }

    /// 将场景点捕捉到网格，`view_scale` 为每毫米屏幕像素数
    pub fn snap_point_to_grid(&self, point: Point2, view_scale: f64) -> Point2 {
        let tolerance = self.snapper.settings().scene_tolerance(view_scale);
        let page = self.layout.page_number_for_point(point);
        self.snapper
            .snap_point_to_grid(point, self.layout.page_top(page), tolerance)
    }

    /// 捕捉移动中的矩形（网格 + 对齐），`exclude` 为正在移动的图元
    pub fn snap_rect(&mut self, rect: Rect, exclude: &[ItemId], view_scale: f64) -> SnapResult {
        let settings = self.snapper.settings();
        let tolerance = settings.scene_tolerance(view_scale);
        let targets = if settings.smart_guides {
            AlignTargets::collect(
                self.items.iter().map(|(id, item)| (*id, item)),
                exclude,
                &self.layout.page_rects(),
                &self.snap_lines,
                true,
            )
        } else {
            AlignTargets::collect(std::iter::empty(), exclude, &[], &self.snap_lines, true)
        };
        let page = self.layout.page_number_for_point(rect.top_left());
        let page_top = self.layout.page_top(page);
        self.snapper.snap_rect(rect, page_top, &targets, tolerance)
    }

    pub fn snap_lines(&self) -> &[SnapLine] {
        &self.snap_lines
    }

    pub fn add_snap_line(&mut self, orientation: SnapLineOrientation, position: f64) -> SnapLineId {
        let id = SnapLineId(self.next_snap_line_id);
        self.next_snap_line_id += 1;
        self.snap_lines.push(SnapLine {
            id,
            orientation,
            position,
        });
        id
    }

    pub fn move_snap_line(&mut self, id: SnapLineId, position: f64) -> bool {
        match self.snap_lines.iter_mut().find(|l| l.id == id) {
            Some(line) => {
                line.position = position;
                true
            }
            None => false,
        }
    }

    pub fn remove_snap_line(&mut self, id: SnapLineId) -> bool {
        let before = self.snap_lines.len();
        self.snap_lines.retain(|l| l.id != id);
        self.snap_lines.len() != before
    }

    pub fn clear_snap_lines(&mut self) {
        self.snap_lines.clear();
    }

    /// 容差内最近的捕捉线及吸附在其上的图元
    pub fn nearest_snap_line(
        &self,
        horizontal: bool,
        point: Point2,
        tolerance: f64,
    ) -> Option<(SnapLineId, Vec<(ItemId, ItemPositionMode)>)> {
        nearest_snap_line(
            &self.snap_lines,
            horizontal,
            point,
            tolerance,
            self.items.iter().map(|(id, item)| (*id, item)),
        )
        .map(|(line, snapped)| (line.id, snapped))
    }

    // ---------------------------------------------------------------
    // 命令
    // ---------------------------------------------------------------

    pub fn undo_stack(&self) -> &UndoStack {
        &self.undo_stack
    }

    /// 压入外部构造的命令（假定已执行）
    pub fn push_command(&mut self, command: Command) {
        self.undo_stack.push(command);
    }

    /// 开始记录图元命令
    pub fn begin_command(&mut self, id: ItemId, text: &str, context: MergeContext) -> Result<(), CommandError> {
        let item = self.items.get(&id).ok_or(CommandError::UnknownItem(id))?;
        let result = self.item_recorder.begin(id, snapshot(item), text, context);
        if let Err(e) = &result {
            tracing::warn!("Refusing command '{}' on {}: {}", text, id, e);
        }
        result
    }

    /// 结束记录，状态有变化时压栈并返回 true
    pub fn end_command(&mut self) -> Result<bool, CommandError> {
        let pending = self.item_recorder.finish()?;
        let id = pending.key;
        let after = self.items.get(&id).map(snapshot).ok_or(CommandError::UnknownItem(id))?;
        match pending.into_command(after) {
            Some(command) => {
                self.undo_stack.push(command);
                self.emit(CompositionEvent::ItemChanged(id));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// 取消记录并回滚到开始时的状态，不压栈
    pub fn cancel_command(&mut self) -> bool {
        match self.item_recorder.cancel() {
            Some(pending) => {
                if let Err(e) = self.restore_item(pending.key, &pending.before) {
                    tracing::warn!("Cannot roll back '{}': {}", pending.text, e);
                }
                true
            }
            None => false,
        }
    }

    pub fn begin_multi_frame_command(
        &mut self,
        id: MultiFrameId,
        text: &str,
        context: MergeContext,
    ) -> Result<(), CommandError> {
        let mf = self.multi_frames.get(&id).ok_or(CommandError::UnknownMultiFrame(id))?;
        let result = self.multi_frame_recorder.begin(id, mf.clone(), text, context);
        if let Err(e) = &result {
            tracing::warn!("Refusing multi-frame command '{}' on {}: {}", text, id, e);
        }
        result
    }

    pub fn end_multi_frame_command(&mut self) -> Result<bool, CommandError> {
        let pending = self.multi_frame_recorder.finish()?;
        let id = pending.key;
        let after = self
            .multi_frames
            .get(&id)
            .cloned()
            .ok_or(CommandError::UnknownMultiFrame(id))?;
        match pending.into_command(after) {
            Some(command) => {
                self.undo_stack.push(command);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn cancel_multi_frame_command(&mut self) -> bool {
        match self.multi_frame_recorder.cancel() {
            Some(pending) => {
                if let Err(e) = self.restore_multi_frame(pending.key, &pending.before) {
                    tracing::warn!("Cannot roll back '{}': {}", pending.text, e);
                }
                true
            }
            None => false,
        }
    }

    /// 撤销一步，之后按 Z 值重建 Z 序
    pub fn undo(&mut self) -> Result<bool, CommandError> {
        let mut stack = std::mem::take(&mut self.undo_stack);
        let result = stack.undo(self);
        self.undo_stack = stack;
        self.refresh_z_list();
        result
    }

    pub fn redo(&mut self) -> Result<bool, CommandError> {
        let mut stack = std::mem::take(&mut self.undo_stack);
        let result = stack.redo(self);
        self.undo_stack = stack;
        self.refresh_z_list();
        result
    }

    // ---------------------------------------------------------------
    // 数据驱动与图集（实现见 refresh.rs）
    // ---------------------------------------------------------------

    pub fn data_defined_property(&self, property: DataDefinedProperty) -> Option<&DataDefined> {
        self.data_defined.get(property)
    }

    /// 设置场景级数据驱动属性并立即刷新
    pub fn set_data_defined_property(&mut self, property: DataDefinedProperty, value: DataDefined) {
        self.data_defined.set(property, value);
        self.resolver.invalidate(DataDefinedOwner::Composition);
        self.refresh_data_defined_property(property);
    }

    pub fn atlas(&self) -> &AtlasComposition {
        &self.atlas
    }

    pub fn atlas_mut(&mut self) -> &mut AtlasComposition {
        &mut self.atlas
    }

    pub fn set_atlas(&mut self, atlas: AtlasComposition) {
        self.atlas = atlas;
        self.atlas_mode = AtlasMode::Off;
    }

    pub fn atlas_mode(&self) -> AtlasMode {
        self.atlas_mode
    }
}

impl CommandTarget for Composition {
    fn restore_item(&mut self, id: ItemId, state: &Item) -> Result<(), CommandError> {
        let item = self.items.get_mut(&id).ok_or(CommandError::UnknownItem(id))?;
        let selected = item.selected;
        *item = state.clone();
        item.selected = selected;
        self.emit(CompositionEvent::ItemChanged(id));
        Ok(())
    }

    /// 按快照中的 Z 值放回原名次
    fn insert_item(&mut self, id: ItemId, item: Item, slot: Option<FrameSlot>) {
        let z_value = item.z_value;
        self.insert_with_id(id, item, false);
        if self.z_order.remove(id) {
            let index = self
                .z_order
                .iter()
                .filter(|other| self.items.get(other).is_some_and(|i| i.z_value < z_value))
                .count();
            self.z_order.insert(index, id);
            self.update_z_values(false);
        }
        if let Some(slot) = slot {
            if let Some(mf) = self.multi_frames.get_mut(&slot.multi_frame) {
                mf.insert_frame(slot.index, id);
            }
        }
    }

    fn discard_item(&mut self, id: ItemId) -> Result<(), CommandError> {
        if self.remove_item(id, false) {
            Ok(())
        } else {
            Err(CommandError::UnknownItem(id))
        }
    }

    fn restore_world_file_map(&mut self, id: ItemId) {
        if !self.set_world_file_map(Some(id)) {
            tracing::warn!("{} is not a map, world file map not restored", id);
        }
    }

    fn restore_multi_frame(&mut self, id: MultiFrameId, state: &MultiFrame) -> Result<(), CommandError> {
        let mf = self.multi_frames.get_mut(&id).ok_or(CommandError::UnknownMultiFrame(id))?;
        mf.html = state.html.clone();
        mf.resize_mode = state.resize_mode;
        Ok(())
    }
}

impl Default for Composition {
    fn default() -> Self {
        Self::new(CompositionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::EPSILON;

    fn composition() -> Composition {
        let mut config = CompositionConfig::default();
        config.page = PageLayout::new(210.0, 297.0, 10.0, 1);
        Composition::new(config)
    }

    fn add_box(c: &mut Composition, x: f64, y: f64) -> ItemId {
        c.add_shape(ShapeItem::default(), Rect::new(x, y, 20.0, 10.0))
    }

    #[test]
    fn test_pages_have_paper_items() {
        let mut c = composition();
        assert_eq!(c.pages().len(), 1);
        c.set_num_pages(3);
        assert_eq!(c.pages().len(), 3);
        let third = c.item(c.pages()[2]).unwrap();
        assert!(third.is_paper());
        assert_eq!(third.rect(), Rect::new(0.0, 614.0, 210.0, 297.0));
        c.set_num_pages(0);
        assert_eq!(c.num_pages(), 3);
        c.set_num_pages(1);
        assert_eq!(c.pages().len(), 1);
        assert_eq!(c.item_count(), 0);
        assert!(c.take_events().contains(&CompositionEvent::PagesChanged));
    }

    #[test]
    fn test_z_order_tracks_live_items() {
        let mut c = composition();
        let a = add_box(&mut c, 0.0, 0.0);
        let b = add_box(&mut c, 0.0, 0.0);
        let d = add_box(&mut c, 0.0, 0.0);
        assert_eq!(c.z_order().as_slice(), &[a, b, d]);
        assert!(c.remove_item(b, true));
        assert_eq!(c.z_order().as_slice(), &[a, d]);
        assert!(!c.remove_item(c.pages()[0], true));
        assert!(!c.remove_item(b, true));

        c.undo().unwrap();
        assert_eq!(c.z_order().len(), 3);
        assert!(c.z_order().contains(b));
        assert_eq!(c.item(b).unwrap().z_value, 2.0);
    }

    #[test]
    fn test_item_added_event() {
        let mut c = composition();
        c.take_events();
        let id = c.add_label(Label::new("x"), Rect::new(0.0, 0.0, 10.0, 10.0));
        assert_eq!(
            c.take_events(),
            vec![CompositionEvent::ItemAdded {
                id,
                item_type: ItemType::Label
            }]
        );
        assert!(!c.item(id).unwrap().background.enabled);
    }

    #[test]
    fn test_paper_size_keeps_page_local_offsets() {
        let mut c = composition();
        c.set_num_pages(2);
        let first = add_box(&mut c, 10.0, 20.0);
        let second = add_box(&mut c, 15.0, 307.0 + 40.0);
        let line = c.add_snap_line(SnapLineOrientation::Horizontal, 307.0 + 5.0);

        c.set_paper_size(297.0, 420.0);
        assert_eq!(c.item(first).unwrap().rect().top_left(), Point2::new(10.0, 20.0));
        let moved = c.item(second).unwrap().rect();
        assert!((moved.y - (430.0 + 40.0)).abs() < EPSILON);
        assert_eq!(c.item_page_number(second), Some(1));
        let local = c.item_position_on_page(second, ItemPositionMode::UpperLeft).unwrap();
        assert!((local.y - 40.0).abs() < EPSILON);
        let line = c.snap_lines().iter().find(|l| l.id == line).unwrap();
        assert!((line.position - 435.0).abs() < EPSILON);
        assert_eq!(c.item(c.pages()[1]).unwrap().rect().y, 430.0);
    }

    #[test]
    fn test_item_at_walks_down_z_order() {
        let mut c = composition();
        let bottom = add_box(&mut c, 0.0, 0.0);
        let top = add_box(&mut c, 5.0, 0.0);
        let p = Point2::new(10.0, 5.0);
        assert_eq!(c.item_at(p, None, false), Some(top));
        assert_eq!(c.item_at(p, Some(top), false), Some(bottom));
        assert_eq!(c.item_at(p, Some(bottom), false), None);
        c.modify_item(top, |i| i.locked = true);
        assert_eq!(c.item_at(p, None, true), Some(bottom));
        assert_eq!(c.item_at(Point2::new(100.0, 100.0), None, false), None);
    }

    #[test]
    fn test_select_next_by_z_order_stops_at_boundary() {
        let mut c = composition();
        let a = add_box(&mut c, 0.0, 0.0);
        let b = add_box(&mut c, 0.0, 0.0);
        assert_eq!(c.select_next_by_z_order(ZValueDirection::Above), None);
        c.set_selected_item(Some(a));
        assert_eq!(c.select_next_by_z_order(ZValueDirection::Above), Some(b));
        assert_eq!(c.selected_items(), vec![b]);
        assert_eq!(c.select_next_by_z_order(ZValueDirection::Above), None);
        assert_eq!(c.selected_items(), vec![b]);
    }

    #[test]
    fn test_raise_lower_with_undo() {
        let mut c = composition();
        let a = add_box(&mut c, 0.0, 0.0);
        let b = add_box(&mut c, 0.0, 0.0);
        let d = add_box(&mut c, 0.0, 0.0);
        c.set_selected_item(Some(a));
        c.move_selected_items_to_top();
        assert_eq!(c.z_order().as_slice(), &[b, d, a]);
        assert_eq!(c.item(a).unwrap().z_value, 3.0);
        assert_eq!(c.undo_stack().undo_text(), Some("Item z-order changed"));

        c.undo().unwrap();
        assert_eq!(c.z_order().as_slice(), &[a, b, d]);
        c.redo().unwrap();
        assert_eq!(c.z_order().as_slice(), &[b, d, a]);

        assert!(c.lower_item(a));
        assert!(c.raise_item(a));
        assert_eq!(c.z_order().as_slice(), &[b, d, a]);
        assert!(!c.raise_item(a));
    }

    #[test]
    fn test_align_left_is_one_undo_step() {
        let mut c = composition();
        let a = add_box(&mut c, 10.0, 0.0);
        let b = add_box(&mut c, 30.0, 50.0);
        let locked = add_box(&mut c, 50.0, 80.0);
        c.modify_item(locked, |i| i.locked = true);
        for id in [a, b, locked] {
            c.select_item(id, true);
        }
        assert!(c.align_selected_items_left());
        assert_eq!(c.item(b).unwrap().rect().x, 10.0);
        assert_eq!(c.item(locked).unwrap().rect().x, 50.0);
        assert_eq!(c.undo_stack().len(), 1);
        c.undo().unwrap();
        assert_eq!(c.item(b).unwrap().rect().x, 30.0);

        c.set_selected_item(Some(a));
        c.select_item(b, true);
        c.redo().unwrap();
        assert!(c.align_selected_items_bottom());
        assert_eq!(c.item(a).unwrap().rect().bottom(), 60.0);
    }

    #[test]
    fn test_lock_and_unlock() {
        let mut c = composition();
        let a = add_box(&mut c, 0.0, 0.0);
        c.set_selected_item(Some(a));
        assert!(c.lock_selected_items());
        assert!(c.item(a).unwrap().locked);
        assert!(c.selected_items().is_empty());
        assert!(c.unlock_all_items());
        assert!(!c.item(a).unwrap().locked);
        assert_eq!(c.selected_items(), vec![a]);
        c.undo().unwrap();
        assert!(c.item(a).unwrap().locked);
        assert!(c.unlock_all_items());
        assert_eq!(c.undo_stack().len(), 2);
        assert!(!c.unlock_all_items());
    }

    #[test]
    fn test_command_recording() {
        let mut c = composition();
        let a = add_box(&mut c, 0.0, 0.0);
        let b = add_box(&mut c, 0.0, 0.0);

        c.begin_command(a, "Nothing", MergeContext::Unknown).unwrap();
        assert_eq!(c.end_command(), Ok(false));
        assert!(c.undo_stack().is_empty());

        c.begin_command(a, "Move", MergeContext::ItemMove).unwrap();
        assert_eq!(
            c.begin_command(b, "Move", MergeContext::ItemMove),
            Err(CommandError::AlreadyRecording)
        );
        c.modify_item(a, |i| i.move_by(5.0, 0.0));
        assert_eq!(c.end_command(), Ok(true));
        assert_eq!(c.end_command(), Err(CommandError::NotRecording));

        c.begin_command(a, "Resize", MergeContext::ItemResize).unwrap();
        c.modify_item(a, |i| i.set_rect(Rect::new(5.0, 0.0, 40.0, 40.0)));
        assert!(c.cancel_command());
        assert_eq!(c.undo_stack().len(), 1);
        assert_eq!(c.item(a).unwrap().rect(), Rect::new(5.0, 0.0, 20.0, 10.0));

        c.undo().unwrap();
        assert_eq!(c.item(a).unwrap().rect(), Rect::new(0.0, 0.0, 20.0, 10.0));
        assert_eq!(c.begin_command(ItemId(999), "x", MergeContext::Unknown), Err(CommandError::UnknownItem(ItemId(999))));
    }

    #[test]
    fn test_multi_frame_frames_follow_removal() {
        let mut c = composition();
        let mf = c.add_multi_frame(MultiFrame::new("<p>hello</p>"));
        let f1 = c.add_html_frame(mf, Rect::new(0.0, 0.0, 50.0, 50.0)).unwrap();
        let f2 = c.add_html_frame(mf, Rect::new(60.0, 0.0, 50.0, 50.0)).unwrap();
        assert_eq!(c.multi_frame_for_item(f2), Some(mf));
        assert!(c.remove_item(f1, true));
        assert_eq!(c.multi_frame(mf).unwrap().frames(), &[f2]);
        c.undo().unwrap();
        assert_eq!(c.multi_frame(mf).unwrap().frames(), &[f1, f2]);
        assert!(c.add_html_frame(MultiFrameId(77), Rect::default()).is_none());

        c.begin_multi_frame_command(mf, "Change HTML", MergeContext::MultiFrameHtml).unwrap();
        c.modify_multi_frame(mf, |m| m.html = "<p>bye</p>".to_string());
        assert_eq!(c.end_multi_frame_command(), Ok(true));
        c.undo().unwrap();
        assert_eq!(c.multi_frame(mf).unwrap().html, "<p>hello</p>");
        assert!(c.remove_multi_frame(mf));
        assert_eq!(c.item_count(), 0);
    }

    #[test]
    fn test_snap_rect_uses_other_items_and_pages() {
        let mut c = composition();
        let other = add_box(&mut c, 130.0, 100.0);
        let moving = add_box(&mut c, 0.0, 0.0);
        // 1 像素/毫米，容差 5 毫米
        let result = c.snap_rect(Rect::new(127.0, 52.0, 20.0, 10.0), &[moving], 1.0);
        assert_eq!(result.rect.x, 130.0);
        assert!(matches!(result.x.map(|s| s.source), Some(crate::snap::SnapSource::Item(id)) if id == other));
        assert!(result.y.is_none());

        let result = c.snap_rect(Rect::new(2.0, 200.0, 20.0, 10.0), &[moving], 1.0);
        assert_eq!(result.rect.x, 0.0);
        assert!(matches!(result.x.map(|s| s.source), Some(crate::snap::SnapSource::Page(0))));

        let line = c.add_snap_line(SnapLineOrientation::Horizontal, 105.0);
        let (found, snapped) = c.nearest_snap_line(true, Point2::new(0.0, 106.0), 2.0).unwrap();
        assert_eq!(found, line);
        assert_eq!(snapped, vec![(other, ItemPositionMode::Middle)]);
        assert!(c.remove_snap_line(line));
        assert!(c.nearest_snap_line(true, Point2::new(0.0, 106.0), 2.0).is_none());
    }

    #[test]
    fn test_grid_snap_is_page_relative() {
        let mut c = composition();
        c.set_num_pages(2);
        c.snap_settings_mut().snap_to_grid = true;
        c.snap_settings_mut().tolerance_px = 8.0;
        // 第二页顶边 307，局部 y = 13 → 10
        let p = c.snap_point_to_grid(Point2::new(23.0, 320.0), 2.0);
        assert_eq!(p, Point2::new(20.0, 317.0));
    }

    #[test]
    fn test_font_size_conversion_and_bounds() {
        let c = composition();
        assert_eq!(c.pixel_font_size(10.0), 4);
        assert!((c.point_font_size(4) - 4.0 / 0.3527).abs() < EPSILON);
        let bounds = c.composition_bounds();
        assert!((bounds.x + 10.5).abs() < EPSILON);
        assert!((bounds.width - 231.0).abs() < EPSILON);
    }

    #[test]
    fn test_set_item_position_on_page() {
        let mut c = composition();
        c.set_num_pages(2);
        let a = add_box(&mut c, 0.0, 0.0);
        assert!(c.set_item_position(a, Point2::new(30.0, 20.0), ItemPositionMode::Middle, Some(1)));
        assert_eq!(c.item(a).unwrap().rect(), Rect::new(20.0, 322.0, 20.0, 10.0));
        assert_eq!(c.item_page_number(a), Some(1));
        assert!(!c.set_world_file_map(Some(a)));
        let map = c.add_map(MapItem::default(), Rect::new(0.0, 0.0, 10.0, 10.0));
        let map2 = c.add_map(MapItem::default(), Rect::new(0.0, 0.0, 10.0, 10.0));
        assert_eq!(c.item(map2).unwrap().as_map().unwrap().map_id, 1);
        assert!(c.set_world_file_map(Some(map)));
        c.remove_item(map, false);
        assert_eq!(c.world_file_map(), None);
    }
}
