//! 数据驱动属性刷新与图集导航
//!
//! 求值与应用分两步：先在只读借用下求出覆盖值，再写回图元/页面。
//! 无当前要素（图集关闭或未开始）时字段与表达式来源回退到静态值。

use chrono::Local;

use super::{Composition, CompositionEvent};
use crate::atlas::{AtlasComposition, AtlasMode};
use crate::data_defined::{DataDefinedOwner, DataDefinedProperty as Prop, Feature};
use crate::item::{ItemId, LabelTextContext};
use crate::math::Rect;
use crate::page::{paper_size_for_preset, PaperOrientation};
use crate::snap::item_shift_adjust_size;
use crate::style::BlendMode;

/// 参与求值的要素：仅在图集模式开启时使用
fn atlas_feature(atlas: &AtlasComposition, mode: AtlasMode) -> Option<&Feature> {
    if mode == AtlasMode::Off {
        return None;
    }
    atlas.current_feature()
}

impl Composition {
    /// 当前图集要素（图集模式关闭时为 None）
    pub fn current_feature(&self) -> Option<&Feature> {
        atlas_feature(&self.atlas, self.atlas_mode)
    }

    /// 重新求值并应用数据驱动属性
    ///
    /// `All` 刷新页面与全部图元；单个属性只刷新其所属对象。
    pub fn refresh_data_defined_property(&mut self, property: Prop) {
        if Prop::COMPOSITION.iter().any(|p| p.matches(property)) {
            self.refresh_page_size();
            if Prop::NumPages.matches(property) {
                self.refresh_num_pages();
            }
        }
        if Prop::ITEM.iter().any(|p| p.matches(property)) {
            let ids: Vec<ItemId> = self.z_order.iter().collect();
            for id in ids {
                self.refresh_item_data_defined(id, property);
            }
        }
        self.emit(CompositionEvent::RefreshItemsTriggered);
    }

    /// 重新求值全部数据驱动属性
    pub fn refresh_items(&mut self) {
        self.refresh_data_defined_property(Prop::All);
    }

    /// 纸张尺寸：静态值 → 预设 → 宽/高 → 方向，逐级覆盖
    fn refresh_page_size(&mut self) {
        let feature = atlas_feature(&self.atlas, self.atlas_mode);
        let owner = DataDefinedOwner::Composition;
        let evaluator = &*self.evaluator;
        let dd = &self.data_defined;

        let (mut width, mut height) = self.static_paper_size;
        if let Some(name) =
            self.resolver
                .evaluate_string(owner, Prop::PresetPaperSize, dd.get(Prop::PresetPaperSize), feature, evaluator)
        {
            match paper_size_for_preset(&name) {
                Some((w, h)) => {
                    width = w;
                    height = h;
                }
                None => tracing::debug!("Unknown paper preset '{}'", name),
            }
        }
        if let Some(w) = self
            .resolver
            .evaluate_f64(owner, Prop::PaperWidth, dd.get(Prop::PaperWidth), feature, evaluator)
            .filter(|w| *w > 0.0)
        {
            width = w;
        }
        if let Some(h) = self
            .resolver
            .evaluate_f64(owner, Prop::PaperHeight, dd.get(Prop::PaperHeight), feature, evaluator)
            .filter(|h| *h > 0.0)
        {
            height = h;
        }
        if let Some(orientation) = self
            .resolver
            .evaluate_string(owner, Prop::PaperOrientation, dd.get(Prop::PaperOrientation), feature, evaluator)
            .and_then(|s| PaperOrientation::from_name(&s))
        {
            (width, height) = orientation.apply(width, height);
        }

        self.apply_paper_size(width, height);
    }

    fn refresh_num_pages(&mut self) {
        let feature = atlas_feature(&self.atlas, self.atlas_mode);
        let pages = self
            .resolver
            .evaluate_f64(
                DataDefinedOwner::Composition,
                Prop::NumPages,
                self.data_defined.get(Prop::NumPages),
                feature,
                &*self.evaluator,
            )
            .filter(|n| *n >= 1.0)
            .map(|n| n.floor() as usize)
            .unwrap_or(self.static_num_pages);
        self.apply_num_pages(pages);
    }

    /// 刷新单个图元的数据驱动覆盖
    pub fn refresh_item_data_defined(&mut self, id: ItemId, property: Prop) {
        let Some(item) = self.items.get(&id) else {
            return;
        };
        if item.is_paper() {
            return;
        }
        let geometry = [Prop::PositionX, Prop::PositionY, Prop::ItemWidth, Prop::ItemHeight];
        let moves = geometry
            .iter()
            .any(|p| p.matches(property) && item.data_defined.is_active(*p));
        let current = item.rect();
        let rect = moves.then(|| self.evaluate_item_rect(id, current));

        let Some(item) = self.items.get(&id) else {
            return;
        };
        let owner = DataDefinedOwner::Item(id);
        let feature = atlas_feature(&self.atlas, self.atlas_mode);
        let evaluator = &*self.evaluator;
        let dd = &item.data_defined;
        let rotation = Prop::ItemRotation.matches(property).then(|| {
            self.resolver
                .evaluate_f64(owner, Prop::ItemRotation, dd.get(Prop::ItemRotation), feature, evaluator)
                .unwrap_or(item.rotation())
        });
        let transparency = Prop::Transparency.matches(property).then(|| {
            self.resolver
                .evaluate_f64(owner, Prop::Transparency, dd.get(Prop::Transparency), feature, evaluator)
                .map(|t| t.round().clamp(0.0, 100.0) as u8)
                .unwrap_or(item.transparency)
        });
        let blend_mode = Prop::BlendMode.matches(property).then(|| {
            self.resolver
                .evaluate_string(owner, Prop::BlendMode, dd.get(Prop::BlendMode), feature, evaluator)
                .and_then(|name| BlendMode::from_name(&name))
                .unwrap_or(item.blend_mode)
        });

        let Some(item) = self.items.get_mut(&id) else {
            return;
        };
        let before = item.clone();
        if let Some(rect) = rect {
            item.set_rect(rect);
        }
        if let Some(rotation) = rotation {
            item.set_evaluated_rotation(rotation);
        }
        if let Some(transparency) = transparency {
            item.set_evaluated_transparency(transparency);
        }
        if let Some(mode) = blend_mode {
            item.set_evaluated_blend_mode(mode);
        }
        if *item != before {
            self.emit(CompositionEvent::ItemChanged(id));
        }
    }

    /// 对给定矩形应用图元的位置与尺寸覆盖
    ///
    /// 先求宽高，再以参考点求位置：参考点由旧尺寸确定，覆盖后按新尺寸回推左上角。
    pub fn evaluate_item_rect(&mut self, id: ItemId, rect: Rect) -> Rect {
        let Some(item) = self.items.get(&id) else {
            return rect;
        };
        let owner = DataDefinedOwner::Item(id);
        let feature = atlas_feature(&self.atlas, self.atlas_mode);
        let evaluator = &*self.evaluator;
        let dd = &item.data_defined;
        let (fx, fy) = item.position_mode.fractions();

        let mut eval = |prop: Prop| {
            self.resolver
                .evaluate_f64(owner, prop, dd.get(prop), feature, evaluator)
        };
        let width = eval(Prop::ItemWidth).filter(|w| *w >= 0.0).unwrap_or(rect.width);
        let height = eval(Prop::ItemHeight).filter(|h| *h >= 0.0).unwrap_or(rect.height);
        let x = eval(Prop::PositionX).unwrap_or(rect.x + fx * rect.width) - fx * width;
        let y = eval(Prop::PositionY).unwrap_or(rect.y + fy * rect.height) - fy * height;
        Rect::new(x, y, width, height)
    }

    // ---------------------------------------------------------------
    // 标签
    // ---------------------------------------------------------------

    /// 标签展开后的显示文本，非标签返回 None
    pub fn label_display_text(&self, id: ItemId) -> Option<String> {
        let item = self.items.get(&id)?;
        let label = item.as_label()?;
        let page = self.layout.page_number_for_point(item.rect().top_left());
        let ctx = LabelTextContext {
            page_number: page + 1,
            feature: self.current_feature(),
            evaluator: &*self.evaluator,
            today: Local::now().date_naive(),
        };
        Some(label.display_text(&ctx))
    }

    /// 按显示文本调整标签尺寸，对齐锚点保持不动
    pub fn adjust_label_size_to_text(&mut self, id: ItemId) -> bool {
        let Some(text) = self.label_display_text(id) else {
            return false;
        };
        let Some(item) = self.items.get(&id) else {
            return false;
        };
        let Some(label) = item.as_label() else {
            return false;
        };
        let (width, height) = label.size_for_text(&text, &*self.text_metrics, item.frame.pen_width());
        let rect = item.rect();
        let shift = item_shift_adjust_size(
            item.evaluated_rotation(),
            label.halign,
            label.valign,
            (rect.width, rect.height),
            (width, height),
        );
        let target = Rect::new(rect.x + shift.x, rect.y + shift.y, width, height);
        let target = self.evaluate_item_rect(id, target);
        self.modify_item(id, |item| item.set_rect(target)).is_some()
    }

    // ---------------------------------------------------------------
    // 图集
    // ---------------------------------------------------------------

    /// 切换图集模式
    ///
    /// 图集未启用或没有要素时拒绝预览/导出并回到 Off。
    pub fn set_atlas_mode(&mut self, mode: AtlasMode) -> bool {
        if mode == AtlasMode::Off {
            let was_on = self.atlas_mode != AtlasMode::Off;
            self.atlas.end_render();
            self.atlas_mode = AtlasMode::Off;
            if was_on {
                self.refresh_items();
                self.emit(CompositionEvent::AtlasFeatureChanged(None));
            }
            return true;
        }
        if !self.atlas.enabled || self.atlas.num_features() == 0 {
            tracing::warn!("Atlas has no coverage features, staying in normal mode");
            self.atlas_mode = AtlasMode::Off;
            return false;
        }
        self.atlas_mode = mode;
        if self.atlas.current_index().is_none() {
            self.atlas.first();
        }
        self.atlas_feature_changed();
        true
    }

    fn atlas_feature_changed(&mut self) {
        self.refresh_items();
        let index = self.atlas.current_index();
        self.emit(CompositionEvent::AtlasFeatureChanged(index));
    }

    fn atlas_navigate(&mut self, step: impl FnOnce(&mut AtlasComposition) -> bool) -> bool {
        if self.atlas_mode == AtlasMode::Off {
            return false;
        }
        if !step(&mut self.atlas) {
            return false;
        }
        self.atlas_feature_changed();
        true
    }

    pub fn atlas_first(&mut self) -> bool {
        self.atlas_navigate(AtlasComposition::first)
    }

    pub fn atlas_last(&mut self) -> bool {
        self.atlas_navigate(AtlasComposition::last)
    }

    pub fn atlas_next(&mut self) -> bool {
        self.atlas_navigate(AtlasComposition::next)
    }

    pub fn atlas_prev(&mut self) -> bool {
        self.atlas_navigate(AtlasComposition::prev)
    }

    pub fn atlas_seek(&mut self, index: usize) -> bool {
        self.atlas_navigate(|atlas| atlas.seek(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompositionConfig;
    use crate::data_defined::{CompiledExpression, DataDefined, ExpressionEvaluator};
    use crate::error::ExpressionError;
    use crate::item::{ItemPositionMode, Label, ShapeItem};
    use crate::math::EPSILON;
    use crate::style::{HAlign, VAlign};

    fn atlas_composition() -> Composition {
        let mut c = Composition::new(CompositionConfig::default());
        let features = (0..3)
            .map(|i| {
                Feature::new(i)
                    .with_attribute("name", format!("Sheet {}", i + 1))
                    .with_attribute("paper", if i == 1 { "A3" } else { "A4" })
                    .with_attribute("angle", i * 30)
            })
            .collect();
        c.set_atlas(AtlasComposition::new(
            vec!["name".to_string(), "paper".to_string(), "angle".to_string()],
            features,
        ));
        c
    }

    #[test]
    fn test_paper_preset_and_orientation() {
        let mut c = Composition::default();
        c.set_data_defined_property(Prop::PresetPaperSize, DataDefined::from_expression("'a4'"));
        assert_eq!((c.paper_width(), c.paper_height()), (210.0, 297.0));
        c.set_data_defined_property(Prop::PaperOrientation, DataDefined::from_expression("'landscape'"));
        assert_eq!((c.paper_width(), c.paper_height()), (297.0, 210.0));
        // 宽度覆盖在方向之前应用
        c.set_data_defined_property(Prop::PaperWidth, DataDefined::from_expression("500"));
        assert_eq!((c.paper_width(), c.paper_height()), (500.0, 297.0));
        assert!(c.take_events().contains(&CompositionEvent::PaperSizeChanged));
    }

    #[test]
    fn test_static_paper_size_restored_when_override_removed() {
        let mut c = Composition::default();
        c.set_paper_size(100.0, 150.0);
        c.set_data_defined_property(Prop::PaperWidth, DataDefined::from_expression("200"));
        assert_eq!(c.paper_width(), 200.0);
        c.set_data_defined_property(Prop::PaperWidth, DataDefined::default());
        assert_eq!(c.paper_width(), 100.0);
    }

    #[test]
    fn test_num_pages_override() {
        let mut c = Composition::default();
        c.set_data_defined_property(Prop::NumPages, DataDefined::from_expression("3"));
        assert_eq!(c.num_pages(), 3);
        assert_eq!(c.pages().len(), 3);
        c.set_data_defined_property(Prop::NumPages, DataDefined::from_expression("0"));
        assert_eq!(c.num_pages(), 1);
    }

    #[test]
    fn test_field_sources_need_atlas_mode() {
        let mut c = atlas_composition();
        c.set_data_defined_property(Prop::PresetPaperSize, DataDefined::from_field("paper"));
        assert_eq!(c.paper_width(), 297.0);

        assert!(c.set_atlas_mode(AtlasMode::Preview));
        assert_eq!(c.atlas().current_index(), Some(0));
        assert_eq!((c.paper_width(), c.paper_height()), (210.0, 297.0));
        assert!(c.atlas_next());
        assert_eq!((c.paper_width(), c.paper_height()), (297.0, 420.0));
        assert!(c.atlas_last());
        assert!(!c.atlas_next());
        assert!(c.atlas_seek(1));
        assert!(!c.atlas_seek(7));

        let events = c.take_events();
        assert!(events.contains(&CompositionEvent::AtlasFeatureChanged(Some(1))));

        assert!(c.set_atlas_mode(AtlasMode::Off));
        assert_eq!(c.atlas().current_index(), None);
        assert_eq!(c.paper_width(), 297.0);
        assert!(!c.atlas_next());
    }

    #[test]
    fn test_atlas_mode_refused_without_features() {
        let mut c = Composition::default();
        assert!(!c.set_atlas_mode(AtlasMode::Export));
        assert_eq!(c.atlas_mode(), AtlasMode::Off);
        let mut c = atlas_composition();
        c.atlas_mut().enabled = false;
        assert!(!c.set_atlas_mode(AtlasMode::Preview));
        assert!(c.set_atlas_mode(AtlasMode::Off));
    }

    #[test]
    fn test_item_rotation_follows_feature() {
        let mut c = atlas_composition();
        let id = c.add_shape(ShapeItem::default(), Rect::new(0.0, 0.0, 10.0, 10.0));
        c.modify_item(id, |item| {
            item.set_rotation(5.0);
            item.data_defined.set(Prop::ItemRotation, DataDefined::from_field("angle"));
        });
        c.set_atlas_mode(AtlasMode::Preview);
        assert_eq!(c.item(id).unwrap().evaluated_rotation(), 0.0);
        c.atlas_next();
        assert_eq!(c.item(id).unwrap().evaluated_rotation(), 30.0);
        assert_eq!(c.item(id).unwrap().rotation(), 5.0);
        c.set_atlas_mode(AtlasMode::Off);
        assert_eq!(c.item(id).unwrap().evaluated_rotation(), 5.0);
    }

    #[test]
    fn test_item_rect_override_keeps_reference_point() {
        let mut c = Composition::default();
        let id = c.add_shape(ShapeItem::default(), Rect::new(10.0, 10.0, 20.0, 20.0));
        c.modify_item(id, |item| {
            item.position_mode = ItemPositionMode::Middle;
            item.data_defined.set(Prop::ItemWidth, DataDefined::from_expression("40"));
        });
        c.refresh_item_data_defined(id, Prop::ItemWidth);
        // 中心 x = 20 不变
        assert_eq!(c.item(id).unwrap().rect(), Rect::new(0.0, 10.0, 40.0, 20.0));

        c.modify_item(id, |item| {
            item.data_defined.set(Prop::PositionY, DataDefined::from_expression("100"));
        });
        c.refresh_items();
        assert_eq!(c.item(id).unwrap().rect(), Rect::new(0.0, 90.0, 40.0, 20.0));
    }

    #[test]
    fn test_transparency_and_blend_mode_overrides() {
        let mut c = Composition::default();
        let id = c.add_shape(ShapeItem::default(), Rect::new(0.0, 0.0, 10.0, 10.0));
        c.modify_item(id, |item| {
            item.data_defined.set(Prop::Transparency, DataDefined::from_expression("150"));
            item.data_defined.set(Prop::BlendMode, DataDefined::from_expression("'multiply'"));
        });
        c.refresh_items();
        let item = c.item(id).unwrap();
        assert_eq!(item.evaluated_transparency(), 100);
        assert_eq!(item.evaluated_blend_mode(), BlendMode::Multiply);
        assert_eq!(item.transparency, 0);
    }

    #[test]
    fn test_label_text_uses_page_and_feature() {
        let mut c = atlas_composition();
        c.set_num_pages(2);
        let id = c.add_label(
            Label::new("[% \"name\" %] page [% $page %]"),
            Rect::new(0.0, 400.0, 30.0, 10.0),
        );
        assert_eq!(c.label_display_text(id).unwrap(), "[% \"name\" %] page 2");
        c.set_atlas_mode(AtlasMode::Preview);
        assert_eq!(c.label_display_text(id).unwrap(), "Sheet 1 page 2");
        let shape = c.add_shape(ShapeItem::default(), Rect::default());
        assert!(c.label_display_text(shape).is_none());
        assert!(!c.adjust_label_size_to_text(shape));
    }

    #[test]
    fn test_adjust_size_keeps_right_edge() {
        let mut c = Composition::default();
        let mut label = Label::new("abcd");
        label.halign = HAlign::Right;
        label.valign = VAlign::Top;
        let id = c.add_label(label, Rect::new(50.0, 20.0, 100.0, 30.0));
        assert!(c.adjust_label_size_to_text(id));
        let rect = c.item(id).unwrap().rect();
        assert!((rect.right() - 150.0).abs() < EPSILON);
        assert!((rect.top() - 20.0).abs() < EPSILON);
        assert!(rect.width < 100.0);
    }

    struct FailingEvaluator;

    impl ExpressionEvaluator for FailingEvaluator {
        fn compile(&self, expression: &str) -> Result<Box<dyn CompiledExpression>, ExpressionError> {
            Err(ExpressionError::Parse {
                expression: expression.to_string(),
                message: "unsupported".to_string(),
            })
        }
    }

    #[test]
    fn test_failed_expression_falls_back_to_static_value() {
        let mut c = Composition::default();
        c.set_expression_evaluator(Box::new(FailingEvaluator));
        c.set_data_defined_property(Prop::PaperWidth, DataDefined::from_expression("width * 2"));
        assert_eq!(c.paper_width(), 297.0);
        // 字面量不经过求值器
        c.set_data_defined_property(Prop::PaperHeight, DataDefined::from_expression("150"));
        assert_eq!(c.paper_height(), 150.0);
    }
}
