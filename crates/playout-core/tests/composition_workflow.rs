//! 场景级工作流：编辑、撤销、数据驱动、序列化与绘制

use playout_core::prelude::*;

fn two_page_layout() -> (Composition, ItemId, ItemId) {
    let mut composition = Composition::new(CompositionConfig::default());
    composition.set_paper_size(200.0, 100.0);
    composition.set_num_pages(2);
    let title = composition.add_label(Label::new("Title"), Rect::new(10.0, 10.0, 80.0, 12.0));
    // 第二页：页面顶部 = 100 + 10
    let note = composition.add_label(Label::new("Notes [% $page %]"), Rect::new(10.0, 130.0, 80.0, 12.0));
    (composition, title, note)
}

#[test]
fn move_with_undo_and_redo() {
    let (mut composition, title, _) = two_page_layout();

    composition.begin_command(title, "Item moved", MergeContext::ItemMove).unwrap();
    composition.modify_item(title, |item| {
        let rect = item.rect().translated(15.0, 5.0);
        item.set_rect(rect);
    });
    assert!(composition.end_command().unwrap());

    assert_eq!(composition.item(title).unwrap().rect().x, 25.0);
    assert!(composition.undo().unwrap());
    assert_eq!(composition.item(title).unwrap().rect().x, 10.0);
    assert!(composition.redo().unwrap());
    assert_eq!(composition.item(title).unwrap().rect().x, 25.0);
}

#[test]
fn page_width_follows_atlas_feature() {
    let (mut composition, _, _) = two_page_layout();
    composition.set_atlas(AtlasComposition::new(
        vec!["width".to_string()],
        vec![
            Feature::new(1).with_attribute("width", 300.0),
            Feature::new(2).with_attribute("width", 150.0),
        ],
    ));
    composition.set_data_defined_property(DataDefinedProperty::PaperWidth, DataDefined::from_field("width"));

    assert!(composition.set_atlas_mode(AtlasMode::Preview));
    assert_eq!(composition.paper_width(), 300.0);
    assert!(composition.atlas_next());
    assert_eq!(composition.paper_width(), 150.0);

    assert!(composition.set_atlas_mode(AtlasMode::Off));
    assert_eq!(composition.paper_width(), 200.0);
}

#[test]
fn document_round_trip_keeps_scene() {
    let (mut composition, title, _) = two_page_layout();
    composition.add_snap_line(SnapLineOrientation::Vertical, 42.0);
    composition.move_item_to_bottom(title);
    let text = composition.to_xml_string();

    let mut restored = Composition::new(CompositionConfig::default());
    restored.load_from_xml(&text).unwrap();

    assert_eq!(restored.num_pages(), 2);
    assert_eq!(restored.paper_width(), 200.0);
    assert_eq!(restored.item_count(), 2);
    assert_eq!(restored.snap_lines().len(), 1);

    let uuid = composition.item(title).unwrap().uuid;
    let restored_title = restored.item_by_uuid(uuid).unwrap();
    assert_eq!(restored.z_order().as_slice().first().copied(), Some(restored_title));
    assert!(restored.undo_stack().is_empty());
}

#[test]
fn second_page_renders_its_own_items() {
    let (mut composition, _, _) = two_page_layout();

    let mut first = DisplayList::new();
    composition.render_page(&mut first, 0).unwrap();
    assert_eq!(first.texts(), vec!["Title"]);

    let mut second = DisplayList::new();
    composition.render_page(&mut second, 1).unwrap();
    assert_eq!(second.texts(), vec!["Notes 2"]);

    assert!(composition.render_page(&mut DisplayList::new(), 2).is_err());
}

fn boxes(composition: &mut Composition, count: usize) -> Vec<ItemId> {
    (0..count)
        .map(|i| composition.add_shape(ShapeItem::default(), Rect::new(10.0 * i as f64, 20.0, 8.0, 8.0)))
        .collect()
}

fn z_values_match_ranks(composition: &Composition) -> bool {
    composition
        .z_order()
        .iter()
        .enumerate()
        .all(|(rank, id)| composition.item(id).unwrap().z_value == (rank + 1) as f64)
}

#[test]
fn stacking_survives_remove_add_and_undo() {
    let (mut composition, _, _) = two_page_layout();
    let ids = boxes(&mut composition, 3);
    let (a, b, c) = (ids[0], ids[1], ids[2]);

    assert!(composition.remove_item(a, true));
    assert!(composition.remove_item(b, true));
    assert!(z_values_match_ranks(&composition));

    // 删除后新加的图元仍在最顶层
    let d = composition.add_shape(ShapeItem::default(), Rect::new(60.0, 20.0, 8.0, 8.0));
    assert!(composition.item(d).unwrap().z_value > composition.item(c).unwrap().z_value);

    composition.undo().unwrap();
    let order: Vec<ItemId> = composition.z_order().iter().collect();
    let position = |id| order.iter().position(|i| *i == id).unwrap();
    assert!(position(b) < position(c));
    assert!(position(c) < position(d));

    composition.undo().unwrap();
    let order: Vec<ItemId> = composition.z_order().iter().collect();
    assert_eq!(&order[order.len() - 4..], &[a, b, c, d]);
    assert!(z_values_match_ranks(&composition));

    composition.redo().unwrap();
    composition.redo().unwrap();
    let order: Vec<ItemId> = composition.z_order().iter().collect();
    assert_eq!(&order[order.len() - 2..], &[c, d]);
    assert!(z_values_match_ranks(&composition));
}

#[test]
fn stacking_survives_reload_after_removals() {
    let (mut composition, title, note) = two_page_layout();
    let ids = boxes(&mut composition, 3);
    composition.remove_item(title, true);
    composition.remove_item(ids[1], true);
    let top = composition.add_shape(ShapeItem::default(), Rect::new(5.0, 50.0, 8.0, 8.0));
    composition.move_item_to_bottom(ids[2]);

    let expected: Vec<ItemId> = composition.z_order().iter().collect();
    assert_eq!(expected, vec![ids[2], note, ids[0], top]);

    let mut restored = Composition::new(CompositionConfig::default());
    restored.load_from_xml(&composition.to_xml_string()).unwrap();
    let rects: Vec<Rect> = restored
        .z_order()
        .iter()
        .map(|id| restored.item(id).unwrap().rect())
        .collect();
    let expected_rects: Vec<Rect> = expected.iter().map(|id| composition.item(*id).unwrap().rect()).collect();
    assert_eq!(rects, expected_rects);
}

#[test]
fn undo_removal_restores_world_file_map() {
    let (mut composition, _, _) = two_page_layout();
    let map = composition.add_map(
        MapItem::new(MapExtent::new(0.0, 0.0, 200.0, 100.0)),
        Rect::new(0.0, 0.0, 100.0, 50.0),
    );
    composition.set_world_file_map(Some(map));
    composition.set_generate_world_file(true);
    assert!(composition.compute_world_file_parameters().is_some());

    composition.remove_item(map, true);
    assert_eq!(composition.world_file_map(), None);

    composition.undo().unwrap();
    assert_eq!(composition.world_file_map(), Some(map));
    assert!(composition.compute_world_file_parameters().is_some());
}
