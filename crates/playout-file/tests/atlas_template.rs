//! 模板 + 覆盖数据的组合加载

use playout_core::atlas::AtlasMode;
use playout_core::composition::Composition;
use playout_core::config::CompositionConfig;
use playout_core::item::Label;
use playout_core::math::Rect;
use playout_core::template::SubstitutionMap;
use playout_file::{load_config, load_coverage, load_template, save_template};

#[test]
fn template_labels_follow_atlas_features() {
    let dir = tempfile::tempdir().unwrap();
    let template_path = dir.path().join("regions.qpt");
    let coverage_path = dir.path().join("regions.json");
    let config_path = dir.path().join("config.json");

    let mut source = Composition::new(CompositionConfig::default());
    source.add_label(
        Label::new(r#"[heading]: [% "name" %] ([% $page %])"#),
        Rect::new(10.0, 10.0, 100.0, 10.0),
    );
    save_template(&source, &template_path).unwrap();

    std::fs::write(
        &coverage_path,
        r#"{ "fields": ["name"], "features": [
            { "id": 1, "attributes": { "name": "North" } },
            { "id": 2, "attributes": { "name": "South" } }
        ] }"#,
    )
    .unwrap();
    std::fs::write(&config_path, r#"{ "print_resolution": 96 }"#).unwrap();

    let config = load_config(&config_path).unwrap();
    let mut composition = Composition::new(config);
    let mut subs = SubstitutionMap::new();
    subs.insert("heading".to_string(), "Region".to_string());
    assert_eq!(load_template(&mut composition, &template_path, &subs, false).unwrap(), 1);
    assert_eq!(composition.config().print_resolution, 96);

    composition.set_atlas(load_coverage(&coverage_path).unwrap());
    assert!(composition.set_atlas_mode(AtlasMode::Export));

    let label = composition.items().find(|(_, item)| item.as_label().is_some()).map(|(id, _)| id).unwrap();
    assert_eq!(composition.label_display_text(label).unwrap(), "Region: North (1)");

    assert!(composition.atlas_next());
    assert_eq!(composition.label_display_text(label).unwrap(), "Region: South (1)");
    assert!(!composition.atlas_next());
}
