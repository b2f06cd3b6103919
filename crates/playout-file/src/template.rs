//! 版面模板（.qpt）
//!
//! 模板就是 `<Composer>` 文档片段的 XML 文本。加载模板时替换占位符并
//! 丢弃图元 uuid；打开版面文件则原样保留。

use std::fs;
use std::path::Path;

use playout_core::composition::Composition;
use playout_core::config::CompositionConfig;
use playout_core::template::SubstitutionMap;

use crate::error::FileError;

/// 模板文件扩展名
pub const TEMPLATE_EXTENSION: &str = "qpt";

/// 读取模板文本并做基本格式检查
pub fn read_template_text(path: &Path) -> Result<String, FileError> {
    let text = fs::read_to_string(path)?;
    if !text.contains("<Composer") && !text.contains("<Composition") {
        return Err(FileError::InvalidFormat(format!(
            "{} is not a layout template",
            path.display()
        )));
    }
    Ok(text)
}

/// 将模板加载到已有场景，返回图元数
pub fn load_template(
    composition: &mut Composition,
    path: &Path,
    substitutions: &SubstitutionMap,
    add_undo: bool,
) -> Result<usize, FileError> {
    let text = read_template_text(path)?;
    let count = composition.load_from_template(&text, substitutions, add_undo)?;

    tracing::info!("Loaded {} items from template {}", count, path.display());
    Ok(count)
}

/// 打开版面文件为新场景（保留 uuid）
pub fn load_layout(path: &Path, config: CompositionConfig) -> Result<Composition, FileError> {
    let text = read_template_text(path)?;
    let mut composition = Composition::new(config);
    composition.load_from_xml(&text)?;

    tracing::info!(
        "Opened layout {} ({} pages, {} items)",
        path.display(),
        composition.num_pages(),
        composition.item_count()
    );
    Ok(composition)
}

/// 保存场景为模板/版面文件
pub fn save_template(composition: &Composition, path: &Path) -> Result<(), FileError> {
    fs::write(path, composition.to_xml_string())?;

    tracing::info!("Saved {} items to {}", composition.item_count(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use playout_core::item::Label;
    use playout_core::math::Rect;

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout.qpt");

        let mut composition = Composition::new(CompositionConfig::default());
        composition.set_num_pages(2);
        let id = composition.add_label(Label::new("Title"), Rect::new(10.0, 10.0, 50.0, 10.0));
        let uuid = composition.item(id).unwrap().uuid;
        save_template(&composition, &path).unwrap();

        let loaded = load_layout(&path, CompositionConfig::default()).unwrap();
        assert_eq!(loaded.num_pages(), 2);
        assert_eq!(loaded.item_count(), 1);
        assert!(loaded.item_by_uuid(uuid).is_some());
    }

    #[test]
    fn test_template_substitution() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.qpt");

        let mut source = Composition::new(CompositionConfig::default());
        source.add_label(Label::new("[title]"), Rect::new(10.0, 10.0, 50.0, 10.0));
        save_template(&source, &path).unwrap();

        let mut subs = SubstitutionMap::new();
        subs.insert("title".to_string(), "Rivers & Lakes".to_string());
        let mut target = Composition::new(CompositionConfig::default());
        assert_eq!(load_template(&mut target, &path, &subs, false).unwrap(), 1);

        let label = target.items().find_map(|(_, item)| item.as_label()).unwrap();
        assert_eq!(label.text, "Rivers & Lakes");
    }

    #[test]
    fn test_rejects_other_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.qpt");
        fs::write(&path, "just some text").unwrap();

        let result = load_layout(&path, CompositionConfig::default());
        assert!(matches!(result, Err(FileError::InvalidFormat(_))));
    }

    #[test]
    fn test_unsupported_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.qpt");
        fs::write(
            &path,
            r#"<Composer formatVersion="99"><Composition paperWidth="297" paperHeight="210"/></Composer>"#,
        )
        .unwrap();

        let result = load_layout(&path, CompositionConfig::default());
        assert!(matches!(result, Err(FileError::UnsupportedVersion(_))));
    }
}
