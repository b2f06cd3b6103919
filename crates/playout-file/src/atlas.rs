//! 图集覆盖数据（JSON）
//!
//! ```json
//! { "fields": ["name"], "features": [ { "id": 1, "attributes": { "name": "North" } } ] }
//! ```
//!
//! 未给出字段表时按要素属性名汇总。

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use playout_core::atlas::AtlasComposition;
use playout_core::data_defined::Feature;
use serde::{Deserialize, Serialize};

use crate::error::FileError;

#[derive(Debug, Serialize, Deserialize)]
struct CoverageFile {
    #[serde(default)]
    fields: Vec<String>,
    features: Vec<Feature>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    filename_pattern: String,
}

/// 读取覆盖数据为已启用的图集
pub fn load_coverage(path: &Path) -> Result<AtlasComposition, FileError> {
    let reader = BufReader::new(File::open(path)?);
    let coverage: CoverageFile = serde_json::from_reader(reader)?;

    let fields = if coverage.fields.is_empty() {
        coverage
            .features
            .iter()
            .flat_map(|f| f.attributes.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    } else {
        coverage.fields
    };

    for feature in &coverage.features {
        if let Some(unknown) = feature.attributes.keys().find(|k| !fields.contains(*k)) {
            return Err(FileError::InvalidFormat(format!(
                "feature {} has attribute '{}' not in the field list",
                feature.id, unknown
            )));
        }
    }

    let mut atlas = AtlasComposition::new(fields, coverage.features);
    atlas.filename_pattern = coverage.filename_pattern;

    tracing::info!("Loaded {} atlas features from {}", atlas.num_features(), path.display());
    Ok(atlas)
}

pub fn save_coverage(atlas: &AtlasComposition, path: &Path) -> Result<(), FileError> {
    let coverage = CoverageFile {
        fields: atlas.fields.clone(),
        features: atlas.features().to_vec(),
        filename_pattern: atlas.filename_pattern.clone(),
    };
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, &coverage)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_collected_from_features() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coverage.json");
        std::fs::write(
            &path,
            r#"{ "features": [
                { "id": 1, "attributes": { "name": "North", "rank": 2 } },
                { "id": 2, "attributes": { "name": "South" } }
            ] }"#,
        )
        .unwrap();

        let atlas = load_coverage(&path).unwrap();
        assert!(atlas.enabled);
        assert_eq!(atlas.fields, vec!["name".to_string(), "rank".to_string()]);
        assert_eq!(atlas.num_features(), 2);
        assert_eq!(atlas.current_index(), None);
    }

    #[test]
    fn test_unknown_attribute_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coverage.json");
        std::fs::write(
            &path,
            r#"{ "fields": ["name"], "features": [ { "id": 1, "attributes": { "height": 3 } } ] }"#,
        )
        .unwrap();

        assert!(matches!(load_coverage(&path), Err(FileError::InvalidFormat(_))));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coverage.json");
        let mut atlas = AtlasComposition::new(
            vec!["name".to_string()],
            vec![Feature::new(7).with_attribute("name", "East")],
        );
        atlas.filename_pattern = "'map_' || \"name\"".to_string();

        save_coverage(&atlas, &path).unwrap();
        let loaded = load_coverage(&path).unwrap();
        assert_eq!(loaded.features(), atlas.features());
        assert_eq!(loaded.filename_pattern, atlas.filename_pattern);
    }
}
