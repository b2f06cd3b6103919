//! 场景配置文件（JSON）
//!
//! 缺失的字段取默认值。

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use playout_core::config::CompositionConfig;

use crate::error::FileError;

pub fn load_config(path: &Path) -> Result<CompositionConfig, FileError> {
    let reader = BufReader::new(File::open(path)?);
    let config: CompositionConfig = serde_json::from_reader(reader)?;
    if config.print_resolution == 0 {
        return Err(FileError::InvalidFormat("print_resolution must be positive".to_string()));
    }

    tracing::info!("Loaded configuration from {}", path.display());
    Ok(config)
}

pub fn save_config(config: &CompositionConfig, path: &Path) -> Result<(), FileError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, config)?;
    writer.flush()?;
    Ok(())
}
