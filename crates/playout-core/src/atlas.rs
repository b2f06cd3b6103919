//! 图集
//!
//! 逐个遍历覆盖层要素，每次切换要素时场景重新求值所有数据驱动属性，
//! 用于批量生成地图系列。

use serde::{Deserialize, Serialize};

use crate::data_defined::Feature;

/// 场景的图集模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AtlasMode {
    #[default]
    Off,
    /// 预览单个要素
    Preview,
    /// 导出全部要素
    Export,
}

/// 图集设置与迭代状态
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AtlasComposition {
    pub enabled: bool,
    /// 覆盖层字段名
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    features: Vec<Feature>,
    /// 输出文件名表达式
    #[serde(default)]
    pub filename_pattern: String,
    #[serde(skip)]
    current: Option<usize>,
}

impl AtlasComposition {
    pub fn new(fields: Vec<String>, features: Vec<Feature>) -> Self {
        Self {
            enabled: true,
            fields,
            features,
            filename_pattern: String::new(),
            current: None,
        }
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// 替换覆盖要素，迭代位置复位
    pub fn set_features(&mut self, features: Vec<Feature>) {
        self.features = features;
        self.current = None;
    }

    pub fn num_features(&self) -> usize {
        self.features.len()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    /// 当前要素，未开始迭代或未启用时为 None
    pub fn current_feature(&self) -> Option<&Feature> {
        if !self.enabled {
            return None;
        }
        self.current.and_then(|i| self.features.get(i))
    }

    /// 跳到第 `index` 个要素，越界时返回 false 且不改变位置
    pub fn seek(&mut self, index: usize) -> bool {
        if !self.enabled || index >= self.features.len() {
            return false;
        }
        self.current = Some(index);
        true
    }

    pub fn first(&mut self) -> bool {
        self.seek(0)
    }

    pub fn last(&mut self) -> bool {
        match self.features.len().checked_sub(1) {
            Some(index) => self.seek(index),
            None => false,
        }
    }

    /// 下一个要素，已在最后时返回 false
    pub fn next(&mut self) -> bool {
        match self.current {
            Some(index) => self.seek(index + 1),
            None => self.first(),
        }
    }

    /// 上一个要素，已在第一个时返回 false
    pub fn prev(&mut self) -> bool {
        match self.current {
            Some(index) if index > 0 => self.seek(index - 1),
            _ => false,
        }
    }

    /// 结束迭代
    pub fn end_render(&mut self) {
        self.current = None;
    }
}
