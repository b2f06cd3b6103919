//! 多帧内容
//!
//! 一个多帧对象（目前为 HTML 内容）按顺序拥有若干帧图元，内容依次流过这些帧。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dom::Element;
use crate::item::ItemId;

/// 多帧标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MultiFrameId(pub u64);

impl fmt::Display for MultiFrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "multiframe#{}", self.0)
    }
}

/// 内容超出现有帧时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResizeMode {
    #[default]
    UseExistingFrames,
    ExtendToNextPage,
    RepeatOnEveryPage,
    RepeatUntilFinished,
}

impl ResizeMode {
    pub fn code(&self) -> u8 {
        match self {
            ResizeMode::UseExistingFrames => 0,
            ResizeMode::ExtendToNextPage => 1,
            ResizeMode::RepeatOnEveryPage => 2,
            ResizeMode::RepeatUntilFinished => 3,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            1 => ResizeMode::ExtendToNextPage,
            2 => ResizeMode::RepeatOnEveryPage,
            3 => ResizeMode::RepeatUntilFinished,
            _ => ResizeMode::UseExistingFrames,
        }
    }
}

/// HTML 多帧
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MultiFrame {
    pub html: String,
    pub resize_mode: ResizeMode,
    frames: Vec<ItemId>,
}

impl MultiFrame {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            ..Default::default()
        }
    }

    pub fn frames(&self) -> &[ItemId] {
        &self.frames
    }

    pub fn add_frame(&mut self, frame: ItemId) {
        if !self.frames.contains(&frame) {
            self.frames.push(frame);
        }
    }

    /// 移除帧，返回它原来的位置
    pub fn remove_frame(&mut self, frame: ItemId) -> Option<usize> {
        let index = self.frames.iter().position(|f| *f == frame)?;
        self.frames.remove(index);
        Some(index)
    }

    /// 在原位置重新插入（撤销删除时使用）
    pub fn insert_frame(&mut self, index: usize, frame: ItemId) {
        if !self.frames.contains(&frame) {
            let index = index.min(self.frames.len());
            self.frames.insert(index, frame);
        }
    }

    pub fn frame_index(&self, frame: ItemId) -> Option<usize> {
        self.frames.iter().position(|f| *f == frame)
    }

    /// `<HtmlMultiFrame>` 元素，帧元素由调用方追加
    pub fn write_xml(&self) -> Element {
        let mut element = Element::new("HtmlMultiFrame").with_attribute("resizeMode", self.resize_mode.code());
        element.append_child(Element::new("ContentHtml")).set_text(self.html.clone());
        element
    }

    pub fn read_xml(element: &Element) -> Self {
        Self {
            html: element
                .first_child("ContentHtml")
                .map(|c| c.text().to_string())
                .unwrap_or_default(),
            resize_mode: ResizeMode::from_code(element.attr_or("resizeMode", 0)),
            frames: Vec::new(),
        }
    }
}
