//! PLayout 核心场景模型
//!
//! 打印版面由一个 [`Composition`](composition::Composition) 持有：
//! 多页纸张、按 Z 序排列的图元、捕捉线与网格、撤销栈，以及
//! 随图集要素变化重新求值的数据驱动属性。
//!
//! # 架构设计
//!
//! 场景是唯一的所有者（arena）：
//! - `ItemId`: 场景内图元键
//! - `Item`: 通用属性 + `ItemKind` 具体内容
//! - `ZOrderList`: 绘制顺序，不含纸张
//! - `UndoStack`: 图元/多帧状态快照命令
//!
//! 绘制通过 [`Painter`](paint::Painter) 接口，输出设备在 playout-render 中实现。
//!
//! # 示例
//!
//! ```rust
//! use playout_core::prelude::*;
//!
//! let mut composition = Composition::new(CompositionConfig::default());
//! let title = composition.add_label(Label::new("Title"), Rect::new(10.0, 10.0, 80.0, 12.0));
//!
//! composition.set_selected_item(Some(title));
//! composition.align_selected_items_left();
//!
//! let mut list = DisplayList::new();
//! composition.render_page(&mut list, 0).unwrap();
//! assert_eq!(list.texts(), vec!["Title"]);
//! ```

pub mod atlas;
pub mod command;
pub mod composition;
pub mod config;
pub mod content;
pub mod data_defined;
pub mod dom;
pub mod error;
pub mod item;
pub mod math;
pub mod multiframe;
pub mod page;
pub mod paint;
pub mod snap;
pub mod style;
pub mod template;
pub mod zorder;

pub mod prelude {
    //! 常用类型的便捷导入
    pub use crate::atlas::{AtlasComposition, AtlasMode};
    pub use crate::command::{Command, MergeContext, UndoStack};
    pub use crate::composition::{
        Alignment, Composition, CompositionEvent, DocumentDevice, PagedDevice, PlotStyle, RasterSurface,
        WorldFileParameters, ZValueDirection,
    };
    pub use crate::config::CompositionConfig;
    pub use crate::content::{ContentJob, ContentLoader, RichContent};
    pub use crate::data_defined::{DataDefined, DataDefinedProperty, ExpressionEvaluator, Feature};
    pub use crate::dom::Element;
    pub use crate::error::{CommandError, ExpressionError, RenderError, XmlError};
    pub use crate::item::{
        FontDescription, Item, ItemId, ItemKind, ItemPositionMode, ItemType, Label, MapExtent, MapItem, ShapeItem,
        TextMetrics,
    };
    pub use crate::math::{Point2, Rect, Transform2D, Vector2};
    pub use crate::multiframe::{MultiFrame, MultiFrameId};
    pub use crate::page::{PageLayout, PaperOrientation};
    pub use crate::paint::{DisplayList, PaintCommand, Painter, PainterState, TextStyle};
    pub use crate::snap::{SnapLineOrientation, SnapSettings};
    pub use crate::style::{BlendMode, Color, HAlign, VAlign};
    pub use crate::template::SubstitutionMap;
}
