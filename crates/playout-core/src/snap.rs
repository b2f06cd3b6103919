//! 捕捉与对齐
//!
//! 交互移动/缩放图元时调整候选位置：
//! - 网格捕捉：坐标取最近的 “分辨率整数倍 + 偏移”（相对所在页面），仅在容差内生效
//! - 对齐捕捉：与其他图元、页面的左/中/右、上/中/下边以及捕捉线对齐
//! - 捕捉线查询：最近的一条辅助线及吸附在其上的图元
//!
//! X、Y 两个方向独立求解，多个候选时取调整量绝对值最小者（相同时先找到者优先）。

use serde::{Deserialize, Serialize};

use crate::item::{Item, ItemId, ItemPositionMode};
use crate::math::{approx_eq, normalize_degrees, Point2, Rect, Vector2};
use crate::style::{HAlign, VAlign};

/// 判断图元是否吸附在捕捉线上的容差
const SNAPPED_ITEM_TOLERANCE: f64 = 1e-7;

/// 捕捉设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapSettings {
    pub snap_to_grid: bool,
    pub grid_visible: bool,
    /// 网格分辨率（毫米）
    pub grid_resolution: f64,
    pub grid_offset_x: f64,
    pub grid_offset_y: f64,
    pub snap_lines_visible: bool,
    /// 与其他图元对齐
    pub alignment_snap: bool,
    /// 对齐时同时考虑捕捉线
    pub smart_guides: bool,
    /// 捕捉容差（屏幕像素）
    pub tolerance_px: f64,
}

impl Default for SnapSettings {
    fn default() -> Self {
        Self {
            snap_to_grid: false,
            grid_visible: false,
            grid_resolution: 10.0,
            grid_offset_x: 0.0,
            grid_offset_y: 0.0,
            snap_lines_visible: true,
            alignment_snap: true,
            smart_guides: true,
            tolerance_px: 5.0,
        }
    }
}

impl SnapSettings {
    /// 屏幕像素容差换算为场景毫米，`view_scale` 为每毫米像素数
    pub fn scene_tolerance(&self, view_scale: f64) -> f64 {
        if view_scale <= 0.0 {
            return self.tolerance_px;
        }
        self.tolerance_px / view_scale
    }
}

/// 捕捉线标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapLineId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SnapLineOrientation {
    Horizontal,
    Vertical,
}

/// 水平或垂直辅助线
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnapLine {
    pub id: SnapLineId,
    pub orientation: SnapLineOrientation,
    /// 水平线为 Y，垂直线为 X
    pub position: f64,
}

impl SnapLine {
    pub fn is_horizontal(&self) -> bool {
        self.orientation == SnapLineOrientation::Horizontal
    }
}

/// 捕捉来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapSource {
    Grid,
    Page(usize),
    Item(ItemId),
    Line(SnapLineId),
}

/// 单轴捕捉结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisSnap {
    /// 需要叠加到原坐标上的调整量
    pub adjustment: f64,
    /// 对齐到的场景坐标
    pub target: f64,
    pub source: SnapSource,
}

/// 矩形捕捉结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapResult {
    pub rect: Rect,
    pub x: Option<AxisSnap>,
    pub y: Option<AxisSnap>,
}

/// 对齐候选坐标
#[derive(Debug, Clone, Default)]
pub struct AlignTargets {
    pub x: Vec<(f64, SnapSource)>,
    pub y: Vec<(f64, SnapSource)>,
}

impl AlignTargets {
    fn push_rect(&mut self, rect: &Rect, source: SnapSource) {
        self.x.push((rect.left(), source));
        self.x.push((rect.h_center(), source));
        self.x.push((rect.right(), source));
        self.y.push((rect.top(), source));
        self.y.push((rect.v_center(), source));
        self.y.push((rect.bottom(), source));
    }

    /// 收集对齐坐标
    ///
    /// 页面使用纸张矩形，其他图元使用旋转后的包围盒；`exclude` 中的图元
    /// （通常是正在移动的选中图元）与纸张图元本身不参与。
    pub fn collect<'a>(
        items: impl IntoIterator<Item = (ItemId, &'a Item)>,
        exclude: &[ItemId],
        pages: &[Rect],
        lines: &[SnapLine],
        include_lines: bool,
    ) -> Self {
        let mut targets = Self::default();
        for (index, page) in pages.iter().enumerate() {
            targets.push_rect(page, SnapSource::Page(index));
        }
        for (id, item) in items {
            if item.is_paper() || exclude.contains(&id) {
                continue;
            }
            targets.push_rect(&item.bounding_rect(), SnapSource::Item(id));
        }
        if include_lines {
            for line in lines {
                let entry = (line.position, SnapSource::Line(line.id));
                match line.orientation {
                    SnapLineOrientation::Horizontal => targets.y.push(entry),
                    SnapLineOrientation::Vertical => targets.x.push(entry),
                }
            }
        }
        targets
    }
}

#[derive(Debug, Clone, Copy)]
struct SnapCandidate {
    snap: AxisSnap,
}

/// 捕捉引擎
#[derive(Debug, Clone)]
pub struct SnapEngine {
    settings: SnapSettings,
    x_candidates: Vec<SnapCandidate>,
    y_candidates: Vec<SnapCandidate>,
}

impl SnapEngine {
    pub fn new(settings: SnapSettings) -> Self {
        Self {
            settings,
            x_candidates: Vec::with_capacity(32),
            y_candidates: Vec::with_capacity(32),
        }
    }

    pub fn settings(&self) -> &SnapSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut SnapSettings {
        &mut self.settings
    }

    /// 最近的网格坐标（未判断容差）
    fn grid_coordinate(&self, value: f64, offset: f64) -> f64 {
        let resolution = self.settings.grid_resolution;
        ((value - offset) / resolution + 0.5).floor() * resolution + offset
    }

    /// 将点捕捉到网格
    ///
    /// `page_top` 为点所在页面顶边的场景 Y，网格相对页面排布。
    /// 某个方向超出容差时该方向保持不变。
    pub fn snap_point_to_grid(&self, point: Point2, page_top: f64, tolerance: f64) -> Point2 {
        if !self.settings.snap_to_grid || self.settings.grid_resolution <= 0.0 {
            return point;
        }
        let x = self.grid_coordinate(point.x, self.settings.grid_offset_x);
        let y = self.grid_coordinate(point.y - page_top, self.settings.grid_offset_y) + page_top;
        Point2::new(
            if (x - point.x).abs() <= tolerance { x } else { point.x },
            if (y - point.y).abs() <= tolerance { y } else { point.y },
        )
    }

    /// 捕捉移动中的矩形
    ///
    /// 网格候选取矩形左上角，对齐候选比较矩形的三条边/中线。
    pub fn snap_rect(&mut self, rect: Rect, page_top: f64, targets: &AlignTargets, tolerance: f64) -> SnapResult {
        self.x_candidates.clear();
        self.y_candidates.clear();

        if self.settings.snap_to_grid && self.settings.grid_resolution > 0.0 {
            let gx = self.grid_coordinate(rect.left(), self.settings.grid_offset_x);
            let gy = self.grid_coordinate(rect.top() - page_top, self.settings.grid_offset_y) + page_top;
            self.x_candidates.push(SnapCandidate {
                snap: AxisSnap {
                    adjustment: gx - rect.left(),
                    target: gx,
                    source: SnapSource::Grid,
                },
            });
            self.y_candidates.push(SnapCandidate {
                snap: AxisSnap {
                    adjustment: gy - rect.top(),
                    target: gy,
                    source: SnapSource::Grid,
                },
            });
        }

        if self.settings.alignment_snap {
            let xs = [rect.left(), rect.h_center(), rect.right()];
            let ys = [rect.top(), rect.v_center(), rect.bottom()];
            for &(target, source) in &targets.x {
                for anchor in xs {
                    self.x_candidates.push(SnapCandidate {
                        snap: AxisSnap {
                            adjustment: target - anchor,
                            target,
                            source,
                        },
                    });
                }
            }
            for &(target, source) in &targets.y {
                for anchor in ys {
                    self.y_candidates.push(SnapCandidate {
                        snap: AxisSnap {
                            adjustment: target - anchor,
                            target,
                            source,
                        },
                    });
                }
            }
        }

        let x = best_candidate(&self.x_candidates, tolerance);
        let y = best_candidate(&self.y_candidates, tolerance);
        let dx = x.map(|s| s.adjustment).unwrap_or(0.0);
        let dy = y.map(|s| s.adjustment).unwrap_or(0.0);
        SnapResult {
            rect: rect.translated(dx, dy),
            x,
            y,
        }
    }
}

impl Default for SnapEngine {
    fn default() -> Self {
        Self::new(SnapSettings::default())
    }
}

fn best_candidate(candidates: &[SnapCandidate], tolerance: f64) -> Option<AxisSnap> {
    let mut best: Option<AxisSnap> = None;
    for candidate in candidates {
        let adjustment = candidate.snap.adjustment.abs();
        if adjustment > tolerance {
            continue;
        }
        match best {
            Some(b) if b.adjustment.abs() <= adjustment => {}
            _ => best = Some(candidate.snap),
        }
    }
    best
}

/// 查找容差内最近的捕捉线
///
/// 距离相同时取先出现者。同时返回边或中线恰好落在该线上的图元
/// 及其对应的参考点：水平线匹配上/中/下边，垂直线匹配左/中/右边。
pub fn nearest_snap_line<'a, 'b>(
    lines: &'a [SnapLine],
    horizontal: bool,
    point: Point2,
    tolerance: f64,
    items: impl IntoIterator<Item = (ItemId, &'b Item)>,
) -> Option<(&'a SnapLine, Vec<(ItemId, ItemPositionMode)>)> {
    let sqr_tolerance = tolerance * tolerance;
    let mut min_sqr_dist = f64::MAX;
    let mut nearest: Option<&SnapLine> = None;

    for line in lines {
        if line.is_horizontal() != horizontal {
            continue;
        }
        let d = if horizontal {
            point.y - line.position
        } else {
            point.x - line.position
        };
        let sqr_dist = d * d;
        if sqr_dist < min_sqr_dist && sqr_dist < sqr_tolerance {
            nearest = Some(line);
            min_sqr_dist = sqr_dist;
        }
    }

    let line = nearest?;
    let mut snapped = Vec::new();
    for (id, item) in items {
        if item.is_paper() {
            continue;
        }
        let rect = item.rect();
        let near = |v: f64| approx_eq(line.position, v, SNAPPED_ITEM_TOLERANCE);
        let mode = if horizontal {
            if near(rect.top()) {
                Some(ItemPositionMode::UpperMiddle)
            } else if near(rect.v_center()) {
                Some(ItemPositionMode::Middle)
            } else if near(rect.bottom()) {
                Some(ItemPositionMode::LowerMiddle)
            } else {
                None
            }
        } else if near(rect.left()) {
            Some(ItemPositionMode::MiddleLeft)
        } else if near(rect.h_center()) {
            Some(ItemPositionMode::Middle)
        } else if near(rect.right()) {
            Some(ItemPositionMode::MiddleRight)
        } else {
            None
        };
        if let Some(mode) = mode {
            snapped.push((id, mode));
        }
    }
    Some((line, snapped))
}

/// 尺寸变化时保持对齐点不动所需的原点偏移
///
/// 按旋转角所在象限 [0,90) [90,180) [180,270) [270,360) 查表，
/// 各象限中水平/垂直对齐影响的屏幕轴与符号不同。
pub fn item_shift_adjust_size(
    rotation: f64,
    halign: HAlign,
    valign: VAlign,
    current: (f64, f64),
    new: (f64, f64),
) -> Vector2 {
    let (current_width, current_height) = current;
    let (new_width, new_height) = new;
    let rotation = normalize_degrees(rotation);
    let mut x_shift = 0.0;
    let mut y_shift = 0.0;

    if (0.0..90.0).contains(&rotation) {
        match halign {
            HAlign::Center => x_shift = -(new_width - current_width) / 2.0,
            HAlign::Right => x_shift = -(new_width - current_width),
            _ => {}
        }
        match valign {
            VAlign::Center => y_shift = -(new_height - current_height) / 2.0,
            VAlign::Bottom => y_shift = -(new_height - current_height),
            _ => {}
        }
    }
    if (90.0..180.0).contains(&rotation) {
        match halign {
            HAlign::Center => y_shift = -(new_height - current_height) / 2.0,
            HAlign::Right => y_shift = -(new_height - current_height),
            _ => {}
        }
        match valign {
            VAlign::Top => x_shift = -(new_width - current_width),
            VAlign::Center => x_shift = -(new_width - current_width / 2.0),
            _ => {}
        }
    } else if (180.0..270.0).contains(&rotation) {
        match halign {
            HAlign::Center => x_shift = -(new_width - current_width) / 2.0,
            HAlign::Left => x_shift = -(new_width - current_width),
            _ => {}
        }
        match valign {
            VAlign::Center => y_shift = (new_height - current_height) / 2.0,
            VAlign::Top => y_shift = new_height - current_height,
            _ => {}
        }
    } else if (270.0..360.0).contains(&rotation) {
        match halign {
            HAlign::Center => y_shift = -(new_height - current_height) / 2.0,
            HAlign::Left => y_shift = -(new_height - current_height),
            _ => {}
        }
        match valign {
            VAlign::Bottom => x_shift = -(new_width - current_width),
            VAlign::Center => x_shift = -(new_width - current_width / 2.0),
            _ => {}
        }
    }
    Vector2::new(x_shift, y_shift)
}
