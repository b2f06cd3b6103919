//! 基础数学类型
//!
//! 场景坐标以毫米为单位，原点位于第一页左上角，Y 轴向下。

use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

/// 二维点
pub type Point2 = nalgebra::Point2<f64>;

/// 二维向量
pub type Vector2 = nalgebra::Vector2<f64>;

/// 浮点比较容差
pub const EPSILON: f64 = 1e-9;

/// 近似相等判断
pub fn approx_eq(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance
}

/// 将角度归一化到 [0, 360)
pub fn normalize_degrees(angle: f64) -> f64 {
    let a = angle % 360.0;
    if a < 0.0 {
        a + 360.0
    } else {
        a
    }
}

/// 轴对齐矩形（左上角 + 宽高）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// 由两个角点构造（自动归一化）
    pub fn from_points(a: Point2, b: Point2) -> Self {
        let x = a.x.min(b.x);
        let y = a.y.min(b.y);
        Self::new(x, y, (a.x - b.x).abs(), (a.y - b.y).abs())
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn h_center(&self) -> f64 {
        self.x + self.width / 2.0
    }

    pub fn v_center(&self) -> f64 {
        self.y + self.height / 2.0
    }

    pub fn top_left(&self) -> Point2 {
        Point2::new(self.x, self.y)
    }

    pub fn center(&self) -> Point2 {
        Point2::new(self.h_center(), self.v_center())
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// 点是否在矩形内（含边界）
    pub fn contains(&self, point: &Point2) -> bool {
        point.x >= self.left()
            && point.x <= self.right()
            && point.y >= self.top()
            && point.y <= self.bottom()
    }

    /// 两矩形是否有面积重叠
    pub fn intersects(&self, other: &Rect) -> bool {
        self.left() < other.right()
            && other.left() < self.right()
            && self.top() < other.bottom()
            && other.top() < self.bottom()
    }

    /// 并集包围盒
    pub fn united(&self, other: &Rect) -> Rect {
        let left = self.left().min(other.left());
        let top = self.top().min(other.top());
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(left, top, right - left, bottom - top)
    }

    pub fn translated(&self, dx: f64, dy: f64) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// 四个角点：左上、右上、右下、左下
    pub fn corners(&self) -> [Point2; 4] {
        [
            Point2::new(self.left(), self.top()),
            Point2::new(self.right(), self.top()),
            Point2::new(self.right(), self.bottom()),
            Point2::new(self.left(), self.bottom()),
        ]
    }

    /// 绕中心旋转后的包围盒
    pub fn rotated_bounds(&self, degrees: f64) -> Rect {
        if normalize_degrees(degrees).abs() < EPSILON {
            return *self;
        }
        let c = self.center();
        let transform = Transform2D::identity()
            .translate(c.x, c.y)
            .rotate(degrees)
            .translate(-c.x, -c.y);
        let pts = self.corners().map(|p| transform.apply(p));
        let mut min = pts[0];
        let mut max = pts[0];
        for p in &pts[1..] {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        Rect::from_points(min, max)
    }
}

/// 二维仿射变换（齐次 3x3 矩阵）
///
/// 与画笔语义一致：`translate`/`rotate`/`scale` 作用于局部坐标，
/// 即新矩阵 = 旧矩阵 × 局部变换。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform2D {
    matrix: Matrix3<f64>,
}

impl Transform2D {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
        }
    }

    pub fn from_matrix(matrix: Matrix3<f64>) -> Self {
        Self { matrix }
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        let t = Matrix3::new(1.0, 0.0, dx, 0.0, 1.0, dy, 0.0, 0.0, 1.0);
        Self {
            matrix: self.matrix * t,
        }
    }

    /// 顺时针旋转（Y 轴向下时的视觉方向），单位：度
    pub fn rotate(&self, degrees: f64) -> Self {
        let (s, c) = degrees.to_radians().sin_cos();
        let r = Matrix3::new(c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0);
        Self {
            matrix: self.matrix * r,
        }
    }

    pub fn scale(&self, sx: f64, sy: f64) -> Self {
        let m = Matrix3::new(sx, 0.0, 0.0, 0.0, sy, 0.0, 0.0, 0.0, 1.0);
        Self {
            matrix: self.matrix * m,
        }
    }

    pub fn apply(&self, point: Point2) -> Point2 {
        let v = self.matrix * nalgebra::Vector3::new(point.x, point.y, 1.0);
        Point2::new(v.x, v.y)
    }

    /// 逆变换（奇异矩阵返回 None）
    pub fn inverse(&self) -> Option<Self> {
        self.matrix.try_inverse().map(|matrix| Self { matrix })
    }

    /// 平均缩放系数，用于线宽换算
    pub fn scale_factor(&self) -> f64 {
        let det = self.matrix[(0, 0)] * self.matrix[(1, 1)] - self.matrix[(0, 1)] * self.matrix[(1, 0)];
        det.abs().sqrt()
    }
}

impl Default for Transform2D {
    fn default() -> Self {
        Self::identity()
    }
}

/// 将 `position` 从区间 [before_min, before_max] 线性映射到 [after_min, after_max]
pub fn relative_position(
    position: f64,
    before_min: f64,
    before_max: f64,
    after_min: f64,
    after_max: f64,
) -> f64 {
    let range = before_max - before_min;
    if range.abs() < EPSILON {
        return after_min;
    }
    let m = (after_max - after_min) / range;
    let c = after_min - before_min * m;
    m * position + c
}

/// 按 `before` → `after` 的缩放关系调整矩形
pub fn relative_resize_rect(rect: &mut Rect, before: &Rect, after: &Rect) {
    let left = relative_position(rect.left(), before.left(), before.right(), after.left(), after.right());
    let right = relative_position(rect.right(), before.left(), before.right(), after.left(), after.right());
    let top = relative_position(rect.top(), before.top(), before.bottom(), after.top(), after.bottom());
    let bottom = relative_position(rect.bottom(), before.top(), before.bottom(), after.top(), after.bottom());
    *rect = Rect::new(left, top, right - left, bottom - top);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_degrees() {
        assert!((normalize_degrees(370.0) - 10.0).abs() < EPSILON);
        assert!((normalize_degrees(-90.0) - 270.0).abs() < EPSILON);
        assert!(normalize_degrees(360.0).abs() < EPSILON);
    }

    #[test]
    fn test_rect_edges() {
        let r = Rect::new(10.0, 20.0, 30.0, 40.0);
        assert_eq!(r.right(), 40.0);
        assert_eq!(r.bottom(), 60.0);
        assert_eq!(r.h_center(), 25.0);
        assert_eq!(r.v_center(), 40.0);
        assert!(r.contains(&Point2::new(40.0, 60.0)));
        assert!(!r.contains(&Point2::new(40.1, 60.0)));
    }

    #[test]
    fn test_rect_intersects_touching_edges() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(10.0, 0.0, 10.0, 10.0);
        assert!(!a.intersects(&b));
        assert!(a.intersects(&Rect::new(9.0, 9.0, 5.0, 5.0)));
    }

    #[test]
    fn test_rotated_bounds_quarter_turn() {
        let r = Rect::new(0.0, 0.0, 20.0, 10.0);
        let b = r.rotated_bounds(90.0);
        assert!((b.width - 10.0).abs() < 1e-9);
        assert!((b.height - 20.0).abs() < 1e-9);
        assert!((b.h_center() - 10.0).abs() < 1e-9);
        assert!((b.v_center() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_transform_inverse() {
        let t = Transform2D::identity().translate(5.0, 7.0).rotate(30.0).scale(2.0, 2.0);
        let p = Point2::new(3.0, -4.0);
        let back = t.inverse().unwrap().apply(t.apply(p));
        assert!((back.x - p.x).abs() < 1e-9);
        assert!((back.y - p.y).abs() < 1e-9);
        assert!((t.scale_factor() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_relative_resize_rect() {
        let mut r = Rect::new(10.0, 10.0, 10.0, 10.0);
        let before = Rect::new(0.0, 0.0, 100.0, 100.0);
        let after = Rect::new(0.0, 0.0, 200.0, 50.0);
        relative_resize_rect(&mut r, &before, &after);
        assert!((r.x - 20.0).abs() < EPSILON);
        assert!((r.width - 20.0).abs() < EPSILON);
        assert!((r.y - 5.0).abs() < EPSILON);
        assert!((r.height - 5.0).abs() < EPSILON);
    }
}
