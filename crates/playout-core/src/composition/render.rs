//! 页面输出
//!
//! 场景只驱动绘制顺序与变换，像素与文档格式由 [`PagedDevice`] /
//! [`RasterSurface`] 的实现负责。

use std::path::Path;

use super::{Composition, PlotStyle};
use crate::content::{wait_for_content, RichContent};
use crate::error::RenderError;
use crate::item::{Item, ItemId, ItemKind};
use crate::paint::{ItemPaintContext, Painter};

/// 世界文件的六个仿射系数，顺序 a, b, c, d, e, f：
///
/// ```text
/// X = a * 列 + b * 行 + c
/// Y = d * 列 + e * 行 + f
/// ```
pub type WorldFileParameters = [f64; 6];

/// 分页输出设备
pub trait PagedDevice {
    /// 开始新页面，尺寸为毫米
    fn begin_page(&mut self, width_mm: f64, height_mm: f64, dpi: u32) -> Result<(), RenderError>;
    /// 当前页面的画笔，坐标单位毫米
    fn painter(&mut self) -> &mut dyn Painter;
    fn end_page(&mut self) -> Result<(), RenderError>;
    fn finish(&mut self) -> Result<(), RenderError>;
}

/// 可写成文件的分页设备（PDF）
pub trait DocumentDevice: PagedDevice {
    fn write_to(&mut self, path: &Path) -> Result<(), RenderError>;
}

/// 可按像素尺寸分配的栅格画布
pub trait RasterSurface: Painter + Sized {
    /// 分配失败时返回 None
    fn allocate(width: u32, height: u32) -> Option<Self>;
}

impl Composition {
    /// 绘制单页：先纸张，再按 Z 序绘制与该页相交的图元
    ///
    /// 画笔坐标为页面局部毫米坐标。绘制期间输出风格临时切换为 Print。
    pub fn render_page(&mut self, painter: &mut dyn Painter, page: usize) -> Result<(), RenderError> {
        if page >= self.num_pages() {
            return Err(RenderError::InvalidPage {
                page,
                num_pages: self.num_pages(),
            });
        }
        let saved_style = self.plot_style;
        self.plot_style = PlotStyle::Print;

        let page_rect = self.layout.page_rect(page);
        painter.save();
        painter.translate(0.0, -page_rect.y);

        let mut order: Vec<ItemId> = self.pages.get(page).copied().into_iter().collect();
        order.extend(self.z_order.iter().filter(|id| {
            self.items
                .get(id)
                .map(|item| item.bounding_rect().intersects(&page_rect))
                .unwrap_or(false)
        }));
        for id in order {
            self.paint_item(painter, id);
        }

        painter.restore();
        self.plot_style = saved_style;
        Ok(())
    }

    fn paint_item(&self, painter: &mut dyn Painter, id: ItemId) {
        let Some(item) = self.items.get(&id) else {
            return;
        };
        let display_text = self.label_display_text(id);
        let rich_content = self.rich_content(id, item, display_text.as_deref());
        let ctx = ItemPaintContext {
            display_text: display_text.as_deref(),
            rich_content: rich_content.as_ref(),
        };

        let rect = item.rect();
        let (half_w, half_h) = (rect.width / 2.0, rect.height / 2.0);
        painter.save();
        painter.translate(rect.x + half_w, rect.y + half_h);
        painter.rotate(item.evaluated_rotation());
        painter.translate(-half_w, -half_h);
        item.paint(painter, &ctx);
        painter.restore();
    }

    /// HTML 标签与多帧的内容，等待外部加载器直到超时
    fn rich_content(&self, id: ItemId, item: &Item, display_text: Option<&str>) -> Option<RichContent> {
        let html = match &item.kind {
            ItemKind::Label(label) if label.html => display_text.unwrap_or(&label.text).to_string(),
            ItemKind::Frame(frame) => self.multi_frames.get(&frame.multi_frame)?.html.clone(),
            _ => return None,
        };
        let rect = item.rect();
        let mut job = self.content_loader.load(&html, (rect.width, rect.height));
        let outcome = wait_for_content(job.as_mut(), self.config.content_timeout());
        if outcome.timed_out() {
            tracing::warn!("Content of {} not loaded within {:?}, painting partial content", id, self.config.content_timeout());
        }
        Some(outcome.into_content())
    }

    /// 依次输出所有页面
    pub fn print<D: PagedDevice + ?Sized>(&mut self, device: &mut D) -> Result<(), RenderError> {
        let (width, height) = (self.paper_width(), self.paper_height());
        for page in 0..self.num_pages() {
            device.begin_page(width, height, self.print_resolution)?;
            self.render_page(device.painter(), page)?;
            device.end_page()?;
        }
        device.finish()
    }

    /// 输出所有页面并写成文档
    pub fn export_as_pdf<D: DocumentDevice + ?Sized>(&mut self, path: &Path, device: &mut D) -> Result<(), RenderError> {
        self.print(device)?;
        device.write_to(path)?;
        tracing::info!("Exported {} pages to {}", self.num_pages(), path.display());
        Ok(())
    }

    /// 按打印分辨率把单页绘制到新栅格画布
    ///
    /// 页码越界、尺寸为零、超出字节上限或分配失败时返回 None。
    pub fn print_page_as_raster<S: RasterSurface>(&mut self, page: usize) -> Option<S> {
        if page >= self.num_pages() {
            return None;
        }
        let dpi = self.print_resolution as f64;
        let width = (dpi * self.paper_width() / 25.4) as u32;
        let height = (dpi * self.paper_height() / 25.4) as u32;
        if width == 0 || height == 0 {
            return None;
        }
        let bytes = width as u64 * height as u64 * 4;
        if bytes > self.config.max_raster_bytes {
            tracing::warn!(
                "Raster of {}x{} px ({} bytes) exceeds limit of {} bytes",
                width,
                height,
                bytes,
                self.config.max_raster_bytes
            );
            return None;
        }
        let Some(mut surface) = S::allocate(width, height) else {
            tracing::warn!("Could not allocate {}x{} px raster", width, height);
            return None;
        };
        let scale = dpi / 25.4;
        surface.scale(scale, scale);
        self.render_page(&mut surface, page).ok()?;
        Some(surface)
    }

    /// 世界文件参数，需要指定世界文件参考地图
    ///
    /// 参考地图所在页面的像素坐标映射到地图坐标，并计入地图旋转。
    pub fn compute_world_file_parameters(&self) -> Option<WorldFileParameters> {
        let id = self.world_file_map?;
        let item = self.items.get(&id)?;
        let map = item.as_map()?;

        let page = self.layout.page_number_for_point(item.rect().top_left());
        let page_y = self.layout.page_top(page);
        let map_rect = item.rect().translated(0.0, -page_y);
        if map_rect.width <= 0.0 || map_rect.height <= 0.0 {
            return None;
        }
        let extent = map.extent;
        let alpha = map.map_rotation.to_radians();

        let x_ratio = extent.width() / map_rect.width;
        let y_ratio = extent.height() / map_rect.height;
        let center = extent.center();

        let (paper_w, paper_h) = (self.paper_width(), self.paper_height());
        let xmin = extent.xmin - map_rect.x * x_ratio;
        let ymax = extent.ymax + map_rect.y * y_ratio;
        let paper_xmin = xmin;
        let paper_ymin = ymax - paper_h * y_ratio;
        let paper_width = paper_w * x_ratio;
        let paper_height = paper_h * y_ratio;

        let dpi = self.print_resolution as f64;
        let width_px = (dpi * paper_w / 25.4) as i64;
        let height_px = (dpi * paper_h / 25.4) as i64;
        if width_px <= 0 || height_px <= 0 {
            return None;
        }
        let pixel_w = paper_width / width_px as f64;
        let pixel_h = paper_height / height_px as f64;

        let s = [pixel_w, 0.0, paper_xmin, 0.0, -pixel_h, paper_ymin + paper_height];
        let (sin, cos) = alpha.sin_cos();
        let r = [
            cos,
            -sin,
            center.x * (1.0 - cos) + center.y * sin,
            sin,
            cos,
            -center.x * sin + center.y * (1.0 - cos),
        ];

        Some([
            r[0] * s[0] + r[1] * s[3],
            r[0] * s[1] + r[1] * s[4],
            r[0] * s[2] + r[1] * s[5] + r[2],
            r[3] * s[0] + r[4] * s[3],
            r[3] * s[1] + r[4] * s[4],
            r[3] * s[2] + r[4] * s[5] + r[5],
        ])
    }
}
