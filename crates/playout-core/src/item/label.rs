//! 文本标签
//!
//! 显示文本在绘制前展开：
//! - `$CURRENT_DATE` / `$CURRENT_DATE(格式)`：当前日期
//! - `[% 表达式 %]`：针对当前图集要素求值，`[% $page %]` 为标签所在页码（从 1 开始）

use std::fmt::Write as _;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::data_defined::{value_to_string, ExpressionEvaluator, Feature};
use crate::dom::Element;
use crate::error::XmlError;
use crate::style::{Color, HAlign, VAlign};

/// 1 磅对应的毫米数
pub const MM_PER_POINT: f64 = 0.3527;

/// 字体描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontDescription {
    pub family: String,
    pub point_size: f64,
    /// 字重（50 常规，75 粗体）
    pub weight: u32,
    pub italic: bool,
    pub underline: bool,
    pub strikeout: bool,
}

impl FontDescription {
    pub fn new(family: impl Into<String>, point_size: f64) -> Self {
        Self {
            family: family.into(),
            point_size,
            weight: 50,
            italic: false,
            underline: false,
            strikeout: false,
        }
    }

    pub fn is_bold(&self) -> bool {
        self.weight >= 75
    }

    /// 序列化为 `family,pointSize,-1,5,weight,italic,underline,strikeout,0,0`
    pub fn to_description(&self) -> String {
        format!(
            "{},{},-1,5,{},{},{},{},0,0",
            self.family,
            self.point_size,
            self.weight,
            self.italic as u8,
            self.underline as u8,
            self.strikeout as u8
        )
    }

    /// 从描述字符串解析，至少需要字体族与字号
    pub fn from_description(description: &str) -> Option<Self> {
        let fields: Vec<&str> = description.split(',').map(str::trim).collect();
        if fields.len() < 2 || fields[0].is_empty() {
            return None;
        }
        let point_size: f64 = fields[1].parse().ok().filter(|s: &f64| *s > 0.0)?;
        let flag = |i: usize| fields.get(i).map(|f| *f == "1" || *f == "true").unwrap_or(false);
        Some(Self {
            family: fields[0].to_string(),
            point_size,
            weight: fields.get(4).and_then(|w| w.parse().ok()).unwrap_or(50),
            italic: flag(5),
            underline: flag(6),
            strikeout: flag(7),
        })
    }
}

impl Default for FontDescription {
    fn default() -> Self {
        Self::new("Sans", 10.0)
    }
}

/// 文本度量（外部字体系统）
pub trait TextMetrics {
    /// 单行文本宽度（毫米）
    fn text_width_mm(&self, font: &FontDescription, text: &str) -> f64;
    /// 行高（毫米）
    fn font_height_mm(&self, font: &FontDescription) -> f64;
}

/// 近似度量：平均字宽为字号的一半
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproximateTextMetrics;

impl TextMetrics for ApproximateTextMetrics {
    fn text_width_mm(&self, font: &FontDescription, text: &str) -> f64 {
        let factor = if font.is_bold() { 0.55 } else { 0.5 };
        text.chars().count() as f64 * font.point_size * MM_PER_POINT * factor
    }

    fn font_height_mm(&self, font: &FontDescription) -> f64 {
        font.point_size * MM_PER_POINT * 1.2
    }
}

/// 展开显示文本所需的上下文
pub struct LabelTextContext<'a> {
    /// 标签所在页码（从 1 开始）
    pub page_number: usize,
    pub feature: Option<&'a Feature>,
    pub evaluator: &'a dyn ExpressionEvaluator,
    pub today: NaiveDate,
}

/// 标签内容
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub text: String,
    /// 按 HTML 渲染
    pub html: bool,
    /// 内边距（毫米）
    pub margin: f64,
    pub halign: HAlign,
    pub valign: VAlign,
    pub font: FontDescription,
    pub font_color: Color,
}

impl Default for Label {
    fn default() -> Self {
        Self {
            text: "Layout".to_string(),
            html: false,
            margin: 1.0,
            halign: HAlign::Left,
            valign: VAlign::Top,
            font: FontDescription::default(),
            font_color: Color::BLACK,
        }
    }
}

impl Label {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// 展开日期与表达式后的显示文本
    pub fn display_text(&self, ctx: &LabelTextContext<'_>) -> String {
        let text = replace_date_text(&self.text, ctx.today);
        replace_expression_text(&text, ctx)
    }

    /// 容纳 `text` 所需的尺寸（宽, 高）
    pub fn size_for_text(&self, text: &str, metrics: &dyn TextMetrics, pen_width: f64) -> (f64, f64) {
        let lines: Vec<&str> = text.split('\n').collect();
        let text_width = lines
            .iter()
            .map(|l| metrics.text_width_mm(&self.font, l))
            .fold(0.0, f64::max);
        let text_height = metrics.font_height_mm(&self.font) * lines.len() as f64;
        (
            text_width + 2.0 * self.margin + 2.0 * pen_width + 1.0,
            text_height + 2.0 * self.margin + 2.0 * pen_width,
        )
    }

    pub fn write_payload(&self, element: &mut Element) {
        element.set_attribute("labelText", &self.text);
        element.set_attribute("htmlState", self.html as u8);
        element.set_attribute("margin", self.margin);
        element.set_attribute("halign", self.halign.code());
        element.set_attribute("valign", self.valign.code());
        element.append_child(Element::new("LabelFont").with_attribute("description", self.font.to_description()));
        let color = element.append_child(Element::new("FontColor"));
        color.set_attribute("red", self.font_color.r);
        color.set_attribute("green", self.font_color.g);
        color.set_attribute("blue", self.font_color.b);
    }

    /// 读取标签内容；字体缺失时使用 `default_font`
    pub fn read_payload(element: &Element, default_font: &FontDescription) -> Result<Self, XmlError> {
        let font = element
            .first_child("LabelFont")
            .and_then(|f| f.attribute("description"))
            .and_then(FontDescription::from_description)
            .unwrap_or_else(|| default_font.clone());
        let font_color = element
            .first_child("FontColor")
            .map(|c| Color::rgb(c.attr_or("red", 0), c.attr_or("green", 0), c.attr_or("blue", 0)))
            .unwrap_or(Color::BLACK);

        Ok(Self {
            text: element.attribute("labelText").unwrap_or_default().to_string(),
            html: element.attr_bool("htmlState", false),
            margin: element.attr_or("margin", 0.0),
            halign: element
                .attr("halign")
                .and_then(HAlign::from_code)
                .unwrap_or_default(),
            valign: element
                .attr("valign")
                .and_then(VAlign::from_code)
                .unwrap_or_default(),
            font,
            font_color,
        })
    }
}

/// 替换 `$CURRENT_DATE`
///
/// 紧随其后的 `(格式)` 按 chrono 格式串格式化并只替换这一处；
/// 否则替换全部出现位置为默认格式。
pub fn replace_date_text(text: &str, today: NaiveDate) -> String {
    const CONSTANT: &str = "$CURRENT_DATE";
    let Some(pos) = text.find(CONSTANT) else {
        return text.to_string();
    };
    let after = pos + CONSTANT.len();
    if text[after..].starts_with('(') {
        if let Some(close) = text[after + 1..].find(')') {
            if close > 0 {
                let format = &text[after + 1..after + 1 + close];
                let mut out = String::with_capacity(text.len());
                out.push_str(&text[..pos]);
                let mut formatted = String::new();
                if write!(formatted, "{}", today.format(format)).is_err() {
                    formatted = format.to_string();
                }
                out.push_str(&formatted);
                out.push_str(&text[after + 1 + close + 1..]);
                return out;
            }
        }
    }
    text.replace(CONSTANT, &today.format("%a %b %-d %Y").to_string())
}

/// 替换 `[% ... %]` 表达式块，失败的块保持原文
pub fn replace_expression_text(text: &str, ctx: &LabelTextContext<'_>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("[%") {
        let Some(len) = rest[start + 2..].find("%]") else {
            break;
        };
        let block = &rest[start..start + 2 + len + 2];
        let expression = rest[start + 2..start + 2 + len].trim();
        out.push_str(&rest[..start]);

        if expression == "$page" {
            out.push_str(&ctx.page_number.to_string());
        } else {
            match ctx.evaluator.evaluate(expression, ctx.feature) {
                Ok(value) => out.push_str(&value_to_string(&value).unwrap_or_default()),
                Err(e) => {
                    tracing::debug!("Label expression '{}' failed: {}", expression, e);
                    out.push_str(block);
                }
            }
        }
        rest = &rest[start + block.len()..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_defined::BasicEvaluator;

    fn ctx<'a>(feature: Option<&'a Feature>) -> LabelTextContext<'a> {
        LabelTextContext {
            page_number: 2,
            feature,
            evaluator: &BasicEvaluator,
            today: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
        }
    }

    #[test]
    fn test_font_description_round_trip() {
        let mut font = FontDescription::new("DejaVu Serif", 12.5);
        font.weight = 75;
        font.italic = true;
        let s = font.to_description();
        assert_eq!(s, "DejaVu Serif,12.5,-1,5,75,1,0,0,0,0");
        assert_eq!(FontDescription::from_description(&s), Some(font));
        assert_eq!(FontDescription::from_description("Sans"), None);
        assert_eq!(FontDescription::from_description("Sans,10").unwrap().weight, 50);
    }

    #[test]
    fn test_date_replacement() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(replace_date_text("on $CURRENT_DATE(%Y-%m-%d)!", today), "on 2024-03-05!");
        assert_eq!(replace_date_text("$CURRENT_DATE", today), "Tue Mar 5 2024");
        assert_eq!(replace_date_text("$CURRENT_DATE()", today), "Tue Mar 5 2024()");
        assert_eq!(replace_date_text("plain", today), "plain");
        assert_eq!(replace_date_text("$CURRENT_DATE(%Q)", today), "%Q");
    }

    #[test]
    fn test_expression_replacement() {
        let feature = Feature::new(1).with_attribute("name", "Lyon");
        let c = ctx(Some(&feature));
        assert_eq!(
            replace_expression_text("City: [% \"name\" %], page [%$page%]", &c),
            "City: Lyon, page 2"
        );
        assert_eq!(replace_expression_text("bad [% 1 + %] end", &c), "bad [% 1 + %] end");
        assert_eq!(replace_expression_text("open [% never", &c), "open [% never");
    }

    #[test]
    fn test_display_text_without_feature_keeps_field_block() {
        let label = Label::new("[% \"name\" %] $CURRENT_DATE(%d)");
        assert_eq!(label.display_text(&ctx(None)), "[% \"name\" %] 05");
    }

    #[test]
    fn test_payload_round_trip() {
        let label = Label {
            text: "Title & <sub>".to_string(),
            html: true,
            margin: 2.5,
            halign: HAlign::Center,
            valign: VAlign::Bottom,
            font: FontDescription::new("Serif", 14.0),
            font_color: Color::rgb(200, 10, 30),
        };
        let mut e = Element::new("Label");
        label.write_payload(&mut e);
        let parsed = Element::parse(&e.to_xml_string()).unwrap();
        let read = Label::read_payload(&parsed, &FontDescription::default()).unwrap();
        assert_eq!(read, label);
    }

    #[test]
    fn test_size_for_text() {
        let label = Label {
            margin: 1.0,
            ..Label::new("ab")
        };
        let metrics = ApproximateTextMetrics;
        let (w, h) = label.size_for_text("ab", &metrics, 0.5);
        let char_w = 10.0 * MM_PER_POINT * 0.5;
        assert!((w - (2.0 * char_w + 2.0 + 1.0 + 1.0)).abs() < 1e-9);
        assert!((h - (10.0 * MM_PER_POINT * 1.2 + 2.0 + 1.0)).abs() < 1e-9);
    }
}
