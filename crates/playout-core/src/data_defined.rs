//! 数据驱动属性
//!
//! 属性值可以来自：
//! - 字面量（数字或单引号字符串），不经过表达式求值器
//! - 当前要素的字段
//! - 外部表达式求值器编译出的表达式
//!
//! 编译结果按 (所属对象, 属性) 缓存，求值结果不缓存：每次刷新都重新求值，
//! 因为图集迭代会改变当前要素。

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::dom::Element;
use crate::error::ExpressionError;
use crate::item::ItemId;

/// 属性值（与要素属性共用 JSON 值模型）
pub type Value = serde_json::Value;

/// 要素：图集覆盖层中的一条记录
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: i64,
    #[serde(default)]
    pub attributes: serde_json::Map<String, Value>,
}

impl Feature {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            attributes: serde_json::Map::new(),
        }
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}

/// 可数据驱动的属性种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DataDefinedProperty {
    /// 刷新时表示“全部属性”
    All,
    PresetPaperSize,
    PaperWidth,
    PaperHeight,
    NumPages,
    PaperOrientation,
    PositionX,
    PositionY,
    ItemWidth,
    ItemHeight,
    ItemRotation,
    Transparency,
    BlendMode,
}

impl DataDefinedProperty {
    pub const COMPOSITION: [DataDefinedProperty; 5] = [
        DataDefinedProperty::PresetPaperSize,
        DataDefinedProperty::PaperWidth,
        DataDefinedProperty::PaperHeight,
        DataDefinedProperty::NumPages,
        DataDefinedProperty::PaperOrientation,
    ];

    pub const ITEM: [DataDefinedProperty; 7] = [
        DataDefinedProperty::PositionX,
        DataDefinedProperty::PositionY,
        DataDefinedProperty::ItemWidth,
        DataDefinedProperty::ItemHeight,
        DataDefinedProperty::ItemRotation,
        DataDefinedProperty::Transparency,
        DataDefinedProperty::BlendMode,
    ];

    /// 文档片段中的元素名
    pub fn xml_name(&self) -> &'static str {
        match self {
            DataDefinedProperty::All => "dataDefinedAll",
            DataDefinedProperty::PresetPaperSize => "dataDefinedPaperSize",
            DataDefinedProperty::PaperWidth => "dataDefinedPaperWidth",
            DataDefinedProperty::PaperHeight => "dataDefinedPaperHeight",
            DataDefinedProperty::NumPages => "dataDefinedNumPages",
            DataDefinedProperty::PaperOrientation => "dataDefinedPaperOrientation",
            DataDefinedProperty::PositionX => "dataDefinedPositionX",
            DataDefinedProperty::PositionY => "dataDefinedPositionY",
            DataDefinedProperty::ItemWidth => "dataDefinedWidth",
            DataDefinedProperty::ItemHeight => "dataDefinedHeight",
            DataDefinedProperty::ItemRotation => "dataDefinedRotation",
            DataDefinedProperty::Transparency => "dataDefinedTransparency",
            DataDefinedProperty::BlendMode => "dataDefinedBlendMode",
        }
    }

    pub fn from_xml_name(name: &str) -> Option<Self> {
        Self::COMPOSITION
            .iter()
            .chain(Self::ITEM.iter())
            .copied()
            .find(|p| p.xml_name() == name)
    }

    /// `self` 是否在一次以 `requested` 为目标的刷新范围内
    pub fn matches(&self, requested: DataDefinedProperty) -> bool {
        requested == DataDefinedProperty::All || requested == *self
    }
}

/// 单个属性的数据驱动设置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataDefined {
    pub active: bool,
    pub use_expression: bool,
    pub expression: String,
    pub field: String,
}

impl DataDefined {
    /// 启用的表达式来源
    pub fn from_expression(expression: impl Into<String>) -> Self {
        Self {
            active: true,
            use_expression: true,
            expression: expression.into(),
            field: String::new(),
        }
    }

    /// 启用的字段来源
    pub fn from_field(field: impl Into<String>) -> Self {
        Self {
            active: true,
            use_expression: false,
            expression: String::new(),
            field: field.into(),
        }
    }

    /// 表达式是否为字面量
    pub fn is_literal(&self) -> bool {
        self.use_expression && literal_value(&self.expression).is_some()
    }

    fn is_default(&self) -> bool {
        *self == DataDefined::default()
    }
}

/// 属性 → 数据驱动设置
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataDefinedMap {
    entries: BTreeMap<DataDefinedProperty, DataDefined>,
}

impl DataDefinedMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, property: DataDefinedProperty) -> Option<&DataDefined> {
        self.entries.get(&property)
    }

    pub fn set(&mut self, property: DataDefinedProperty, value: DataDefined) {
        if property == DataDefinedProperty::All {
            return;
        }
        self.entries.insert(property, value);
    }

    pub fn remove(&mut self, property: DataDefinedProperty) -> Option<DataDefined> {
        self.entries.remove(&property)
    }

    pub fn is_active(&self, property: DataDefinedProperty) -> bool {
        self.get(property).map(|d| d.active).unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (DataDefinedProperty, &DataDefined)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 写入 `<dataDefinedProperties>` 子元素（空映射不写）
    pub fn write_xml(&self, parent: &mut Element) {
        let entries: Vec<_> = self.iter().filter(|(_, d)| !d.is_default()).collect();
        if entries.is_empty() {
            return;
        }
        let container = parent.append_child(Element::new("dataDefinedProperties"));
        for (property, dd) in entries {
            container.append_child(
                Element::new(property.xml_name())
                    .with_attribute("active", dd.active)
                    .with_attribute("useExpr", dd.use_expression)
                    .with_attribute("expr", &dd.expression)
                    .with_attribute("field", &dd.field),
            );
        }
    }

    /// 读取 `<dataDefinedProperties>`，未知条目忽略
    pub fn read_xml(parent: &Element) -> Self {
        let mut map = Self::new();
        let Some(container) = parent.first_child("dataDefinedProperties") else {
            return map;
        };
        for child in container.children() {
            match DataDefinedProperty::from_xml_name(child.name()) {
                Some(property) => map.set(
                    property,
                    DataDefined {
                        active: child.attr_bool("active", false),
                        use_expression: child.attr_bool("useExpr", false),
                        expression: child.attribute("expr").unwrap_or_default().to_string(),
                        field: child.attribute("field").unwrap_or_default().to_string(),
                    },
                ),
                None => tracing::debug!("Ignoring unknown data defined property <{}>", child.name()),
            }
        }
        map
    }
}

/// 编译后的表达式
pub trait CompiledExpression {
    fn evaluate(&self, feature: Option<&Feature>) -> Result<Value, ExpressionError>;
}

/// 外部表达式求值器
pub trait ExpressionEvaluator {
    fn compile(&self, expression: &str) -> Result<Box<dyn CompiledExpression>, ExpressionError>;

    /// 一次性编译并求值
    fn evaluate(&self, expression: &str, feature: Option<&Feature>) -> Result<Value, ExpressionError> {
        self.compile(expression)?.evaluate(feature)
    }
}

/// 基础求值器
///
/// 支持数字、单引号字符串、`NULL`、字段引用（`"name"` 或裸标识符）
/// 以及 `||` 字符串拼接。
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicEvaluator;

#[derive(Debug, Clone, PartialEq)]
enum BasicExpr {
    Literal(Value),
    Field(String),
    Concat(Vec<BasicExpr>),
}

impl CompiledExpression for BasicExpr {
    fn evaluate(&self, feature: Option<&Feature>) -> Result<Value, ExpressionError> {
        match self {
            BasicExpr::Literal(value) => Ok(value.clone()),
            BasicExpr::Field(name) => {
                let feature =
                    feature.ok_or_else(|| ExpressionError::Eval(format!("no feature for field '{}'", name)))?;
                feature
                    .attribute(name)
                    .cloned()
                    .ok_or_else(|| ExpressionError::Eval(format!("field '{}' not found", name)))
            }
            BasicExpr::Concat(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part.evaluate(feature)? {
                        Value::Null => return Ok(Value::Null),
                        value => out.push_str(&value_to_string(&value).unwrap_or_default()),
                    }
                }
                Ok(Value::String(out))
            }
        }
    }
}

impl ExpressionEvaluator for BasicEvaluator {
    fn compile(&self, expression: &str) -> Result<Box<dyn CompiledExpression>, ExpressionError> {
        let parts = split_concat(expression);
        let mut terms = Vec::with_capacity(parts.len());
        for part in parts {
            terms.push(parse_term(expression, part)?);
        }
        let compiled = if terms.len() == 1 {
            terms.remove(0)
        } else {
            BasicExpr::Concat(terms)
        };
        Ok(Box::new(compiled))
    }
}

fn split_concat(expression: &str) -> Vec<&str> {
    let bytes = expression.as_bytes();
    let mut parts = Vec::new();
    let mut quote: Option<u8> = None;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == b'\'' || c == b'"' => quote = Some(c),
            None if c == b'|' && bytes.get(i + 1) == Some(&b'|') => {
                parts.push(&expression[start..i]);
                i += 2;
                start = i;
                continue;
            }
            None => {}
        }
        i += 1;
    }
    parts.push(&expression[start..]);
    parts
}

fn parse_term(expression: &str, term: &str) -> Result<BasicExpr, ExpressionError> {
    let t = term.trim();
    if let Some(value) = literal_value(t) {
        return Ok(BasicExpr::Literal(value));
    }
    if t.eq_ignore_ascii_case("null") {
        return Ok(BasicExpr::Literal(Value::Null));
    }
    if t.len() >= 2 && t.starts_with('"') && t.ends_with('"') && !t[1..t.len() - 1].contains('"') {
        return Ok(BasicExpr::Field(t[1..t.len() - 1].to_string()));
    }
    let is_identifier = t
        .chars()
        .next()
        .map(|c| c.is_alphabetic() || c == '_')
        .unwrap_or(false)
        && t.chars().all(|c| c.is_alphanumeric() || c == '_');
    if is_identifier {
        return Ok(BasicExpr::Field(t.to_string()));
    }
    Err(ExpressionError::Parse {
        expression: expression.to_string(),
        message: format!("unsupported term '{}'", t),
    })
}

/// 字面量表达式的值：数字或单引号字符串
pub fn literal_value(expression: &str) -> Option<Value> {
    let t = expression.trim();
    if t.is_empty() {
        return None;
    }
    if let Ok(i) = t.parse::<i64>() {
        return Some(Value::from(i));
    }
    if let Ok(f) = t.parse::<f64>() {
        return serde_json::Number::from_f64(f).map(Value::Number);
    }
    if t.len() >= 2 && t.starts_with('\'') && t.ends_with('\'') {
        let inner = &t[1..t.len() - 1];
        if !inner.replace("''", "").contains('\'') {
            return Some(Value::String(inner.replace("''", "'")));
        }
    }
    None
}

/// 数值转换：数字或可解析的字符串
pub fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// 字符串转换，NULL 返回 None
pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(match n.as_i64() {
            Some(i) => i.to_string(),
            None => n.to_string(),
        }),
        other => Some(other.to_string()),
    }
}

/// 数据驱动设置的所属对象
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataDefinedOwner {
    Composition,
    Item(ItemId),
}

struct CachedExpression {
    source: String,
    compiled: Box<dyn CompiledExpression>,
}

/// 数据驱动属性求值器
#[derive(Default)]
pub struct DataDefinedResolver {
    cache: HashMap<(DataDefinedOwner, DataDefinedProperty), CachedExpression>,
}

impl DataDefinedResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// 对单个属性求值
    ///
    /// 返回 None 表示调用方应使用静态值：属性未启用、无字段绑定、
    /// 无当前要素、或求值失败。
    pub fn evaluate(
        &mut self,
        owner: DataDefinedOwner,
        property: DataDefinedProperty,
        data_defined: Option<&DataDefined>,
        feature: Option<&Feature>,
        evaluator: &dyn ExpressionEvaluator,
    ) -> Option<Value> {
        let dd = data_defined.filter(|d| d.active)?;

        if !dd.use_expression {
            if dd.field.is_empty() {
                return None;
            }
            return feature
                .and_then(|f| f.attribute(&dd.field))
                .filter(|v| !v.is_null())
                .cloned();
        }

        if let Some(value) = literal_value(&dd.expression) {
            return Some(value);
        }

        let key = (owner, property);
        let stale = self
            .cache
            .get(&key)
            .map(|c| c.source != dd.expression)
            .unwrap_or(true);
        if stale {
            match evaluator.compile(&dd.expression) {
                Ok(compiled) => {
                    self.cache.insert(
                        key,
                        CachedExpression {
                            source: dd.expression.clone(),
                            compiled,
                        },
                    );
                }
                Err(e) => {
                    tracing::debug!("Data defined {:?} not compiled: {}", property, e);
                    self.cache.remove(&key);
                    return None;
                }
            }
        }

        let cached = self.cache.get(&key)?;
        match cached.compiled.evaluate(feature) {
            Ok(Value::Null) => None,
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!("Data defined {:?} evaluation failed: {}", property, e);
                None
            }
        }
    }

    pub fn evaluate_f64(
        &mut self,
        owner: DataDefinedOwner,
        property: DataDefinedProperty,
        data_defined: Option<&DataDefined>,
        feature: Option<&Feature>,
        evaluator: &dyn ExpressionEvaluator,
    ) -> Option<f64> {
        self.evaluate(owner, property, data_defined, feature, evaluator)
            .as_ref()
            .and_then(value_to_f64)
    }

    pub fn evaluate_string(
        &mut self,
        owner: DataDefinedOwner,
        property: DataDefinedProperty,
        data_defined: Option<&DataDefined>,
        feature: Option<&Feature>,
        evaluator: &dyn ExpressionEvaluator,
    ) -> Option<String> {
        self.evaluate(owner, property, data_defined, feature, evaluator)
            .as_ref()
            .and_then(value_to_string)
    }

    /// 丢弃某个对象的全部编译缓存
    pub fn invalidate(&mut self, owner: DataDefinedOwner) {
        self.cache.retain(|(o, _), _| *o != owner);
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn compiled_count(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct CountingEvaluator {
        compiles: Cell<usize>,
    }

    impl ExpressionEvaluator for CountingEvaluator {
        fn compile(&self, expression: &str) -> Result<Box<dyn CompiledExpression>, ExpressionError> {
            self.compiles.set(self.compiles.get() + 1);
            BasicEvaluator.compile(expression)
        }
    }

    #[test]
    fn test_literal_detection() {
        assert_eq!(literal_value("42"), Some(Value::from(42)));
        assert_eq!(literal_value(" 2.5 "), Some(Value::from(2.5)));
        assert_eq!(literal_value("'it''s'"), Some(Value::from("it's")));
        assert_eq!(literal_value("\"field\""), None);
        assert_eq!(literal_value("'a' || 'b'"), None);
        assert!(DataDefined::from_expression("'A4'").is_literal());
    }

    #[test]
    fn test_inactive_returns_none() {
        let mut resolver = DataDefinedResolver::new();
        let mut dd = DataDefined::from_expression("10");
        dd.active = false;
        let v = resolver.evaluate(
            DataDefinedOwner::Composition,
            DataDefinedProperty::PaperWidth,
            Some(&dd),
            None,
            &BasicEvaluator,
        );
        assert_eq!(v, None);
    }

    #[test]
    fn test_field_without_feature_falls_back() {
        let mut resolver = DataDefinedResolver::new();
        let dd = DataDefined::from_field("width");
        let owner = DataDefinedOwner::Composition;
        let p = DataDefinedProperty::PaperWidth;
        assert_eq!(resolver.evaluate_f64(owner, p, Some(&dd), None, &BasicEvaluator), None);

        let feature = Feature::new(1).with_attribute("width", 420);
        assert_eq!(
            resolver.evaluate_f64(owner, p, Some(&dd), Some(&feature), &BasicEvaluator),
            Some(420.0)
        );
    }

    #[test]
    fn test_compiled_expression_is_cached_per_property() {
        let evaluator = CountingEvaluator { compiles: Cell::new(0) };
        let mut resolver = DataDefinedResolver::new();
        let dd = DataDefined::from_expression("\"rot\"");
        let owner = DataDefinedOwner::Item(ItemId(3));
        let a = Feature::new(1).with_attribute("rot", 15);
        let b = Feature::new(2).with_attribute("rot", 30);

        let first = resolver.evaluate_f64(owner, DataDefinedProperty::ItemRotation, Some(&dd), Some(&a), &evaluator);
        let second = resolver.evaluate_f64(owner, DataDefinedProperty::ItemRotation, Some(&dd), Some(&b), &evaluator);
        assert_eq!(first, Some(15.0));
        assert_eq!(second, Some(30.0));
        assert_eq!(evaluator.compiles.get(), 1);

        let changed = DataDefined::from_expression("\"other\"");
        let c = Feature::new(3).with_attribute("other", 7);
        assert_eq!(
            resolver.evaluate_f64(owner, DataDefinedProperty::ItemRotation, Some(&changed), Some(&c), &evaluator),
            Some(7.0)
        );
        assert_eq!(evaluator.compiles.get(), 2);

        resolver.invalidate(owner);
        assert_eq!(resolver.compiled_count(), 0);
    }

    #[test]
    fn test_basic_evaluator_concat() {
        let feature = Feature::new(1).with_attribute("name", "Paris").with_attribute("code", 75);
        let v = BasicEvaluator
            .evaluate("\"name\" || ' (' || code || ')'", Some(&feature))
            .unwrap();
        assert_eq!(v, Value::from("Paris (75)"));
        assert!(BasicEvaluator.compile("1 + ").is_err());
        assert!(BasicEvaluator.evaluate("missing", Some(&feature)).is_err());
    }

    #[test]
    fn test_map_xml() {
        let mut map = DataDefinedMap::new();
        map.set(DataDefinedProperty::NumPages, DataDefined::from_field("pages"));
        map.set(DataDefinedProperty::All, DataDefined::from_field("ignored"));
        map.set(DataDefinedProperty::PaperWidth, DataDefined::default());

        let mut parent = Element::new("Composition");
        map.write_xml(&mut parent);
        let container = parent.first_child("dataDefinedProperties").unwrap();
        assert_eq!(container.children().len(), 1);

        let read = DataDefinedMap::read_xml(&parent);
        assert_eq!(
            read.get(DataDefinedProperty::NumPages),
            Some(&DataDefined::from_field("pages"))
        );
        assert!(read.is_active(DataDefinedProperty::NumPages));
        assert!(!read.is_active(DataDefinedProperty::PaperWidth));
    }
}
