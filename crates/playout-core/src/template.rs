//! 模板文本替换
//!
//! 在解析之前对原始文档文本做 `[键]` → 值 的替换，值先做 XML 转义。

use std::collections::BTreeMap;

use crate::dom::escape_xml;

/// 占位符替换表
pub type SubstitutionMap = BTreeMap<String, String>;

/// 替换 `text` 中所有 `[键]` 占位符
///
/// 未出现在表中的方括号内容原样保留。
pub fn substitute(text: &str, substitutions: &SubstitutionMap) -> String {
    if substitutions.is_empty() {
        return text.to_string();
    }
    let mut result = text.to_string();
    for (key, value) in substitutions {
        let token = format!("[{}]", key);
        if result.contains(&token) {
            result = result.replace(&token, &escape_xml(value));
        }
    }
    result
}
