//! 文档片段元素树
//!
//! 版面以 XML 片段的形式保存与交换。这里提供一个最小的元素树：
//! 元素名、有序属性（键值对）、子元素与文本。解析基于 xml5ever 的
//! 分词器，写出时自行转义。

use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::Rc;
use std::str::FromStr;

use markup5ever::buffer_queue::BufferQueue;
use xml5ever::tendril::StrTendril;
use xml5ever::tokenizer::{TagKind, Token, TokenSink, XmlTokenizer, XmlTokenizerOpts};

use crate::error::XmlError;

/// XML 元素
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// 设置属性（已存在则覆盖，保持原有顺序）
    pub fn set_attribute(&mut self, name: &str, value: impl ToString) {
        let value = value.to_string();
        match self.attributes.iter_mut().find(|(k, _)| k == name) {
            Some(entry) => entry.1 = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    /// 链式设置属性
    pub fn with_attribute(mut self, name: &str, value: impl ToString) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let pos = self.attributes.iter().position(|(k, _)| k == name)?;
        Some(self.attributes.remove(pos).1)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// 解析属性值，缺失或格式错误时返回 None
    pub fn attr<T: FromStr>(&self, name: &str) -> Option<T> {
        self.attribute(name).and_then(|v| v.trim().parse().ok())
    }

    pub fn attr_or<T: FromStr>(&self, name: &str, default: T) -> T {
        self.attr(name).unwrap_or(default)
    }

    /// 布尔属性，接受 true/false 与 1/0
    pub fn attr_bool(&self, name: &str, default: bool) -> bool {
        match self.attribute(name).map(str::trim) {
            Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            _ => default,
        }
    }

    /// 必需属性
    pub fn required_attr<T: FromStr>(&self, name: &str) -> Result<T, XmlError> {
        let value = self.attribute(name).ok_or_else(|| XmlError::MissingAttribute {
            element: self.name.clone(),
            attribute: name.to_string(),
        })?;
        value.trim().parse().map_err(|_| XmlError::InvalidAttribute {
            attribute: name.to_string(),
            value: value.to_string(),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// 追加子元素，返回其可变引用
    pub fn append_child(&mut self, child: Element) -> &mut Element {
        self.children.push(child);
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    pub fn first_child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// 按文档顺序查找所有同名后代（不含自身）
    pub fn descendants_named<'a>(&'a self, name: &str) -> Vec<&'a Element> {
        let mut found = Vec::new();
        self.collect_descendants(name, &mut found);
        found
    }

    fn collect_descendants<'a>(&'a self, name: &str, found: &mut Vec<&'a Element>) {
        for child in &self.children {
            if child.name == name {
                found.push(child);
            }
            child.collect_descendants(name, found);
        }
    }

    /// 对所有同名后代执行可变操作
    pub fn for_each_descendant_mut(&mut self, name: &str, f: &mut dyn FnMut(&mut Element)) {
        for child in &mut self.children {
            if child.name == name {
                f(child);
            }
            child.for_each_descendant_mut(name, f);
        }
    }

    /// 解析 XML 文本，返回根元素
    pub fn parse(text: &str) -> Result<Element, XmlError> {
        let state = Rc::new(RefCell::new(TreeState::default()));

        let mut queue = BufferQueue::new();
        queue.push_back(StrTendril::from_slice(text));

        let mut tokenizer = XmlTokenizer::new(TreeSink(state.clone()), XmlTokenizerOpts::default());
        tokenizer.run(&mut queue);
        tokenizer.end();

        let mut state = state.borrow_mut();
        if let Some(message) = state.error.take() {
            return Err(XmlError::Parse(message));
        }
        if let Some(open) = state.stack.last() {
            return Err(XmlError::Parse(format!("unclosed element <{}>", open.name)));
        }
        state
            .root
            .take()
            .ok_or_else(|| XmlError::Parse("document has no root element".to_string()))
    }

    /// 序列化为 XML 文本（不含声明）
    pub fn to_xml_string(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out, 0);
        out
    }

    /// 序列化为完整文档（含 XML 声明）
    pub fn to_document_string(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        self.write_to(&mut out, 0);
        out
    }

    fn write_to(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        let _ = write!(out, "{}<{}", indent, self.name);
        for (k, v) in &self.attributes {
            let _ = write!(out, " {}=\"{}\"", k, escape_xml(v));
        }
        if self.children.is_empty() && self.text.is_empty() {
            out.push_str("/>\n");
            return;
        }
        out.push('>');
        out.push_str(&escape_xml(&self.text));
        if !self.children.is_empty() {
            out.push('\n');
            for child in &self.children {
                child.write_to(out, depth + 1);
            }
            out.push_str(&indent);
        }
        let _ = writeln!(out, "</{}>", self.name);
    }
}

/// XML 转义（属性值与文本通用）
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            '\t' => out.push_str("&#9;"),
            _ => out.push(c),
        }
    }
    out
}

/// 结束时换行的块元素
const BLOCK_TAGS: &[&str] = &["p", "div", "li", "tr", "h1", "h2", "h3", "h4"];

/// 提取标记文本中的纯文本
///
/// 字符引用由分词器解码，`<br>` 与块元素结束处换行。标签不要求配对。
pub fn plain_text(markup: &str) -> String {
    let out = Rc::new(RefCell::new(String::new()));

    let mut queue = BufferQueue::new();
    queue.push_back(StrTendril::from_slice(markup));

    let mut tokenizer = XmlTokenizer::new(TextSink(out.clone()), XmlTokenizerOpts::default());
    tokenizer.run(&mut queue);
    tokenizer.end();

    let text = out.borrow().replace('\u{a0}', " ");
    text.trim_end().to_string()
}

struct TextSink(Rc<RefCell<String>>);

impl TokenSink for TextSink {
    fn process_token(&mut self, token: Token) {
        let mut out = self.0.borrow_mut();
        match token {
            Token::TagToken(tag) => {
                let name = tag.name.local.as_ref().to_ascii_lowercase();
                let line_break = match tag.kind {
                    TagKind::StartTag | TagKind::EmptyTag => name == "br",
                    TagKind::EndTag => BLOCK_TAGS.contains(&name.as_str()),
                    TagKind::ShortTag => false,
                };
                if line_break {
                    out.push('\n');
                }
            }
            Token::CharacterTokens(text) => out.push_str(&text),
            _ => (),
        }
    }
}

/// 解析过程中的构建状态
#[derive(Default)]
struct TreeState {
    stack: Vec<Element>,
    root: Option<Element>,
    error: Option<String>,
}

impl TreeState {
    fn close(&mut self, mut element: Element) {
        if !element.children.is_empty() && element.text.trim().is_empty() {
            element.text.clear();
        }
        match self.stack.last_mut() {
            Some(parent) => parent.children.push(element),
            None if self.root.is_none() => self.root = Some(element),
            None => self.error = Some(format!("second root element <{}>", element.name)),
        }
    }
}

struct TreeSink(Rc<RefCell<TreeState>>);

impl TokenSink for TreeSink {
    fn process_token(&mut self, token: Token) {
        let mut state = self.0.borrow_mut();
        if state.error.is_some() {
            return;
        }

        match token {
            Token::TagToken(tag) => {
                let name = tag.name.local.as_ref().to_string();
                match tag.kind {
                    TagKind::StartTag | TagKind::EmptyTag => {
                        let mut element = Element::new(name);
                        for a in &tag.attrs {
                            element
                                .attributes
                                .push((a.name.local.as_ref().to_string(), a.value.to_string()));
                        }
                        if matches!(tag.kind, TagKind::EmptyTag) {
                            state.close(element);
                        } else {
                            state.stack.push(element);
                        }
                    }
                    TagKind::EndTag => match state.stack.pop() {
                        Some(element) if element.name == name => state.close(element),
                        Some(element) => {
                            state.error = Some(format!(
                                "end tag </{}> does not match <{}>",
                                name, element.name
                            ))
                        }
                        None => state.error = Some(format!("unexpected end tag </{}>", name)),
                    },
                    TagKind::ShortTag => match state.stack.pop() {
                        Some(element) => state.close(element),
                        None => state.error = Some("unexpected short end tag".to_string()),
                    },
                }
            }
            Token::CharacterTokens(text) => {
                if let Some(current) = state.stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            Token::ParseError(message) => state.error = Some(message.to_string()),
            _ => (),
        }
    }
}
