//! XML元素树模块
//!
//! 基于quick-xml事件流构建的可拥有元素树。OPF的改写、规范化与修复都以
//! `XmlDocument -> XmlDocument` 的纯函数形式作用在这棵树上，最后由统一的
//! 序列化器以两个空格缩进输出，保证语义相同的文档序列化结果完全一致。

use crate::epub::error::{EpubError, Result};
use quick_xml::Writer;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;

/// XML节点
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
}

/// XML元素
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// 限定名（如 `dc:title`）
    pub name: String,
    /// 属性列表，保持原始顺序
    pub attributes: Vec<(String, String)>,
    /// 子节点
    pub children: Vec<Node>,
}

/// XML声明
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub version: String,
    pub encoding: Option<String>,
    pub standalone: Option<String>,
}

/// 完整的XML文档
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    pub declaration: Option<Declaration>,
    pub doctype: Option<String>,
    pub root: Element,
}

impl Element {
    /// 创建没有属性和子节点的元素
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// 链式添加属性
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    /// 链式设置文本内容
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.set_text(text);
        self
    }

    /// 本地名（去掉命名空间前缀）
    pub fn local_name(&self) -> &str {
        split_qname(&self.name).1
    }

    /// 命名空间前缀
    pub fn prefix(&self) -> Option<&str> {
        split_qname(&self.name).0
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// 按本地名查找属性，忽略前缀（如 `opf:role` 与 `role`）
    pub fn attr_local(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| split_qname(k).1 == local)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    pub fn remove_attr(&mut self, key: &str) -> Option<String> {
        let index = self.attributes.iter().position(|(k, _)| k == key)?;
        Some(self.attributes.remove(index).1)
    }

    /// 遍历子元素
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn child_elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// 按本地名查找第一个子元素
    pub fn find_child(&self, local: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.local_name() == local)
    }

    pub fn find_child_mut(&mut self, local: &str) -> Option<&mut Element> {
        self.child_elements_mut().find(|e| e.local_name() == local)
    }

    /// 删除满足条件的子元素，返回被删除的数量
    pub fn remove_children<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&Element) -> bool,
    {
        let before = self.children.len();
        self.children.retain(|node| match node {
            Node::Element(e) => !predicate(e),
            _ => true,
        });
        before - self.children.len()
    }

    pub fn push_child(&mut self, element: Element) {
        self.children.push(Node::Element(element));
    }

    /// 拼接所有直接文本子节点
    pub fn text(&self) -> String {
        let mut text = String::new();
        for node in &self.children {
            match node {
                Node::Text(t) | Node::CData(t) => text.push_str(t),
                _ => {}
            }
        }
        text
    }

    /// 用单个文本节点替换全部子节点
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children = vec![Node::Text(text.into())];
    }

    /// 查找绑定到指定命名空间URI的前缀（仅在本元素上声明的）
    pub fn declared_prefix_for(&self, uri: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, v)| v == uri && k.starts_with("xmlns:"))
            .map(|(k, _)| &k["xmlns:".len()..])
    }

    /// 本元素上声明的命名空间绑定：`(前缀, URI)`，默认命名空间前缀为空串
    pub fn namespace_declarations(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().filter_map(|(k, v)| {
            if k == "xmlns" {
                Some(("", v.as_str()))
            } else {
                k.strip_prefix("xmlns:").map(|p| (p, v.as_str()))
            }
        })
    }

    /// 是否含有元素子节点
    fn has_element_children(&self) -> bool {
        self.children.iter().any(|n| matches!(n, Node::Element(_)))
    }

    /// 递归删除仅含空白的文本节点（只针对包含子元素的元素）
    pub fn strip_whitespace(&mut self) {
        if self.has_element_children() {
            self.children.retain(|node| match node {
                Node::Text(t) => !t.trim().is_empty(),
                _ => true,
            });
        }
        for child in self.child_elements_mut() {
            child.strip_whitespace();
        }
    }
}

/// 命名空间作用域，按从外到内的顺序记录绑定
#[derive(Debug, Clone, Default)]
pub struct NamespaceScope {
    bindings: Vec<(String, String)>,
}

impl NamespaceScope {
    /// 在当前作用域上叠加元素自身声明的绑定
    pub fn enter(&self, element: &Element) -> NamespaceScope {
        let mut scope = self.clone();
        for (prefix, uri) in element.namespace_declarations() {
            scope.bindings.push((prefix.to_string(), uri.to_string()));
        }
        scope
    }

    /// 解析前缀对应的URI，内层绑定优先
    pub fn resolve(&self, prefix: Option<&str>) -> Option<&str> {
        let prefix = prefix.unwrap_or("");
        self.bindings
            .iter()
            .rev()
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    /// 解析元素名的命名空间URI
    pub fn namespace_of(&self, element: &Element) -> Option<&str> {
        self.resolve(element.prefix())
    }

    /// 查找绑定到URI的前缀
    pub fn prefix_for(&self, uri: &str) -> Option<&str> {
        self.bindings
            .iter()
            .rev()
            .find(|(p, u)| u == uri && !p.is_empty())
            .map(|(p, _)| p.as_str())
    }
}

fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

fn malformed(err: impl std::fmt::Display) -> EpubError {
    EpubError::MalformedXml(err.to_string())
}

fn utf8(bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(malformed)
}

fn element_from_start(e: &BytesStart) -> Result<Element> {
    let mut element = Element::new(utf8(e.name().as_ref())?);
    for attr_result in e.attributes() {
        let attr = attr_result.map_err(malformed)?;
        let key = utf8(attr.key.as_ref())?;
        let value = attr.unescape_value().map_err(malformed)?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

impl XmlDocument {
    /// 解析XML文本
    ///
    /// 任何不良格式（标签不匹配、未闭合、缺少根元素）都返回 `MalformedXml`。
    pub fn parse(xml_content: &str) -> Result<XmlDocument> {
        let mut reader = Reader::from_str(xml_content);
        reader.config_mut().trim_text(false);

        let mut declaration = None;
        let mut doctype = None;
        let mut root: Option<Element> = None;
        let mut stack: Vec<Element> = Vec::new();

        loop {
            let event = reader.read_event().map_err(|e| {
                malformed(format!("位置 {}: {}", reader.buffer_position(), e))
            })?;
            match event {
                Event::Decl(ref d) => {
                    let version = utf8(&d.version().map_err(malformed)?)?;
                    let encoding = match d.encoding() {
                        Some(enc) => Some(utf8(&enc.map_err(malformed)?)?),
                        None => None,
                    };
                    let standalone = match d.standalone() {
                        Some(sa) => Some(utf8(&sa.map_err(malformed)?)?),
                        None => None,
                    };
                    declaration = Some(Declaration {
                        version,
                        encoding,
                        standalone,
                    });
                }
                Event::DocType(ref t) => {
                    doctype = Some(utf8(&**t)?.trim().to_string());
                }
                Event::Start(ref e) => {
                    if root.is_some() {
                        return Err(malformed("根元素之后存在多余的元素"));
                    }
                    stack.push(element_from_start(e)?);
                }
                Event::Empty(ref e) => {
                    let element = element_from_start(e)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack.pop().ok_or_else(|| malformed("多余的结束标签"))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(ref t) => {
                    let text = t.unescape().map_err(malformed)?.into_owned();
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::Text(text));
                    } else if !text.trim().is_empty() {
                        return Err(malformed("根元素之外存在文本内容"));
                    }
                }
                Event::CData(ref c) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::CData(utf8(&**c)?));
                    }
                }
                Event::Comment(ref c) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::Comment(utf8(&**c)?));
                    }
                }
                Event::PI(ref p) => {
                    if let Some(parent) = stack.last_mut() {
                        parent
                            .children
                            .push(Node::ProcessingInstruction(utf8(&**p)?));
                    }
                }
                Event::Eof => break,
            }
        }

        if !stack.is_empty() {
            return Err(malformed("文档在元素闭合前结束"));
        }
        let root = root.ok_or_else(|| malformed("缺少根元素"))?;

        Ok(XmlDocument {
            declaration,
            doctype,
            root,
        })
    }

    /// 以两个空格缩进序列化文档
    pub fn to_xml_string(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

        if let Some(decl) = &self.declaration {
            writer.write_event(Event::Decl(BytesDecl::new(
                &decl.version,
                decl.encoding.as_deref(),
                decl.standalone.as_deref(),
            )))?;
        }
        if let Some(doctype) = &self.doctype {
            writer.write_event(Event::DocType(BytesText::from_escaped(doctype.as_str())))?;
        }
        write_element(&mut writer, &self.root)?;

        let mut output = utf8(&writer.into_inner())?;
        output.push('\n');
        Ok(output)
    }
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.push_child(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(malformed("文档存在多个根元素")),
    }
    Ok(())
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    let skip_blank = element.has_element_children();
    let children: Vec<&Node> = element
        .children
        .iter()
        .filter(|node| !(skip_blank && matches!(node, Node::Text(t) if t.trim().is_empty())))
        .collect();

    if children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for node in children {
        match node {
            Node::Element(child) => write_element(writer, child)?,
            Node::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
            Node::CData(text) => writer.write_event(Event::CData(BytesCData::new(text.as_str())))?,
            Node::Comment(text) => {
                writer.write_event(Event::Comment(BytesText::from_escaped(text.as_str())))?
            }
            Node::ProcessingInstruction(text) => {
                writer.write_event(Event::PI(BytesPI::new(text.as_str())))?
            }
        }
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
    <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
        <!-- 书名 -->
        <dc:title>Tom &amp; Jerry</dc:title>
        <meta name="cover" content="cover-image"/>
    </metadata>
</package>"#;

    #[test]
    fn test_parse_tree_structure() {
        let doc = XmlDocument::parse(SAMPLE).unwrap();
        assert_eq!(doc.root.local_name(), "package");
        assert_eq!(doc.root.attr("version"), Some("3.0"));

        let metadata = doc.root.find_child("metadata").unwrap();
        let title = metadata.find_child("title").unwrap();
        assert_eq!(title.name, "dc:title");
        assert_eq!(title.prefix(), Some("dc"));
        assert_eq!(title.text(), "Tom & Jerry");
        assert_eq!(
            metadata.declared_prefix_for("http://purl.org/dc/elements/1.1/"),
            Some("dc")
        );
    }

    #[test]
    fn test_serialize_is_two_space_indented() {
        let doc = XmlDocument::parse(SAMPLE).unwrap();
        let xml = doc.to_xml_string().unwrap();
        let expected = concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
            "<package xmlns=\"http://www.idpf.org/2007/opf\" version=\"3.0\">\n",
            "  <metadata xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\n",
            "    <!-- 书名 -->\n",
            "    <dc:title>Tom &amp; Jerry</dc:title>\n",
            "    <meta name=\"cover\" content=\"cover-image\"/>\n",
            "  </metadata>\n",
            "</package>\n",
        );
        assert_eq!(xml, expected);
    }

    #[test]
    fn test_serialize_is_a_fixpoint() {
        let first = XmlDocument::parse(SAMPLE).unwrap().to_xml_string().unwrap();
        let second = XmlDocument::parse(&first).unwrap().to_xml_string().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_mismatched_tags_are_malformed() {
        let result = XmlDocument::parse("<package><metadata></package>");
        assert!(matches!(result, Err(EpubError::MalformedXml(_))));
    }

    #[test]
    fn test_unclosed_document_is_malformed() {
        let result = XmlDocument::parse("<package><metadata>");
        assert!(matches!(result, Err(EpubError::MalformedXml(_))));
    }

    #[test]
    fn test_empty_input_is_malformed() {
        assert!(matches!(XmlDocument::parse("   "), Err(EpubError::MalformedXml(_))));
    }

    #[test]
    fn test_namespace_scope_resolution() {
        let doc = XmlDocument::parse(SAMPLE).unwrap();
        let scope = NamespaceScope::default().enter(&doc.root);
        let metadata = doc.root.find_child("metadata").unwrap();
        let scope = scope.enter(metadata);

        let title = metadata.find_child("title").unwrap();
        assert_eq!(scope.namespace_of(title), Some("http://purl.org/dc/elements/1.1/"));
        assert_eq!(scope.namespace_of(metadata), Some("http://www.idpf.org/2007/opf"));
        assert_eq!(scope.prefix_for("http://purl.org/dc/elements/1.1/"), Some("dc"));
    }

    #[test]
    fn test_attribute_helpers() {
        let mut item = Element::new("item")
            .with_attr("id", "a")
            .with_attr("opf:role", "aut");
        item.set_attr("id", "b");
        assert_eq!(item.attr("id"), Some("b"));
        assert_eq!(item.attr_local("role"), Some("aut"));
        assert_eq!(item.remove_attr("id"), Some("b".to_string()));
        assert_eq!(item.attr("id"), None);
    }
}
