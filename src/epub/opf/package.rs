//! OPF包文档模块
//!
//! `PackageDocument` 持有OPF的元素树及其在归档中的路径，提供清单、脊柱与
//! 元数据的只读访问。各处理阶段以值传入、以值返回，不共享可变节点。

use crate::epub::error::{EpubError, Result};
use crate::epub::opf::{DC_NS, ManifestItem, SpineItem};
use crate::epub::paths;
use crate::epub::xml::{Element, NamespaceScope, Node, XmlDocument};

/// 解析后的OPF包文档
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDocument {
    /// OPF在归档内的POSIX路径
    path: String,
    /// 元素树
    document: XmlDocument,
}

impl PackageDocument {
    /// 解析OPF文本
    ///
    /// # 参数
    /// * `path` - OPF在归档内的路径
    /// * `xml_content` - OPF文件内容
    ///
    /// # 返回值
    /// * `Result<PackageDocument>` - 不良格式或根元素不是package时返回 `MalformedXml`
    pub fn parse(path: impl Into<String>, xml_content: &str) -> Result<PackageDocument> {
        let document = XmlDocument::parse(xml_content)?;
        if document.root.local_name() != "package" {
            return Err(EpubError::MalformedXml(format!(
                "OPF根元素应为package，实际为{}",
                document.root.name
            )));
        }
        Ok(PackageDocument {
            path: path.into(),
            document,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// OPF所在目录（归档内路径）
    pub fn base_dir(&self) -> &str {
        paths::parent_dir(&self.path)
    }

    pub fn document(&self) -> &XmlDocument {
        &self.document
    }

    pub fn root(&self) -> &Element {
        &self.document.root
    }

    pub fn root_mut(&mut self) -> &mut Element {
        &mut self.document.root
    }

    /// package的version属性
    pub fn version(&self) -> Option<&str> {
        self.document.root.attr("version")
    }

    pub fn is_epub3(&self) -> bool {
        self.version().is_some_and(|v| v.trim_start().starts_with('3'))
    }

    pub fn metadata(&self) -> Option<&Element> {
        self.document.root.find_child("metadata")
    }

    pub fn metadata_mut(&mut self) -> Option<&mut Element> {
        self.document.root.find_child_mut("metadata")
    }

    pub fn manifest(&self) -> Option<&Element> {
        self.document.root.find_child("manifest")
    }

    pub fn manifest_mut(&mut self) -> Option<&mut Element> {
        self.document.root.find_child_mut("manifest")
    }

    pub fn spine(&self) -> Option<&Element> {
        self.document.root.find_child("spine")
    }

    pub fn spine_mut(&mut self) -> Option<&mut Element> {
        self.document.root.find_child_mut("spine")
    }

    /// 确保存在 `<metadata>`，缺失时作为package的第一个子元素创建
    pub fn ensure_metadata(&mut self) {
        if self.metadata().is_some() {
            return;
        }
        let root = &mut self.document.root;
        let metadata = Element::new(Self::child_name(root, "metadata")).with_attr("xmlns:dc", DC_NS);
        root.children.insert(0, Node::Element(metadata));
    }

    /// 确保存在 `<manifest>`，缺失时紧跟在metadata之后创建
    pub fn ensure_manifest(&mut self) {
        if self.manifest().is_some() {
            return;
        }
        let root = &mut self.document.root;
        let manifest = Element::new(Self::child_name(root, "manifest"));
        let position = root
            .children
            .iter()
            .position(|node| matches!(node, Node::Element(e) if e.local_name() == "metadata"));
        match position {
            Some(index) => root.children.insert(index + 1, Node::Element(manifest)),
            None => root.children.insert(0, Node::Element(manifest)),
        }
    }

    /// metadata元素处的命名空间作用域
    pub fn metadata_scope(&self) -> NamespaceScope {
        let scope = NamespaceScope::default().enter(&self.document.root);
        match self.metadata() {
            Some(metadata) => scope.enter(metadata),
            None => scope,
        }
    }

    /// 检查元素是否为Dublin Core元素
    ///
    /// 前缀未绑定任何命名空间时，`dc` 前缀也视为Dublin Core。
    pub fn is_dublin_core(scope: &NamespaceScope, element: &Element) -> bool {
        let scope = scope.enter(element);
        match scope.namespace_of(element) {
            Some(uri) => uri == DC_NS,
            None => element.prefix() == Some("dc"),
        }
    }

    /// 按文档顺序列出所有清单项
    pub fn manifest_items(&self) -> Vec<ManifestItem> {
        self.manifest()
            .map(|manifest| {
                manifest
                    .child_elements()
                    .filter(|e| e.local_name() == "item")
                    .filter_map(ManifestItem::from_element)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 根据ID获取清单项
    pub fn manifest_item(&self, id: &str) -> Option<ManifestItem> {
        self.manifest_items().into_iter().find(|item| item.id == id)
    }

    /// 按阅读顺序列出脊柱项
    pub fn spine_items(&self) -> Vec<SpineItem> {
        self.spine()
            .map(|spine| {
                spine
                    .child_elements()
                    .filter(|e| e.local_name() == "itemref")
                    .filter_map(SpineItem::from_element)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// spine的toc属性
    pub fn spine_toc(&self) -> Option<&str> {
        self.spine().and_then(|spine| spine.attr("toc"))
    }

    /// 所有带nav属性的清单项
    pub fn nav_items(&self) -> Vec<ManifestItem> {
        self.manifest_items()
            .into_iter()
            .filter(|item| item.is_nav())
            .collect()
    }

    /// 将清单项的href解析为归档内路径
    pub fn resolve_item_path(&self, item: &ManifestItem) -> Option<String> {
        paths::resolve_href(self.base_dir(), &item.href)
    }

    /// 查找第一个匹配的Dublin Core元素的文本
    pub fn dublin_core_text(&self, local: &str) -> Option<String> {
        let scope = self.metadata_scope();
        self.metadata()?
            .child_elements()
            .find(|e| e.local_name() == local && Self::is_dublin_core(&scope, e))
            .map(|e| e.text().trim().to_string())
    }

    /// 与容器元素相同前缀的子元素名，如 `opf:manifest` 下的 `opf:item`
    pub fn child_name(parent: &Element, local: &str) -> String {
        match parent.prefix() {
            Some(prefix) => format!("{}:{}", prefix, local),
            None => local.to_string(),
        }
    }

    /// 序列化为文本
    pub fn to_xml_string(&self) -> Result<String> {
        self.document.to_xml_string()
    }
}
