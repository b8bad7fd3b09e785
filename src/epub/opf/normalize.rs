//! OPF规范化模块
//!
//! 剥离厂商元数据，按规范顺序重排 `<metadata>` 子元素，并清除缩进空白，
//! 使语义相同的OPF序列化结果完全一致。

use std::collections::HashSet;

use crate::epub::config::NormalizeConfig;
use crate::epub::opf::PackageDocument;
use crate::epub::xml::{Element, NamespaceScope, Node};

/// 规范化OPF
///
/// # 参数
/// * `package` - 待规范化的包文档
/// * `config` - 厂商识别规则与规范顺序
///
/// # 返回值
/// * `PackageDocument` - 规范化后的新文档
pub fn normalize(mut package: PackageDocument, config: &NormalizeConfig) -> PackageDocument {
    let removed = strip_vendor(package.root_mut(), &NamespaceScope::default(), config);
    if removed > 0 {
        tracing::debug!("剥离了 {} 个厂商元数据元素", removed);
    }

    let mut used = HashSet::new();
    collect_used_prefixes(package.root(), &mut used);
    drop_unused_vendor_declarations(package.root_mut(), &used, config);

    let scope = package.metadata_scope();
    if let Some(metadata) = package.metadata_mut() {
        reorder_metadata(metadata, &scope, config);
    }

    package.root_mut().strip_whitespace();
    package
}

fn is_vendor_element(element: &Element, scope: &NamespaceScope, config: &NormalizeConfig) -> bool {
    if scope
        .namespace_of(element)
        .is_some_and(|uri| config.is_vendor_namespace(uri))
    {
        return true;
    }
    element.local_name() == "meta"
        && config.is_vendor_meta(
            ["name", "property", "content"]
                .iter()
                .filter_map(|key| element.attr(key)),
        )
}

fn strip_vendor(element: &mut Element, scope: &NamespaceScope, config: &NormalizeConfig) -> usize {
    let scope = scope.enter(element);
    let mut removed = element.remove_children(|child| {
        let vendor = is_vendor_element(child, &scope.enter(child), config);
        if vendor {
            tracing::debug!("剥离厂商元素: {}", child.name);
        }
        vendor
    });
    for child in element.child_elements_mut() {
        removed += strip_vendor(child, &scope, config);
    }
    removed
}

fn collect_used_prefixes(element: &Element, used: &mut HashSet<String>) {
    if let Some(prefix) = element.prefix() {
        used.insert(prefix.to_string());
    }
    for (key, _) in &element.attributes {
        if key == "xmlns" || key.starts_with("xmlns:") {
            continue;
        }
        if let Some((prefix, _)) = key.split_once(':') {
            used.insert(prefix.to_string());
        }
    }
    for child in element.child_elements() {
        collect_used_prefixes(child, used);
    }
}

fn drop_unused_vendor_declarations(
    element: &mut Element,
    used: &HashSet<String>,
    config: &NormalizeConfig,
) {
    element.attributes.retain(|(key, uri)| match key.strip_prefix("xmlns:") {
        Some(prefix) => used.contains(prefix) || !config.is_vendor_namespace(uri),
        None => true,
    });
    for child in element.child_elements_mut() {
        drop_unused_vendor_declarations(child, used, config);
    }
}

/// 排序键：规范dc元素、其他dc元素（按本地名）、meta、其余元素
fn sort_key(element: &Element, scope: &NamespaceScope, config: &NormalizeConfig) -> (u8, usize, String) {
    if PackageDocument::is_dublin_core(scope, element) {
        return match config.canonical_rank(element.local_name()) {
            Some(rank) => (0, rank, String::new()),
            None => (1, 0, element.local_name().to_string()),
        };
    }
    if element.local_name() == "meta" {
        return (2, 0, String::new());
    }
    (3, 0, String::new())
}

/// 重排metadata子元素
///
/// 注释等非元素节点附着在其后的元素上一起移动；排序稳定，同组元素保持原有相对顺序。
fn reorder_metadata(metadata: &mut Element, scope: &NamespaceScope, config: &NormalizeConfig) {
    let mut units: Vec<((u8, usize, String), Vec<Node>)> = Vec::new();
    let mut pending: Vec<Node> = Vec::new();

    for node in std::mem::take(&mut metadata.children) {
        match node {
            Node::Element(element) => {
                let key = sort_key(&element, scope, config);
                let mut unit = std::mem::take(&mut pending);
                unit.push(Node::Element(element));
                units.push((key, unit));
            }
            Node::Text(text) if text.trim().is_empty() => {}
            other => pending.push(other),
        }
    }

    units.sort_by(|a, b| a.0.cmp(&b.0));
    metadata.children = units.into_iter().flat_map(|(_, nodes)| nodes).collect();
    metadata.children.extend(pending);
}
