//! 结构校验与修复模块
//!
//! 校验是纯读取：在解压目录中检查清单引用的文件、导航文档与脊柱引用，
//! 生成不可变的问题集。修复是确定性的最小改动，并且幂等：对修复结果再次
//! 校验得到空问题集（无法自动修复的 `EmptySpine` 与 `NoTocElement` 除外）。

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use scraper::{Html, Selector};
use serde::Serialize;

use crate::epub::config::{EpubsmithConfig, NavConfig};
use crate::epub::error::{EpubError, Result};
use crate::epub::opf::{ManifestItem, PackageDocument, remove_property};
use crate::epub::paths;
use crate::epub::xml::{Declaration, Element, XmlDocument};

const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";
const OPS_NS: &str = "http://www.idpf.org/2007/ops";
const XHTML_MEDIA_TYPE: &str = "application/xhtml+xml";

/// 清单项引用的文件不存在
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingFile {
    pub id: String,
    pub href: String,
}

/// 指向不存在的清单ID的引用
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BrokenRef {
    /// 清单项的fallback属性
    Fallback { id: String, fallback: String },
    /// spine的toc属性
    SpineToc { toc: String },
}

/// 导航文档问题
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NavIssue {
    /// 没有带nav属性的清单项
    NoNavItem,
    /// 导航清单项的文件不存在
    NavFileMissing { id: String, href: String },
    /// 多个清单项带有nav属性
    MultipleNavItems { ids: Vec<String> },
    /// 导航文件中没有 `<nav>` 元素
    NoTocElement { href: String },
}

/// 脊柱问题
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpineIssue {
    EmptySpine,
    UnknownIdref { idref: String },
}

/// 一次校验的结果，为空表示结构有效
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationIssues {
    pub missing_files: Vec<MissingFile>,
    pub broken_refs: Vec<BrokenRef>,
    pub nav_issues: Vec<NavIssue>,
    pub spine_issues: Vec<SpineIssue>,
}

impl ValidationIssues {
    pub fn is_empty(&self) -> bool {
        self.missing_files.is_empty()
            && self.broken_refs.is_empty()
            && self.nav_issues.is_empty()
            && self.spine_issues.is_empty()
    }

    /// 问题总数
    pub fn len(&self) -> usize {
        self.missing_files.len() + self.broken_refs.len() + self.nav_issues.len() + self.spine_issues.len()
    }

    fn wants_nav(&self) -> bool {
        self.nav_issues
            .iter()
            .any(|issue| matches!(issue, NavIssue::NoNavItem | NavIssue::NavFileMissing { .. }))
    }
}

impl fmt::Display for NavIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavIssue::NoNavItem => write!(f, "清单中没有导航文档"),
            NavIssue::NavFileMissing { id, href } => write!(f, "导航文档 {} 不存在 (id={})", href, id),
            NavIssue::MultipleNavItems { ids } => write!(f, "存在多个导航文档: {}", ids.join(", ")),
            NavIssue::NoTocElement { href } => write!(f, "导航文档 {} 中没有nav元素", href),
        }
    }
}

impl fmt::Display for SpineIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpineIssue::EmptySpine => write!(f, "脊柱为空"),
            SpineIssue::UnknownIdref { idref } => write!(f, "脊柱引用了不存在的清单项: {}", idref),
        }
    }
}

impl fmt::Display for BrokenRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokenRef::Fallback { id, fallback } => {
                write!(f, "清单项 {} 的fallback指向不存在的 {}", id, fallback)
            }
            BrokenRef::SpineToc { toc } => write!(f, "spine的toc指向不存在的 {}", toc),
        }
    }
}

/// 修复动作
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AppliedFix {
    RemovedManifestItem { id: String, href: String },
    RemovedItemref { idref: String },
    RemovedFallback { id: String, fallback: String },
    RemovedSpineToc { toc: String },
    DroppedNavProperty { id: String },
    SynthesizedNav { id: String, href: String, entries: usize },
}

impl fmt::Display for AppliedFix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppliedFix::RemovedManifestItem { id, href } => {
                write!(f, "删除清单项 {} ({})", id, href)
            }
            AppliedFix::RemovedItemref { idref } => write!(f, "删除脊柱引用 {}", idref),
            AppliedFix::RemovedFallback { id, fallback } => {
                write!(f, "删除清单项 {} 的fallback {}", id, fallback)
            }
            AppliedFix::RemovedSpineToc { toc } => write!(f, "删除spine的toc属性 {}", toc),
            AppliedFix::DroppedNavProperty { id } => write!(f, "移除清单项 {} 的nav属性", id),
            AppliedFix::SynthesizedNav { href, entries, .. } => {
                write!(f, "生成导航文档 {} ({} 个条目)", href, entries)
            }
        }
    }
}

/// 读取并解析解压目录中的OPF
pub fn load_package(root: &Path, opf_path: &str) -> Result<PackageDocument> {
    let text = fs::read_to_string(paths::to_fs_path(root, opf_path))?;
    PackageDocument::parse(opf_path, &text)
}

/// 将OPF写回解压目录
pub fn write_package(root: &Path, package: &PackageDocument) -> Result<()> {
    fs::write(paths::to_fs_path(root, package.path()), package.to_xml_string()?)?;
    Ok(())
}

/// 校验解压目录中的EPUB结构
///
/// # 参数
/// * `root` - 解压根目录
/// * `opf_path` - OPF在归档内的路径
///
/// # 返回值
/// * `Result<ValidationIssues>` - 问题集；OPF无法读取或解析时返回错误
pub fn validate(root: &Path, opf_path: &str) -> Result<ValidationIssues> {
    let package = load_package(root, opf_path)?;
    validate_package(root, &package)
}

fn item_file_exists(root: &Path, package: &PackageDocument, item: &ManifestItem) -> bool {
    if paths::is_remote(&item.href) {
        return true;
    }
    package
        .resolve_item_path(item)
        .is_some_and(|path| paths::to_fs_path(root, &path).is_file())
}

/// 校验已解析的包文档
pub fn validate_package(root: &Path, package: &PackageDocument) -> Result<ValidationIssues> {
    let mut issues = ValidationIssues::default();
    let items = package.manifest_items();
    let ids: HashSet<&str> = items.iter().map(|item| item.id.as_str()).collect();

    for item in &items {
        if !item_file_exists(root, package, item) {
            issues.missing_files.push(MissingFile {
                id: item.id.clone(),
                href: item.href.clone(),
            });
        }
        if let Some(fallback) = &item.fallback {
            if !ids.contains(fallback.as_str()) {
                issues.broken_refs.push(BrokenRef::Fallback {
                    id: item.id.clone(),
                    fallback: fallback.clone(),
                });
            }
        }
    }
    if let Some(toc) = package.spine_toc() {
        if !ids.contains(toc) {
            issues.broken_refs.push(BrokenRef::SpineToc { toc: toc.to_string() });
        }
    }

    let nav_items = package.nav_items();
    match nav_items.first() {
        None => issues.nav_issues.push(NavIssue::NoNavItem),
        Some(nav) => {
            if nav_items.len() > 1 {
                issues.nav_issues.push(NavIssue::MultipleNavItems {
                    ids: nav_items.iter().map(|item| item.id.clone()).collect(),
                });
            }
            if !item_file_exists(root, package, nav) {
                issues.nav_issues.push(NavIssue::NavFileMissing {
                    id: nav.id.clone(),
                    href: nav.href.clone(),
                });
            } else if let Some(path) = package.resolve_item_path(nav) {
                let content = fs::read_to_string(paths::to_fs_path(root, &path))?;
                if !has_nav_element(&content)? {
                    issues.nav_issues.push(NavIssue::NoTocElement {
                        href: nav.href.clone(),
                    });
                }
            }
        }
    }

    let spine = package.spine_items();
    if spine.is_empty() {
        issues.spine_issues.push(SpineIssue::EmptySpine);
    }
    for itemref in &spine {
        if !ids.contains(itemref.idref.as_str()) {
            issues.spine_issues.push(SpineIssue::UnknownIdref {
                idref: itemref.idref.clone(),
            });
        }
    }

    Ok(issues)
}

fn has_nav_element(content: &str) -> Result<bool> {
    let selector = Selector::parse("nav")
        .map_err(|e| EpubError::InvalidEpub(format!("选择器错误: {:?}", e)))?;
    let document = Html::parse_document(content);
    Ok(document.select(&selector).next().is_some())
}

/// 修复解压目录中的EPUB结构
///
/// 只有实际应用了修复时才写回OPF。
///
/// # 返回值
/// * `Result<Vec<AppliedFix>>` - 已应用的修复
pub fn repair(root: &Path, opf_path: &str, issues: &ValidationIssues) -> Result<Vec<AppliedFix>> {
    repair_with(root, opf_path, issues, &EpubsmithConfig::shared_default().nav)
}

/// 使用指定的导航合成配置修复
pub fn repair_with(
    root: &Path,
    opf_path: &str,
    issues: &ValidationIssues,
    nav: &NavConfig,
) -> Result<Vec<AppliedFix>> {
    let package = load_package(root, opf_path)?;
    let (package, fixes) = repair_package_with(root, package, issues, nav)?;
    if !fixes.is_empty() {
        write_package(root, &package)?;
    }
    Ok(fixes)
}

/// 修复已解析的包文档
///
/// 生成的导航文档直接写入 `root`，OPF本身不落盘。
pub fn repair_package(
    root: &Path,
    package: PackageDocument,
    issues: &ValidationIssues,
) -> Result<(PackageDocument, Vec<AppliedFix>)> {
    repair_package_with(root, package, issues, &EpubsmithConfig::shared_default().nav)
}

/// 使用指定的导航合成配置修复已解析的包文档
pub fn repair_package_with(
    root: &Path,
    mut package: PackageDocument,
    issues: &ValidationIssues,
    nav: &NavConfig,
) -> Result<(PackageDocument, Vec<AppliedFix>)> {
    let mut fixes = Vec::new();

    let missing: HashSet<&str> = issues.missing_files.iter().map(|m| m.id.as_str()).collect();
    if !missing.is_empty() {
        if let Some(manifest) = package.manifest_mut() {
            manifest.remove_children(|item| {
                if item.local_name() != "item" {
                    return false;
                }
                let Some(id) = item.attr("id") else {
                    return false;
                };
                if !missing.contains(id) {
                    return false;
                }
                fixes.push(AppliedFix::RemovedManifestItem {
                    id: id.to_string(),
                    href: item.attr("href").unwrap_or_default().to_string(),
                });
                true
            });
        }
    }

    let ids: HashSet<String> = package.manifest_items().into_iter().map(|item| item.id).collect();
    remove_unknown_itemrefs(&mut package, &ids, &mut fixes);
    remove_dangling_refs(&mut package, &ids, &mut fixes);
    drop_extra_nav_properties(&mut package, &mut fixes);

    if issues.wants_nav() && package.nav_items().is_empty() {
        let fix = synthesize_nav(root, &mut package, nav)?;
        fixes.push(fix);
    }

    for fix in &fixes {
        tracing::warn!("结构修复: {}", fix);
    }
    Ok((package, fixes))
}

fn remove_unknown_itemrefs(package: &mut PackageDocument, ids: &HashSet<String>, fixes: &mut Vec<AppliedFix>) {
    let Some(spine) = package.spine_mut() else {
        return;
    };
    spine.remove_children(|itemref| {
        if itemref.local_name() != "itemref" {
            return false;
        }
        let idref = itemref.attr("idref").unwrap_or_default();
        if ids.contains(idref) {
            return false;
        }
        fixes.push(AppliedFix::RemovedItemref {
            idref: idref.to_string(),
        });
        true
    });
}

fn remove_dangling_refs(package: &mut PackageDocument, ids: &HashSet<String>, fixes: &mut Vec<AppliedFix>) {
    if let Some(manifest) = package.manifest_mut() {
        for item in manifest.child_elements_mut().filter(|e| e.local_name() == "item") {
            let dangling = item.attr("fallback").filter(|f| !ids.contains(*f)).map(str::to_string);
            if let Some(fallback) = dangling {
                item.remove_attr("fallback");
                fixes.push(AppliedFix::RemovedFallback {
                    id: item.attr("id").unwrap_or_default().to_string(),
                    fallback,
                });
            }
        }
    }
    if let Some(spine) = package.spine_mut() {
        let dangling = spine.attr("toc").filter(|t| !ids.contains(*t)).map(str::to_string);
        if let Some(toc) = dangling {
            spine.remove_attr("toc");
            fixes.push(AppliedFix::RemovedSpineToc { toc });
        }
    }
}

fn drop_extra_nav_properties(package: &mut PackageDocument, fixes: &mut Vec<AppliedFix>) {
    let Some(manifest) = package.manifest_mut() else {
        return;
    };
    let mut seen_nav = false;
    for item in manifest.child_elements_mut().filter(|e| e.local_name() == "item") {
        let Some(properties) = item.attr("properties").map(str::to_string) else {
            continue;
        };
        if !properties.split_whitespace().any(|p| p == "nav") {
            continue;
        }
        if !seen_nav {
            seen_nav = true;
            continue;
        }
        match remove_property(&properties, "nav") {
            Some(rest) => item.set_attr("properties", rest),
            None => {
                item.remove_attr("properties");
            }
        }
        fixes.push(AppliedFix::DroppedNavProperty {
            id: item.attr("id").unwrap_or_default().to_string(),
        });
    }
}

/// 选择一个未被占用的ID与href
fn unique_nav_target(root: &Path, package: &PackageDocument, nav: &NavConfig) -> (String, String) {
    let items = package.manifest_items();
    let taken_ids: HashSet<&str> = items.iter().map(|item| item.id.as_str()).collect();
    let taken_paths: HashSet<String> = items
        .iter()
        .filter_map(|item| package.resolve_item_path(item))
        .collect();

    let mut counter = 0usize;
    loop {
        let suffix = if counter == 0 {
            String::new()
        } else {
            format!("-{}", counter)
        };
        let (id, href) = nav.candidate(&suffix);
        let path = paths::resolve_href(package.base_dir(), &href).unwrap_or_else(|| href.clone());
        let free = !taken_ids.contains(id.as_str())
            && !taken_paths.contains(&path)
            && !paths::to_fs_path(root, &path).exists();
        if free {
            return (id, href);
        }
        counter += 1;
    }
}

/// 按脊柱顺序构建最小导航文档
pub fn build_nav_document(entries: &[String]) -> XmlDocument {
    let mut list = Element::new("ol");
    for (index, href) in entries.iter().enumerate() {
        let link = Element::new("a")
            .with_attr("href", href.as_str())
            .with_text(format!("Chapter {}", index + 1));
        let mut item = Element::new("li");
        item.push_child(link);
        list.push_child(item);
    }

    let mut nav = Element::new("nav")
        .with_attr("epub:type", "toc")
        .with_attr("id", "toc");
    nav.push_child(Element::new("h1").with_text("Table of Contents"));
    nav.push_child(list);

    let mut head = Element::new("head");
    head.push_child(Element::new("title").with_text("Table of Contents"));
    let mut body = Element::new("body");
    body.push_child(nav);

    let mut html = Element::new("html")
        .with_attr("xmlns", XHTML_NS)
        .with_attr("xmlns:epub", OPS_NS);
    html.push_child(head);
    html.push_child(body);

    XmlDocument {
        declaration: Some(Declaration {
            version: "1.0".to_string(),
            encoding: Some("UTF-8".to_string()),
            standalone: None,
        }),
        doctype: Some("html".to_string()),
        root: html,
    }
}

fn synthesize_nav(root: &Path, package: &mut PackageDocument, nav: &NavConfig) -> Result<AppliedFix> {
    let (id, href) = unique_nav_target(root, package, nav);
    let archive_path = paths::resolve_href(package.base_dir(), &href)
        .ok_or_else(|| EpubError::RepairFailed(format!("导航文档路径无效: {}", href)))?;

    // 导航不在OPF目录时，条目链接改为相对导航文档所在目录
    let nav_dir = paths::parent_dir(&archive_path);
    let same_dir = nav_dir == package.base_dir();
    let items = package.manifest_items();
    let entries: Vec<String> = package
        .spine_items()
        .iter()
        .filter_map(|itemref| items.iter().find(|item| item.id == itemref.idref))
        .filter_map(|item| {
            if same_dir {
                Some(item.href.clone())
            } else {
                package
                    .resolve_item_path(item)
                    .map(|path| paths::relative_href(nav_dir, &path))
            }
        })
        .collect();

    let document = build_nav_document(&entries);
    let target = paths::to_fs_path(root, &archive_path);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&target, document.to_xml_string()?)?;

    package.ensure_manifest();
    if let Some(manifest) = package.manifest_mut() {
        let name = PackageDocument::child_name(manifest, "item");
        let item = ManifestItem::new(id.as_str(), href.as_str(), XHTML_MEDIA_TYPE).with_properties("nav");
        manifest.push_child(item.to_element(&name));
    }

    Ok(AppliedFix::SynthesizedNav {
        id,
        href,
        entries: entries.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const OPF_PATH: &str = "OEBPS/content.opf";

    fn setup(opf: &str, files: &[&str]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let opf_file = root.join(OPF_PATH);
        fs::create_dir_all(opf_file.parent().unwrap()).unwrap();
        fs::write(&opf_file, opf).unwrap();
        for file in files {
            let path = paths::to_fs_path(&root, file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "<html><body><nav/></body></html>").unwrap();
        }
        (dir, root)
    }

    fn opf(manifest: &str, spine: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>T</dc:title></metadata>
  <manifest>{}</manifest>
  <spine>{}</spine>
</package>"#,
            manifest, spine
        )
    }

    #[test]
    fn test_valid_structure_has_no_issues() {
        let opf = opf(
            r#"<item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
<item id="c1" href="text/c1.xhtml" media-type="application/xhtml+xml"/>
<item id="remote" href="https://example.com/font.woff" media-type="font/woff"/>"#,
            r#"<itemref idref="c1"/>"#,
        );
        let (_dir, root) = setup(&opf, &["OEBPS/nav.xhtml", "OEBPS/text/c1.xhtml"]);
        let issues = validate(&root, OPF_PATH).unwrap();
        assert!(issues.is_empty(), "{:?}", issues);
    }

    #[test]
    fn test_detects_all_issue_kinds() {
        let opf = opf(
            r#"<item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
<item id="nav2" href="toc.xhtml" media-type="application/xhtml+xml" properties="nav"/>
<item id="c1" href="text/c1.xhtml" media-type="application/xhtml+xml" fallback="ghost"/>
<item id="escape" href="../../outside.xhtml" media-type="application/xhtml+xml"/>"#,
            r#"<itemref idref="c1"/><itemref idref="unknown"/>"#,
        );
        let (_dir, root) = setup(&opf, &["OEBPS/text/c1.xhtml", "OEBPS/toc.xhtml"]);
        let issues = validate(&root, OPF_PATH).unwrap();

        let missing: Vec<&str> = issues.missing_files.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(missing, vec!["nav", "escape"]);
        assert_eq!(
            issues.broken_refs,
            vec![BrokenRef::Fallback {
                id: "c1".to_string(),
                fallback: "ghost".to_string()
            }]
        );
        assert!(issues.nav_issues.contains(&NavIssue::MultipleNavItems {
            ids: vec!["nav".to_string(), "nav2".to_string()]
        }));
        assert!(issues.nav_issues.contains(&NavIssue::NavFileMissing {
            id: "nav".to_string(),
            href: "nav.xhtml".to_string()
        }));
        assert_eq!(
            issues.spine_issues,
            vec![SpineIssue::UnknownIdref {
                idref: "unknown".to_string()
            }]
        );
    }

    #[test]
    fn test_repair_removes_missing_items_and_itemrefs() {
        let opf = opf(
            r#"<item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
<item id="c1" href="text/c1.xhtml" media-type="application/xhtml+xml"/>
<item id="c2" href="text/c2.xhtml" media-type="application/xhtml+xml"/>
<item id="c3" href="text/c3.xhtml" media-type="application/xhtml+xml"/>"#,
            r#"<itemref idref="c1"/><itemref idref="c2"/><itemref idref="c3"/>"#,
        );
        let (_dir, root) = setup(&opf, &["OEBPS/nav.xhtml", "OEBPS/text/c1.xhtml"]);

        let issues = validate(&root, OPF_PATH).unwrap();
        assert_eq!(issues.missing_files.len(), 2);
        let fixes = repair(&root, OPF_PATH, &issues).unwrap();
        assert_eq!(fixes.len(), 4);

        let package = load_package(&root, OPF_PATH).unwrap();
        assert_eq!(package.manifest_items().len(), 2);
        let spine: Vec<String> = package.spine_items().into_iter().map(|s| s.idref).collect();
        assert_eq!(spine, vec!["c1"]);

        assert!(validate(&root, OPF_PATH).unwrap().is_empty());
    }

    #[test]
    fn test_synthesizes_nav_from_spine() {
        let opf = opf(
            r#"<item id="chapter1" href="text/c1.xhtml" media-type="application/xhtml+xml"/>
<item id="chapter2" href="text/c2.xhtml" media-type="application/xhtml+xml"/>"#,
            r#"<itemref idref="chapter1"/><itemref idref="chapter2"/>"#,
        );
        let (_dir, root) = setup(&opf, &["OEBPS/text/c1.xhtml", "OEBPS/text/c2.xhtml"]);

        let issues = validate(&root, OPF_PATH).unwrap();
        assert_eq!(issues.nav_issues, vec![NavIssue::NoNavItem]);
        let fixes = repair(&root, OPF_PATH, &issues).unwrap();
        assert_eq!(
            fixes,
            vec![AppliedFix::SynthesizedNav {
                id: "nav".to_string(),
                href: "nav.xhtml".to_string(),
                entries: 2
            }]
        );

        let nav = fs::read_to_string(root.join("OEBPS/nav.xhtml")).unwrap();
        assert_eq!(nav.matches("<li>").count(), 2);
        assert!(nav.contains(r#"<a href="text/c1.xhtml">Chapter 1</a>"#));
        assert!(nav.contains(r#"<a href="text/c2.xhtml">Chapter 2</a>"#));
        assert!(nav.contains(r#"epub:type="toc""#));

        let package = load_package(&root, OPF_PATH).unwrap();
        let item = package.manifest_item("nav").unwrap();
        assert!(item.is_nav());
        assert_eq!(item.href, "nav.xhtml");
        assert_eq!(item.media_type, "application/xhtml+xml");

        assert!(validate(&root, OPF_PATH).unwrap().is_empty());
    }

    #[test]
    fn test_missing_nav_file_is_replaced() {
        let opf = opf(
            r#"<item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
<item id="c1" href="text/c1.xhtml" media-type="application/xhtml+xml"/>"#,
            r#"<itemref idref="c1"/>"#,
        );
        let (_dir, root) = setup(&opf, &["OEBPS/text/c1.xhtml"]);

        let issues = validate(&root, OPF_PATH).unwrap();
        repair(&root, OPF_PATH, &issues).unwrap();
        assert!(root.join("OEBPS/nav.xhtml").is_file());
        assert!(validate(&root, OPF_PATH).unwrap().is_empty());
    }

    #[test]
    fn test_nav_name_collision_uses_suffix() {
        let opf = opf(
            r#"<item id="nav" href="nav.xhtml" media-type="application/xhtml+xml"/>
<item id="c1" href="text/c1.xhtml" media-type="application/xhtml+xml"/>"#,
            r#"<itemref idref="c1"/>"#,
        );
        let (_dir, root) = setup(&opf, &["OEBPS/nav.xhtml", "OEBPS/text/c1.xhtml"]);

        let issues = validate(&root, OPF_PATH).unwrap();
        let fixes = repair(&root, OPF_PATH, &issues).unwrap();
        assert_eq!(
            fixes,
            vec![AppliedFix::SynthesizedNav {
                id: "nav-1".to_string(),
                href: "nav-1.xhtml".to_string(),
                entries: 1
            }]
        );
    }

    #[test]
    fn test_configured_nav_directory_relativizes_links() {
        let opf = opf(
            r#"<item id="c1" href="text/c1.xhtml" media-type="application/xhtml+xml"/>
<item id="c2" href="c2.xhtml" media-type="application/xhtml+xml"/>"#,
            r#"<itemref idref="c1"/><itemref idref="c2"/>"#,
        );
        let (_dir, root) = setup(&opf, &["OEBPS/text/c1.xhtml", "OEBPS/c2.xhtml"]);
        let nav = NavConfig {
            directory: "text".to_string(),
            file_stem: "toc".to_string(),
            manifest_id: "toc".to_string(),
        };

        let issues = validate(&root, OPF_PATH).unwrap();
        let fixes = repair_with(&root, OPF_PATH, &issues, &nav).unwrap();
        assert_eq!(
            fixes,
            vec![AppliedFix::SynthesizedNav {
                id: "toc".to_string(),
                href: "text/toc.xhtml".to_string(),
                entries: 2
            }]
        );

        // 链接相对于 OEBPS/text
        let content = fs::read_to_string(root.join("OEBPS/text/toc.xhtml")).unwrap();
        assert!(content.contains(r#"<a href="c1.xhtml">Chapter 1</a>"#));
        assert!(content.contains(r#"<a href="../c2.xhtml">Chapter 2</a>"#));
        assert!(validate(&root, OPF_PATH).unwrap().is_empty());
    }

    #[test]
    fn test_nav_outside_archive_root_fails_without_writing() {
        let opf = opf(
            r#"<item id="c1" href="text/c1.xhtml" media-type="application/xhtml+xml"/>"#,
            r#"<itemref idref="c1"/>"#,
        );
        let (_dir, root) = setup(&opf, &["OEBPS/text/c1.xhtml"]);
        let nav = NavConfig {
            directory: "../..".to_string(),
            ..NavConfig::default()
        };

        let issues = validate(&root, OPF_PATH).unwrap();
        let result = repair_with(&root, OPF_PATH, &issues, &nav);
        assert!(matches!(result, Err(EpubError::RepairFailed(_))));
        // OPF保持原样
        assert_eq!(fs::read_to_string(root.join(OPF_PATH)).unwrap(), opf);
    }

    #[test]
    fn test_repair_drops_dangling_refs_and_extra_nav() {
        let opf = opf(
            r#"<item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
<item id="nav2" href="toc.xhtml" media-type="application/xhtml+xml" properties="nav scripted"/>
<item id="c1" href="text/c1.xhtml" media-type="application/xhtml+xml" fallback="ghost"/>
<item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>"#,
            r#"<itemref idref="c1"/>"#,
        );
        let opf = opf.replace("<spine>", r#"<spine toc="ncx">"#);
        let (_dir, root) = setup(&opf, &["OEBPS/nav.xhtml", "OEBPS/toc.xhtml", "OEBPS/text/c1.xhtml"]);

        let issues = validate(&root, OPF_PATH).unwrap();
        let fixes = repair(&root, OPF_PATH, &issues).unwrap();
        assert!(fixes.contains(&AppliedFix::RemovedSpineToc {
            toc: "ncx".to_string()
        }));
        assert!(fixes.contains(&AppliedFix::DroppedNavProperty {
            id: "nav2".to_string()
        }));

        let package = load_package(&root, OPF_PATH).unwrap();
        assert_eq!(
            package.manifest_item("nav2").unwrap().properties.as_deref(),
            Some("scripted")
        );
        assert!(package.manifest_item("c1").unwrap().fallback.is_none());
        assert!(validate(&root, OPF_PATH).unwrap().is_empty());
    }

    #[test]
    fn test_no_fix_leaves_opf_untouched() {
        let opf = opf(
            r#"<item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>"#,
            "",
        );
        let (_dir, root) = setup(&opf, &["OEBPS/nav.xhtml"]);

        let issues = validate(&root, OPF_PATH).unwrap();
        assert_eq!(issues.spine_issues, vec![SpineIssue::EmptySpine]);
        let fixes = repair(&root, OPF_PATH, &issues).unwrap();
        assert!(fixes.is_empty());
        assert_eq!(fs::read_to_string(root.join(OPF_PATH)).unwrap(), opf);
    }

    #[test]
    fn test_nav_without_nav_element() {
        let opf = opf(
            r#"<item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
<item id="c1" href="c1.xhtml" media-type="application/xhtml+xml"/>"#,
            r#"<itemref idref="c1"/>"#,
        );
        let (_dir, root) = setup(&opf, &["OEBPS/c1.xhtml"]);
        fs::write(root.join("OEBPS/nav.xhtml"), "<html><body><ol/></body></html>").unwrap();

        let issues = validate(&root, OPF_PATH).unwrap();
        assert_eq!(
            issues.nav_issues,
            vec![NavIssue::NoTocElement {
                href: "nav.xhtml".to_string()
            }]
        );
    }

    #[test]
    fn test_malformed_opf_is_error() {
        let (_dir, root) = setup("<package><manifest></package>", &[]);
        assert!(matches!(
            validate(&root, OPF_PATH),
            Err(EpubError::MalformedXml(_))
        ));
    }
}
