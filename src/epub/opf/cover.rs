//! 封面嵌入模块

use std::fs;
use std::path::Path;

use crate::epub::config::CoverConfig;
use crate::epub::error::{EpubError, Result};
use crate::epub::opf::manifest::{add_property, remove_property};
use crate::epub::opf::{CoverSource, PackageDocument};
use crate::epub::paths;
use crate::epub::xml::{Element, Node};

const COVER_IMAGE_PROPERTY: &str = "cover-image";

/// 已嵌入封面的位置信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedCover {
    /// 归档内路径，如 `OEBPS/images/cover.jpg`
    pub archive_path: String,
    /// 相对于OPF目录的href
    pub href: String,
    pub media_type: String,
}

/// 根据扩展名推断图片媒体类型，未知扩展名按jpeg处理
pub fn media_type_for_extension(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        _ => "image/jpeg",
    }
}

/// 将封面写入解压目录并更新OPF
///
/// # 参数
/// * `package` - 包文档
/// * `root` - 解压根目录
/// * `cover` - 封面来源
/// * `config` - 封面位置与清单ID
///
/// # 返回值
/// * `Result<(PackageDocument, EmbeddedCover)>` - 更新后的文档与封面位置
pub fn embed_cover(
    mut package: PackageDocument,
    root: &Path,
    cover: &CoverSource,
    config: &CoverConfig,
) -> Result<(PackageDocument, EmbeddedCover)> {
    let extension = cover.extension();
    let media_type = media_type_for_extension(&extension);
    let href = config.href_for(&extension);
    let archive_path = paths::resolve_href(package.base_dir(), &href)
        .ok_or_else(|| EpubError::InvalidEpub(format!("封面路径无效: {}", href)))?;

    let data = cover.read_bytes()?;
    let target = paths::to_fs_path(root, &archive_path);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&target, &data)?;
    tracing::debug!("封面已写入 {} ({} 字节)", archive_path, data.len());

    update_manifest(&mut package, &archive_path, &href, media_type, config);
    update_cover_meta(&mut package, &config.manifest_id);

    Ok((
        package,
        EmbeddedCover {
            archive_path,
            href,
            media_type: media_type.to_string(),
        },
    ))
}

fn update_manifest(
    package: &mut PackageDocument,
    archive_path: &str,
    href: &str,
    media_type: &str,
    config: &CoverConfig,
) {
    let epub3 = package.is_epub3();
    let base_dir = package.base_dir().to_string();
    package.ensure_manifest();
    let Some(manifest) = package.manifest_mut() else {
        return;
    };
    let id = config.manifest_id.as_str();

    // 同一文件只保留一个清单项
    manifest.remove_children(|item| {
        item.local_name() == "item"
            && item.attr("id") != Some(id)
            && item
                .attr("href")
                .and_then(|h| paths::resolve_href(&base_dir, h))
                .is_some_and(|p| p == archive_path)
    });

    if epub3 {
        for item in manifest
            .child_elements_mut()
            .filter(|e| e.local_name() == "item" && e.attr("id") != Some(id))
        {
            let Some(properties) = item.attr("properties").map(str::to_string) else {
                continue;
            };
            match remove_property(&properties, COVER_IMAGE_PROPERTY) {
                Some(rest) => item.set_attr("properties", rest),
                None => {
                    item.remove_attr("properties");
                }
            }
        }
    }

    let is_cover_item = |e: &Element| e.local_name() == "item" && e.attr("id") == Some(id);
    if !manifest.child_elements().any(is_cover_item) {
        let name = PackageDocument::child_name(manifest, "item");
        manifest.push_child(Element::new(name).with_attr("id", id));
    }
    if let Some(item) = manifest.child_elements_mut().find(|e| is_cover_item(e)) {
        item.set_attr("href", href);
        item.set_attr("media-type", media_type);
        if epub3 {
            let properties = add_property(item.attr("properties"), COVER_IMAGE_PROPERTY);
            item.set_attr("properties", properties);
        }
    }
}

/// 写入 `<meta name="cover">`，放在最后一个meta或dc元素之后，
/// 避免落到 `<link>` 等其他元素后面
fn update_cover_meta(package: &mut PackageDocument, manifest_id: &str) {
    package.ensure_metadata();
    let scope = package.metadata_scope();
    let Some(metadata) = package.metadata_mut() else {
        return;
    };
    let removed = metadata
        .remove_children(|e| e.local_name() == "meta" && e.attr("name") == Some("cover"));
    if removed > 0 {
        tracing::debug!("替换了 {} 个旧的封面meta", removed);
    }

    let position = metadata
        .children
        .iter()
        .rposition(|node| match node {
            Node::Element(e) => e.local_name() == "meta" || PackageDocument::is_dublin_core(&scope, e),
            _ => false,
        })
        .map_or(0, |index| index + 1);
    let name = PackageDocument::child_name(metadata, "meta");
    let meta = Element::new(name)
        .with_attr("name", "cover")
        .with_attr("content", manifest_id);
    metadata.children.insert(position, Node::Element(meta));
}
