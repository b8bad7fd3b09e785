//! 孤立图片检测模块
//!
//! 孤立图片指解压目录中存在、但没有任何清单项引用的图片文件。

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::epub::archive;
use crate::epub::error::Result;
use crate::epub::inspector::EntryKind;
use crate::epub::opf::PackageDocument;
use crate::epub::paths;

/// 查找孤立图片
///
/// # 参数
/// * `root` - 解压根目录
/// * `package` - 用于确定引用集合的包文档
///
/// # 返回值
/// * `Result<Vec<String>>` - 按路径排序的孤立图片归档路径
pub fn find_orphans(root: &Path, package: &PackageDocument) -> Result<Vec<String>> {
    let referenced: HashSet<String> = package
        .manifest_items()
        .iter()
        .filter_map(|item| package.resolve_item_path(item))
        .collect();

    let orphans: Vec<String> = archive::list_files_sorted(root)?
        .into_iter()
        .filter(|path| EntryKind::classify(path).is_image())
        .filter(|path| !referenced.contains(path))
        .collect();

    for orphan in &orphans {
        tracing::debug!("孤立图片: {}", orphan);
    }
    Ok(orphans)
}

/// 删除孤立图片，返回删除的文件数
pub fn remove_orphans(root: &Path, orphans: &[String]) -> Result<usize> {
    for orphan in orphans {
        fs::remove_file(paths::to_fs_path(root, orphan))?;
    }
    Ok(orphans.len())
}
