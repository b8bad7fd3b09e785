//! 路径解析模块
//!
//! 清单中的href相对于OPF所在目录，可能带有百分号编码和片段标识。
//! 这里统一把它们解析成归档内的POSIX路径，再映射到解压目录下的文件系统路径。

use percent_encoding::percent_decode_str;
use std::path::{Path, PathBuf};

/// 获取归档内路径的父目录（POSIX风格，根目录返回空串）
pub fn parent_dir(archive_path: &str) -> &str {
    match archive_path.rfind('/') {
        Some(index) => &archive_path[..index],
        None => "",
    }
}

/// 是否为远程资源引用
pub fn is_remote(href: &str) -> bool {
    let lower = href.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// 将href解析为归档内的规范化POSIX路径
///
/// 去掉片段与查询部分、进行百分号解码、折叠 `.` 与 `..`。
/// 解析结果越过归档根目录时返回 `None`。
pub fn resolve_href(base_dir: &str, href: &str) -> Option<String> {
    let href = href.split(['#', '?']).next().unwrap_or_default();
    if href.is_empty() {
        return None;
    }
    let decoded = percent_decode_str(href).decode_utf8_lossy();

    let mut parts: Vec<&str> = if decoded.starts_with('/') {
        Vec::new()
    } else {
        base_dir.split('/').filter(|s| !s.is_empty()).collect()
    };
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// 将归档内路径映射到解压根目录下
pub fn to_fs_path(root: &Path, archive_path: &str) -> PathBuf {
    archive_path
        .split('/')
        .filter(|s| !s.is_empty())
        .fold(root.to_path_buf(), |path, segment| path.join(segment))
}

/// 将解压目录下的文件路径转换为归档内POSIX路径
pub fn to_archive_path(root: &Path, fs_path: &Path) -> Option<String> {
    let relative = fs_path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// 计算从 `from_dir` 指向 `target` 的相对href（均为归档内路径）
pub fn relative_href(from_dir: &str, target: &str) -> String {
    let from: Vec<&str> = from_dir.split('/').filter(|s| !s.is_empty()).collect();
    let to: Vec<&str> = target.split('/').filter(|s| !s.is_empty()).collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut segments: Vec<&str> = vec![".."; from.len() - common];
    segments.extend(&to[common..]);
    segments.join("/")
}
