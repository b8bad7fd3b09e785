//! 归档检查模块
//!
//! 只读地打开归档，为每个条目分类，并读取OPF原文。不写磁盘，
//! 每次调用独立打开文件句柄，可在多个线程中对同一路径并发调用。

use std::path::Path;

use serde::Serialize;

use crate::epub::archive::ArchiveReader;
use crate::epub::container::{self, CONTAINER_PATH};
use crate::epub::error::Result;
use crate::epub::opf::PackageDocument;
use crate::epub::paths;

/// 条目分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    OpfPackage,
    ContentDocument,
    Image,
    Stylesheet,
    Font,
    NavigationDocument,
    Other,
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "svg", "webp", "bmp"];
const FONT_EXTENSIONS: &[&str] = &["ttf", "otf", "woff", "woff2", "eot"];

impl EntryKind {
    /// 按扩展名与路径对条目分类
    pub fn classify(path: &str) -> EntryKind {
        let file_name = path.rsplit('/').next().unwrap_or(path).to_ascii_lowercase();
        let extension = match file_name.rsplit_once('.') {
            Some((_, ext)) => ext,
            None => return EntryKind::Other,
        };

        match extension {
            "opf" => EntryKind::OpfPackage,
            "ncx" => EntryKind::NavigationDocument,
            "xhtml" | "html" | "htm" | "xml" if file_name != "container.xml" => {
                EntryKind::ContentDocument
            }
            "css" => EntryKind::Stylesheet,
            ext if IMAGE_EXTENSIONS.contains(&ext) => EntryKind::Image,
            ext if FONT_EXTENSIONS.contains(&ext) => EntryKind::Font,
            _ => EntryKind::Other,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, EntryKind::Image)
    }
}

/// 归档中的一个文件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveEntry {
    /// POSIX风格路径，在同一归档内唯一
    pub path: String,
    /// 解压后大小
    pub size: u64,
    /// 分类
    pub kind: EntryKind,
}

/// 归档目录
#[derive(Debug, Clone, Default)]
pub struct ArchiveCatalog {
    /// 所有非目录条目，保持归档内顺序
    pub entries: Vec<ArchiveEntry>,
    /// OPF路径，没有找到时为 `None`（是否致命由调用方决定）
    pub opf_path: Option<String>,
    /// OPF原文
    pub opf_text: Option<String>,
}

impl ArchiveCatalog {
    /// 按分类筛选条目
    pub fn entries_of(&self, kind: EntryKind) -> impl Iterator<Item = &ArchiveEntry> {
        self.entries.iter().filter(move |e| e.kind == kind)
    }

    /// 查找条目
    pub fn find(&self, path: &str) -> Option<&ArchiveEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    /// 条目路径列表
    pub fn paths(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.path.clone()).collect()
    }
}

/// 检查归档并生成目录
///
/// # 参数
/// * `archive_path` - EPUB文件路径
///
/// # 返回值
/// * `Result<ArchiveCatalog>` - 条目目录；没有OPF时 `opf_path` 为 `None`
pub fn inspect<P: AsRef<Path>>(archive_path: P) -> Result<ArchiveCatalog> {
    let archive_path = archive_path.as_ref();
    let mut reader = ArchiveReader::open(archive_path)?;

    let mut entries: Vec<ArchiveEntry> = reader
        .list_entries()?
        .into_iter()
        .map(|raw| {
            let kind = EntryKind::classify(&raw.path);
            ArchiveEntry {
                path: raw.path,
                size: raw.size,
                kind,
            }
        })
        .collect();

    let all_paths: Vec<String> = entries.iter().map(|e| e.path.clone()).collect();
    let container_xml = reader.read_entry_text(CONTAINER_PATH)?;
    let opf_path = container::select_opf(&all_paths, container_xml.as_deref()).map(str::to_string);

    let opf_text = match &opf_path {
        Some(path) => reader.read_entry_text(path)?,
        None => None,
    };

    if let (Some(path), Some(text)) = (&opf_path, &opf_text) {
        mark_navigation_document(&mut entries, path, text);
    }

    tracing::debug!(
        "检查完成: {} 个条目, OPF: {:?}",
        entries.len(),
        opf_path
    );

    Ok(ArchiveCatalog {
        entries,
        opf_path,
        opf_text,
    })
}

/// 将清单中声明为nav的文件标记为导航文档
fn mark_navigation_document(entries: &mut [ArchiveEntry], opf_path: &str, opf_text: &str) {
    let package = match PackageDocument::parse(opf_path, opf_text) {
        Ok(package) => package,
        Err(e) => {
            tracing::debug!("OPF无法解析，跳过导航文档识别: {}", e);
            return;
        }
    };
    let Some(nav) = package.nav_items().into_iter().next() else {
        return;
    };
    let Some(nav_path) = paths::resolve_href(package.base_dir(), &nav.href) else {
        return;
    };
    if let Some(entry) = entries.iter_mut().find(|e| e.path == nav_path) {
        entry.kind = EntryKind::NavigationDocument;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use zip::ZipWriter;
    use zip::write::FileOptions;

    fn create_test_epub(path: &Path, with_opf: bool) {
        let file = File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        let mut add = |name: &str, content: &str| {
            zip.start_file(name, FileOptions::<()>::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        };

        add("mimetype", "application/epub+zip");
        add(
            "META-INF/container.xml",
            r#"<container><rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles></container>"#,
        );
        if with_opf {
            add(
                "OEBPS/content.opf",
                r#"<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
<metadata/>
<manifest>
<item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
<item id="c1" href="text/c1.xhtml" media-type="application/xhtml+xml"/>
</manifest>
<spine><itemref idref="c1"/></spine>
</package>"#,
            );
        }
        add("OEBPS/nav.xhtml", "<html/>");
        add("OEBPS/text/c1.xhtml", "<html/>");
        add("OEBPS/images/cover.JPG", "jpg");
        add("OEBPS/styles/main.css", "body{}");
        add("OEBPS/fonts/serif.otf", "otf");
        add("OEBPS/toc.ncx", "<ncx/>");
        zip.finish().unwrap();
    }

    #[test]
    fn test_classify_by_extension() {
        assert_eq!(EntryKind::classify("OEBPS/content.opf"), EntryKind::OpfPackage);
        assert_eq!(EntryKind::classify("OEBPS/text/a.xhtml"), EntryKind::ContentDocument);
        assert_eq!(EntryKind::classify("META-INF/container.xml"), EntryKind::Other);
        assert_eq!(EntryKind::classify("OEBPS/toc.ncx"), EntryKind::NavigationDocument);
        assert_eq!(EntryKind::classify("img/Cover.PNG"), EntryKind::Image);
        assert_eq!(EntryKind::classify("style.css"), EntryKind::Stylesheet);
        assert_eq!(EntryKind::classify("f.woff2"), EntryKind::Font);
        assert_eq!(EntryKind::classify("mimetype"), EntryKind::Other);
    }

    #[test]
    fn test_inspect_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.epub");
        create_test_epub(&path, true);

        let catalog = inspect(&path).unwrap();
        assert_eq!(catalog.entries.len(), 9);
        assert_eq!(catalog.opf_path.as_deref(), Some("OEBPS/content.opf"));
        assert!(catalog.opf_text.as_deref().unwrap().contains("<manifest>"));

        assert_eq!(
            catalog.find("OEBPS/nav.xhtml").map(|e| e.kind),
            Some(EntryKind::NavigationDocument)
        );
        assert_eq!(catalog.entries_of(EntryKind::Image).count(), 1);
        assert_eq!(catalog.entries_of(EntryKind::Font).count(), 1);
        assert_eq!(catalog.find("mimetype").map(|e| e.size), Some(20));
    }

    #[test]
    fn test_inspect_without_opf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-opf.epub");
        create_test_epub(&path, false);

        let catalog = inspect(&path).unwrap();
        assert!(catalog.opf_path.is_none());
        assert!(catalog.opf_text.is_none());
        assert_eq!(catalog.entries.len(), 8);
    }

    #[test]
    fn test_concurrent_inspect_same_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.epub");
        create_test_epub(&path, true);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let path = path.clone();
                std::thread::spawn(move || inspect(&path).map(|c| c.entries.len()))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), 9);
        }
    }
}
