//! 预览模块
//!
//! 在一次性的临时副本上运行与真实嵌入相同的转换流程（不备份、不重新打包），
//! 报告将要新增、修改、删除的文件以及改写前后的OPF。预览从不向调用方返回错误：
//! 任何内部失败都降级为“不会有任何改动”的结果。

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::epub::archive;
use crate::epub::config::EpubsmithConfig;
use crate::epub::diff::{self, OpfChangeSummary};
use crate::epub::embed::MetadataEmbedder;
use crate::epub::error::Result;
use crate::epub::inspector;
use crate::epub::opf::FinalMetadata;
use crate::epub::orphans;
use crate::epub::paths;
use crate::epub::structure::AppliedFix;

/// 预览结果
///
/// 所有路径都是归档内路径，不指向真实文件所在目录。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreviewResult {
    pub original_opf: String,
    pub modified_opf: String,
    pub files_to_add: Vec<String>,
    pub files_to_modify: Vec<String>,
    /// 孤立图片
    pub files_to_remove: Vec<String>,
    pub embedded_cover_path: Option<String>,
    pub fixes: Vec<AppliedFix>,
}

impl PreviewResult {
    /// “不会有任何改动”的结果
    pub fn unchanged(original_opf: String) -> Self {
        Self {
            modified_opf: original_opf.clone(),
            original_opf,
            ..Default::default()
        }
    }

    pub fn has_changes(&self) -> bool {
        self.original_opf != self.modified_opf
            || !self.files_to_add.is_empty()
            || !self.files_to_modify.is_empty()
            || !self.files_to_remove.is_empty()
    }

    /// OPF的统一差异文本
    pub fn unified_diff(&self, label: &str) -> String {
        diff::unified_diff(&self.original_opf, &self.modified_opf, label)
    }

    /// OPF的变更摘要
    pub fn change_summary(&self) -> OpfChangeSummary {
        diff::opf_change_summary(&self.original_opf, &self.modified_opf)
    }
}

/// 预览引擎
#[derive(Debug, Clone, Default)]
pub struct PreviewEngine {
    embedder: MetadataEmbedder,
}

impl PreviewEngine {
    pub fn new(config: EpubsmithConfig) -> Self {
        Self {
            embedder: MetadataEmbedder::new(config),
        }
    }

    /// 模拟嵌入并返回前后对比
    ///
    /// # 参数
    /// * `archive_path` - EPUB文件路径，只读
    /// * `metadata` - 最终元数据（可包含封面）
    ///
    /// # 返回值
    /// * `PreviewResult` - 失败时为 `PreviewResult::unchanged`
    pub fn preview<P: AsRef<Path>>(&self, archive_path: P, metadata: &FinalMetadata) -> PreviewResult {
        let archive_path = archive_path.as_ref();
        let original_opf = match inspector::inspect(archive_path) {
            Ok(catalog) => catalog.opf_text.unwrap_or_default(),
            Err(e) => {
                tracing::warn!("预览失败，无法检查归档 {}: {}", archive_path.display(), e);
                return PreviewResult::unchanged(String::new());
            }
        };

        match self.simulate(archive_path, metadata, &original_opf) {
            Ok(result) => {
                tracing::info!(
                    "预览完成: 新增 {} 个文件, 孤立图片 {} 个",
                    result.files_to_add.len(),
                    result.files_to_remove.len()
                );
                result
            }
            Err(e) => {
                tracing::warn!("预览失败，按无改动处理: {}", e);
                PreviewResult::unchanged(original_opf)
            }
        }
    }

    fn simulate(&self, archive_path: &Path, metadata: &FinalMetadata, original_opf: &str) -> Result<PreviewResult> {
        let scratch = self.embedder.extract(archive_path)?;
        let root = scratch.path();

        let before: BTreeSet<String> = archive::list_files_sorted(root)?.into_iter().collect();
        let opf_path = MetadataEmbedder::locate_opf(root)?;
        let outcome = self.embedder.transform(root, &opf_path, metadata)?;
        let after: BTreeSet<String> = archive::list_files_sorted(root)?.into_iter().collect();

        let files_to_add: Vec<String> = after.difference(&before).cloned().collect();
        let mut files_to_modify = vec![opf_path.clone()];
        let embedded_cover_path = outcome.cover.map(|cover| cover.archive_path);
        if let Some(cover) = &embedded_cover_path {
            if before.contains(cover) {
                files_to_modify.push(cover.clone());
            }
        }

        let files_to_remove = orphans::find_orphans(root, &outcome.package)?;
        let modified_opf = fs::read_to_string(paths::to_fs_path(root, &opf_path))?;

        Ok(PreviewResult {
            original_opf: original_opf.to_string(),
            modified_opf,
            files_to_add,
            files_to_modify,
            files_to_remove,
            embedded_cover_path,
            fixes: outcome.fixes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::opf::CoverSource;
    use std::fs::File;
    use std::io::Write;
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    const OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>旧书名</dc:title>
  </metadata>
  <manifest>
    <item id="c1" href="c1.xhtml" media-type="application/xhtml+xml"/>
    <item id="cover" href="images/cover.jpg" media-type="image/jpeg"/>
  </manifest>
  <spine>
    <itemref idref="c1"/>
  </spine>
</package>
"#;

    fn sample_epub(path: &Path) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        for (name, content) in [
            ("mimetype", "application/epub+zip"),
            ("OEBPS/content.opf", OPF),
            ("OEBPS/c1.xhtml", "<html/>"),
            ("OEBPS/images/cover.jpg", "old cover"),
            ("OEBPS/images/old1.jpg", "old"),
        ] {
            zip.start_file(name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_preview_reports_changes_without_touching_original() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.epub");
        sample_epub(&path);
        let original = fs::read(&path).unwrap();

        let metadata = FinalMetadata::new()
            .with_title("新书名")
            .with_cover(CoverSource::Bytes {
                data: b"new cover".to_vec(),
                extension: "png".to_string(),
            });
        let result = PreviewEngine::default().preview(&path, &metadata);

        assert_eq!(result.original_opf, OPF);
        assert!(result.modified_opf.contains("新书名"));
        assert_eq!(
            result.files_to_add,
            vec!["OEBPS/images/cover.png", "OEBPS/nav.xhtml"]
        );
        assert_eq!(result.files_to_modify, vec!["OEBPS/content.opf"]);
        assert_eq!(result.files_to_remove, vec!["OEBPS/images/old1.jpg"]);
        assert_eq!(result.embedded_cover_path.as_deref(), Some("OEBPS/images/cover.png"));
        assert!(result.has_changes());
        assert!(result.change_summary().title_changed);
        assert!(result.unified_diff("content.opf").contains("+    <dc:title>新书名</dc:title>"));

        assert_eq!(fs::read(&path).unwrap(), original);
        assert!(!dir.path().join("book.epub.bak").exists());
    }

    #[test]
    fn test_preview_failure_degrades_to_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.epub");
        let mut zip = ZipWriter::new(File::create(&path).unwrap());
        zip.start_file("content.opf", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"<package><metadata></package>").unwrap();
        zip.finish().unwrap();

        let result = PreviewEngine::default().preview(&path, &FinalMetadata::new().with_title("T"));
        assert_eq!(result, PreviewResult::unchanged("<package><metadata></package>".to_string()));
        assert!(!result.has_changes());

        let missing = PreviewEngine::default().preview(dir.path().join("nope.epub"), &FinalMetadata::new());
        assert_eq!(missing, PreviewResult::default());
    }
}
