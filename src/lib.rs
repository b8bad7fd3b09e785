pub mod epub;

// === 核心API重新导出 ===

/// 元数据嵌入器与预览引擎（主要接口）
pub use epub::{MetadataEmbedder, PreviewEngine};

/// 错误处理
pub use epub::{EpubError, Result};

/// 配置
pub use epub::{CoverConfig, EpubsmithConfig, NavConfig, NormalizeConfig};

// === 数据结构 ===

/// 最终元数据与封面来源
pub use epub::{CoverSource, FinalMetadata};

/// 嵌入与预览结果
pub use epub::{BatchOutcome, EmbedJob, EmbedReport, PreviewResult};

/// 结构校验结果
pub use epub::{AppliedFix, BrokenRef, MissingFile, NavIssue, SpineIssue, ValidationIssues};

/// 归档目录
pub use epub::{ArchiveCatalog, ArchiveEntry, EntryKind, inspect};

// === 底层组件（高级用法） ===

/// 容器组件
pub use epub::{Container, RootFile};

/// OPF组件
pub use epub::{EmbeddedCover, ManifestItem, OpfFacts, PackageDocument, SpineItem};

/// 差异工具
pub use epub::{DiffStats, OpfChangeSummary, side_by_side, unified_diff};

// === 库信息 ===

/// epubsmith库的版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// epubsmith库的描述
pub const DESCRIPTION: &str = "在EPUB容器内安全改写书目元数据的工具库";

// === 便捷函数 ===

/// 使用默认配置预览一次嵌入
///
/// 这是 `PreviewEngine::preview` 的便捷包装函数，不会修改原文件。
///
/// # 示例
///
/// ```no_run
/// let metadata = epubsmith::FinalMetadata::new().with_title("新书名");
/// let result = epubsmith::preview("book.epub", &metadata);
/// println!("{}", result.unified_diff("content.opf"));
/// ```
pub fn preview<P: AsRef<std::path::Path>>(path: P, metadata: &FinalMetadata) -> PreviewResult {
    PreviewEngine::default().preview(path, metadata)
}

/// 使用默认配置嵌入元数据
///
/// # 示例
///
/// ```no_run
/// let metadata = epubsmith::FinalMetadata::new().with_author("作者");
/// let report = epubsmith::embed("book.epub", &metadata)?;
/// println!("备份: {}", report.backup_path.display());
/// # Ok::<(), epubsmith::EpubError>(())
/// ```
pub fn embed<P: AsRef<std::path::Path>>(path: P, metadata: &FinalMetadata) -> Result<EmbedReport> {
    MetadataEmbedder::default().embed(path, metadata)
}
