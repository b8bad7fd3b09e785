pub mod archive;
pub mod config;
pub mod container;
pub mod diff;
pub mod embed;
pub mod error;
pub mod inspector;
pub mod opf;
pub mod orphans;
pub mod paths;
pub mod preview;
pub mod structure;
pub mod xml;

// 重新导出错误处理
pub use error::{EpubError, Result};

// 重新导出配置
pub use config::{CoverConfig, EpubsmithConfig, NavConfig, NormalizeConfig};

// 重新导出容器相关
pub use container::{Container, RootFile};

// 重新导出归档检查
pub use archive::ArchiveReader;
pub use inspector::{ArchiveCatalog, ArchiveEntry, EntryKind, inspect};

// 重新导出OPF相关
pub use opf::{CoverSource, EmbeddedCover, FinalMetadata, ManifestItem, OpfFacts, PackageDocument, SpineItem};

// 重新导出结构校验
pub use structure::{AppliedFix, BrokenRef, MissingFile, NavIssue, SpineIssue, ValidationIssues};

// 重新导出嵌入与预览
pub use embed::{BatchOutcome, EmbedJob, EmbedReport, MetadataEmbedder};
pub use preview::{PreviewEngine, PreviewResult};

// 重新导出差异工具
pub use diff::{DiffStats, OpfChangeSummary, side_by_side, unified_diff};
