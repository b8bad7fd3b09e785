//! 元数据嵌入模块
//!
//! `MetadataEmbedder` 编排完整的嵌入流程：解压、定位OPF、重写元数据、规范化、
//! 嵌入封面、校验与修复、备份、重新打包。这是唯一会修改真实文件的组件；
//! 备份在重新打包开始之前完成，重新打包先写临时文件再原子替换。

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tempfile::TempDir;

use crate::epub::archive::{self, ArchiveReader};
use crate::epub::config::EpubsmithConfig;
use crate::epub::container::{self, CONTAINER_PATH};
use crate::epub::error::{EpubError, Result};
use crate::epub::opf::{self, EmbeddedCover, FinalMetadata, PackageDocument};
use crate::epub::orphans;
use crate::epub::paths;
use crate::epub::structure::{self, AppliedFix};

/// 转换阶段（重写到修复）的结果
#[derive(Debug, Clone)]
pub struct TransformOutcome {
    /// 修复后的包文档，与落盘的OPF一致
    pub package: PackageDocument,
    pub cover: Option<EmbeddedCover>,
    pub fixes: Vec<AppliedFix>,
    /// 校验本身失败时的错误信息，此时跳过修复
    pub validation_error: Option<String>,
}

/// 一次嵌入的报告
#[derive(Debug, Clone, Serialize)]
pub struct EmbedReport {
    pub backup_path: PathBuf,
    pub opf_path: String,
    pub fixes: Vec<AppliedFix>,
    pub removed_images: Vec<String>,
    pub cover_path: Option<String>,
    pub validation_error: Option<String>,
}

/// 批量嵌入的单个任务
#[derive(Debug, Clone)]
pub struct EmbedJob {
    pub path: PathBuf,
    pub metadata: FinalMetadata,
}

/// 批量嵌入中单个任务的结果
#[derive(Debug)]
pub enum BatchOutcome {
    Done(EmbedReport),
    Failed(EpubError),
    /// 取消标志置位后未处理的任务
    Skipped,
}

/// 元数据嵌入器
#[derive(Debug, Clone, Default)]
pub struct MetadataEmbedder {
    config: EpubsmithConfig,
}

impl MetadataEmbedder {
    pub fn new(config: EpubsmithConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EpubsmithConfig {
        &self.config
    }

    /// 设置是否在重新打包前删除孤立图片
    pub fn with_remove_unused_images(mut self, remove: bool) -> Self {
        self.config.remove_unused_images = remove;
        self
    }

    /// 将归档解压到唯一命名的临时目录，目录随返回值释放而删除
    pub fn extract(&self, archive_path: &Path) -> Result<TempDir> {
        let scratch = tempfile::Builder::new()
            .prefix(&self.config.scratch_prefix)
            .tempdir()?;
        let count = ArchiveReader::open(archive_path)?.extract_to(scratch.path())?;
        tracing::info!("已解压 {} 个文件到 {}", count, scratch.path().display());
        Ok(scratch)
    }

    /// 在解压目录中定位OPF
    ///
    /// 优先使用container.xml声明的rootfile，否则取排序后第一个 `.opf` 文件。
    pub fn locate_opf(root: &Path) -> Result<String> {
        let files = archive::list_files_sorted(root)?;
        let container_file = paths::to_fs_path(root, CONTAINER_PATH);
        let container_xml = if container_file.is_file() {
            Some(fs::read_to_string(&container_file)?)
        } else {
            None
        };
        container::select_opf(&files, container_xml.as_deref())
            .map(str::to_string)
            .ok_or(EpubError::MissingOpf)
    }

    /// 在解压目录上执行重写、规范化、封面嵌入、校验与修复
    ///
    /// 预览与真实嵌入共用此方法，保证两者生成的OPF完全一致。
    pub fn transform(
        &self,
        root: &Path,
        opf_path: &str,
        metadata: &FinalMetadata,
    ) -> Result<TransformOutcome> {
        let package = structure::load_package(root, opf_path)?;
        let package = opf::rewrite_metadata(package, metadata);
        let package = opf::normalize(package, &self.config.normalize);

        let (package, cover) = match &metadata.cover {
            Some(source) => {
                let (package, cover) = opf::embed_cover(package, root, source, &self.config.cover)?;
                (package, Some(cover))
            }
            None => (package, None),
        };
        structure::write_package(root, &package)?;

        let (fixes, validation_error) = match structure::validate(root, opf_path) {
            Ok(issues) => {
                if !issues.is_empty() {
                    tracing::warn!("发现 {} 个结构问题，尝试自动修复", issues.len());
                }
                let fixes = structure::repair_with(root, opf_path, &issues, &self.config.nav)
                    .map_err(|e| match e {
                        EpubError::RepairFailed(_) => e,
                        other => EpubError::RepairFailed(other.to_string()),
                    })?;
                (fixes, None)
            }
            Err(e) => {
                tracing::warn!("结构校验失败，跳过修复: {}", e);
                (Vec::new(), Some(e.to_string()))
            }
        };

        let package = if fixes.is_empty() {
            package
        } else {
            structure::load_package(root, opf_path)?
        };

        Ok(TransformOutcome {
            package,
            cover,
            fixes,
            validation_error,
        })
    }

    /// 将原文件复制为 `<name>.epub.bak` 并落盘
    pub fn backup(&self, archive_path: &Path) -> Result<PathBuf> {
        let backup_path = self.config.backup_path_for(archive_path);
        fs::copy(archive_path, &backup_path)?;
        File::open(&backup_path)?.sync_all()?;
        tracing::info!("备份已写入 {}", backup_path.display());
        Ok(backup_path)
    }

    /// 将最终元数据嵌入EPUB文件
    ///
    /// # 参数
    /// * `archive_path` - EPUB文件路径，成功后被原地替换
    /// * `metadata` - 最终元数据（可包含封面）
    ///
    /// # 返回值
    /// * `Result<EmbedReport>` - 嵌入报告；失败时原文件保持不变
    pub fn embed<P: AsRef<Path>>(&self, archive_path: P, metadata: &FinalMetadata) -> Result<EmbedReport> {
        let archive_path = archive_path.as_ref();
        tracing::info!("开始嵌入元数据: {}", archive_path.display());

        let scratch = self.extract(archive_path)?;
        let root = scratch.path();
        let opf_path = Self::locate_opf(root)?;
        let outcome = self.transform(root, &opf_path, metadata)?;

        let removed_images = if self.config.remove_unused_images {
            let orphans = orphans::find_orphans(root, &outcome.package)?;
            orphans::remove_orphans(root, &orphans)?;
            if !orphans.is_empty() {
                tracing::info!("删除了 {} 个孤立图片", orphans.len());
            }
            orphans
        } else {
            Vec::new()
        };

        let backup_path = self.backup(archive_path)?;
        archive::repack_atomic(root, archive_path)?;
        tracing::info!("重新打包完成: {}", archive_path.display());

        Ok(EmbedReport {
            backup_path,
            opf_path,
            fixes: outcome.fixes,
            removed_images,
            cover_path: outcome.cover.map(|c| c.archive_path),
            validation_error: outcome.validation_error,
        })
    }

    /// 依次处理多个嵌入任务，每个文件之间检查取消标志
    pub fn embed_batch(&self, jobs: &[EmbedJob], cancel: &AtomicBool) -> Vec<BatchOutcome> {
        jobs.iter()
            .map(|job| {
                if cancel.load(Ordering::SeqCst) {
                    return BatchOutcome::Skipped;
                }
                match self.embed(&job.path, &job.metadata) {
                    Ok(report) => BatchOutcome::Done(report),
                    Err(e) => {
                        tracing::warn!("嵌入失败 {}: {}", job.path.display(), e);
                        BatchOutcome::Failed(e)
                    }
                }
            })
            .collect()
    }
}
