//! 归档读写模块
//!
//! `ArchiveReader` 是归档格式的封闭变体集合，目前只有Zip一种；调用方只依赖
//! `list_entries` / `read_entry` / `extract_to` 这组能力。写入侧的 `repack`
//! 以确定性的方式重新打包解压目录：mimetype最先且不压缩，其余条目按路径排序，
//! 时间戳与权限固定，使相同输入得到字节一致的归档。

use std::fs::{self, File};
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::epub::error::{EpubError, Result};
use crate::epub::paths;

/// EPUB的mimetype条目名
pub const MIMETYPE_ENTRY: &str = "mimetype";

/// EPUB的mimetype内容
pub const EPUB_MIMETYPE: &str = "application/epub+zip";

/// 归档中的原始条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    /// 归档内路径
    pub path: String,
    /// 解压后大小
    pub size: u64,
}

/// 支持的归档格式
pub enum ArchiveReader {
    Zip(ZipArchive<File>),
}

impl ArchiveReader {
    /// 打开归档文件
    pub fn open<P: AsRef<Path>>(path: P) -> Result<ArchiveReader> {
        let file = File::open(path)?;
        Ok(ArchiveReader::Zip(ZipArchive::new(file)?))
    }

    /// 列出所有非目录条目，保持归档内顺序
    pub fn list_entries(&mut self) -> Result<Vec<RawEntry>> {
        match self {
            ArchiveReader::Zip(archive) => {
                let mut entries = Vec::with_capacity(archive.len());
                for i in 0..archive.len() {
                    let file = archive.by_index(i)?;
                    if file.is_dir() {
                        continue;
                    }
                    entries.push(RawEntry {
                        path: file.name().to_string(),
                        size: file.size(),
                    });
                }
                Ok(entries)
            }
        }
    }

    /// 读取条目的二进制内容，条目不存在时返回 `None`
    pub fn read_entry(&mut self, path: &str) -> Result<Option<Vec<u8>>> {
        match self {
            ArchiveReader::Zip(archive) => match archive.by_name(path) {
                Ok(mut file) => {
                    let mut buffer = Vec::new();
                    file.read_to_end(&mut buffer)?;
                    Ok(Some(buffer))
                }
                Err(zip::result::ZipError::FileNotFound) => Ok(None),
                Err(e) => Err(e.into()),
            },
        }
    }

    /// 读取条目的文本内容
    pub fn read_entry_text(&mut self, path: &str) -> Result<Option<String>> {
        match self.read_entry(path)? {
            Some(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            None => Ok(None),
        }
    }

    /// 将所有条目解压到目标目录
    ///
    /// 越过目标目录的条目路径（zip-slip）会被跳过。
    pub fn extract_to(&mut self, dest: &Path) -> Result<usize> {
        match self {
            ArchiveReader::Zip(archive) => {
                let mut written = 0;
                for i in 0..archive.len() {
                    let mut file = archive.by_index(i)?;
                    let Some(relative) = file.enclosed_name() else {
                        tracing::warn!("跳过不安全的条目路径: {}", file.name());
                        continue;
                    };
                    let target = dest.join(relative);
                    if file.is_dir() {
                        fs::create_dir_all(&target)?;
                        continue;
                    }
                    if let Some(parent) = target.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    let mut out = File::create(&target)?;
                    io::copy(&mut file, &mut out)?;
                    written += 1;
                }
                Ok(written)
            }
        }
    }
}

/// 按排序后的归档路径列出目录下的所有文件
pub fn list_files_sorted(root: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(path) = paths::to_archive_path(root, entry.path()) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn entry_options(method: CompressionMethod) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(method)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644)
}

/// 将解压目录打包写入任意 `Write + Seek` 目标
///
/// mimetype条目最先写入且不压缩；目录中没有mimetype时写入标准内容。
/// 其余文件按归档路径排序写入。
pub fn write_archive<W: Write + Seek>(root: &Path, writer: W) -> Result<W> {
    let mut zip = ZipWriter::new(writer);

    let mimetype_path = root.join(MIMETYPE_ENTRY);
    let mimetype = if mimetype_path.is_file() {
        fs::read(&mimetype_path)?
    } else {
        EPUB_MIMETYPE.as_bytes().to_vec()
    };
    zip.start_file(MIMETYPE_ENTRY, entry_options(CompressionMethod::Stored))?;
    zip.write_all(&mimetype)?;

    let deflated = entry_options(CompressionMethod::Deflated);
    for path in list_files_sorted(root)? {
        if path == MIMETYPE_ENTRY {
            continue;
        }
        zip.start_file(path.as_str(), deflated)?;
        let mut file = File::open(paths::to_fs_path(root, &path))?;
        io::copy(&mut file, &mut zip)?;
    }

    Ok(zip.finish()?)
}

/// 重新打包并原子替换目标文件
///
/// 先在目标所在目录写入临时文件并落盘，全部成功后再重命名覆盖目标；
/// 任一步失败时临时文件被删除，目标文件保持原样。
/// 目标已存在时沿用其权限位，否则保留临时文件的默认权限。
pub fn repack_atomic(root: &Path, target: &Path) -> Result<()> {
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let temp = tempfile::Builder::new()
        .prefix(".epubsmith-")
        .suffix(".tmp")
        .tempfile_in(&parent)?;

    let temp: NamedTempFile = write_archive(root, temp)?;
    match fs::metadata(target) {
        Ok(metadata) => temp.as_file().set_permissions(metadata.permissions())?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    temp.as_file().sync_all()?;
    temp.persist(target).map_err(|e| EpubError::Io(e.error))?;
    Ok(())
}
