//! 元数据重写模块
//!
//! 将外部已经确定的书目信息写入OPF的 `<metadata>`：已有的 `dc:<tag>` 更新文本，
//! 缺失的按Dublin Core命名空间新建。

use std::fs;
use std::path::PathBuf;

use crate::epub::error::{EpubError, Result};
use crate::epub::opf::{DC_NS, PackageDocument};
use crate::epub::xml::Element;

/// 封面来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverSource {
    /// 本地图片文件
    Path(PathBuf),
    /// 内存中的图片数据
    Bytes {
        data: Vec<u8>,
        /// 不含点的扩展名，如 `png`
        extension: String,
    },
}

impl CoverSource {
    /// 小写扩展名，无法确定时为 `jpg`
    pub fn extension(&self) -> String {
        let extension = match self {
            CoverSource::Path(path) => path
                .extension()
                .map(|ext| ext.to_string_lossy().into_owned())
                .unwrap_or_default(),
            CoverSource::Bytes { extension, .. } => extension.trim_start_matches('.').to_string(),
        };
        if extension.is_empty() {
            "jpg".to_string()
        } else {
            extension.to_ascii_lowercase()
        }
    }

    /// 读取封面数据
    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        match self {
            CoverSource::Path(path) => Ok(fs::read(path)?),
            CoverSource::Bytes { data, .. } if data.is_empty() => {
                Err(EpubError::InvalidEpub("封面数据为空".to_string()))
            }
            CoverSource::Bytes { data, .. } => Ok(data.clone()),
        }
    }
}

/// 外部已确定的最终元数据
///
/// 值为 `None` 或空白的字段保持OPF原样。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub language: Option<String>,
    pub publisher: Option<String>,
    pub description: Option<String>,
    pub cover: Option<CoverSource>,
}

impl FinalMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publisher = Some(publisher.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_cover(mut self, cover: CoverSource) -> Self {
        self.cover = Some(cover);
        self
    }

    /// 字段与Dublin Core本地名的对应关系，保持固定顺序
    pub fn dublin_core_fields(&self) -> [(&'static str, Option<&str>); 5] {
        [
            ("title", self.title.as_deref()),
            ("creator", self.author.as_deref()),
            ("language", self.language.as_deref()),
            ("publisher", self.publisher.as_deref()),
            ("description", self.description.as_deref()),
        ]
    }
}

/// 将最终元数据写入OPF
///
/// 对每个有值的字段，更新第一个同名Dublin Core元素的文本；不存在时新建。
/// 缺少 `<metadata>` 时在package开头创建。
pub fn rewrite_metadata(mut package: PackageDocument, input: &FinalMetadata) -> PackageDocument {
    package.ensure_metadata();
    let scope = package.metadata_scope();
    let prefix = match scope.prefix_for(DC_NS) {
        Some(prefix) => prefix.to_string(),
        None => {
            if let Some(metadata) = package.metadata_mut() {
                metadata.set_attr("xmlns:dc", DC_NS);
            }
            "dc".to_string()
        }
    };

    let Some(metadata) = package.metadata_mut() else {
        return package;
    };

    for (tag, value) in input.dublin_core_fields() {
        let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            continue;
        };
        let existing = metadata
            .child_elements_mut()
            .find(|e| e.local_name() == tag && e.prefix() == Some(prefix.as_str()));
        match existing {
            Some(element) => {
                if element.text().trim() != value {
                    tracing::debug!("更新 {}:{}", prefix, tag);
                }
                element.set_text(value);
            }
            None => {
                tracing::debug!("新建 {}:{}", prefix, tag);
                metadata.push_child(Element::new(format!("{}:{}", prefix, tag)).with_text(value));
            }
        }
    }

    package
}
