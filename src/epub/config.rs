//! 配置模块
//!
//! 提供元数据规范化、封面嵌入和备份行为的配置管理功能，支持从YAML文件加载配置。

use crate::epub::error::{EpubError, Result};
use crate::epub::opf::CALIBRE_NS;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

static DEFAULT_CONFIG: Lazy<EpubsmithConfig> = Lazy::new(EpubsmithConfig::default);

/// 规范化配置：厂商元数据识别规则和metadata子元素的规范顺序
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// 需要整体剥离的厂商命名空间URI
    pub vendor_namespaces: Vec<String>,
    /// meta元素的name/property/content中出现即视为厂商元数据的标记（不区分大小写）
    pub vendor_markers: Vec<String>,
    /// dc元素的规范顺序（本地名）
    pub canonical_order: Vec<String>,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            vendor_namespaces: vec![CALIBRE_NS.to_string()],
            vendor_markers: ["calibre:", "calibre_", "timestamp", "user_metadata", "user_categories"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            canonical_order: [
                "identifier",
                "title",
                "creator",
                "language",
                "publisher",
                "date",
                "description",
                "subject",
                "rights",
                "contributor",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl NormalizeConfig {
    /// 检查命名空间是否属于厂商扩展
    pub fn is_vendor_namespace(&self, uri: &str) -> bool {
        self.vendor_namespaces.iter().any(|ns| ns == uri)
    }

    /// 检查meta元素的属性值是否带有厂商标记
    pub fn is_vendor_meta<'a, I>(&self, values: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        values.into_iter().any(|value| {
            let value = value.to_lowercase();
            self.vendor_markers
                .iter()
                .any(|marker| value.contains(&marker.to_lowercase()))
        })
    }

    /// 获取dc元素在规范顺序中的位置
    pub fn canonical_rank(&self, local_name: &str) -> Option<usize> {
        self.canonical_order.iter().position(|tag| tag == local_name)
    }
}

/// 封面嵌入配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverConfig {
    /// 封面所在目录（相对于OPF目录）
    pub directory: String,
    /// 封面文件名（不含扩展名）
    pub file_stem: String,
    /// 封面清单项ID
    pub manifest_id: String,
}

impl Default for CoverConfig {
    fn default() -> Self {
        Self {
            directory: "images".to_string(),
            file_stem: "cover".to_string(),
            manifest_id: "cover-image".to_string(),
        }
    }
}

impl CoverConfig {
    /// 根据扩展名生成封面相对路径，如 `images/cover.jpg`
    pub fn href_for(&self, extension: &str) -> String {
        if self.directory.is_empty() {
            format!("{}.{}", self.file_stem, extension)
        } else {
            format!("{}/{}.{}", self.directory.trim_end_matches('/'), self.file_stem, extension)
        }
    }
}

/// 导航文档合成配置：修复缺失导航时生成文件的位置与清单ID
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    /// 导航文档所在目录（相对于OPF目录）
    pub directory: String,
    /// 导航文件名（不含扩展名）
    pub file_stem: String,
    /// 导航清单项ID
    pub manifest_id: String,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            directory: String::new(),
            file_stem: "nav".to_string(),
            manifest_id: "nav".to_string(),
        }
    }
}

impl NavConfig {
    /// 生成第 `suffix` 个候选的ID与href，如 `nav-1` 与 `nav-1.xhtml`
    pub fn candidate(&self, suffix: &str) -> (String, String) {
        let id = format!("{}{}", self.manifest_id, suffix);
        let href = if self.directory.is_empty() {
            format!("{}{}.xhtml", self.file_stem, suffix)
        } else {
            format!("{}/{}{}.xhtml", self.directory.trim_end_matches('/'), self.file_stem, suffix)
        };
        (id, href)
    }
}

/// 顶层配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpubsmithConfig {
    /// 规范化配置
    pub normalize: NormalizeConfig,
    /// 封面配置
    pub cover: CoverConfig,
    /// 导航合成配置
    pub nav: NavConfig,
    /// 备份文件后缀，追加在完整文件名之后
    pub backup_suffix: String,
    /// 临时目录名前缀
    pub scratch_prefix: String,
    /// 重新打包前是否删除未被清单引用的图片
    pub remove_unused_images: bool,
}

impl Default for EpubsmithConfig {
    fn default() -> Self {
        Self {
            normalize: NormalizeConfig::default(),
            cover: CoverConfig::default(),
            nav: NavConfig::default(),
            backup_suffix: ".bak".to_string(),
            scratch_prefix: "epubsmith-".to_string(),
            remove_unused_images: false,
        }
    }
}

impl EpubsmithConfig {
    /// 进程级共享的默认配置
    pub fn shared_default() -> &'static EpubsmithConfig {
        &DEFAULT_CONFIG
    }

    /// 从YAML文件加载配置
    ///
    /// # 参数
    /// * `path` - 配置文件路径
    ///
    /// # 返回值
    /// * `Result<Self>` - 加载成功返回配置实例，失败返回错误
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| EpubError::ConfigError(format!("无法读取配置文件: {}", e)))?;
        Self::from_yaml_str(&content)
    }

    /// 从YAML文本解析配置
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yml::from_str(content)
            .map_err(|e| EpubError::ConfigError(format!("配置文件格式错误: {}", e)))
    }

    /// 序列化为YAML文本
    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yml::to_string(self)
            .map_err(|e| EpubError::ConfigError(format!("序列化配置失败: {}", e)))
    }

    /// 将默认配置写入指定路径
    pub fn write_default<P: AsRef<Path>>(path: P) -> Result<()> {
        let yaml_content = Self::default().to_yaml_string()?;
        let content_with_header = format!(
            "# epubsmith 配置文件\n# 定义元数据规范化、封面嵌入与备份的行为\n\n{}",
            yaml_content
        );
        fs::write(path.as_ref(), content_with_header)
            .map_err(|e| EpubError::ConfigError(format!("写入配置文件失败: {}", e)))
    }

    /// 计算备份文件路径：`<name>.epub` -> `<name>.epub.bak`
    pub fn backup_path_for(&self, epub_path: &Path) -> std::path::PathBuf {
        let mut name = epub_path.as_os_str().to_os_string();
        name.push(&self.backup_suffix);
        std::path::PathBuf::from(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_canonical_order() {
        let config = NormalizeConfig::default();
        assert_eq!(config.canonical_rank("identifier"), Some(0));
        assert_eq!(config.canonical_rank("contributor"), Some(9));
        assert_eq!(config.canonical_rank("coverage"), None);
    }

    #[test]
    fn test_vendor_meta_is_case_insensitive() {
        let config = NormalizeConfig::default();
        assert!(config.is_vendor_meta(["Calibre:Timestamp"]));
        assert!(config.is_vendor_meta(["cover", "calibre:user_categories"]));
        assert!(!config.is_vendor_meta(["cover", "cover-image"]));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = EpubsmithConfig::from_yaml_str("remove_unused_images: true\n").unwrap();
        assert!(config.remove_unused_images);
        assert_eq!(config.cover, CoverConfig::default());
        assert_eq!(config.backup_suffix, ".bak");
    }

    #[test]
    fn test_yaml_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("epubsmith.yaml");
        EpubsmithConfig::write_default(&path).unwrap();

        let loaded = EpubsmithConfig::from_file(&path).unwrap();
        assert_eq!(&loaded, EpubsmithConfig::shared_default());
    }

    #[test]
    fn test_malformed_yaml_is_config_error() {
        let result = EpubsmithConfig::from_yaml_str("normalize: [not, a, map]");
        assert!(matches!(result, Err(EpubError::ConfigError(_))));
    }

    #[test]
    fn test_backup_path_appends_suffix() {
        let config = EpubsmithConfig::default();
        let backup = config.backup_path_for(Path::new("/library/book.epub"));
        assert_eq!(backup, Path::new("/library/book.epub.bak"));
        assert_eq!(config.cover.href_for("png"), "images/cover.png");
    }

    #[test]
    fn test_nav_candidates() {
        let mut nav = NavConfig::default();
        assert_eq!(nav.candidate(""), ("nav".to_string(), "nav.xhtml".to_string()));
        assert_eq!(nav.candidate("-2"), ("nav-2".to_string(), "nav-2.xhtml".to_string()));

        // 目录末尾的斜杠不重复
        nav.directory = "text/".to_string();
        assert_eq!(nav.candidate("").1, "text/nav.xhtml");
    }
}
