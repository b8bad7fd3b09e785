use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EpubError>;

/// Epub相关的错误类型
#[derive(Error, Debug)]
pub enum EpubError {
    #[error("IO错误: {0}")]
    Io(#[from] io::Error),

    #[error("Zip文件错误: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML错误: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("目录遍历错误: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("归档中没有找到OPF包文件")]
    MissingOpf,

    #[error("XML格式错误: {0}")]
    MalformedXml(String),

    #[error("文件不是有效的EPUB格式: {0}")]
    InvalidEpub(String),

    #[error("结构修复失败: {0}")]
    RepairFailed(String),

    #[error("配置文件错误: {0}")]
    ConfigError(String),
}
