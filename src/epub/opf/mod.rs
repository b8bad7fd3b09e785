//! OPF（Open Packaging Format）包文档模块
//!
//! 此模块负责OPF的解析与改写：元数据重写、规范化、封面嵌入，以及供差异摘要使用的事实提取。

mod cover;
mod facts;
mod manifest;
mod metadata;
mod normalize;
mod package;
mod spine;

/// Dublin Core元素命名空间
pub const DC_NS: &str = "http://purl.org/dc/elements/1.1/";
/// Calibre厂商命名空间，仅用于剥离
pub const CALIBRE_NS: &str = "http://calibre.kovidgoyal.net/2009/metadata";

pub use cover::{EmbeddedCover, embed_cover, media_type_for_extension};
pub use facts::{OpfFacts, extract_facts};
pub use manifest::{ManifestItem, add_property, remove_property};
pub use metadata::{CoverSource, FinalMetadata, rewrite_metadata};
pub use normalize::normalize;
pub use package::PackageDocument;
pub use spine::SpineItem;
