//! 脊柱模块
//!
//! 提供EPUB包中阅读顺序（脊柱）的结构定义。

use crate::epub::xml::Element;

/// 脊柱项信息(阅读顺序)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpineItem {
    /// 引用的清单项ID
    pub idref: String,
    /// 是否线性阅读
    pub linear: bool,
}

impl SpineItem {
    /// 创建新的脊柱项
    pub fn new(idref: impl Into<String>) -> Self {
        Self {
            idref: idref.into(),
            linear: true,
        }
    }

    /// 从 `<itemref>` 元素读取脊柱项，缺少idref时返回 `None`
    pub fn from_element(element: &Element) -> Option<Self> {
        let idref = element.attr("idref").filter(|v| !v.is_empty())?;
        Some(Self {
            idref: idref.to_string(),
            linear: element.attr("linear") != Some("no"),
        })
    }

    /// 检查是否为线性阅读
    pub fn is_linear(&self) -> bool {
        self.linear
    }
}
