//! 清单模块
//!
//! 提供EPUB包中文件清单的结构定义。

use crate::epub::xml::Element;

/// 清单项信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    /// 项目ID
    pub id: String,
    /// 文件路径(相对于OPF文件)
    pub href: String,
    /// 媒体类型
    pub media_type: String,
    /// 属性(如nav、cover-image等)
    pub properties: Option<String>,
    /// 回退项ID
    pub fallback: Option<String>,
}

impl ManifestItem {
    /// 创建新的清单项
    pub fn new(id: impl Into<String>, href: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            href: href.into(),
            media_type: media_type.into(),
            properties: None,
            fallback: None,
        }
    }

    /// 创建带属性的清单项
    pub fn with_properties(mut self, properties: impl Into<String>) -> Self {
        self.properties = Some(properties.into());
        self
    }

    /// 从 `<item>` 元素读取清单项，缺少id或href时返回 `None`
    pub fn from_element(element: &Element) -> Option<Self> {
        let id = element.attr("id").filter(|v| !v.is_empty())?;
        let href = element.attr("href").filter(|v| !v.is_empty())?;
        Some(Self {
            id: id.to_string(),
            href: href.to_string(),
            media_type: element.attr("media-type").unwrap_or_default().to_string(),
            properties: element.attr("properties").map(str::to_string),
            fallback: element.attr("fallback").map(str::to_string),
        })
    }

    /// 生成 `<item>` 元素，`name` 为带前缀的元素名
    pub fn to_element(&self, name: &str) -> Element {
        let mut element = Element::new(name)
            .with_attr("id", self.id.as_str())
            .with_attr("href", self.href.as_str())
            .with_attr("media-type", self.media_type.as_str());
        if let Some(properties) = &self.properties {
            element.set_attr("properties", properties.as_str());
        }
        if let Some(fallback) = &self.fallback {
            element.set_attr("fallback", fallback.as_str());
        }
        element
    }

    /// 检查是否包含指定属性
    pub fn has_property(&self, property: &str) -> bool {
        if let Some(properties) = &self.properties {
            properties.split_whitespace().any(|p| p == property)
        } else {
            false
        }
    }

    /// 检查是否为导航文档
    pub fn is_nav(&self) -> bool {
        self.has_property("nav")
    }

    /// 检查是否为图片文件
    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }
}

/// 在空格分隔的属性列表中加入一个值（已存在时不变）
pub fn add_property(properties: Option<&str>, property: &str) -> String {
    let mut tokens: Vec<&str> = properties.unwrap_or_default().split_whitespace().collect();
    if !tokens.contains(&property) {
        tokens.push(property);
    }
    tokens.join(" ")
}

/// 从空格分隔的属性列表中移除一个值，结果为空时返回 `None`
pub fn remove_property(properties: &str, property: &str) -> Option<String> {
    let tokens: Vec<&str> = properties
        .split_whitespace()
        .filter(|p| *p != property)
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}
