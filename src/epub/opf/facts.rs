//! OPF事实提取模块
//!
//! 以quick-xml的命名空间感知读取器流式扫描OPF，只取出差异摘要关心的少量事实，
//! 不构建元素树。

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;

use crate::epub::config::NormalizeConfig;
use crate::epub::error::{EpubError, Result};
use crate::epub::opf::DC_NS;

/// 差异摘要使用的OPF事实
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpfFacts {
    pub title: Option<String>,
    pub creators: Vec<String>,
    pub publisher: Option<String>,
    pub description: Option<String>,
    /// 是否存在 `<meta name="cover">`
    pub has_cover_meta: bool,
    /// 是否存在厂商元数据
    pub has_vendor_metadata: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Creator,
    Publisher,
    Description,
}

impl Field {
    fn from_local(local: &[u8]) -> Option<Field> {
        match local {
            b"title" => Some(Field::Title),
            b"creator" => Some(Field::Creator),
            b"publisher" => Some(Field::Publisher),
            b"description" => Some(Field::Description),
            _ => None,
        }
    }
}

fn is_dublin_core(resolved: &ResolveResult) -> bool {
    match resolved {
        ResolveResult::Bound(Namespace(uri)) => *uri == DC_NS.as_bytes(),
        ResolveResult::Unknown(prefix) => prefix.as_slice() == b"dc",
        ResolveResult::Unbound => false,
    }
}

fn is_vendor(resolved: &ResolveResult, element: &BytesStart, config: &NormalizeConfig) -> Result<bool> {
    if let ResolveResult::Bound(Namespace(uri)) = resolved {
        if config.is_vendor_namespace(&String::from_utf8_lossy(uri)) {
            return Ok(true);
        }
    }
    if element.local_name().as_ref() != b"meta" {
        return Ok(false);
    }
    let values = meta_values(element)?;
    Ok(config.is_vendor_meta(values.iter().map(|(_, v)| v.as_str())))
}

fn meta_values(element: &BytesStart) -> Result<Vec<(String, String)>> {
    let mut values = Vec::new();
    for attr_result in element.attributes() {
        let attr = attr_result.map_err(|e| EpubError::MalformedXml(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        if matches!(key.as_str(), "name" | "property" | "content") {
            let value = attr
                .unescape_value()
                .map_err(|e| EpubError::MalformedXml(e.to_string()))?;
            values.push((key, value.into_owned()));
        }
    }
    Ok(values)
}

/// 从OPF文本中提取事实
///
/// # 参数
/// * `xml_content` - OPF原文
/// * `config` - 厂商元数据识别规则
///
/// # 返回值
/// * `Result<OpfFacts>` - 文本不是良构XML时返回 `MalformedXml`
pub fn extract_facts(xml_content: &str, config: &NormalizeConfig) -> Result<OpfFacts> {
    let mut reader = NsReader::from_str(xml_content);
    reader.config_mut().trim_text(true);

    let mut facts = OpfFacts::default();
    let mut current: Option<(Field, String)> = None;
    let mut depth = 0usize;
    let mut saw_root = false;

    loop {
        let (resolved, event) = reader
            .read_resolved_event()
            .map_err(|e| EpubError::MalformedXml(e.to_string()))?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                saw_root = true;
                let empty = matches!(event, Event::Empty(_));
                if !empty {
                    depth += 1;
                }
                if is_vendor(&resolved, e, config)? {
                    facts.has_vendor_metadata = true;
                }
                if e.local_name().as_ref() == b"meta" {
                    let values = meta_values(e)?;
                    if values.iter().any(|(k, v)| k == "name" && v == "cover") {
                        facts.has_cover_meta = true;
                    }
                }
                if current.is_none() && !empty && is_dublin_core(&resolved) {
                    if let Some(field) = Field::from_local(e.local_name().as_ref()) {
                        current = Some((field, String::new()));
                    }
                }
                if empty && is_dublin_core(&resolved) {
                    if let Some(field) = Field::from_local(e.local_name().as_ref()) {
                        record(&mut facts, field, String::new());
                    }
                }
            }
            Event::Text(ref t) => {
                if let Some((_, text)) = current.as_mut() {
                    let value = t.unescape().map_err(|e| EpubError::MalformedXml(e.to_string()))?;
                    text.push_str(&value);
                }
            }
            Event::CData(ref c) => {
                if let Some((_, text)) = current.as_mut() {
                    text.push_str(&String::from_utf8_lossy(c));
                }
            }
            Event::End(ref e) => {
                depth = depth.saturating_sub(1);
                if let Some((field, _)) = current {
                    if Field::from_local(e.local_name().as_ref()) == Some(field) {
                        if let Some((field, text)) = current.take() {
                            record(&mut facts, field, text.trim().to_string());
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root || depth != 0 {
        return Err(EpubError::MalformedXml("文档不完整".to_string()));
    }
    Ok(facts)
}

fn record(facts: &mut OpfFacts, field: Field, text: String) {
    match field {
        Field::Title => {
            facts.title.get_or_insert(text);
        }
        Field::Creator => facts.creators.push(text),
        Field::Publisher => {
            facts.publisher.get_or_insert(text);
        }
        Field::Description => {
            facts.description.get_or_insert(text);
        }
    }
}
