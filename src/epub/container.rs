use crate::epub::error::{EpubError, Result};
use quick_xml::events::Event;
use quick_xml::reader::Reader;

/// container.xml在归档中的固定位置
pub const CONTAINER_PATH: &str = "META-INF/container.xml";

/// OPF包文件的媒体类型
pub const OPF_MEDIA_TYPE: &str = "application/oebps-package+xml";

/// Container.xml中的rootfile信息
#[derive(Debug, Clone)]
pub struct RootFile {
    pub full_path: String,
    pub media_type: String,
}

/// Container.xml的解析结果
#[derive(Debug, Clone)]
pub struct Container {
    pub rootfiles: Vec<RootFile>,
}

impl Container {
    /// 解析container.xml内容
    ///
    /// # 参数
    /// * `xml_content` - container.xml的文件内容
    ///
    /// # 返回值
    /// * `Result<Container>` - 解析后的Container信息，格式错误时返回 `MalformedXml`
    pub fn parse_xml(xml_content: &str) -> Result<Container> {
        let mut reader = Reader::from_str(xml_content);
        reader.config_mut().trim_text(true);

        let mut rootfiles = Vec::new();
        let mut in_rootfiles = false;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| EpubError::MalformedXml(format!("container.xml: {}", e)))?;
            match event {
                Event::Start(ref e) | Event::Empty(ref e) => match e.local_name().as_ref() {
                    b"rootfiles" => {
                        in_rootfiles = true;
                    }
                    b"rootfile" if in_rootfiles => {
                        let mut full_path = String::new();
                        let mut media_type = String::new();

                        for attr_result in e.attributes() {
                            let attr = attr_result
                                .map_err(|e| EpubError::Xml(quick_xml::Error::InvalidAttr(e)))?;
                            let value = attr.unescape_value()?.into_owned();
                            match attr.key.local_name().as_ref() {
                                b"full-path" => full_path = value,
                                b"media-type" => media_type = value,
                                _ => {}
                            }
                        }

                        if !full_path.is_empty() {
                            rootfiles.push(RootFile {
                                full_path,
                                media_type,
                            });
                        }
                    }
                    _ => {}
                },
                Event::End(ref e) => {
                    if e.local_name().as_ref() == b"rootfiles" {
                        in_rootfiles = false;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(Container { rootfiles })
    }

    /// 获取主要的OPF文件路径
    ///
    /// 优先返回媒体类型为 `application/oebps-package+xml` 的rootfile，
    /// 否则返回第一个rootfile。
    pub fn opf_path(&self) -> Option<&str> {
        self.rootfiles
            .iter()
            .find(|rf| rf.media_type == OPF_MEDIA_TYPE)
            .or_else(|| self.rootfiles.first())
            .map(|rf| rf.full_path.trim_start_matches('/'))
    }
}

/// 在候选路径中选出OPF包文件
///
/// 若container.xml可解析且其rootfile存在于候选列表中，则使用它；
/// 否则返回候选列表中第一个 `.opf` 文件。`paths` 的顺序即“第一个”的含义。
pub fn select_opf<'a>(paths: &'a [String], container_xml: Option<&str>) -> Option<&'a str> {
    if let Some(content) = container_xml {
        match Container::parse_xml(content) {
            Ok(container) => {
                if let Some(declared) = container.opf_path() {
                    if let Some(found) = paths.iter().find(|p| p.as_str() == declared) {
                        return Some(found.as_str());
                    }
                    tracing::debug!("container.xml声明的OPF不存在: {}", declared);
                }
            }
            Err(e) => tracing::debug!("忽略无法解析的container.xml: {}", e),
        }
    }

    paths
        .iter()
        .find(|p| p.to_ascii_lowercase().ends_with(".opf"))
        .map(String::as_str)
}
