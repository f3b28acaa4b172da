//! Wire codecs for provider payloads.
//!
//! WeChat Pay v2 speaks flat XML (`<xml><key>value</key>...</xml>`, values
//! usually in CDATA); Alipay posts `application/x-www-form-urlencoded`.
//! Both decode into a sorted flat map, ready for signature checks.

use std::collections::BTreeMap;

use quick_xml::{events::Event, Reader};

pub type Params = BTreeMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed XML: {0}")]
    Xml(String),

    #[error("malformed form body: {0}")]
    Form(String),

    #[error("payload is empty")]
    Empty,
}

/// Decode a flat WeChat XML document. Nested elements are rejected.
pub fn parse_wechat_xml(xml: &str) -> Result<Params, CodecError> {
    // Field text is kept verbatim; whitespace between fields has no `current`
    let mut reader = Reader::from_str(xml);

    let mut params = Params::new();
    let mut depth = 0usize;
    let mut current: Option<(String, String)> = None;
    let mut saw_root = false;

    loop {
        match reader
            .read_event()
            .map_err(|e| CodecError::Xml(e.to_string()))?
        {
            Event::Start(start) => {
                depth += 1;
                match depth {
                    1 => saw_root = true,
                    2 => {
                        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                        current = Some((name, String::new()));
                    }
                    _ => return Err(CodecError::Xml("nested element".to_string())),
                }
            }
            Event::Empty(empty) => {
                if depth == 1 {
                    let name = String::from_utf8_lossy(empty.name().as_ref()).into_owned();
                    params.insert(name, String::new());
                } else if depth == 0 {
                    saw_root = true;
                }
            }
            Event::Text(text) => {
                if let Some((_, value)) = current.as_mut() {
                    let unescaped = text.unescape().map_err(|e| CodecError::Xml(e.to_string()))?;
                    value.push_str(&unescaped);
                }
            }
            Event::CData(cdata) => {
                if let Some((_, value)) = current.as_mut() {
                    let raw = cdata.into_inner();
                    let text =
                        std::str::from_utf8(&raw).map_err(|e| CodecError::Xml(e.to_string()))?;
                    value.push_str(text);
                }
            }
            Event::End(_) => {
                if depth == 2 {
                    if let Some((name, value)) = current.take() {
                        params.insert(name, value);
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(CodecError::Empty);
    }
    Ok(params)
}

/// Encode a flat map as WeChat XML, every value wrapped in CDATA
pub fn to_wechat_xml(params: &Params) -> String {
    let mut xml = String::from("<xml>");
    for (key, value) in params {
        xml.push_str(&format!("<{key}><![CDATA[{value}]]></{key}>"));
    }
    xml.push_str("</xml>");
    xml
}

/// Acknowledgement body for a WeChat notification
pub fn wechat_ack(success: bool, message: &str) -> String {
    let code = if success { "SUCCESS" } else { "FAIL" };
    format!(
        "<xml><return_code><![CDATA[{}]]></return_code><return_msg><![CDATA[{}]]></return_msg></xml>",
        code, message
    )
}

/// Decode an Alipay form body. A repeated key keeps its last value.
pub fn parse_alipay_form(body: &[u8]) -> Result<Params, CodecError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(CodecError::Empty);
    }

    let pairs: Vec<(String, String)> =
        serde_urlencoded::from_bytes(body).map_err(|e| CodecError::Form(e.to_string()))?;
    Ok(pairs.into_iter().collect())
}
