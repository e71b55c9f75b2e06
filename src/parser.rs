//! SOAP response parsing.
//!
//! Converts an arbitrary XML document into a generic JSON value using the
//! familiar "xmltodict" layout: attributes become `@name` keys, mixed text
//! goes under `#text`, repeated siblings become arrays and leaf elements
//! collapse to their text (or `null` when empty).
//!
//! Uses quick-xml which is safe against XXE by default (doesn't expand entities).

use crate::error::UpstreamError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};

/// Key prefix for attributes.
pub const ATTR_PREFIX: &str = "@";
/// Key for text content of elements that also carry attributes or children.
pub const TEXT_KEY: &str = "#text";

/// An element still being read.
struct Frame {
    name: String,
    entries: Map<String, Value>,
    has_children: bool,
    text: String,
}

impl Frame {
    fn open(e: &BytesStart) -> Result<Self, UpstreamError> {
        let mut entries = Map::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|e| UpstreamError::Parse(format!("Invalid attribute: {}", e)))?;
            let key = std::str::from_utf8(attr.key.as_ref())
                .map_err(|e| UpstreamError::Parse(format!("Invalid UTF-8: {}", e)))?;
            let value = attr
                .unescape_value()
                .map_err(|e| UpstreamError::Parse(format!("Invalid attribute value: {}", e)))?;
            entries.insert(format!("{}{}", ATTR_PREFIX, key), Value::String(value.into_owned()));
        }

        Ok(Self {
            name: qualified_name(e)?,
            entries,
            has_children: false,
            text: String::new(),
        })
    }

    fn push_child(&mut self, name: String, value: Value) {
        self.has_children = true;
        insert_child(&mut self.entries, name, value);
    }

    fn close(self) -> (String, Value) {
        let text = self.text.trim();
        let value = if self.entries.is_empty() {
            if text.is_empty() {
                Value::Null
            } else {
                Value::String(text.to_string())
            }
        } else {
            let mut entries = self.entries;
            if !text.is_empty() {
                entries.insert(TEXT_KEY.to_string(), Value::String(text.to_string()));
            }
            Value::Object(entries)
        };
        (self.name, value)
    }
}

/// Parse a raw SOAP response body into a generic JSON value.
///
/// The result is an object with a single key, the root element's qualified
/// name (e.g. `SOAP-ENV:Envelope`).
pub fn parse_soap_response(data: &[u8]) -> Result<Value, UpstreamError> {
    let xml_str = std::str::from_utf8(data)
        .map_err(|e| UpstreamError::Parse(format!("Invalid UTF-8: {}", e)))?;

    check_xxe_patterns(xml_str)?;

    let mut reader = Reader::from_str(xml_str);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<(String, Value)> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                if stack.is_empty() && root.is_some() {
                    return Err(UpstreamError::Parse("Multiple root elements".to_string()));
                }
                stack.push(Frame::open(e)?);
            }

            Ok(Event::Empty(ref e)) => {
                let (name, value) = Frame::open(e)?.close();
                match stack.last_mut() {
                    Some(parent) => parent.push_child(name, value),
                    None if root.is_none() => root = Some((name, value)),
                    None => {
                        return Err(UpstreamError::Parse("Multiple root elements".to_string()))
                    }
                }
            }

            Ok(Event::End(_)) => {
                let frame = stack
                    .pop()
                    .ok_or_else(|| UpstreamError::Parse("Unexpected closing tag".to_string()))?;
                let (name, value) = frame.close();
                match stack.last_mut() {
                    Some(parent) => parent.push_child(name, value),
                    None => root = Some((name, value)),
                }
            }

            Ok(Event::Text(ref e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| UpstreamError::Parse(format!("Invalid text content: {}", e)))?;
                match stack.last_mut() {
                    Some(frame) => frame.text.push_str(&text),
                    None => {
                        return Err(UpstreamError::Parse(
                            "Text content outside the root element".to_string(),
                        ))
                    }
                }
            }

            Ok(Event::CData(ref e)) => {
                let text = std::str::from_utf8(e)
                    .map_err(|e| UpstreamError::Parse(format!("Invalid UTF-8: {}", e)))?;
                match stack.last_mut() {
                    Some(frame) => frame.text.push_str(text),
                    None => {
                        return Err(UpstreamError::Parse(
                            "CDATA outside the root element".to_string(),
                        ))
                    }
                }
            }

            Ok(Event::Eof) => break,

            Err(e) => {
                return Err(UpstreamError::Parse(format!(
                    "XML parse error at position {}: {}",
                    reader.error_position(),
                    e
                )));
            }

            // Declarations, comments, processing instructions
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(UpstreamError::Parse(format!("Unclosed element <{}>", open.name)));
    }

    let (name, value) =
        root.ok_or_else(|| UpstreamError::Parse("Document has no root element".to_string()))?;

    let mut document = Map::new();
    document.insert(name, value);
    Ok(Value::Object(document))
}

/// Add `value` under `name`, turning repeated names into an array.
fn insert_child(entries: &mut Map<String, Value>, name: String, value: Value) {
    match entries.get_mut(&name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            entries.insert(name, value);
        }
    }
}

/// Check for XXE attack patterns.
fn check_xxe_patterns(xml: &str) -> Result<(), UpstreamError> {
    if xml.contains("<!DOCTYPE") || xml.contains("<!doctype") {
        return Err(UpstreamError::Parse(
            "DOCTYPE declarations are not allowed".to_string(),
        ));
    }

    if xml.contains("<!ENTITY") || xml.contains("<!entity") {
        return Err(UpstreamError::Parse(
            "Entity declarations are not allowed".to_string(),
        ));
    }

    Ok(())
}

/// Qualified (prefixed) element name.
fn qualified_name(e: &BytesStart) -> Result<String, UpstreamError> {
    std::str::from_utf8(e.name().as_ref())
        .map(String::from)
        .map_err(|e| UpstreamError::Parse(format!("Invalid UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PADRES_RESPONSE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/">
  <SOAP-ENV:Body>
    <ns1:obtenerDatosPadresResponse xmlns:ns1="urn:padreswsdl">
      <return>
        <nombre>JUAN</nombre>
        <apellido>PEREZ</apellido>
        <observacion/>
      </return>
    </ns1:obtenerDatosPadresResponse>
  </SOAP-ENV:Body>
</SOAP-ENV:Envelope>"#;

    #[test]
    fn test_parse_soap_envelope_structure() {
        let value = parse_soap_response(PADRES_RESPONSE.as_bytes()).unwrap();
        assert_eq!(
            value,
            json!({
                "SOAP-ENV:Envelope": {
                    "@xmlns:SOAP-ENV": "http://schemas.xmlsoap.org/soap/envelope/",
                    "SOAP-ENV:Body": {
                        "ns1:obtenerDatosPadresResponse": {
                            "@xmlns:ns1": "urn:padreswsdl",
                            "return": {
                                "nombre": "JUAN",
                                "apellido": "PEREZ",
                                "observacion": null
                            }
                        }
                    }
                }
            })
        );
    }

    #[test]
    fn test_keys_keep_document_order() {
        let value = parse_soap_response(PADRES_RESPONSE.as_bytes()).unwrap();
        let ret = &value["SOAP-ENV:Envelope"]["SOAP-ENV:Body"]["ns1:obtenerDatosPadresResponse"]["return"];
        let keys: Vec<&str> = ret.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["nombre", "apellido", "observacion"]);
    }

    #[test]
    fn test_repeated_elements_become_array() {
        let xml = r#"<hijos><hijo>ANA</hijo><hijo>LUIS</hijo><hijo>EVA</hijo></hijos>"#;
        let value = parse_soap_response(xml.as_bytes()).unwrap();
        assert_eq!(value, json!({ "hijos": { "hijo": ["ANA", "LUIS", "EVA"] } }));
    }

    #[test]
    fn test_attributes_and_mixed_text() {
        let xml = r#"<dato tipo="dni" vigente="true">30111222</dato>"#;
        let value = parse_soap_response(xml.as_bytes()).unwrap();
        assert_eq!(
            value,
            json!({ "dato": { "@tipo": "dni", "@vigente": "true", "#text": "30111222" } })
        );
    }

    #[test]
    fn test_empty_element_with_attributes() {
        let xml = r#"<r><foto formato="jpg"/></r>"#;
        let value = parse_soap_response(xml.as_bytes()).unwrap();
        assert_eq!(value, json!({ "r": { "foto": { "@formato": "jpg" } } }));
    }

    #[test]
    fn test_entities_and_cdata_unescaped() {
        let xml = r#"<r><a>Perez &amp; Hijos</a><b><![CDATA[<raw>]]></b></r>"#;
        let value = parse_soap_response(xml.as_bytes()).unwrap();
        assert_eq!(value, json!({ "r": { "a": "Perez & Hijos", "b": "<raw>" } }));
    }

    #[test]
    fn test_xxe_detection() {
        let xxe_payload = r#"<?xml version="1.0"?>
<!DOCTYPE foo [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>&xxe;</soap:Body>
</soap:Envelope>"#;

        let result = parse_soap_response(xxe_payload.as_bytes());
        assert!(matches!(result, Err(UpstreamError::Parse(msg)) if msg.contains("DOCTYPE")));
    }

    #[test]
    fn test_malformed_xml_rejected() {
        assert!(parse_soap_response(b"<a><b></a>").is_err());
        assert!(parse_soap_response(b"<a><b>").is_err());
        assert!(parse_soap_response(b"<a/><b/>").is_err());
    }

    #[test]
    fn test_text_outside_root_rejected() {
        let result = parse_soap_response(b"Service Unavailable<x/>");
        assert!(matches!(result, Err(UpstreamError::Parse(msg)) if msg.contains("outside the root")));
        assert!(parse_soap_response(b"<x/>trailing").is_err());
        assert!(parse_soap_response(b"<![CDATA[junk]]><x/>").is_err());

        // Whitespace around the root is fine
        assert!(parse_soap_response(b"\n  <x/>\n").is_ok());
    }

    #[test]
    fn test_non_xml_body_rejected() {
        assert!(parse_soap_response(b"").is_err());
        assert!(parse_soap_response(b"Service Unavailable").is_err());
        assert!(parse_soap_response(&[0xff, 0xfe, 0x00]).is_err());
    }
}
