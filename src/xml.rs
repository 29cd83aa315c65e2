//! Owned XML element tree used for rule-set documents
//!
//! Documents are read with quick-xml into [`XmlElement`] trees that keep the
//! source position of every element, so the loader can report diagnostics
//! against the original document. The same tree type is the target of the
//! property serializers and the rule-set writer.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("XML parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Document has no root element")]
    Empty,

    #[error("Failed to write XML: {0}")]
    Write(String),
}

impl XmlError {
    /// Line the error was detected on, 0 when unknown
    pub fn line(&self) -> usize {
        match self {
            XmlError::Parse { line, .. } => *line,
            _ => 0,
        }
    }
}

/// An XML element with its attributes, text and child elements
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<XmlElement>,
    text: String,
    line: usize,
    column: usize,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the source position of this element
    pub fn at(mut self, line: usize, column: usize) -> Self {
        self.line = line;
        self.column = column;
        self
    }

    /// Local element name (namespace prefix stripped)
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn column(&self) -> usize {
        self.column
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    /// Attributes in document order
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Set an attribute, replacing an existing one with the same name
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Trimmed text content
    pub fn text(&self) -> &str {
        self.text.trim()
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.set_text(text);
        self
    }

    pub fn children(&self) -> &[XmlElement] {
        &self.children
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn first_child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn push_child(&mut self, child: XmlElement) {
        self.children.push(child);
    }

    /// Append a new child and return it for further editing
    pub fn add_child(&mut self, name: impl Into<String>) -> &mut XmlElement {
        self.children.push(XmlElement::new(name));
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.push_child(child);
        self
    }

    /// Serialize this element (and its subtree) without an XML declaration
    pub fn to_xml_string(&self) -> Result<String, XmlError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);
        write_element(&mut writer, self)?;
        String::from_utf8(writer.into_inner()).map_err(|e| XmlError::Write(e.to_string()))
    }
}

/// A parsed rule-set document
#[derive(Debug, Clone)]
pub struct XmlDocument {
    root: XmlElement,
}

impl XmlDocument {
    pub fn new(root: XmlElement) -> Self {
        Self { root }
    }

    pub fn parse(content: &str) -> Result<Self, XmlError> {
        let root = parse_xml(content)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    pub fn into_root(self) -> XmlElement {
        self.root
    }

    /// Serialize with an XML declaration
    pub fn to_xml_string(&self) -> Result<String, XmlError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(|e| XmlError::Write(e.to_string()))?;
        write_element(&mut writer, &self.root)?;
        let mut out =
            String::from_utf8(writer.into_inner()).map_err(|e| XmlError::Write(e.to_string()))?;
        out.push('\n');
        Ok(out)
    }
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &XmlElement) -> Result<(), XmlError> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children.is_empty() && element.text.is_empty() {
        return writer
            .write_event(Event::Empty(start))
            .map_err(|e| XmlError::Write(e.to_string()));
    }

    writer
        .write_event(Event::Start(start))
        .map_err(|e| XmlError::Write(e.to_string()))?;
    if !element.text.is_empty() {
        writer
            .write_event(Event::Text(BytesText::new(&element.text)))
            .map_err(|e| XmlError::Write(e.to_string()))?;
    }
    for child in &element.children {
        write_element(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(|e| XmlError::Write(e.to_string()))?;
    Ok(())
}

fn local_name(qualified: &[u8]) -> String {
    let name = String::from_utf8_lossy(qualified);
    match name.rsplit_once(':') {
        Some((_, local)) => local.to_string(),
        None => name.into_owned(),
    }
}

fn start_element(e: &BytesStart<'_>, line: usize, column: usize) -> Result<XmlElement, XmlError> {
    let mut element = XmlElement::new(local_name(e.name().as_ref())).at(line, column);
    for attr in e.attributes() {
        let attr = attr.map_err(|err| XmlError::Parse {
            line,
            message: err.to_string(),
        })?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        if key == "xmlns" || key.starts_with("xmlns:") {
            continue;
        }
        let value = attr
            .unescape_value()
            .map_err(|err| XmlError::Parse {
                line,
                message: err.to_string(),
            })?
            .to_string();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn parse_xml(content: &str) -> Result<XmlElement, XmlError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;
    let mut buf = Vec::new();

    let line_starts: Vec<usize> = std::iter::once(0)
        .chain(content.match_indices('\n').map(|(i, _)| i + 1))
        .collect();

    let pos_to_line_col = |pos: u64| -> (usize, usize) {
        let pos = pos as usize;
        let line = line_starts.partition_point(|&start| start <= pos);
        let col = pos - line_starts.get(line.saturating_sub(1)).unwrap_or(&0) + 1;
        (line, col)
    };

    // Start of the tag that ends at `pos`; attribute values cannot hold a raw '<'
    let tag_start = |pos: u64| -> u64 {
        let end = (pos as usize).min(content.len());
        content[..end].rfind('<').map_or(pos, |i| i as u64)
    };

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let (line, col) = pos_to_line_col(tag_start(reader.buffer_position()));
                let element = start_element(&e, line, col)?;
                stack.push(element);
            }

            Ok(Event::Empty(e)) => {
                let (line, col) = pos_to_line_col(tag_start(reader.buffer_position()));
                let element = start_element(&e, line, col)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None if root.is_none() => root = Some(element),
                    None => {
                        return Err(XmlError::Parse {
                            line,
                            message: "multiple root elements".to_string(),
                        })
                    }
                }
            }

            Ok(Event::End(_)) => {
                let (line, _) = pos_to_line_col(reader.buffer_position());
                let Some(element) = stack.pop() else {
                    return Err(XmlError::Parse {
                        line,
                        message: "unexpected closing tag".to_string(),
                    });
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None if root.is_none() => root = Some(element),
                    None => {
                        return Err(XmlError::Parse {
                            line,
                            message: "multiple root elements".to_string(),
                        })
                    }
                }
            }

            Ok(Event::Text(e)) => {
                let (line, _) = pos_to_line_col(reader.buffer_position());
                let text = e.unescape().map_err(|err| XmlError::Parse {
                    line,
                    message: err.to_string(),
                })?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }

            Ok(Event::CData(e)) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }

            Ok(Event::Eof) => break,

            Err(e) => {
                let (line, _) = pos_to_line_col(reader.buffer_position());
                return Err(XmlError::Parse {
                    line,
                    message: e.to_string(),
                });
            }

            // declarations, comments, processing instructions, doctype
            _ => {}
        }

        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(XmlError::Parse {
            line: open.line,
            message: format!("unclosed element <{}>", open.name),
        });
    }

    root.ok_or(XmlError::Empty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_tree() {
        let content = r#"<?xml version="1.0"?>
<ruleset name="demo" xmlns="http://example.com/ns">
    <description>Demo rules</description>
    <rule ref="other.xml"/>
</ruleset>"#;
        let doc = XmlDocument::parse(content).unwrap();
        let root = doc.root();
        assert_eq!(root.name(), "ruleset");
        assert_eq!(root.attr("name"), Some("demo"));
        // namespace declarations are not attributes
        assert!(!root.has_attr("xmlns"));
        assert_eq!(root.children().len(), 2);
        assert_eq!(root.first_child("description").unwrap().text(), "Demo rules");
        assert_eq!(root.children()[1].attr("ref"), Some("other.xml"));
    }

    #[test]
    fn test_parse_positions() {
        let content = "<root>\n  <child/>\n  <other>\n  </other>\n</root>";
        let doc = XmlDocument::parse(content).unwrap();
        let root = doc.root();
        assert_eq!(root.line(), 1);
        assert_eq!(root.children()[0].line(), 2);
        assert_eq!(root.children()[1].line(), 3);
    }

    #[test]
    fn test_parse_strips_prefixes_and_unescapes() {
        let content = r#"<r:root xmlns:r="urn:x"><r:value a="1 &lt; 2">x &amp; y</r:value></r:root>"#;
        let doc = XmlDocument::parse(content).unwrap();
        let value = doc.root().first_child("value").unwrap();
        assert_eq!(value.attr("a"), Some("1 < 2"));
        assert_eq!(value.text(), "x & y");
    }

    #[test]
    fn test_parse_cdata() {
        let content = "<example><![CDATA[if (a < b) {}]]></example>";
        let doc = XmlDocument::parse(content).unwrap();
        assert_eq!(doc.root().text(), "if (a < b) {}");
    }

    #[test]
    fn test_parse_malformed() {
        assert!(XmlDocument::parse("<root><child></root>").is_err());
        assert!(XmlDocument::parse("<root>").is_err());
        assert!(matches!(XmlDocument::parse(""), Err(XmlError::Empty)));
    }

    #[test]
    fn test_set_attr_replaces() {
        let mut element = XmlElement::new("rule").with_attr("name", "a");
        element.set_attr("name", "b");
        element.set_attr("message", "m");
        let attrs: Vec<_> = element.attributes().collect();
        assert_eq!(attrs, vec![("name", "b"), ("message", "m")]);
    }

    #[test]
    fn test_write_and_reparse() {
        let mut root = XmlElement::new("ruleset").with_attr("name", "a & b");
        root.add_child("description").set_text("x < y");
        root.add_child("rule").set_attr("ref", "other.xml");

        let doc = XmlDocument::new(root);
        let xml = doc.to_xml_string().unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));

        let reparsed = XmlDocument::parse(&xml).unwrap();
        assert_eq!(reparsed.root().attr("name"), Some("a & b"));
        assert_eq!(reparsed.root().first_child("description").unwrap().text(), "x < y");
        assert_eq!(reparsed.root().children()[1].attr("ref"), Some("other.xml"));
    }
}
