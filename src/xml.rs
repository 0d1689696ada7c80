//! # XML Tree Module
//!
//! A small owned element tree over `quick-xml`, shaped for the round-trip the
//! project generator needs: parse an existing `.vcxproj`, drop and append a few
//! top-level groups, and write the document back without disturbing the layout
//! of anything we did not touch.
//!
//! Whitespace between elements is kept as explicit [`Node::Text`] children, so
//! hand-authored indentation inside configuration groups survives byte-for-byte.
//!
//! Serialization deliberately mirrors Visual Studio's own conventions:
//! - text escapes only `&`, `<`, `>`
//! - attribute values additionally escape `"` but leave `'` alone
//!   (MSBuild `Condition` attributes are full of single quotes)
//!
//! The final [`msvc_format`] pass applies the two textual fixups that make the
//! serializer's output match what Visual Studio itself writes.

use anyhow::{Context, Result, bail};
use quick_xml::Reader;
use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

/// The declaration line Visual Studio puts at the top of project files.
pub const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>";

/// A single node in the document tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Character data, including the inter-element whitespace that carries
    /// the document's indentation.
    Text(String),
    Comment(String),
}

/// An XML element with its attributes (in document order) and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Look up an attribute value by name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attrs.push((name.into(), value.into()));
    }

    /// Iterate over child elements, skipping text and comment nodes.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            _ => None,
        })
    }

    /// Concatenated text content of this element (direct children only).
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Parse an XML document into its root [`Element`].
///
/// The declaration, doctype, and processing instructions are dropped;
/// [`render`] re-emits a fixed declaration line. Comments and whitespace
/// inside the root are preserved.
pub fn parse(source: &str) -> Result<Element> {
    let mut reader = Reader::from_str(source);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event().context("malformed XML")? {
            Event::Start(e) => stack.push(element_from_start(&e)?),
            Event::Empty(e) => {
                let el = element_from_start(&e)?;
                attach(&mut stack, &mut root, Node::Element(el))?;
            }
            Event::End(_) => {
                let el = stack.pop().context("unbalanced closing tag")?;
                attach(&mut stack, &mut root, Node::Element(el))?;
            }
            Event::Text(e) => {
                let text = e.unescape().context("bad character data")?.into_owned();
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Text(text));
                }
                // Text outside the root element is insignificant whitespace.
            }
            Event::CData(e) => {
                let text = String::from_utf8(e.into_inner().into_owned())
                    .context("CDATA section is not valid UTF-8")?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Text(text));
                }
            }
            Event::Comment(e) => {
                let text = String::from_utf8(e.into_inner().into_owned())
                    .context("comment is not valid UTF-8")?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Comment(text));
                }
            }
            Event::Eof => break,
            // Decl / DocType / PI / entity references carry nothing we keep.
            _ => {}
        }
    }

    root.context("document has no root element")
}

fn element_from_start(e: &BytesStart) -> Result<Element> {
    let name = std::str::from_utf8(e.name().as_ref())
        .context("element name is not valid UTF-8")?
        .to_string();
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.context("malformed attribute")?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .context("attribute name is not valid UTF-8")?
            .to_string();
        let value = attr.unescape_value().context("bad attribute value")?;
        attrs.push((key, value.into_owned()));
    }
    Ok(Element {
        name,
        attrs,
        children: Vec::new(),
    })
}

fn attach(stack: &mut Vec<Element>, root: &mut Option<Element>, node: Node) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => match node {
            Node::Element(el) => {
                if root.is_some() {
                    bail!("document has more than one root element");
                }
                *root = Some(el);
            }
            _ => {}
        },
    }
    Ok(())
}

/// Serialize a document: the fixed declaration line followed by the tree.
///
/// No indentation is synthesized; layout comes entirely from the text nodes
/// in the tree.
pub fn render(root: &Element) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    write_element(&mut writer, root)?;
    let body = String::from_utf8(writer.into_inner()).context("serialized XML is not UTF-8")?;
    Ok(format!("{XML_DECLARATION}\n{body}"))
}

fn write_element(writer: &mut Writer<Vec<u8>>, el: &Element) -> Result<()> {
    let mut start = BytesStart::new(el.name.as_str());
    for (key, value) in &el.attrs {
        let escaped = escape_attribute(value);
        // Byte-slice attributes are written verbatim, so our own escaping
        // (which keeps single quotes literal) is what lands on disk.
        start.push_attribute((key.as_bytes(), escaped.as_bytes()));
    }

    if el.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for child in &el.children {
        match child {
            Node::Element(e) => write_element(writer, e)?,
            Node::Text(t) => {
                writer.write_event(Event::Text(BytesText::from_escaped(partial_escape(t))))?;
            }
            Node::Comment(c) => {
                writer.write_event(Event::Comment(BytesText::from_escaped(c.as_str())))?;
            }
        }
    }
    writer.write_event(Event::End(BytesEnd::new(el.name.as_str())))?;
    Ok(())
}

/// Escape an attribute value the way MSBuild tooling writes them:
/// `&`, `<`, `>` and `"` are escaped, single quotes are left alone.
fn escape_attribute(value: &str) -> String {
    let escaped = partial_escape(value);
    if escaped.contains('"') {
        escaped.replace('"', "&quot;")
    } else {
        escaped.into_owned()
    }
}

/// The two post-serialization fixups that make output match Visual Studio's
/// formatting exactly: item-group closing tags sit at two spaces (the last
/// child's trailing whitespace would otherwise leave them at four), and the
/// closing project tag sits at column zero.
///
/// These encode a third-party formatting convention, not a semantic
/// requirement; a byte-clean diff keeps Visual Studio from rewriting the
/// file on next open.
pub fn msvc_format(xml: &str) -> String {
    xml.replace("    </ItemGroup>", "  </ItemGroup>")
        .replace("  </Project>", "</Project>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_layout_and_attributes() {
        let source = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
                      <Project ToolsVersion=\"4.0\" xmlns=\"http://example.invalid/ns\">\n  \
                      <PropertyGroup Label=\"Globals\">\n    \
                      <RootNamespace>application</RootNamespace>\n  \
                      </PropertyGroup>\n\
                      </Project>";
        let root = parse(source).unwrap();
        assert_eq!(root.name, "Project");
        assert_eq!(root.attr("ToolsVersion"), Some("4.0"));
        assert_eq!(render(&root).unwrap(), source);
    }

    #[test]
    fn childless_elements_self_close() {
        let root = parse("<Project><ClCompile Include=\"code\\a.cpp\"/></Project>").unwrap();
        let rendered = render(&root).unwrap();
        assert!(rendered.contains("<ClCompile Include=\"code\\a.cpp\"/>"));
    }

    #[test]
    fn condition_attributes_keep_single_quotes() {
        let mut el = Element::new("AdditionalOptions");
        el.set_attr("Condition", "'$(Configuration)|$(Platform)'=='Release|x64'");
        el.children.push(Node::Text("/wd4125 %(AdditionalOptions)".into()));
        let rendered = render(&el).unwrap();
        assert!(
            rendered.contains("Condition=\"'$(Configuration)|$(Platform)'=='Release|x64'\""),
            "single quotes must stay literal: {rendered}"
        );

        // And they survive a round trip unchanged.
        let reparsed = parse(&rendered).unwrap();
        assert_eq!(
            reparsed.attr("Condition"),
            Some("'$(Configuration)|$(Platform)'=='Release|x64'")
        );
    }

    #[test]
    fn text_and_attribute_escaping() {
        let mut el = Element::new("Tool");
        el.set_attr("Flags", "/D \"A<B\" & more");
        el.children.push(Node::Text("1 < 2 && 3 > 2".into()));
        let rendered = render(&el).unwrap();
        assert!(rendered.contains("Flags=\"/D &quot;A&lt;B&quot; &amp; more\""));
        assert!(rendered.contains(">1 &lt; 2 &amp;&amp; 3 &gt; 2<"));

        let reparsed = parse(&rendered).unwrap();
        assert_eq!(reparsed.attr("Flags"), Some("/D \"A<B\" & more"));
        assert_eq!(reparsed.text(), "1 < 2 && 3 > 2");
    }

    #[test]
    fn comments_survive_round_trip() {
        let source = "<Project><!-- keep me --><PropertyGroup/></Project>";
        let root = parse(source).unwrap();
        assert!(render(&root).unwrap().contains("<!-- keep me -->"));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse("<Project><Unclosed></Project>").is_err());
        assert!(parse("not xml at all").is_err());
    }

    #[test]
    fn msvc_format_fixups() {
        let raw = "<Project>\n  <ItemGroup>\n    <ClCompile Include=\"a\"/>\n    </ItemGroup>\n  </Project>";
        let formatted = msvc_format(raw);
        assert!(formatted.contains("\n  </ItemGroup>"));
        assert!(formatted.ends_with("\n</Project>"));
        assert!(!formatted.contains("    </ItemGroup>"));
    }
}
