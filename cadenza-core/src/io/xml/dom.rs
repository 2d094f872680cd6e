//! A minimal element tree over quick-xml. Only elements and attributes are kept, text is ignored.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};

use crate::io::Error;

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Element {
    pub name: String,
    /// In document order.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
}
impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
    #[must_use]
    pub fn with_attribute(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set_attribute(key, value);
        self
    }
    /// Set an attribute, replacing any previous value.
    pub fn set_attribute(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((key.to_owned(), value)),
        }
    }
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find_map(|(k, v)| (k == key).then_some(v.as_str()))
    }
    pub fn push(&mut self, child: Element) {
        self.children.push(child);
    }
    /// First child named `name`.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// Serialize as a standalone UTF-8 document with this element as the root.
    pub fn to_xml(&self) -> Result<String, Error> {
        let mut writer = quick_xml::Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        self.write(&mut writer)?;
        String::from_utf8(writer.into_inner())
            .map_err(|_| Error::Format("serialized xml is not UTF-8".to_owned()))
    }
    fn write(&self, writer: &mut quick_xml::Writer<Vec<u8>>) -> Result<(), Error> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }
        if self.children.is_empty() {
            writer.write_event(Event::Empty(start))?;
        } else {
            writer.write_event(Event::Start(start))?;
            for child in &self.children {
                child.write(writer)?;
            }
            writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))?;
        }
        Ok(())
    }

    /// Parse the root element of `text`.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut reader = quick_xml::Reader::from_str(text);
        reader.config_mut().trim_text(true);

        // Elements opened but not yet closed.
        let mut open: Vec<Element> = Vec::new();
        let mut root = None;
        loop {
            match reader.read_event()? {
                Event::Start(start) => open.push(Self::from_start(&start)?),
                Event::Empty(start) => {
                    let element = Self::from_start(&start)?;
                    attach(&mut open, &mut root, element)?;
                }
                Event::End(_) => {
                    // quick-xml has already checked the end matches.
                    let element = open
                        .pop()
                        .ok_or_else(|| Error::Format("unbalanced closing tag".to_owned()))?;
                    attach(&mut open, &mut root, element)?;
                }
                Event::Eof => break,
                // Declarations, text, comments.
                _ => (),
            }
        }
        if let Some(unclosed) = open.last() {
            return Err(Error::Format(format!("unclosed element {}", unclosed.name)));
        }
        root.ok_or_else(|| Error::Format("no root element".to_owned()))
    }
    fn from_start(start: &BytesStart<'_>) -> Result<Self, Error> {
        let mut element = Self::new(utf8(start.name().as_ref())?);
        for attribute in start.attributes() {
            let attribute = attribute?;
            let key = utf8(attribute.key.as_ref())?;
            let value = attribute.unescape_value()?.into_owned();
            element.attributes.push((key.to_owned(), value));
        }
        Ok(element)
    }
}

fn attach(open: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<(), Error> {
    if let Some(parent) = open.last_mut() {
        parent.children.push(element);
    } else if root.is_none() {
        *root = Some(element);
    } else {
        return Err(Error::Format("more than one root element".to_owned()));
    }
    Ok(())
}

fn utf8(bytes: &[u8]) -> Result<&str, Error> {
    std::str::from_utf8(bytes).map_err(|_| Error::Format("name is not UTF-8".to_owned()))
}

#[cfg(test)]
mod test {
    use super::Element;

    #[test]
    fn write_parse() {
        let mut root = Element::new("Root").with_attribute("a", "1 & <2>");
        root.push(Element::new("Leaf").with_attribute("name", "\"quoted\""));
        let mut branch = Element::new("Branch");
        branch.push(Element::new("Leaf"));
        root.push(branch);

        let text = root.to_xml().unwrap();
        assert!(text.starts_with("<?xml"));
        let parsed = Element::parse(&text).unwrap();
        assert_eq!(parsed, root);
        assert_eq!(parsed.attribute("a"), Some("1 & <2>"));
        assert_eq!(parsed.children_named("Leaf").count(), 1);
        assert_eq!(parsed.child("Branch").unwrap().children.len(), 1);
    }
    #[test]
    fn set_replaces() {
        let mut element = Element::new("E").with_attribute("k", "1");
        element.set_attribute("k", "2");
        assert_eq!(element.attributes, [("k".to_owned(), "2".to_owned())]);
    }
    #[test]
    fn malformed() {
        assert!(Element::parse("").is_err());
        assert!(Element::parse("<a><b></a>").is_err());
        assert!(Element::parse("<a/><b/>").is_err());
        assert!(Element::parse("<a>").is_err());
    }
}
