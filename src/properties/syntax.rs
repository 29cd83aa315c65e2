//! XML syntaxes for property values
//!
//! An [`XmlSyntax`] maps a typed value to and from an XML element. Scalars use
//! [`ValueSyntax`] (`<value>42</value>`), lists use [`SeqSyntax`]
//! (`<seq><value>1</value><value>2</value></seq>`).

use super::RegexPattern;
use crate::diagnostic::XmlErrorReporter;
use crate::xml::XmlElement;
use std::marker::PhantomData;
use std::sync::Arc;

/// Element name used by scalar values
pub const VALUE_ELEMENT: &str = "value";
/// Element name used by sequences
pub const SEQ_ELEMENT: &str = "seq";
/// Delimiter of the attribute form of a sequence (`value="a,b,c"`)
pub const SEQ_DELIMITER: char = ',';

/// Bidirectional mapping between a value and an XML element
pub trait XmlSyntax<T>: Send + Sync {
    /// Element names accepted by [`XmlSyntax::from_xml`]
    fn read_element_names(&self) -> Vec<&str>;

    /// Element name to write `value` under. May depend on the value.
    fn write_element_name(&self, value: &T) -> String;

    /// Write `value` as the content of `container`
    fn to_xml(&self, container: &mut XmlElement, value: &T);

    /// Decode a value from `element`. Problems are reported and yield `None`.
    fn from_xml(&self, element: &XmlElement, err: &mut XmlErrorReporter<'_>) -> Option<T>;

    /// Example snippets, for documentation and "expected syntax" messages
    fn examples(&self) -> Vec<String>;

    /// Whether values can also be written as a plain attribute string
    fn supports_from_string(&self) -> bool {
        false
    }

    fn from_string(&self, text: &str) -> Result<T, String> {
        Err(format!(
            "'{}' cannot be given as an attribute, expected e.g. {}",
            text,
            self.examples().join(" or ")
        ))
    }

    fn to_string_value(&self, _value: &T) -> Option<String> {
        None
    }
}

/// Check that `element` is one the syntax can read, then decode it
pub fn expect_element<T>(
    err: &mut XmlErrorReporter<'_>,
    element: &XmlElement,
    syntax: &dyn XmlSyntax<T>,
) -> Option<T> {
    let names = syntax.read_element_names();
    if !names.contains(&element.name()) {
        err.error(
            element,
            format!(
                "Unexpected element <{}>, expected one of <{}>",
                element.name(),
                names.join(">, <")
            ),
        );
        return None;
    }
    syntax.from_xml(element, err)
}

type ParseFn<T> = dyn Fn(&str) -> Result<T, String> + Send + Sync;
type PrintFn<T> = dyn Fn(&T) -> String + Send + Sync;

/// Scalar syntax: `<value>text</value>` or `value="text"`
pub struct ValueSyntax<T> {
    parse: Arc<ParseFn<T>>,
    print: Arc<PrintFn<T>>,
    example: String,
    element: String,
}

impl<T> ValueSyntax<T> {
    pub fn new(
        parse: impl Fn(&str) -> Result<T, String> + Send + Sync + 'static,
        print: impl Fn(&T) -> String + Send + Sync + 'static,
        example: impl Into<String>,
    ) -> Self {
        Self {
            parse: Arc::new(parse),
            print: Arc::new(print),
            example: example.into(),
            element: VALUE_ELEMENT.to_string(),
        }
    }

    /// Read and write under `<element>` instead of `<value>`
    pub fn named(mut self, element: impl Into<String>) -> Self {
        self.element = element.into();
        self
    }

    pub fn example(&self) -> &str {
        &self.example
    }
}

impl<T> XmlSyntax<T> for ValueSyntax<T> {
    fn read_element_names(&self) -> Vec<&str> {
        vec![self.element.as_str()]
    }

    fn write_element_name(&self, _value: &T) -> String {
        self.element.clone()
    }

    fn to_xml(&self, container: &mut XmlElement, value: &T) {
        container.set_text((self.print)(value));
    }

    fn from_xml(&self, element: &XmlElement, err: &mut XmlErrorReporter<'_>) -> Option<T> {
        match (self.parse)(element.text()) {
            Ok(value) => Some(value),
            Err(message) => {
                err.error(
                    element,
                    format!(
                        "Invalid value '{}': {}. Expected e.g. {}",
                        element.text(),
                        message,
                        self.examples().join(" or ")
                    ),
                );
                None
            }
        }
    }

    fn examples(&self) -> Vec<String> {
        vec![format!("<{0}>{1}</{0}>", self.element, self.example)]
    }

    fn supports_from_string(&self) -> bool {
        true
    }

    fn from_string(&self, text: &str) -> Result<T, String> {
        (self.parse)(text)
    }

    fn to_string_value(&self, value: &T) -> Option<String> {
        Some((self.print)(value))
    }
}

/// Sequence syntax: one child element per item, decoded by the item syntax.
///
/// Decoding keeps every item that decodes; a malformed item is reported and
/// skipped.
pub struct SeqSyntax<T, C> {
    item: Arc<dyn XmlSyntax<T>>,
    empty: fn() -> C,
    _items: PhantomData<fn() -> T>,
}

impl<T, C> SeqSyntax<T, C> {
    pub fn new(item: Arc<dyn XmlSyntax<T>>, empty: fn() -> C) -> Self {
        Self {
            item,
            empty,
            _items: PhantomData,
        }
    }

    pub fn item_syntax(&self) -> &dyn XmlSyntax<T> {
        self.item.as_ref()
    }
}

impl<T, C> XmlSyntax<C> for SeqSyntax<T, C>
where
    C: Extend<T>,
    for<'a> &'a C: IntoIterator<Item = &'a T>,
{
    fn read_element_names(&self) -> Vec<&str> {
        vec![SEQ_ELEMENT]
    }

    fn write_element_name(&self, _value: &C) -> String {
        SEQ_ELEMENT.to_string()
    }

    fn to_xml(&self, container: &mut XmlElement, value: &C) {
        for item in value {
            let child = container.add_child(self.item.write_element_name(item));
            self.item.to_xml(child, item);
        }
    }

    fn from_xml(&self, element: &XmlElement, err: &mut XmlErrorReporter<'_>) -> Option<C> {
        let mut result = (self.empty)();
        for child in element.children() {
            if let Some(item) = expect_element(err, child, self.item.as_ref()) {
                result.extend(std::iter::once(item));
            }
        }
        Some(result)
    }

    fn examples(&self) -> Vec<String> {
        vec![format!(
            "<{0}>\n    {1}\n    ...\n</{0}>",
            SEQ_ELEMENT,
            self.item.examples().join("\n    ")
        )]
    }

    fn supports_from_string(&self) -> bool {
        self.item.supports_from_string()
    }

    fn from_string(&self, text: &str) -> Result<C, String> {
        let mut result = (self.empty)();
        for part in text.split(SEQ_DELIMITER).map(str::trim).filter(|p| !p.is_empty()) {
            let item = self.item.from_string(part)?;
            result.extend(std::iter::once(item));
        }
        Ok(result)
    }

    fn to_string_value(&self, value: &C) -> Option<String> {
        let mut parts = Vec::new();
        for item in value {
            let text = self.item.to_string_value(item)?;
            if text.contains(SEQ_DELIMITER) {
                return None;
            }
            parts.push(text);
        }
        Some(parts.join(SEQ_DELIMITER.to_string().as_str()))
    }
}

pub fn string_syntax() -> ValueSyntax<String> {
    ValueSyntax::new(|s| Ok(s.to_string()), |v: &String| v.clone(), "some text")
}

pub fn integer_syntax() -> ValueSyntax<i32> {
    ValueSyntax::new(
        |s| s.trim().parse::<i32>().map_err(|e| e.to_string()),
        |v: &i32| v.to_string(),
        "42",
    )
}

pub fn long_syntax() -> ValueSyntax<i64> {
    ValueSyntax::new(
        |s| s.trim().parse::<i64>().map_err(|e| e.to_string()),
        |v: &i64| v.to_string(),
        "9000000000",
    )
}

pub fn double_syntax() -> ValueSyntax<f64> {
    ValueSyntax::new(
        |s| s.trim().parse::<f64>().map_err(|e| e.to_string()),
        |v: &f64| v.to_string(),
        "0.5",
    )
}

pub fn boolean_syntax() -> ValueSyntax<bool> {
    ValueSyntax::new(
        |s| match s.trim() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(format!("'{}' is not a boolean", other)),
        },
        |v: &bool| v.to_string(),
        "true",
    )
}

pub fn character_syntax() -> ValueSyntax<char> {
    ValueSyntax::new(
        |s| {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(c),
                _ => Err(format!("'{}' is not a single character", s)),
            }
        },
        |v: &char| v.to_string(),
        "c",
    )
}

pub fn regex_syntax() -> ValueSyntax<RegexPattern> {
    ValueSyntax::new(
        |s| RegexPattern::new(s).map_err(|e| e.to_string()),
        |v: &RegexPattern| v.as_str().to_string(),
        "[a-z]+",
    )
}

/// Syntax over a closed set of labelled choices
pub fn choice_syntax<T>(choices: Vec<(String, T)>) -> ValueSyntax<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    let choices = Arc::new(choices);
    let example = choices
        .first()
        .map(|(label, _)| label.clone())
        .unwrap_or_default();
    let labels: Vec<String> = choices.iter().map(|(label, _)| label.clone()).collect();
    let parse_choices = Arc::clone(&choices);
    ValueSyntax::new(
        move |s| {
            parse_choices
                .iter()
                .find(|(label, _)| label == s.trim())
                .map(|(_, value)| value.clone())
                .ok_or_else(|| format!("expected one of {}", labels.join(", ")))
        },
        move |v: &T| {
            choices
                .iter()
                .find(|(_, value)| value == v)
                .map(|(label, _)| label.clone())
                .unwrap_or_default()
        },
        example,
    )
}
