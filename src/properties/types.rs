//! Property types that can be declared from XML with `type="..."`

use super::syntax::{
    boolean_syntax, character_syntax, double_syntax, integer_syntax, long_syntax, regex_syntax,
    string_syntax, SeqSyntax, XmlSyntax,
};
use super::{expect_element, DescriptorRef, PropertyDescriptor, PropertyError, PropertyType, PropertyValue};
use crate::diagnostic::XmlErrorReporter;
use crate::xml::XmlElement;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Value type of an externally defined property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyTypeId {
    String,
    Integer,
    Long,
    Double,
    Boolean,
    Character,
    Regex,
    StringList,
    IntegerList,
    LongList,
    DoubleList,
    CharacterList,
}

impl PropertyTypeId {
    pub const ALL: [PropertyTypeId; 12] = [
        PropertyTypeId::String,
        PropertyTypeId::Integer,
        PropertyTypeId::Long,
        PropertyTypeId::Double,
        PropertyTypeId::Boolean,
        PropertyTypeId::Character,
        PropertyTypeId::Regex,
        PropertyTypeId::StringList,
        PropertyTypeId::IntegerList,
        PropertyTypeId::LongList,
        PropertyTypeId::DoubleList,
        PropertyTypeId::CharacterList,
    ];

    /// Name used in the `type` attribute
    pub fn name(self) -> &'static str {
        match self {
            PropertyTypeId::String => "String",
            PropertyTypeId::Integer => "Integer",
            PropertyTypeId::Long => "Long",
            PropertyTypeId::Double => "Double",
            PropertyTypeId::Boolean => "Boolean",
            PropertyTypeId::Character => "Character",
            PropertyTypeId::Regex => "Regex",
            PropertyTypeId::StringList => "List[String]",
            PropertyTypeId::IntegerList => "List[Integer]",
            PropertyTypeId::LongList => "List[Long]",
            PropertyTypeId::DoubleList => "List[Double]",
            PropertyTypeId::CharacterList => "List[Character]",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name.trim())
    }

    pub fn is_list(self) -> bool {
        matches!(
            self,
            PropertyTypeId::StringList
                | PropertyTypeId::IntegerList
                | PropertyTypeId::LongList
                | PropertyTypeId::DoubleList
                | PropertyTypeId::CharacterList
        )
    }

    /// Decode a value of this type from its attribute form
    pub fn decode_text(self, text: &str) -> Result<PropertyValue, String> {
        self.syntax().decode_text(text)
    }

    /// Decode a value of this type from a value element
    pub fn decode_element(
        self,
        element: &XmlElement,
        err: &mut XmlErrorReporter<'_>,
    ) -> Option<PropertyValue> {
        self.syntax().decode_element(element, err)
    }

    pub fn examples(self) -> Vec<String> {
        self.syntax().examples()
    }

    /// Build an externally defined descriptor of this type
    pub fn build_descriptor(
        self,
        name: &str,
        description: &str,
        default_value: PropertyValue,
    ) -> Result<DescriptorRef, PropertyError> {
        self.make_descriptor(name, description, default_value, true)
    }

    /// Build a descriptor that belongs to a rule class
    pub fn class_descriptor(
        self,
        name: &str,
        description: &str,
        default_value: PropertyValue,
    ) -> Result<DescriptorRef, PropertyError> {
        self.make_descriptor(name, description, default_value, false)
    }

    fn make_descriptor(
        self,
        name: &str,
        description: &str,
        default_value: PropertyValue,
        external: bool,
    ) -> Result<DescriptorRef, PropertyError> {
        if name.trim().is_empty() {
            return Err(PropertyError::InvalidName(name.to_string()));
        }
        if description.trim().is_empty() {
            return Err(PropertyError::MissingDescription(name.to_string()));
        }
        self.syntax()
            .build(self, name, description, default_value, external)
    }

    fn syntax(self) -> Box<dyn ErasedSyntax> {
        match self {
            PropertyTypeId::String => typed(string_syntax()),
            PropertyTypeId::Integer => typed(integer_syntax()),
            PropertyTypeId::Long => typed(long_syntax()),
            PropertyTypeId::Double => typed(double_syntax()),
            PropertyTypeId::Boolean => typed(boolean_syntax()),
            PropertyTypeId::Character => typed(character_syntax()),
            PropertyTypeId::Regex => typed(regex_syntax()),
            PropertyTypeId::StringList => typed(list_of(string_syntax())),
            PropertyTypeId::IntegerList => typed(list_of(integer_syntax())),
            PropertyTypeId::LongList => typed(list_of(long_syntax())),
            PropertyTypeId::DoubleList => typed(list_of(double_syntax())),
            PropertyTypeId::CharacterList => typed(list_of(character_syntax())),
        }
    }
}

impl fmt::Display for PropertyTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for PropertyTypeId {
    type Err = PropertyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| PropertyError::UnknownType(s.to_string()))
    }
}

pub(super) fn list_of<T>(item: impl XmlSyntax<T> + 'static) -> SeqSyntax<T, Vec<T>> {
    SeqSyntax::new(Arc::new(item), Vec::new)
}

/// A syntax with its value type erased
trait ErasedSyntax {
    fn decode_text(&self, text: &str) -> Result<PropertyValue, String>;
    fn decode_element(
        &self,
        element: &XmlElement,
        err: &mut XmlErrorReporter<'_>,
    ) -> Option<PropertyValue>;
    fn examples(&self) -> Vec<String>;
    fn build(
        &self,
        id: PropertyTypeId,
        name: &str,
        description: &str,
        default_value: PropertyValue,
        external: bool,
    ) -> Result<DescriptorRef, PropertyError>;
}

struct Typed<T>(Arc<dyn XmlSyntax<T>>);

fn typed<T: PropertyType>(syntax: impl XmlSyntax<T> + 'static) -> Box<dyn ErasedSyntax> {
    Box::new(Typed::<T>(Arc::new(syntax)))
}

impl<T: PropertyType> ErasedSyntax for Typed<T> {
    fn decode_text(&self, text: &str) -> Result<PropertyValue, String> {
        self.0.from_string(text).map(PropertyValue::new)
    }

    fn decode_element(
        &self,
        element: &XmlElement,
        err: &mut XmlErrorReporter<'_>,
    ) -> Option<PropertyValue> {
        expect_element(err, element, self.0.as_ref()).map(PropertyValue::new)
    }

    fn examples(&self) -> Vec<String> {
        self.0.examples()
    }

    fn build(
        &self,
        id: PropertyTypeId,
        name: &str,
        description: &str,
        default_value: PropertyValue,
        external: bool,
    ) -> Result<DescriptorRef, PropertyError> {
        let default_value = default_value
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| PropertyError::TypeMismatch(name.to_string()))?;
        let descriptor = PropertyDescriptor::from_parts(
            name.to_string(),
            description.to_string(),
            default_value,
            Arc::clone(&self.0),
            Some(id),
            external,
        );
        Ok(descriptor.erased())
    }
}
