//! Programmatic construction of property descriptors

use super::syntax::{
    boolean_syntax, character_syntax, choice_syntax, double_syntax, integer_syntax, long_syntax,
    regex_syntax, string_syntax, XmlSyntax,
};
use super::types::list_of;
use super::{PropertyDescriptor, PropertyError, PropertyType, PropertyTypeId, RegexPattern};
use std::sync::Arc;

/// Builder for a [`PropertyDescriptor`].
///
/// A description and a default value are mandatory.
pub struct PropertyBuilder<T: PropertyType> {
    name: String,
    description: Option<String>,
    default_value: Option<T>,
    syntax: Arc<dyn XmlSyntax<T>>,
    property_type: Option<PropertyTypeId>,
}

impl<T: PropertyType> PropertyBuilder<T> {
    pub fn new(name: impl Into<String>, syntax: Arc<dyn XmlSyntax<T>>) -> Self {
        Self {
            name: name.into(),
            description: None,
            default_value: None,
            syntax,
            property_type: None,
        }
    }

    fn typed(mut self, property_type: PropertyTypeId) -> Self {
        self.property_type = Some(property_type);
        self
    }

    pub fn desc(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn default_value(mut self, value: impl Into<T>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn build(self) -> Result<PropertyDescriptor<T>, PropertyError> {
        if !is_valid_name(&self.name) {
            return Err(PropertyError::InvalidName(self.name));
        }
        let description = match self.description {
            Some(d) if !d.trim().is_empty() => d,
            _ => return Err(PropertyError::MissingDescription(self.name)),
        };
        let Some(default_value) = self.default_value else {
            return Err(PropertyError::MissingDefault(self.name));
        };
        Ok(PropertyDescriptor::from_parts(
            self.name,
            description,
            default_value,
            self.syntax,
            self.property_type,
            false,
        ))
    }
}

impl<T: PropertyType> PropertyBuilder<Vec<T>> {
    pub fn default_values(mut self, values: impl IntoIterator<Item = T>) -> Self {
        self.default_value = Some(values.into_iter().collect());
        self
    }
}

/// Property names are identifiers, optionally dotted (`violationSuppressXPath`, `foo.bar`)
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

pub fn string_property(name: impl Into<String>) -> PropertyBuilder<String> {
    PropertyBuilder::new(name, Arc::new(string_syntax())).typed(PropertyTypeId::String)
}

pub fn int_property(name: impl Into<String>) -> PropertyBuilder<i32> {
    PropertyBuilder::new(name, Arc::new(integer_syntax())).typed(PropertyTypeId::Integer)
}

pub fn long_property(name: impl Into<String>) -> PropertyBuilder<i64> {
    PropertyBuilder::new(name, Arc::new(long_syntax())).typed(PropertyTypeId::Long)
}

pub fn double_property(name: impl Into<String>) -> PropertyBuilder<f64> {
    PropertyBuilder::new(name, Arc::new(double_syntax())).typed(PropertyTypeId::Double)
}

pub fn boolean_property(name: impl Into<String>) -> PropertyBuilder<bool> {
    PropertyBuilder::new(name, Arc::new(boolean_syntax())).typed(PropertyTypeId::Boolean)
}

pub fn char_property(name: impl Into<String>) -> PropertyBuilder<char> {
    PropertyBuilder::new(name, Arc::new(character_syntax())).typed(PropertyTypeId::Character)
}

pub fn regex_property(name: impl Into<String>) -> PropertyBuilder<RegexPattern> {
    PropertyBuilder::new(name, Arc::new(regex_syntax())).typed(PropertyTypeId::Regex)
}

/// Property over a closed set of labelled values
pub fn enum_property<T: PropertyType>(
    name: impl Into<String>,
    choices: Vec<(&str, T)>,
) -> PropertyBuilder<T> {
    let choices = choices
        .into_iter()
        .map(|(label, value)| (label.to_string(), value))
        .collect();
    PropertyBuilder::new(name, Arc::new(choice_syntax(choices)))
}

pub fn string_list_property(name: impl Into<String>) -> PropertyBuilder<Vec<String>> {
    PropertyBuilder::new(name, Arc::new(list_of(string_syntax()))).typed(PropertyTypeId::StringList)
}

pub fn int_list_property(name: impl Into<String>) -> PropertyBuilder<Vec<i32>> {
    PropertyBuilder::new(name, Arc::new(list_of(integer_syntax())))
        .typed(PropertyTypeId::IntegerList)
}

pub fn long_list_property(name: impl Into<String>) -> PropertyBuilder<Vec<i64>> {
    PropertyBuilder::new(name, Arc::new(list_of(long_syntax()))).typed(PropertyTypeId::LongList)
}

pub fn double_list_property(name: impl Into<String>) -> PropertyBuilder<Vec<f64>> {
    PropertyBuilder::new(name, Arc::new(list_of(double_syntax())))
        .typed(PropertyTypeId::DoubleList)
}

pub fn char_list_property(name: impl Into<String>) -> PropertyBuilder<Vec<char>> {
    PropertyBuilder::new(name, Arc::new(list_of(character_syntax())))
        .typed(PropertyTypeId::CharacterList)
}
