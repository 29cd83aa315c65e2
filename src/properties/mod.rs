//! Typed rule properties
//!
//! A [`PropertyDescriptor`] names a typed configuration slot of a rule: its
//! description, default value and the [`XmlSyntax`] used to read and write
//! values. Rules store values type-erased as [`PropertyValue`] keyed by the
//! descriptor name, and [`DescriptorRef`] gives the type-erased view of a
//! descriptor that the loader and writer work with.

mod builder;
pub(crate) mod map;
pub mod syntax;
mod types;

pub use builder::{
    boolean_property, char_list_property, char_property, double_list_property, double_property,
    enum_property, int_list_property, int_property, long_list_property, long_property,
    regex_property, string_list_property, string_property, PropertyBuilder,
};
pub use map::{PropertyMap, PropertySource};
pub use syntax::{expect_element, SeqSyntax, ValueSyntax, XmlSyntax};
pub use types::PropertyTypeId;

use crate::diagnostic::XmlErrorReporter;
use crate::xml::XmlElement;
use regex::Regex;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Name of the attribute holding the string form of a value
pub const VALUE_ATTRIBUTE: &str = "value";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PropertyError {
    #[error("Property '{property}' is not declared on rule '{rule}'")]
    Undeclared { rule: String, property: String },

    #[error("Property '{0}' is already declared")]
    Duplicate(String),

    #[error("Value for property '{0}' has the wrong type")]
    TypeMismatch(String),

    #[error("Property '{0}' has no description")]
    MissingDescription(String),

    #[error("Property '{0}' has no default value")]
    MissingDefault(String),

    #[error("Invalid property name '{0}'")]
    InvalidName(String),

    #[error("Unknown property type '{0}'")]
    UnknownType(String),

    #[error("Invalid value for property '{property}': {message}")]
    InvalidValue { property: String, message: String },
}

/// Types usable as property values
pub trait PropertyType: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {}

impl<T: Clone + fmt::Debug + PartialEq + Send + Sync + 'static> PropertyType for T {}

/// Compiled regular expression compared by its source text
#[derive(Clone)]
pub struct RegexPattern(Regex);

impl RegexPattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(RegexPattern)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn regex(&self) -> &Regex {
        &self.0
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }
}

impl PartialEq for RegexPattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl fmt::Debug for RegexPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/", self.as_str())
    }
}

trait DynValue: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn dyn_eq(&self, other: &dyn DynValue) -> bool;
}

impl<T: PropertyType> DynValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn DynValue) -> bool {
        other.as_any().downcast_ref::<T>() == Some(self)
    }
}

/// A type-erased property value
#[derive(Clone)]
pub struct PropertyValue(Arc<dyn DynValue>);

impl PropertyValue {
    pub fn new<T: PropertyType>(value: T) -> Self {
        PropertyValue(Arc::new(value))
    }

    pub fn downcast_ref<T: PropertyType>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }

    pub fn is<T: PropertyType>(&self) -> bool {
        self.downcast_ref::<T>().is_some()
    }
}

impl PartialEq for PropertyValue {
    fn eq(&self, other: &Self) -> bool {
        self.0.dyn_eq(other.0.as_ref())
    }
}

impl fmt::Debug for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

/// Shared, type-erased descriptor
pub type DescriptorRef = Arc<dyn AnyDescriptor>;

/// Type-erased view of a [`PropertyDescriptor`]
pub trait AnyDescriptor: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Registry type of the descriptor, if it has one (used for XML definitions)
    fn property_type(&self) -> Option<PropertyTypeId>;

    /// Declared in a rule-set document rather than by the rule class
    fn is_defined_externally(&self) -> bool;

    fn default_value(&self) -> PropertyValue;

    /// Whether `value` has the type of this descriptor
    fn accepts(&self, value: &PropertyValue) -> bool;

    /// Decode a value from the attribute string form
    fn decode_text(&self, text: &str) -> Result<PropertyValue, String>;

    /// Decode a value element (`<value>`, `<seq>`, ...)
    fn decode_element(
        &self,
        element: &XmlElement,
        err: &mut XmlErrorReporter<'_>,
    ) -> Option<PropertyValue>;

    /// String form of a value, when the syntax has one
    fn encode_text(&self, value: &PropertyValue) -> Option<String>;

    /// Element form of a value
    fn encode_element(&self, value: &PropertyValue) -> Option<XmlElement>;

    fn examples(&self) -> Vec<String>;
}

/// A typed, named configuration slot of a rule.
///
/// Cloning is cheap; identity is the name.
pub struct PropertyDescriptor<T: PropertyType> {
    core: Arc<DescriptorCore<T>>,
}

struct DescriptorCore<T> {
    name: String,
    description: String,
    default_value: T,
    syntax: Arc<dyn XmlSyntax<T>>,
    property_type: Option<PropertyTypeId>,
    defined_externally: bool,
}

impl<T: PropertyType> PropertyDescriptor<T> {
    pub(crate) fn from_parts(
        name: String,
        description: String,
        default_value: T,
        syntax: Arc<dyn XmlSyntax<T>>,
        property_type: Option<PropertyTypeId>,
        defined_externally: bool,
    ) -> Self {
        Self {
            core: Arc::new(DescriptorCore {
                name,
                description,
                default_value,
                syntax,
                property_type,
                defined_externally,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn description(&self) -> &str {
        &self.core.description
    }

    pub fn default_value(&self) -> &T {
        &self.core.default_value
    }

    pub fn syntax(&self) -> &dyn XmlSyntax<T> {
        self.core.syntax.as_ref()
    }

    pub fn is_defined_externally(&self) -> bool {
        self.core.defined_externally
    }

    /// Type-erased handle sharing this descriptor
    pub fn erased(&self) -> DescriptorRef {
        self.core.clone()
    }
}

impl<T: PropertyType> Clone for PropertyDescriptor<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: PropertyType> PartialEq for PropertyDescriptor<T> {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl<T: PropertyType> fmt::Debug for PropertyDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.core.as_ref(), f)
    }
}

impl<T: PropertyType> fmt::Debug for DescriptorCore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .field("default_value", &self.default_value)
            .field("property_type", &self.property_type)
            .finish()
    }
}

impl<T: PropertyType> AnyDescriptor for DescriptorCore<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn property_type(&self) -> Option<PropertyTypeId> {
        self.property_type
    }

    fn is_defined_externally(&self) -> bool {
        self.defined_externally
    }

    fn default_value(&self) -> PropertyValue {
        PropertyValue::new(self.default_value.clone())
    }

    fn accepts(&self, value: &PropertyValue) -> bool {
        value.is::<T>()
    }

    fn decode_text(&self, text: &str) -> Result<PropertyValue, String> {
        self.syntax.from_string(text).map(PropertyValue::new)
    }

    fn decode_element(
        &self,
        element: &XmlElement,
        err: &mut XmlErrorReporter<'_>,
    ) -> Option<PropertyValue> {
        expect_element(err, element, self.syntax.as_ref()).map(PropertyValue::new)
    }

    fn encode_text(&self, value: &PropertyValue) -> Option<String> {
        let value = value.downcast_ref::<T>()?;
        self.syntax.to_string_value(value)
    }

    fn encode_element(&self, value: &PropertyValue) -> Option<XmlElement> {
        let value = value.downcast_ref::<T>()?;
        let mut element = XmlElement::new(self.syntax.write_element_name(value));
        self.syntax.to_xml(&mut element, value);
        Some(element)
    }

    fn examples(&self) -> Vec<String> {
        self.syntax.examples()
    }
}

/// Decode the value of a `<property>` element, given either as the `value`
/// attribute or as a single nested value element.
pub fn decode_property_value(
    descriptor: &dyn AnyDescriptor,
    property: &XmlElement,
    err: &mut XmlErrorReporter<'_>,
) -> Option<PropertyValue> {
    let children = property.children();
    match (property.attr(VALUE_ATTRIBUTE), children) {
        (Some(_), [_, ..]) => {
            err.error(
                property,
                format!(
                    "Property '{}' has both a value attribute and a value element",
                    descriptor.name()
                ),
            );
            None
        }
        (Some(text), []) => match descriptor.decode_text(text) {
            Ok(value) => Some(value),
            Err(message) => {
                err.error(
                    property,
                    format!(
                        "Invalid value '{}' for property '{}': {}. Expected e.g. {}",
                        text,
                        descriptor.name(),
                        message,
                        descriptor.examples().join(" or ")
                    ),
                );
                None
            }
        },
        (None, [element]) => descriptor.decode_element(element, err),
        (None, [_, _, ..]) => {
            err.error(
                property,
                format!(
                    "Property '{}' must have exactly one value element",
                    descriptor.name()
                ),
            );
            None
        }
        (None, []) => {
            err.error(
                property,
                format!(
                    "Property '{}' has no value. Expected e.g. {}",
                    descriptor.name(),
                    descriptor.examples().join(" or ")
                ),
            );
            None
        }
    }
}

/// Write `value` into a `<property>` element, as attribute when possible
pub fn encode_property_value(
    descriptor: &dyn AnyDescriptor,
    property: &mut XmlElement,
    value: &PropertyValue,
) {
    if let Some(text) = descriptor.encode_text(value) {
        property.set_attr(VALUE_ATTRIBUTE, text);
    } else if let Some(element) = descriptor.encode_element(value) {
        property.push_child(element);
    }
}
