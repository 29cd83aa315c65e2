//! Element and attribute names of the rule-set document format

use crate::diagnostic::XmlErrorReporter;
use crate::properties::syntax::{boolean_syntax, string_syntax};
use crate::properties::{expect_element, ValueSyntax, XmlSyntax};
use crate::rule::{priority_syntax, RulePriority};
use crate::rule_reference::RuleField;
use crate::xml::XmlElement;
use std::ops::Deref;

/// Namespace of rule-set documents
pub const RULESET_NAMESPACE: &str = "http://rulecraft.dev/ruleset/2.0.0";

/// A name in the rule-set schema, used as element or attribute name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchemaConstant(&'static str);

impl SchemaConstant {
    pub const fn xml_name(self) -> &'static str {
        self.0
    }

    pub fn matches(self, element: &XmlElement) -> bool {
        element.name() == self.0
    }

    pub fn attribute(self, element: &XmlElement) -> Option<&str> {
        element.attr(self.0)
    }

    pub fn has_attribute(self, element: &XmlElement) -> bool {
        element.has_attr(self.0)
    }

    /// Attribute value, or `None` if missing or blank
    pub fn non_blank_attribute(self, element: &XmlElement) -> Option<&str> {
        self.attribute(element)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// Like [`SchemaConstant::non_blank_attribute`], reporting an error when absent
    pub fn required_attribute<'e>(
        self,
        element: &'e XmlElement,
        err: &mut XmlErrorReporter<'_>,
    ) -> Option<&'e str> {
        let value = self.non_blank_attribute(element);
        if value.is_none() {
            err.error(
                element,
                format!(
                    "Missing required attribute '{}' on <{}>",
                    self.0,
                    element.name()
                ),
            );
        }
        value
    }
}

/// A rule metadata name bound to the field it sets and the syntax of its value
pub struct SchemaField<T> {
    constant: SchemaConstant,
    field: RuleField,
    syntax: fn() -> ValueSyntax<T>,
}

impl<T> SchemaField<T> {
    const fn new(name: &'static str, field: RuleField, syntax: fn() -> ValueSyntax<T>) -> Self {
        Self {
            constant: SchemaConstant(name),
            field,
            syntax,
        }
    }

    pub const fn constant(&self) -> SchemaConstant {
        self.constant
    }

    pub fn field(&self) -> RuleField {
        self.field
    }

    /// Value syntax, read and written as `<name>` elements
    pub fn syntax(&self) -> ValueSyntax<T> {
        (self.syntax)().named(self.constant.xml_name())
    }

    /// Decode the attribute; `None` when absent, blank or invalid
    pub fn read_attribute(
        &self,
        element: &XmlElement,
        err: &mut XmlErrorReporter<'_>,
    ) -> Option<T> {
        let text = self.constant.non_blank_attribute(element)?;
        let syntax = self.syntax();
        match syntax.from_string(text) {
            Ok(value) => Some(value),
            Err(message) => {
                err.error(
                    element,
                    format!(
                        "Invalid value '{}' for attribute '{}': {}. Expected e.g. {}=\"{}\"",
                        text,
                        self.constant.xml_name(),
                        message,
                        self.constant.xml_name(),
                        syntax.example()
                    ),
                );
                None
            }
        }
    }

    /// Decode a child element named after this field
    pub fn read_element(
        &self,
        element: &XmlElement,
        err: &mut XmlErrorReporter<'_>,
    ) -> Option<T> {
        expect_element(err, element, &self.syntax())
    }
}

impl<T> Deref for SchemaField<T> {
    type Target = SchemaConstant;

    fn deref(&self) -> &SchemaConstant {
        &self.constant
    }
}

pub const RULESET: SchemaConstant = SchemaConstant("ruleset");
pub const RULE: SchemaConstant = SchemaConstant("rule");
pub const NAME: SchemaConstant = SchemaConstant("name");
pub const REF: SchemaConstant = SchemaConstant("ref");
pub const CLASS: SchemaConstant = SchemaConstant("class");
pub const LANGUAGE: SchemaConstant = SchemaConstant("language");
pub const MESSAGE: SchemaField<String> =
    SchemaField::new("message", RuleField::Message, string_syntax);
pub const SINCE: SchemaField<String> = SchemaField::new("since", RuleField::Since, string_syntax);
pub const EXTERNAL_INFO_URL: SchemaField<String> =
    SchemaField::new("externalInfoUrl", RuleField::ExternalInfoUrl, string_syntax);
/// Version ids; resolved against the rule's language by the loader
pub const MINIMUM_LANGUAGE_VERSION: SchemaField<String> = SchemaField::new(
    "minimumLanguageVersion",
    RuleField::MinimumLanguageVersion,
    string_syntax,
);
pub const MAXIMUM_LANGUAGE_VERSION: SchemaField<String> = SchemaField::new(
    "maximumLanguageVersion",
    RuleField::MaximumLanguageVersion,
    string_syntax,
);
pub const DEPRECATED: SchemaField<bool> =
    SchemaField::new("deprecated", RuleField::Deprecated, boolean_syntax);
pub const DESCRIPTION: SchemaField<String> =
    SchemaField::new("description", RuleField::Description, string_syntax);
pub const PRIORITY: SchemaField<RulePriority> =
    SchemaField::new("priority", RuleField::Priority, priority_syntax);
pub const EXAMPLE: SchemaField<String> =
    SchemaField::new("example", RuleField::Examples, string_syntax);
pub const PROPERTIES: SchemaConstant = SchemaConstant("properties");
pub const PROPERTY: SchemaConstant = SchemaConstant("property");
pub const PROPERTY_TYPE: SchemaConstant = SchemaConstant("type");
pub const PROPERTY_VALUE: SchemaConstant = SchemaConstant("value");
pub const EXCLUDE: SchemaConstant = SchemaConstant("exclude");
pub const EXCLUDE_PATTERN: SchemaConstant = SchemaConstant("exclude-pattern");
pub const INCLUDE_PATTERN: SchemaConstant = SchemaConstant("include-pattern");

/// Attributes that are accepted for compatibility but have no effect
pub const DEPRECATED_RULE_ATTRIBUTES: [SchemaConstant; 3] = [
    SchemaConstant("dfa"),
    SchemaConstant("typeResolution"),
    SchemaConstant("metrics"),
];

pub const RULESET_ATTRIBUTES: &[SchemaConstant] = &[NAME];

pub const RULE_DEFINITION_ATTRIBUTES: &[SchemaConstant] = &[
    NAME,
    CLASS,
    LANGUAGE,
    MESSAGE.constant(),
    SINCE.constant(),
    EXTERNAL_INFO_URL.constant(),
    MINIMUM_LANGUAGE_VERSION.constant(),
    MAXIMUM_LANGUAGE_VERSION.constant(),
    DEPRECATED.constant(),
];

pub const RULE_REFERENCE_ATTRIBUTES: &[SchemaConstant] = &[
    REF,
    NAME,
    MESSAGE.constant(),
    EXTERNAL_INFO_URL.constant(),
    MINIMUM_LANGUAGE_VERSION.constant(),
    MAXIMUM_LANGUAGE_VERSION.constant(),
    DEPRECATED.constant(),
];

pub const PROPERTY_ATTRIBUTES: &[SchemaConstant] =
    &[NAME, PROPERTY_VALUE, PROPERTY_TYPE, DESCRIPTION.constant()];

/// Warn about attributes of `element` outside `allowed`.
///
/// Prefixed attributes (`xsi:schemaLocation`) belong to other schemas and are skipped.
pub fn check_attributes(
    element: &XmlElement,
    allowed: &[SchemaConstant],
    err: &mut XmlErrorReporter<'_>,
) {
    let unknown: Vec<String> = element
        .attributes()
        .map(|(key, _)| key)
        .filter(|key| !key.contains(':'))
        .filter(|key| !allowed.iter().any(|c| c.xml_name() == *key))
        .filter(|key| !DEPRECATED_RULE_ATTRIBUTES.iter().any(|c| c.xml_name() == *key))
        .map(str::to_string)
        .collect();
    for key in unknown {
        err.warn(
            element,
            format!("Unknown attribute '{}' on <{}>", key, element.name()),
        );
    }
}

/// Warn about deprecated attributes that are present on `element`
pub fn check_deprecated_attributes(element: &XmlElement, err: &mut XmlErrorReporter<'_>) {
    for constant in DEPRECATED_RULE_ATTRIBUTES {
        if constant.has_attribute(element) {
            err.warn(
                element,
                format!(
                    "Attribute '{}' is deprecated and has no effect",
                    constant.xml_name()
                ),
            );
        }
    }
}
