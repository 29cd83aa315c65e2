//! Serialization of rule-sets back to rule-set documents
//!
//! Definitions are written with all their metadata. References are written
//! as `ref` plus what they override, so reloading the output through the
//! same resources yields an equivalent rule-set. Whole rule-set imports are
//! collapsed back into a single `<rule ref="set.xml">` with its excludes.

use crate::properties::{
    encode_property_value, AnyDescriptor, DescriptorRef, PropertySource, PropertyValue,
};
use crate::rule::{Rule, RuleDef};
use crate::rule_reference::{RuleField, RuleReference};
use crate::ruleset::{RuleEntry, RuleSet};
use crate::schema::{self, RULESET_NAMESPACE};
use crate::xml::{XmlDocument, XmlElement, XmlError};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Writes [`RuleSet`]s as XML
#[derive(Debug, Clone)]
pub struct RuleSetWriter {
    namespace: bool,
}

impl Default for RuleSetWriter {
    fn default() -> Self {
        Self { namespace: true }
    }
}

impl RuleSetWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether to declare the rule-set namespace on the root element
    pub fn with_namespace(mut self, namespace: bool) -> Self {
        self.namespace = namespace;
        self
    }

    pub fn to_document(&self, rule_set: &RuleSet) -> XmlDocument {
        let mut root = XmlElement::new(schema::RULESET.xml_name())
            .with_attr(schema::NAME.xml_name(), rule_set.name());
        if self.namespace {
            root.set_attr("xmlns", RULESET_NAMESPACE);
        }
        if !rule_set.description().is_empty() {
            root.add_child(schema::DESCRIPTION.xml_name())
                .set_text(rule_set.description());
        }
        for pattern in rule_set.exclude_patterns() {
            root.add_child(schema::EXCLUDE_PATTERN.xml_name())
                .set_text(pattern.as_str());
        }
        for pattern in rule_set.include_patterns() {
            root.add_child(schema::INCLUDE_PATTERN.xml_name())
                .set_text(pattern.as_str());
        }

        let mut imported = HashSet::new();
        for entry in rule_set.rules() {
            match entry {
                RuleEntry::Rule(rule) => root.push_child(rule_definition(rule)),
                RuleEntry::Reference(reference) => {
                    let rsr = reference.rule_set_reference();
                    if rsr.is_all_rules() {
                        if imported.insert(rsr.rule_set_file_name().to_string()) {
                            root.push_child(rule_set_import(reference));
                        }
                    } else {
                        root.push_child(rule_reference(reference));
                    }
                }
            }
        }
        XmlDocument::new(root)
    }

    pub fn write_to_string(&self, rule_set: &RuleSet) -> Result<String, XmlError> {
        self.to_document(rule_set).to_xml_string()
    }

    pub fn write_to_file(&self, rule_set: &RuleSet, path: &Path) -> anyhow::Result<()> {
        let content = self.write_to_string(rule_set)?;
        fs::write(path, content)?;
        log::debug!("Wrote rule-set '{}' to {}", rule_set.name(), path.display());
        Ok(())
    }
}

fn rule_definition(rule: &Rule) -> XmlElement {
    let mut element = XmlElement::new(schema::RULE.xml_name())
        .with_attr(schema::NAME.xml_name(), rule.name())
        .with_attr(schema::LANGUAGE.xml_name(), rule.language().id())
        .with_attr(schema::CLASS.xml_name(), rule.rule_class());
    if let Some(since) = rule.since() {
        element.set_attr(schema::SINCE.xml_name(), since);
    }
    if let Some(message) = rule.message() {
        element.set_attr(schema::MESSAGE.xml_name(), message);
    }
    if let Some(url) = rule.external_info_url() {
        element.set_attr(schema::EXTERNAL_INFO_URL.xml_name(), url);
    }
    if let Some(version) = rule.minimum_language_version() {
        element.set_attr(schema::MINIMUM_LANGUAGE_VERSION.xml_name(), version.version());
    }
    if let Some(version) = rule.maximum_language_version() {
        element.set_attr(schema::MAXIMUM_LANGUAGE_VERSION.xml_name(), version.version());
    }
    if rule.is_deprecated() {
        element.set_attr(schema::DEPRECATED.xml_name(), "true");
    }

    if let Some(description) = rule.description() {
        element
            .add_child(schema::DESCRIPTION.xml_name())
            .set_text(description);
    }
    element
        .add_child(schema::PRIORITY.xml_name())
        .set_text(rule.priority().number().to_string());
    for example in rule.examples().iter() {
        element.add_child(schema::EXAMPLE.xml_name()).set_text(example.as_str());
    }

    let mut properties = XmlElement::new(schema::PROPERTIES.xml_name());
    for descriptor in rule.property_descriptors() {
        let value = rule.explicit_property_value(descriptor.name());
        if descriptor.is_defined_externally() {
            let value = value.cloned().unwrap_or_else(|| descriptor.default_value());
            properties.push_child(property_definition(&descriptor, &value));
        } else if let Some(value) = value {
            properties.push_child(property_value(&descriptor, value));
        }
    }
    if !properties.children().is_empty() {
        element.push_child(properties);
    }
    element
}

fn rule_reference(reference: &RuleReference) -> XmlElement {
    let rsr = reference.rule_set_reference();
    let target = if rsr.rule_set_file_name().to_lowercase().ends_with(".xml") {
        format!("{}/{}", rsr.rule_set_file_name(), referenced_name(reference))
    } else {
        referenced_name(reference).to_string()
    };
    let mut element =
        XmlElement::new(schema::RULE.xml_name()).with_attr(schema::REF.xml_name(), target);

    if let Some(name) = reference.overridden_name() {
        element.set_attr(schema::NAME.xml_name(), name);
    }
    if let Some(message) = reference.overridden_message() {
        element.set_attr(schema::MESSAGE.xml_name(), message);
    }
    if let Some(url) = reference.overridden_external_info_url() {
        element.set_attr(schema::EXTERNAL_INFO_URL.xml_name(), url);
    }
    if let Some(version) = reference.overridden_minimum_language_version() {
        element.set_attr(schema::MINIMUM_LANGUAGE_VERSION.xml_name(), version.version());
    }
    if let Some(version) = reference.overridden_maximum_language_version() {
        element.set_attr(schema::MAXIMUM_LANGUAGE_VERSION.xml_name(), version.version());
    }
    if let Some(deprecated) = reference.overridden_deprecated() {
        element.set_attr(schema::DEPRECATED.xml_name(), deprecated.to_string());
    }

    if let Some(description) = reference.overridden_description() {
        element
            .add_child(schema::DESCRIPTION.xml_name())
            .set_text(description);
    }
    if let Some(priority) = reference.overridden_priority() {
        element
            .add_child(schema::PRIORITY.xml_name())
            .set_text(priority.number().to_string());
    }
    for example in reference.overridden_examples().unwrap_or_default() {
        element.add_child(schema::EXAMPLE.xml_name()).set_text(example.as_str());
    }

    let mut properties = XmlElement::new(schema::PROPERTIES.xml_name());
    for descriptor in reference.own_property_descriptors() {
        let value = reference
            .overridden_property_value(descriptor.name())
            .cloned()
            .unwrap_or_else(|| descriptor.default_value());
        properties.push_child(property_definition(descriptor, &value));
    }
    for descriptor in reference.overridden_property_descriptors() {
        if reference
            .own_property_descriptors()
            .iter()
            .any(|own| own.name() == descriptor.name())
        {
            continue;
        }
        if let Some(value) = reference.overridden_property_value(descriptor.name()) {
            properties.push_child(property_value(&descriptor, value));
        }
    }
    if !properties.children().is_empty() {
        element.push_child(properties);
    }
    element
}

/// Name of the rule in the referenced rule-set
fn referenced_name(reference: &RuleReference) -> &str {
    match reference.overridden_name() {
        Some(_) => reference.rule().name(),
        None => reference.name(),
    }
}

fn rule_set_import(reference: &RuleReference) -> XmlElement {
    let rsr = reference.rule_set_reference();
    let mut element = XmlElement::new(schema::RULE.xml_name())
        .with_attr(schema::REF.xml_name(), rsr.rule_set_file_name());
    for exclude in rsr.excludes() {
        element.push_child(
            XmlElement::new(schema::EXCLUDE.xml_name())
                .with_attr(schema::NAME.xml_name(), exclude.as_str()),
        );
    }
    if reference.is_overridden(RuleField::Priority) {
        element
            .add_child(schema::PRIORITY.xml_name())
            .set_text(reference.priority().number().to_string());
    }
    element
}

fn property_definition(descriptor: &DescriptorRef, value: &PropertyValue) -> XmlElement {
    let mut element = XmlElement::new(schema::PROPERTY.xml_name())
        .with_attr(schema::NAME.xml_name(), descriptor.name());
    if let Some(property_type) = descriptor.property_type() {
        element.set_attr(schema::PROPERTY_TYPE.xml_name(), property_type.name());
    }
    element.set_attr(schema::DESCRIPTION.xml_name(), descriptor.description());
    encode_property_value(descriptor.as_ref(), &mut element, value);
    element
}

fn property_value(descriptor: &DescriptorRef, value: &PropertyValue) -> XmlElement {
    let mut element = XmlElement::new(schema::PROPERTY.xml_name())
        .with_attr(schema::NAME.xml_name(), descriptor.name());
    encode_property_value(descriptor.as_ref(), &mut element, value);
    element
}
