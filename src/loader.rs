//! Rule-set document loader
//!
//! Walks a `<ruleset>` document and builds a [`RuleSet`]. Each `<rule>` is
//! one of:
//!
//! - a definition (`class`, `language`, `name`),
//! - a reference to a whole rule-set (`ref="rulesets/base.xml"`),
//! - a reference to one rule of a rule-set (`ref="rulesets/base.xml/SomeRule"`),
//! - a reference to a rule defined earlier in the same document (`ref="SomeRule"`).
//!
//! Problems are reported to the [`MessageReporter`] and only cost the element
//! they occur in. The only hard failure is a top-level document that cannot
//! be found.

use crate::diagnostic::{MessageReporter, XmlErrorReporter};
use crate::language::LanguageRegistry;
use crate::properties::{decode_property_value, PropertySource, PropertyTypeId, RegexPattern};
use crate::resource::{Resource, ResourceError, ResourceLoader};
use crate::rule::{RuleDef, RuleDefMut, RulePriority};
use crate::rule_class::RuleClassRegistry;
use crate::rule_reference::{RuleField, RuleReference, RuleSetReference};
use crate::ruleset::{RuleEntry, RuleSet, RuleSetBuilder};
use crate::schema::{self, SchemaField};
use crate::xml::{XmlDocument, XmlElement};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Resource(#[from] ResourceError),
}

/// Loader settings
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Rules less severe than this are dropped from the loaded rule-set
    pub min_priority: RulePriority,
    /// Report references to deprecated rules
    pub warn_deprecated: bool,
    /// Keep deprecated rule references when importing a whole rule-set
    pub include_deprecated_rule_references: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            min_priority: RulePriority::Low,
            warn_deprecated: true,
            include_deprecated_rule_references: false,
        }
    }
}

/// Loads rule-set documents. Holds no per-load state, so one loader can be
/// shared by threads loading different documents.
pub struct RuleSetLoader {
    resources: Arc<dyn ResourceLoader>,
    languages: LanguageRegistry,
    rule_classes: RuleClassRegistry,
    options: LoaderOptions,
}

impl RuleSetLoader {
    pub fn new(
        resources: Arc<dyn ResourceLoader>,
        languages: LanguageRegistry,
        rule_classes: RuleClassRegistry,
    ) -> Self {
        Self {
            resources,
            languages,
            rule_classes,
            options: LoaderOptions::default(),
        }
    }

    pub fn with_options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_min_priority(mut self, min_priority: RulePriority) -> Self {
        self.options.min_priority = min_priority;
        self
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    pub fn languages(&self) -> &LanguageRegistry {
        &self.languages
    }

    pub fn rule_classes(&self) -> &RuleClassRegistry {
        &self.rule_classes
    }

    /// Load the rule-set document `name` through the resource loader
    pub fn load_from_resource(
        &self,
        name: &str,
        reporter: &mut dyn MessageReporter,
    ) -> Result<RuleSet, LoadError> {
        let resource = self.resources.load(name)?;
        Ok(self.load_resource(resource, reporter))
    }

    /// Load a document given as text. References still go through the resource loader.
    pub fn load_from_str(
        &self,
        name: &str,
        content: &str,
        reporter: &mut dyn MessageReporter,
    ) -> RuleSet {
        let resource = Resource {
            name: name.to_string(),
            location: PathBuf::from(name),
            content: content.to_string(),
        };
        self.load_resource(resource, reporter)
    }

    fn load_resource(&self, resource: Resource, reporter: &mut dyn MessageReporter) -> RuleSet {
        let mut context = LoadContext::new(self);
        context.in_progress.push(resource.name.clone());

        let mut err = XmlErrorReporter::new(resource.location.clone(), reporter);
        let mut builder = context.parse_document(&resource, &mut err);
        builder.filter_by_priority(self.options.min_priority);
        let rule_set = builder.build();

        log::debug!(
            "Loaded rule-set '{}' from {} with {} rules ({} errors, {} warnings)",
            rule_set.name(),
            resource.location.display(),
            rule_set.len(),
            err.error_count(),
            err.warning_count()
        );
        rule_set
    }
}

/// What a `ref` attribute points at
#[derive(Debug, Clone, PartialEq, Eq)]
enum RefTarget<'a> {
    RuleSet(&'a str),
    ExternalRule { rule_set: &'a str, rule: &'a str },
    LocalRule(&'a str),
}

impl<'a> RefTarget<'a> {
    fn parse(reference: &'a str) -> Self {
        if reference.to_lowercase().ends_with(".xml") {
            return RefTarget::RuleSet(reference);
        }
        match reference.rsplit_once('/') {
            Some((rule_set, rule)) if rule_set.to_lowercase().ends_with(".xml") => {
                RefTarget::ExternalRule { rule_set, rule }
            }
            _ => RefTarget::LocalRule(reference),
        }
    }
}

/// State of one load call: the referenced rule-sets read so far and the
/// chain of documents being read, for cycle detection.
struct LoadContext<'l> {
    loader: &'l RuleSetLoader,
    cache: HashMap<String, Option<Arc<RuleSet>>>,
    in_progress: Vec<String>,
}

impl<'l> LoadContext<'l> {
    fn new(loader: &'l RuleSetLoader) -> Self {
        Self {
            loader,
            cache: HashMap::new(),
            in_progress: Vec::new(),
        }
    }

    fn options(&self) -> &LoaderOptions {
        &self.loader.options
    }

    fn parse_document(
        &mut self,
        resource: &Resource,
        err: &mut XmlErrorReporter<'_>,
    ) -> RuleSetBuilder {
        let mut builder = RuleSetBuilder::new(resource.name.clone());
        builder.set_file_name(resource.name.clone());

        let document = match XmlDocument::parse(&resource.content) {
            Ok(document) => document,
            Err(e) => {
                err.error_at(e.line(), 0, format!("Malformed rule-set document: {}", e));
                return builder;
            }
        };
        let root = document.root();
        if !schema::RULESET.matches(root) {
            err.error(
                root,
                format!("Root element must be <ruleset>, found <{}>", root.name()),
            );
            return builder;
        }

        schema::check_attributes(root, schema::RULESET_ATTRIBUTES, err);
        if let Some(name) = schema::NAME.required_attribute(root, err) {
            builder.set_name(name);
        }

        for child in root.children() {
            match child.name() {
                n if n == schema::DESCRIPTION.xml_name() => {
                    if let Some(description) = schema::DESCRIPTION.read_element(child, err) {
                        builder.set_description(description);
                    }
                }
                n if n == schema::INCLUDE_PATTERN.xml_name() => {
                    if let Some(pattern) = parse_pattern(child, err) {
                        builder.add_include_pattern(pattern);
                    }
                }
                n if n == schema::EXCLUDE_PATTERN.xml_name() => {
                    if let Some(pattern) = parse_pattern(child, err) {
                        builder.add_exclude_pattern(pattern);
                    }
                }
                n if n == schema::RULE.xml_name() => self.parse_rule(&mut builder, child, err),
                other => err.warn(
                    child,
                    format!("Unexpected element <{}> in <ruleset>", other),
                ),
            }
        }
        builder
    }

    fn parse_rule(
        &mut self,
        builder: &mut RuleSetBuilder,
        element: &XmlElement,
        err: &mut XmlErrorReporter<'_>,
    ) {
        schema::check_deprecated_attributes(element, err);
        if !schema::REF.has_attribute(element) {
            self.parse_rule_definition(builder, element, err);
            return;
        }
        let Some(reference) = schema::REF.required_attribute(element, err) else {
            return;
        };
        match RefTarget::parse(reference) {
            RefTarget::RuleSet(rule_set) => {
                self.parse_rule_set_reference(builder, element, rule_set, err)
            }
            RefTarget::ExternalRule { rule_set, rule } => {
                self.parse_external_rule_reference(builder, element, rule_set, rule, err)
            }
            RefTarget::LocalRule(rule) => {
                self.parse_local_rule_reference(builder, element, rule, err)
            }
        }
    }

    /// Read a referenced rule-set, once per load call
    fn referenced_rule_set(
        &mut self,
        name: &str,
        element: &XmlElement,
        err: &mut XmlErrorReporter<'_>,
    ) -> Option<Arc<RuleSet>> {
        if let Some(cached) = self.cache.get(name) {
            if cached.is_none() {
                err.error(element, format!("Cannot load rule-set '{}'", name));
            }
            return cached.clone();
        }
        if self.in_progress.iter().any(|n| n == name) {
            err.error(
                element,
                format!(
                    "Cyclic rule-set reference: {} -> {}",
                    self.in_progress.join(" -> "),
                    name
                ),
            );
            return None;
        }

        let resource = match self.loader.resources.load(name) {
            Ok(resource) => resource,
            Err(e) => {
                err.error_with_cause(element, format!("Cannot load rule-set '{}'", name), e);
                self.cache.insert(name.to_string(), None);
                return None;
            }
        };

        self.in_progress.push(name.to_string());
        let builder = {
            let mut nested = XmlErrorReporter::new(resource.location.clone(), err.sink());
            self.parse_document(&resource, &mut nested)
        };
        self.in_progress.pop();

        let rule_set = Arc::new(builder.build());
        self.cache
            .insert(name.to_string(), Some(Arc::clone(&rule_set)));
        Some(rule_set)
    }

    /// `<rule ref="set.xml">`: import every rule of a rule-set
    fn parse_rule_set_reference(
        &mut self,
        builder: &mut RuleSetBuilder,
        element: &XmlElement,
        rule_set_name: &str,
        err: &mut XmlErrorReporter<'_>,
    ) {
        schema::check_attributes(element, &[schema::REF], err);

        let mut excludes = BTreeSet::new();
        let mut priority = None;
        for child in element.children() {
            if schema::EXCLUDE.matches(child) {
                if let Some(name) = schema::NAME.required_attribute(child, err) {
                    excludes.insert(name.to_string());
                }
            } else if schema::PRIORITY.matches(child) {
                priority = schema::PRIORITY.read_element(child, err);
            } else {
                err.warn(
                    child,
                    format!(
                        "Unexpected element <{}> in a rule-set reference",
                        child.name()
                    ),
                );
            }
        }

        let Some(rule_set) = self.referenced_rule_set(rule_set_name, element, err) else {
            return;
        };
        let rule_set_reference = RuleSetReference::all_rules(rule_set_name, excludes.iter().cloned());

        let mut used_excludes = BTreeSet::new();
        for entry in rule_set.rules() {
            if excludes.contains(entry.name()) {
                used_excludes.insert(entry.name().to_string());
                continue;
            }
            if entry.is_reference()
                && entry.is_deprecated()
                && !self.options().include_deprecated_rule_references
            {
                log::debug!(
                    "Skipping deprecated rule reference {} of {}",
                    entry.name(),
                    rule_set_name
                );
                continue;
            }
            let mut reference = reference_to(entry, rule_set_reference.clone());
            if let Some(priority) = priority {
                reference.set_priority(priority);
            }
            builder.add_rule_if_not_exists(reference);
        }

        for unused in excludes.difference(&used_excludes) {
            err.warn(
                element,
                format!(
                    "Exclude '{}' does not match any rule of rule-set '{}'",
                    unused, rule_set_name
                ),
            );
        }
    }

    /// `<rule ref="set.xml/Rule">`: import one rule, with local overrides
    fn parse_external_rule_reference(
        &mut self,
        builder: &mut RuleSetBuilder,
        element: &XmlElement,
        rule_set_name: &str,
        rule_name: &str,
        err: &mut XmlErrorReporter<'_>,
    ) {
        schema::check_attributes(element, schema::RULE_REFERENCE_ATTRIBUTES, err);
        let Some(rule_set) = self.referenced_rule_set(rule_set_name, element, err) else {
            return;
        };
        let Some(entry) = rule_set.get_rule_by_name(rule_name) else {
            err.error(
                element,
                format!(
                    "Unable to find referenced rule '{}' in rule-set '{}'",
                    rule_name, rule_set_name
                ),
            );
            return;
        };

        let rule_set_reference = RuleSetReference::single(rule_set_name);
        let reference = match entry.as_reference() {
            Some(renamed) if entry.is_deprecated() => {
                if self.options().warn_deprecated {
                    err.warn(
                        element,
                        format!(
                            "Use rule name '{}/{}' instead of the deprecated rule name '{}/{}'",
                            rule_set_name,
                            renamed.rule().name(),
                            rule_set_name,
                            rule_name
                        ),
                    );
                }
                RuleReference::new(Arc::clone(renamed.rule()), rule_set_reference)
            }
            _ => {
                if entry.is_deprecated() && self.options().warn_deprecated {
                    err.warn(
                        element,
                        format!(
                            "Rule '{}/{}' is deprecated",
                            rule_set_name, rule_name
                        ),
                    );
                }
                reference_to(entry, rule_set_reference)
            }
        };
        self.finish_reference(builder, element, reference, err);
    }

    /// `<rule ref="Rule">`: reference a rule defined earlier in this document
    fn parse_local_rule_reference(
        &mut self,
        builder: &mut RuleSetBuilder,
        element: &XmlElement,
        rule_name: &str,
        err: &mut XmlErrorReporter<'_>,
    ) {
        schema::check_attributes(element, schema::RULE_REFERENCE_ATTRIBUTES, err);
        let Some(entry) = builder.rule(rule_name).cloned() else {
            err.error(
                element,
                format!(
                    "Unable to find referenced rule '{}'; it must be defined earlier in the rule-set",
                    rule_name
                ),
            );
            return;
        };
        let rule_set_reference = RuleSetReference::single(builder.name());
        let reference = reference_to(&entry, rule_set_reference);
        self.finish_reference(builder, element, reference, err);
    }

    fn finish_reference(
        &mut self,
        builder: &mut RuleSetBuilder,
        element: &XmlElement,
        mut reference: RuleReference,
        err: &mut XmlErrorReporter<'_>,
    ) {
        self.apply_metadata(&mut reference, element, true, false, err);
        builder.add_rule_replace_if_exists(reference);
    }

    /// `<rule name=".." class=".." language="..">`
    fn parse_rule_definition(
        &mut self,
        builder: &mut RuleSetBuilder,
        element: &XmlElement,
        err: &mut XmlErrorReporter<'_>,
    ) {
        schema::check_attributes(element, schema::RULE_DEFINITION_ATTRIBUTES, err);
        let name = schema::NAME.required_attribute(element, err);
        let class_name = schema::CLASS.required_attribute(element, err);
        let language_id = schema::LANGUAGE.required_attribute(element, err);
        let (Some(name), Some(class_name), Some(language_id)) = (name, class_name, language_id)
        else {
            return;
        };

        let Some(class) = self.loader.rule_classes.get(class_name) else {
            err.error(element, format!("Unknown rule class '{}'", class_name));
            return;
        };
        let Some(language) = self.loader.languages.get(language_id) else {
            let known: Vec<&str> = self.loader.languages.iter().map(|l| l.id()).collect();
            err.error(
                element,
                format!(
                    "Unknown language '{}', expected one of: {}",
                    language_id,
                    known.join(", ")
                ),
            );
            return;
        };
        if builder.rule(name).is_some() {
            err.error(element, format!("Duplicate rule name '{}'", name));
            return;
        }

        let mut rule = match class.instantiate(name, Arc::clone(language)) {
            Ok(rule) => rule,
            Err(e) => {
                err.error_with_cause(element, format!("Cannot create rule '{}'", name), e);
                return;
            }
        };
        rule.set_rule_set_name(builder.name().to_string());
        if let Some(since) = schema::SINCE.read_attribute(element, err) {
            rule.set_since(since);
        }
        let accepts_definitions = class.accepts_definitions();
        self.apply_metadata(&mut rule, element, false, accepts_definitions, err);
        builder.add_rule(rule);
    }

    /// Attributes and child elements shared by definitions and references.
    ///
    /// On a reference, a value equal to the delegate's is not recorded as an
    /// override.
    fn apply_metadata(
        &self,
        target: &mut dyn RuleDefMut,
        element: &XmlElement,
        is_reference: bool,
        accepts_definitions: bool,
        err: &mut XmlErrorReporter<'_>,
    ) {
        if is_reference {
            if let Some(name) = schema::NAME.non_blank_attribute(element) {
                if name != target.name() {
                    target.set_name(name.to_string());
                }
            }
        }
        if let Some(message) = schema::MESSAGE.read_attribute(element, err) {
            if !is_reference || target.message() != Some(message.as_str()) {
                target.set_message(message);
            }
        }
        if let Some(url) = schema::EXTERNAL_INFO_URL.read_attribute(element, err) {
            if !is_reference || target.external_info_url() != Some(url.as_str()) {
                target.set_external_info_url(url);
            }
        }
        self.apply_version(target, element, &schema::MINIMUM_LANGUAGE_VERSION, is_reference, err);
        self.apply_version(target, element, &schema::MAXIMUM_LANGUAGE_VERSION, is_reference, err);
        if let Some(deprecated) = schema::DEPRECATED.read_attribute(element, err) {
            if !is_reference || target.is_deprecated() != deprecated {
                target.set_deprecated(deprecated);
            }
        }

        for child in element.children() {
            match child.name() {
                n if n == schema::DESCRIPTION.xml_name() => {
                    if let Some(text) = schema::DESCRIPTION.read_element(child, err) {
                        if !is_reference || target.description() != Some(text.as_str()) {
                            target.set_description(text);
                        }
                    }
                }
                n if n == schema::PRIORITY.xml_name() => {
                    if let Some(priority) = schema::PRIORITY.read_element(child, err) {
                        if !is_reference || target.priority() != priority {
                            target.set_priority(priority);
                        }
                    }
                }
                n if n == schema::EXAMPLE.xml_name() => {
                    // references keep only examples their rule lacks
                    if let Some(text) = schema::EXAMPLE.read_element(child, err) {
                        target.add_example(text);
                    }
                }
                n if n == schema::PROPERTIES.xml_name() => {
                    for property in child.children() {
                        if schema::PROPERTY.matches(property) {
                            parse_property(target, property, is_reference, accepts_definitions, err);
                        } else {
                            err.warn(
                                property,
                                format!("Unexpected element <{}> in <properties>", property.name()),
                            );
                        }
                    }
                }
                other => err.warn(
                    child,
                    format!("Unexpected element <{}> in <rule>", other),
                ),
            }
        }
    }

    fn apply_version(
        &self,
        target: &mut dyn RuleDefMut,
        element: &XmlElement,
        attribute: &SchemaField<String>,
        is_reference: bool,
        err: &mut XmlErrorReporter<'_>,
    ) {
        let Some(text) = attribute.read_attribute(element, err) else {
            return;
        };
        let language = Arc::clone(target.language());
        let Some(version) = language.version(&text) else {
            let known: Vec<&str> = language.versions().iter().map(|v| v.version()).collect();
            err.error(
                element,
                format!(
                    "Unknown version '{}' of language {} in '{}', expected one of: {}",
                    text,
                    language.id(),
                    attribute.xml_name(),
                    known.join(", ")
                ),
            );
            return;
        };
        let minimum = attribute.field() == RuleField::MinimumLanguageVersion;
        let current = if minimum {
            target.minimum_language_version()
        } else {
            target.maximum_language_version()
        };
        if is_reference && current == Some(version) {
            return;
        }
        let result = if minimum {
            target.set_minimum_language_version(version.clone())
        } else {
            target.set_maximum_language_version(version.clone())
        };
        if let Err(e) = result {
            err.error(element, e.to_string());
        }
    }
}

/// Reference to `entry` from another rule-set. A reference to a reference
/// copies its overrides and binds to the same rule.
fn reference_to(entry: &RuleEntry, rule_set_reference: RuleSetReference) -> RuleReference {
    match entry {
        RuleEntry::Rule(rule) => RuleReference::new(Arc::clone(rule), rule_set_reference),
        RuleEntry::Reference(reference) => {
            let mut copy = reference.deep_copy();
            copy.set_rule_set_reference(rule_set_reference);
            copy
        }
    }
}

fn parse_pattern(element: &XmlElement, err: &mut XmlErrorReporter<'_>) -> Option<RegexPattern> {
    match RegexPattern::new(element.text()) {
        Ok(pattern) => Some(pattern),
        Err(e) => {
            err.error_with_cause(
                element,
                format!("Invalid <{}> '{}'", element.name(), element.text()),
                e,
            );
            None
        }
    }
}

/// `<property>`: either a value for a declared property or, with `type`, a
/// new property definition.
fn parse_property(
    target: &mut dyn RuleDefMut,
    element: &XmlElement,
    is_reference: bool,
    accepts_definitions: bool,
    err: &mut XmlErrorReporter<'_>,
) {
    schema::check_attributes(element, schema::PROPERTY_ATTRIBUTES, err);
    let Some(name) = schema::NAME.required_attribute(element, err) else {
        return;
    };

    if schema::PROPERTY_TYPE.has_attribute(element) {
        if !accepts_definitions {
            err.error(
                element,
                format!(
                    "Rule '{}' of class '{}' does not accept property definitions",
                    target.name(),
                    target.rule_class()
                ),
            );
            return;
        }
        parse_property_definition(target, element, name, err);
        return;
    }

    let Some(descriptor) = target.property_descriptor(name) else {
        err.error(
            element,
            format!(
                "Cannot set non-existent property '{}' on rule '{}'",
                name,
                target.name()
            ),
        );
        return;
    };
    let Some(value) = decode_property_value(descriptor.as_ref(), element, err) else {
        return;
    };
    if is_reference && target.property_value(name).as_ref() == Some(&value) {
        return;
    }
    if let Err(e) = target.set_property_value(name, value) {
        err.error(element, e.to_string());
    }
}

fn parse_property_definition(
    target: &mut dyn RuleDefMut,
    element: &XmlElement,
    name: &str,
    err: &mut XmlErrorReporter<'_>,
) {
    let type_name = schema::PROPERTY_TYPE.attribute(element).unwrap_or_default();
    let property_type = match type_name.parse::<PropertyTypeId>() {
        Ok(property_type) => property_type,
        Err(_) => {
            let known: Vec<&str> = PropertyTypeId::ALL.iter().map(|t| t.name()).collect();
            err.error(
                element,
                format!(
                    "Unknown property type '{}', expected one of: {}",
                    type_name,
                    known.join(", ")
                ),
            );
            return;
        }
    };
    let Some(description) = schema::DESCRIPTION.required_attribute(element, err) else {
        return;
    };

    let default_value = match (schema::PROPERTY_VALUE.attribute(element), element.children()) {
        (Some(text), []) => match property_type.decode_text(text) {
            Ok(value) => value,
            Err(message) => {
                err.error(
                    element,
                    format!(
                        "Invalid default '{}' for property '{}': {}. Expected e.g. {}",
                        text,
                        name,
                        message,
                        property_type.examples().join(" or ")
                    ),
                );
                return;
            }
        },
        (None, [child]) => match property_type.decode_element(child, err) {
            Some(value) => value,
            None => return,
        },
        _ => {
            err.error(
                element,
                format!(
                    "Property definition '{}' needs exactly one default value, as attribute or element",
                    name
                ),
            );
            return;
        }
    };

    let descriptor = match property_type.build_descriptor(name, description, default_value) {
        Ok(descriptor) => descriptor,
        Err(e) => {
            err.error(element, e.to_string());
            return;
        }
    };
    if let Err(e) = target.define_property(descriptor) {
        err.error(element, e.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::{CollectingReporter, Severity};
    use crate::language::Language;
    use crate::properties::{int_property, AnyDescriptor, PropertyDescriptor, PropertyValue};
    use crate::resource::InMemoryResourceLoader;
    use crate::rule_class::RuleClass;
    use crate::rule_reference::RuleField;

    fn max_prop() -> PropertyDescriptor<i32> {
        int_property("max").desc("Upper bound").default_value(10).build().unwrap()
    }

    fn loader(resources: InMemoryResourceLoader) -> RuleSetLoader {
        let languages = LanguageRegistry::new().with_language(
            Language::new("dummy", "Dummy")
                .with_extensions(&["dummy"])
                .with_versions(&["1.0", "1.3", "1.7", "2.0"]),
        );
        let mut classes = RuleClassRegistry::with_builtins();
        classes.register(RuleClass::new("test.MaxRule").with_property(max_prop().erased()));
        RuleSetLoader::new(Arc::new(resources), languages, classes)
    }

    fn load(loader: &RuleSetLoader, xml: &str) -> (RuleSet, CollectingReporter) {
        let mut sink = CollectingReporter::new();
        let set = loader.load_from_str("test.xml", xml, &mut sink);
        (set, sink)
    }

    const BASE: &str = r#"<?xml version="1.0"?>
<ruleset name="base" xmlns="http://rulecraft.dev/ruleset/2.0.0">
    <description>Base rules</description>
    <rule name="MaxRule" class="test.MaxRule" language="dummy" message="too many" since="1.0">
        <description>Counts things</description>
        <priority>3</priority>
        <example>a b c</example>
    </rule>
    <rule name="OtherRule" class="test.MaxRule" language="dummy" message="other">
        <priority>1</priority>
    </rule>
    <rule name="OldRule" ref="OtherRule" deprecated="true"/>
</ruleset>"#;

    fn base_loader() -> RuleSetLoader {
        loader(InMemoryResourceLoader::new().with_resource("rulesets/base.xml", BASE))
    }

    #[test]
    fn test_ref_target_parsing() {
        assert_eq!(RefTarget::parse("a/b.xml"), RefTarget::RuleSet("a/b.xml"));
        assert_eq!(
            RefTarget::parse("a/b.xml/Rule"),
            RefTarget::ExternalRule { rule_set: "a/b.xml", rule: "Rule" }
        );
        assert_eq!(RefTarget::parse("Rule"), RefTarget::LocalRule("Rule"));
    }

    #[test]
    fn test_rule_definition() {
        let (set, sink) = load(&base_loader(), BASE);
        assert!(sink.is_empty(), "{:?}", sink.diagnostics());
        assert_eq!(set.name(), "base");
        assert_eq!(set.description(), "Base rules");
        assert_eq!(set.len(), 3);

        let rule = set.get_rule_by_name("MaxRule").unwrap();
        assert_eq!(rule.message(), Some("too many"));
        assert_eq!(rule.priority(), RulePriority::Medium);
        assert_eq!(rule.since(), Some("1.0"));
        assert_eq!(rule.rule_set_name(), Some("base"));
        assert_eq!(rule.examples().to_vec(), vec!["a b c".to_string()]);
        assert_eq!(rule.property(&max_prop()), 10);

        let old = set.get_rule_by_name("OldRule").unwrap();
        assert!(old.is_reference());
        assert!(old.is_deprecated());
        assert_eq!(old.definition().name(), "OtherRule");
    }

    #[test]
    fn test_loader_resilience() {
        let xml = r#"<ruleset name="test">
            <rule ref="rulesets/base.xml/DoesNotExist"/>
            <rule ref="rulesets/base.xml/MaxRule"/>
        </ruleset>"#;
        let (set, sink) = load(&base_loader(), xml);
        assert_eq!(set.len(), 1);
        assert_eq!(sink.error_count(), 1);
        assert!(sink.has_message(Severity::Error, "DoesNotExist"));
    }

    #[test]
    fn test_reference_overrides() {
        let xml = r#"<ruleset name="test">
            <rule ref="rulesets/base.xml/MaxRule" message="custom">
                <priority>1</priority>
                <properties>
                    <property name="max" value="3"/>
                </properties>
            </rule>
        </ruleset>"#;
        let (set, sink) = load(&base_loader(), xml);
        assert!(sink.is_empty(), "{:?}", sink.diagnostics());

        let entry = set.get_rule_by_name("MaxRule").unwrap();
        let reference = entry.as_reference().unwrap();
        assert_eq!(reference.message(), Some("custom"));
        assert_eq!(reference.priority(), RulePriority::High);
        assert_eq!(reference.get_property(&max_prop()), 3);
        assert_eq!(reference.rule().get_property(&max_prop()), 10);
        assert!(!reference.is_overridden(RuleField::Description));
        assert_eq!(reference.rule_set_reference().rule_set_file_name(), "rulesets/base.xml");
    }

    #[test]
    fn test_same_value_is_not_an_override() {
        let xml = r#"<ruleset name="test">
            <rule ref="rulesets/base.xml/MaxRule" message="too many">
                <priority>3</priority>
                <example>a b c</example>
                <properties><property name="max" value="10"/></properties>
            </rule>
        </ruleset>"#;
        let (set, sink) = load(&base_loader(), xml);
        assert!(sink.is_empty());
        let reference = set.get_rule_by_name("MaxRule").unwrap();
        let reference = reference.as_reference().unwrap();
        assert!(!reference.has_overrides());
    }

    #[test]
    fn test_malformed_property_keeps_default() {
        let xml = r#"<ruleset name="test">
            <rule ref="rulesets/base.xml/MaxRule">
                <properties><property name="max" value="lots"/></properties>
            </rule>
        </ruleset>"#;
        let (set, sink) = load(&base_loader(), xml);
        assert_eq!(set.len(), 1);
        assert_eq!(sink.error_count(), 1);
        assert!(sink.has_message(Severity::Error, "Invalid value 'lots'"));
        assert_eq!(set.rules()[0].property(&max_prop()), 10);
    }

    #[test]
    fn test_bad_priority_lists_expected_values() {
        let xml = r#"<ruleset name="test">
            <rule ref="rulesets/base.xml/MaxRule" deprecated="maybe">
                <priority>urgent</priority>
            </rule>
        </ruleset>"#;
        let (set, sink) = load(&base_loader(), xml);
        assert_eq!(set.len(), 1);
        assert_eq!(sink.error_count(), 2);
        assert!(sink.has_message(Severity::Error, "Invalid value 'urgent'"));
        assert!(sink.has_message(
            Severity::Error,
            "expected one of 1 (High), 2 (Medium High), 3 (Medium), 4 (Medium Low), 5 (Low)"
        ));
        assert!(sink.has_message(Severity::Error, "Expected e.g. <priority>1</priority>"));
        assert!(sink.has_message(Severity::Error, "Expected e.g. deprecated=\"true\""));

        let reference = set.rules()[0].as_reference().unwrap();
        assert_eq!(reference.priority(), RulePriority::Medium);
        assert!(!reference.has_overrides());
    }

    #[test]
    fn test_reference_keeps_only_new_examples() {
        let xml = r#"<ruleset name="test">
            <rule ref="rulesets/base.xml/MaxRule">
                <example>a b c</example>
                <example>d e f</example>
            </rule>
        </ruleset>"#;
        let (set, sink) = load(&base_loader(), xml);
        assert!(sink.is_empty(), "{:?}", sink.diagnostics());
        let reference = set.rules()[0].as_reference().unwrap();
        assert_eq!(reference.overridden_examples(), Some(&["d e f".to_string()][..]));
        assert_eq!(
            reference.examples().to_vec(),
            vec!["a b c".to_string(), "d e f".to_string()]
        );
    }

    #[test]
    fn test_whole_rule_set_import_with_excludes() {
        let xml = r#"<ruleset name="test">
            <rule ref="rulesets/base.xml">
                <exclude name="OtherRule"/>
                <exclude name="Missing"/>
            </rule>
        </ruleset>"#;
        let (set, sink) = load(&base_loader(), xml);
        let names: Vec<_> = set.rules().iter().map(|r| r.name().to_string()).collect();
        // the deprecated alias is skipped
        assert_eq!(names, vec!["MaxRule"]);
        assert_eq!(sink.warning_count(), 1);
        assert!(sink.has_message(Severity::Warning, "'Missing'"));

        let reference = set.rules()[0].as_reference().unwrap();
        assert!(reference.rule_set_reference().is_all_rules());
        assert!(reference.rule_set_reference().excludes().contains("OtherRule"));
    }

    #[test]
    fn test_import_can_keep_deprecated_references() {
        let loader = base_loader().with_options(LoaderOptions {
            include_deprecated_rule_references: true,
            ..LoaderOptions::default()
        });
        let (set, _) = load(&loader, r#"<ruleset name="t"><rule ref="rulesets/base.xml"/></ruleset>"#);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_whole_import_then_customize_one_rule() {
        let xml = r#"<ruleset name="test">
            <rule ref="rulesets/base.xml"/>
            <rule ref="rulesets/base.xml/OtherRule"><priority>5</priority></rule>
        </ruleset>"#;
        let (set, sink) = load(&base_loader(), xml);
        assert!(sink.is_empty());
        assert_eq!(set.len(), 2);
        assert_eq!(set.rules()[1].name(), "OtherRule");
        assert_eq!(set.rules()[1].priority(), RulePriority::Low);
    }

    #[test]
    fn test_deprecated_renamed_rule_binds_to_target() {
        let xml = r#"<ruleset name="test"><rule ref="rulesets/base.xml/OldRule"/></ruleset>"#;
        let (set, sink) = load(&base_loader(), xml);
        assert_eq!(sink.warning_count(), 1);
        assert!(sink.has_message(Severity::Warning, "'rulesets/base.xml/OtherRule'"));
        let entry = &set.rules()[0];
        assert_eq!(entry.name(), "OtherRule");
        assert!(!entry.is_deprecated());
    }

    #[test]
    fn test_missing_rule_set_is_an_error() {
        let xml = r#"<ruleset name="test">
            <rule ref="rulesets/missing.xml"/>
            <rule ref="rulesets/missing.xml/Rule"/>
        </ruleset>"#;
        let (set, sink) = load(&base_loader(), xml);
        assert!(set.is_empty());
        assert_eq!(sink.error_count(), 2);
    }

    #[test]
    fn test_cyclic_reference() {
        let a = r#"<ruleset name="a"><rule ref="b.xml"/></ruleset>"#;
        let b = r#"<ruleset name="b"><rule ref="a.xml"/></ruleset>"#;
        let loader = loader(
            InMemoryResourceLoader::new()
                .with_resource("a.xml", a)
                .with_resource("b.xml", b),
        );
        let mut sink = CollectingReporter::new();
        let set = loader.load_from_resource("a.xml", &mut sink).unwrap();
        assert!(set.is_empty());
        assert!(sink.has_message(Severity::Error, "Cyclic rule-set reference: a.xml -> b.xml -> a.xml"));
    }

    #[test]
    fn test_top_level_lookup_failure() {
        let mut sink = CollectingReporter::new();
        let result = base_loader().load_from_resource("nope.xml", &mut sink);
        assert!(matches!(result, Err(LoadError::Resource(ResourceError::NotFound(_)))));
    }

    #[test]
    fn test_malformed_document_reports_error() {
        let (set, sink) = load(&base_loader(), "<ruleset name='x'><rule>");
        assert!(set.is_empty());
        assert_eq!(sink.error_count(), 1);
        assert!(sink.has_message(Severity::Error, "Malformed rule-set document"));

        let (_, sink) = load(&base_loader(), "<rules/>");
        assert!(sink.has_message(Severity::Error, "Root element must be <ruleset>"));
    }

    #[test]
    fn test_definition_errors_skip_only_that_rule() {
        let xml = r#"<ruleset name="test">
            <rule name="A" class="test.Unknown" language="dummy"/>
            <rule name="B" class="test.MaxRule" language="cobol"/>
            <rule class="test.MaxRule" language="dummy"/>
            <rule name="C" class="test.MaxRule" language="dummy"/>
            <rule name="C" class="test.MaxRule" language="dummy"/>
        </ruleset>"#;
        let (set, sink) = load(&base_loader(), xml);
        assert_eq!(set.len(), 1);
        assert_eq!(sink.error_count(), 4);
        assert!(sink.has_message(Severity::Error, "Unknown rule class 'test.Unknown'"));
        assert!(sink.has_message(Severity::Error, "Unknown language 'cobol'"));
        assert!(sink.has_message(Severity::Error, "Duplicate rule name 'C'"));
    }

    #[test]
    fn test_unknown_attributes_and_elements_warn() {
        let xml = r#"<ruleset name="test" colour="red">
            <rule name="A" class="test.MaxRule" language="dummy" typeResolution="true">
                <notes>hello</notes>
            </rule>
            <extras/>
        </ruleset>"#;
        let (set, sink) = load(&base_loader(), xml);
        assert_eq!(set.len(), 1);
        assert_eq!(sink.error_count(), 0);
        assert_eq!(sink.warning_count(), 4);
    }

    #[test]
    fn test_language_versions() {
        let xml = r#"<ruleset name="test">
            <rule name="A" class="test.MaxRule" language="dummy"
                  minimumLanguageVersion="1.3" maximumLanguageVersion="9.9"/>
        </ruleset>"#;
        let (set, sink) = load(&base_loader(), xml);
        assert_eq!(sink.error_count(), 1);
        assert!(sink.has_message(Severity::Error, "Unknown version '9.9'"));
        let rule = &set.rules()[0];
        assert_eq!(rule.minimum_language_version().unwrap().version(), "1.3");
        assert!(rule.maximum_language_version().is_none());
    }

    #[test]
    fn test_property_definitions() {
        let xml = r#"<ruleset name="test">
            <rule name="Query" class="rulecraft.XPathRule" language="dummy">
                <properties>
                    <property name="xpath" value="//Foo"/>
                    <property name="limit" type="Integer" description="Limit" value="4"/>
                    <property name="names" type="List[String]" description="Names">
                        <seq><value>a</value><value>b</value></seq>
                    </property>
                </properties>
            </rule>
            <rule name="Plain" class="test.MaxRule" language="dummy">
                <properties>
                    <property name="limit" type="Integer" description="Limit" value="4"/>
                </properties>
            </rule>
        </ruleset>"#;
        let (set, sink) = load(&base_loader(), xml);
        assert_eq!(sink.error_count(), 1);
        assert!(sink.has_message(Severity::Error, "does not accept property definitions"));

        let query = set.get_rule_by_name("Query").unwrap();
        assert_eq!(query.property_value("xpath"), Some(PropertyValue::new("//Foo".to_string())));
        assert_eq!(query.property_value("limit"), Some(PropertyValue::new(4i32)));
        assert_eq!(
            query.property_value("names"),
            Some(PropertyValue::new(vec!["a".to_string(), "b".to_string()]))
        );
        assert!(query.property_descriptor("limit").unwrap().is_defined_externally());
    }

    #[test]
    fn test_bad_property_definitions() {
        let xml = r#"<ruleset name="test">
            <rule name="Query" class="rulecraft.XPathRule" language="dummy">
                <properties>
                    <property name="a" type="Float" description="A" value="1"/>
                    <property name="b" type="Integer" value="1"/>
                    <property name="c" type="Integer" description="C"/>
                    <property name="xpath" type="String" description="dup" value=""/>
                </properties>
            </rule>
        </ruleset>"#;
        let (set, sink) = load(&base_loader(), xml);
        assert_eq!(set.len(), 1);
        assert_eq!(sink.error_count(), 4);
        assert!(sink.has_message(Severity::Error, "Unknown property type 'Float'"));
        assert!(sink.has_message(Severity::Error, "Missing required attribute 'description'"));
        assert!(sink.has_message(Severity::Error, "needs exactly one default value"));
        assert!(sink.has_message(Severity::Error, "already declared"));
    }

    #[test]
    fn test_patterns() {
        let xml = r#"<ruleset name="test">
            <exclude-pattern>.*/generated/.*</exclude-pattern>
            <include-pattern>.*/generated/keep/.*</include-pattern>
            <exclude-pattern>(unclosed</exclude-pattern>
        </ruleset>"#;
        let (set, sink) = load(&base_loader(), xml);
        assert_eq!(set.exclude_patterns().len(), 1);
        assert_eq!(set.include_patterns().len(), 1);
        assert_eq!(sink.error_count(), 1);
    }

    #[test]
    fn test_min_priority_filter() {
        let loader = base_loader().with_min_priority(RulePriority::High);
        let (set, _) = load(&loader, BASE);
        let names: Vec<_> = set.rules().iter().map(|r| r.name().to_string()).collect();
        assert_eq!(names, vec!["OtherRule", "OldRule"]);
    }

    #[test]
    fn test_reference_chain_copies_overrides() {
        let middle = r#"<ruleset name="middle">
            <rule ref="rulesets/base.xml/MaxRule" message="middle message"/>
        </ruleset>"#;
        let loader = loader(
            InMemoryResourceLoader::new()
                .with_resource("rulesets/base.xml", BASE)
                .with_resource("rulesets/middle.xml", middle),
        );
        let xml = r#"<ruleset name="top"><rule ref="rulesets/middle.xml/MaxRule"/></ruleset>"#;
        let (set, sink) = load(&loader, xml);
        assert!(sink.is_empty());

        let reference = set.rules()[0].as_reference().unwrap();
        assert_eq!(reference.message(), Some("middle message"));
        assert_eq!(reference.rule().name(), "MaxRule");
        assert!(reference.rule().as_reference().is_none());
        assert_eq!(reference.rule_set_reference().rule_set_file_name(), "rulesets/middle.xml");
    }

    #[test]
    fn test_referenced_document_errors_name_that_document() {
        let broken = r#"<ruleset name="broken"><rule name="X" class="nope" language="dummy"/></ruleset>"#;
        let loader = loader(InMemoryResourceLoader::new().with_resource("broken.xml", broken));
        let (_, sink) = load(&loader, r#"<ruleset name="t"><rule ref="broken.xml"/></ruleset>"#);
        assert_eq!(sink.error_count(), 1);
        assert_eq!(sink.diagnostics()[0].location.file, PathBuf::from("broken.xml"));
    }
}
