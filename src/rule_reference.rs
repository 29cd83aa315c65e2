//! Rule references: an imported rule plus local overrides
//!
//! A [`RuleReference`] shares its delegate [`Rule`] and keeps one optional
//! slot per overridable field. An empty slot inherits the delegate's value, a
//! filled slot shadows it. Slots are filled by the write path only, never
//! inferred by comparing values.

use crate::language::{Language, LanguageVersion};
use crate::properties::map::undeclared;
use crate::properties::{DescriptorRef, PropertyError, PropertySource, PropertyValue};
use crate::rule::{check_version_language, Rule, RuleDef, RuleDefMut, RuleError, RulePriority};
use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// Where a reference was imported from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSetReference {
    rule_set_file_name: String,
    all_rules: bool,
    excludes: BTreeSet<String>,
}

impl RuleSetReference {
    /// Reference to a single rule of a rule-set
    pub fn single(rule_set_file_name: impl Into<String>) -> Self {
        Self {
            rule_set_file_name: rule_set_file_name.into(),
            all_rules: false,
            excludes: BTreeSet::new(),
        }
    }

    /// Reference to a whole rule-set minus the excluded rule names
    pub fn all_rules(
        rule_set_file_name: impl Into<String>,
        excludes: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            rule_set_file_name: rule_set_file_name.into(),
            all_rules: true,
            excludes: excludes.into_iter().collect(),
        }
    }

    pub fn rule_set_file_name(&self) -> &str {
        &self.rule_set_file_name
    }

    pub fn is_all_rules(&self) -> bool {
        self.all_rules
    }

    pub fn excludes(&self) -> &BTreeSet<String> {
        &self.excludes
    }
}

/// Fields a reference can override. The language is not one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleField {
    Name,
    MinimumLanguageVersion,
    MaximumLanguageVersion,
    Since,
    RuleSetName,
    Message,
    Description,
    Examples,
    ExternalInfoUrl,
    Priority,
    Deprecated,
}

impl RuleField {
    pub const ALL: [RuleField; 11] = [
        RuleField::Name,
        RuleField::MinimumLanguageVersion,
        RuleField::MaximumLanguageVersion,
        RuleField::Since,
        RuleField::RuleSetName,
        RuleField::Message,
        RuleField::Description,
        RuleField::Examples,
        RuleField::ExternalInfoUrl,
        RuleField::Priority,
        RuleField::Deprecated,
    ];
}

impl fmt::Display for RuleField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuleField::Name => "name",
            RuleField::MinimumLanguageVersion => "minimum language version",
            RuleField::MaximumLanguageVersion => "maximum language version",
            RuleField::Since => "since",
            RuleField::RuleSetName => "rule-set name",
            RuleField::Message => "message",
            RuleField::Description => "description",
            RuleField::Examples => "examples",
            RuleField::ExternalInfoUrl => "external info url",
            RuleField::Priority => "priority",
            RuleField::Deprecated => "deprecated",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Overrides {
    name: Option<String>,
    minimum_language_version: Option<LanguageVersion>,
    maximum_language_version: Option<LanguageVersion>,
    since: Option<String>,
    rule_set_name: Option<String>,
    message: Option<String>,
    description: Option<String>,
    examples: Option<Vec<String>>,
    external_info_url: Option<String>,
    priority: Option<RulePriority>,
    deprecated: Option<bool>,
}

/// A rule imported from another rule-set, with local overrides
#[derive(Debug, Clone)]
pub struct RuleReference {
    rule: Arc<Rule>,
    rule_set_reference: RuleSetReference,
    overrides: Overrides,
    own_descriptors: Vec<DescriptorRef>,
    property_overrides: HashMap<String, PropertyValue>,
}

impl RuleReference {
    pub fn new(rule: Arc<Rule>, rule_set_reference: RuleSetReference) -> Self {
        Self {
            rule,
            rule_set_reference,
            overrides: Overrides::default(),
            own_descriptors: Vec::new(),
            property_overrides: HashMap::new(),
        }
    }

    /// The delegate rule
    pub fn rule(&self) -> &Arc<Rule> {
        &self.rule
    }

    pub fn rule_set_reference(&self) -> &RuleSetReference {
        &self.rule_set_reference
    }

    pub fn set_rule_set_reference(&mut self, rule_set_reference: RuleSetReference) {
        self.rule_set_reference = rule_set_reference;
    }

    /// Independent copy: own override slots, same delegate
    pub fn deep_copy(&self) -> Self {
        self.clone()
    }

    pub fn is_overridden(&self, field: RuleField) -> bool {
        let o = &self.overrides;
        match field {
            RuleField::Name => o.name.is_some(),
            RuleField::MinimumLanguageVersion => o.minimum_language_version.is_some(),
            RuleField::MaximumLanguageVersion => o.maximum_language_version.is_some(),
            RuleField::Since => o.since.is_some(),
            RuleField::RuleSetName => o.rule_set_name.is_some(),
            RuleField::Message => o.message.is_some(),
            RuleField::Description => o.description.is_some(),
            RuleField::Examples => o.examples.is_some(),
            RuleField::ExternalInfoUrl => o.external_info_url.is_some(),
            RuleField::Priority => o.priority.is_some(),
            RuleField::Deprecated => o.deprecated.is_some(),
        }
    }

    /// Whether any field or property is overridden
    pub fn has_overrides(&self) -> bool {
        self.overrides != Overrides::default()
            || !self.property_overrides.is_empty()
            || !self.own_descriptors.is_empty()
    }

    pub fn overridden_name(&self) -> Option<&str> {
        self.overrides.name.as_deref()
    }

    pub fn overridden_minimum_language_version(&self) -> Option<&LanguageVersion> {
        self.overrides.minimum_language_version.as_ref()
    }

    pub fn overridden_maximum_language_version(&self) -> Option<&LanguageVersion> {
        self.overrides.maximum_language_version.as_ref()
    }

    pub fn overridden_since(&self) -> Option<&str> {
        self.overrides.since.as_deref()
    }

    pub fn overridden_rule_set_name(&self) -> Option<&str> {
        self.overrides.rule_set_name.as_deref()
    }

    pub fn overridden_message(&self) -> Option<&str> {
        self.overrides.message.as_deref()
    }

    pub fn overridden_description(&self) -> Option<&str> {
        self.overrides.description.as_deref()
    }

    pub fn overridden_examples(&self) -> Option<&[String]> {
        self.overrides.examples.as_deref()
    }

    pub fn overridden_external_info_url(&self) -> Option<&str> {
        self.overrides.external_info_url.as_deref()
    }

    pub fn overridden_priority(&self) -> Option<RulePriority> {
        self.overrides.priority
    }

    pub fn overridden_deprecated(&self) -> Option<bool> {
        self.overrides.deprecated
    }

    /// Descriptors defined on this reference itself
    pub fn own_property_descriptors(&self) -> &[DescriptorRef] {
        &self.own_descriptors
    }

    /// Descriptors with a value set on this reference
    pub fn overridden_property_descriptors(&self) -> Vec<DescriptorRef> {
        self.property_descriptors()
            .into_iter()
            .filter(|d| self.property_overrides.contains_key(d.name()))
            .collect()
    }

    pub fn overridden_property_value(&self, name: &str) -> Option<&PropertyValue> {
        self.property_overrides.get(name)
    }

    fn own_descriptor(&self, name: &str) -> Option<&DescriptorRef> {
        self.own_descriptors.iter().find(|d| d.name() == name)
    }
}

impl PropertySource for RuleReference {
    fn source_name(&self) -> &str {
        self.name()
    }

    /// Delegate descriptors followed by the locally defined ones
    fn property_descriptors(&self) -> Vec<DescriptorRef> {
        let mut descriptors = self.rule.property_descriptors();
        for own in &self.own_descriptors {
            if !descriptors.iter().any(|d| d.name() == own.name()) {
                descriptors.push(Arc::clone(own));
            }
        }
        descriptors
    }

    fn property_descriptor(&self, name: &str) -> Option<DescriptorRef> {
        self.rule
            .property_descriptor(name)
            .or_else(|| self.own_descriptor(name).cloned())
    }

    fn property_value(&self, name: &str) -> Option<PropertyValue> {
        if let Some(value) = self.property_overrides.get(name) {
            return Some(value.clone());
        }
        self.rule
            .property_value(name)
            .or_else(|| self.own_descriptor(name).map(|d| d.default_value()))
    }

    fn is_property_set(&self, name: &str) -> bool {
        self.property_overrides.contains_key(name) || self.rule.is_property_set(name)
    }

    fn set_property_value(&mut self, name: &str, value: PropertyValue) -> Result<(), PropertyError> {
        let descriptor = self
            .property_descriptor(name)
            .ok_or_else(|| undeclared(self.name(), name))?;
        if !descriptor.accepts(&value) {
            return Err(PropertyError::TypeMismatch(name.to_string()));
        }
        self.property_overrides.insert(name.to_string(), value);
        Ok(())
    }

    fn define_property(&mut self, descriptor: DescriptorRef) -> Result<(), PropertyError> {
        if self.property_descriptor(descriptor.name()).is_some() {
            return Err(PropertyError::Duplicate(descriptor.name().to_string()));
        }
        self.own_descriptors.push(descriptor);
        Ok(())
    }
}

impl RuleDef for RuleReference {
    fn name(&self) -> &str {
        self.overrides
            .name
            .as_deref()
            .unwrap_or_else(|| self.rule.name())
    }

    fn language(&self) -> &Arc<Language> {
        self.rule.language()
    }

    fn minimum_language_version(&self) -> Option<&LanguageVersion> {
        self.overrides
            .minimum_language_version
            .as_ref()
            .or_else(|| self.rule.minimum_language_version())
    }

    fn maximum_language_version(&self) -> Option<&LanguageVersion> {
        self.overrides
            .maximum_language_version
            .as_ref()
            .or_else(|| self.rule.maximum_language_version())
    }

    fn since(&self) -> Option<&str> {
        self.overrides.since.as_deref().or_else(|| self.rule.since())
    }

    fn rule_class(&self) -> &str {
        self.rule.rule_class()
    }

    fn rule_set_name(&self) -> Option<&str> {
        self.overrides
            .rule_set_name
            .as_deref()
            .or_else(|| self.rule.rule_set_name())
    }

    fn message(&self) -> Option<&str> {
        self.overrides
            .message
            .as_deref()
            .or_else(|| self.rule.message())
    }

    fn description(&self) -> Option<&str> {
        self.overrides
            .description
            .as_deref()
            .or_else(|| self.rule.description())
    }

    /// The delegate's examples followed by the ones added here
    fn examples(&self) -> Cow<'_, [String]> {
        match &self.overrides.examples {
            Some(added) => {
                let mut examples = self.rule.examples().into_owned();
                examples.extend(added.iter().cloned());
                Cow::Owned(examples)
            }
            None => self.rule.examples(),
        }
    }

    fn external_info_url(&self) -> Option<&str> {
        self.overrides
            .external_info_url
            .as_deref()
            .or_else(|| self.rule.external_info_url())
    }

    fn priority(&self) -> RulePriority {
        self.overrides
            .priority
            .unwrap_or_else(|| self.rule.priority())
    }

    fn is_deprecated(&self) -> bool {
        self.overrides
            .deprecated
            .unwrap_or_else(|| self.rule.is_deprecated())
    }

    fn definition(&self) -> &Rule {
        &self.rule
    }

    fn as_reference(&self) -> Option<&RuleReference> {
        Some(self)
    }
}

impl RuleDefMut for RuleReference {
    fn set_name(&mut self, name: String) {
        self.overrides.name = Some(name);
    }

    fn set_language(&mut self, _language: Arc<Language>) -> Result<(), RuleError> {
        Err(RuleError::Unsupported(format!(
            "Cannot change the language of rule reference '{}'",
            self.name()
        )))
    }

    fn set_minimum_language_version(&mut self, version: LanguageVersion) -> Result<(), RuleError> {
        check_version_language(self.rule.language(), &version)?;
        self.overrides.minimum_language_version = Some(version);
        Ok(())
    }

    fn set_maximum_language_version(&mut self, version: LanguageVersion) -> Result<(), RuleError> {
        check_version_language(self.rule.language(), &version)?;
        self.overrides.maximum_language_version = Some(version);
        Ok(())
    }

    fn set_since(&mut self, since: String) {
        self.overrides.since = Some(since);
    }

    fn set_rule_set_name(&mut self, name: String) {
        self.overrides.rule_set_name = Some(name);
    }

    fn set_message(&mut self, message: String) {
        self.overrides.message = Some(message);
    }

    fn set_description(&mut self, description: String) {
        self.overrides.description = Some(description);
    }

    /// Examples the delegate already has are not overrides
    fn add_example(&mut self, example: String) {
        if self.rule.examples().contains(&example) {
            return;
        }
        let added = self.overrides.examples.get_or_insert_with(Vec::new);
        if !added.contains(&example) {
            added.push(example);
        }
    }

    fn set_external_info_url(&mut self, url: String) {
        self.overrides.external_info_url = Some(url);
    }

    fn set_priority(&mut self, priority: RulePriority) {
        self.overrides.priority = Some(priority);
    }

    fn set_deprecated(&mut self, deprecated: bool) {
        self.overrides.deprecated = Some(deprecated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::{int_property, string_property, PropertyDescriptor};
    use pretty_assertions::assert_eq;

    fn dummy() -> Arc<Language> {
        Arc::new(
            Language::new("dummy", "Dummy")
                .with_extensions(&["dummy"])
                .with_versions(&["1.0", "1.3", "1.7", "2.0"]),
        )
    }

    fn max_prop() -> PropertyDescriptor<i32> {
        int_property("max").desc("Upper bound").default_value(10).build().unwrap()
    }

    fn base_rule() -> Arc<Rule> {
        let mut rule = Rule::new("name1", dummy(), "Cls")
            .with_priority(RulePriority::High)
            .with_message("base message")
            .with_property(max_prop().erased())
            .unwrap();
        rule.add_example("example1".to_string());
        Arc::new(rule)
    }

    fn reference() -> RuleReference {
        RuleReference::new(base_rule(), RuleSetReference::single("rulesets/base.xml"))
    }

    #[test]
    fn test_no_override() {
        let r = reference();
        assert_eq!(r.name(), "name1");
        assert_eq!(r.overridden_name(), None);
        assert_eq!(r.priority(), RulePriority::High);
        assert_eq!(r.overridden_priority(), None);
        assert!(RuleField::ALL.iter().all(|f| !r.is_overridden(*f)));
        assert!(!r.has_overrides());
    }

    #[test]
    fn test_override() {
        let mut r = reference();
        r.set_name("name2".to_string());
        r.set_priority(RulePriority::MediumHigh);

        assert_eq!(r.name(), "name2");
        assert_eq!(r.overridden_name(), Some("name2"));
        assert_eq!(r.priority(), RulePriority::MediumHigh);
        assert!(r.is_overridden(RuleField::Priority));
        assert_eq!(r.rule().name(), "name1");
        assert_eq!(r.message(), Some("base message"));
    }

    #[test]
    fn test_same_value_write_is_still_an_override() {
        let mut r = reference();
        r.set_priority(RulePriority::High);
        assert!(r.is_overridden(RuleField::Priority));
        assert_eq!(r.priority(), r.rule().priority());
    }

    #[test]
    fn test_language_is_immutable() {
        let mut r = reference();
        assert!(matches!(r.set_language(dummy()), Err(RuleError::Unsupported(_))));
        let other = Arc::new(Language::new("other", "Other"));
        assert!(r.set_language(other).is_err());
        r.set_name("renamed".to_string());
        assert_eq!(r.language().id(), "dummy");
    }

    #[test]
    fn test_version_guard_leaves_slot_unchanged() {
        let lang = dummy();
        let other = Language::new("other", "Other").with_versions(&["1.3"]);
        let mut r = reference();

        r.set_minimum_language_version(lang.version("1.3").unwrap().clone())
            .unwrap();
        let err = r
            .set_minimum_language_version(other.version("1.3").unwrap().clone())
            .unwrap_err();
        assert!(matches!(err, RuleError::InvalidArgument(_)));
        assert_eq!(
            r.overridden_minimum_language_version(),
            lang.version("1.3")
        );

        assert!(r
            .set_maximum_language_version(other.version("1.3").unwrap().clone())
            .is_err());
        assert!(!r.is_overridden(RuleField::MaximumLanguageVersion));
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let mut original = reference();
        original.set_message("original".to_string());
        let mut copy = original.deep_copy();

        copy.set_message("copy".to_string());
        copy.set_property(&max_prop(), 3).unwrap();
        original.set_priority(RulePriority::Low);

        assert_eq!(original.message(), Some("original"));
        assert_eq!(copy.message(), Some("copy"));
        assert_eq!(original.get_property(&max_prop()), 10);
        assert_eq!(copy.get_property(&max_prop()), 3);
        assert_eq!(copy.overridden_priority(), None);
        assert!(Arc::ptr_eq(original.rule(), copy.rule()));
    }

    #[test]
    fn test_property_union_and_shadow() {
        let local = string_property("label").desc("Label").default_value("none").build().unwrap();
        let mut r = reference();
        r.define_property(local.erased()).unwrap();

        let names: Vec<_> = r.property_descriptors().iter().map(|d| d.name().to_string()).collect();
        assert_eq!(names, vec!["max", "label"]);
        assert!(r.overridden_property_descriptors().is_empty());
        assert_eq!(r.own_property_descriptors().len(), 1);

        r.set_property(&max_prop(), 42).unwrap();
        assert_eq!(r.get_property(&max_prop()), 42);
        assert_eq!(r.rule().get_property(&max_prop()), 10);
        assert_eq!(r.get_property(&local), "none");

        let overridden: Vec<_> = r
            .overridden_property_descriptors()
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(overridden, vec!["max"]);
        assert_eq!(r.own_property_descriptors()[0].name(), "label");
    }

    #[test]
    fn test_define_duplicate_of_delegate_property() {
        let mut r = reference();
        assert_eq!(
            r.define_property(max_prop().erased()).unwrap_err(),
            PropertyError::Duplicate("max".to_string())
        );
    }

    #[test]
    fn test_undeclared_property_is_rejected() {
        let other = string_property("other").desc("o").default_value("").build().unwrap();
        let mut r = reference();
        assert!(matches!(
            r.set_property(&other, "x".to_string()),
            Err(PropertyError::Undeclared { .. })
        ));
        assert!(r.overridden_property_value("other").is_none());
    }

    #[test]
    fn test_examples_extend_delegate() {
        let mut r = reference();
        r.add_example("example2".to_string());
        r.add_example("example2".to_string());

        assert_eq!(r.overridden_examples(), Some(&["example2".to_string()][..]));
        assert_eq!(r.examples().to_vec(), vec!["example1".to_string(), "example2".to_string()]);
        assert_eq!(r.rule().examples().len(), 1);
        assert!(r.is_overridden(RuleField::Examples));
    }

    #[test]
    fn test_delegate_example_is_not_an_override() {
        let mut r = reference();
        r.add_example("example1".to_string());

        assert_eq!(r.overridden_examples(), None);
        assert!(!r.is_overridden(RuleField::Examples));
        assert!(!r.has_overrides());
        assert_eq!(r.examples().to_vec(), vec!["example1".to_string()]);
    }

    #[test]
    fn test_override_fallback_for_every_field() {
        let lang = dummy();
        let base = reference();
        let mut r = base.deep_copy();
        r.set_since("1.0".to_string());
        r.set_description("desc".to_string());
        r.set_deprecated(true);
        r.set_maximum_language_version(lang.version("2.0").unwrap().clone()).unwrap();

        for field in RuleField::ALL {
            if !r.is_overridden(field) {
                continue;
            }
            assert!(!base.is_overridden(field), "{} leaked into the original", field);
        }
        assert_eq!(r.since(), r.overridden_since());
        assert_eq!(r.description(), r.overridden_description());
        assert_eq!(Some(r.is_deprecated()), r.overridden_deprecated());
        assert_eq!(r.external_info_url(), base.rule().external_info_url());
    }

    #[test]
    fn test_trait_object_view() {
        let r = reference();
        let view: &dyn RuleDef = &r;
        assert!(view.as_reference().is_some());
        assert_eq!(view.definition().name(), "name1");
        assert_eq!(view.property(&max_prop()), 10);
    }
}
