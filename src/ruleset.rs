//! Rule-sets: a mutable builder and the frozen snapshot it produces
//!
//! A [`RuleSet`] holds its entries behind `Arc` and has no mutators, so it can
//! be shared by parallel workers. Programmatic customization happens on a
//! [`RuleSetBuilder`] before [`RuleSetBuilder::build`].

use crate::properties::{PropertyError, PropertySource, RegexPattern};
use crate::rule::{Rule, RuleDef, RuleDefMut, RulePriority};
use crate::rule_reference::RuleReference;
use std::fmt;
use std::ops::Deref;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuleSetError {
    #[error("No rule named '{0}' in the rule-set")]
    UnknownRule(String),

    #[error("Invalid property override '{0}', expected Rule:property=value")]
    InvalidOverride(String),

    #[error(transparent)]
    Property(#[from] PropertyError),
}

/// A rule-set entry: a rule defined in place or a reference to one
#[derive(Debug, Clone)]
pub enum RuleEntry {
    Rule(Arc<Rule>),
    Reference(Arc<RuleReference>),
}

impl RuleEntry {
    pub fn is_reference(&self) -> bool {
        matches!(self, RuleEntry::Reference(_))
    }

    /// Mutable view; clones the entry first if it is shared
    pub fn make_mut(&mut self) -> &mut dyn RuleDefMut {
        match self {
            RuleEntry::Rule(rule) => Arc::<Rule>::make_mut(rule),
            RuleEntry::Reference(reference) => Arc::<RuleReference>::make_mut(reference),
        }
    }
}

impl Deref for RuleEntry {
    type Target = dyn RuleDef;

    fn deref(&self) -> &Self::Target {
        match self {
            RuleEntry::Rule(rule) => rule.as_ref(),
            RuleEntry::Reference(reference) => reference.as_ref(),
        }
    }
}

impl From<Rule> for RuleEntry {
    fn from(rule: Rule) -> Self {
        RuleEntry::Rule(Arc::new(rule))
    }
}

impl From<RuleReference> for RuleEntry {
    fn from(reference: RuleReference) -> Self {
        RuleEntry::Reference(Arc::new(reference))
    }
}

/// A `-P Rule:property=value` style override
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyOverride {
    pub rule: String,
    pub property: String,
    pub value: String,
}

impl FromStr for PropertyOverride {
    type Err = RuleSetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RuleSetError::InvalidOverride(s.to_string());
        let (target, value) = s.split_once('=').ok_or_else(invalid)?;
        let (rule, property) = target.split_once(':').ok_or_else(invalid)?;
        let (rule, property) = (rule.trim(), property.trim());
        if rule.is_empty() || property.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            rule: rule.to_string(),
            property: property.to_string(),
            value: value.to_string(),
        })
    }
}

impl fmt::Display for PropertyOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}={}", self.rule, self.property, self.value)
    }
}

/// Mutable stage of a rule-set
#[derive(Debug, Clone, Default)]
pub struct RuleSetBuilder {
    name: String,
    description: String,
    file_name: Option<String>,
    rules: Vec<RuleEntry>,
    include_patterns: Vec<RegexPattern>,
    exclude_patterns: Vec<RegexPattern>,
}

impl RuleSetBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn set_file_name(&mut self, file_name: impl Into<String>) {
        self.file_name = Some(file_name.into());
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.set_description(description);
        self
    }

    pub fn with_rule(mut self, entry: impl Into<RuleEntry>) -> Self {
        self.add_rule(entry);
        self
    }

    pub fn add_rule(&mut self, entry: impl Into<RuleEntry>) {
        self.rules.push(entry.into());
    }

    /// Add unless a rule with the same name exists. Returns whether it was added.
    pub fn add_rule_if_not_exists(&mut self, entry: impl Into<RuleEntry>) -> bool {
        let entry = entry.into();
        if self.rule(entry.name()).is_some() {
            log::debug!("Ignoring duplicate rule {}", entry.name());
            return false;
        }
        self.rules.push(entry);
        true
    }

    /// Add, replacing a rule with the same name in place.
    /// Returns whether a rule was replaced.
    pub fn add_rule_replace_if_exists(&mut self, entry: impl Into<RuleEntry>) -> bool {
        let entry = entry.into();
        match self.rules.iter().position(|r| r.name() == entry.name()) {
            Some(idx) => {
                log::debug!("Replacing rule {}", entry.name());
                self.rules[idx] = entry;
                true
            }
            None => {
                self.rules.push(entry);
                false
            }
        }
    }

    pub fn remove_rule(&mut self, name: &str) -> Option<RuleEntry> {
        let idx = self.rules.iter().position(|r| r.name() == name)?;
        Some(self.rules.remove(idx))
    }

    pub fn rule(&self, name: &str) -> Option<&RuleEntry> {
        self.rules.iter().find(|r| r.name() == name)
    }

    pub fn rule_mut(&mut self, name: &str) -> Option<&mut RuleEntry> {
        self.rules.iter_mut().find(|r| r.name() == name)
    }

    pub fn rules(&self) -> &[RuleEntry] {
        &self.rules
    }

    pub fn add_include_pattern(&mut self, pattern: RegexPattern) {
        self.include_patterns.push(pattern);
    }

    pub fn add_exclude_pattern(&mut self, pattern: RegexPattern) {
        self.exclude_patterns.push(pattern);
    }

    /// Drop rules less severe than `min_priority`
    pub fn filter_by_priority(&mut self, min_priority: RulePriority) {
        self.rules.retain(|r| {
            let keep = r.priority() >= min_priority;
            if !keep {
                log::debug!("Filtering out rule {} ({})", r.name(), r.priority());
            }
            keep
        });
    }

    /// Set a property from its string form, e.g. from the command line
    pub fn override_property(
        &mut self,
        rule_name: &str,
        property: &str,
        text: &str,
    ) -> Result<(), RuleSetError> {
        let entry = self
            .rule_mut(rule_name)
            .ok_or_else(|| RuleSetError::UnknownRule(rule_name.to_string()))?;
        let descriptor = entry.property_descriptor(property).ok_or_else(|| {
            PropertyError::Undeclared {
                rule: rule_name.to_string(),
                property: property.to_string(),
            }
        })?;
        let value = descriptor
            .decode_text(text)
            .map_err(|message| PropertyError::InvalidValue {
                property: property.to_string(),
                message,
            })?;
        entry.make_mut().set_property_value(property, value)?;
        Ok(())
    }

    pub fn apply_override(&mut self, o: &PropertyOverride) -> Result<(), RuleSetError> {
        self.override_property(&o.rule, &o.property, &o.value)
    }

    /// Freeze into an immutable rule-set
    pub fn build(self) -> RuleSet {
        RuleSet {
            name: self.name,
            description: self.description,
            file_name: self.file_name,
            rules: self.rules,
            include_patterns: self.include_patterns,
            exclude_patterns: self.exclude_patterns,
        }
    }
}

/// Frozen rule-set
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    name: String,
    description: String,
    file_name: Option<String>,
    rules: Vec<RuleEntry>,
    include_patterns: Vec<RegexPattern>,
    exclude_patterns: Vec<RegexPattern>,
}

impl RuleSet {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Resource the rule-set was loaded from
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn rules(&self) -> &[RuleEntry] {
        &self.rules
    }

    pub fn get_rule_by_name(&self, name: &str) -> Option<&RuleEntry> {
        self.rules.iter().find(|r| r.name() == name)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn include_patterns(&self) -> &[RegexPattern] {
        &self.include_patterns
    }

    pub fn exclude_patterns(&self) -> &[RegexPattern] {
        &self.exclude_patterns
    }

    /// Whether the rule-set should run on `path`: a file matching an exclude
    /// pattern is skipped unless an include pattern matches too.
    pub fn applies_to(&self, path: &Path) -> bool {
        let path = path.to_string_lossy().replace('\\', "/");
        let excluded = self.exclude_patterns.iter().any(|p| p.is_match(&path));
        if !excluded {
            return true;
        }
        self.include_patterns.iter().any(|p| p.is_match(&path))
    }

    /// Mutable copy sharing the rule entries until they are modified
    pub fn to_builder(&self) -> RuleSetBuilder {
        RuleSetBuilder {
            name: self.name.clone(),
            description: self.description.clone(),
            file_name: self.file_name.clone(),
            rules: self.rules.clone(),
            include_patterns: self.include_patterns.clone(),
            exclude_patterns: self.exclude_patterns.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;
    use crate::properties::{int_property, PropertyDescriptor};
    use crate::rule_reference::RuleSetReference;

    fn lang() -> Arc<Language> {
        Arc::new(Language::new("dummy", "Dummy"))
    }

    fn max_prop() -> PropertyDescriptor<i32> {
        int_property("max").desc("max").default_value(10).build().unwrap()
    }

    fn rule(name: &str, priority: RulePriority) -> Rule {
        Rule::new(name, lang(), "Cls")
            .with_priority(priority)
            .with_property(max_prop().erased())
            .unwrap()
    }

    #[test]
    fn test_override_text_parsing() {
        let o: PropertyOverride = "MyRule:max=5".parse().unwrap();
        assert_eq!(o.rule, "MyRule");
        assert_eq!(o.property, "max");
        assert_eq!(o.value, "5");
        assert_eq!(o.to_string(), "MyRule:max=5");

        let with_eq: PropertyOverride = "R:p=a=b".parse().unwrap();
        assert_eq!(with_eq.value, "a=b");

        assert!("MyRule=5".parse::<PropertyOverride>().is_err());
        assert!(":max=5".parse::<PropertyOverride>().is_err());
    }

    #[test]
    fn test_add_if_not_exists_and_replace() {
        let mut builder = RuleSetBuilder::new("set");
        assert!(builder.add_rule_if_not_exists(rule("A", RulePriority::High)));
        assert!(!builder.add_rule_if_not_exists(rule("A", RulePriority::Low)));
        assert_eq!(builder.rule("A").unwrap().priority(), RulePriority::High);

        builder.add_rule(rule("B", RulePriority::Low));
        assert!(builder.add_rule_replace_if_exists(rule("A", RulePriority::Medium)));
        let names: Vec<_> = builder.rules().iter().map(|r| r.name().to_string()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(builder.rule("A").unwrap().priority(), RulePriority::Medium);
        assert!(!builder.add_rule_replace_if_exists(rule("C", RulePriority::Medium)));
        assert_eq!(builder.rules().len(), 3);
    }

    #[test]
    fn test_filter_by_priority() {
        let mut builder = RuleSetBuilder::new("set")
            .with_rule(rule("A", RulePriority::High))
            .with_rule(rule("B", RulePriority::Medium))
            .with_rule(rule("C", RulePriority::Low));
        builder.filter_by_priority(RulePriority::Medium);
        let set = builder.build();
        assert_eq!(set.len(), 2);
        assert!(set.get_rule_by_name("C").is_none());
    }

    #[test]
    fn test_override_property_from_text() {
        let mut builder = RuleSetBuilder::new("set").with_rule(rule("A", RulePriority::High));
        builder.override_property("A", "max", "42").unwrap();
        let set = builder.build();
        assert_eq!(set.get_rule_by_name("A").unwrap().property(&max_prop()), 42);
    }

    #[test]
    fn test_override_property_errors() {
        let mut builder = RuleSetBuilder::new("set").with_rule(rule("A", RulePriority::High));
        assert_eq!(
            builder.override_property("Missing", "max", "1"),
            Err(RuleSetError::UnknownRule("Missing".to_string()))
        );
        assert!(matches!(
            builder.override_property("A", "nope", "1"),
            Err(RuleSetError::Property(PropertyError::Undeclared { .. }))
        ));
        assert!(matches!(
            builder.override_property("A", "max", "lots"),
            Err(RuleSetError::Property(PropertyError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_override_on_reference_does_not_touch_shared_delegate() {
        let delegate = Arc::new(rule("A", RulePriority::High));
        let reference = RuleReference::new(Arc::clone(&delegate), RuleSetReference::single("base.xml"));
        let mut builder = RuleSetBuilder::new("set").with_rule(reference);

        builder.override_property("A", "max", "3").unwrap();
        let set = builder.build();
        let entry = set.get_rule_by_name("A").unwrap();
        assert!(entry.is_reference());
        assert_eq!(entry.property(&max_prop()), 3);
        assert_eq!(delegate.get_property(&max_prop()), 10);
    }

    #[test]
    fn test_to_builder_is_independent() {
        let set = RuleSetBuilder::new("set")
            .with_rule(rule("A", RulePriority::High))
            .build();
        let mut builder = set.to_builder();
        builder.override_property("A", "max", "1").unwrap();
        builder.add_rule(rule("B", RulePriority::High));

        assert_eq!(set.len(), 1);
        assert_eq!(set.get_rule_by_name("A").unwrap().property(&max_prop()), 10);
        assert_eq!(builder.build().len(), 2);
    }

    #[test]
    fn test_applies_to_patterns() {
        let mut builder = RuleSetBuilder::new("set");
        builder.add_exclude_pattern(RegexPattern::new(".*/generated/.*").unwrap());
        builder.add_include_pattern(RegexPattern::new(".*/generated/keep/.*").unwrap());
        let set = builder.build();

        assert!(set.applies_to(Path::new("src/main/Foo.dummy")));
        assert!(!set.applies_to(Path::new("src/generated/Foo.dummy")));
        assert!(set.applies_to(Path::new("src/generated/keep/Foo.dummy")));
    }

    #[test]
    fn test_rule_set_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RuleSet>();
    }
}
