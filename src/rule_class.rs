//! Rule implementation classes known to the loader

use crate::language::Language;
use crate::properties::{string_property, DescriptorRef, PropertyError, PropertySource};
use crate::rule::Rule;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Class of the built-in query rule, which accepts XML property definitions
pub const XPATH_RULE_CLASS: &str = "rulecraft.XPathRule";

/// A rule implementation: the properties it declares and whether a
/// rule-set document may add its own property definitions.
#[derive(Debug, Clone)]
pub struct RuleClass {
    name: String,
    descriptors: Vec<DescriptorRef>,
    accepts_definitions: bool,
}

impl RuleClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descriptors: Vec::new(),
            accepts_definitions: false,
        }
    }

    pub fn with_property(mut self, descriptor: DescriptorRef) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn accepting_definitions(mut self, accepts: bool) -> Self {
        self.accepts_definitions = accepts;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptors(&self) -> &[DescriptorRef] {
        &self.descriptors
    }

    pub fn accepts_definitions(&self) -> bool {
        self.accepts_definitions
    }

    /// Create a rule of this class with its properties declared
    pub fn instantiate(
        &self,
        rule_name: &str,
        language: Arc<Language>,
    ) -> Result<Rule, PropertyError> {
        let mut rule = Rule::new(rule_name, language, self.name.clone());
        for descriptor in &self.descriptors {
            rule.define_property(Arc::clone(descriptor))?;
        }
        Ok(rule)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuleClassRegistry {
    classes: BTreeMap<String, RuleClass>,
}

impl RuleClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in query rule class
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        if let Ok(xpath) = string_property("xpath")
            .desc("Query evaluated against the source tree")
            .default_value("")
            .build()
        {
            registry.register(
                RuleClass::new(XPATH_RULE_CLASS)
                    .with_property(xpath.erased())
                    .accepting_definitions(true),
            );
        }
        registry
    }

    /// Register a class, replacing one with the same name
    pub fn register(&mut self, class: RuleClass) {
        log::trace!("Registering rule class {}", class.name());
        self.classes.insert(class.name.clone(), class);
    }

    pub fn get(&self, name: &str) -> Option<&RuleClass> {
        self.classes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
