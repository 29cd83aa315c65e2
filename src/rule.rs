//! Rule definition, priority and the rule read/write views

use crate::language::{Language, LanguageVersion};
use crate::properties::map::{read_typed, undeclared};
use crate::properties::{
    DescriptorRef, PropertyDescriptor, PropertyError, PropertyMap, PropertySource, PropertyType,
    PropertyValue, ValueSyntax,
};
use crate::rule_reference::RuleReference;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuleError {
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Property(#[from] PropertyError),
}

/// Rule priority, ordered from least to most severe.
///
/// The numeric form used in rule-set documents runs the other way:
/// `1` is [`RulePriority::High`], `5` is [`RulePriority::Low`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum RulePriority {
    /// Nice to have
    #[default]
    Low,
    MediumLow,
    /// Should be fixed
    Medium,
    MediumHigh,
    /// Must be fixed
    High,
}

impl RulePriority {
    /// Every priority, most severe first
    pub const ALL: [RulePriority; 5] = [
        RulePriority::High,
        RulePriority::MediumHigh,
        RulePriority::Medium,
        RulePriority::MediumLow,
        RulePriority::Low,
    ];

    pub fn number(self) -> u8 {
        match self {
            RulePriority::High => 1,
            RulePriority::MediumHigh => 2,
            RulePriority::Medium => 3,
            RulePriority::MediumLow => 4,
            RulePriority::Low => 5,
        }
    }

    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(RulePriority::High),
            2 => Some(RulePriority::MediumHigh),
            3 => Some(RulePriority::Medium),
            4 => Some(RulePriority::MediumLow),
            5 => Some(RulePriority::Low),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RulePriority::High => "High",
            RulePriority::MediumHigh => "Medium High",
            RulePriority::Medium => "Medium",
            RulePriority::MediumLow => "Medium Low",
            RulePriority::Low => "Low",
        }
    }
}

/// Syntax of priority values in rule-set documents: the number, or the label
pub fn priority_syntax() -> ValueSyntax<RulePriority> {
    ValueSyntax::new(
        |s| {
            s.parse::<RulePriority>().map_err(|e| {
                let expected: Vec<String> = RulePriority::ALL
                    .iter()
                    .map(|p| format!("{} ({})", p.number(), p.label()))
                    .collect();
                format!("{}; expected one of {}", e, expected.join(", "))
            })
        },
        |p: &RulePriority| p.number().to_string(),
        "1",
    )
}

impl fmt::Display for RulePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl TryFrom<u8> for RulePriority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        RulePriority::from_number(value)
            .ok_or_else(|| format!("Priority must be between 1 and 5, got {}", value))
    }
}

impl From<RulePriority> for u8 {
    fn from(priority: RulePriority) -> u8 {
        priority.number()
    }
}

impl std::str::FromStr for RulePriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(number) = s.parse::<u8>() {
            return RulePriority::try_from(number);
        }
        match s.to_lowercase().replace(['_', '-', ' '], "").as_str() {
            "high" => Ok(RulePriority::High),
            "mediumhigh" => Ok(RulePriority::MediumHigh),
            "medium" => Ok(RulePriority::Medium),
            "mediumlow" => Ok(RulePriority::MediumLow),
            "low" => Ok(RulePriority::Low),
            _ => Err(format!("Unknown priority: {}", s)),
        }
    }
}

/// Read view shared by rules and rule references
pub trait RuleDef: PropertySource + fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn language(&self) -> &Arc<Language>;

    fn minimum_language_version(&self) -> Option<&LanguageVersion>;

    fn maximum_language_version(&self) -> Option<&LanguageVersion>;

    /// Release the rule first appeared in
    fn since(&self) -> Option<&str>;

    /// Implementation class, resolved through the rule class registry
    fn rule_class(&self) -> &str;

    /// Name of the rule-set the rule was defined in
    fn rule_set_name(&self) -> Option<&str>;

    fn message(&self) -> Option<&str>;

    fn description(&self) -> Option<&str>;

    fn examples(&self) -> Cow<'_, [String]>;

    fn external_info_url(&self) -> Option<&str>;

    fn priority(&self) -> RulePriority;

    fn is_deprecated(&self) -> bool;

    /// The rule definition this rule ultimately is or delegates to
    fn definition(&self) -> &Rule;

    fn as_reference(&self) -> Option<&RuleReference> {
        None
    }

    /// Whether `version` lies within the inclusive version bounds
    fn supports_version(&self, version: &LanguageVersion) -> bool {
        if !version.belongs_to(self.language()) {
            return false;
        }
        let above_min = self
            .minimum_language_version()
            .map_or(true, |min| version >= min);
        let below_max = self
            .maximum_language_version()
            .map_or(true, |max| version <= max);
        above_min && below_max
    }
}

impl dyn RuleDef + '_ {
    /// Typed property read
    pub fn property<T: PropertyType>(&self, descriptor: &PropertyDescriptor<T>) -> T {
        read_typed(self.property_value(descriptor.name()), descriptor)
    }
}

/// Write view shared by rules and rule references
pub trait RuleDefMut: RuleDef {
    fn set_name(&mut self, name: String);

    fn set_language(&mut self, language: Arc<Language>) -> Result<(), RuleError>;

    fn set_minimum_language_version(&mut self, version: LanguageVersion) -> Result<(), RuleError>;

    fn set_maximum_language_version(&mut self, version: LanguageVersion) -> Result<(), RuleError>;

    fn set_since(&mut self, since: String);

    fn set_rule_set_name(&mut self, name: String);

    fn set_message(&mut self, message: String);

    fn set_description(&mut self, description: String);

    fn add_example(&mut self, example: String);

    fn set_external_info_url(&mut self, url: String);

    fn set_priority(&mut self, priority: RulePriority);

    fn set_deprecated(&mut self, deprecated: bool);
}

/// Reject a version that belongs to another language
pub(crate) fn check_version_language(
    language: &Language,
    version: &LanguageVersion,
) -> Result<(), RuleError> {
    if version.belongs_to(language) {
        Ok(())
    } else {
        Err(RuleError::InvalidArgument(format!(
            "Version {} does not belong to language {}",
            version,
            language.id()
        )))
    }
}

/// A self-contained rule definition
#[derive(Debug, Clone)]
pub struct Rule {
    name: String,
    language: Arc<Language>,
    minimum_language_version: Option<LanguageVersion>,
    maximum_language_version: Option<LanguageVersion>,
    since: Option<String>,
    rule_class: String,
    rule_set_name: Option<String>,
    message: Option<String>,
    description: Option<String>,
    examples: Vec<String>,
    external_info_url: Option<String>,
    priority: RulePriority,
    deprecated: bool,
    properties: PropertyMap,
}

impl Rule {
    pub fn new(
        name: impl Into<String>,
        language: Arc<Language>,
        rule_class: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            language,
            minimum_language_version: None,
            maximum_language_version: None,
            since: None,
            rule_class: rule_class.into(),
            rule_set_name: None,
            message: None,
            description: None,
            examples: Vec::new(),
            external_info_url: None,
            priority: RulePriority::default(),
            deprecated: false,
            properties: PropertyMap::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_priority(mut self, priority: RulePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_deprecated(mut self, deprecated: bool) -> Self {
        self.deprecated = deprecated;
        self
    }

    pub fn with_property(mut self, descriptor: DescriptorRef) -> Result<Self, PropertyError> {
        self.properties.define(descriptor)?;
        Ok(self)
    }

    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    /// Explicitly set property value, without the default
    pub fn explicit_property_value(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.explicit_value(name)
    }
}

impl PropertySource for Rule {
    fn source_name(&self) -> &str {
        &self.name
    }

    fn property_descriptors(&self) -> Vec<DescriptorRef> {
        self.properties.descriptors().to_vec()
    }

    fn property_descriptor(&self, name: &str) -> Option<DescriptorRef> {
        self.properties.descriptor(name).cloned()
    }

    fn property_value(&self, name: &str) -> Option<PropertyValue> {
        self.properties.value(name)
    }

    fn is_property_set(&self, name: &str) -> bool {
        self.properties.is_set(name)
    }

    fn set_property_value(&mut self, name: &str, value: PropertyValue) -> Result<(), PropertyError> {
        if !self.properties.has_descriptor(name) {
            return Err(undeclared(&self.name, name));
        }
        self.properties.set(name, value)
    }

    fn define_property(&mut self, descriptor: DescriptorRef) -> Result<(), PropertyError> {
        self.properties.define(descriptor)
    }
}

impl RuleDef for Rule {
    fn name(&self) -> &str {
        &self.name
    }

    fn language(&self) -> &Arc<Language> {
        &self.language
    }

    fn minimum_language_version(&self) -> Option<&LanguageVersion> {
        self.minimum_language_version.as_ref()
    }

    fn maximum_language_version(&self) -> Option<&LanguageVersion> {
        self.maximum_language_version.as_ref()
    }

    fn since(&self) -> Option<&str> {
        self.since.as_deref()
    }

    fn rule_class(&self) -> &str {
        &self.rule_class
    }

    fn rule_set_name(&self) -> Option<&str> {
        self.rule_set_name.as_deref()
    }

    fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn examples(&self) -> Cow<'_, [String]> {
        Cow::Borrowed(&self.examples)
    }

    fn external_info_url(&self) -> Option<&str> {
        self.external_info_url.as_deref()
    }

    fn priority(&self) -> RulePriority {
        self.priority
    }

    fn is_deprecated(&self) -> bool {
        self.deprecated
    }

    fn definition(&self) -> &Rule {
        self
    }
}

impl RuleDefMut for Rule {
    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn set_language(&mut self, language: Arc<Language>) -> Result<(), RuleError> {
        if *language == *self.language {
            return Ok(());
        }
        Err(RuleError::Unsupported(format!(
            "The language of rule '{}' is fixed to {}",
            self.name,
            self.language.id()
        )))
    }

    fn set_minimum_language_version(&mut self, version: LanguageVersion) -> Result<(), RuleError> {
        check_version_language(&self.language, &version)?;
        self.minimum_language_version = Some(version);
        Ok(())
    }

    fn set_maximum_language_version(&mut self, version: LanguageVersion) -> Result<(), RuleError> {
        check_version_language(&self.language, &version)?;
        self.maximum_language_version = Some(version);
        Ok(())
    }

    fn set_since(&mut self, since: String) {
        self.since = Some(since);
    }

    fn set_rule_set_name(&mut self, name: String) {
        self.rule_set_name = Some(name);
    }

    fn set_message(&mut self, message: String) {
        self.message = Some(message);
    }

    fn set_description(&mut self, description: String) {
        self.description = Some(description);
    }

    fn add_example(&mut self, example: String) {
        self.examples.push(example);
    }

    fn set_external_info_url(&mut self, url: String) {
        self.external_info_url = Some(url);
    }

    fn set_priority(&mut self, priority: RulePriority) {
        self.priority = priority;
    }

    fn set_deprecated(&mut self, deprecated: bool) {
        self.deprecated = deprecated;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::{int_property, string_property, XmlSyntax};

    fn dummy() -> Arc<Language> {
        Arc::new(
            Language::new("dummy", "Dummy")
                .with_extensions(&["dummy"])
                .with_versions(&["1.0", "1.3", "1.7", "2.0"]),
        )
    }

    #[test]
    fn test_priority_order_and_numbers() {
        assert!(RulePriority::High > RulePriority::MediumHigh);
        assert!(RulePriority::Medium > RulePriority::Low);
        for n in 1..=5 {
            assert_eq!(RulePriority::from_number(n).unwrap().number(), n);
        }
        assert_eq!(RulePriority::from_number(0), None);
        assert_eq!("2".parse::<RulePriority>(), Ok(RulePriority::MediumHigh));
        assert_eq!("medium_low".parse::<RulePriority>(), Ok(RulePriority::MediumLow));
        assert!("9".parse::<RulePriority>().is_err());
    }

    #[test]
    fn test_priority_syntax_lists_expected_values() {
        let syntax = priority_syntax();
        assert_eq!(syntax.from_string("High"), Ok(RulePriority::High));
        assert_eq!(syntax.to_string_value(&RulePriority::Medium), Some("3".to_string()));
        let message = syntax.from_string("urgent").unwrap_err();
        assert!(message.contains("Unknown priority: urgent"));
        assert!(message.contains("1 (High), 2 (Medium High), 3 (Medium), 4 (Medium Low), 5 (Low)"));
    }

    #[test]
    fn test_priority_serde_uses_numbers() {
        assert_eq!(serde_json::to_string(&RulePriority::High).unwrap(), "1");
        let p: RulePriority = serde_json::from_str("4").unwrap();
        assert_eq!(p, RulePriority::MediumLow);
        assert!(serde_json::from_str::<RulePriority>("6").is_err());
    }

    #[test]
    fn test_version_must_match_language() {
        let lang = dummy();
        let other = Language::new("other", "Other").with_versions(&["1.0"]);
        let mut rule = Rule::new("r", Arc::clone(&lang), "Cls");

        let err = rule
            .set_minimum_language_version(other.version("1.0").unwrap().clone())
            .unwrap_err();
        assert!(matches!(err, RuleError::InvalidArgument(_)));
        assert!(rule.minimum_language_version().is_none());

        rule.set_minimum_language_version(lang.version("1.3").unwrap().clone())
            .unwrap();
        assert_eq!(rule.minimum_language_version().unwrap().version(), "1.3");
    }

    #[test]
    fn test_language_is_fixed() {
        let mut rule = Rule::new("r", dummy(), "Cls");
        assert!(rule.set_language(dummy()).is_ok());
        let other = Arc::new(Language::new("other", "Other"));
        assert!(matches!(rule.set_language(other), Err(RuleError::Unsupported(_))));
        assert_eq!(rule.language().id(), "dummy");
    }

    #[test]
    fn test_supports_version_bounds() {
        let lang = dummy();
        let mut rule = Rule::new("r", Arc::clone(&lang), "Cls");
        rule.set_minimum_language_version(lang.version("1.3").unwrap().clone()).unwrap();
        rule.set_maximum_language_version(lang.version("1.7").unwrap().clone()).unwrap();

        assert!(!rule.supports_version(lang.version("1.0").unwrap()));
        assert!(rule.supports_version(lang.version("1.3").unwrap()));
        assert!(rule.supports_version(lang.version("1.7").unwrap()));
        assert!(!rule.supports_version(lang.version("2.0").unwrap()));

        let other = Language::new("other", "Other").with_versions(&["1.3"]);
        assert!(!rule.supports_version(other.version("1.3").unwrap()));
    }

    #[test]
    fn test_properties_must_be_declared() {
        let max = int_property("max").desc("max").default_value(5).build().unwrap();
        let label = string_property("label").desc("label").default_value("").build().unwrap();
        let mut rule = Rule::new("r", dummy(), "Cls").with_property(max.erased()).unwrap();

        assert_eq!(rule.get_property(&max), 5);
        rule.set_property(&max, 8).unwrap();
        assert_eq!(rule.get_property(&max), 8);
        assert!(rule.is_property_set("max"));

        let err = rule.set_property(&label, "x".to_string()).unwrap_err();
        assert_eq!(
            err,
            PropertyError::Undeclared {
                rule: "r".to_string(),
                property: "label".to_string()
            }
        );
    }

    #[test]
    fn test_typed_read_through_trait_object() {
        let max = int_property("max").desc("max").default_value(5).build().unwrap();
        let mut rule = Rule::new("r", dummy(), "Cls").with_property(max.erased()).unwrap();
        rule.set_property(&max, 7).unwrap();

        let view: &dyn RuleDef = &rule;
        assert_eq!(view.property(&max), 7);
        assert!(view.as_reference().is_none());
    }
}
