//! Rulecraft - rule-set configuration core for static analysis tools
//!
//! Rules are configured through XML rule-set documents. A rule-set defines
//! rules, imports rules from other rule-sets and customizes imported rules
//! without touching the originals.
//!
//! # Architecture
//!
//! ```text
//! ResourceLoader -> RuleSetLoader -> RuleSetBuilder -> RuleSet
//!                        |
//!                  XmlErrorReporter -> MessageReporter
//! ```
//!
//! - [`properties`]: typed rule properties, their descriptors and XML syntaxes
//! - [`rule`] / [`rule_reference`]: rule definitions and override layers over them
//! - [`loader`]: reads rule-set documents, reporting problems instead of failing
//! - [`writer`]: writes rule-sets back as documents
//!
//! # Example rule-set
//!
//! ```xml
//! <ruleset name="custom" xmlns="http://rulecraft.dev/ruleset/2.0.0">
//!     <rule ref="rulesets/base.xml">
//!         <exclude name="NoisyRule"/>
//!     </rule>
//!     <rule ref="rulesets/base.xml/TooManyMethods" message="Split this class">
//!         <priority>2</priority>
//!         <properties>
//!             <property name="maxMethods" value="20"/>
//!         </properties>
//!     </rule>
//! </ruleset>
//! ```

pub mod config;
pub mod diagnostic;
pub mod language;
pub mod loader;
pub mod properties;
pub mod resource;
pub mod rule;
pub mod rule_class;
pub mod rule_reference;
pub mod ruleset;
pub mod schema;
pub mod writer;
pub mod xml;

// Re-export main types
pub use config::{Config, ConfigError};
pub use diagnostic::{
    CollectingReporter, Diagnostic, LogReporter, Location, MessageReporter, Severity,
    XmlErrorReporter,
};
pub use language::{Language, LanguageFilenameFilter, LanguageRegistry, LanguageVersion};
pub use loader::{LoadError, LoaderOptions, RuleSetLoader};
pub use properties::{
    AnyDescriptor, DescriptorRef, PropertyBuilder, PropertyDescriptor, PropertyError,
    PropertySource, PropertyTypeId, PropertyValue, RegexPattern,
};
pub use resource::{FileSystemResourceLoader, InMemoryResourceLoader, Resource, ResourceLoader};
pub use rule::{Rule, RuleDef, RuleDefMut, RuleError, RulePriority};
pub use rule_class::{RuleClass, RuleClassRegistry};
pub use rule_reference::{RuleField, RuleReference, RuleSetReference};
pub use ruleset::{PropertyOverride, RuleEntry, RuleSet, RuleSetBuilder, RuleSetError};
pub use writer::RuleSetWriter;
pub use xml::{XmlDocument, XmlElement, XmlError};
