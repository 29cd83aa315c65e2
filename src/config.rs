//! Configuration for the rule-set loader
//!
//! Reads `.rulecraft.yaml` / `.rulecraft.json` and turns it into the
//! registries and options a [`RuleSetLoader`] is built from.

use crate::language::{Language, LanguageRegistry};
use crate::loader::{LoaderOptions, RuleSetLoader};
use crate::properties::{PropertyError, PropertyTypeId};
use crate::resource::FileSystemResourceLoader;
use crate::rule::RulePriority;
use crate::rule_class::{RuleClass, RuleClassRegistry};
use crate::ruleset::{PropertyOverride, RuleSetBuilder, RuleSetError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Property(#[from] PropertyError),
}

/// A language declaration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageConfig {
    /// Terse id used in `language` attributes
    pub id: String,

    /// Display name, defaults to the id
    pub name: Option<String>,

    /// File extensions
    pub extensions: Vec<String>,

    /// Versions, oldest first
    pub versions: Vec<String>,

    /// Default version (last version when unset)
    pub default_version: Option<String>,
}

impl LanguageConfig {
    fn to_language(&self) -> Language {
        let extensions: Vec<&str> = self.extensions.iter().map(String::as_str).collect();
        let versions: Vec<&str> = self.versions.iter().map(String::as_str).collect();
        let mut language = Language::new(
            self.id.clone(),
            self.name.clone().unwrap_or_else(|| self.id.clone()),
        )
        .with_extensions(&extensions)
        .with_versions(&versions);
        if let Some(default) = &self.default_version {
            language = language.with_default_version(default);
        }
        language
    }
}

/// A property declared by a rule class
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyConfig {
    pub name: String,

    /// Type name, e.g. `Integer` or `List[String]`
    #[serde(rename = "type")]
    pub property_type: String,

    pub description: String,

    /// Default value in attribute form
    pub default: String,
}

/// A rule implementation class
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleClassConfig {
    pub name: String,

    /// Whether rule definitions of this class may declare their own properties
    pub accepts_definitions: bool,

    pub properties: Vec<PropertyConfig>,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directories searched for referenced rule-sets
    pub search_paths: Vec<PathBuf>,

    /// Rules less severe than this are dropped
    pub min_priority: RulePriority,

    /// Warn about references to deprecated rules
    pub warn_deprecated: bool,

    /// Keep deprecated rule references when importing a whole rule-set
    pub include_deprecated_rule_references: bool,

    pub languages: Vec<LanguageConfig>,

    pub rule_classes: Vec<RuleClassConfig>,

    /// Property overrides applied after loading (rule -> property -> value)
    pub rule_properties: BTreeMap<String, BTreeMap<String, String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            min_priority: RulePriority::Low,
            warn_deprecated: true,
            include_deprecated_rule_references: false,
            languages: Vec::new(),
            rule_classes: Vec::new(),
            rule_properties: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let mut config: Self = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "Unknown config file format: {}",
                    ext
                )))
            }
        };

        // Search paths are relative to the config file
        if let Some(base_dir) = path.parent() {
            for search_path in &mut config.search_paths {
                if search_path.is_relative() {
                    *search_path = base_dir.join(&*search_path);
                }
            }
        }

        Ok(config)
    }

    /// Load configuration from the current directory, or defaults
    pub fn load_default() -> Result<Self, ConfigError> {
        let config_names = [
            ".rulecraft.yaml",
            ".rulecraft.yml",
            ".rulecraft.json",
            "rulecraft.yaml",
            "rulecraft.yml",
            "rulecraft.json",
        ];

        for name in &config_names {
            let path = PathBuf::from(name);
            if path.exists() {
                return Self::load(&path);
            }
        }

        Ok(Self::default())
    }

    pub fn loader_options(&self) -> LoaderOptions {
        LoaderOptions {
            min_priority: self.min_priority,
            warn_deprecated: self.warn_deprecated,
            include_deprecated_rule_references: self.include_deprecated_rule_references,
        }
    }

    pub fn language_registry(&self) -> Result<LanguageRegistry, ConfigError> {
        let mut registry = LanguageRegistry::new();
        for language in &self.languages {
            if language.id.trim().is_empty() {
                return Err(ConfigError::Invalid("Language without id".to_string()));
            }
            registry.register(language.to_language());
        }
        Ok(registry)
    }

    /// Built-in rule classes plus the configured ones
    pub fn rule_class_registry(&self) -> Result<RuleClassRegistry, ConfigError> {
        let mut registry = RuleClassRegistry::with_builtins();
        for class in &self.rule_classes {
            if class.name.trim().is_empty() {
                return Err(ConfigError::Invalid("Rule class without name".to_string()));
            }
            let mut rule_class =
                RuleClass::new(class.name.clone()).accepting_definitions(class.accepts_definitions);
            for property in &class.properties {
                let property_type: PropertyTypeId = property.property_type.parse()?;
                let default = property_type.decode_text(&property.default).map_err(|message| {
                    ConfigError::Invalid(format!(
                        "Default of property '{}' of rule class '{}': {}",
                        property.name, class.name, message
                    ))
                })?;
                let descriptor =
                    property_type.class_descriptor(&property.name, &property.description, default)?;
                rule_class = rule_class.with_property(descriptor);
            }
            registry.register(rule_class);
        }
        Ok(registry)
    }

    pub fn resource_loader(&self) -> FileSystemResourceLoader {
        FileSystemResourceLoader::new().with_search_paths(self.search_paths.iter().cloned())
    }

    pub fn loader(&self) -> Result<RuleSetLoader, ConfigError> {
        Ok(RuleSetLoader::new(
            Arc::new(self.resource_loader()),
            self.language_registry()?,
            self.rule_class_registry()?,
        )
        .with_options(self.loader_options()))
    }

    /// `rule_properties` as individual overrides
    pub fn property_overrides(&self) -> Vec<PropertyOverride> {
        self.rule_properties
            .iter()
            .flat_map(|(rule, properties)| {
                properties.iter().map(move |(property, value)| PropertyOverride {
                    rule: rule.clone(),
                    property: property.clone(),
                    value: value.clone(),
                })
            })
            .collect()
    }

    /// Apply `rule_properties` to a loaded rule-set
    pub fn apply_rule_properties(&self, builder: &mut RuleSetBuilder) -> Result<(), RuleSetError> {
        for property_override in self.property_overrides() {
            builder.apply_override(&property_override)?;
        }
        Ok(())
    }

    /// Merge CLI arguments into configuration
    pub fn merge_cli(&mut self, min_priority: Option<RulePriority>, search_paths: Vec<PathBuf>) {
        if let Some(priority) = min_priority {
            self.min_priority = priority;
        }
        self.search_paths.extend(search_paths);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::CollectingReporter;
    use crate::properties::{PropertySource, PropertyValue};
    use std::fs;
    use tempfile::TempDir;

    const YAML: &str = r#"
search_paths: [rulesets]
min_priority: 3
languages:
  - id: dummy
    name: Dummy
    extensions: [dummy]
    versions: ["1.0", "2.0"]
rule_classes:
  - name: test.MaxRule
    properties:
      - name: max
        type: Integer
        description: Upper bound
        default: "10"
rule_properties:
  MaxRule:
    max: "4"
"#;

    #[test]
    fn test_load_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".rulecraft.yaml");
        fs::write(&path, YAML).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.min_priority, RulePriority::Medium);
        assert_eq!(config.search_paths, vec![temp.path().join("rulesets")]);
        assert!(config.warn_deprecated);
        assert_eq!(config.languages[0].versions, vec!["1.0", "2.0"]);

        let languages = config.language_registry().unwrap();
        assert_eq!(languages.get("dummy").unwrap().default_version().unwrap().version(), "2.0");
        let classes = config.rule_class_registry().unwrap();
        assert!(classes.contains("test.MaxRule"));
        assert!(classes.contains(crate::rule_class::XPATH_RULE_CLASS));
    }

    #[test]
    fn test_load_json_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("rulecraft.json");
        fs::write(&path, r#"{"warn_deprecated": false}"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert!(!config.warn_deprecated);
        assert_eq!(config.min_priority, RulePriority::Low);
        assert!(config.languages.is_empty());
    }

    #[test]
    fn test_unknown_format() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("rulecraft.toml");
        fs::write(&path, "").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_bad_rule_class_property() {
        let mut config = Config::new();
        config.rule_classes.push(RuleClassConfig {
            name: "test.Bad".to_string(),
            accepts_definitions: false,
            properties: vec![PropertyConfig {
                name: "max".to_string(),
                property_type: "Integer".to_string(),
                description: "Upper bound".to_string(),
                default: "many".to_string(),
            }],
        });
        assert!(matches!(config.rule_class_registry(), Err(ConfigError::Invalid(_))));

        config.rule_classes[0].properties[0].property_type = "Float".to_string();
        assert!(matches!(
            config.rule_class_registry(),
            Err(ConfigError::Property(PropertyError::UnknownType(_)))
        ));
    }

    #[test]
    fn test_loader_from_config_applies_rule_properties() {
        let temp = TempDir::new().unwrap();
        let rulesets = temp.path().join("rulesets");
        fs::create_dir_all(&rulesets).unwrap();
        fs::write(
            rulesets.join("base.xml"),
            r#"<ruleset name="base">
                <rule name="MaxRule" class="test.MaxRule" language="dummy"><priority>1</priority></rule>
                <rule name="Minor" class="test.MaxRule" language="dummy"><priority>5</priority></rule>
            </ruleset>"#,
        )
        .unwrap();
        let path = temp.path().join(".rulecraft.yaml");
        fs::write(&path, YAML).unwrap();
        let config = Config::load(&path).unwrap();

        let loader = config.loader().unwrap();
        let mut sink = CollectingReporter::new();
        let set = loader.load_from_resource("base.xml", &mut sink).unwrap();
        assert!(sink.is_empty(), "{:?}", sink.diagnostics());
        assert_eq!(set.len(), 1);

        let mut builder = set.to_builder();
        config.apply_rule_properties(&mut builder).unwrap();
        let set = builder.build();
        assert_eq!(
            set.rules()[0].property_value("max"),
            Some(PropertyValue::new(4i32))
        );
    }
}
