//! Languages, language versions and the language registry

use std::cmp::Ordering;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// A version of a language. Versions are only ordered against versions of
/// the same language.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LanguageVersion {
    language_id: String,
    version: String,
    ordinal: usize,
}

impl LanguageVersion {
    /// Id of the language this version belongs to
    pub fn language_id(&self) -> &str {
        &self.language_id
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn belongs_to(&self, language: &Language) -> bool {
        self.language_id == language.id
    }
}

impl PartialOrd for LanguageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.language_id != other.language_id {
            return None;
        }
        Some(self.ordinal.cmp(&other.ordinal))
    }
}

impl fmt::Display for LanguageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.language_id, self.version)
    }
}

/// A language rules can be written for
#[derive(Debug, Clone)]
pub struct Language {
    id: String,
    name: String,
    extensions: Vec<String>,
    versions: Vec<LanguageVersion>,
    default_version: Option<usize>,
}

impl Language {
    /// Create a language with its terse id (e.g. "java") and display name
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            extensions: Vec::new(),
            versions: Vec::new(),
            default_version: None,
        }
    }

    /// Add file extensions, with or without the leading dot
    pub fn with_extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions.extend(
            extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase()),
        );
        self
    }

    /// Declare the versions of this language, oldest first.
    /// The last version is the default unless [`Language::with_default_version`] says otherwise.
    pub fn with_versions(mut self, versions: &[&str]) -> Self {
        for version in versions {
            let ordinal = self.versions.len();
            self.versions.push(LanguageVersion {
                language_id: self.id.clone(),
                version: version.to_string(),
                ordinal,
            });
        }
        if !self.versions.is_empty() {
            self.default_version = Some(self.versions.len() - 1);
        }
        self
    }

    /// Choose the default version. Unknown versions are ignored.
    pub fn with_default_version(mut self, version: &str) -> Self {
        if let Some(idx) = self.versions.iter().position(|v| v.version == version) {
            self.default_version = Some(idx);
        }
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn versions(&self) -> &[LanguageVersion] {
        &self.versions
    }

    pub fn version(&self, version: &str) -> Option<&LanguageVersion> {
        self.versions.iter().find(|v| v.version == version)
    }

    pub fn default_version(&self) -> Option<&LanguageVersion> {
        self.default_version.and_then(|idx| self.versions.get(idx))
    }

    pub fn has_extension(&self, extension: &str) -> bool {
        let extension = extension.trim_start_matches('.').to_lowercase();
        self.extensions.iter().any(|e| *e == extension)
    }
}

impl PartialEq for Language {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Language {}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Lookup of languages by id or file extension
#[derive(Debug, Clone, Default)]
pub struct LanguageRegistry {
    languages: Vec<Arc<Language>>,
}

impl LanguageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a language, replacing one with the same id
    pub fn register(&mut self, language: Language) -> Arc<Language> {
        let language = Arc::new(language);
        match self.languages.iter_mut().find(|l| l.id == language.id) {
            Some(slot) => *slot = Arc::clone(&language),
            None => self.languages.push(Arc::clone(&language)),
        }
        language
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.register(language);
        self
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Language>> {
        self.languages.iter().find(|l| l.id == id)
    }

    pub fn get_by_extension(&self, extension: &str) -> Option<&Arc<Language>> {
        self.languages.iter().find(|l| l.has_extension(extension))
    }

    /// Resolve "id version" pairs, e.g. for `minimumLanguageVersion`
    pub fn get_version(&self, id: &str, version: &str) -> Option<&LanguageVersion> {
        self.get(id).and_then(|l| l.version(version))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Language>> {
        self.languages.iter()
    }

    pub fn len(&self) -> usize {
        self.languages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
    }
}

/// Selects source files that belong to a language, by extension
#[derive(Debug, Clone)]
pub struct LanguageFilenameFilter {
    language: Arc<Language>,
}

impl LanguageFilenameFilter {
    pub fn new(language: Arc<Language>) -> Self {
        Self { language }
    }

    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.language.has_extension(e))
    }
}
