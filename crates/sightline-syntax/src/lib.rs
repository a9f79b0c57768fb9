//! Structural view of JVM source files.
//!
//! Discovery never looks at raw text directly; it asks a [`StructuralModel`] for
//! a [`SyntaxView`] listing the declared types and methods with their offsets.
//! [`LanguageModels`] picks the model for a file from its extension.
//!
//! The bundled [`JvmSourceModel`] is a line-oriented heuristic parser for Java
//! and Kotlin. It is deliberately lenient: unbalanced braces or unusual syntax
//! degrade the view, they do not fail the parse.

mod annotation;
mod jvm;
mod mask;
mod view;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use smol_str::SmolStr;
use sightline_vfs::SourceSnapshot;

pub use annotation::{extract_string_literals, Annotation};
pub use jvm::JvmSourceModel;
pub use view::{MethodDecl, SyntaxView, TypeDecl};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructuralError {
    #[error("no structural model for {}", path.display())]
    UnsupportedLanguage { path: PathBuf },
    #[error("{} is too large to index ({len} bytes)", path.display())]
    TooLarge { path: PathBuf, len: usize },
    #[error("{} is not valid UTF-8 after masking", path.display())]
    Encoding { path: PathBuf },
    /// The model could not produce a view right now (e.g. its tree is being rebuilt).
    #[error("structural model unavailable: {0}")]
    Unavailable(String),
}

impl StructuralError {
    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StructuralError::Unavailable(_))
    }
}

/// Source languages with a bundled structural model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Java,
    Kotlin,
}

impl Language {
    pub fn name(self) -> &'static str {
        match self {
            Language::Java => "java",
            Language::Kotlin => "kotlin",
        }
    }
}

/// Produces a [`SyntaxView`] for a document snapshot.
///
/// Implementations run on worker threads against immutable snapshots and must
/// not block on the editor.
pub trait StructuralModel: Send + Sync {
    fn parse(&self, snapshot: &SourceSnapshot) -> Result<SyntaxView, StructuralError>;
}

impl<T: StructuralModel + ?Sized> StructuralModel for Arc<T> {
    fn parse(&self, snapshot: &SourceSnapshot) -> Result<SyntaxView, StructuralError> {
        (**self).parse(snapshot)
    }
}

#[derive(Clone)]
struct LanguageEntry {
    language: Language,
    model: Arc<dyn StructuralModel>,
}

/// File-extension lookup table built once at startup.
#[derive(Clone, Default)]
pub struct LanguageModels {
    by_extension: HashMap<SmolStr, LanguageEntry>,
}

impl LanguageModels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Java (`.java`) and Kotlin (`.kt`, `.kts`) backed by [`JvmSourceModel`].
    pub fn jvm() -> Self {
        let mut models = Self::new();
        models.register("java", Language::Java, Arc::new(JvmSourceModel::new(Language::Java)));
        let kotlin: Arc<dyn StructuralModel> = Arc::new(JvmSourceModel::new(Language::Kotlin));
        models.register("kt", Language::Kotlin, Arc::clone(&kotlin));
        models.register("kts", Language::Kotlin, kotlin);
        models
    }

    pub fn register(
        &mut self,
        extension: &str,
        language: Language,
        model: Arc<dyn StructuralModel>,
    ) {
        self.by_extension.insert(
            SmolStr::new(extension.trim_start_matches('.').to_ascii_lowercase()),
            LanguageEntry { language, model },
        );
    }

    pub fn language_for(&self, path: &Path) -> Option<Language> {
        self.entry_for(path).map(|entry| entry.language)
    }

    pub fn supports(&self, path: &Path) -> bool {
        self.entry_for(path).is_some()
    }

    fn entry_for(&self, path: &Path) -> Option<&LanguageEntry> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        self.by_extension.get(ext.as_str())
    }
}

impl std::fmt::Debug for LanguageModels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut extensions: Vec<_> = self.by_extension.keys().collect();
        extensions.sort();
        f.debug_struct("LanguageModels")
            .field("extensions", &extensions)
            .finish()
    }
}

impl StructuralModel for LanguageModels {
    fn parse(&self, snapshot: &SourceSnapshot) -> Result<SyntaxView, StructuralError> {
        let entry = self
            .entry_for(snapshot.path())
            .ok_or_else(|| StructuralError::UnsupportedLanguage {
                path: snapshot.path().to_path_buf(),
            })?;
        entry.model.parse(snapshot)
    }
}
