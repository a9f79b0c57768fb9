use sightline_core::{CodeObjectId, TextRange, TextSize};

use crate::{Annotation, Language};

/// A class, interface, enum, record or object declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDecl {
    pub name: String,
    /// Dotted path of enclosing types within the file, e.g. `Outer.Inner`.
    pub qualified_name: String,
    pub annotations: Vec<Annotation>,
    pub offset: TextSize,
    pub body: Option<TextRange>,
}

impl TypeDecl {
    pub fn annotation(&self, name: &str) -> Option<&Annotation> {
        self.annotations.iter().find(|ann| ann.is(name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDecl {
    pub name: String,
    /// Qualified name of the enclosing type; `None` for top-level functions.
    pub containing_type: Option<String>,
    pub namespace: Option<String>,
    /// Declared parameter types, whitespace removed.
    pub params: Vec<String>,
    pub annotations: Vec<Annotation>,
    /// Offset of the method name.
    pub offset: TextSize,
    /// Block body or Kotlin expression body; `None` for abstract declarations.
    pub body: Option<TextRange>,
}

impl MethodDecl {
    pub fn code_object_id(&self) -> CodeObjectId {
        CodeObjectId::method(
            self.namespace.as_deref(),
            self.containing_type.as_deref(),
            &self.name,
            &self.params,
        )
    }

    pub fn annotation(&self, name: &str) -> Option<&Annotation> {
        self.annotations.iter().find(|ann| ann.is(name))
    }

    pub fn has_annotation(&self, name: &str) -> bool {
        self.annotation(name).is_some()
    }

    pub fn display_name(&self) -> String {
        match &self.containing_type {
            Some(ty) => format!("{ty}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// What a structural model reports for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxView {
    pub language: Language,
    pub namespace: Option<String>,
    pub imports: Vec<String>,
    pub types: Vec<TypeDecl>,
    pub methods: Vec<MethodDecl>,
    /// Source with comments blanked out, offset-aligned with the snapshot text.
    code: String,
}

impl SyntaxView {
    pub fn new(language: Language, code: String) -> Self {
        Self {
            language,
            namespace: None,
            imports: Vec::new(),
            types: Vec::new(),
            methods: Vec::new(),
            code,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn text_at(&self, range: TextRange) -> &str {
        self.code
            .get(usize::from(range.start())..usize::from(range.end()))
            .unwrap_or("")
    }

    /// Comment-free text of the method body, if it has one.
    pub fn body_code(&self, method: &MethodDecl) -> Option<&str> {
        method.body.map(|range| self.text_at(range))
    }

    pub fn type_decl(&self, qualified_name: &str) -> Option<&TypeDecl> {
        self.types
            .iter()
            .find(|ty| ty.qualified_name == qualified_name)
    }

    /// Whether any import starts with one of `prefixes`.
    pub fn imports_any(&self, prefixes: &[&str]) -> bool {
        self.imports
            .iter()
            .any(|import| prefixes.iter().any(|prefix| import.starts_with(prefix)))
    }
}
