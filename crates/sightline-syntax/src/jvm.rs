use std::sync::LazyLock;

use regex::Regex;
use sightline_core::{TextRange, TextSize};
use sightline_vfs::SourceSnapshot;

use crate::annotation::consume_leading_annotations;
use crate::mask::mask;
use crate::{
    Annotation, Language, MethodDecl, StructuralError, StructuralModel, SyntaxView, TypeDecl,
};

static TYPE_DECL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:(?:public|protected|private|internal|static|final|abstract|sealed|open|data|inner|value|annotation|enum|strictfp)\s+)*(class|interface|enum|record|object)\b(?:\s+([A-Za-z_][A-Za-z0-9_]*))?")
        .unwrap()
});

static JAVA_METHOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:(?:public|protected|private|static|final|synchronized|abstract|default|native|strictfp)\s+)*(?:<[^>]*>\s*)?[A-Za-z0-9_<>\[\].$,?&\s]+?\s+([A-Za-z_][A-Za-z0-9_$]*)\s*\(")
        .unwrap()
});

static KOTLIN_FUN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:(?:public|private|protected|internal|override|open|final|abstract|suspend|inline|operator|infix|tailrec|external|actual|expect)\s+)*fun\s+(?:<[^>]*>\s*)?(?:[A-Za-z_][A-Za-z0-9_<>?,. ]*?\.)?([A-Za-z_][A-Za-z0-9_]*)\s*\(")
        .unwrap()
});

const TYPE_KEYWORDS: &[&str] = &["class", "interface", "enum", "record", "object", "fun"];

const JAVA_MODIFIERS: &[&str] = &[
    "public",
    "protected",
    "private",
    "static",
    "final",
    "synchronized",
    "abstract",
    "default",
    "native",
    "strictfp",
];

const NOT_A_TYPE: &[&str] = &["return", "new", "throw", "else", "case"];

/// Heuristic structural model for Java and Kotlin.
///
/// Declarations are recognized line by line on a copy of the text with comments
/// and literal contents blanked, so braces inside strings never unbalance the
/// scope tracking. Method bodies are skipped wholesale once their closing brace
/// is found; local and anonymous classes are therefore not reported.
#[derive(Debug, Clone, Copy)]
pub struct JvmSourceModel {
    language: Language,
}

impl JvmSourceModel {
    pub fn new(language: Language) -> Self {
        Self { language }
    }

    pub fn language(&self) -> Language {
        self.language
    }
}

impl StructuralModel for JvmSourceModel {
    fn parse(&self, snapshot: &SourceSnapshot) -> Result<SyntaxView, StructuralError> {
        let text = snapshot.text();
        if u32::try_from(text.len()).is_err() {
            return Err(StructuralError::TooLarge {
                path: snapshot.path().to_path_buf(),
                len: text.len(),
            });
        }
        let masked = mask(text).ok_or_else(|| StructuralError::Encoding {
            path: snapshot.path().to_path_buf(),
        })?;

        let Parser {
            namespace,
            imports,
            types,
            methods,
            ..
        } = Parser::new(self.language, &masked.code, &masked.skeleton).run();

        let mut view = SyntaxView::new(self.language, masked.code);
        view.namespace = namespace;
        view.imports = imports;
        view.types = types;
        view.methods = methods;
        tracing::trace!(
            target = "sightline.syntax",
            file = %snapshot.file(),
            language = self.language.name(),
            types = view.types.len(),
            methods = view.methods.len(),
            "parsed source"
        );
        Ok(view)
    }
}

struct OpenType {
    index: usize,
    depth: i32,
    body_start: usize,
}

struct Parser<'a> {
    language: Language,
    code: &'a str,
    skeleton: &'a str,
    depth: i32,
    scopes: Vec<OpenType>,
    pending_annotations: Vec<Annotation>,
    pending_type: Option<usize>,
    namespace: Option<String>,
    imports: Vec<String>,
    types: Vec<TypeDecl>,
    methods: Vec<MethodDecl>,
}

impl<'a> Parser<'a> {
    fn new(language: Language, code: &'a str, skeleton: &'a str) -> Self {
        Self {
            language,
            code,
            skeleton,
            depth: 0,
            scopes: Vec::new(),
            pending_annotations: Vec::new(),
            pending_type: None,
            namespace: None,
            imports: Vec::new(),
            types: Vec::new(),
            methods: Vec::new(),
        }
    }

    fn run(mut self) -> Self {
        let len = self.skeleton.len();
        let mut pos = 0;
        while pos < len {
            let line_end = self.skeleton[pos..].find('\n').map_or(len, |idx| pos + idx);
            pos = self.line(pos, line_end);
        }
        // Unterminated types extend to the end of the file.
        while let Some(open) = self.scopes.pop() {
            self.types[open.index].body = Some(range(open.body_start, len));
        }
        self
    }

    /// Processes `[start, end)` and returns where scanning continues.
    fn line(&mut self, start: usize, end: usize) -> usize {
        let (code, skeleton) = (self.code, self.skeleton);
        let code_line = &code[start..end];
        if skeleton[start..end].trim().is_empty() {
            return end + 1;
        }

        if self.depth == 0 && self.scopes.is_empty() {
            let trimmed = code_line.trim();
            if let Some(rest) = trimmed.strip_prefix("package ") {
                self.namespace = Some(clean_qualified_name(rest));
                self.pending_annotations.clear();
                return end + 1;
            }
            if let Some(rest) = trimmed.strip_prefix("import ") {
                self.imports.push(clean_qualified_name(rest));
                self.pending_annotations.clear();
                return end + 1;
            }
        }

        let rest = consume_leading_annotations(code_line, &mut self.pending_annotations);
        let rest_start = end - rest.len();
        let rest_skeleton = &skeleton[rest_start..end];
        if rest_skeleton.trim().is_empty() {
            return end + 1;
        }

        if self.declarations_allowed() {
            if let Some((name, name_start)) = find_type_decl(rest_skeleton) {
                let qualified_name = self.qualify(&name);
                self.pending_type = Some(self.types.len());
                self.types.push(TypeDecl {
                    name,
                    qualified_name,
                    annotations: std::mem::take(&mut self.pending_annotations),
                    offset: text_size(rest_start + name_start),
                    body: None,
                });
            } else if let Some((name, name_start, paren_open)) = self.match_method(rest_skeleton) {
                if let Some(next) =
                    self.method(rest_start + name_start, name, rest_start + paren_open)
                {
                    return next;
                }
            } else {
                self.pending_annotations.clear();
            }
        } else {
            self.pending_annotations.clear();
        }

        self.count_braces(rest_start, end);
        end + 1
    }

    fn declarations_allowed(&self) -> bool {
        match self.scopes.last() {
            Some(open) => open.depth == self.depth,
            None => self.depth == 0,
        }
    }

    /// Returns the method name, its offset and the offset of the opening
    /// parenthesis, all relative to `line`.
    fn match_method<'l>(&self, line: &'l str) -> Option<(&'l str, usize, usize)> {
        let regex: &Regex = match self.language {
            Language::Java => &JAVA_METHOD_RE,
            Language::Kotlin => &KOTLIN_FUN_RE,
        };
        let caps = regex.captures(line)?;
        let (whole, name) = (caps.get(0)?, caps.get(1)?);
        if self.language == Language::Java {
            // `public Foo(` matches with `public` as the return type: a constructor.
            let return_type = line[..name.start()]
                .split_whitespace()
                .find(|token| !JAVA_MODIFIERS.contains(token) && !token.starts_with('<'))?;
            if NOT_A_TYPE.contains(&return_type) {
                return None;
            }
        }
        Some((name.as_str(), name.start(), whole.end() - 1))
    }

    fn current_type(&self) -> Option<&TypeDecl> {
        self.scopes.last().map(|open| &self.types[open.index])
    }

    fn qualify(&self, name: &str) -> String {
        match self.current_type() {
            Some(parent) => format!("{}.{name}", parent.qualified_name),
            None => name.to_string(),
        }
    }

    fn method(&mut self, name_start: usize, name: &str, paren_open: usize) -> Option<usize> {
        let paren_close = match_close(self.skeleton, paren_open, b'(', b')')?;
        let params = split_top_level(&self.code[paren_open + 1..paren_close], b',')
            .into_iter()
            .filter_map(|param| param_type(self.language, param))
            .collect();
        let (body, resume) = self.find_body(paren_close + 1);
        let containing_type = self.current_type().map(|ty| ty.qualified_name.clone());
        let annotations = std::mem::take(&mut self.pending_annotations);

        self.pending_type = None;
        self.methods.push(MethodDecl {
            name: name.to_string(),
            containing_type,
            namespace: self.namespace.clone(),
            params,
            annotations,
            offset: text_size(name_start),
            body,
        });
        Some(resume)
    }

    fn find_body(&self, from: usize) -> (Option<TextRange>, usize) {
        let bytes = self.skeleton.as_bytes();
        let len = bytes.len();
        let mut i = from;
        while i < len {
            match bytes[i] {
                b'{' => {
                    let end = match_close(self.skeleton, i, b'{', b'}').map_or(len, |close| close + 1);
                    return (Some(range(i, end)), end);
                }
                b';' => return (None, i + 1),
                b'}' => return (None, i),
                b'=' if self.language == Language::Kotlin => {
                    let line_end = find_line_end(self.skeleton, i);
                    let mut end = line_end;
                    if let Some(open) = self.skeleton[i..line_end].find('{') {
                        if let Some(close) = match_close(self.skeleton, i + open, b'{', b'}') {
                            end = end.max(find_line_end(self.skeleton, close));
                        }
                    }
                    return (Some(range(i + 1, end)), end);
                }
                b'\n' => {
                    let next = i + 1 + self.skeleton[i + 1..]
                        .find(|c: char| !c.is_whitespace())
                        .unwrap_or(len - i - 1);
                    let continues = matches!(bytes.get(next), Some(b'{' | b':' | b'='))
                        || self.skeleton[next..].starts_with("throws");
                    if !continues {
                        return (None, i);
                    }
                    i = next;
                }
                _ => i += 1,
            }
        }
        (None, len)
    }

    fn count_braces(&mut self, start: usize, end: usize) {
        let skeleton = self.skeleton;
        for (offset, byte) in skeleton.as_bytes()[start..end].iter().enumerate() {
            match byte {
                b'{' => {
                    self.depth += 1;
                    if let Some(index) = self.pending_type.take() {
                        self.scopes.push(OpenType {
                            index,
                            depth: self.depth,
                            body_start: start + offset,
                        });
                    }
                }
                b'}' => {
                    if self
                        .scopes
                        .last()
                        .is_some_and(|open| open.depth == self.depth)
                    {
                        if let Some(open) = self.scopes.pop() {
                            self.types[open.index].body =
                                Some(range(open.body_start, start + offset + 1));
                        }
                    }
                    self.depth = (self.depth - 1).max(0);
                }
                _ => {}
            }
        }
    }
}

fn find_type_decl(line: &str) -> Option<(String, usize)> {
    for caps in TYPE_DECL_RE.captures_iter(line) {
        let Some(keyword) = caps.get(1) else {
            continue;
        };
        match caps.get(2) {
            Some(name) if !TYPE_KEYWORDS.contains(&name.as_str()) => {
                return Some((name.as_str().to_string(), name.start()));
            }
            None if keyword.as_str() == "object"
                && line[..keyword.start()].trim_end().ends_with("companion") =>
            {
                return Some(("Companion".to_string(), keyword.start()));
            }
            _ => {}
        }
    }
    None
}

fn param_type(language: Language, raw: &str) -> Option<String> {
    let mut annotations = Vec::new();
    let raw = consume_leading_annotations(raw, &mut annotations).trim();
    if raw.is_empty() {
        return None;
    }

    let ty = match language {
        Language::Java => {
            let raw = raw.strip_prefix("final ").unwrap_or(raw).trim();
            match raw.rfind(char::is_whitespace) {
                Some(idx) => &raw[..idx],
                None => raw,
            }
        }
        Language::Kotlin => {
            let mut raw = raw;
            while let Some(stripped) = ["vararg ", "noinline ", "crossinline ", "val ", "var "]
                .iter()
                .find_map(|modifier| raw.strip_prefix(modifier))
            {
                raw = stripped.trim_start();
            }
            let colon = find_top_level(raw, b':')?;
            let ty = &raw[colon + 1..];
            match find_top_level(ty, b'=') {
                Some(eq) => &ty[..eq],
                None => ty,
            }
        }
    };

    let ty: String = ty.chars().filter(|c| !c.is_whitespace()).collect();
    (!ty.is_empty()).then_some(ty)
}

fn split_top_level(s: &str, separator: u8) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = s;
    while let Some(at) = find_top_level(rest, separator) {
        parts.push(&rest[..at]);
        rest = &rest[at + 1..];
    }
    if !rest.trim().is_empty() {
        parts.push(rest);
    }
    parts
}

/// First `needle` outside of string literals and bracket nesting.
fn find_top_level(s: &str, needle: u8) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 0i32;
    let mut idx = 0usize;
    while idx < bytes.len() {
        let byte = bytes[idx];
        match byte {
            b'"' => {
                idx += 1;
                while idx < bytes.len() && bytes[idx] != b'"' {
                    idx += if bytes[idx] == b'\\' { 2 } else { 1 };
                }
            }
            _ if byte == needle && depth == 0 => return Some(idx),
            b'(' | b'<' | b'[' | b'{' => depth += 1,
            b')' | b'>' | b']' | b'}' => depth = (depth - 1).max(0),
            _ => {}
        }
        idx += 1;
    }
    None
}

fn match_close(skeleton: &str, open_at: usize, open: u8, close: u8) -> Option<usize> {
    let mut depth = 0i32;
    for (offset, byte) in skeleton.as_bytes().get(open_at..)?.iter().enumerate() {
        if *byte == open {
            depth += 1;
        } else if *byte == close {
            depth -= 1;
            if depth == 0 {
                return Some(open_at + offset);
            }
        }
    }
    None
}

fn find_line_end(s: &str, from: usize) -> usize {
    s[from..].find('\n').map_or(s.len(), |idx| from + idx)
}

fn clean_qualified_name(raw: &str) -> String {
    raw.trim().trim_end_matches(';').trim().replace('`', "")
}

fn text_size(offset: usize) -> TextSize {
    TextSize::try_from(offset).unwrap_or(TextSize::from(u32::MAX))
}

fn range(start: usize, end: usize) -> TextRange {
    TextRange::new(text_size(start), text_size(end.max(start)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sightline_core::FileId;
    use std::path::Path;

    fn parse(language: Language, path: &str, text: &str) -> SyntaxView {
        let snapshot = SourceSnapshot::new(FileId::from_raw(1), Path::new(path), text, 1);
        JvmSourceModel::new(language).parse(&snapshot).unwrap()
    }

    #[test]
    fn view_keeps_masked_code_next_to_declarations() {
        let text = "package shop;\n\n// class Hidden {}\npublic class Orders {\n    public void list() {}\n}\n";
        let view = parse(Language::Java, "Orders.java", text);
        assert_eq!(view.namespace.as_deref(), Some("shop"));
        assert_eq!(view.code().len(), text.len());
        assert!(!view.code().contains("Hidden"));
        assert!(view.code().contains("public class Orders"));
        assert_eq!(view.methods.len(), 1);
        assert_eq!(view.methods[0].code_object_id().as_str(), "method:shop.Orders.list");
    }

    #[test]
    fn kotlin_class_methods_offsets_and_bodies() {
        let text = r#"import io.opentelemetry.instrumentation.annotations.WithSpan

class A {
    private val tracer = GlobalOpenTelemetry.getTracer("lib")

    @WithSpan("foo-span")
    fun foo() {
        routing {
            get("/x") { call.respondText("}") }
        }
    }

    fun bar(id: String, limit: Int = 10): String = "bar-$id"
}
"#;
        let view = parse(Language::Kotlin, "A.kt", text);
        assert_eq!(view.namespace, None);
        assert_eq!(view.imports, vec!["io.opentelemetry.instrumentation.annotations.WithSpan"]);
        assert_eq!(view.types.len(), 1);
        assert_eq!(view.types[0].qualified_name, "A");

        let ids: Vec<_> = view.methods.iter().map(|m| m.code_object_id().to_string()).collect();
        assert_eq!(ids, vec!["method:A.foo", "method:A.bar(String,Int)"]);

        let foo = &view.methods[0];
        assert_eq!(usize::from(foo.offset), text.find("foo()").unwrap());
        assert_eq!(foo.annotation("WithSpan").and_then(|a| a.first_value(&["value"])).as_deref(), Some("foo-span"));
        let body = view.body_code(foo).unwrap();
        assert!(body.starts_with('{') && body.ends_with('}'), "{body}");
        assert!(body.contains(r#"get("/x")"#));
        assert!(!body.contains("fun bar"));

        let bar = &view.methods[1];
        assert_eq!(view.body_code(bar).map(str::trim), Some(r#""bar-$id""#));
    }

    #[test]
    fn java_types_nested_methods_and_params() {
        let text = r#"package com.acme.orders;

import org.springframework.web.bind.annotation.*;

// class Fake { void nope() {} }
@RestController
@RequestMapping("/orders")
public class OrderController {
    private final Map<String, Order> orders = new HashMap<>();

    public OrderController(OrderRepository repo) {
        this.repo = repo;
    }

    @GetMapping("/{id}")
    public Order find(@PathVariable("id") String id, final Map<String, List<Integer>> filters) {
        String brace = "}";
        return orders.get(id);
    }

    static class Audit {
        void record(String... events) {
        }
    }

    interface Listener {
        void onOrder(Order order);
    }
}
"#;
        let view = parse(Language::Java, "OrderController.java", text);
        assert_eq!(view.namespace.as_deref(), Some("com.acme.orders"));
        assert!(view.imports_any(&["org.springframework.web"]));

        let types: Vec<_> = view.types.iter().map(|t| t.qualified_name.as_str()).collect();
        assert_eq!(
            types,
            vec!["OrderController", "OrderController.Audit", "OrderController.Listener"]
        );
        let controller = view.type_decl("OrderController").unwrap();
        assert!(controller.annotation("RestController").is_some());
        assert_eq!(
            controller.annotation("RequestMapping").unwrap().values(&["path", "value"]),
            vec!["/orders"]
        );
        assert!(controller.body.is_some());

        let ids: Vec<_> = view.methods.iter().map(|m| m.code_object_id().to_string()).collect();
        assert_eq!(
            ids,
            vec![
                "method:com.acme.orders.OrderController.find(String,Map<String,List<Integer>>)",
                "method:com.acme.orders.OrderController.Audit.record(String...)",
                "method:com.acme.orders.OrderController.Listener.onOrder(Order)",
            ]
        );
        assert!(view.methods[0].has_annotation("GetMapping"));
        assert!(view.methods[1].body.is_some());
        assert_eq!(view.methods[2].body, None);
    }

    #[test]
    fn kotlin_top_level_functions_and_companions() {
        let text = r#"package com.acme

fun Application.module() {
    routing { get("/health") { } }
}

class Service {
    companion object {
        fun create(): Service = Service()
    }

    fun run() {}
}
"#;
        let view = parse(Language::Kotlin, "Service.kt", text);
        let ids: Vec<_> = view.methods.iter().map(|m| m.code_object_id().to_string()).collect();
        assert_eq!(
            ids,
            vec![
                "method:com.acme.module",
                "method:com.acme.Service.Companion.create",
                "method:com.acme.Service.run",
            ]
        );
        assert_eq!(view.methods[0].containing_type, None);
    }

    #[test]
    fn unbalanced_sources_still_produce_a_view() {
        let view = parse(Language::Java, "Broken.java", "class Broken {\n void a() {\n");
        assert_eq!(view.types.len(), 1);
        assert_eq!(view.methods.len(), 1);
        assert_eq!(view.methods[0].name, "a");
    }
}
