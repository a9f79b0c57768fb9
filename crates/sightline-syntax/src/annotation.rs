/// An annotation as written in source: simple name plus raw argument text.
///
/// `@org.springframework.web.bind.annotation.GetMapping(value = "/x")` becomes
/// `Annotation { name: "GetMapping", args: Some("value = \"/x\"") }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub name: String,
    pub args: Option<String>,
}

impl Annotation {
    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    /// String values of the first matching named argument in `keys`, falling
    /// back to the first positional argument.
    ///
    /// Handles both `@X("/a")` and `@X(path = {"/a", "/b"})`.
    pub fn values(&self, keys: &[&str]) -> Vec<String> {
        let Some(args) = self.args.as_deref() else {
            return Vec::new();
        };
        for key in keys {
            let values = extract_named_string_literals(args, key);
            if !values.is_empty() {
                return values;
            }
        }

        let start = args.len() - args.trim_start().len();
        if start >= args.len() {
            return Vec::new();
        }
        let expr = slice_until_top_level_comma(args, start);
        // A positional argument never contains `=`; `@X(method = GET)` has no path.
        if expr.contains('=') && !expr.trim_start().starts_with('"') {
            return Vec::new();
        }
        extract_string_literals(expr)
    }

    pub fn first_value(&self, keys: &[&str]) -> Option<String> {
        self.values(keys).into_iter().next()
    }
}

/// Strips annotations from the start of `line`, pushing them onto `pending`.
///
/// Returns the remainder of the line after the last annotation.
pub(crate) fn consume_leading_annotations<'a>(
    line: &'a str,
    pending: &mut Vec<Annotation>,
) -> &'a str {
    let bytes = line.as_bytes();
    let mut idx = 0usize;

    loop {
        while idx < bytes.len() && bytes[idx].is_ascii_whitespace() {
            idx += 1;
        }
        if idx >= bytes.len() || bytes[idx] != b'@' {
            break;
        }
        let at = idx;
        idx += 1;

        let start_name = idx;
        while idx < bytes.len()
            && (bytes[idx].is_ascii_alphanumeric()
                || bytes[idx] == b'_'
                || bytes[idx] == b'.'
                || bytes[idx] == b':')
        {
            idx += 1;
        }
        if start_name == idx {
            idx = at;
            break;
        }
        let full_name = &line[start_name..idx];
        // `@field:Foo` (Kotlin use-site target) and `@a.b.Foo` both name `Foo`.
        let name = full_name
            .rsplit(['.', ':'])
            .next()
            .unwrap_or(full_name)
            .to_string();
        if name == "interface" {
            // `@interface Foo` declares an annotation type.
            idx = at;
            break;
        }

        while idx < bytes.len() && bytes[idx].is_ascii_whitespace() {
            idx += 1;
        }

        let args = if idx < bytes.len() && bytes[idx] == b'(' {
            idx += 1;
            let start_args = idx;
            let mut depth = 1i32;
            while idx < bytes.len() && depth > 0 {
                match bytes[idx] {
                    b'(' => {
                        depth += 1;
                        idx += 1;
                    }
                    b')' => {
                        depth -= 1;
                        idx += 1;
                    }
                    b'"' => idx = skip_string_literal(bytes, idx),
                    _ => idx += 1,
                }
            }
            let end_args = if depth == 0 { idx - 1 } else { idx };
            let args_raw = line.get(start_args..end_args).unwrap_or("").trim();
            if args_raw.is_empty() {
                None
            } else {
                Some(args_raw.to_string())
            }
        } else {
            None
        };

        pending.push(Annotation { name, args });
    }

    line.get(idx..).unwrap_or("")
}

/// Contents of every `"..."` literal in `input`, escapes left as written.
pub fn extract_string_literals(input: &str) -> Vec<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::new();
    let mut idx = 0usize;
    while idx < bytes.len() {
        if bytes[idx] != b'"' {
            idx += 1;
            continue;
        }
        let start = idx + 1;
        idx += 1;
        while idx < bytes.len() {
            match bytes[idx] {
                b'\\' => idx = (idx + 2).min(bytes.len()),
                b'"' => {
                    if let Some(value) = input.get(start..idx) {
                        out.push(value.to_string());
                    }
                    idx += 1;
                    break;
                }
                _ => idx += 1,
            }
        }
    }
    out
}

fn skip_string_literal(bytes: &[u8], mut idx: usize) -> usize {
    idx += 1;
    while idx < bytes.len() {
        match bytes[idx] {
            b'\\' => idx = (idx + 2).min(bytes.len()),
            b'"' => return idx + 1,
            _ => idx += 1,
        }
    }
    bytes.len()
}

pub(crate) fn slice_until_top_level_comma(s: &str, start: usize) -> &str {
    let bytes = s.as_bytes();
    let mut idx = start;
    let mut depth = 0i32;

    while idx < bytes.len() {
        match bytes[idx] {
            b'"' => {
                idx = skip_string_literal(bytes, idx);
                continue;
            }
            b'(' | b'{' | b'[' | b'<' => depth += 1,
            b')' | b'}' | b']' | b'>' => depth = (depth - 1).max(0),
            b',' if depth == 0 => break,
            _ => {}
        }
        idx += 1;
    }

    s.get(start..idx).unwrap_or("")
}

fn extract_named_string_literals(args: &str, key: &str) -> Vec<String> {
    let bytes = args.as_bytes();
    let key_bytes = key.as_bytes();

    let mut idx = 0usize;
    while idx < bytes.len() {
        if bytes[idx] == b'"' {
            idx = skip_string_literal(bytes, idx);
            continue;
        }
        if idx + key_bytes.len() > bytes.len() {
            break;
        }
        if &bytes[idx..idx + key_bytes.len()] != key_bytes {
            idx += 1;
            continue;
        }

        let before_ok = idx == 0 || !is_ident_byte(bytes[idx - 1]);
        let after_idx = idx + key_bytes.len();
        let after_ok = after_idx == bytes.len() || !is_ident_byte(bytes[after_idx]);
        if !before_ok || !after_ok {
            idx += key_bytes.len();
            continue;
        }

        let mut j = after_idx;
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            j += 1;
        }
        if j >= bytes.len() || bytes[j] != b'=' {
            idx += key_bytes.len();
            continue;
        }
        j += 1;
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            j += 1;
        }

        let expr = slice_until_top_level_comma(args, j);
        return extract_string_literals(expr);
    }

    Vec::new()
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}
