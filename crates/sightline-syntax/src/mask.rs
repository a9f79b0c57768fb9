//! Comment and literal masking.
//!
//! Both outputs have exactly the same byte length as the input, so offsets found
//! in either one are valid offsets into the original text.

pub(crate) struct Masked {
    /// Comments replaced by spaces; string literals intact.
    pub code: String,
    /// Comments and the contents of string/char literals replaced by spaces.
    /// Braces and parentheses left in the skeleton are real syntax.
    pub skeleton: String,
}

pub(crate) fn mask(text: &str) -> Option<Masked> {
    let bytes = text.as_bytes();
    let mut code = bytes.to_vec();
    let mut skeleton = bytes.to_vec();
    let mut i = 0usize;

    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                let end = find_byte(bytes, i, b'\n').unwrap_or(bytes.len());
                blank(&mut code, i, end);
                blank(&mut skeleton, i, end);
                i = end;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = find_seq(bytes, i + 2, b"*/").map_or(bytes.len(), |at| at + 2);
                blank(&mut code, i, end);
                blank(&mut skeleton, i, end);
                i = end;
            }
            b'"' if bytes[i..].starts_with(b"\"\"\"") => {
                // Java text blocks and Kotlin raw strings.
                let (inner_end, end) = match find_seq(bytes, i + 3, b"\"\"\"") {
                    Some(at) => (at, at + 3),
                    None => (bytes.len(), bytes.len()),
                };
                blank(&mut skeleton, i + 3, inner_end);
                i = end;
            }
            b'"' => {
                let mut j = i + 1;
                while j < bytes.len() && bytes[j] != b'"' && bytes[j] != b'\n' {
                    j += if bytes[j] == b'\\' { 2 } else { 1 };
                }
                let inner_end = j.min(bytes.len());
                blank(&mut skeleton, i + 1, inner_end);
                i = if inner_end < bytes.len() && bytes[inner_end] == b'"' {
                    inner_end + 1
                } else {
                    inner_end
                };
            }
            b'\'' => {
                let close = if bytes.get(i + 1) == Some(&b'\\') {
                    find_byte(bytes, i + 3, b'\'').filter(|at| at - i <= 8)
                } else if bytes.get(i + 2) == Some(&b'\'') {
                    Some(i + 2)
                } else {
                    None
                };
                match close {
                    Some(close) => {
                        blank(&mut skeleton, i + 1, close);
                        i = close + 1;
                    }
                    None => i += 1,
                }
            }
            _ => i += 1,
        }
    }

    // Blanked ranges always start and end on ASCII delimiters, so whole
    // multi-byte sequences are replaced and the buffers stay valid UTF-8.
    Some(Masked {
        code: String::from_utf8(code).ok()?,
        skeleton: String::from_utf8(skeleton).ok()?,
    })
}

fn blank(buf: &mut [u8], start: usize, end: usize) {
    let end = end.min(buf.len());
    if start >= end {
        return;
    }
    for byte in &mut buf[start..end] {
        if *byte != b'\n' {
            *byte = b' ';
        }
    }
}

fn find_byte(bytes: &[u8], from: usize, needle: u8) -> Option<usize> {
    bytes
        .get(from..)?
        .iter()
        .position(|b| *b == needle)
        .map(|pos| from + pos)
}

fn find_seq(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| from + pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_and_literals_are_blanked_in_place() {
        let text = "a(\"{x}\") // } \n/* { */ b('{', \"é\")";
        let masked = mask(text).unwrap();
        assert_eq!(masked.code.len(), text.len());
        assert_eq!(masked.skeleton.len(), text.len());
        assert_eq!(masked.code, "a(\"{x}\")      \n        b('{', \"é\")");
        assert!(!masked.skeleton.contains('{'));
        assert!(!masked.skeleton.contains('}'));
        assert!(masked.skeleton.starts_with("a(\"   \")"));
    }

    #[test]
    fn raw_strings_keep_their_delimiters() {
        let text = "val s = \"\"\"{ \"x\" }\"\"\"\nfun f() {}";
        let masked = mask(text).unwrap();
        assert_eq!(masked.skeleton.matches('{').count(), 1);
        assert!(masked.skeleton.ends_with("fun f() {}"));
    }
}
