//! Relaxed-JSON normalization for model output.
//!
//! Models often answer with "almost JSON": single-quoted strings, bare keys,
//! trailing commas, raw line breaks inside strings. [`repair`] tokenizes the
//! text and re-emits it as strict JSON without touching string contents, so
//! an apostrophe inside `"it's"` survives.

#[derive(Clone, Copy, PartialEq)]
enum Quote {
    Double,
    Single,
}

/// Normalize near-JSON into strict JSON text. Idempotent.
pub fn repair(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' | '\'' => {
                let quote = if c == '"' { Quote::Double } else { Quote::Single };
                i = copy_string(&chars, i + 1, quote, &mut out);
                continue;
            }
            c if c.is_whitespace() => {
                if !out.is_empty() && !out.ends_with(' ') {
                    out.push(' ');
                }
            }
            ',' if next_significant(&chars, i + 1).is_some_and(|n| n == ']' || n == '}') => {}
            c if is_ident_start(c) && expects_key(&out) => {
                let end = ident_end(&chars, i);
                let ident: String = chars[i..end].iter().collect();
                if next_significant(&chars, end) == Some(':') {
                    out.push('"');
                    out.push_str(&ident);
                    out.push('"');
                } else {
                    out.push_str(&ident);
                }
                i = end;
                continue;
            }
            c => out.push(c),
        }
        i += 1;
    }

    out.trim_end().to_string()
}

/// Copy a string body starting after its opening quote, emitting it
/// double-quoted. Returns the index after the closing quote.
fn copy_string(chars: &[char], mut i: usize, quote: Quote, out: &mut String) -> usize {
    out.push('"');
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => {
                match (quote, chars.get(i + 1)) {
                    (Quote::Single, Some('\'')) => out.push('\''),
                    (_, Some(&next)) => {
                        out.push('\\');
                        out.push(next);
                    }
                    (_, None) => out.push('\\'),
                }
                i += 2;
                continue;
            }
            '"' if quote == Quote::Double => {
                out.push('"');
                return i + 1;
            }
            '\'' if quote == Quote::Single => {
                out.push('"');
                return i + 1;
            }
            '"' => out.push_str("\\\""),
            '\n' | '\r' | '\t' => out.push(' '),
            c => out.push(c),
        }
        i += 1;
    }
    i
}

fn next_significant(chars: &[char], from: usize) -> Option<char> {
    chars[from.min(chars.len())..]
        .iter()
        .copied()
        .find(|c| !c.is_whitespace())
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn ident_end(chars: &[char], start: usize) -> usize {
    let mut end = start;
    while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_' || chars[end] == '$') {
        end += 1;
    }
    end
}

/// A bare identifier can only be an object key right after `{` or `,`.
fn expects_key(out: &str) -> bool {
    matches!(out.trim_end().chars().last(), Some('{') | Some(','))
}
