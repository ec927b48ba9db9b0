//! Balanced JSON extraction from model output.
//!
//! Models frequently wrap their JSON in conversational preamble or code
//! fences, and sometimes emit more than one JSON-looking fragment. These
//! scanners return the first complete top-level structure by tracking
//! brace depth, string state, and escapes, instead of pattern matching.

/// Return the first balanced `{...}` object in `text`, if any.
pub fn first_json_object(text: &str) -> Option<&str> {
    first_balanced(text, '{', '}')
}

/// Return the first balanced `[...]` array in `text`, if any.
pub fn first_json_array(text: &str) -> Option<&str> {
    first_balanced(text, '[', ']')
}

fn first_balanced(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        if ch == '"' {
            in_string = true;
        } else if ch == open {
            depth += 1;
        } else if ch == close {
            depth -= 1;
            if depth == 0 {
                return Some(&text[start..start + offset + ch.len_utf8()]);
            }
        }
    }

    None
}
