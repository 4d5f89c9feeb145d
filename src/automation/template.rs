//! `${name}` substitution against the variable store.

use super::variables::{VAR_NAME_MAX, VariableStore};
use crate::bounded::truncate_str;

/// Replace each well-formed `${NAME}` in `input` with the text form of
/// variable `NAME` (as [`VariableStore::get_string`] renders it).
///
/// Unknown or over-long names and unterminated `${` are copied literally.
/// The result is cut to `max_len` bytes on a character boundary.
pub fn expand(vars: &VariableStore, input: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(input.len().min(max_len));
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let name = &after[..end];
        let literal = &rest[start..start + 2 + end + 1];
        match lookup(vars, name) {
            Some(text) => out.push_str(&text),
            None => out.push_str(literal),
        }
        rest = &after[end + 1..];
        if out.len() >= max_len {
            break;
        }
    }
    out.push_str(rest);

    let keep = truncate_str(&out, max_len).len();
    out.truncate(keep);
    out
}

fn lookup(vars: &VariableStore, name: &str) -> Option<String> {
    if name.is_empty() || name.len() > VAR_NAME_MAX {
        return None;
    }
    vars.get_string(name).ok().map(|s| s.as_str().to_owned())
}
