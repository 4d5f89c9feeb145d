//! Truncating constructors for fixed-capacity strings.
//!
//! Records and action payloads embed `heapless::String<N>` fields. Inputs
//! longer than the field are cut at the last whole character that fits,
//! the same way the packed NVS layouts cut them.

use heapless::String;

/// Copy `s` into a `String<N>`, dropping whatever does not fit.
pub fn bounded<const N: usize>(s: &str) -> String<N> {
    let mut out = String::new();
    for ch in s.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}

/// Cut `s` to at most `max` bytes on a character boundary.
pub fn truncate_str(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
