//! Escaping of captured text before it reaches the local store
//!
//! Account fields come straight off the wire and end up in web reports, so
//! markup is neutralized at write time.

/// HTML-escape `&`, `<` and `>`.
pub fn clean(input: &str) -> String {
    if !input.contains(['&', '<', '>']) {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len() + 16);
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}
