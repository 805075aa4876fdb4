//! Operator hints derived from failed relay responses.

pub const REREGISTER_HINT: &str = "Authentication failed. Stored credentials may be stale; \
     run `courier register --force` or delete the credentials file to re-register.";

pub const MIGRATIONS_HINT: &str = "The relay reported a database error. \
     Ensure its database migrations have been run.";

const SNIPPET_LIMIT: usize = 300;

pub fn connection_hint(base_url: &str) -> String {
    format!("Confirm the relay is running at {base_url}.")
}

/// Remediation for a status/body pair, if one is known.
pub fn server_hint(status: u16, body: &str) -> Option<&'static str> {
    if status == 401 {
        return Some(REREGISTER_HINT);
    }
    if status >= 500 {
        let body = body.to_lowercase();
        if body.contains("no such table") || (body.contains("table") && !body.contains("exists")) {
            return Some(MIGRATIONS_HINT);
        }
    }
    None
}

/// A single-line excerpt of a response body suitable for a log line.
///
/// HTML error pages are reduced to their first comment (frameworks tend to
/// put the exception message there) or, failing that, their text content.
pub fn body_snippet(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    let text = if looks_like_html(trimmed) {
        first_comment(trimmed).unwrap_or_else(|| strip_tags(trimmed))
    } else {
        trimmed.to_string()
    };
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }
    if collapsed.chars().count() <= SNIPPET_LIMIT {
        return Some(collapsed);
    }
    let head: String = collapsed.chars().take(SNIPPET_LIMIT - 3).collect();
    Some(format!("{head}..."))
}

fn looks_like_html(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.match_indices('<').any(|(idx, _)| {
        let rest = lower[idx + 1..].trim_start();
        ["!doctype", "html", "head", "body"].iter().any(|tag| {
            rest.strip_prefix(tag).is_some_and(|after| {
                !after
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_alphanumeric() || c == '_')
            })
        })
    })
}

fn first_comment(body: &str) -> Option<String> {
    let start = body.find("<!--")? + 4;
    let len = body[start..].find("-->")?;
    let inner = body[start..start + len].trim();
    (!inner.is_empty()).then(|| inner.to_string())
}

fn strip_tags(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut in_tag = false;
    for c in body.chars() {
        match c {
            '<' if !in_tag => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}
