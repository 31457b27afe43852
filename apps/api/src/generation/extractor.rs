//! Candidate extractor: finds a self-contained JSON object in raw provider text.
//!
//! Input: accumulated raw text (possibly partial, possibly wrapped in code
//! fences or tags, possibly with chatter around it).
//! Output: the best-guess payload substring, or `None` when no complete
//! top-level object is present yet. Never validates structure.

/// Wrapper markers providers put around payloads.
const WRAPPER_TAGS: &[(&str, &str)] = &[("<json>", "</json>"), ("<output>", "</output>")];

/// Returns the longest balanced top-level `{...}` in `raw`, after stripping
/// known wrappers.
pub fn extract_candidate(raw: &str) -> Option<&str> {
    let text = strip_wrappers(raw);
    balanced_objects(text).into_iter().max_by_key(|s| s.len())
}

/// Strips ```json ... ``` / ``` ... ``` fences and known tag wrappers.
/// A missing closing marker is tolerated, since mid-stream text often has
/// only the opening one.
fn strip_wrappers(text: &str) -> &str {
    let text = text.trim();

    for fence in ["```json", "```JSON", "```"] {
        if let Some(stripped) = text.strip_prefix(fence) {
            let stripped = stripped.trim_start();
            return stripped
                .strip_suffix("```")
                .map(|s| s.trim_end())
                .unwrap_or(stripped);
        }
    }

    for (open, close) in WRAPPER_TAGS {
        if let Some(start) = text.find(open) {
            let inner = &text[start + open.len()..];
            return match inner.find(close) {
                Some(end) => inner[..end].trim(),
                None => inner.trim(),
            };
        }
    }

    text
}

/// Collects every complete top-level object, respecting string literals and
/// escapes so braces inside strings don't count. A `{` that never closes
/// (stray brace in chatter, or the still-open payload mid-stream) restarts
/// the scan just past it, so objects nested after it are still found.
fn balanced_objects(text: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut from = 0;
    while let Some(unclosed) = scan_objects(text, from, &mut found) {
        from = unclosed + 1;
    }
    found
}

/// Scans `text[from..]`, pushing complete top-level objects into `found`.
/// Returns the byte offset of a top-level `{` left open at the end.
fn scan_objects<'a>(text: &'a str, from: usize, found: &mut Vec<&'a str>) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut start = from;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(from) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' if depth > 0 => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    found.push(&text[start..=i]);
                }
            }
            _ => {}
        }
    }

    (depth > 0).then_some(start)
}
