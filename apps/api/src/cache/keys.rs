//! Cache Key Builder: deterministic, versioned fingerprint of a generation request.
//!
//! Layout: `v{schema}:{content_type}:{title}:{level}:{company}:{skills}:{tier}:{weeks}:{digest}`
//!
//! Short named fields are embedded as readable slugs. The slugs are lossy
//! (punctuation dropped, length capped), so they never decide identity on
//! their own: `digest` is a truncated SHA-256 over every field in canonical
//! form (lowercased, whitespace collapsed, punctuation kept), plus a bounded
//! prefix of the free text (job description, resume body).

use sha2::{Digest, Sha256};

use crate::models::GenerationRequest;

/// Bump whenever the shape of `StructuredContent` changes. Old entries become
/// unreachable and age out through their TTL.
pub const CACHE_SCHEMA_VERSION: u32 = 3;

/// Characters of each free-text field that participate in the digest.
const FREE_TEXT_PREFIX_CHARS: usize = 4000;
/// Maximum characters of a single embedded field after normalization.
const MAX_FIELD_CHARS: usize = 64;
/// Skills embedded verbatim; the full list always feeds the digest.
const MAX_EMBEDDED_SKILLS: usize = 12;
const MAX_SKILL_CHARS: usize = 32;
/// Hex characters of the SHA-256 digest kept in the key.
const DIGEST_HEX_CHARS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds the cache key for `request` under the current schema version.
pub fn build_key(request: &GenerationRequest) -> CacheKey {
    build_key_with_version(request, CACHE_SCHEMA_VERSION)
}

pub(crate) fn build_key_with_version(request: &GenerationRequest, version: u32) -> CacheKey {
    let skills = slugged_skills(&request.skills);
    let embedded_skills = if skills.is_empty() {
        "none".to_string()
    } else {
        skills
            .iter()
            .take(MAX_EMBEDDED_SKILLS)
            .map(|s| truncate_chars(s, MAX_SKILL_CHARS))
            .collect::<Vec<_>>()
            .join(",")
    };

    let tier = if request.premium { "premium" } else { "free" };
    let weeks = request
        .duration_weeks
        .map(|w| w.to_string())
        .unwrap_or_else(|| "-".to_string());

    let key = format!(
        "v{version}:{ct}:{title}:{level}:{company}:{skills}:{tier}:{weeks}:{digest}",
        ct = request.content_type.as_str(),
        title = slug_or(&request.job_title, "untitled"),
        level = slug_or(request.experience_level.as_deref().unwrap_or(""), "any"),
        company = slug_or(request.company.as_deref().unwrap_or(""), "any"),
        skills = embedded_skills,
        digest = request_digest(request),
    );

    CacheKey(key)
}

/// Lowercases, replaces every run of non-alphanumerics with a single `-`,
/// and bounds the length.
fn slug(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_dash = false;
    for c in input.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    truncate_chars(&out, MAX_FIELD_CHARS)
}

fn slug_or(input: &str, empty: &str) -> String {
    let s = slug(input);
    if s.is_empty() {
        empty.to_string()
    } else {
        s
    }
}

fn slugged_skills(skills: &[String]) -> Vec<String> {
    sorted_unique(skills.iter().map(|s| slug(s)))
}

fn canonical_skills(skills: &[String]) -> Vec<String> {
    sorted_unique(skills.iter().map(|s| canonical(s)))
}

fn sorted_unique(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = values.filter(|s| !s.is_empty()).collect();
    out.sort();
    out.dedup();
    out
}

/// Lowercased with whitespace collapsed. Punctuation is significant
/// (`C++` and `C` are different skills).
fn canonical(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Collapses whitespace and keeps a bounded prefix.
fn normalize_free_text(input: &str) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&collapsed, FREE_TEXT_PREFIX_CHARS)
}

fn request_digest(request: &GenerationRequest) -> String {
    let fields = [
        ("title", canonical(&request.job_title)),
        ("level", canonical(request.experience_level.as_deref().unwrap_or(""))),
        ("company", canonical(request.company.as_deref().unwrap_or(""))),
        ("skills", canonical_skills(&request.skills).join("\n")),
        ("jd", normalize_free_text(request.job_description.as_deref().unwrap_or(""))),
        ("resume", normalize_free_text(request.resume_text.as_deref().unwrap_or(""))),
    ];

    let mut hasher = Sha256::new();
    for (label, value) in &fields {
        hasher.update(label.as_bytes());
        hasher.update(b"\0");
        hasher.update(value.as_bytes());
        hasher.update(b"\0");
    }

    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<String>()[..DIGEST_HEX_CHARS]
        .to_string()
}

fn truncate_chars(input: &str, max: usize) -> String {
    input.chars().take(max).collect()
}
