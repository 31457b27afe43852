// All provider prompt constants for the generation pipeline.
// Templates use `{placeholder}` markers filled by `render_prompt`.

use crate::models::{ContentType, GenerationRequest};
use crate::providers::Prompt;

/// Shared system prompt: enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are an expert career coach and technical interviewer. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Output contract appended to every prompt. Replace `{items_field}`,
/// `{min_items}`, `{narrative_types}`.
pub const OUTPUT_SCHEMA_TEMPLATE: &str = r#"Return a JSON object with this EXACT schema (no extra fields):
{
  "title": "Short title for the whole document",
  "sections": [
    {"type": "timeline", "title": "Section title", "content": "Narrative text"},
    {"type": "topics", "title": "Section title", "items": ["Item one", "Item two"]}
  ],
  "{items_field}": ["..."]
}

Rules:
- Sections of type {narrative_types} carry a non-empty "content" string.
- Every other section carries a non-empty "items" array of strings.
- Every section has a non-empty "type" and "title".
- "{items_field}" has AT LEAST {min_items} non-empty entries."#;

/// Interview preparation plan. Replace: {profile}, {depth}
pub const PLAN_PROMPT_TEMPLATE: &str = r#"Create an interview preparation plan for the candidate below.

{profile}

Include a "timeline" section describing week-by-week preparation, sections for
core focus areas and company research, and a list of likely interview questions
under "questions". Tailor every question to the role and listed skills.
{depth}"#;

/// Skills training plan. Replace: {profile}, {weeks}, {depth}
pub const TRAINING_PLAN_PROMPT_TEMPLATE: &str = r#"Create a {weeks}-week training plan that closes the gap between the candidate's current skills and the target role.

{profile}

Include a "timeline" section describing the week-by-week progression, sections
for milestones and recommended resources, and the training units under
"modules". Each module is one concrete, completable unit of study.
{depth}"#;

/// Resume rewrite. Replace: {profile}, {resume_text}, {depth}
pub const RESUME_REWRITE_PROMPT_TEMPLATE: &str = r#"Rewrite the candidate's resume for the target role below.

{profile}

Include a "summary" section with a rewritten professional summary, a "timeline"
section describing how the experience should be ordered, a section listing the
core skills to emphasize, and the rewritten achievement bullets under "bullets".
Do NOT invent employers, titles, dates, or metrics absent from the resume.
{depth}

CURRENT RESUME:
{resume_text}"#;

pub const STANDARD_DEPTH: &str = "Keep each entry concise and actionable.";

pub const PREMIUM_DEPTH: &str = "This is a premium request: go deeper. Add extra sections \
    (mock interviews, assessments, negotiation, keyword targeting as relevant) and make \
    every entry specific, with concrete examples.";

/// Cap on free text embedded in prompts.
const MAX_FREE_TEXT_CHARS: usize = 12_000;

/// Renders the provider prompt for `request`.
pub fn render_prompt(request: &GenerationRequest) -> Prompt {
    let content_type = request.content_type;
    let profile = render_profile(request);
    let depth = if request.premium {
        PREMIUM_DEPTH
    } else {
        STANDARD_DEPTH
    };

    let body = match content_type {
        ContentType::Plan => PLAN_PROMPT_TEMPLATE
            .replace("{profile}", &profile)
            .replace("{depth}", depth),
        ContentType::TrainingPlan => TRAINING_PLAN_PROMPT_TEMPLATE
            .replace("{profile}", &profile)
            .replace(
                "{weeks}",
                &request.duration_weeks.unwrap_or(8).clamp(1, 52).to_string(),
            )
            .replace("{depth}", depth),
        ContentType::ResumeRewrite => RESUME_REWRITE_PROMPT_TEMPLATE
            .replace("{profile}", &profile)
            .replace("{depth}", depth)
            .replace(
                "{resume_text}",
                truncate(request.resume_text.as_deref().unwrap_or_default()),
            ),
    };

    let schema = OUTPUT_SCHEMA_TEMPLATE
        .replace("{items_field}", content_type.items_field())
        .replace("{min_items}", &content_type.min_items().to_string())
        .replace(
            "{narrative_types}",
            &content_type
                .narrative_section_types()
                .iter()
                .map(|t| format!("\"{t}\""))
                .collect::<Vec<_>>()
                .join(" or "),
        );

    Prompt {
        system: JSON_ONLY_SYSTEM.to_string(),
        user: format!("{body}\n\n{schema}"),
    }
}

fn render_profile(request: &GenerationRequest) -> String {
    let mut lines = vec![format!("TARGET ROLE: {}", request.job_title.trim())];
    if let Some(company) = non_blank(request.company.as_deref()) {
        lines.push(format!("COMPANY: {company}"));
    }
    if let Some(level) = non_blank(request.experience_level.as_deref()) {
        lines.push(format!("EXPERIENCE LEVEL: {level}"));
    }
    if !request.skills.is_empty() {
        lines.push(format!("SKILLS: {}", request.skills.join(", ")));
    }
    if let Some(jd) = non_blank(request.job_description.as_deref()) {
        lines.push(format!("JOB DESCRIPTION:\n{}", truncate(jd)));
    }
    lines.join("\n")
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn truncate(text: &str) -> &str {
    match text.char_indices().nth(MAX_FREE_TEXT_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
