//! Fallback Content Generator: the correctness backstop of the pipeline.
//!
//! Pure and deterministic: builds a schema-valid result from the request
//! fields alone. No I/O, no clock, no randomness. Premium requests get extra
//! sections. Whatever the inputs, the output passes `Validator::check` for the
//! request's content type.

use crate::models::{ContentType, GenerationRequest, Section, StructuredContent};

const ROLE_PLACEHOLDER: &str = "your target role";
const COMPANY_PLACEHOLDER: &str = "the company";
const MAX_ROLE_CHARS: usize = 120;
const MAX_SKILLS_USED: usize = 5;
const DEFAULT_TRAINING_WEEKS: u32 = 8;

pub fn fallback_content(request: &GenerationRequest) -> StructuredContent {
    let inputs = Inputs::from_request(request);
    match request.content_type {
        ContentType::Plan => interview_plan(&inputs),
        ContentType::TrainingPlan => training_plan(&inputs),
        ContentType::ResumeRewrite => resume_rewrite(&inputs),
    }
}

/// Request fields cleaned for substitution.
struct Inputs {
    role: String,
    company: String,
    level: Option<String>,
    skills: Vec<String>,
    weeks: u32,
    premium: bool,
}

impl Inputs {
    fn from_request(request: &GenerationRequest) -> Self {
        let role = clean(&request.job_title, MAX_ROLE_CHARS)
            .unwrap_or_else(|| ROLE_PLACEHOLDER.to_string());
        let company = request
            .company
            .as_deref()
            .and_then(|c| clean(c, MAX_ROLE_CHARS))
            .unwrap_or_else(|| COMPANY_PLACEHOLDER.to_string());
        let level = request
            .experience_level
            .as_deref()
            .and_then(|l| clean(l, 40));
        let skills = request
            .skills
            .iter()
            .filter_map(|s| clean(s, 60))
            .take(MAX_SKILLS_USED)
            .collect();

        Self {
            role,
            company,
            level,
            skills,
            weeks: request
                .duration_weeks
                .unwrap_or(DEFAULT_TRAINING_WEEKS)
                .clamp(1, 52),
            premium: request.premium,
        }
    }

    fn skills_or(&self, defaults: &[&str]) -> Vec<String> {
        if self.skills.is_empty() {
            defaults.iter().map(|s| s.to_string()).collect()
        } else {
            self.skills.clone()
        }
    }
}

/// Collapses whitespace and bounds length; `None` if nothing is left.
fn clean(input: &str, max_chars: usize) -> Option<String> {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    let bounded: String = collapsed.chars().take(max_chars).collect();
    let bounded = bounded.trim().to_string();
    if bounded.is_empty() {
        None
    } else {
        Some(bounded)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Interview-prep plan
// ────────────────────────────────────────────────────────────────────────────

fn interview_plan(inputs: &Inputs) -> StructuredContent {
    let role = &inputs.role;
    let company = &inputs.company;

    let mut sections = vec![
        Section::narrative(
            "timeline",
            "Preparation Timeline",
            format!(
                "Week 1: review the {role} job description and map each requirement to a story \
                 from your experience. Week 2: refresh core technical fundamentals and practise \
                 answering out loud. Week 3: research {company}, its products, and recent news. \
                 Final days: run full mock interviews and prepare questions for the interviewers."
            ),
        ),
        Section::list(
            "focus",
            "Core Focus Areas",
            inputs
                .skills_or(&[
                    "Role fundamentals",
                    "Problem solving",
                    "Communication",
                    "Past project impact",
                ])
                .into_iter()
                .map(|s| format!("Prepare two concrete examples demonstrating {s}"))
                .collect(),
        ),
        Section::list(
            "research",
            "Company Research",
            vec![
                format!("Summarize what {company} builds and who its customers are"),
                format!("Note how the {role} position supports {company}'s goals"),
                "Read recent announcements and prepare one informed question".to_string(),
            ],
        ),
    ];

    if inputs.premium {
        sections.push(Section::list(
            "mock-interviews",
            "Mock Interview Schedule",
            vec![
                "Behavioural mock focused on leadership and conflict stories".to_string(),
                format!("Technical mock covering the core {role} skill set"),
                "Final full-loop rehearsal with timed answers".to_string(),
            ],
        ));
        sections.push(Section::list(
            "negotiation",
            "Offer and Negotiation Prep",
            vec![
                format!("Research the compensation range for {role} positions"),
                "List your priorities beyond base salary".to_string(),
                "Prepare a calm, specific counter-offer script".to_string(),
            ],
        ));
    }

    let mut items = vec![
        format!("Why are you interested in the {role} position at {company}?"),
        format!("Walk me through your background and how it prepares you for a {role} role."),
        "Describe a challenging project you delivered and the impact it had.".to_string(),
        "Tell me about a time you disagreed with a teammate. How did you resolve it?".to_string(),
        "Describe a mistake you made at work and what you learned from it.".to_string(),
        "How do you prioritise when several deadlines compete for your time?".to_string(),
        format!("What does success look like in your first 90 days as a {role}?"),
        "Tell me about a time you had to learn something new quickly.".to_string(),
        "How do you handle ambiguous requirements?".to_string(),
        "Describe a time you received critical feedback and how you responded.".to_string(),
        format!("Which skills do you consider most important for a {role}, and why?"),
        format!("What questions do you have for us about {company}?"),
    ];
    items.extend(
        inputs
            .skills
            .iter()
            .take(3)
            .map(|s| format!("Describe how you have applied {s} in a real project.")),
    );

    StructuredContent {
        title: format!("Interview Preparation Plan: {role}"),
        sections,
        items,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Training plan
// ────────────────────────────────────────────────────────────────────────────

fn training_plan(inputs: &Inputs) -> StructuredContent {
    let role = &inputs.role;
    let weeks = inputs.weeks;
    let level = inputs.level.as_deref().unwrap_or("current");
    let foundation_end = (weeks / 3).max(1);
    let practice_end = ((weeks * 2) / 3).max(foundation_end);

    let mut sections = vec![
        Section::narrative(
            "timeline",
            "Training Timeline",
            format!(
                "A {weeks}-week plan starting from a {level} level. Weeks 1-{foundation_end}: \
                 foundations for the {role} role. Through week {practice_end}: guided practice on \
                 realistic tasks. Remaining weeks: a capstone project and review."
            ),
        ),
        Section::list(
            "milestones",
            "Milestones",
            vec![
                format!("Week {foundation_end}: fundamentals assessment passed"),
                format!("Week {practice_end}: three practice tasks completed"),
                format!("Week {weeks}: capstone project presented"),
            ],
        ),
        Section::list(
            "resources",
            "Recommended Resources",
            inputs
                .skills_or(&["Core concepts", "Tooling", "Best practices"])
                .into_iter()
                .map(|s| format!("Curated reading and exercises on {s}"))
                .collect(),
        ),
    ];

    if inputs.premium {
        sections.push(Section::list(
            "assessments",
            "Progress Assessments",
            vec![
                "Weekly self-assessment against the milestone checklist".to_string(),
                "Mid-plan skills review with written feedback".to_string(),
            ],
        ));
        sections.push(Section::list(
            "mentorship",
            "Mentorship Checkpoints",
            vec![
                format!("Kick-off session to tailor the plan to the {role} role"),
                "Fortnightly check-in to unblock and adjust pace".to_string(),
            ],
        ));
    }

    let mut items = vec![
        format!("Orientation: what a {role} does day to day"),
        "Foundations: core concepts and vocabulary".to_string(),
        "Tooling: setting up and mastering the daily toolkit".to_string(),
        "Practice: small guided exercises with feedback".to_string(),
        "Collaboration: working effectively with stakeholders".to_string(),
        "Quality: reviewing and improving your own work".to_string(),
        "Applied project: a realistic end-to-end task".to_string(),
        "Capstone: present, reflect, and plan next steps".to_string(),
    ];
    items.extend(
        inputs
            .skills
            .iter()
            .take(3)
            .map(|s| format!("Deep dive: {s}")),
    );

    StructuredContent {
        title: format!("{weeks}-Week Training Plan: {role}"),
        sections,
        items,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Resume rewrite
// ────────────────────────────────────────────────────────────────────────────

fn resume_rewrite(inputs: &Inputs) -> StructuredContent {
    let role = &inputs.role;
    let skills = inputs.skills_or(&["problem solving", "collaboration", "delivery"]);
    let level = inputs
        .level
        .as_deref()
        .map(|l| format!("{l} "))
        .unwrap_or_default();

    let mut sections = vec![
        Section::narrative(
            "summary",
            "Professional Summary",
            format!(
                "{level}{role} with hands-on experience in {}. Focused on measurable outcomes, \
                 clear communication, and shipping reliable work.",
                skills.join(", ")
            ),
        ),
        Section::list("skills", "Core Skills", skills.clone()),
        Section::list(
            "guidance",
            "Rewrite Guidance",
            vec![
                "Lead every bullet with a strong action verb".to_string(),
                "Quantify impact with numbers wherever you can".to_string(),
                format!("Mirror the language of {role} job postings"),
            ],
        ),
    ];

    if inputs.premium {
        sections.push(Section::list(
            "keywords",
            "Keyword Alignment",
            skills
                .iter()
                .map(|s| format!("Use \"{s}\" in at least one experience bullet"))
                .collect(),
        ));
        sections.push(Section::list(
            "achievements",
            "Achievement Framing",
            vec![
                "Frame each role as problem, action, result".to_string(),
                "Move your strongest result to the top of each role".to_string(),
            ],
        ));
    }

    let lead_skill = skills.first().map(String::as_str).unwrap_or("your core skills");
    let items = vec![
        format!("Delivered core {role} responsibilities, improving team output [add metric]"),
        format!("Applied {lead_skill} to solve a high-priority problem [add result]"),
        "Collaborated with cross-functional partners to ship on schedule [add scope]".to_string(),
        "Streamlined a recurring process, saving time each week [add hours]".to_string(),
        "Mentored colleagues and shared knowledge across the team [add count]".to_string(),
        "Owned a project end to end from planning to launch [add outcome]".to_string(),
    ];

    StructuredContent {
        title: format!("Resume Rewrite: {role}"),
        sections,
        items,
    }
}
