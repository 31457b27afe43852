use serde::{Deserialize, Serialize};

/// Which family of structured content a request asks for.
///
/// Each content type is its own call site: it has its own provider order,
/// cache namespace, item minimum, and fallback skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentType {
    Plan,
    TrainingPlan,
    ResumeRewrite,
}

impl ContentType {
    pub const ALL: [ContentType; 3] = [
        ContentType::Plan,
        ContentType::TrainingPlan,
        ContentType::ResumeRewrite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Plan => "plan",
            ContentType::TrainingPlan => "training-plan",
            ContentType::ResumeRewrite => "resume-rewrite",
        }
    }

    /// Fixed cache-store prefix for this content family.
    pub fn namespace(&self) -> &'static str {
        match self {
            ContentType::Plan => "prep:plan",
            ContentType::TrainingPlan => "prep:training",
            ContentType::ResumeRewrite => "prep:resume",
        }
    }

    /// Minimum number of top-level items an accepted result must carry.
    pub fn min_items(&self) -> usize {
        match self {
            ContentType::Plan => 10,
            ContentType::TrainingPlan => 6,
            ContentType::ResumeRewrite => 5,
        }
    }

    /// Name of the top-level items collection in provider output and responses.
    pub fn items_field(&self) -> &'static str {
        match self {
            ContentType::Plan => "questions",
            ContentType::TrainingPlan => "modules",
            ContentType::ResumeRewrite => "bullets",
        }
    }

    /// Section types that carry free text instead of an items array.
    pub fn narrative_section_types(&self) -> &'static [&'static str] {
        match self {
            ContentType::Plan | ContentType::TrainingPlan => &["timeline"],
            ContentType::ResumeRewrite => &["timeline", "summary"],
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound description of what to generate.
///
/// Immutable once accepted by the handler. Only used to derive a cache key
/// and to render provider prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub content_type: ContentType,
    pub job_title: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub experience_level: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    /// Free text, hashed into the cache key rather than embedded.
    #[serde(default)]
    pub job_description: Option<String>,
    /// Free text, hashed into the cache key rather than embedded.
    #[serde(default)]
    pub resume_text: Option<String>,
    /// Training plans only.
    #[serde(default)]
    pub duration_weeks: Option<u32>,
    #[serde(default)]
    pub premium: bool,
    /// Honored only when `premium` is set.
    #[serde(default)]
    pub bypass_cache: bool,
}

impl GenerationRequest {
    pub fn new(content_type: ContentType, job_title: impl Into<String>) -> Self {
        Self {
            content_type,
            job_title: job_title.into(),
            company: None,
            experience_level: None,
            skills: Vec::new(),
            job_description: None,
            resume_text: None,
            duration_weeks: None,
            premium: false,
            bypass_cache: false,
        }
    }

    #[cfg(test)]
    pub fn premium(mut self, premium: bool) -> Self {
        self.premium = premium;
        self
    }

    #[cfg(test)]
    pub fn with_skills<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skills = skills.into_iter().map(Into::into).collect();
        self
    }

    #[cfg(test)]
    pub fn with_job_description(mut self, text: impl Into<String>) -> Self {
        self.job_description = Some(text.into());
        self
    }

    #[cfg(test)]
    pub fn with_resume_text(mut self, text: impl Into<String>) -> Self {
        self.resume_text = Some(text.into());
        self
    }

    /// Whether this request may skip the cache read.
    pub fn skips_cache(&self) -> bool {
        self.premium && self.bypass_cache
    }

    /// Checks the web-tier contract. Returns a user-facing message on failure.
    pub fn check(&self) -> Result<(), String> {
        let title = self.job_title.trim();
        if title.is_empty() {
            return Err("job_title cannot be empty".to_string());
        }
        if title.chars().count() > 200 {
            return Err("job_title must be at most 200 characters".to_string());
        }
        if self.content_type == ContentType::ResumeRewrite
            && self
                .resume_text
                .as_deref()
                .map(|t| t.trim().is_empty())
                .unwrap_or(true)
        {
            return Err("resume_text is required for resume-rewrite".to_string());
        }
        if let Some(weeks) = self.duration_weeks {
            if !(1..=52).contains(&weeks) {
                return Err("duration_weeks must be between 1 and 52".to_string());
            }
        }
        Ok(())
    }
}
