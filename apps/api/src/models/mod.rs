pub mod attempt;
pub mod content;
pub mod request;

pub use attempt::{AttemptOutcome, ProviderAttempt};
pub use content::{Section, StructuredContent};
pub use request::{ContentType, GenerationRequest};
