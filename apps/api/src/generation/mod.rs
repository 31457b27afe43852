// Generation pipeline: cache lookup → provider chain (streaming or single-shot)
// → validation → fallback. Handlers only talk to `pipeline::GenerationPipeline`.

pub mod extractor;
pub mod fallback;
pub mod handlers;
pub mod orchestrator;
pub mod pipeline;
pub mod prompts;
pub mod streaming;
pub mod validator;
pub mod warmer;
