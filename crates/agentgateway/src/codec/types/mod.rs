//! Wire types for each dialect. Every type follows the teacher's
//! "typed known fields plus `#[serde(flatten)] rest: Value`" pattern: we
//! only need to understand the fields the pipeline actually inspects or
//! rewrites (model, messages, tools, streaming flag, usage); everything
//! else round-trips untouched through `rest`.

pub mod anthropic;
pub mod count_tokens;
pub mod openai_chat;
pub mod openai_responses;
