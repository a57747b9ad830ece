pub mod anthropic_chat;
pub mod anthropic_responses;
pub mod responses_chat;
pub mod stream;
