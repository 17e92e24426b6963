pub mod anthropic;
pub mod mapping;
pub mod openai;
