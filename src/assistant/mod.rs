pub mod llm;
pub mod prompt;
pub mod session;
