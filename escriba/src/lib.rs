// Library interface for escriba modules
// This allows tests and other binaries to import modules

pub mod conversation;
pub mod documents;
pub mod extraction;
pub mod llm;
