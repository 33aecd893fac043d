//! Advisory providers and role definitions.
//!
//! This module provides the `Advisor` capability, its Ollama and
//! OpenAI-compatible implementations, and the built-in panel roles.

pub mod advisor;
pub mod ollama;
pub mod openai;
pub mod roles;

#[cfg(test)]
pub mod testing;

pub use advisor::{build_advisor, Advisor, AdvisorError};
pub use roles::RoleSpec;
