//! LLM provider implementations for Tandem.
//!
//! All providers implement the `tandem_core::Provider` trait and stream
//! raw chunks; nothing here merges tool-call fragments.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
