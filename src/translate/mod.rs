//! Protocol translation between the OpenAI, Anthropic, and Google dialects.
//!
//! The core of the proxy: converts requests, responses, and streaming events
//! between the three wire formats. Translation functions are pure except
//! where the signature cache is consulted; no I/O happens here.

pub mod anthropic_types;
pub mod google_types;
pub mod openai_types;
pub mod request;
pub mod response;
pub mod schema;
pub mod streaming;
