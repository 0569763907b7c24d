pub mod gemini;
mod http_errors;
pub mod sse;
