//! Output sanitization and prompt recognition (spec.md sections 4.1, 4.2).
//!
//! These two components are pure, total, and leaf-level: the sanitizer
//! turns raw PTY bytes into a clean string, and the prompt matcher decides
//! whether a single stripped line is the console's "ready for input" line.

mod prompt;
mod sanitize;

pub use prompt::{PromptMatcher, SENTINEL_PROMPT};
pub use sanitize::sanitize;
