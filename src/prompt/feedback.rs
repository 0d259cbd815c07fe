//! Corrective feedback from the previous attempt
//!
//! The block is appended, never substituted, and is rebuilt each attempt
//! from one error list only.

use crate::types::ErrorRecord;

pub const FEEDBACK_HEADER: &str = "CRITICAL CORRECTIONS NEEDED (previous attempt had errors):";
pub const FEEDBACK_FOOTER: &str =
    "You MUST fix each of these specific issues in this generation. Double-check these exact areas.";

/// Append a numbered correction block for `previous_errors` to `base_prompt`.
///
/// Returns `base_prompt` unchanged when there is nothing to correct.
pub fn build_feedback(base_prompt: &str, previous_errors: &[ErrorRecord]) -> String {
    if previous_errors.is_empty() {
        return base_prompt.to_string();
    }

    let items = previous_errors
        .iter()
        .enumerate()
        .map(|(i, e)| format!("{}. {}", i + 1, e.feedback_line()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{}\n\n{}\n{}\n\n{}",
        base_prompt, FEEDBACK_HEADER, items, FEEDBACK_FOOTER
    )
}
