//! Prompt-injection mitigation for free-text form answers.
//!
//! Each free-text field is truncated to `MAX_FIELD_CHARS` and any span matching a
//! known injection pattern is replaced with `PLACEHOLDER`. Never fails. The
//! prompt itself also tells the model to treat user data as context only.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::models::form::FormData;

pub const MAX_FIELD_CHARS: usize = 500;
pub const PLACEHOLDER: &str = "[conteúdo removido]";

const PATTERN_SOURCES: &[&str] = &[
    // Instruction override, Portuguese and English
    r"(?i)ignore\s+(?:as|the|todas?\s+as)\s+instru[çc][õo]es",
    r"(?i)ignore\s+(?:all\s+)?(?:previous|prior|above)\s+instructions",
    r"(?i)esque[çc]a\s+(?:as|todas?\s+as)\s+instru[çc][õo]es",
    r"(?i)you\s+are\s+now",
    r"(?i)voc[êe]\s+agora\s+[ée]",
    // Role-label spoofing
    r"(?i)\bSYSTEM\s*:",
    r"(?i)\bASSISTANT\s*:",
    r"(?i)\bUSER\s*:",
    // Fenced code blocks
    r"(?s)```.*```",
    // Tag-like instruction markers
    r"(?i)</?(?:script|system|prompt|instruction|dados_usuario)[^>]*>",
    r"(?i)\[\s*/?INST\s*\]",
    // Jailbreak keywords
    r"(?i)\b(?:jailbreak|bypass|override)\b",
];

static SUSPICIOUS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    PATTERN_SOURCES
        .iter()
        .map(|pattern| Regex::new(pattern).expect("suspicious pattern must compile"))
        .collect()
});

/// Truncates and scrubs a single free-text value.
pub fn sanitize_field(value: &str) -> String {
    let mut clean: String = value.chars().take(MAX_FIELD_CHARS).collect();

    for pattern in SUSPICIOUS_PATTERNS.iter() {
        if pattern.is_match(&clean) {
            debug!(pattern = pattern.as_str(), "Suspicious pattern removed from form field");
            clean = pattern.replace_all(&clean, PLACEHOLDER).into_owned();
        }
    }

    clean
}

/// Returns a copy of the form with every free-text field sanitized.
/// Structured fields (salary, timeframe, contact data) are left untouched.
pub fn sanitize_form(form: &FormData) -> FormData {
    let mut sanitized = form.clone();
    for field in [
        &mut sanitized.current_role,
        &mut sanitized.area,
        &mut sanitized.target_role,
        &mut sanitized.motivation,
        &mut sanitized.skills,
        &mut sanitized.gaps,
        &mut sanitized.interview_history,
        &mut sanitized.additional_context,
    ] {
        *field = sanitize_field(field);
    }
    sanitized
}
