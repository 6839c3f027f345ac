use serde::{Deserialize, Serialize};

/// Questionnaire answers collected by the multi-step form.
///
/// Stored verbatim (after digit normalization of `tax_id` / `phone`) in
/// `plans.form_data`. Free-text fields are sanitized only when they are
/// interpolated into the generation prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormData {
    // Current situation
    pub current_role: String,
    pub area: String,
    pub current_salary: String,
    pub experience_time: String,

    // Goal
    pub target_role: String,
    pub target_salary: String,
    pub timeframe: String,
    pub motivation: String,

    // Skills and gaps
    pub skills: String,
    pub gaps: String,
    pub interview_history: String,
    pub weekly_availability: String,

    // Personal context
    pub name: String,
    pub email: String,
    pub tax_id: String,
    pub phone: String,
    pub learning_preferences: Vec<String>,
    pub additional_context: String,
}

/// Strips everything but ASCII digits (CPF and phone normalization).
pub fn digits_only(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}
