use crate::errors::AppError;
use crate::models::form::{digits_only, FormData};

const CPF_DIGITS: usize = 11;
const MIN_PHONE_DIGITS: usize = 10;

/// Brazilian CPF check: 11 digits, not all equal, both mod-11 check digits match.
/// Punctuation is ignored.
pub fn is_valid_cpf(cpf: &str) -> bool {
    let digits: Vec<u32> = cpf.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != CPF_DIGITS {
        return false;
    }
    if digits.iter().all(|d| *d == digits[0]) {
        return false;
    }

    // Check digit t is computed over the t digits before it, weighted t+1 down to 2.
    (9..CPF_DIGITS).all(|t| {
        let sum: u32 = digits[..t]
            .iter()
            .enumerate()
            .map(|(i, d)| d * (t as u32 + 1 - i as u32))
            .sum();
        (sum * 10) % 11 % 10 == digits[t]
    })
}

/// Validates the contact fields of a submitted form and normalizes `tax_id`
/// and `phone` to digits only. Runs before any record exists.
pub fn validate_form(mut form: FormData) -> Result<FormData, AppError> {
    let missing: Vec<&str> = [
        ("name", &form.name),
        ("email", &form.email),
        ("tax_id", &form.tax_id),
        ("phone", &form.phone),
    ]
    .into_iter()
    .filter(|(_, value)| value.trim().is_empty())
    .map(|(field, _)| field)
    .collect();

    if !missing.is_empty() {
        return Err(AppError::Validation(format!(
            "Required fields missing: {}",
            missing.join(", ")
        )));
    }

    if !form.email.contains('@') {
        return Err(AppError::Validation("Invalid email".to_string()));
    }

    if !is_valid_cpf(&form.tax_id) {
        return Err(AppError::Validation("Invalid CPF".to_string()));
    }

    let phone = digits_only(&form.phone);
    if phone.len() < MIN_PHONE_DIGITS {
        return Err(AppError::Validation("Invalid phone number".to_string()));
    }

    form.tax_id = digits_only(&form.tax_id);
    form.phone = phone;
    Ok(form)
}
