// Checkout: form validation, record creation and charge creation.

pub mod handlers;
pub mod validation;
