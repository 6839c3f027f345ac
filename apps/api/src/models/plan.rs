use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::form::FormData;
use crate::models::generated::GeneratedPlan;

/// Lifecycle of a plan record.
///
/// `awaiting_payment → pending → generating → generated`, or
/// `generating → error`. `error` is recoverable: the next confirmed-payment
/// signal re-enters the flow through `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    AwaitingPayment,
    Pending,
    Generating,
    Generated,
    Error,
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AwaitingPayment => "awaiting_payment",
            Self::Pending => "pending",
            Self::Generating => "generating",
            Self::Generated => "generated",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Which payment provider's webhook confirms a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentProviderKind {
    Stripe,
    Woovi,
    Abacatepay,
}

impl fmt::Display for PaymentProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stripe => "stripe",
            Self::Woovi => "woovi",
            Self::Abacatepay => "abacatepay",
        };
        f.write_str(s)
    }
}

/// A persisted plan record, serialized by the status polling endpoints.
/// CPF and phone never leave the service, neither at the top level nor inside
/// `form_data`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlanRow {
    pub id: Uuid,
    pub billing_reference: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub tax_id: Option<String>,
    #[serde(skip_serializing)]
    pub phone: Option<String>,
    #[serde(serialize_with = "serialize_form_without_contact")]
    pub form_data: Json<FormData>,
    pub status: PlanStatus,
    /// Non-null iff `status == generated` (enforced by a CHECK constraint).
    pub generated_plan: Option<Json<GeneratedPlan>>,
    pub role_current: Option<String>,
    pub role_target: Option<String>,
    pub payment_provider: PaymentProviderKind,
    pub workspace_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PlanRow {
    /// The generated document, only when the record is in its terminal success state.
    pub fn generated(&self) -> Option<&GeneratedPlan> {
        match self.status {
            PlanStatus::Generated => self.generated_plan.as_ref().map(|json| &json.0),
            _ => None,
        }
    }

    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or("")
    }
}

fn serialize_form_without_contact<S: Serializer>(
    form: &Json<FormData>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut value = serde_json::to_value(&form.0).map_err(serde::ser::Error::custom)?;
    if let Some(fields) = value.as_object_mut() {
        fields.remove("tax_id");
        fields.remove("phone");
    }
    value.serialize(serializer)
}

/// Fields needed to insert a new record at checkout time.
#[derive(Debug, Clone)]
pub struct NewPlan {
    pub id: Uuid,
    pub billing_reference: String,
    pub email: String,
    pub name: String,
    pub tax_id: Option<String>,
    pub phone: Option<String>,
    pub form_data: FormData,
    pub role_current: Option<String>,
    pub role_target: Option<String>,
    pub payment_provider: PaymentProviderKind,
}

impl NewPlan {
    /// Builds an `awaiting_payment` record from a validated form. The billing
    /// reference is a placeholder until the provider returns the real one.
    pub fn from_form(form: FormData, provider: PaymentProviderKind) -> Self {
        let id = Uuid::new_v4();
        NewPlan {
            id,
            billing_reference: format!("pending_{id}"),
            email: form.email.trim().to_string(),
            name: form.name.trim().to_string(),
            tax_id: Some(form.tax_id.clone()).filter(|v| !v.is_empty()),
            phone: Some(form.phone.clone()).filter(|v| !v.is_empty()),
            role_current: Some(form.current_role.trim().to_string()).filter(|v| !v.is_empty()),
            role_target: Some(form.target_role.trim().to_string()).filter(|v| !v.is_empty()),
            form_data: form,
            payment_provider: provider,
        }
    }
}

/// Summary returned by the lookup-by-CPF endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlanSummary {
    pub id: Uuid,
    pub name: String,
    pub status: PlanStatus,
    pub role_current: Option<String>,
    pub role_target: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&PlanRow> for PlanSummary {
    fn from(row: &PlanRow) -> Self {
        PlanSummary {
            id: row.id,
            name: row.name.clone(),
            status: row.status,
            role_current: row.role_current.clone(),
            role_target: row.role_target.clone(),
            created_at: row.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::plan_row;

    #[test]
    fn test_serialized_row_omits_contact_digits() {
        let value = serde_json::to_value(plan_row(PlanStatus::Pending)).unwrap();
        assert!(value.get("tax_id").is_none());
        assert!(value.get("phone").is_none());
        assert!(value["form_data"].get("tax_id").is_none());
        assert!(value["form_data"].get("phone").is_none());
        assert_eq!(value["form_data"]["email"], "mariana@example.com");
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&PlanStatus::AwaitingPayment).unwrap();
        assert_eq!(json, r#""awaiting_payment""#);
        assert_eq!(PlanStatus::Generated.to_string(), "generated");
    }

    #[test]
    fn test_provider_kind_deserializes_lowercase() {
        let kind: PaymentProviderKind = serde_json::from_str(r#""abacatepay""#).unwrap();
        assert_eq!(kind, PaymentProviderKind::Abacatepay);
    }

    #[test]
    fn test_new_plan_uses_placeholder_reference() {
        let form = crate::test_support::sample_form();
        let new_plan = NewPlan::from_form(form, PaymentProviderKind::Stripe);
        assert_eq!(new_plan.billing_reference, format!("pending_{}", new_plan.id));
        assert_eq!(new_plan.role_current.as_deref(), Some("Analista de Dados Pleno"));
        assert_eq!(new_plan.role_target.as_deref(), Some("Cientista de Dados Sênior"));
    }

    #[test]
    fn test_generated_is_none_unless_status_generated() {
        let mut row = crate::test_support::plan_row(PlanStatus::Error);
        row.generated_plan = Some(Json(crate::test_support::sample_generated_plan()));
        assert!(row.generated().is_none());
        row.status = PlanStatus::Generated;
        assert!(row.generated().is_some());
    }
}
