//! Plan record persistence.
//!
//! Every status transition is a dedicated method so the
//! `generated_plan IS NOT NULL ⇔ status = 'generated'` pairing can never be
//! written half-way. `PgPlanStore` is the production backend; tests use the
//! in-memory store from `test_support`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::generated::GeneratedPlan;
use crate::models::plan::{NewPlan, PlanRow, PlanSummary};

#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn insert(&self, plan: NewPlan) -> Result<PlanRow>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PlanRow>>;

    async fn find_by_billing_reference(&self, reference: &str) -> Result<Option<PlanRow>>;

    /// Generated and in-flight records for a CPF, newest first.
    async fn list_by_tax_id(&self, tax_id: &str) -> Result<Vec<PlanSummary>>;

    /// Replaces the placeholder reference once the provider has issued the real one.
    async fn assign_billing_reference(&self, id: Uuid, reference: &str) -> Result<()>;

    /// Compensating cleanup when the external charge could not be created.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// `awaiting_payment → pending`. Returns false if the record was in any other state.
    async fn mark_payment_confirmed(&self, id: Uuid) -> Result<bool>;

    /// `error → pending`. Returns false if the record was in any other state.
    async fn reset_for_retry(&self, id: Uuid) -> Result<bool>;

    /// Compare-and-set `awaiting_payment | pending → generating`.
    /// Returns false when another caller already claimed or finished the record.
    async fn claim_generation(&self, id: Uuid) -> Result<bool>;

    /// Commit point: `status = generated` with the parsed document.
    /// Never overwrites an already generated record; returns whether this call committed.
    async fn complete_generation(&self, id: Uuid, plan: &GeneratedPlan) -> Result<bool>;

    /// `status = error`, unless the record is already generated.
    async fn fail_generation(&self, id: Uuid) -> Result<()>;

    async fn set_workspace_url(&self, id: Uuid, url: &str) -> Result<()>;

    /// Moves records stuck in `generating` since before `older_than` to `error`.
    async fn lapse_stale_generations(&self, older_than: DateTime<Utc>) -> Result<Vec<Uuid>>;
}

#[derive(Clone)]
pub struct PgPlanStore {
    pool: PgPool,
}

impl PgPlanStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlanStore for PgPlanStore {
    async fn insert(&self, plan: NewPlan) -> Result<PlanRow> {
        let row = sqlx::query_as::<_, PlanRow>(
            r#"
            INSERT INTO plans
                (id, billing_reference, email, name, tax_id, phone, form_data,
                 status, role_current, role_target, payment_provider)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'awaiting_payment', $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(plan.id)
        .bind(&plan.billing_reference)
        .bind(&plan.email)
        .bind(&plan.name)
        .bind(&plan.tax_id)
        .bind(&plan.phone)
        .bind(Json(&plan.form_data))
        .bind(&plan.role_current)
        .bind(&plan.role_target)
        .bind(plan.payment_provider)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert plan")?;

        Ok(row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PlanRow>> {
        sqlx::query_as::<_, PlanRow>("SELECT * FROM plans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to fetch plan")
    }

    async fn find_by_billing_reference(&self, reference: &str) -> Result<Option<PlanRow>> {
        sqlx::query_as::<_, PlanRow>("SELECT * FROM plans WHERE billing_reference = $1")
            .bind(reference)
            .fetch_optional(&self.pool)
            .await
            .context("failed to fetch plan by billing reference")
    }

    async fn list_by_tax_id(&self, tax_id: &str) -> Result<Vec<PlanSummary>> {
        sqlx::query_as::<_, PlanSummary>(
            r#"
            SELECT id, name, status, role_current, role_target, created_at
            FROM plans
            WHERE tax_id = $1 AND status IN ('generated', 'generating')
            ORDER BY created_at DESC
            "#,
        )
        .bind(tax_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to list plans by tax id")
    }

    async fn assign_billing_reference(&self, id: Uuid, reference: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE plans SET billing_reference = $1, updated_at = now() WHERE id = $2",
        )
        .bind(reference)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("failed to assign billing reference")?;

        if result.rows_affected() == 0 {
            anyhow::bail!("plan {id} not found");
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM plans WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("failed to delete plan")?;
        Ok(())
    }

    async fn mark_payment_confirmed(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE plans SET status = 'pending', updated_at = now() \
             WHERE id = $1 AND status = 'awaiting_payment'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("failed to mark payment confirmed")?;
        Ok(result.rows_affected() == 1)
    }

    async fn reset_for_retry(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE plans SET status = 'pending', updated_at = now() \
             WHERE id = $1 AND status = 'error'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("failed to reset plan for retry")?;
        Ok(result.rows_affected() == 1)
    }

    async fn claim_generation(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE plans SET status = 'generating', updated_at = now() \
             WHERE id = $1 AND status IN ('awaiting_payment', 'pending')",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("failed to claim plan for generation")?;
        Ok(result.rows_affected() == 1)
    }

    async fn complete_generation(&self, id: Uuid, plan: &GeneratedPlan) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE plans SET status = 'generated', generated_plan = $1, updated_at = now() \
             WHERE id = $2 AND status <> 'generated'",
        )
        .bind(Json(plan))
        .bind(id)
        .execute(&self.pool)
        .await
        .context("failed to persist generated plan")?;
        Ok(result.rows_affected() == 1)
    }

    async fn fail_generation(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE plans SET status = 'error', generated_plan = NULL, updated_at = now() \
             WHERE id = $1 AND status <> 'generated'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("failed to mark plan as errored")?;
        Ok(())
    }

    async fn set_workspace_url(&self, id: Uuid, url: &str) -> Result<()> {
        sqlx::query("UPDATE plans SET workspace_url = $1, updated_at = now() WHERE id = $2")
            .bind(url)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("failed to record workspace url")?;
        Ok(())
    }

    async fn lapse_stale_generations(&self, older_than: DateTime<Utc>) -> Result<Vec<Uuid>> {
        sqlx::query_scalar::<_, Uuid>(
            "UPDATE plans SET status = 'error', updated_at = now() \
             WHERE status = 'generating' AND updated_at < $1 \
             RETURNING id",
        )
        .bind(older_than)
        .fetch_all(&self.pool)
        .await
        .context("failed to lapse stale generations")
    }
}
