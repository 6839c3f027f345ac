//! Notion workspace export.
//!
//! OAuth (public integration, `owner=user`) yields an access token; the export
//! then creates one page holding the whole plan under the first page the token
//! can see. The block tree is built by [`plan_blocks`], a pure function.

use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::delivery::{ensure_success, DeliveryError};
use crate::models::generated::{GeneratedPlan, Month, Priority};
use crate::models::plan::PlanRow;

const NOTION_API_URL: &str = "https://api.notion.com/v1";
const NOTION_AUTHORIZE_URL: &str = "https://api.notion.com/v1/oauth/authorize";
const NOTION_VERSION: &str = "2022-06-28";
/// Notion accepts at most this many children per create/append request.
const MAX_CHILDREN_PER_REQUEST: usize = 100;
/// Notion's limit for a single rich-text content string.
const MAX_TEXT_CHARS: usize = 2000;

#[derive(Clone)]
pub struct NotionClient {
    client: Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<ObjectRef>,
}

#[derive(Debug, Deserialize)]
struct ObjectRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CreatedPage {
    id: String,
    url: Option<String>,
}

impl NotionClient {
    pub fn new(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            client: Client::new(),
            client_id,
            client_secret,
            redirect_uri,
        }
    }

    /// Where to send the user to grant access. `state` round-trips the plan id.
    pub fn authorize_url(&self, state: &str) -> String {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("response_type", "code"),
            ("owner", "user"),
            ("state", state),
        ];
        match Url::parse_with_params(NOTION_AUTHORIZE_URL, &params) {
            Ok(url) => url.into(),
            Err(_) => NOTION_AUTHORIZE_URL.to_string(),
        }
    }

    /// Exchanges an OAuth code for an access token.
    pub async fn exchange_code(&self, code: &str) -> Result<String, DeliveryError> {
        let response = self
            .client
            .post(format!("{NOTION_API_URL}/oauth/token"))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .json(&json!({
                "grant_type": "authorization_code",
                "code": code,
                "redirect_uri": self.redirect_uri,
            }))
            .send()
            .await?;
        let token: TokenResponse = ensure_success("Notion", response).await?.json().await?;

        token.access_token.ok_or_else(|| DeliveryError::Api {
            service: "Notion",
            status: 200,
            message: "token response has no access_token".to_string(),
        })
    }

    /// Creates the plan page and returns its URL.
    pub async fn export(
        &self,
        token: &str,
        row: &PlanRow,
        plan: &GeneratedPlan,
    ) -> Result<String, DeliveryError> {
        let parent_id = self.first_shared_page(token).await?;
        let blocks = plan_blocks(row, plan);
        let mut batches = blocks.chunks(MAX_CHILDREN_PER_REQUEST);
        let first_batch = batches.next().unwrap_or_default();

        let response = self
            .request(reqwest::Method::POST, "pages", token)
            .json(&json!({
                "parent": { "type": "page_id", "page_id": parent_id },
                "icon": { "type": "emoji", "emoji": "🎯" },
                "properties": {
                    "title": { "title": [{ "text": { "content": format!("Plano de Carreira 90 dias: {}", row.name) } }] }
                },
                "children": first_batch,
            }))
            .send()
            .await?;
        let page: CreatedPage = ensure_success("Notion", response).await?.json().await?;

        for batch in batches {
            let response = self
                .request(
                    reqwest::Method::PATCH,
                    &format!("blocks/{}/children", page.id),
                    token,
                )
                .json(&json!({ "children": batch }))
                .send()
                .await?;
            ensure_success("Notion", response).await?;
        }

        info!(plan_id = %row.id, page_id = %page.id, blocks = blocks.len(), "Notion page created");
        Ok(page.url.unwrap_or_default())
    }

    async fn first_shared_page(&self, token: &str) -> Result<String, DeliveryError> {
        let response = self
            .request(reqwest::Method::POST, "search", token)
            .json(&json!({
                "filter": { "value": "page", "property": "object" },
                "page_size": 1,
            }))
            .send()
            .await?;
        let search: SearchResponse = ensure_success("Notion", response).await?.json().await?;

        let page = search
            .results
            .into_iter()
            .next()
            .ok_or(DeliveryError::NoSharedPage)?;
        debug!(page_id = %page.id, "Notion parent page resolved");
        Ok(page.id)
    }

    fn request(&self, method: reqwest::Method, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{NOTION_API_URL}/{path}"))
            .bearer_auth(token)
            .header("Notion-Version", NOTION_VERSION)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Page content
// ────────────────────────────────────────────────────────────────────────────

/// Display-only salary comparison. Unparseable salaries count as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SalaryDelta {
    pub increase: i64,
    pub percent: i64,
}

impl SalaryDelta {
    pub fn from_strings(current: &str, target: &str) -> Self {
        let current = parse_salary(current);
        let increase = parse_salary(target) - current;
        let percent = if current > 0 {
            (increase as f64 / current as f64 * 100.0).round() as i64
        } else {
            0
        };
        Self { increase, percent }
    }
}

/// Reads every digit in the string as one integer ("R$ 8.000" is 8000).
pub fn parse_salary(value: &str) -> i64 {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

/// Brazilian thousands grouping: 12500 -> "12.500".
fn format_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    if value < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

/// Cuts to Notion's text limit, marking the cut with an ellipsis.
fn clip(text: &str) -> String {
    if text.chars().count() <= MAX_TEXT_CHARS {
        return text.to_string();
    }
    let head: String = text.chars().take(MAX_TEXT_CHARS - 3).collect();
    format!("{head}...")
}

/// One paragraph per line; a single long line is split into limit-sized chunks.
pub fn text_blocks(text: &str) -> Vec<Value> {
    let lines: Vec<&str> = text.split('\n').filter(|l| !l.is_empty()).collect();
    if lines.len() > 1 {
        return lines.into_iter().map(|l| paragraph(vec![rich(&clip(l))])).collect();
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= MAX_TEXT_CHARS {
        return vec![paragraph(vec![rich(text)])];
    }
    chars
        .chunks(MAX_TEXT_CHARS)
        .map(|chunk| paragraph(vec![rich(&chunk.iter().collect::<String>())]))
        .collect()
}

fn rich(content: &str) -> Value {
    json!({ "type": "text", "text": { "content": content } })
}

fn rich_bold(content: &str) -> Value {
    json!({ "type": "text", "text": { "content": content }, "annotations": { "bold": true } })
}

fn block(kind: &str, body: Value) -> Value {
    let mut block = Map::new();
    block.insert("object".to_string(), Value::from("block"));
    block.insert("type".to_string(), Value::from(kind));
    block.insert(kind.to_string(), body);
    Value::Object(block)
}

fn paragraph(parts: Vec<Value>) -> Value {
    block("paragraph", json!({ "rich_text": parts }))
}

fn blank_line() -> Value {
    paragraph(Vec::new())
}

fn heading(level: u8, text: &str) -> Value {
    block(&format!("heading_{level}"), json!({ "rich_text": [rich(text)] }))
}

fn callout(emoji: &str, color: &str, text: &str) -> Value {
    block(
        "callout",
        json!({ "icon": { "type": "emoji", "emoji": emoji }, "color": color, "rich_text": [rich(&clip(text))] }),
    )
}

fn divider() -> Value {
    block("divider", json!({}))
}

fn todo(text: &str) -> Value {
    block("to_do", json!({ "checked": false, "rich_text": [rich(&clip(text))] }))
}

fn list_item(kind: &str, parts: Vec<Value>) -> Value {
    block(kind, json!({ "rich_text": parts }))
}

fn toggle(title: Vec<Value>, children: Vec<Value>) -> Value {
    block("toggle", json!({ "rich_text": title, "children": children }))
}

fn table_row(cells: [&str; 3]) -> Value {
    let cells: Vec<Value> = cells.iter().map(|cell| json!([rich(cell)])).collect();
    block("table_row", json!({ "cells": cells }))
}

fn salary_panel(row: &PlanRow) -> Vec<Value> {
    let form = &row.form_data.0;
    let delta = SalaryDelta::from_strings(&form.current_salary, &form.target_salary);
    let or_dash = |value: &str| if value.is_empty() { "-".to_string() } else { value.to_string() };
    let increase = format!("+R${}", format_thousands(delta.increase));
    let percent = format!("+{}%", delta.percent);
    let current_role = or_dash(row.role_current.as_deref().unwrap_or_default());
    let target_role = or_dash(row.role_target.as_deref().unwrap_or_default());
    let current_salary = or_dash(&form.current_salary);
    let target_salary = or_dash(&form.target_salary);

    vec![
        block(
            "table",
            json!({
                "table_width": 3,
                "has_column_header": true,
                "has_row_header": false,
                "children": [
                    table_row(["", "Atual", "Objetivo"]),
                    table_row(["Cargo", &current_role, &target_role]),
                    table_row(["Salário", &current_salary, &target_salary]),
                    table_row(["Aumento", &percent, &increase]),
                ]
            }),
        ),
        blank_line(),
        callout(
            "🎯",
            "green_background",
            &format!(
                "Meta: sair de {current_salary} para {target_salary}, um aumento de {}% ({increase})",
                delta.percent
            ),
        ),
    ]
}

fn month_blocks(title: &str, month: &Month) -> Vec<Value> {
    let mut blocks = vec![heading(3, &format!("{title}: {}", month.focus))];
    for week in &month.weeks {
        let mut children: Vec<Value> = week.actions.iter().map(|action| todo(action)).collect();
        children.push(blank_line());
        children.push(callout(
            "🎯",
            "gray_background",
            &format!("Entregável: {}", week.deliverable),
        ));
        blocks.push(toggle(
            vec![
                rich_bold(&format!("Semana {}: ", week.week)),
                rich(&week.objective),
                rich(&format!(" ({})", week.estimated_time)),
            ],
            children,
        ));
    }
    blocks
}

/// The full page body, in display order.
pub fn plan_blocks(row: &PlanRow, plan: &GeneratedPlan) -> Vec<Value> {
    let transition = format!(
        "{} → {}",
        row.role_current.as_deref().unwrap_or("cargo atual"),
        row.role_target.as_deref().unwrap_or("cargo objetivo")
    );
    let mut blocks = vec![
        callout(
            "🚀",
            "purple_background",
            &format!(
                "Olá, {}! Este é seu plano personalizado de 90 dias para a transição {transition}. \
                 Siga as semanas na ordem e marque as tarefas conforme concluir.",
                row.name
            ),
        ),
        blank_line(),
        block("table_of_contents", json!({ "color": "default" })),
        blank_line(),
        heading(2, "💰 Meta Salarial"),
    ];
    blocks.extend(salary_panel(row));
    blocks.push(divider());

    blocks.push(heading(2, "📊 Resumo Executivo"));
    blocks.extend(text_blocks(&plan.executive_summary));
    blocks.push(divider());

    blocks.push(heading(2, "🎯 Gaps Prioritários"));
    for (i, gap) in plan.priority_gaps.iter().enumerate() {
        blocks.push(toggle(
            vec![rich_bold(&format!("{}. {}", i + 1, gap.gap))],
            vec![
                paragraph(vec![rich_bold("Impacto: "), rich(&clip(&gap.impact))]),
                paragraph(vec![rich_bold("Solução: "), rich(&clip(&gap.solution))]),
            ],
        ));
    }
    blocks.push(divider());

    blocks.push(heading(2, "📅 Plano de 90 Dias"));
    let months = plan.ninety_day_plan.months();
    for (title, month) in ["🔵 Mês 1", "🟡 Mês 2", "🟢 Mês 3"].iter().zip(months) {
        blocks.extend(month_blocks(title, month));
        blocks.push(blank_line());
    }
    blocks.push(divider());

    blocks.push(heading(2, "📚 Habilidades a Desenvolver"));
    for skill in &plan.skills_to_develop {
        let marker = match skill.priority {
            Priority::High => "🔴",
            Priority::Medium => "🟡",
            Priority::Low => "🟢",
        };
        let resources = skill
            .resources
            .iter()
            .map(|r| {
                list_item(
                    "bulleted_list_item",
                    vec![
                        rich_bold(&r.name),
                        rich(&format!(" ({}), buscar: \"{}\"", r.kind, r.link_busca)),
                    ],
                )
            })
            .collect();
        blocks.push(toggle(
            vec![rich_bold(&format!(
                "{marker} {}: prioridade {}",
                skill.skill,
                skill.priority.label()
            ))],
            resources,
        ));
    }
    blocks.push(divider());

    let strategy = &plan.promotion_strategy;
    blocks.push(heading(2, "💬 Estratégia de Promoção"));
    blocks.push(callout(
        "⏰",
        "blue_background",
        &format!("Momento ideal: {}", strategy.timing_ideal),
    ));
    if !strategy.arguments.is_empty() {
        blocks.push(heading(3, "Seus Argumentos"));
        blocks.extend(
            strategy
                .arguments
                .iter()
                .map(|arg| list_item("numbered_list_item", vec![rich(&clip(arg))])),
        );
    }
    blocks.push(heading(3, "Script da Conversa"));
    blocks.push(block(
        "quote",
        json!({ "rich_text": [rich(&clip(&strategy.conversation_script))] }),
    ));
    if !strategy.warnings.is_empty() {
        blocks.push(heading(3, "⚠️ O Que Evitar"));
        blocks.extend(
            strategy
                .warnings
                .iter()
                .map(|w| list_item("bulleted_list_item", vec![rich(&clip(w))])),
        );
    }
    blocks.push(divider());

    blocks.push(callout("💪", "green_background", &plan.motivational_message));
    blocks
}
