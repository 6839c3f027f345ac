//! On-demand PDF export of a generated plan.
//!
//! The document is first described as a flat list of [`PdfBlock`]s (pure,
//! testable) and then laid out with `genpdf` on a blocking thread.

use genpdf::{elements, style, Element};
use tracing::debug;

use crate::delivery::DeliveryError;
use crate::models::generated::GeneratedPlan;
use crate::models::plan::PlanRow;

#[derive(Debug, Clone, PartialEq)]
pub enum PdfBlock {
    Title(String),
    Subtitle(String),
    Heading(String),
    Subheading(String),
    Text(String),
    Bullets(Vec<String>),
    Spacer,
}

/// Describes the whole document for a generated plan.
pub fn plan_outline(row: &PlanRow, plan: &GeneratedPlan) -> Vec<PdfBlock> {
    let mut blocks = vec![
        PdfBlock::Title("Plano de Carreira de 90 dias".to_string()),
        PdfBlock::Subtitle(row.name.clone()),
    ];
    if let (Some(current), Some(target)) = (&row.role_current, &row.role_target) {
        blocks.push(PdfBlock::Text(format!("{current} → {target}")));
    }
    blocks.push(PdfBlock::Spacer);

    blocks.push(PdfBlock::Heading("01  Resumo executivo".to_string()));
    blocks.extend(
        plan.executive_summary
            .split('\n')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| PdfBlock::Text(p.to_string())),
    );

    blocks.push(PdfBlock::Heading("02  Gaps prioritários".to_string()));
    for (i, gap) in plan.priority_gaps.iter().enumerate() {
        blocks.push(PdfBlock::Subheading(format!("{:02}  {}", i + 1, gap.gap)));
        blocks.push(PdfBlock::Text(format!("Impacto: {}", gap.impact)));
        blocks.push(PdfBlock::Text(format!("Solução: {}", gap.solution)));
    }

    blocks.push(PdfBlock::Heading("03  Plano de 90 dias".to_string()));
    for (i, month) in plan.ninety_day_plan.months().iter().enumerate() {
        blocks.push(PdfBlock::Subheading(format!("Mês {:02}: {}", i + 1, month.focus)));
        for week in &month.weeks {
            blocks.push(PdfBlock::Text(format!(
                "Semana {:02} ({}): {}",
                week.week, week.estimated_time, week.objective
            )));
            if !week.actions.is_empty() {
                blocks.push(PdfBlock::Bullets(week.actions.clone()));
            }
            blocks.push(PdfBlock::Text(format!("Entregável: {}", week.deliverable)));
        }
    }

    blocks.push(PdfBlock::Heading("04  Habilidades a desenvolver".to_string()));
    for skill in &plan.skills_to_develop {
        blocks.push(PdfBlock::Subheading(format!(
            "{} (prioridade {})",
            skill.skill,
            skill.priority.label()
        )));
        if !skill.resources.is_empty() {
            blocks.push(PdfBlock::Bullets(
                skill
                    .resources
                    .iter()
                    .map(|r| format!("{}: {} (buscar: {})", r.kind, r.name, r.link_busca))
                    .collect(),
            ));
        }
    }

    let strategy = &plan.promotion_strategy;
    blocks.push(PdfBlock::Heading("05  Estratégia de promoção".to_string()));
    blocks.push(PdfBlock::Text(format!("Momento ideal: {}", strategy.timing_ideal)));
    blocks.push(PdfBlock::Subheading("Argumentos".to_string()));
    blocks.push(PdfBlock::Bullets(strategy.arguments.clone()));
    blocks.push(PdfBlock::Subheading("Roteiro da conversa".to_string()));
    blocks.push(PdfBlock::Text(strategy.conversation_script.clone()));
    if !strategy.warnings.is_empty() {
        blocks.push(PdfBlock::Subheading("Alertas".to_string()));
        blocks.push(PdfBlock::Bullets(strategy.warnings.clone()));
    }

    blocks.push(PdfBlock::Spacer);
    blocks.push(PdfBlock::Heading("Mensagem final".to_string()));
    blocks.push(PdfBlock::Text(plan.motivational_message.clone()));

    blocks
}

/// Lays out plan PDFs with a TrueType family loaded from disk.
#[derive(Debug, Clone)]
pub struct PdfRenderer {
    fonts_dir: String,
    font_family: String,
}

impl PdfRenderer {
    pub fn new(fonts_dir: String, font_family: String) -> Self {
        Self {
            fonts_dir,
            font_family,
        }
    }

    /// Renders a generated plan. Layout is CPU-bound, so it runs off the async workers.
    pub async fn render(&self, row: &PlanRow, plan: &GeneratedPlan) -> Result<Vec<u8>, DeliveryError> {
        let blocks = plan_outline(row, plan);
        let title = format!("Plano de Carreira - {}", row.first_name());
        let renderer = self.clone();

        tokio::task::spawn_blocking(move || renderer.render_blocks(&title, &blocks))
            .await
            .map_err(|e| DeliveryError::Pdf(e.to_string()))?
    }

    fn render_blocks(&self, title: &str, blocks: &[PdfBlock]) -> Result<Vec<u8>, DeliveryError> {
        let font_family = genpdf::fonts::from_files(&self.fonts_dir, &self.font_family, None)
            .map_err(|e| {
                DeliveryError::Pdf(format!(
                    "font family '{}' not found in {}: {e}",
                    self.font_family, self.fonts_dir
                ))
            })?;

        let mut doc = genpdf::Document::new(font_family);
        doc.set_title(title);
        let mut decorator = genpdf::SimplePageDecorator::new();
        decorator.set_margins(15);
        doc.set_page_decorator(decorator);

        for block in blocks {
            match block {
                PdfBlock::Title(text) => doc.push(
                    elements::Paragraph::new(text.as_str())
                        .styled(style::Style::new().bold().with_font_size(20)),
                ),
                PdfBlock::Subtitle(text) => doc.push(
                    elements::Paragraph::new(text.as_str())
                        .styled(style::Style::new().with_font_size(14)),
                ),
                PdfBlock::Heading(text) => {
                    doc.push(elements::Break::new(1.5));
                    doc.push(
                        elements::Paragraph::new(text.as_str())
                            .styled(style::Style::new().bold().with_font_size(15)),
                    );
                    doc.push(elements::Break::new(0.5));
                }
                PdfBlock::Subheading(text) => {
                    doc.push(elements::Break::new(0.5));
                    doc.push(
                        elements::Paragraph::new(text.as_str())
                            .styled(style::Style::new().bold().with_font_size(11)),
                    );
                }
                PdfBlock::Text(text) => doc.push(
                    elements::Paragraph::new(text.as_str())
                        .styled(style::Style::new().with_font_size(10)),
                ),
                PdfBlock::Bullets(items) => {
                    let mut list = elements::UnorderedList::new();
                    for item in items {
                        list.push(
                            elements::Paragraph::new(item.as_str())
                                .styled(style::Style::new().with_font_size(10)),
                        );
                    }
                    doc.push(list);
                }
                PdfBlock::Spacer => doc.push(elements::Break::new(1)),
            }
        }

        let mut buffer = Vec::new();
        doc.render(&mut buffer)
            .map_err(|e| DeliveryError::Pdf(e.to_string()))?;

        debug!(bytes = buffer.len(), "Plan PDF rendered");
        Ok(buffer)
    }
}
