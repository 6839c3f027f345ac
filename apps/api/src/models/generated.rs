use serde::{Deserialize, Serialize};

// Wire schema of the generated career plan. Keys are fixed by the prompt
// contract and stored verbatim in `plans.generated_plan`.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedPlan {
    #[serde(rename = "resumo_executivo")]
    pub executive_summary: String,
    #[serde(rename = "gaps_prioritarios")]
    pub priority_gaps: Vec<PriorityGap>,
    #[serde(rename = "plano_90_dias")]
    pub ninety_day_plan: NinetyDayPlan,
    #[serde(rename = "habilidades_desenvolver")]
    pub skills_to_develop: Vec<SkillToDevelop>,
    #[serde(rename = "estrategia_promocao")]
    pub promotion_strategy: PromotionStrategy,
    #[serde(rename = "mensagem_motivacional")]
    pub motivational_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityGap {
    pub gap: String,
    #[serde(rename = "impacto")]
    pub impact: String,
    #[serde(rename = "solucao")]
    pub solution: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NinetyDayPlan {
    #[serde(rename = "mes1")]
    pub month1: Month,
    #[serde(rename = "mes2")]
    pub month2: Month,
    #[serde(rename = "mes3")]
    pub month3: Month,
}

impl NinetyDayPlan {
    pub fn months(&self) -> [&Month; 3] {
        [&self.month1, &self.month2, &self.month3]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Month {
    #[serde(rename = "foco")]
    pub focus: String,
    #[serde(rename = "semanas")]
    pub weeks: Vec<Week>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Week {
    #[serde(rename = "semana")]
    pub week: u32,
    #[serde(rename = "objetivo")]
    pub objective: String,
    #[serde(rename = "acoes")]
    pub actions: Vec<String>,
    #[serde(rename = "entregavel")]
    pub deliverable: String,
    #[serde(rename = "tempo_estimado")]
    pub estimated_time: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    #[serde(rename = "alta")]
    High,
    #[serde(rename = "media")]
    Medium,
    #[serde(rename = "baixa")]
    Low,
}

impl Priority {
    pub fn label(&self) -> &'static str {
        match self {
            Priority::High => "alta",
            Priority::Medium => "média",
            Priority::Low => "baixa",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillToDevelop {
    #[serde(rename = "habilidade")]
    pub skill: String,
    #[serde(rename = "prioridade")]
    pub priority: Priority,
    #[serde(rename = "recursos")]
    pub resources: Vec<Resource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "tipo")]
    pub kind: String,
    #[serde(rename = "nome")]
    pub name: String,
    /// A search query, not a URL.
    pub link_busca: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionStrategy {
    pub timing_ideal: String,
    #[serde(rename = "argumentos")]
    pub arguments: Vec<String>,
    #[serde(rename = "script_conversa")]
    pub conversation_script: String,
    #[serde(rename = "alertas")]
    pub warnings: Vec<String>,
}
