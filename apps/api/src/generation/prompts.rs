// All LLM prompt constants for plan generation.
// Reuses cross-cutting fragments from llm_client::prompts.

/// System prompt for plan generation: persona plus JSON-only output.
pub const PLAN_SYSTEM: &str = "Você é um coach de carreira sênior, com 15 anos de experiência \
    no mercado de trabalho brasileiro, que escreve planos de desenvolvimento práticos e honestos. \
    You MUST respond with valid JSON only: a single JSON object. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

/// Plan generation prompt template.
/// Replace: {untrusted_instruction}, {current_role}, {target_role}, {timeframe},
///          {area}, {current_salary}, {experience_time}, {target_salary},
///          {motivation}, {skills}, {gaps}, {interview_history},
///          {weekly_availability}, {learning_preferences}, {additional_context}
pub const PLAN_PROMPT_TEMPLATE: &str = r#"Monte um Plano de Carreira de 90 dias personalizado a partir dos dados do usuário abaixo.

{untrusted_instruction}

CHECAGEM DE REALISMO: avalie se a transição de "{current_role}" para "{target_role}" no prazo "{timeframe}" é realista. Se não for, diga isso com honestidade no resumo_executivo e proponha cargos intermediários como degraus.

<dados_usuario>
SITUAÇÃO ATUAL:
- Cargo atual: {current_role}
- Área: {area}
- Salário atual: {current_salary}
- Tempo de experiência: {experience_time}

OBJETIVO:
- Cargo desejado: {target_role}
- Salário desejado: {target_salary}
- Prazo: {timeframe}
- Motivação: {motivation}

HABILIDADES E GAPS:
- Habilidades: {skills}
- Gaps: {gaps}
- Experiência com entrevistas: {interview_history}
- Tempo disponível por semana: {weekly_availability}

PREFERÊNCIAS DE APRENDIZADO: {learning_preferences}
CONTEXTO ADICIONAL: {additional_context}
</dados_usuario>

Responda APENAS com um objeto JSON válido, sem texto antes ou depois e sem blocos de código markdown.
O JSON deve seguir EXATAMENTE esta estrutura:
{
  "resumo_executivo": "3 parágrafos: perfil, objetivo e viabilidade",
  "gaps_prioritarios": [
    {"gap": "nome do gap", "impacto": "por que trava o crescimento", "solucao": "como resolver"}
  ],
  "plano_90_dias": {
    "mes1": {
      "foco": "tema do mês",
      "semanas": [
        {
          "semana": 1,
          "objetivo": "objetivo da semana",
          "acoes": ["ação 1", "ação 2", "ação 3"],
          "entregavel": "o que deve estar pronto ao final da semana",
          "tempo_estimado": "Xh"
        }
      ]
    },
    "mes2": { "foco": "...", "semanas": [ ... ] },
    "mes3": { "foco": "...", "semanas": [ ... ] }
  },
  "habilidades_desenvolver": [
    {
      "habilidade": "nome",
      "prioridade": "alta",
      "recursos": [{"tipo": "curso", "nome": "nome do recurso", "link_busca": "termo para buscar no Google"}]
    }
  ],
  "estrategia_promocao": {
    "timing_ideal": "quando abordar a liderança",
    "argumentos": ["argumento 1", "argumento 2"],
    "script_conversa": "roteiro da conversa",
    "alertas": ["o que evitar"]
  },
  "mensagem_motivacional": "mensagem final personalizada"
}

REGRAS:
1. Cada mês tem 4 semanas, numeradas de 1 a 12 ao longo do plano
2. "prioridade" é sempre "alta", "media" ou "baixa"
3. Ajuste a carga semanal ao tempo disponível informado"#;

/// Repair prompt sent once when the first reply is not valid JSON.
/// Replace: {malformed}
pub const REPAIR_PROMPT_TEMPLATE: &str = r#"O JSON abaixo está malformado ou incompleto. Corrija-o e devolva APENAS o JSON válido, com a mesma estrutura, sem markdown e sem comentários.

{malformed}"#;
