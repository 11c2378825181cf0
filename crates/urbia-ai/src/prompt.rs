//! Construção determinística de prompts.
//!
//! Cada tipo de insight/relatório tem um template Handlebars registrado uma
//! única vez; os dados chegam já formatados, então o mesmo contexto produz
//! sempre o mesmo texto — requisito para que a trilha de auditoria e o
//! cache por contexto façam sentido.

use chrono::{DateTime, Utc};
use handlebars::{handlebars_helper, no_escape, Handlebars};
use once_cell::sync::Lazy;
use serde_json::{json, Value};

use urbia_analytics::{variance_pct, AggregatedMetrics};
use urbia_core::domain::Category;
use urbia_core::error::EngineError;

const DATE_FORMAT: &str = "%d/%m/%Y %H:%M";

/// Instrução de papel, estável para todos os tipos de prompt.
const SYSTEM_PROMPT: &str = "Você é um assistente especializado em análise de dados \
    municipais. Sua função é analisar ocorrências urbanas registradas pelos cidadãos e \
    produzir análises claras, objetivas e acionáveis para gestores públicos. Sempre \
    responda em português brasileiro e baseie cada afirmação nos números fornecidos.";

const REPORT_TPL: &str = "\
Analise os dados de ocorrências urbanas abaixo e gere um relatório executivo completo e acionável.

DADOS DO PERÍODO {{periodStart}} até {{periodEnd}}:

- Total de ocorrências: {{totalCurrent}}
- Período anterior: {{totalPrior}} (variação: {{signed variancePct}}%)
- Gravidade média: {{severityMean}}
- Gravidade máxima: {{severityMax}}
- Gravidade mínima: {{severityMin}}

{{#if topAreas}}
ÁREAS MAIS CRÍTICAS:
{{#each topAreas}}
- {{area}}: {{total}} ocorrências, gravidade média {{meanSeverity}}, máxima {{maxSeverity}}
{{/each}}

{{/if}}
{{#if byCategory}}
CATEGORIAS MAIS FREQUENTES:
{{#each byCategory}}
- {{label}}: {{total}} ({{percent this.percent}})
{{/each}}

{{/if}}
{{#if busiestWeekday}}
PADRÕES TEMPORAIS:
- Dia da semana mais crítico: {{busiestWeekday}}
- Hora mais crítica: {{busiestHour}}h

{{/if}}
{{#if criticalAreas}}
ÁREAS COM ACÚMULO CRÍTICO:
{{#each criticalAreas}}
- {{area}}: {{criticalCount}} ocorrências críticas
{{/each}}

{{/if}}
INSTRUÇÕES:
1. Identifique os principais padrões e tendências nos dados
2. Explique o que os números indicam sobre a situação da cidade
3. Aponte áreas que exigem atenção imediata
4. Forneça 5-10 recomendações acionáveis priorizadas
5. Destaque insights não óbvios úteis para a gestão

FORMATO DE RESPOSTA (JSON estruturado):
{
  \"resumoExecutivo\": \"2-3 parágrafos resumindo a situação\",
  \"principaisAchados\": [\"descobertas principais\"],
  \"areasCriticas\": [
    {\"bairro\": \"nome\", \"tipoProblema\": \"tipo principal\", \"gravidadeMedia\": 8.5, \"totalOcorrencias\": 45, \"razao\": \"por que é crítica\"}
  ],
  \"tendencias\": {
    \"crescimento\": \"tendência de crescimento ou redução\",
    \"padroesTemporais\": \"padrões temporais identificados\",
    \"correlacoes\": \"correlações relevantes\"
  },
  \"recomendacoes\": [
    {\"prioridade\": \"alta|media|baixa\", \"acao\": \"ação recomendada\", \"justificativa\": \"por quê\", \"impactoEsperado\": \"impacto esperado\"}
  ],
  \"insights\": [\"insights não óbvios\"]
}

IMPORTANTE: responda APENAS com o JSON válido, sem texto antes ou depois.";

const CRITICAL_AREA_TPL: &str = "\
Analise por que a área {{area}} concentra ocorrências críticas.

DADOS:
- Total de ocorrências na área: {{areaTotal}}
- Gravidade média na área: {{areaMean}}
- Gravidade média da cidade: {{cityMean}}
- Categorias principais na área: {{join topCategories \", \"}}

Forneça:
1. Explicação clara e objetiva (2-3 parágrafos)
2. Principais fatores contribuintes
3. Comparação com a média da cidade
4. Urgência da situação (1-10)

Responda em formato JSON: {\"insight\": \"texto\", \"fatores\": [\"...\"], \"comparacao\": \"...\", \"urgencia\": 8, \"confianca\": 0.85, \"relevancia\": 8, \"recomendacoes\": [\"...\"]}";

const TREND_TPL: &str = "\
Analise a tendência de {{category}} no período especificado.

DADOS:
- Total no período atual: {{currentTotal}}
- Total no período anterior: {{priorTotal}}
- Variação: {{signed variancePct}}%

Forneça:
1. Descrição da tendência
2. Fatores que podem explicá-la
3. Projeção para os próximos períodos
4. Recomendações

Responda em formato JSON: {\"insight\": \"texto\", \"fatores\": [\"...\"], \"projecao\": \"...\", \"recomendacoes\": [\"...\"], \"confianca\": 0.85, \"relevancia\": 7}";

const PATTERN_TPL: &str = "\
Identifique padrões relevantes nos dados de ocorrências abaixo.

DADOS AGREGADOS:
- Total de ocorrências: {{totalCurrent}}
- Gravidade média: {{severityMean}}
{{#if busiestWeekday}}
- Dia da semana mais crítico: {{busiestWeekday}}
- Hora mais crítica: {{busiestHour}}h
{{/if}}
{{#if correlations}}
- Categoria dominante por área: {{join correlations \"; \"}}
{{/if}}

Forneça:
1. Padrões identificados
2. Explicação de cada padrão
3. Significância
4. Possíveis ações

Responda em formato JSON: {\"insight\": \"texto\", \"padroes\": [{\"nome\": \"...\", \"explicacao\": \"...\", \"significancia\": \"...\"}], \"acoes\": [\"...\"], \"confianca\": 0.80, \"relevancia\": 7}";

const PREDICTION_TPL: &str = "\
Com base nos dados históricos, preveja possíveis problemas futuros.

DADOS HISTÓRICOS:
- Total de ocorrências: {{totalCurrent}}
- Áreas críticas identificadas: {{criticalAreaCount}}
- Horizonte de predição: {{horizonDays}} dias
{{#if area}}
- Área de foco: {{area}}
{{/if}}

Forneça:
1. Áreas de risco identificadas
2. Tipos de problemas prováveis
3. Período estimado
4. Nível de confiança (0-1)
5. Ações preventivas recomendadas

Responda em formato JSON: {\"insight\": \"texto\", \"areasRisco\": [\"...\"], \"problemasProvaveis\": [\"...\"], \"periodoEstimado\": \"...\", \"confianca\": 0.75, \"relevancia\": 8, \"acoesPreventivas\": [\"...\"]}";

const EXPLANATION_TPL: &str = "\
Explique por que o fenômeno descrito está acontecendo no contexto abaixo.

CONTEXTO: {{context}}
{{#if question}}
PERGUNTA ESPECÍFICA: {{question}}
{{/if}}

Forneça:
1. Explicação clara
2. Causas prováveis
3. Contexto histórico
4. Fatores contribuintes

Responda em formato JSON: {\"insight\": \"texto\", \"causas\": [\"...\"], \"contextoHistorico\": \"...\", \"fatores\": [\"...\"], \"confianca\": 0.85, \"relevancia\": 7}";

const QUESTION_TPL: &str = "\
Responda à seguinte pergunta sobre ocorrências municipais:

PERGUNTA: {{question}}
{{#if context}}

CONTEXTO: {{context}}
{{/if}}
{{#if hasMetrics}}

DADOS DISPONÍVEIS:
- Total de ocorrências: {{totalCurrent}}
- Gravidade média: {{severityMean}}
{{/if}}

Forneça uma resposta clara, objetiva e baseada em dados.
Responda em formato JSON: {\"insight\": \"resposta completa\", \"confianca\": 0.85, \"relevancia\": 7}";

const CLASSIFICATION_TPL: &str = "\
Classifique a gravidade desta ocorrência urbana numa escala de 1 a 10, onde 1 é um \
transtorno mínimo e 10 é risco imediato à vida ou à infraestrutura.

Tipo: {{category}}
Área: {{area}}
Descrição: {{description}}

Responda APENAS com o número inteiro, sem texto adicional.";

handlebars_helper!(signed: |v: f64| if v >= 0.0 {
    format!("+{:.1}", v)
} else {
    format!("{:.1}", v)
});

handlebars_helper!(percent: |v: f64| format!("{:.1}%", v));

handlebars_helper!(join: |items: Json, sep: str| match items {
    Value::Array(values) => values
        .iter()
        .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
        .collect::<Vec<_>>()
        .join(sep),
    _ => String::new(),
});

static HANDLEBARS: Lazy<Handlebars<'static>> = Lazy::new(|| {
    let mut hb = Handlebars::new();
    hb.set_strict_mode(false);
    hb.register_escape_fn(no_escape);
    hb.register_helper("signed", Box::new(signed));
    hb.register_helper("percent", Box::new(percent));
    hb.register_helper("join", Box::new(join));

    let templates = [
        ("report", REPORT_TPL),
        ("critical_area", CRITICAL_AREA_TPL),
        ("trend", TREND_TPL),
        ("pattern", PATTERN_TPL),
        ("prediction", PREDICTION_TPL),
        ("explanation", EXPLANATION_TPL),
        ("question", QUESTION_TPL),
        ("classification", CLASSIFICATION_TPL),
    ];
    for (name, template) in templates {
        let _ = hb.register_template_string(name, template);
    }
    hb
});

fn render(name: &str, data: &Value) -> Result<String, EngineError> {
    HANDLEBARS
        .render(name, data)
        .map_err(|e| EngineError::Template(e.to_string()))
}

fn fmt_opt_f64(value: Option<f64>) -> String {
    value.map_or_else(|| "N/D".to_string(), |v| format!("{:.1}", v))
}

fn fmt_opt_u8(value: Option<u8>) -> String {
    value.map_or_else(|| "N/D".to_string(), |v| v.to_string())
}

/// Conjunto puro de construtores de prompt.
pub struct PromptBuilder;

impl PromptBuilder {
    /// Instrução de sistema comum a todas as chamadas.
    pub fn system_prompt() -> &'static str {
        SYSTEM_PROMPT
    }

    /// Prompt do relatório executivo de um período.
    pub fn report(
        metrics: &AggregatedMetrics,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<String, EngineError> {
        let top_areas: Vec<Value> = metrics
            .top_areas
            .iter()
            .take(5)
            .map(|a| {
                json!({
                    "area": a.area,
                    "total": a.total,
                    "meanSeverity": format!("{:.1}", a.mean_severity),
                    "maxSeverity": a.max_severity,
                })
            })
            .collect();
        let by_category: Vec<Value> = metrics
            .by_category
            .iter()
            .take(5)
            .map(|s| json!({"label": s.label, "total": s.total, "percent": s.percent}))
            .collect();
        let critical_areas: Vec<Value> = metrics
            .critical_areas
            .iter()
            .take(5)
            .map(|c| json!({"area": c.area, "criticalCount": c.critical_count}))
            .collect();

        render(
            "report",
            &json!({
                "periodStart": period_start.format(DATE_FORMAT).to_string(),
                "periodEnd": period_end.format(DATE_FORMAT).to_string(),
                "totalCurrent": metrics.total_current,
                "totalPrior": metrics.total_prior,
                "variancePct": metrics.variance_pct,
                "severityMean": fmt_opt_f64(metrics.severity_mean),
                "severityMax": fmt_opt_u8(metrics.severity_max),
                "severityMin": fmt_opt_u8(metrics.severity_min),
                "topAreas": top_areas,
                "byCategory": by_category,
                "busiestWeekday": metrics.temporal.busiest_weekday,
                "busiestHour": metrics.temporal.busiest_hour,
                "criticalAreas": critical_areas,
            }),
        )
    }

    /// Prompt de insight de área crítica, comparando a área com a cidade.
    pub fn critical_area(
        area: &str,
        area_total: u64,
        area_mean: Option<f64>,
        city_mean: Option<f64>,
        top_categories: &[(Category, u64)],
    ) -> Result<String, EngineError> {
        let categories: Vec<String> = top_categories
            .iter()
            .take(3)
            .map(|(category, count)| format!("{} ({})", category.label(), count))
            .collect();

        render(
            "critical_area",
            &json!({
                "area": area,
                "areaTotal": area_total,
                "areaMean": fmt_opt_f64(area_mean),
                "cityMean": fmt_opt_f64(city_mean),
                "topCategories": categories,
            }),
        )
    }

    /// Prompt de tendência de uma categoria (ou de todas).
    pub fn trend(
        category: Option<Category>,
        current_total: u64,
        prior_total: u64,
    ) -> Result<String, EngineError> {
        render(
            "trend",
            &json!({
                "category": category.map_or("todas as categorias", |c| c.label()),
                "currentTotal": current_total,
                "priorTotal": prior_total,
                "variancePct": variance_pct(prior_total, current_total),
            }),
        )
    }

    /// Prompt de detecção de padrões sobre métricas agregadas.
    pub fn pattern(metrics: &AggregatedMetrics) -> Result<String, EngineError> {
        let correlations: Vec<String> = metrics
            .correlations
            .dominant_category_by_area
            .iter()
            .map(|(area, category)| format!("{}: {}", area, category.label()))
            .collect();

        render(
            "pattern",
            &json!({
                "totalCurrent": metrics.total_current,
                "severityMean": fmt_opt_f64(metrics.severity_mean),
                "busiestWeekday": metrics.temporal.busiest_weekday,
                "busiestHour": metrics.temporal.busiest_hour,
                "correlations": correlations,
            }),
        )
    }

    /// Prompt preditivo sobre o histórico agregado.
    pub fn prediction(
        metrics: &AggregatedMetrics,
        horizon_days: u32,
        area: Option<&str>,
    ) -> Result<String, EngineError> {
        render(
            "prediction",
            &json!({
                "totalCurrent": metrics.total_current,
                "criticalAreaCount": metrics.critical_areas.len(),
                "horizonDays": horizon_days,
                "area": area,
            }),
        )
    }

    /// Prompt explicativo sobre um contexto arbitrário.
    pub fn explanation(context: &Value, question: Option<&str>) -> Result<String, EngineError> {
        let context_text =
            serde_json::to_string(context).map_err(|e| EngineError::Template(e.to_string()))?;
        render(
            "explanation",
            &json!({"context": context_text, "question": question}),
        )
    }

    /// Prompt de pergunta livre, com métricas quando disponíveis.
    pub fn question(
        question: &str,
        context: Option<&Value>,
        metrics: Option<&AggregatedMetrics>,
    ) -> Result<String, EngineError> {
        let context_text = context
            .map(|c| serde_json::to_string(c).map_err(|e| EngineError::Template(e.to_string())))
            .transpose()?;

        render(
            "question",
            &json!({
                "question": question,
                "context": context_text,
                "hasMetrics": metrics.is_some(),
                "totalCurrent": metrics.map(|m| m.total_current),
                "severityMean": metrics.map(|m| fmt_opt_f64(m.severity_mean)),
            }),
        )
    }

    /// Prompt curto de classificação de gravidade de uma ocorrência.
    pub fn classification(
        description: Option<&str>,
        category: Category,
        area: &str,
    ) -> Result<String, EngineError> {
        let description = match description.map(str::trim) {
            Some(text) if !text.is_empty() => text,
            _ => "Sem descrição",
        };
        render(
            "classification",
            &json!({
                "category": category.label(),
                "area": area,
                "description": description,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeMap;
    use urbia_analytics::{Correlations, TemporalPatterns};

    fn sample_metrics() -> AggregatedMetrics {
        AggregatedMetrics {
            total_current: 42,
            total_prior: 28,
            variance_pct: 50.0,
            severity_mean: Some(6.3),
            severity_max: Some(9),
            severity_min: Some(2),
            top_areas: vec![urbia_analytics::AreaBreakdown {
                area: "Centro".into(),
                total: 20,
                mean_severity: 7.5,
                max_severity: 9,
            }],
            by_category: vec![urbia_analytics::DistributionSlice {
                label: "POTHOLE".into(),
                total: 30,
                percent: 71.4,
            }],
            by_area: Vec::new(),
            severity_histogram: BTreeMap::new(),
            temporal: TemporalPatterns {
                by_weekday: vec![0; 7],
                by_hour: vec![0; 24],
                busiest_weekday: Some("MONDAY".into()),
                busiest_hour: Some(18),
            },
            correlations: Correlations {
                dominant_category_by_area: BTreeMap::from([(
                    "Centro".to_string(),
                    Category::Pothole,
                )]),
                most_affected_area_by_category: BTreeMap::new(),
            },
            critical_areas: Vec::new(),
        }
    }

    #[test]
    fn test_report_prompt_embeds_metrics() {
        let start = Utc::now() - chrono::Duration::days(7);
        let end = Utc::now();
        let prompt = PromptBuilder::report(&sample_metrics(), start, end).unwrap();

        assert!(prompt.contains("Total de ocorrências: 42"));
        assert!(prompt.contains("variação: +50.0%"));
        assert!(prompt.contains("Centro: 20 ocorrências, gravidade média 7.5, máxima 9"));
        assert!(prompt.contains("POTHOLE: 30 (71.4%)"));
        assert!(prompt.contains("Dia da semana mais crítico: MONDAY"));
        assert!(prompt.contains("resumoExecutivo"));
        assert!(prompt.contains("APENAS com o JSON"));
    }

    #[test]
    fn test_same_context_same_prompt() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 31, 23, 59, 0).unwrap();
        let a = PromptBuilder::report(&sample_metrics(), start, end).unwrap();
        let b = PromptBuilder::report(&sample_metrics(), start, end).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_distinct_contexts_distinct_prompts() {
        let mut other = sample_metrics();
        other.total_current = 43;
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 31, 23, 59, 0).unwrap();

        let a = PromptBuilder::report(&sample_metrics(), start, end).unwrap();
        let b = PromptBuilder::report(&other, start, end).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_critical_area_prompt() {
        let prompt = PromptBuilder::critical_area(
            "Centro",
            12,
            Some(8.2),
            Some(5.1),
            &[(Category::Flooding, 7), (Category::Sewage, 3)],
        )
        .unwrap();

        assert!(prompt.contains("área Centro"));
        assert!(prompt.contains("Gravidade média na área: 8.2"));
        assert!(prompt.contains("Alagamento (7), Problema de esgoto (3)"));
        assert!(prompt.contains("\"confianca\""));
    }

    #[test]
    fn test_trend_prompt_with_and_without_category() {
        let with = PromptBuilder::trend(Some(Category::Pothole), 15, 10).unwrap();
        assert!(with.contains("Buraco na via"));
        assert!(with.contains("Variação: +50.0%"));

        let without = PromptBuilder::trend(None, 5, 0).unwrap();
        assert!(without.contains("todas as categorias"));
        assert!(without.contains("Variação: +100.0%"));
    }

    #[test]
    fn test_prediction_prompt_optional_area() {
        let with = PromptBuilder::prediction(&sample_metrics(), 30, Some("Norte")).unwrap();
        assert!(with.contains("Área de foco: Norte"));
        assert!(with.contains("Horizonte de predição: 30 dias"));

        let without = PromptBuilder::prediction(&sample_metrics(), 30, None).unwrap();
        assert!(!without.contains("Área de foco"));
    }

    #[test]
    fn test_explanation_prompt_is_order_independent_via_sorted_json() {
        let context = serde_json::json!({"bairro": "Centro", "ano": 2024});
        let prompt = PromptBuilder::explanation(&context, Some("por quê?")).unwrap();
        // serde_json ordena chaves de objeto; o texto é estável.
        assert!(prompt.contains("{\"ano\":2024,\"bairro\":\"Centro\"}"));
        assert!(prompt.contains("PERGUNTA ESPECÍFICA: por quê?"));
    }

    #[test]
    fn test_classification_prompt_defaults_description() {
        let prompt =
            PromptBuilder::classification(None, Category::FallenTree, "Garcia").unwrap();
        assert!(prompt.contains("Árvore caída"));
        assert!(prompt.contains("Descrição: Sem descrição"));
        assert!(prompt.contains("APENAS com o número"));
    }
}
