//! Serviço de insights: contexto → hash → cache → IA → cache → auditoria.
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Duration as Span, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use urbia_ai::{generate_with_retry, parse_insight, PromptBuilder, TextGenerator};
use urbia_analytics::{mean, Aggregator, RecordFilter};
use urbia_core::artifacts::{AuditSummary, InsightCacheEntry};
use urbia_core::config::EngineConfig;
use urbia_core::domain::{AnalysisKind, Category, IncidentRecord, InsightKind};
use urbia_core::error::EngineError;
use urbia_core::store::{AuditStore, IncidentStore, InsightStore};

use crate::audit::Auditor;
use crate::cache::InsightCache;
use crate::context::InsightContext;

/// Resposta de insight devolvida ao chamador, vinda do cache ou recém
/// gerada.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightResponse {
    pub id: Uuid,
    pub kind: InsightKind,
    pub insight: String,
    pub confidence: f64,
    pub relevance: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub support_data: Option<Value>,
    pub recommendations: Vec<String>,
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub from_cache: bool,
}

impl InsightResponse {
    fn from_entry(entry: InsightCacheEntry, from_cache: bool) -> Self {
        let recommendations = entry
            .support_data
            .as_ref()
            .and_then(|data| data.get("recomendacoes"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            id: entry.id,
            kind: entry.kind,
            insight: entry.insight_text,
            confidence: entry.confidence,
            relevance: entry.relevance,
            support_data: entry.support_data,
            recommendations,
            generated_at: entry.generated_at,
            model: entry.model,
            from_cache,
        }
    }
}

/// Orquestrador de insights.
pub struct InsightService {
    incidents: Arc<dyn IncidentStore>,
    aggregator: Aggregator,
    cache: InsightCache,
    auditor: Auditor,
    generator: Arc<dyn TextGenerator>,
    config: EngineConfig,
}

fn default_period() -> (DateTime<Utc>, DateTime<Utc>) {
    let now = Utc::now();
    (now - Span::days(30), now)
}

impl InsightService {
    pub fn new(
        incidents: Arc<dyn IncidentStore>,
        insights: Arc<dyn InsightStore>,
        audits: Arc<dyn AuditStore>,
        generator: Arc<dyn TextGenerator>,
        config: EngineConfig,
    ) -> Self {
        Self {
            aggregator: Aggregator::new(incidents.clone(), &config),
            cache: InsightCache::new(insights, &config),
            auditor: Auditor::new(audits),
            incidents,
            generator,
            config,
        }
    }

    /// Insight de área crítica: por que esta área concentra problemas.
    pub async fn critical_area_insight(
        &self,
        area: &str,
        category: Option<Category>,
        period: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<InsightResponse, EngineError> {
        info!(area, "gerando insight de área crítica");

        let mut context = InsightContext::new(InsightKind::CriticalArea).with("bairro", area);
        if let Some(category) = category {
            context = context.with("tipoProblema", category.as_str());
        }
        context = with_period(context, period);

        let digest = context.digest();
        if let Some(entry) = self.cache.lookup(&digest).await? {
            return Ok(InsightResponse::from_entry(entry, true));
        }

        let (start, end) = period.unwrap_or_else(default_period);
        let all = self.incidents.find_by_period(start, end).await?;
        let area_records: Vec<&IncidentRecord> = all
            .iter()
            .filter(|r| r.area.eq_ignore_ascii_case(area))
            .filter(|r| category.is_none_or(|c| r.category == c))
            .collect();

        let area_severities: Vec<u8> = area_records.iter().map(|r| r.severity).collect();
        let city_severities: Vec<u8> = all.iter().map(|r| r.severity).collect();
        let top_categories = count_categories(&area_records);

        let prompt = PromptBuilder::critical_area(
            area,
            area_records.len() as u64,
            mean(&area_severities),
            mean(&city_severities),
            &top_categories,
        )?;

        self.generate_and_cache(&context, &digest, &prompt).await
    }

    /// Insight de tendência de uma categoria (ou de todas), comparando com
    /// o período anterior de mesma duração.
    pub async fn trend_insight(
        &self,
        category: Option<Category>,
        period: Option<(DateTime<Utc>, DateTime<Utc>)>,
        area: Option<&str>,
    ) -> Result<InsightResponse, EngineError> {
        info!(?category, "gerando insight de tendência");

        let mut context = InsightContext::new(InsightKind::Trend);
        if let Some(category) = category {
            context = context.with("tipoProblema", category.as_str());
        }
        if let Some(area) = area {
            context = context.with("bairro", area);
        }
        context = with_period(context, period);

        let digest = context.digest();
        if let Some(entry) = self.cache.lookup(&digest).await? {
            return Ok(InsightResponse::from_entry(entry, true));
        }

        let (start, end) = period.unwrap_or_else(default_period);
        let span = end - start;
        let current = self.fetch_matching(start, end, category, area).await?;
        let prior = self
            .fetch_matching(start - span, start, category, area)
            .await?;

        let prompt =
            PromptBuilder::trend(category, current.len() as u64, prior.len() as u64)?;

        self.generate_and_cache(&context, &digest, &prompt).await
    }

    /// Insight de padrões sobre uma janela de três meses.
    pub async fn pattern_insight(
        &self,
        filter: RecordFilter,
    ) -> Result<InsightResponse, EngineError> {
        info!("gerando insight de padrões");

        let mut context = InsightContext::new(InsightKind::Pattern);
        if !filter.is_empty() {
            let filters = serde_json::to_value(&filter)
                .map_err(|e| EngineError::Store(e.to_string()))?;
            context = context.with("filtros", filters);
        }

        let digest = context.digest();
        if let Some(entry) = self.cache.lookup(&digest).await? {
            return Ok(InsightResponse::from_entry(entry, true));
        }

        let now = Utc::now();
        let metrics = self
            .aggregator
            .aggregate(now - Span::days(90), now, &filter)
            .await?;
        let prompt = PromptBuilder::pattern(&metrics)?;

        self.generate_and_cache(&context, &digest, &prompt).await
    }

    /// Insight preditivo sobre seis meses de histórico.
    pub async fn prediction_insight(
        &self,
        horizon_days: u32,
        area: Option<&str>,
    ) -> Result<InsightResponse, EngineError> {
        info!(horizon_days, ?area, "gerando insight preditivo");

        let mut context = InsightContext::new(InsightKind::Prediction)
            .with("horizonte", i64::from(horizon_days));
        if let Some(area) = area {
            context = context.with("area", area);
        }

        let digest = context.digest();
        if let Some(entry) = self.cache.lookup(&digest).await? {
            return Ok(InsightResponse::from_entry(entry, true));
        }

        let now = Utc::now();
        let metrics = self
            .aggregator
            .aggregate(now - Span::days(180), now, &RecordFilter::new())
            .await?;
        let prompt = PromptBuilder::prediction(&metrics, horizon_days, area)?;

        self.generate_and_cache(&context, &digest, &prompt).await
    }

    /// Insight explicativo sobre um contexto arbitrário, sem agregação.
    pub async fn explanation_insight(
        &self,
        context_fields: &Value,
        question: Option<&str>,
    ) -> Result<InsightResponse, EngineError> {
        info!("gerando insight explicativo");

        let mut context =
            InsightContext::new(InsightKind::Explanation).merge_object(context_fields);
        if let Some(question) = question {
            context = context.with("pergunta", question);
        }

        let digest = context.digest();
        if let Some(entry) = self.cache.lookup(&digest).await? {
            return Ok(InsightResponse::from_entry(entry, true));
        }

        let prompt = PromptBuilder::explanation(context_fields, question)?;
        self.generate_and_cache(&context, &digest, &prompt).await
    }

    /// Pergunta livre sobre as ocorrências; agrega o último mês quando o
    /// contexto menciona área ou categoria.
    pub async fn answer_question(
        &self,
        question: &str,
        context_fields: Option<&Value>,
    ) -> Result<InsightResponse, EngineError> {
        info!(question, "respondendo pergunta livre");

        let mut context = InsightContext::new(InsightKind::Explanation).with("pergunta", question);
        if let Some(fields) = context_fields {
            context = context.merge_object(fields);
        }

        let digest = context.digest();
        if let Some(entry) = self.cache.lookup(&digest).await? {
            return Ok(InsightResponse::from_entry(entry, true));
        }

        let filter = context_fields.map(filter_from_context).unwrap_or_default();
        let metrics = if filter.is_empty() {
            None
        } else {
            let (start, end) = default_period();
            Some(self.aggregator.aggregate(start, end, &filter).await?)
        };

        let prompt = PromptBuilder::question(question, context_fields, metrics.as_ref())?;
        self.generate_and_cache(&context, &digest, &prompt).await
    }

    /// Classifica a gravidade de uma ocorrência descrita em texto livre.
    /// Sem cache; cada tentativa é auditada como CLASSIFICATION.
    pub async fn classify_severity(
        &self,
        description: Option<&str>,
        category: Category,
        area: &str,
    ) -> Result<u8, EngineError> {
        let prompt = PromptBuilder::classification(description, category, area)?;
        let input = json!({
            "tipoProblema": category.as_str(),
            "bairro": area,
            "descricao": description,
        });

        let started = Instant::now();
        let result = self.call_generator(&prompt).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result.and_then(|raw| {
            urbia_ai::extract_severity(&raw).map(|severity| (raw, severity))
        }) {
            Ok((raw, severity)) => {
                self.auditor
                    .record_success(
                        AnalysisKind::Classification,
                        input,
                        &raw,
                        &prompt,
                        self.generator.model_id(),
                        latency_ms,
                    )
                    .await;
                Ok(severity)
            }
            Err(err) => {
                self.auditor
                    .record_failure(
                        AnalysisKind::Classification,
                        input,
                        Some(&prompt),
                        self.generator.model_id(),
                        latency_ms,
                        &err.to_string(),
                    )
                    .await;
                Err(err)
            }
        }
    }

    /// Varredura de entradas expiradas do cache.
    pub async fn sweep_expired_cache(&self) -> Result<usize, EngineError> {
        self.cache.sweep_expired().await
    }

    /// Invalida insights de uma área cujos dados mudaram.
    pub async fn invalidate_area(&self, area: &str) -> Result<usize, EngineError> {
        self.cache.invalidate_area(area).await
    }

    /// Sumário da trilha de auditoria numa janela.
    pub async fn audit_summary(
        &self,
        kind: Option<AnalysisKind>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<AuditSummary, EngineError> {
        self.auditor.summary(kind, from, to).await
    }

    /// Miolo comum do caminho de miss: chama a IA, parseia (sempre obtém
    /// uma estrutura), grava no cache e audita a tentativa.
    async fn generate_and_cache(
        &self,
        context: &InsightContext,
        digest: &str,
        prompt: &str,
    ) -> Result<InsightResponse, EngineError> {
        let kind = context.kind();
        let audit_input = json!({
            "tipoInsight": kind.as_str(),
            "contexto": context.canonical(),
        });

        let started = Instant::now();
        let result = self.call_generator(prompt).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(raw) => {
                let answer = parse_insight(&raw);
                let entry = self
                    .cache
                    .store_answer(
                        kind,
                        context.canonical(),
                        digest.to_string(),
                        &answer,
                        self.generator.model_id(),
                    )
                    .await?;
                self.auditor
                    .record_success(
                        AnalysisKind::Insight,
                        audit_input,
                        &raw,
                        prompt,
                        self.generator.model_id(),
                        latency_ms,
                    )
                    .await;
                Ok(InsightResponse::from_entry(entry, false))
            }
            Err(err) => {
                self.auditor
                    .record_failure(
                        AnalysisKind::Insight,
                        audit_input,
                        Some(prompt),
                        self.generator.model_id(),
                        latency_ms,
                        &err.to_string(),
                    )
                    .await;
                Err(err)
            }
        }
    }

    async fn call_generator(&self, prompt: &str) -> Result<String, EngineError> {
        generate_with_retry(
            self.generator.as_ref(),
            PromptBuilder::system_prompt(),
            prompt,
            self.config.max_retries,
            Duration::from_millis(self.config.retry_base_delay_ms),
        )
        .await
    }

    async fn fetch_matching(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        category: Option<Category>,
        area: Option<&str>,
    ) -> Result<Vec<IncidentRecord>, EngineError> {
        let mut records = self.incidents.find_by_period(start, end).await?;
        records.retain(|r| category.is_none_or(|c| r.category == c));
        if let Some(area) = area {
            records.retain(|r| r.area.eq_ignore_ascii_case(area));
        }
        Ok(records)
    }
}

fn with_period(
    context: InsightContext,
    period: Option<(DateTime<Utc>, DateTime<Utc>)>,
) -> InsightContext {
    match period {
        Some((start, end)) => context
            .with("periodoInicio", start.to_rfc3339())
            .with("periodoFim", end.to_rfc3339()),
        None => context,
    }
}

/// Contagem de categorias, mais frequente primeiro (empate: menor nome).
fn count_categories(records: &[&IncidentRecord]) -> Vec<(Category, u64)> {
    let mut counts: BTreeMap<&'static str, (Category, u64)> = BTreeMap::new();
    for record in records {
        counts
            .entry(record.category.as_str())
            .or_insert((record.category, 0))
            .1 += 1;
    }
    let mut out: Vec<(Category, u64)> = counts.into_values().collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.as_str().cmp(b.0.as_str())));
    out
}

/// Constrói o filtro de agregação a partir de um contexto livre.
fn filter_from_context(fields: &Value) -> RecordFilter {
    let mut filter = RecordFilter::new();
    if let Some(category) = fields
        .get("tipoProblema")
        .and_then(|v| serde_json::from_value::<Category>(v.clone()).ok())
    {
        filter = filter.with_category(category);
    }
    if let Some(area) = fields.get("bairro").and_then(Value::as_str) {
        filter = filter.with_area_contains(area);
    }
    if let Some(min) = fields.get("gravidadeMin").and_then(Value::as_u64) {
        filter = filter.with_min_severity(min.min(10) as u8);
    }
    filter
}
