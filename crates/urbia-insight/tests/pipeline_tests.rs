//! Testes de integração do pipeline completo: agregação → prompt → IA
//! (simulada) → parse → cache/relatório → auditoria.
//!
//! O gerador é um mock com roteiro; as lojas são as implementações em
//! memória do urbia-core.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as Span, Utc};
use serde_json::json;
use tokio::sync::Mutex;

use urbia_ai::TextGenerator;
use urbia_analytics::RecordFilter;
use urbia_core::{
    AnalysisKind, AuditStore, Category, EngineConfig, EngineError, IncidentRecord, InsightKind,
    MemoryAuditStore, MemoryIncidentStore, MemoryInsightStore, MemoryReportStore, ReportKind,
    ReportStatus, ReportStore,
};
use urbia_insight::{InsightService, ReportRequest, ReportService};

const REPORT_JSON: &str = "```json\n{\"resumoExecutivo\": \"Situação estável no período, com concentração de ocorrências no Centro.\", \"principaisAchados\": [\"Centro concentra ocorrências críticas\"], \"areasCriticas\": [{\"bairro\": \"Centro\", \"razao\": \"alagamentos recorrentes\"}], \"recomendacoes\": [{\"prioridade\": \"alta\", \"acao\": \"reforçar drenagem\"}], \"insights\": []}\n```";

const INSIGHT_JSON: &str = "{\"insight\": \"Concentração de alagamentos na área\", \"confianca\": 0.9, \"relevancia\": 8, \"fatores\": [\"chuva intensa\"], \"recomendacoes\": [\"ampliar drenagem\"]}";

/// Gerador com roteiro: devolve as respostas na ordem, com atraso opcional.
struct MockGenerator {
    script: Mutex<VecDeque<Result<String, EngineError>>>,
    calls: AtomicU32,
    delay: Duration,
}

impl MockGenerator {
    fn new(script: Vec<Result<String, EngineError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: AtomicU32::new(0),
            delay: Duration::ZERO,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, _system: &str, _user: &str) -> Result<String, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(EngineError::InvalidResponse("roteiro esgotado".into())))
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}

struct Harness {
    incidents: Arc<MemoryIncidentStore>,
    reports: Arc<MemoryReportStore>,
    audits: Arc<MemoryAuditStore>,
    generator: Arc<MockGenerator>,
    insight_service: InsightService,
    report_service: Arc<ReportService>,
}

fn test_config() -> EngineConfig {
    EngineConfig {
        max_retries: 0,
        retry_base_delay_ms: 1,
        ..EngineConfig::default()
    }
}

fn harness_with(generator: MockGenerator, config: EngineConfig) -> Harness {
    urbia_core::telemetry::init_tracing();

    let incidents = Arc::new(MemoryIncidentStore::new());
    let insights = Arc::new(MemoryInsightStore::new());
    let reports = Arc::new(MemoryReportStore::new());
    let audits = Arc::new(MemoryAuditStore::new());
    let generator = Arc::new(generator);

    let insight_service = InsightService::new(
        incidents.clone(),
        insights.clone(),
        audits.clone(),
        generator.clone(),
        config.clone(),
    );
    let report_service = Arc::new(ReportService::new(
        incidents.clone(),
        reports.clone(),
        audits.clone(),
        generator.clone(),
        config,
    ));

    Harness {
        incidents,
        reports,
        audits,
        generator,
        insight_service,
        report_service,
    }
}

fn harness(script: Vec<Result<String, EngineError>>) -> Harness {
    harness_with(MockGenerator::new(script), test_config())
}

/// Três ocorrências críticas no Centro e uma leve no Norte, todas recentes.
async fn seed_incidents(harness: &Harness) {
    let now = Utc::now();
    harness
        .incidents
        .extend(vec![
            IncidentRecord::new(Category::Flooding, "Centro", 9)
                .with_created_at(now - Span::days(2)),
            IncidentRecord::new(Category::Flooding, "Centro", 9)
                .with_created_at(now - Span::days(4)),
            IncidentRecord::new(Category::Sewage, "Centro", 8)
                .with_created_at(now - Span::days(6)),
            IncidentRecord::new(Category::Pothole, "Norte", 2)
                .with_created_at(now - Span::days(1)),
        ])
        .await;
}

// =============================================================================
// Ciclo de vida de relatórios
// =============================================================================

#[tokio::test]
async fn test_report_completes_with_extracted_fields() {
    let harness = harness(vec![Ok(REPORT_JSON.to_string())]);
    seed_incidents(&harness).await;

    let now = Utc::now();
    let report = harness
        .report_service
        .generate_report(ReportRequest::new(
            ReportKind::Weekly,
            now - Span::days(7),
            now,
        ))
        .await
        .unwrap();

    assert_eq!(report.status, ReportStatus::Completed);
    assert!(report.completed_at.is_some());
    assert!(report.processing_ms.is_some());
    assert_eq!(report.model.as_deref(), Some("mock-model"));
    assert!(report
        .executive_summary
        .as_deref()
        .unwrap()
        .starts_with("Situação estável"));
    assert_eq!(report.critical_areas[0]["bairro"], json!("Centro"));
    assert_eq!(report.recommendations[0]["prioridade"], json!("alta"));

    // Snapshot de métricas embutido no relatório.
    let metrics = report.metrics.as_ref().unwrap();
    assert_eq!(metrics["totalCurrent"], json!(4));
    assert_eq!(metrics["variancePct"], json!(100.0));

    // Auditoria de sucesso com prompt e resposta bruta.
    let entries = harness
        .audits
        .find(Some(AnalysisKind::Report), None, None)
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].success);
    assert!(entries[0].prompt.as_deref().unwrap().contains("Total de ocorrências: 4"));
}

#[tokio::test]
async fn test_trigger_is_observable_before_completion() {
    let generator =
        MockGenerator::new(vec![Ok(REPORT_JSON.to_string())]).with_delay(Duration::from_millis(80));
    let harness = harness_with(generator, test_config());
    seed_incidents(&harness).await;

    let now = Utc::now();
    let snapshot = harness
        .report_service
        .trigger(ReportRequest::new(
            ReportKind::Daily,
            now - Span::days(1),
            now,
        ))
        .await
        .unwrap();

    // O registro existe e está GERANDO antes de a IA responder.
    assert_eq!(snapshot.status, ReportStatus::Generating);
    assert!(snapshot.completed_at.is_none());
    let stored = harness
        .reports
        .find_by_id(snapshot.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, ReportStatus::Generating);

    // O chamador acompanha por polling até o estado terminal.
    let mut completed = None;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let report = harness
            .reports
            .find_by_id(snapshot.id)
            .await
            .unwrap()
            .unwrap();
        if report.status.is_terminal() {
            completed = Some(report);
            break;
        }
    }
    let completed = completed.expect("relatório deveria concluir");
    assert_eq!(completed.status, ReportStatus::Completed);
    assert!(completed.completed_at.is_some());

    // Consultável também como o mais recente do tipo.
    let latest = harness
        .report_service
        .latest_by_kind(ReportKind::Daily)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.id, completed.id);
}

#[tokio::test]
async fn test_report_failure_is_terminal_and_audited() {
    let harness = harness(vec![Err(EngineError::InvalidResponse("quebrou".into()))]);
    seed_incidents(&harness).await;

    let now = Utc::now();
    let err = harness
        .report_service
        .generate_report(ReportRequest::new(
            ReportKind::Daily,
            now - Span::days(1),
            now,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ReportGenerationFailed(_)));

    // O relatório em ERROR continua consultável, com duração registrada.
    let reports = harness
        .reports
        .list(None, Some(ReportStatus::Error), None, None)
        .await
        .unwrap();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].processing_ms.is_some());
    assert!(reports[0].completed_at.is_none());

    let entries = harness
        .audits
        .find(Some(AnalysisKind::Report), None, None)
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert!(!entries[0].success);
    assert!(entries[0].error_message.as_deref().unwrap().contains("quebrou"));
}

#[tokio::test]
async fn test_invalid_period_is_rejected_before_any_work() {
    let harness = harness(vec![]);
    let now = Utc::now();

    let err = harness
        .report_service
        .generate_report(ReportRequest::new(ReportKind::Custom, now, now - Span::days(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidPeriod(_)));

    let err = harness
        .report_service
        .generate_report(ReportRequest::new(
            ReportKind::Custom,
            now - Span::days(400),
            now,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidPeriod(_)));

    // Nada persistido, nenhuma chamada à IA.
    assert!(harness.reports.list(None, None, None, None).await.unwrap().is_empty());
    assert_eq!(harness.generator.calls(), 0);
}

// =============================================================================
// Insights e cache por contexto
// =============================================================================

#[tokio::test]
async fn test_insight_miss_then_hit() {
    let harness = harness(vec![Ok(INSIGHT_JSON.to_string())]);
    seed_incidents(&harness).await;

    let first = harness
        .insight_service
        .critical_area_insight("Centro", None, None)
        .await
        .unwrap();
    assert!(!first.from_cache);
    assert_eq!(first.kind, InsightKind::CriticalArea);
    assert_eq!(first.insight, "Concentração de alagamentos na área");
    assert!((first.confidence - 0.9).abs() < f64::EPSILON);
    assert_eq!(first.relevance, 8);
    assert_eq!(first.recommendations, vec!["ampliar drenagem".to_string()]);

    let second = harness
        .insight_service
        .critical_area_insight("Centro", None, None)
        .await
        .unwrap();
    assert!(second.from_cache);
    assert_eq!(second.insight, first.insight);

    // Uma única chamada à IA e uma única entrada de auditoria.
    assert_eq!(harness.generator.calls(), 1);
    let entries = harness
        .audits
        .find(Some(AnalysisKind::Insight), None, None)
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn test_expired_insight_is_regenerated() {
    let mut config = test_config();
    config.ttl.critical_area_secs = 0;
    let harness = harness_with(
        MockGenerator::new(vec![
            Ok(INSIGHT_JSON.to_string()),
            Ok(INSIGHT_JSON.to_string()),
        ]),
        config,
    );
    seed_incidents(&harness).await;

    let first = harness
        .insight_service
        .critical_area_insight("Centro", None, None)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = harness
        .insight_service
        .critical_area_insight("Centro", None, None)
        .await
        .unwrap();

    assert!(!first.from_cache);
    assert!(!second.from_cache);
    assert_eq!(harness.generator.calls(), 2);
}

#[tokio::test]
async fn test_unparseable_response_degrades_but_still_serves() {
    let harness = harness(vec![Ok("resposta em prosa, sem estrutura".to_string())]);
    seed_incidents(&harness).await;

    let insight = harness
        .insight_service
        .trend_insight(Some(Category::Flooding), None, None)
        .await
        .unwrap();

    assert_eq!(insight.insight, "resposta em prosa, sem estrutura");
    assert!((insight.confidence - 0.7).abs() < f64::EPSILON);
    assert_eq!(insight.relevance, 5);
    assert!(insight.recommendations.is_empty());

    // A resposta degradada também fica no cache.
    let again = harness
        .insight_service
        .trend_insight(Some(Category::Flooding), None, None)
        .await
        .unwrap();
    assert!(again.from_cache);
    assert_eq!(harness.generator.calls(), 1);
}

#[tokio::test]
async fn test_distinct_contexts_do_not_share_cache() {
    let harness = harness(vec![
        Ok(INSIGHT_JSON.to_string()),
        Ok(INSIGHT_JSON.to_string()),
    ]);
    seed_incidents(&harness).await;

    harness
        .insight_service
        .critical_area_insight("Centro", None, None)
        .await
        .unwrap();
    let other = harness
        .insight_service
        .critical_area_insight("Norte", None, None)
        .await
        .unwrap();

    assert!(!other.from_cache);
    assert_eq!(harness.generator.calls(), 2);
}

#[tokio::test]
async fn test_explanation_insight_embeds_context_verbatim() {
    let harness = harness(vec![Ok(INSIGHT_JSON.to_string())]);

    let context = json!({"bairro": "Centro", "fenomeno": "alagamentos"});
    let response = harness
        .insight_service
        .explanation_insight(&context, Some("Por que se repete?"))
        .await
        .unwrap();
    assert!(!response.from_cache);
    assert_eq!(response.kind, InsightKind::Explanation);

    let entries = harness
        .audits
        .find(Some(AnalysisKind::Insight), None, None)
        .await
        .unwrap();
    let prompt = entries[0].prompt.as_deref().unwrap();
    assert!(prompt.contains("\"fenomeno\":\"alagamentos\""));
    assert!(prompt.contains("PERGUNTA ESPECÍFICA: Por que se repete?"));
}

#[tokio::test]
async fn test_invalidated_area_forces_regeneration() {
    let harness = harness(vec![
        Ok(INSIGHT_JSON.to_string()),
        Ok(INSIGHT_JSON.to_string()),
    ]);
    seed_incidents(&harness).await;

    harness
        .insight_service
        .critical_area_insight("Centro", None, None)
        .await
        .unwrap();
    let removed = harness.insight_service.invalidate_area("Centro").await.unwrap();
    assert_eq!(removed, 1);

    let regenerated = harness
        .insight_service
        .critical_area_insight("Centro", None, None)
        .await
        .unwrap();
    assert!(!regenerated.from_cache);
    assert_eq!(harness.generator.calls(), 2);
}

#[tokio::test]
async fn test_question_with_area_context_embeds_metrics() {
    let harness = harness(vec![Ok(INSIGHT_JSON.to_string())]);
    seed_incidents(&harness).await;

    let context = json!({"bairro": "Centro"});
    let response = harness
        .insight_service
        .answer_question("Por que o Centro alaga tanto?", Some(&context))
        .await
        .unwrap();
    assert!(!response.from_cache);

    // O prompt auditado inclui os dados agregados do último mês.
    let entries = harness
        .audits
        .find(Some(AnalysisKind::Insight), None, None)
        .await
        .unwrap();
    let prompt = entries[0].prompt.as_deref().unwrap();
    assert!(prompt.contains("Por que o Centro alaga tanto?"));
    assert!(prompt.contains("DADOS DISPONÍVEIS"));
    assert!(prompt.contains("Total de ocorrências: 3"));
}

#[tokio::test]
async fn test_failed_insight_is_audited_and_propagated() {
    let harness = harness(vec![Err(EngineError::InvalidResponse("sem resposta".into()))]);
    seed_incidents(&harness).await;

    let err = harness
        .insight_service
        .pattern_insight(RecordFilter::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidResponse(_)));

    let entries = harness
        .audits
        .find(Some(AnalysisKind::Insight), None, None)
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert!(!entries[0].success);
}

// =============================================================================
// Classificação de gravidade
// =============================================================================

#[tokio::test]
async fn test_classification_extracts_grade_and_audits() {
    let harness = harness(vec![Ok("8".to_string())]);

    let severity = harness
        .insight_service
        .classify_severity(Some("alagamento cobrindo a rua inteira"), Category::Flooding, "Centro")
        .await
        .unwrap();
    assert_eq!(severity, 8);

    let entries = harness
        .audits
        .find(Some(AnalysisKind::Classification), None, None)
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].success);
    assert_eq!(entries[0].input["bairro"], json!("Centro"));
}

#[tokio::test]
async fn test_classification_without_grade_fails() {
    let harness = harness(vec![Ok("não sei avaliar".to_string())]);

    let err = harness
        .insight_service
        .classify_severity(None, Category::Pothole, "Norte")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidResponse(_)));

    let entries = harness
        .audits
        .find(Some(AnalysisKind::Classification), None, None)
        .await
        .unwrap();
    assert!(!entries[0].success);
}

// =============================================================================
// Auditoria como trilha de custo
// =============================================================================

#[tokio::test]
async fn test_audit_summary_spans_kinds() {
    let harness = harness(vec![
        Ok(INSIGHT_JSON.to_string()),
        Ok("7".to_string()),
        Err(EngineError::InvalidResponse("x".into())),
    ]);
    seed_incidents(&harness).await;

    harness
        .insight_service
        .critical_area_insight("Centro", None, None)
        .await
        .unwrap();
    harness
        .insight_service
        .classify_severity(None, Category::Pothole, "Norte")
        .await
        .unwrap();
    let _ = harness
        .insight_service
        .prediction_insight(30, None)
        .await
        .unwrap_err();

    let summary = harness
        .insight_service
        .audit_summary(None, None, None)
        .await
        .unwrap();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.successes, 2);
    assert_eq!(summary.failures, 1);

    let insight_only = harness
        .insight_service
        .audit_summary(Some(AnalysisKind::Insight), None, None)
        .await
        .unwrap();
    assert_eq!(insight_only.total, 2);
}
