//! Serviço de relatórios: máquina de estados GENERATING → COMPLETED | ERROR.
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Duration as Span, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use urbia_ai::{generate_with_retry, parse_report, truncate, PromptBuilder, TextGenerator};
use urbia_analytics::{Aggregator, RecordFilter};
use urbia_core::artifacts::Report;
use urbia_core::config::EngineConfig;
use urbia_core::domain::{AnalysisKind, ReportKind, ReportStatus};
use urbia_core::error::EngineError;
use urbia_core::store::{AuditStore, IncidentStore, ReportStore};

use crate::audit::Auditor;

/// Janela máxima de um relatório.
const MAX_PERIOD_DAYS: i64 = 365;

/// Requisição de geração de relatório.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub kind: ReportKind,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<RecordFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
}

impl ReportRequest {
    pub fn new(kind: ReportKind, period_start: DateTime<Utc>, period_end: DateTime<Utc>) -> Self {
        Self {
            kind,
            period_start,
            period_end,
            filter: None,
            requested_by: None,
        }
    }

    pub fn with_filter(mut self, filter: RecordFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_requested_by(mut self, requester: impl Into<String>) -> Self {
        self.requested_by = Some(requester.into());
        self
    }
}

/// Orquestrador de relatórios.
pub struct ReportService {
    aggregator: Aggregator,
    reports: Arc<dyn ReportStore>,
    auditor: Auditor,
    generator: Arc<dyn TextGenerator>,
    config: EngineConfig,
}

impl ReportService {
    pub fn new(
        incidents: Arc<dyn IncidentStore>,
        reports: Arc<dyn ReportStore>,
        audits: Arc<dyn AuditStore>,
        generator: Arc<dyn TextGenerator>,
        config: EngineConfig,
    ) -> Self {
        Self {
            aggregator: Aggregator::new(incidents, &config),
            reports,
            auditor: Auditor::new(audits),
            generator,
            config,
        }
    }

    /// Gera um relatório do início ao fim, aguardando a IA.
    pub async fn generate_report(&self, request: ReportRequest) -> Result<Report, EngineError> {
        let report = self.open_report(&request).await?;
        self.run_to_completion(report, request).await
    }

    /// Dispara a geração sem bloquear: devolve imediatamente o relatório em
    /// `GENERATING`; o chamador acompanha pelo status.
    pub async fn trigger(self: &Arc<Self>, request: ReportRequest) -> Result<Report, EngineError> {
        let report = self.open_report(&request).await?;
        let snapshot = report.clone();

        let service = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = service.run_to_completion(report, request).await {
                warn!(error = %err, "geração de relatório em segundo plano falhou");
            }
        });

        Ok(snapshot)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Report>, EngineError> {
        self.reports.find_by_id(id).await
    }

    pub async fn latest_by_kind(&self, kind: ReportKind) -> Result<Option<Report>, EngineError> {
        self.reports.find_latest(kind).await
    }

    pub async fn list(
        &self,
        kind: Option<ReportKind>,
        status: Option<ReportStatus>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Report>, EngineError> {
        self.reports.list(kind, status, from, to).await
    }

    /// Valida o período e persiste o registro em `GENERATING` — antes de
    /// qualquer trabalho de agregação ou IA.
    async fn open_report(&self, request: &ReportRequest) -> Result<Report, EngineError> {
        validate_period(request.period_start, request.period_end)?;

        info!(
            kind = ?request.kind,
            start = %request.period_start,
            end = %request.period_end,
            "abrindo relatório"
        );

        let mut report = Report::open(request.kind, request.period_start, request.period_end);
        if let Some(requester) = &request.requested_by {
            report = report.with_requested_by(requester.clone());
        }
        if let Some(filter) = &request.filter {
            let filters =
                serde_json::to_value(filter).map_err(|e| EngineError::Store(e.to_string()))?;
            report = report.with_filters(filters);
        }

        self.reports.insert(report).await
    }

    /// Roda agregação → prompt → IA → parse e leva o relatório a um estado
    /// terminal. A duração de processamento é registrada nos dois desfechos.
    async fn run_to_completion(
        &self,
        mut report: Report,
        request: ReportRequest,
    ) -> Result<Report, EngineError> {
        let started = Instant::now();
        let audit_input = json!({
            "tipoRelatorio": request.kind,
            "periodoInicio": request.period_start.to_rfc3339(),
            "periodoFim": request.period_end.to_rfc3339(),
        });

        match self.pipeline(&mut report, &request).await {
            Ok((prompt, raw_response, ai_latency_ms)) => {
                report.status = ReportStatus::Completed;
                report.completed_at = Some(Utc::now());
                report.processing_ms = Some(started.elapsed().as_millis() as u64);
                let report = self.reports.update(report).await?;

                self.auditor
                    .record_success(
                        AnalysisKind::Report,
                        audit_input,
                        &raw_response,
                        &prompt,
                        self.generator.model_id(),
                        ai_latency_ms,
                    )
                    .await;

                info!(id = %report.id, "relatório concluído");
                Ok(report)
            }
            Err(err) => {
                report.status = ReportStatus::Error;
                report.processing_ms = Some(started.elapsed().as_millis() as u64);
                // O relatório em ERROR continua consultável mesmo com a
                // chamada tendo falhado.
                if let Err(update_err) = self.reports.update(report.clone()).await {
                    warn!(error = %update_err, "falha ao persistir relatório em erro");
                }

                self.auditor
                    .record_failure(
                        AnalysisKind::Report,
                        audit_input,
                        None,
                        self.generator.model_id(),
                        0,
                        &err.to_string(),
                    )
                    .await;

                Err(EngineError::ReportGenerationFailed(err.to_string()))
            }
        }
    }

    /// Preenche métricas e conteúdo do relatório; devolve prompt, resposta
    /// bruta e latência da IA para a auditoria.
    async fn pipeline(
        &self,
        report: &mut Report,
        request: &ReportRequest,
    ) -> Result<(String, String, u64), EngineError> {
        let filter = request.filter.clone().unwrap_or_default();
        let metrics = self
            .aggregator
            .aggregate(request.period_start, request.period_end, &filter)
            .await?;

        report.metrics = Some(
            serde_json::to_value(&metrics).map_err(|e| EngineError::Store(e.to_string()))?,
        );

        let prompt =
            PromptBuilder::report(&metrics, request.period_start, request.period_end)?;

        let ai_started = Instant::now();
        let raw_response = generate_with_retry(
            self.generator.as_ref(),
            PromptBuilder::system_prompt(),
            &prompt,
            self.config.max_retries,
            Duration::from_millis(self.config.retry_base_delay_ms),
        )
        .await?;
        let ai_latency_ms = ai_started.elapsed().as_millis() as u64;

        let content = parse_report(&raw_response);

        report.executive_summary = content
            .get("resumoExecutivo")
            .and_then(Value::as_str)
            .map(|text| truncate(text, self.config.summary_limit));
        report.critical_areas = content
            .get("areasCriticas")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));
        report.recommendations = content
            .get("recomendacoes")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));
        report.content = Value::Object(content);
        report.model = Some(self.generator.model_id().to_string());

        Ok((prompt, raw_response, ai_latency_ms))
    }
}

fn validate_period(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), EngineError> {
    if end <= start {
        return Err(EngineError::InvalidPeriod(
            "fim do período deve ser posterior ao início".to_string(),
        ));
    }
    if end - start > Span::days(MAX_PERIOD_DAYS) {
        return Err(EngineError::InvalidPeriod(format!(
            "período não pode exceder {} dias",
            MAX_PERIOD_DAYS
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_period() {
        let now = Utc::now();
        assert!(validate_period(now - Span::days(7), now).is_ok());
        assert!(matches!(
            validate_period(now, now),
            Err(EngineError::InvalidPeriod(_))
        ));
        assert!(matches!(
            validate_period(now, now - Span::days(1)),
            Err(EngineError::InvalidPeriod(_))
        ));
        assert!(matches!(
            validate_period(now - Span::days(400), now),
            Err(EngineError::InvalidPeriod(_))
        ));
    }
}
