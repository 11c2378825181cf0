//! Persisted Artifacts: cache de insights, relatórios e trilha de auditoria
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::{AnalysisKind, InsightKind, ReportKind, ReportStatus};

/// Entrada do cache endereçado por conteúdo.
///
/// Nunca é mutada: quando expira e é regerada, uma nova entrada substitui a
/// antiga sob o mesmo digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightCacheEntry {
    pub id: Uuid,
    pub kind: InsightKind,
    /// Contexto canônico (chaves ordenadas) do qual o digest deriva.
    pub context: Value,
    /// Digest hex de tamanho fixo do contexto canônico; chave única.
    pub digest: String,
    pub insight_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub support_data: Option<Value>,
    /// Confiança declarada pela IA, em `[0, 1]`.
    pub confidence: f64,
    /// Relevância declarada pela IA, informalmente 1–10.
    pub relevance: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl InsightCacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| now > expiry)
    }
}

/// Relatório gerado pela IA, com ciclo de vida próprio.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: Uuid,
    pub kind: ReportKind,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executive_summary: Option<String>,
    /// Conteúdo estruturado completo retornado pela IA.
    pub content: Value,
    /// Snapshot das métricas agregadas usadas na geração.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Value>,
    pub critical_areas: Value,
    pub recommendations: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub status: ReportStatus,
    pub generated_at: DateTime<Utc>,
    /// Preenchido apenas no sucesso terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
}

impl Report {
    /// Abre um relatório no estado `Generating`, observável antes de
    /// qualquer chamada à IA.
    pub fn open(kind: ReportKind, period_start: DateTime<Utc>, period_end: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            period_start,
            period_end,
            title: format!(
                "Relatório {} - {}",
                kind.label(),
                period_start.format("%d/%m/%Y")
            ),
            executive_summary: None,
            content: Value::Object(serde_json::Map::new()),
            metrics: None,
            critical_areas: Value::Array(Vec::new()),
            recommendations: Value::Array(Vec::new()),
            filters: None,
            model: None,
            status: ReportStatus::Generating,
            generated_at: Utc::now(),
            completed_at: None,
            processing_ms: None,
            requested_by: None,
        }
    }

    pub fn with_requested_by(mut self, requester: impl Into<String>) -> Self {
        self.requested_by = Some(requester.into());
        self
    }

    pub fn with_filters(mut self, filters: Value) -> Self {
        self.filters = Some(filters);
        self
    }
}

/// Entrada imutável da trilha de auditoria: uma por tentativa de chamada
/// à IA, com entradas, saídas e latência.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    pub kind: AnalysisKind,
    pub input: Value,
    pub output: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<f64>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub executed_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(kind: AnalysisKind, input: Value, output: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            input,
            output,
            prompt: None,
            model: None,
            latency_ms: 0,
            tokens_used: None,
            estimated_cost: None,
            success: true,
            error_message: None,
            executed_at: Utc::now(),
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn failed(mut self, message: impl Into<String>) -> Self {
        self.success = false;
        self.error_message = Some(message.into());
        self
    }
}

/// Sumário de custo/uso sobre uma janela da trilha de auditoria.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSummary {
    pub total: usize,
    pub successes: usize,
    pub failures: usize,
    pub success_rate: f64,
    pub total_latency_ms: u64,
    pub total_tokens: u64,
    pub total_estimated_cost: f64,
}

impl AuditSummary {
    pub fn from_entries(entries: &[AuditEntry]) -> Self {
        let total = entries.len();
        let successes = entries.iter().filter(|e| e.success).count();
        Self {
            total,
            successes,
            failures: total - successes,
            success_rate: if total > 0 {
                successes as f64 / total as f64
            } else {
                0.0
            },
            total_latency_ms: entries.iter().map(|e| e.latency_ms).sum(),
            total_tokens: entries
                .iter()
                .filter_map(|e| e.tokens_used)
                .map(u64::from)
                .sum(),
            total_estimated_cost: entries.iter().filter_map(|e| e.estimated_cost).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_cache_entry_expiry() {
        let now = Utc::now();
        let mut entry = InsightCacheEntry {
            id: Uuid::new_v4(),
            kind: InsightKind::Trend,
            context: Value::Object(serde_json::Map::new()),
            digest: "abc".into(),
            insight_text: "texto".into(),
            support_data: None,
            confidence: 0.8,
            relevance: 7,
            model: None,
            generated_at: now,
            expires_at: Some(now + Duration::seconds(60)),
        };

        assert!(!entry.is_expired(now));
        assert!(entry.is_expired(now + Duration::seconds(61)));

        // Sem expiração a entrada nunca expira.
        entry.expires_at = None;
        assert!(!entry.is_expired(now + Duration::days(400)));
    }

    #[test]
    fn test_report_opens_generating() {
        let report = Report::open(ReportKind::Daily, Utc::now() - Duration::days(1), Utc::now());
        assert_eq!(report.status, ReportStatus::Generating);
        assert!(report.completed_at.is_none());
        assert!(report.title.starts_with("Relatório diário"));
    }

    #[test]
    fn test_audit_summary() {
        let ok = AuditEntry::new(
            AnalysisKind::Insight,
            Value::Null,
            Value::Null,
        )
        .with_latency(100);
        let mut failed = AuditEntry::new(AnalysisKind::Report, Value::Null, Value::Null)
            .with_latency(50)
            .failed("boom");
        failed.tokens_used = Some(300);

        let summary = AuditSummary::from_entries(&[ok, failed]);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.failures, 1);
        assert!((summary.success_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(summary.total_latency_ms, 150);
        assert_eq!(summary.total_tokens, 300);
    }
}
