//! Gravação da trilha de auditoria.
//!
//! Uma entrada por tentativa de chamada à IA, sucesso ou falha. A gravação
//! em si nunca derruba o fluxo principal: erro de auditoria é logado e
//! engolido.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::error;

use urbia_core::artifacts::{AuditEntry, AuditSummary};
use urbia_core::domain::AnalysisKind;
use urbia_core::error::EngineError;
use urbia_core::store::AuditStore;

pub struct Auditor {
    store: Arc<dyn AuditStore>,
}

impl Auditor {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Registra uma invocação bem-sucedida.
    pub async fn record_success(
        &self,
        kind: AnalysisKind,
        input: Value,
        raw_response: &str,
        prompt: &str,
        model: &str,
        latency_ms: u64,
    ) {
        let entry = AuditEntry::new(kind, input, json!({ "resposta": raw_response }))
            .with_prompt(prompt)
            .with_model(model)
            .with_latency(latency_ms);
        self.append(entry).await;
    }

    /// Registra uma invocação que falhou; a falha original continua sendo
    /// o erro do chamador, nunca a da auditoria.
    pub async fn record_failure(
        &self,
        kind: AnalysisKind,
        input: Value,
        prompt: Option<&str>,
        model: &str,
        latency_ms: u64,
        error_message: &str,
    ) {
        let mut entry = AuditEntry::new(kind, input, Value::Object(serde_json::Map::new()))
            .with_model(model)
            .with_latency(latency_ms)
            .failed(error_message);
        if let Some(prompt) = prompt {
            entry = entry.with_prompt(prompt);
        }
        self.append(entry).await;
    }

    async fn append(&self, entry: AuditEntry) {
        if let Err(err) = self.store.append(entry).await {
            error!(error = %err, "falha ao gravar entrada de auditoria");
        }
    }

    /// Sumário de custo/uso de uma janela.
    pub async fn summary(
        &self,
        kind: Option<AnalysisKind>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<AuditSummary, EngineError> {
        self.store.summarize(kind, from, to).await
    }
}
