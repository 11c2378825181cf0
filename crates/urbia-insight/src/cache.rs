//! Cache de insights endereçado por conteúdo, com TTL por tipo.
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use urbia_ai::StructuredAnswer;
use urbia_core::artifacts::InsightCacheEntry;
use urbia_core::config::{EngineConfig, TtlConfig};
use urbia_core::domain::InsightKind;
use urbia_core::error::EngineError;
use urbia_core::store::InsightStore;

/// Fachada do cache: consulta por digest e grava respostas com a expiração
/// do tipo.
///
/// `lookup` e a sequência gerar-e-gravar não são atômicos: dois misses
/// simultâneos do mesmo digest podem ambos chamar a IA e ambos gravar; o
/// último sobrescreve e as duas escritas são válidas.
pub struct InsightCache {
    store: Arc<dyn InsightStore>,
    ttl: TtlConfig,
}

impl InsightCache {
    pub fn new(store: Arc<dyn InsightStore>, config: &EngineConfig) -> Self {
        Self {
            store,
            ttl: config.ttl.clone(),
        }
    }

    /// Busca por digest; entrada expirada conta como miss mas NÃO é
    /// removida aqui — remoção é papel da varredura.
    pub async fn lookup(&self, digest: &str) -> Result<Option<InsightCacheEntry>, EngineError> {
        match self.store.find_by_digest(digest).await? {
            Some(entry) if !entry.is_expired(Utc::now()) => {
                debug!(digest, "insight atendido pelo cache");
                Ok(Some(entry))
            }
            Some(_) => {
                debug!(digest, "entrada expirada tratada como miss");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Grava uma resposta recém-gerada com `expires_at = agora + TTL(tipo)`.
    pub async fn store_answer(
        &self,
        kind: InsightKind,
        context: Value,
        digest: String,
        answer: &StructuredAnswer,
        model: &str,
    ) -> Result<InsightCacheEntry, EngineError> {
        let now = Utc::now();
        let entry = InsightCacheEntry {
            id: Uuid::new_v4(),
            kind,
            context,
            digest,
            insight_text: answer.insight.clone(),
            support_data: answer.support_data(),
            confidence: answer.confidence,
            relevance: answer.relevance,
            model: Some(model.to_string()),
            generated_at: now,
            expires_at: Some(now + self.ttl.for_kind(kind)),
        };
        self.store.put(entry).await
    }

    /// Remove entradas expiradas; devolve quantas saíram.
    pub async fn sweep_expired(&self) -> Result<usize, EngineError> {
        self.store.delete_expired(Utc::now()).await
    }

    /// Invalida entradas cujo contexto referencia a área — para quando os
    /// dados de uma área mudam materialmente.
    pub async fn invalidate_area(&self, area: &str) -> Result<usize, EngineError> {
        self.store.delete_by_area(area).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use urbia_ai::parse_insight;
    use urbia_core::store::MemoryInsightStore;

    fn cache_with(config: EngineConfig) -> (InsightCache, Arc<MemoryInsightStore>) {
        let store = Arc::new(MemoryInsightStore::new());
        (InsightCache::new(store.clone(), &config), store)
    }

    #[tokio::test]
    async fn test_round_trip_before_expiry() {
        let (cache, _) = cache_with(EngineConfig::default());
        let answer = parse_insight("{\"insight\":\"alta demanda\",\"confianca\":0.9}");

        let stored = cache
            .store_answer(
                InsightKind::Trend,
                json!({"tipo": "TREND"}),
                "d1".into(),
                &answer,
                "test-model",
            )
            .await
            .unwrap();
        assert!(stored.expires_at.is_some());

        let found = cache.lookup("d1").await.unwrap().unwrap();
        assert_eq!(found.insight_text, "alta demanda");
        assert_eq!(found.model.as_deref(), Some("test-model"));
    }

    #[tokio::test]
    async fn test_expired_entry_is_miss_but_not_deleted() {
        let mut config = EngineConfig::default();
        config.ttl.trend_secs = 0;
        let (cache, store) = cache_with(config);

        let answer = parse_insight("{\"insight\":\"x\"}");
        cache
            .store_answer(InsightKind::Trend, json!({}), "d2".into(), &answer, "m")
            .await
            .unwrap();

        // TTL zero: já nasce expirada.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(cache.lookup("d2").await.unwrap().is_none());
        // O lookup não removeu nada.
        assert_eq!(store.len().await, 1);

        // A varredura remove.
        assert_eq!(cache.sweep_expired().await.unwrap(), 1);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_ttl_follows_kind() {
        let (cache, _) = cache_with(EngineConfig::default());
        let answer = parse_insight("{\"insight\":\"x\"}");

        let short = cache
            .store_answer(InsightKind::CriticalArea, json!({}), "a".into(), &answer, "m")
            .await
            .unwrap();
        let long = cache
            .store_answer(InsightKind::Explanation, json!({}), "b".into(), &answer, "m")
            .await
            .unwrap();

        assert!(short.expires_at.unwrap() < long.expires_at.unwrap());
    }

    #[tokio::test]
    async fn test_invalidate_area() {
        let (cache, _) = cache_with(EngineConfig::default());
        let answer = parse_insight("{\"insight\":\"x\"}");

        cache
            .store_answer(
                InsightKind::CriticalArea,
                json!({"bairro": "Centro"}),
                "a".into(),
                &answer,
                "m",
            )
            .await
            .unwrap();
        cache
            .store_answer(
                InsightKind::CriticalArea,
                json!({"bairro": "Norte"}),
                "b".into(),
                &answer,
                "m",
            )
            .await
            .unwrap();

        assert_eq!(cache.invalidate_area("centro").await.unwrap(), 1);
        assert!(cache.lookup("a").await.unwrap().is_none());
        assert!(cache.lookup("b").await.unwrap().is_some());
    }
}
