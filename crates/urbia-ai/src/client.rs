//! Contrato do backend de texto generativo e retry com backoff.
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use urbia_core::error::EngineError;

/// Backend de texto generativo: uma única chamada síncrona do ponto de
/// vista do chamador.
///
/// Falhas transientes (`ServiceUnavailable`, `RateLimited`) são elegíveis
/// para retry; `InvalidResponse` nunca é.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, EngineError>;

    /// Identificador do modelo, gravado em cache e auditoria.
    fn model_id(&self) -> &str;
}

/// Chama o backend com até `max_retries` tentativas extras e backoff
/// exponencial a partir de `base_delay`.
pub async fn generate_with_retry(
    generator: &dyn TextGenerator,
    system_prompt: &str,
    user_prompt: &str,
    max_retries: u32,
    base_delay: Duration,
) -> Result<String, EngineError> {
    let mut attempt = 0;
    loop {
        match generator.generate(system_prompt, user_prompt).await {
            Ok(text) => return Ok(text),
            Err(err) if err.is_transient() && attempt < max_retries => {
                let delay = base_delay * 2u32.saturating_pow(attempt);
                warn!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "falha transiente na IA, aguardando para retentar"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
