//! Unified Error Model
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Período inválido informado pelo chamador; nunca é retentado.
    #[error("PERIOD/{0}")]
    InvalidPeriod(String),

    /// Backend de IA fora do ar ou erro de transporte (transiente).
    #[error("AI/UNAVAILABLE: {0}")]
    ServiceUnavailable(String),

    /// Backend de IA recusou por limite de taxa (transiente).
    #[error("AI/RATE_LIMITED: {0}")]
    RateLimited(String),

    /// Backend de IA respondeu com algo inutilizável (não transiente).
    #[error("AI/INVALID_RESPONSE: {0}")]
    InvalidResponse(String),

    /// Falha terminal de uma execução de relatório.
    #[error("REPORT/FAILED: {0}")]
    ReportGenerationFailed(String),

    /// Falha de renderização de template de prompt.
    #[error("TEMPLATE/{0}")]
    Template(String),

    /// Falha da camada de persistência.
    #[error("STORE/{0}")]
    Store(String),

    #[error("NOT_FOUND/{0}")]
    NotFound(String),
}

impl EngineError {
    /// Erros elegíveis para retry com backoff na borda da IA.
    ///
    /// Erros de cliente (`InvalidResponse`, período inválido) nunca são
    /// retentados.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::ServiceUnavailable(_) | EngineError::RateLimited(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            EngineError::InvalidPeriod("end before start".into()).to_string(),
            "PERIOD/end before start"
        );
        assert!(EngineError::RateLimited("429".into())
            .to_string()
            .starts_with("AI/RATE_LIMITED"));
    }

    #[test]
    fn test_transiency() {
        assert!(EngineError::ServiceUnavailable("503".into()).is_transient());
        assert!(EngineError::RateLimited("429".into()).is_transient());
        assert!(!EngineError::InvalidResponse("bad".into()).is_transient());
        assert!(!EngineError::InvalidPeriod("bad".into()).is_transient());
    }
}
