//! Tracing bootstrap para binários e testes.
use tracing::Level;

/// Inicializa o subscriber global de tracing.
///
/// O nível padrão é `info`; pode ser sobrescrito com `URBIA_LOG`
/// (ex.: `URBIA_LOG=debug`). Chamadas repetidas são inofensivas.
pub fn init_tracing() {
    let level = std::env::var("URBIA_LOG")
        .ok()
        .and_then(|v| v.parse::<Level>().ok())
        .unwrap_or(Level::INFO);

    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init();
}
