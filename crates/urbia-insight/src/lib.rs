//! Urbia Insight: os orquestradores do motor
//!
//! Fluxo de uma requisição de insight:
//!
//! ```text
//! requisição → contexto → hash → cache ─hit──────────────→ resposta
//!                                  │
//!                                 miss
//!                                  ↓
//!                      agregação → prompt → IA → parse
//!                                  ↓                ↓
//!                              auditoria ← grava no cache
//! ```
//!
//! Relatórios seguem a máquina de estados `GENERATING → COMPLETED | ERROR`;
//! o registro em `GENERATING` é persistido antes de qualquer chamada à IA,
//! então um relatório em andamento é observável imediatamente.

pub mod audit;
pub mod cache;
pub mod context;
pub mod insight;
pub mod report;

pub use audit::Auditor;
pub use cache::InsightCache;
pub use context::InsightContext;
pub use insight::{InsightResponse, InsightService};
pub use report::{ReportRequest, ReportService};
