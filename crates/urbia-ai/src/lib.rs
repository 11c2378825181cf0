//! Urbia AI: a borda com o backend de texto generativo
//!
//! Três responsabilidades, todas determinísticas exceto a chamada em si:
//!
//! - `client`: o contrato `TextGenerator` e o retry com backoff limitado;
//! - `prompt`: templates de prompt por tipo de insight/relatório — o mesmo
//!   contexto produz sempre o mesmo texto, byte a byte;
//! - `response`: extração de JSON de respostas livres (possivelmente em
//!   markdown, possivelmente malformadas) com fallback degradado — quem
//!   chama sempre recebe uma estrutura utilizável.

pub mod client;
pub mod prompt;
pub mod response;

pub use client::{generate_with_retry, TextGenerator};
pub use prompt::PromptBuilder;
pub use response::{
    extract_json, extract_severity, parse_insight, parse_report, sanitize, truncate,
    ExtractError, StructuredAnswer,
};
