//! Avaliador externo com prazo.
//!
//! Este módulo contém o trait [`Evaluator`], o handle de processo
//! cancelável usado para impor o prazo e a implementação para a CLI
//! `jsonnet`.

mod base;
mod jsonnet;
mod process;

pub use base::Evaluator;
pub use jsonnet::JsonnetExecutor;
pub use process::{ProcessHandle, ProcessOutput};
