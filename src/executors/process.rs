//! Handle de processo cancelável.
//!
//! O processo filho roda no seu próprio grupo de processos, então
//! [`ProcessHandle::kill`] alcança também os descendentes que ele criar.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::types::errors::EvaluatorError;

/// Tempo máximo para drenar os pipes depois que o processo terminou.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Resultado de um processo que terminou dentro do prazo.
#[derive(Debug)]
pub struct ProcessOutput {
    /// Status de saída.
    pub status: ExitStatus,

    /// stdout seguido de stderr.
    pub output: Vec<u8>,
}

impl ProcessOutput {
    /// Saída como texto (UTF-8 com substituição).
    pub fn output_lossy(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

/// Processo externo com dono único, prazo e encerramento forçado.
///
/// O handle garante que o filho é colhido (sem zumbis) em todos os
/// caminhos: término normal, prazo expirado, erro e drop.
pub struct ProcessHandle {
    child: Child,
    pgid: Option<i32>,
    stdout: Option<JoinHandle<Vec<u8>>>,
    stderr: Option<JoinHandle<Vec<u8>>>,
    reaped: bool,
}

impl ProcessHandle {
    /// Inicia `command` com stdout/stderr capturados e stdin fechado.
    pub fn spawn(mut command: Command) -> io::Result<Self> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn()?;

        // Com process_group(0) o pgid é o próprio pid do filho
        let pgid = if cfg!(unix) {
            child.id().and_then(|id| i32::try_from(id).ok())
        } else {
            None
        };

        let stdout = child.stdout.take().map(|pipe| tokio::spawn(drain(pipe)));
        let stderr = child.stderr.take().map(|pipe| tokio::spawn(drain(pipe)));

        Ok(Self {
            child,
            pgid,
            stdout,
            stderr,
            reaped: false,
        })
    }

    /// PID do processo, se ainda não foi colhido.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Espera o término por no máximo `deadline`.
    ///
    /// Se o prazo expirar, o grupo inteiro é morto e colhido antes de
    /// retornar [`EvaluatorError::Timeout`].
    pub async fn wait(&mut self, deadline: Duration) -> Result<ProcessOutput, EvaluatorError> {
        match tokio::time::timeout(deadline, self.child.wait()).await {
            Ok(Ok(status)) => {
                self.reaped = true;
                self.kill_stragglers();
                let output = self.collect().await;
                Ok(ProcessOutput { status, output })
            }
            Ok(Err(e)) => {
                self.kill();
                self.reap().await;
                Err(EvaluatorError::Spawn(e))
            }
            Err(_) => {
                tracing::debug!(pid = ?self.pgid, ?deadline, "Deadline elapsed, killing process group");
                self.kill();
                self.reap().await;
                Err(EvaluatorError::Timeout(deadline))
            }
        }
    }

    /// Envia SIGKILL ao grupo de processos e ao filho.
    ///
    /// Idempotente: o grupo recebe o sinal no máximo uma vez e chamadas
    /// depois que o filho foi colhido não têm efeito sobre ele.
    pub fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            signal_group(pgid);
        }
        if !self.reaped {
            if let Err(e) = self.child.start_kill() {
                tracing::trace!(error = %e, "start_kill on already exited child");
            }
        }
    }

    /// Mata descendentes que sobreviveram a um líder já colhido.
    ///
    /// Eles seguram os pipes abertos. Com o líder colhido, o pgid só segue
    /// reservado enquanto algum membro do grupo vive; por isso o grupo é
    /// sondado com o sinal 0 antes do SIGKILL e, vazio, não recebe nada.
    /// Resta a janela entre sondagem e sinal, em que o grupo precisaria
    /// esvaziar e o id ser reaproveitado por outro grupo.
    fn kill_stragglers(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            if group_alive(pgid) {
                tracing::debug!(pgid, "Killing leftover descendants of the evaluator");
                signal_group(pgid);
            }
        }
    }

    async fn reap(&mut self) {
        match self.child.wait().await {
            Ok(_) => self.reaped = true,
            Err(e) => tracing::warn!(error = %e, "Failed to reap evaluator process"),
        }
        for task in [self.stdout.take(), self.stderr.take()].into_iter().flatten() {
            task.abort();
        }
    }

    async fn collect(&mut self) -> Vec<u8> {
        let mut output = Vec::new();
        for task in [self.stdout.take(), self.stderr.take()].into_iter().flatten() {
            match tokio::time::timeout(DRAIN_GRACE, task).await {
                Ok(Ok(bytes)) => output.extend_from_slice(&bytes),
                Ok(Err(e)) => tracing::warn!(error = %e, "Output reader task failed"),
                Err(elapsed) => tracing::warn!(%elapsed, "Output pipe still open after exit"),
            }
        }
        output
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        // kill_on_drop cobre o filho direto; o grupo precisa do sinal explícito
        if !self.reaped {
            self.kill();
        }
        for task in [self.stdout.take(), self.stderr.take()].into_iter().flatten() {
            task.abort();
        }
    }
}

async fn drain<R: AsyncRead + Unpin>(mut pipe: R) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Err(e) = pipe.read_to_end(&mut buf).await {
        tracing::debug!(error = %e, "Error reading evaluator output");
    }
    buf
}

#[cfg(unix)]
fn signal_group(pgid: i32) {
    // SAFETY: killpg só recebe inteiros e não toca memória do processo.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        // ESRCH: o grupo já não tem membros
        if err.raw_os_error() != Some(libc::ESRCH) {
            tracing::warn!(pgid, error = %err, "Failed to kill process group");
        }
    }
}

#[cfg(not(unix))]
fn signal_group(_pgid: i32) {}

/// Retorna `true` se o grupo ainda tem membros que podemos sinalizar.
#[cfg(unix)]
fn group_alive(pgid: i32) -> bool {
    // SAFETY: sinal 0 só verifica existência e permissão.
    unsafe { libc::killpg(pgid, 0) == 0 }
}

#[cfg(not(unix))]
fn group_alive(_pgid: i32) -> bool {
    false
}
