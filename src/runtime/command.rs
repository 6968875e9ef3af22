// file: src/runtime/command.rs
// description: model runtime backed by an external inference worker process
// reference: subprocess invocation with sysexits-style status codes

use crate::config::ModelConfig;
use crate::error::{PipelineError, Result};
use crate::models::Payload;
use crate::runtime::{ModelRuntime, RuntimeError};
use crate::utils::Validator;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const EX_DATAERR: i32 = 65;
const EX_UNAVAILABLE: i32 = 69;
const EX_TEMPFAIL: i32 = 75;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const STDERR_PREVIEW_CHARS: usize = 400;

/// Runs `<command...> --weights <path>` once per inference call, writing the
/// request JSON to stdin and reading the response JSON from stdout.
#[derive(Debug)]
pub struct CommandRuntime {
    name: String,
    program: String,
    args: Vec<String>,
    weights_path: PathBuf,
    fingerprint: String,
    kill_after: Duration,
}

impl CommandRuntime {
    pub fn load(name: &str, config: &ModelConfig, kill_after: Duration) -> Result<Self> {
        let weights_path = config.weights_path.clone();

        Validator::validate_weights_file(&weights_path).map_err(|e| PipelineError::ModelLoad {
            path: weights_path.clone(),
            message: e.to_string(),
        })?;

        let (program, args) = config.command.split_first().ok_or_else(|| {
            PipelineError::Config(format!("models.{}.command is empty", name))
        })?;

        let fingerprint =
            Self::fingerprint_file(&weights_path).map_err(|e| PipelineError::ModelLoad {
                path: weights_path.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            name: name.to_string(),
            program: program.clone(),
            args: args.to_vec(),
            weights_path,
            fingerprint,
            kill_after,
        })
    }

    pub fn weights_path(&self) -> &Path {
        &self.weights_path
    }

    pub fn short_fingerprint(&self) -> &str {
        &self.fingerprint[..self.fingerprint.len().min(12)]
    }

    fn fingerprint_file(path: &Path) -> io::Result<String> {
        let mut file = File::open(path)?;
        let mut hasher = Sha256::new();
        io::copy(&mut file, &mut hasher)?;
        Ok(format!("{:x}", hasher.finalize()))
    }

    fn spawn(&self) -> io::Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .arg("--weights")
            .arg(&self.weights_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
    }

    fn wait_with_deadline(&self, child: &mut Child) -> std::result::Result<ExitStatus, RuntimeError> {
        let deadline = Instant::now() + self.kill_after;

        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) if Instant::now() >= deadline => {
                    warn!(
                        "{} inference worker exceeded {:?}, killing it",
                        self.name, self.kill_after
                    );
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(RuntimeError::DeadlineExceeded(self.kill_after));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    return Err(RuntimeError::Internal(format!(
                        "failed to wait for inference worker: {}",
                        e
                    )));
                }
            }
        }
    }

    fn classify_exit(status: ExitStatus, stderr: &str) -> RuntimeError {
        let detail = Validator::truncate_text(stderr.trim(), STDERR_PREVIEW_CHARS);

        match status.code() {
            Some(EX_DATAERR) => RuntimeError::MalformedInput(detail),
            Some(EX_UNAVAILABLE) => RuntimeError::Unavailable(detail),
            Some(EX_TEMPFAIL) => RuntimeError::ResourceExhausted(detail),
            Some(code) => RuntimeError::Rejected(format!("exit code {}: {}", code, detail)),
            None => RuntimeError::ResourceExhausted(format!("terminated by signal: {}", detail)),
        }
    }
}

fn read_pipe<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf)?;
        }
        Ok(buf)
    })
}

impl ModelRuntime for CommandRuntime {
    fn name(&self) -> &str {
        &self.name
    }

    fn fingerprint(&self) -> Option<&str> {
        Some(&self.fingerprint)
    }

    fn infer(&self, payload: &Payload) -> std::result::Result<Payload, RuntimeError> {
        let request =
            serde_json::to_vec(payload).map_err(|e| RuntimeError::MalformedInput(e.to_string()))?;

        let mut child = self.spawn().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                RuntimeError::Internal(format!("cannot start {}: {}", self.program, e))
            }
            _ => RuntimeError::ResourceExhausted(format!("cannot start {}: {}", self.program, e)),
        })?;

        let stdin = child.stdin.take();
        let writer = thread::spawn(move || -> io::Result<()> {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&request)?;
            }
            Ok(())
        });
        let stdout = read_pipe(child.stdout.take());
        let stderr = read_pipe(child.stderr.take());

        let status = self.wait_with_deadline(&mut child)?;

        if let Ok(Err(e)) = writer.join() {
            // The worker may exit before draining stdin; its status decides.
            debug!("{} stdin write ended early: {}", self.name, e);
        }

        let stdout = stdout
            .join()
            .map_err(|_| RuntimeError::Internal("stdout reader panicked".to_string()))?
            .map_err(|e| RuntimeError::Internal(format!("failed to read stdout: {}", e)))?;
        let stderr = stderr
            .join()
            .ok()
            .and_then(|r| r.ok())
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .unwrap_or_default();

        if !status.success() {
            return Err(Self::classify_exit(status, &stderr));
        }

        serde_json::from_slice(&stdout).map_err(|e| {
            RuntimeError::Internal(format!("worker produced invalid JSON: {}", e))
        })
    }
}
