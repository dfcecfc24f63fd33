//! Engines backed by a program that reads markdown on stdin and writes HTML
//! on stdout.

use std::env;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::{Engine, EngineError};
use crate::encoding::TextEncoding;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// A command-line markdown engine.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    id: String,
    argv: Vec<String>,
    timeout: Option<Duration>,
    encoding: TextEncoding,
}

impl CommandEngine {
    /// Creates an engine running `argv`. The argument vector must not be
    /// empty.
    pub fn new<I, S>(id: impl Into<String>, argv: I) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = id.into();
        let argv: Vec<String> = argv.into_iter().map(Into::into).collect();
        if argv.is_empty() {
            return Err(EngineError::EmptyCommand { id });
        }
        Ok(Self {
            id,
            argv,
            timeout: None,
            encoding: TextEncoding::Utf8,
        })
    }

    /// Kills the program if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the encoding of the program's stdin and stdout.
    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// The program name or path.
    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    fn io_error(&self, error: impl ToString) -> EngineError {
        EngineError::Io {
            program: self.program().to_string(),
            error: error.to_string(),
        }
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus, EngineError> {
        let Some(timeout) = self.timeout else {
            return child.wait().map_err(|e| self.io_error(e));
        };

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait().map_err(|e| self.io_error(e))? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                // Already exited between the two calls is fine too.
                let _ = child.kill();
                let _ = child.wait();
                return Err(EngineError::Timeout {
                    program: self.program().to_string(),
                    after: timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Engine for CommandEngine {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_available(&self) -> bool {
        find_executable(self.program()).is_some()
    }

    fn render(&self, input: &str) -> Result<String, EngineError> {
        let payload = self.encoding.encode(input)?;

        let mut child = Command::new(self.program())
            .args(&self.argv[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EngineError::Spawn {
                program: self.program().to_string(),
                error: e.to_string(),
            })?;

        // Stdin is fed from its own thread so a program that writes before it
        // has read everything cannot deadlock against us.
        let writer = child.stdin.take().map(|mut stdin| {
            thread::spawn(move || match stdin.write_all(&payload) {
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                other => other,
            })
        });
        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let status = self.wait(&mut child)?;

        if let Some(writer) = writer {
            writer
                .join()
                .map_err(|_| self.io_error("stdin writer panicked"))?
                .map_err(|e| self.io_error(e))?;
        }
        let stdout = join_reader(stdout).map_err(|e| self.io_error(e))?;
        let stderr = join_reader(stderr).map_err(|e| self.io_error(e))?;

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr).trim().to_string();
            tracing::debug!(engine = %self.id, %status, "Engine exited unsuccessfully");
            return Err(EngineError::CommandFailed {
                status: status
                    .code()
                    .map_or_else(|| "signal".to_string(), |code| code.to_string()),
                stderr,
            });
        }

        Ok(self.encoding.decode(&stdout)?)
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut source: R) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        source.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn join_reader(handle: Option<JoinHandle<io::Result<Vec<u8>>>>) -> io::Result<Vec<u8>> {
    match handle {
        Some(handle) => handle
            .join()
            .map_err(|_| io::Error::other("output reader panicked"))?,
        None => Ok(Vec::new()),
    }
}

/// Resolves a program the way a shell would: names containing a path
/// separator are used as is, anything else is searched on `PATH`.
pub fn find_executable(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|path| is_executable(path))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    fs::metadata(path).map(|meta| meta.is_file()).unwrap_or(false)
        || fs::metadata(path.with_extension("exe"))
            .map(|meta| meta.is_file())
            .unwrap_or(false)
}
