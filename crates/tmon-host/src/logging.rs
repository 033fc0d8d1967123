use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};

use crate::HostConfig;

const LOG_FILE: &str = "tmon.log";

/// Destination of every log line: stdout when `echo` is set, plus
/// `tmon.log` once it could be opened. Clones share the file.
#[derive(Clone)]
struct LogSink {
    echo: bool,
    file: Option<Arc<Mutex<File>>>,
}

impl LogSink {
    /// Local mode draws on stdout, so it never echoes there.
    fn for_host(host: &HostConfig) -> Self {
        let file = match open_log_file(Path::new(&host.log_dir)) {
            Ok(file) => file,
            Err(err) => {
                eprintln!("tmon: cannot open {LOG_FILE} in {:?}: {err}", host.log_dir);
                None
            }
        };
        Self {
            echo: !host.local,
            file: file.map(|file| Arc::new(Mutex::new(file))),
        }
    }

    fn each_target(&mut self, mut write: impl FnMut(&mut dyn Write) -> io::Result<()>) {
        if self.echo {
            let _ = write(&mut io::stdout().lock());
        }
        if let Some(Ok(mut file)) = self.file.as_ref().map(|file| file.lock()) {
            let _ = write(&mut *file);
        }
    }
}

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.each_target(|target| target.write_all(buf));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.each_target(|target| target.flush());
        Ok(())
    }
}

/// `None` when no log directory is configured.
fn open_log_file(dir: &Path) -> io::Result<Option<File>> {
    if dir.as_os_str().is_empty() {
        return Ok(None);
    }
    std::fs::create_dir_all(dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(LOG_FILE))?;
    Ok(Some(file))
}

/// `--debug` wins, then `TMON_LOG_LEVEL`, then `info`.
fn default_level(debug: bool, configured: Option<String>) -> String {
    match configured {
        _ if debug => "debug".to_string(),
        Some(level) if !level.trim().is_empty() => level.trim().to_string(),
        _ => "info".to_string(),
    }
}

/// Installs the global subscriber. `RUST_LOG` overrides the level picked
/// by [`default_level`].
pub fn init_logging(host: &HostConfig) {
    let level = default_level(host.debug, std::env::var("TMON_LOG_LEVEL").ok());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let sink = LogSink::for_host(host);
    let ansi = sink.echo;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(ansi)
        .with_writer(BoxMakeWriter::new(move || sink.clone()))
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("tmon: a tracing subscriber was already installed");
    }
}
