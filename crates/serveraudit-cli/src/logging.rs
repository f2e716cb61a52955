//! `env_logger` setup: one line per record in the append-only audit log,
//! optionally echoed to stderr.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use env_logger::{Builder, Target};
use log::LevelFilter;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Writes every record to the log file and, when `echo` is set, to stderr.
struct Tee {
    file: File,
    echo: bool,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write_all(buf)?;
        if self.echo {
            // A closed stderr must not stop file logging.
            let _ = io::stderr().write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.echo {
            let _ = io::stderr().flush();
        }
        Ok(())
    }
}

fn builder(verbose: bool) -> Builder {
    let mut builder = Builder::new();
    builder.filter_level(if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });
    builder.parse_default_env();
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} | {:<7} | {} | {}",
            chrono::Local::now().format(TIMESTAMP_FORMAT),
            record.level(),
            record.target(),
            record.args()
        )
    });
    builder
}

/// Log to `log_file` (created with its parent directory if missing).
pub fn init(log_file: &Path, verbose: bool) -> io::Result<()> {
    if let Some(dir) = log_file.parent() {
        fs::create_dir_all(dir)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(log_file)?;
    builder(verbose)
        .target(Target::Pipe(Box::new(Tee {
            file,
            echo: verbose,
        })))
        .try_init()
        .map_err(io::Error::other)
}

/// Fallback when the log file cannot be opened.
pub fn init_stderr(verbose: bool) {
    let _ = builder(verbose).target(Target::Stderr).try_init();
}
