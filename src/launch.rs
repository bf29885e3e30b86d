use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use argh::FromArgs;
use exitcode::ExitCode;
use tail::{Error, Harvester, LogFile};
use tokio::runtime::Runtime;
use tripwire::Tripwire;

use crate::config::Config;
use crate::trace;

#[derive(FromArgs)]
#[argh(
    description = "Follow a log file, and write everything appended to it to stdout",
    help_triggers("-h", "--help")
)]
pub struct RootCommand {
    #[argh(
        option,
        short = 'c',
        long = "config",
        description = "read configuration from a YAML file"
    )]
    config: Option<PathBuf>,

    #[argh(
        option,
        short = 'l',
        default = "\"info\".to_string()",
        description = "log level"
    )]
    log_level: String,

    #[argh(positional, description = "the file to follow")]
    path: PathBuf,
}

impl RootCommand {
    pub fn run(&self) -> Result<(), ExitCode> {
        let log_level = std::env::var("FILESTREAM_LOG").unwrap_or(self.log_level.clone());
        let color = std::io::stderr().is_terminal();
        trace::init(color, &log_level);

        let config = match &self.config {
            Some(path) => Config::load(path).map_err(|err| {
                error!(
                    message = "Load config failed",
                    ?path,
                    %err,
                );

                exitcode::CONFIG
            })?,
            None => Config::default(),
        };

        let runtime = build_runtime().map_err(|err| {
            error!(message = "Build runtime failed", %err);
            exitcode::OSERR
        })?;

        runtime.block_on(self.follow(config))
    }

    /// Read the file until it is closed. A truncated file is read again from
    /// the beginning.
    async fn follow(&self, config: Config) -> Result<(), ExitCode> {
        let (trigger, tripwire) = Tripwire::new("filestream");
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(message = "Listen for ctrl-c failed", %err);
                return;
            }

            info!(message = "Interrupt received, stop reading");
            trigger.cancel();
        });

        let harvester_config = config.harvester();
        let mut buf = vec![0u8; config.buffer_size];
        let mut offset = config.offset;

        info!(
            message = "Start following",
            path = ?self.path,
            offset,
        );

        loop {
            let file = LogFile::open(&self.path, offset).map_err(|err| {
                error!(
                    message = "Open file failed",
                    path = ?self.path,
                    offset,
                    %err,
                );

                exitcode::NOINPUT
            })?;

            let mut harvester = Harvester::new(file, &tripwire, &harvester_config).map_err(|err| {
                error!(message = "Start harvester failed", %err);
                exitcode::SOFTWARE
            })?;

            let result = copy(&mut harvester, &mut buf).await;
            if let Err(err) = harvester.close().await {
                warn!(
                    message = "Close file failed",
                    path = ?self.path,
                    %err,
                );
            }

            match result {
                Ok(()) => {
                    info!(
                        message = "End of file reached",
                        offset = harvester.offset(),
                    );

                    return Ok(());
                }
                Err(CopyError::Read(err @ Error::Truncated { .. })) => {
                    info!(
                        message = "Read file again from the beginning",
                        %err,
                    );

                    offset = 0;
                }
                Err(CopyError::Read(err @ (Error::Closed | Error::Inactive))) => {
                    info!(
                        message = "Stop following",
                        reason = %err,
                        offset = harvester.offset(),
                    );

                    return Ok(());
                }
                Err(CopyError::Read(err)) => {
                    error!(
                        message = "Read file failed",
                        path = ?self.path,
                        %err,
                    );

                    return Err(exitcode::IOERR);
                }
                Err(CopyError::Write(err)) => {
                    error!(message = "Write to stdout failed", %err);

                    return Err(exitcode::IOERR);
                }
            }
        }
    }
}

/// The signal driver comes with the IO driver, `ctrl_c` needs both.
fn build_runtime() -> io::Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .thread_name("filestream-worker")
        .worker_threads(2)
        .enable_io()
        .enable_time()
        .build()
}

enum CopyError {
    Read(Error),
    Write(io::Error),
}

/// Write everything read to stdout, until the harvester returns an error or
/// a terminal EOF.
async fn copy(harvester: &mut Harvester, buf: &mut [u8]) -> Result<(), CopyError> {
    loop {
        let n = harvester.read(buf).await.map_err(CopyError::Read)?;
        if n == 0 {
            return Ok(());
        }

        let mut stdout = io::stdout().lock();
        stdout
            .write_all(&buf[..n])
            .and_then(|_| stdout.flush())
            .map_err(CopyError::Write)?;
    }
}
