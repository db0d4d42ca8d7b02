mod journal;

pub use self::journal::parse_record;

use crossbeam_channel::Sender;
use std::io::{self, BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use crate::event::RawEvent;
use crate::shutdown::Shutdown;

const CHILD_POLL: Duration = Duration::from_millis(500);

/// Follows the system journal through a child process and forwards every
/// parsed record.
#[derive(Clone, Debug)]
pub struct Collector {
    command: Vec<String>,
    restart_delay: Duration,
}

impl Collector {
    #[must_use]
    pub fn new(command: Vec<String>, restart_delay: Duration) -> Self {
        Self {
            command,
            restart_delay,
        }
    }

    /// Runs until shutdown. The child is restarted whenever it exits; a
    /// missing executable stops the collector for good.
    pub fn run(&self, output: &Sender<RawEvent>, shutdown: &Shutdown) {
        log::info!("collector watching: {}", self.command.join(" "));
        while !shutdown.is_triggered() {
            match self.follow(output, shutdown) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    log::error!("command not found: {}", self.program());
                    break;
                }
                Err(e) => log::error!("collector error: {}", e),
            }
            if shutdown.wait(self.restart_delay) {
                break;
            }
            log::warn!("restarting {}", self.program());
        }
        log::info!("collector stopped");
    }

    fn program(&self) -> &str {
        self.command.first().map_or("", String::as_str)
    }

    fn follow(&self, output: &Sender<RawEvent>, shutdown: &Shutdown) -> io::Result<()> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "empty collector command"))?;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "child stdout unavailable"))?;

        let sender = output.clone();
        let reader = thread::Builder::new()
            .name("collector-reader".into())
            .spawn(move || forward_lines(BufReader::new(stdout), &sender))?;

        let result = supervise(&mut child, shutdown);
        if reader.join().is_err() {
            log::error!("collector reader panicked");
        }
        result
    }
}

fn supervise(child: &mut Child, shutdown: &Shutdown) -> io::Result<()> {
    loop {
        if shutdown.wait(CHILD_POLL) {
            stop_child(child);
            return Ok(());
        }
        if let Some(status) = child.try_wait()? {
            log::warn!("collector subprocess ended unexpectedly ({})", status);
            return Ok(());
        }
    }
}

fn stop_child(child: &mut Child) {
    if let Err(e) = child.kill() {
        log::debug!("collector subprocess already gone: {}", e);
    }
    if let Err(e) = child.wait() {
        log::warn!("could not reap collector subprocess: {}", e);
    }
}

/// Parses lines until the stream ends or the receiver hangs up. Returns the
/// number of events forwarded.
pub fn forward_lines<R: BufRead>(reader: R, output: &Sender<RawEvent>) -> usize {
    let mut forwarded = 0;
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log::warn!("unreadable collector line: {}", e);
                continue;
            }
        };
        if let Some(event) = parse_record(&line) {
            if output.send(event).is_err() {
                break;
            }
            forwarded += 1;
        }
    }
    forwarded
}
