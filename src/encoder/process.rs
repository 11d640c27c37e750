//! Child process with a piped standard input.
//!
//! This is the only place that touches `std::process` for the encoder; the
//! session logic above it is platform independent.

use std::io;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A spawned child whose stdin is held by the parent.
#[derive(Debug)]
pub struct PipedChild {
    child: Child,
    stdin: Option<ChildStdin>,
}

fn hide_console(command: &mut Command) {
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        command.creation_flags(CREATE_NO_WINDOW);
    }
    #[cfg(not(windows))]
    let _ = command;
}

/// Run `command` to completion with all streams discarded.
///
/// Returns true only if it could be started and exited successfully.
pub fn runs_successfully(mut command: Command) -> bool {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    hide_console(&mut command);
    command.status().map(|s| s.success()).unwrap_or(false)
}

impl PipedChild {
    /// Spawn `command` with stdin piped and stdout/stderr discarded.
    pub fn spawn(mut command: Command) -> io::Result<Self> {
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        hide_console(&mut command);

        let mut child = command.spawn()?;
        let stdin = child.stdin.take();
        Ok(Self { child, stdin })
    }

    /// Write end of the child's stdin, `None` once closed.
    pub fn input(&mut self) -> Option<&mut ChildStdin> {
        self.stdin.as_mut()
    }

    /// Close stdin, signalling end of stream to the child.
    pub fn close_input(&mut self) {
        self.stdin = None;
    }

    /// True if the child has exited (and has been reaped).
    pub fn has_exited(&mut self) -> bool {
        !matches!(self.child.try_wait(), Ok(None))
    }

    /// Poll for exit for at most `timeout`. `Ok(None)` means still running.
    pub fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<ExitStatus>> {
        let start = Instant::now();
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Ok(Some(status));
            }
            if start.elapsed() >= timeout {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Ask the child to stop the way Ctrl+C would.
    ///
    /// On Unix this is SIGINT. Elsewhere there is no equivalent and the
    /// child is killed outright.
    pub fn interrupt(&mut self) {
        #[cfg(unix)]
        {
            unsafe {
                libc::kill(self.child.id() as libc::pid_t, libc::SIGINT);
            }
        }

        #[cfg(not(unix))]
        {
            let _ = self.child.kill();
        }
    }

    /// Force-kill and reap.
    pub fn kill(&mut self) -> io::Result<ExitStatus> {
        let _ = self.child.kill();
        self.child.wait()
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }
}
