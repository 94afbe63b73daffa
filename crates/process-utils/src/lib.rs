//! External process helpers shared across the workspace.
//!
//! Every transform-engine and probe invocation goes through a [`ProcessRunner`].
//! The default implementation, [`CommandRunner`], spawns the tool with tokio,
//! forwards its diagnostic output into `tracing` line by line and resolves
//! successfully only when the child exits with status 0.

mod runner;

pub use runner::{CommandRunner, ProcessError, ProcessRunner};

use std::ffi::OsStr;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Create a `tokio::process::Command` that does not open a console window on Windows.
///
/// On non-Windows targets this is a plain `Command::new`.
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    #[allow(unused_mut)]
    let mut cmd = tokio::process::Command::new(program);
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        cmd.as_std_mut().creation_flags(CREATE_NO_WINDOW);
    }
    cmd
}
