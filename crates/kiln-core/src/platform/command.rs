//! Running external tools

use crate::error::IoContext;
use crate::{Error, Result};
use std::ffi::{OsStr, OsString};
use std::process::{Command, Stdio};
use tracing::{debug, trace};

/// Run `program` with `args` and return its standard output.
///
/// The program is looked up on `PATH` first. A non-zero exit becomes
/// [`Error::Command`] carrying the exit status and standard error.
pub fn capture<I, S>(program: &str, args: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let path = which::which(program).map_err(|_| Error::ToolNotFound(program.to_string()))?;
    let args: Vec<OsString> = args
        .into_iter()
        .map(|arg| arg.as_ref().to_os_string())
        .collect();
    debug!("Running {} {:?}", program, args);

    let output = Command::new(&path)
        .args(&args)
        .stdin(Stdio::null())
        .output()
        .at("spawn", &path)?;

    if !output.status.success() {
        return Err(Error::Command {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output.stdout)
}

/// Run `program` with `args`, logging its output at trace level
pub fn run<I, S>(program: &str, args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let stdout = capture(program, args)?;
    for line in String::from_utf8_lossy(&stdout).lines() {
        trace!("{}: {}", program, line);
    }
    Ok(())
}
