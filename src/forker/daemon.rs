use anyhow::{bail, Context, Result};
use std::fs::OpenOptions;
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::Path;

/// Turns the current process into a daemon and records its pid in `pid_file`.
///
/// Must run before the async runtime exists, forking a process with live
/// runtime threads leaves the child with only the forking thread.
pub fn detach(pid_file: &Path) -> Result<()> {
    let pid_file = std::env::current_dir()?.join(pid_file);

    fork_and_exit_parent()?;

    // SAFETY: setsid takes no arguments and only fails if we already lead a
    // process group, which a freshly forked child never does.
    if unsafe { libc::setsid() } < 0 {
        bail!("unable to start a new session: {}", io::Error::last_os_error());
    }

    // SAFETY: SIG_IGN is a valid disposition for SIGHUP and no handler
    // function pointer is installed.
    unsafe { libc::signal(libc::SIGHUP, libc::SIG_IGN) };

    // the session leader could reacquire a terminal, its child can't
    fork_and_exit_parent()?;

    std::env::set_current_dir("/")?;
    redirect_stdio()?;

    // SAFETY: same as SIGHUP above.
    unsafe { libc::signal(libc::SIGPIPE, libc::SIG_IGN) };

    std::fs::write(&pid_file, format!("{}\n", std::process::id()))
        .with_context(|| format!("unable to write pid file {}", pid_file.display()))?;

    Ok(())
}

fn fork_and_exit_parent() -> Result<()> {
    // SAFETY: no runtime threads exist yet, the child continues with a copy of
    // a single-threaded process.
    match unsafe { libc::fork() } {
        -1 => bail!("unable to fork: {}", io::Error::last_os_error()),
        0 => Ok(()),
        _ => std::process::exit(0),
    }
}

fn redirect_stdio() -> Result<()> {
    let null = OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/null")?;

    for fd in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        // SAFETY: both descriptors are open, dup2 atomically replaces `fd`.
        if unsafe { libc::dup2(null.as_raw_fd(), fd) } < 0 {
            bail!("unable to redirect fd {fd}: {}", io::Error::last_os_error());
        }
    }

    Ok(())
}
