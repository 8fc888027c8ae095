//! Process tree termination
//!
//! Killing only the direct child leaves behind any helpers it forked (git spawns
//! `ssh`, credential helpers, `remote-https`, ...). Commands are started as the
//! leader of their own process group, so on Unix the whole group is signalled.

use std::io;

use tokio::process::Child;

/// Forcibly terminates a spawned child together with everything it started.
///
/// `pid` is the leader's pid recorded at spawn time; it stays valid as the
/// group id even after the leader itself has exited and been reaped.
pub trait ProcessTreeKiller: Send + Sync {
    fn terminate(&self, pid: u32, child: &mut Child) -> io::Result<()>;
}

/// Sends `SIGKILL` to the child's process group
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessGroupKiller;

#[cfg(unix)]
impl ProcessTreeKiller for ProcessGroupKiller {
    fn terminate(&self, pid: u32, _child: &mut Child) -> io::Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let pgid = i32::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;

        match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
            // Group already gone between the deadline and the signal
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(io::Error::from(errno)),
        }
    }
}

/// Kills only the direct child. Used where process groups are unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectChildKiller;

impl ProcessTreeKiller for DirectChildKiller {
    fn terminate(&self, _pid: u32, child: &mut Child) -> io::Result<()> {
        // `None` once the child has been reaped; nothing left to signal
        if child.id().is_none() {
            return Ok(());
        }
        child.start_kill()
    }
}

/// The strongest termination strategy available on this platform
pub fn platform_killer() -> Box<dyn ProcessTreeKiller> {
    #[cfg(unix)]
    {
        Box::new(ProcessGroupKiller)
    }
    #[cfg(not(unix))]
    {
        Box::new(DirectChildKiller)
    }
}
