//! Realtime scheduling for timing-critical sections

use crate::error::{LinkError, Result};

/// Default `SCHED_FIFO` priority for capture loops
pub const DEFAULT_PRIORITY: i32 = 50;

/// Runs the current thread under `SCHED_FIFO` until dropped
///
/// The previous policy is restored on drop.
#[derive(Debug)]
pub struct RealtimeGuard {
    #[cfg(target_os = "linux")]
    previous_policy: libc::c_int,
    #[cfg(target_os = "linux")]
    previous_priority: libc::c_int,
}

#[cfg(target_os = "linux")]
impl RealtimeGuard {
    /// Switch the calling thread to `SCHED_FIFO` at `priority`
    pub fn enter(priority: i32) -> Result<Self> {
        // SAFETY: pid 0 is the calling thread; sched_getscheduler takes no pointers.
        let previous_policy = unsafe { libc::sched_getscheduler(0) };
        if previous_policy < 0 {
            return Err(LinkError::scheduling(std::io::Error::last_os_error().to_string()));
        }
        let mut previous = libc::sched_param { sched_priority: 0 };
        // SAFETY: `previous` is a valid, writable sched_param.
        if unsafe { libc::sched_getparam(0, &mut previous) } != 0 {
            return Err(LinkError::scheduling(std::io::Error::last_os_error().to_string()));
        }

        let param = libc::sched_param {
            sched_priority: priority,
        };
        // SAFETY: `param` outlives the call and is only read.
        if unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) } != 0 {
            return Err(LinkError::scheduling(format!(
                "SCHED_FIFO priority {}: {}",
                priority,
                std::io::Error::last_os_error()
            )));
        }
        log::info!("entered SCHED_FIFO at priority {}", priority);

        Ok(RealtimeGuard {
            previous_policy,
            previous_priority: previous.sched_priority,
        })
    }
}

#[cfg(target_os = "linux")]
impl Drop for RealtimeGuard {
    fn drop(&mut self) {
        let param = libc::sched_param {
            sched_priority: self.previous_priority,
        };
        // SAFETY: `param` outlives the call and is only read.
        if unsafe { libc::sched_setscheduler(0, self.previous_policy, &param) } != 0 {
            log::warn!(
                "failed to restore scheduling policy: {}",
                std::io::Error::last_os_error()
            );
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl RealtimeGuard {
    /// Realtime scheduling is only available on Linux
    pub fn enter(priority: i32) -> Result<Self> {
        Err(LinkError::scheduling(format!(
            "SCHED_FIFO priority {} unsupported on this platform",
            priority
        )))
    }
}
