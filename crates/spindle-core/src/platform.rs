//! # Platform Seam
//!
//! The runtime's view of the machine: which cores exist, which core is the
//! master, and how to pin and name reactor threads. Production code uses
//! [`OsPlatform`]; tests substitute deterministic implementations so mask
//! filtering and lifecycle behavior don't depend on the build host's CPU
//! count.
//!
//! The external timer facility is abstracted the same way: the reactor loop
//! calls [`TimerDriver::manage_expired`] exactly once per iteration and
//! assumes nothing about what it does.

/// Machine facts and thread side effects the runtime depends on.
pub trait Platform: Send + Sync {
    /// The core `start` pins the calling thread to and runs inline.
    fn master_core(&self) -> u32;

    /// Whether logical core `core` exists and may host a reactor. Mask bits
    /// for cores where this is false are cleared silently at init.
    fn is_core_enabled(&self, core: u32) -> bool;

    /// Pins the calling thread to `core`. Best-effort: implementations log
    /// a failure rather than fail the runtime, since placement is a side
    /// effect and not a correctness property.
    fn pin_current_thread(&self, core: u32);

    /// Names the calling thread for diagnostics. Best-effort.
    fn set_current_thread_name(&self, name: &str);
}

/// Hook for the external timer facility, invoked once per reactor iteration.
pub trait TimerDriver: Send + Sync {
    /// Fires whatever timers have expired on the calling core.
    fn manage_expired(&self);
}

/// Timer driver that never fires anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTimers;

impl TimerDriver for NoopTimers {
    fn manage_expired(&self) {}
}

/// Platform backed by the operating system.
///
/// Logical cores `0..n` are enabled, where `n` is the smaller of the online
/// CPU count and the 64-core mask width. The master core defaults to 0.
#[derive(Debug, Clone)]
pub struct OsPlatform {
    master_core: u32,
    online_cores: u32,
}

impl OsPlatform {
    /// Detects the online-core count; master core 0.
    #[must_use]
    pub fn new() -> Self {
        Self::with_master_core(0)
    }

    /// Detects the online-core count with an explicit master core.
    #[must_use]
    pub fn with_master_core(master_core: u32) -> Self {
        let online = num_cpus::get().min(crate::MAX_CORES as usize);
        Self {
            master_core,
            online_cores: u32::try_from(online).unwrap_or(crate::MAX_CORES),
        }
    }
}

impl Default for OsPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for OsPlatform {
    fn master_core(&self) -> u32 {
        self.master_core
    }

    fn is_core_enabled(&self, core: u32) -> bool {
        core < self.online_cores
    }

    fn pin_current_thread(&self, core: u32) {
        if let Err(message) = set_cpu_affinity(core) {
            tracing::warn!("failed to pin reactor thread to core {core}: {message}");
        }
    }

    fn set_current_thread_name(&self, name: &str) {
        set_thread_name(name);
    }
}

/// Pins the calling thread to a single CPU.
fn set_cpu_affinity(core: u32) -> Result<(), String> {
    #[cfg(target_os = "linux")]
    {
        use std::mem;

        // SAFETY: We're calling libc functions with valid parameters. The
        // cpu_set_t is properly initialized with CPU_ZERO, and pid 0 refers
        // to the calling thread.
        #[allow(unsafe_code)]
        unsafe {
            let mut set: libc::cpu_set_t = mem::zeroed();
            libc::CPU_ZERO(&mut set);
            libc::CPU_SET(core as usize, &mut set);

            let rc = libc::sched_setaffinity(0, mem::size_of::<libc::cpu_set_t>(), &set);
            if rc != 0 {
                return Err(format!(
                    "sched_setaffinity failed: {}",
                    std::io::Error::last_os_error()
                ));
            }
        }
        Ok(())
    }

    #[cfg(target_os = "windows")]
    {
        use winapi::shared::basetsd::DWORD_PTR;
        use winapi::um::processthreadsapi::GetCurrentThread;
        use winapi::um::winbase::SetThreadAffinityMask;

        // SAFETY: GetCurrentThread returns a pseudo-handle that needs no
        // cleanup; the mask selects a single valid CPU.
        #[allow(unsafe_code)]
        unsafe {
            let mask: DWORD_PTR = 1 << core;
            if SetThreadAffinityMask(GetCurrentThread(), mask) == 0 {
                return Err(format!(
                    "SetThreadAffinityMask failed: {}",
                    std::io::Error::last_os_error()
                ));
            }
        }
        Ok(())
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        let _ = core;
        Ok(())
    }
}

/// Sets the calling thread's OS-visible name, truncated to the platform
/// limit.
fn set_thread_name(name: &str) {
    #[cfg(target_os = "linux")]
    {
        // prctl limits names to 15 bytes plus the terminator.
        let mut bytes: Vec<u8> = name.bytes().take(15).collect();
        bytes.push(0);
        // SAFETY: `bytes` is a valid NUL-terminated buffer that outlives the
        // call.
        #[allow(unsafe_code)]
        unsafe {
            libc::prctl(libc::PR_SET_NAME, bytes.as_ptr());
        }
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = name;
    }
}
