use std::thread::JoinHandle;

#[cfg(target_os = "linux")]
use std::ffi::CString;
#[cfg(target_os = "linux")]
use std::io::ErrorKind;
#[cfg(target_os = "linux")]
use std::sync::atomic::AtomicBool;

/// Spawns a named OS thread. The name shows up in `/proc` and thread dumps,
/// which is the only sane way to tell a dozen governor threads apart.
pub fn start<F>(name: &str, f: F) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    let thread_name = name.to_string();
    std::thread::Builder::new()
        .name(thread_name.clone())
        .spawn(move || {
            set_name(&thread_name);
            f()
        })
        .expect("spawn thread")
}

#[cfg(target_os = "linux")]
pub fn set_name(name: &str) {
    let cstr = CString::new(name).expect("not a cstring in set_thread_name");

    unsafe {
        libc::pthread_setname_np(libc::pthread_self(), cstr.as_ptr());
    }
}

#[cfg(not(target_os = "linux"))]
pub fn set_name(_name: &str) {}

#[cfg(target_os = "linux")]
pub fn set_realtime_priority() {
    let rc = unsafe {
        libc::sched_setscheduler(
            0,
            libc::SCHED_FIFO,
            &libc::sched_param { sched_priority: 99 },
        )
    };

    if rc < 0 {
        static WARNED: AtomicBool = AtomicBool::new(false);
        let warned = WARNED.swap(true, std::sync::atomic::Ordering::Relaxed);

        if !warned {
            let err = std::io::Error::last_os_error();

            log::warn!("failed to set realtime thread priority: {err}");

            if err.kind() == ErrorKind::PermissionDenied {
                let path = std::env::current_exe().map(|path| path.display().to_string());

                let path = path
                    .as_ref()
                    .map(|path| path.as_str())
                    .unwrap_or("path/to/scurry");

                log::warn!("fix by running: setcap cap_sys_nice=ep {path}")
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub fn set_realtime_priority() {}
