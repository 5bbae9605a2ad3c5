use std::thread::{self, JoinHandle};

use libc::{SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use tracing::{info, warn};

use crate::error::{Result, SimError};
use crate::simulation::SimHandle;

// SIGINT / SIGTERM を受けたらシミュレーションを割り込みで止める
// drop するとシグナル待ちのスレッドも終了する
pub struct SignalGuard {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

pub fn forward(sim: SimHandle) -> Result<SignalGuard> {
    let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(SimError::Signal)?;
    let handle = signals.handle();

    let thread = thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            for sig in signals.forever() {
                info!(signal = sig, "received signal");
                match sim.interrupt() {
                    Ok(true) => {}
                    Ok(false) => info!("simulation already finished"),
                    Err(e) => warn!(error = %e, "could not interrupt simulation"),
                }
            }
        })
        .map_err(SimError::Signal)?;

    Ok(SignalGuard {
        handle,
        thread: Some(thread),
    })
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}
