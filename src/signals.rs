//! Cooperative interruption: SIGINT/SIGTERM raise a flag the engine
//! polls between transaction steps. Nothing is killed mid-step; a
//! running maintainer script gets to finish.

use signal_hook::consts::{SIGINT, SIGTERM};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub fn install_handlers() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    for sig in [SIGINT, SIGTERM] {
        // registration only fails for forbidden signals
        let _ = signal_hook::flag::register(sig, Arc::clone(&flag));
    }
    flag
}
