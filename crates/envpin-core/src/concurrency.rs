use crate::CoreError;
use envpin_store::StoreLayout;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Exclusive hold on a whole store.
///
/// `forget` and `verify-store` take it so an audit never observes an entry
/// half way through eviction. Resolution does not: the lock store serializes
/// writes per entry and reads need no lock.
pub struct StoreLock {
    file: File,
}

impl StoreLock {
    /// Block until no other process or thread holds the store.
    pub fn acquire(layout: &StoreLayout) -> Result<Self, CoreError> {
        std::fs::create_dir_all(layout.store_dir())?;
        let path = layout.lock_file();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        file.lock_exclusive()?;
        debug!("holding store lock {}", path.display());
        Ok(Self { file })
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            warn!("failed to release store lock: {e}");
        }
    }
}

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Route Ctrl-C into the interrupt flag. A second Ctrl-C exits at once.
pub fn install_signal_handler() {
    let installed = ctrlc::set_handler(|| {
        if INTERRUPTED.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        eprintln!("\ninterrupted, no lock entry will be written");
    });
    if let Err(e) = installed {
        warn!("interrupt handler not installed: {e}");
    }
}

pub fn interrupt_requested() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// `Err(CoreError::Interrupted)` once Ctrl-C has been received.
pub fn check_interrupted() -> Result<(), CoreError> {
    if interrupt_requested() {
        return Err(CoreError::Interrupted);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn acquire_creates_lock_file_in_fresh_store() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path().join("never-opened"));
        let _lock = StoreLock::acquire(&layout).unwrap();
        assert!(layout.lock_file().exists());
    }

    #[test]
    fn holders_run_one_at_a_time() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        let held = StoreLock::acquire(&layout).unwrap();

        let entered = Arc::new(AtomicUsize::new(0));
        let waiter = {
            let layout = layout.clone();
            let entered = Arc::clone(&entered);
            thread::spawn(move || {
                let _lock = StoreLock::acquire(&layout).unwrap();
                entered.fetch_add(1, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(100));
        assert_eq!(entered.load(Ordering::SeqCst), 0);
        drop(held);
        waiter.join().unwrap();
        assert_eq!(entered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn not_interrupted_by_default() {
        assert!(!interrupt_requested());
        assert!(check_interrupted().is_ok());
    }
}
