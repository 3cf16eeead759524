use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicBool, Ordering},
};

/// Binary gate serializing list mutations against the worker thread that
/// rewrites their data sources.
pub type Gate = Arc<Mutex<()>>;

pub type GateGuard<'a> = MutexGuard<'a, ()>;

/// Cross-thread control shared between a list (or a group of lists) and the
/// thread feeding it. The gate is resolved once at construction: the shared
/// gate when one is supplied, a private one otherwise.
#[derive(Debug)]
pub struct ThreadControl {
    gate: Gate,
    update: AtomicBool,
    ready: AtomicBool,
}

impl ThreadControl {
    pub fn new(shared_gate: Option<Gate>) -> Arc<Self> {
        Arc::new(Self {
            gate: shared_gate.unwrap_or_default(),
            update: AtomicBool::new(false),
            ready: AtomicBool::new(false),
        })
    }

    pub fn private() -> Arc<Self> {
        Self::new(None)
    }

    pub fn shared_with(other: &ThreadControl) -> Arc<Self> {
        Self::new(Some(other.gate()))
    }

    pub fn gate(&self) -> Gate {
        Arc::clone(&self.gate)
    }

    pub fn shares_gate_with(&self, other: &ThreadControl) -> bool {
        Arc::ptr_eq(&self.gate, &other.gate)
    }

    /// A worker that panicked while holding the gate leaves nothing half
    /// written that the UI could not redraw, so poisoning is ignored.
    pub fn lock(&self) -> GateGuard<'_> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn request_update(&self) {
        self.update.store(true, Ordering::Release);
    }

    pub fn take_update(&self) -> bool {
        self.update.swap(false, Ordering::AcqRel)
    }

    pub fn update_pending(&self) -> bool {
        self.update.load(Ordering::Acquire)
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn private_controls_do_not_share_gates() {
        let a = ThreadControl::private();
        let b = ThreadControl::private();
        assert!(!a.shares_gate_with(&b));
        let c = ThreadControl::shared_with(&a);
        assert!(a.shares_gate_with(&c));
    }

    #[test]
    fn update_flag_is_consumed_once() {
        let control = ThreadControl::private();
        assert!(!control.take_update());
        control.request_update();
        assert!(control.update_pending());
        assert!(control.take_update());
        assert!(!control.take_update());
    }

    #[test]
    fn shared_gate_excludes_other_holders() {
        let a = ThreadControl::private();
        let b = ThreadControl::shared_with(&a);
        let guard = a.lock();
        let gate = b.gate();
        let contender = thread::spawn(move || gate.try_lock().is_err());
        assert!(contender.join().unwrap());
        drop(guard);
        assert!(b.gate().try_lock().is_ok());
    }

    #[test]
    fn poisoned_gate_still_locks() {
        let control = ThreadControl::private();
        let gate = control.gate();
        let _ = thread::spawn(move || {
            let _held = gate.lock().unwrap();
            panic!("worker died holding the gate");
        })
        .join();
        let _guard = control.lock();
    }
}
