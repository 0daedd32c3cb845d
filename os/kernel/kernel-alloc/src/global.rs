//! The kernel-wide memory manager instance.
//!
//! ```ignore
//! static MEMORY: GlobalMemory<HardwareMmu> = GlobalMemory::new();
//!
//! let manager = unsafe { MemoryManager::boot(HardwareMmu, &HigherHalfMapper, &info) };
//! MEMORY.install(manager);
//! let page = MEMORY.with(|mm| mm.region_alloc(1))?;
//! ```

use crate::manager::MemoryManager;
use kernel_sync::SpinLock;
use kernel_vmem::Mmu;

/// A [`MemoryManager`] behind a spin lock, empty until boot installs one.
pub struct GlobalMemory<M> {
    inner: SpinLock<Option<MemoryManager<M>>>,
}

impl<M> Default for GlobalMemory<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> GlobalMemory<M> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: SpinLock::new(None),
        }
    }

    /// # Panics
    /// If a manager is installed already.
    pub fn install(&self, manager: MemoryManager<M>) {
        let mut slot = self.inner.lock();
        assert!(slot.is_none(), "memory manager installed twice");
        *slot = Some(manager);
    }

    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.inner.lock().is_some()
    }
}

impl<M: Mmu + Copy> GlobalMemory<M> {
    /// Run `f` with the manager locked.
    ///
    /// # Panics
    /// If nothing is installed yet.
    pub fn with<R>(&self, f: impl FnOnce(&mut MemoryManager<M>) -> R) -> R {
        self.inner.with_lock(|slot| {
            let Some(manager) = slot.as_mut() else {
                panic!("memory manager used before boot");
            };
            f(manager)
        })
    }
}
