// Resource ownership
//
// `ResourceOwner<T>` holds exactly one Vulkan handle together with the
// function that releases it. Device- and instance-scoped handles capture a
// strong reference to their parent context in that function, so the parent
// cannot be destroyed while a child is still alive.

use ash::vk::Handle;
use std::fmt;
use std::sync::Arc;

pub struct ResourceOwner<T: Handle + Copy> {
    handle: T,
    release_fn: Box<dyn Fn(T)>,
}

impl<T: Handle + Copy> ResourceOwner<T> {
    /// Owner with a no-op release function.
    pub fn empty() -> Self {
        Self::new(|_| {})
    }

    pub fn new(release: impl Fn(T) + 'static) -> Self {
        Self {
            handle: T::from_raw(0),
            release_fn: Box::new(release),
        }
    }

    /// Owner whose release function needs the parent context (usually the
    /// logical device or the instance). The parent is kept alive until this
    /// owner is dropped.
    pub fn with_parent<P: 'static>(parent: Arc<P>, release: impl Fn(&P, T) + 'static) -> Self {
        Self::new(move |handle| release(&parent, handle))
    }

    /// Releases the currently held handle (if any) and stores `handle`.
    pub fn assign(&mut self, handle: T) {
        self.release();
        self.handle = handle;
    }

    /// Releases the currently held handle and returns the slot a creation
    /// call should write the new handle into.
    pub fn address_for_write(&mut self) -> &mut T {
        self.release();
        &mut self.handle
    }

    pub fn get(&self) -> T {
        self.handle
    }

    pub fn is_null(&self) -> bool {
        self.handle.as_raw() == 0
    }

    /// Runs the release function once for the held handle. Calling this on
    /// an empty owner does nothing.
    pub fn release(&mut self) {
        if self.is_null() {
            return;
        }
        let handle = std::mem::replace(&mut self.handle, T::from_raw(0));
        (self.release_fn)(handle);
    }

    /// Gives up ownership without releasing.
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn take(&mut self) -> T {
        std::mem::replace(&mut self.handle, T::from_raw(0))
    }
}

impl<T: Handle + Copy> Drop for ResourceOwner<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T: Handle + Copy + fmt::Debug> fmt::Debug for ResourceOwner<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceOwner")
            .field("type", &T::TYPE)
            .field("handle", &self.handle)
            .finish()
    }
}

/// Convenience for device children: `ResourceOwner::with_parent` with the
/// handle already assigned.
pub fn owned<P: 'static, T: Handle + Copy>(
    parent: &Arc<P>,
    handle: T,
    release: impl Fn(&P, T) + 'static,
) -> ResourceOwner<T> {
    let mut owner = ResourceOwner::with_parent(parent.clone(), release);
    owner.assign(handle);
    owner
}
