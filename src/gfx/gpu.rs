use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::{GpuResource, GraphicsDevice};

struct GpuShared {
    device: RefCell<Box<dyn GraphicsDevice>>,
    pending_release: RefCell<Vec<GpuResource>>,
}

/// Shared handle to the single-threaded graphics device.
///
/// Every resource wrapper keeps a clone so it can queue its own release when
/// dropped. Queued releases are handed to the device at the end of a frame.
#[derive(Clone)]
pub struct Gpu {
    shared: Rc<GpuShared>,
}

impl Gpu {
    pub fn new(device: impl GraphicsDevice + 'static) -> Self {
        Self {
            shared: Rc::new(GpuShared {
                device: RefCell::new(Box::new(device)),
                pending_release: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Run `f` with exclusive access to the device.
    ///
    /// Must not be re-entered from inside `f`.
    pub fn with<R>(&self, f: impl FnOnce(&mut dyn GraphicsDevice) -> R) -> R {
        let mut device = self.shared.device.borrow_mut();
        f(device.as_mut())
    }

    pub(crate) fn defer_release(&self, resource: GpuResource) {
        self.shared.pending_release.borrow_mut().push(resource);
    }

    pub fn pending_releases(&self) -> usize {
        self.shared.pending_release.borrow().len()
    }

    /// Release dropped resources without presenting.
    pub fn flush_releases(&self) {
        let pending: Vec<GpuResource> = self.shared.pending_release.borrow_mut().drain(..).collect();
        if pending.is_empty() {
            return;
        }
        log::debug!("Releasing {} GPU resources", pending.len());
        self.with(|device| {
            for resource in pending {
                device.release(resource);
            }
        });
    }

    pub fn finish_frame(&self) {
        self.flush_releases();
        self.with(|device| device.finish_frame());
    }
}

impl fmt::Debug for Gpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gpu")
            .field("pending_release", &self.pending_releases())
            .finish()
    }
}

/// Owns one device resource and queues its release on drop.
pub struct GpuHandle<T: Copy + Into<GpuResource>> {
    gpu: Gpu,
    id: T,
}

impl<T: Copy + Into<GpuResource>> GpuHandle<T> {
    pub fn new(gpu: &Gpu, id: T) -> Self {
        Self {
            gpu: gpu.clone(),
            id,
        }
    }

    pub fn id(&self) -> T {
        self.id
    }

    pub fn gpu(&self) -> &Gpu {
        &self.gpu
    }
}

impl<T: Copy + Into<GpuResource>> Drop for GpuHandle<T> {
    fn drop(&mut self) {
        self.gpu.defer_release(self.id.into());
    }
}

impl<T: Copy + Into<GpuResource> + fmt::Debug> fmt::Debug for GpuHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GpuHandle").field(&self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::{Command, RecordingDevice, TextureId};

    #[test]
    fn dropped_handles_are_released_at_frame_end() {
        let (device, log) = RecordingDevice::new();
        let gpu = Gpu::new(device);

        let handle = GpuHandle::new(&gpu, TextureId(7));
        assert_eq!(gpu.pending_releases(), 0);
        drop(handle);
        assert_eq!(gpu.pending_releases(), 1);

        gpu.finish_frame();
        assert_eq!(gpu.pending_releases(), 0);

        let commands = log.commands();
        let release = commands
            .iter()
            .position(|c| *c == Command::Release(GpuResource::Texture(TextureId(7))))
            .expect("release recorded");
        let finish = commands
            .iter()
            .position(|c| *c == Command::FinishFrame)
            .expect("frame finished");
        assert!(release < finish);
    }
}
