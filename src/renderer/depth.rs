use std::cell::Cell;

use crate::gfx::{
    BorderColour, FilterMode, FramebufferId, Gpu, GpuHandle, SamplerParams, TextureId, TextureKind,
    Viewport, WrapMode,
};

use super::texture::{apply_parameter, TextureParameter, TextureValue};

/// Offscreen depth-only render target, sampled later as a shadow map.
pub struct DepthTarget {
    framebuffer: GpuHandle<FramebufferId>,
    texture: GpuHandle<TextureId>,
    width: u32,
    height: u32,
    params: Cell<SamplerParams>,
    saved_viewport: Cell<Option<Viewport>>,
}

impl DepthTarget {
    /// Nearest filtering; lookups outside the map read as fully lit.
    pub const DEFAULT_PARAMS: SamplerParams = SamplerParams {
        wrap_s: WrapMode::ClampToBorder,
        wrap_t: WrapMode::ClampToBorder,
        wrap_r: WrapMode::ClampToBorder,
        min_filter: FilterMode::Nearest,
        mag_filter: FilterMode::Nearest,
        border: BorderColour::OpaqueWhite,
    };

    pub fn new(gpu: &Gpu, width: u32, height: u32) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        let (framebuffer, texture) = gpu.with(|device| device.create_depth_target(width, height));
        log::debug!("Created {}x{} depth target {:?}", width, height, framebuffer);
        Self {
            framebuffer: GpuHandle::new(gpu, framebuffer),
            texture: GpuHandle::new(gpu, texture),
            width,
            height,
            params: Cell::new(Self::DEFAULT_PARAMS),
            saved_viewport: Cell::new(None),
        }
    }

    pub fn gpu(&self) -> &Gpu {
        self.framebuffer.gpu()
    }

    pub fn framebuffer_id(&self) -> FramebufferId {
        self.framebuffer.id()
    }

    pub fn texture_id(&self) -> TextureId {
        self.texture.id()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn params(&self) -> SamplerParams {
        self.params.get()
    }

    pub fn set_parameter(&self, parameter: TextureParameter, value: TextureValue) {
        let mut params = self.params.get();
        if apply_parameter(&mut params, parameter, value) {
            self.params.set(params);
        }
    }

    /// Redirect rendering here with a viewport covering the whole target.
    pub fn bind(&self) {
        let framebuffer = self.framebuffer.id();
        let viewport = Viewport::sized(self.width, self.height);
        let previous = self.gpu().with(|device| {
            let previous = device.viewport();
            device.set_viewport(viewport);
            device.bind_framebuffer(Some(framebuffer));
            previous
        });
        if self.saved_viewport.get().is_none() {
            self.saved_viewport.set(Some(previous));
        }
    }

    /// Return to the default target and the viewport active before `bind`.
    pub fn release(&self) {
        let saved = self.saved_viewport.take();
        self.gpu().with(|device| {
            device.bind_framebuffer(None);
            if let Some(viewport) = saved {
                device.set_viewport(viewport);
            }
        });
    }

    pub fn bind_texture(&self, unit: u32) {
        let (id, params) = (self.texture.id(), self.params.get());
        self.gpu()
            .with(|device| device.bind_texture(unit, id, TextureKind::Depth, params));
    }
}

impl std::fmt::Debug for DepthTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DepthTarget")
            .field("framebuffer", &self.framebuffer.id())
            .field("texture", &self.texture.id())
            .field("size", &self.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::{Command, RecordingDevice};

    #[test]
    fn bind_sets_target_viewport_and_release_restores_it() {
        let (device, log) = RecordingDevice::new();
        let gpu = Gpu::new(device);
        let target = DepthTarget::new(&gpu, 1024, 1024);

        target.bind();
        assert_eq!(log.framebuffer(), Some(target.framebuffer_id()));
        assert_eq!(
            gpu.with(|d| d.viewport()),
            Viewport::sized(1024, 1024)
        );

        target.release();
        assert_eq!(log.framebuffer(), None);
        assert_eq!(gpu.with(|d| d.viewport()), RecordingDevice::DEFAULT_VIEWPORT);
    }

    #[test]
    fn shadow_map_samples_with_white_border() {
        let (device, log) = RecordingDevice::new();
        let gpu = Gpu::new(device);
        let target = DepthTarget::new(&gpu, 512, 512);

        target.bind_texture(2);
        let params = log.commands().into_iter().find_map(|c| match c {
            Command::BindTexture {
                unit: 2,
                kind: TextureKind::Depth,
                params,
                ..
            } => Some(params),
            _ => None,
        });
        let params = params.expect("depth texture bound");
        assert_eq!(params.wrap_s, WrapMode::ClampToBorder);
        assert_eq!(params.border, BorderColour::OpaqueWhite);
        assert_eq!(params.mag_filter, FilterMode::Nearest);
    }

    #[test]
    fn dropping_the_target_releases_both_resources() {
        let (device, log) = RecordingDevice::new();
        let gpu = Gpu::new(device);
        let target = DepthTarget::new(&gpu, 8, 8);
        let (fb, tex) = (target.framebuffer_id(), target.texture_id());
        drop(target);
        gpu.flush_releases();
        assert!(!log.is_live(fb.into()));
        assert!(!log.is_live(tex.into()));
    }
}
