// gfx/wgpu_device/frame.rs
//
// Immediate-mode calls are recorded here during a frame and replayed into
// render passes when the frame is finished.

use crate::gfx::{FramebufferId, SamplerParams, TextureId, UniformBlock, VertexArrayId, Viewport};

use super::pipeline::{PipelineKey, UNIFORM_STRIDE};

/// Texture bound to one sampler binding; `None` selects the fallback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct SampledTexture {
    pub(crate) texture: Option<TextureId>,
    pub(crate) params: SamplerParams,
}

impl SampledTexture {
    pub(crate) fn fallback() -> Self {
        Self {
            texture: None,
            params: SamplerParams::default(),
        }
    }
}

/// Resolved contents of the texture bind group for one draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct BindingSet {
    pub(crate) diffuse: SampledTexture,
    pub(crate) specular: SampledTexture,
    pub(crate) shadow_map: Option<TextureId>,
    pub(crate) skybox: SampledTexture,
}

impl Default for BindingSet {
    fn default() -> Self {
        Self {
            diffuse: SampledTexture::fallback(),
            specular: SampledTexture::fallback(),
            shadow_map: None,
            skybox: SampledTexture::fallback(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct DrawRecord {
    pub(crate) pipeline: PipelineKey,
    pub(crate) vertex_array: VertexArrayId,
    pub(crate) count: u32,
    pub(crate) instances: u32,
    pub(crate) uniform_offset: u32,
    pub(crate) bindings: BindingSet,
    pub(crate) viewport: Viewport,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct PassRecord {
    /// `None` renders to the window surface.
    pub(crate) target: Option<FramebufferId>,
    pub(crate) clear_colour: Option<[f32; 4]>,
    pub(crate) clear_depth: bool,
    pub(crate) draws: Vec<DrawRecord>,
}

impl PassRecord {
    fn new(target: Option<FramebufferId>) -> Self {
        Self {
            target,
            clear_colour: None,
            clear_depth: false,
            draws: Vec::new(),
        }
    }

    /// Passes that neither clear nor draw can be skipped entirely.
    pub(crate) fn is_empty(&self) -> bool {
        self.draws.is_empty() && self.clear_colour.is_none() && !self.clear_depth
    }
}

#[derive(Default)]
pub(crate) struct FrameRecorder {
    passes: Vec<PassRecord>,
    uniforms: Vec<u8>,
}

impl FrameRecorder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn current(&mut self, target: Option<FramebufferId>) -> &mut PassRecord {
        let reuse = matches!(self.passes.last(), Some(pass) if pass.target == target);
        if !reuse {
            self.passes.push(PassRecord::new(target));
        }
        let last = self.passes.len() - 1;
        &mut self.passes[last]
    }

    /// Start a pass for `target` unless the open pass already renders there.
    pub(crate) fn bind_target(&mut self, target: Option<FramebufferId>) {
        self.current(target);
    }

    /// A clear after draws opens a new pass so earlier draws are kept.
    pub(crate) fn clear(
        &mut self,
        target: Option<FramebufferId>,
        colour: Option<[f32; 4]>,
        depth: bool,
    ) {
        if !self.current(target).draws.is_empty() {
            self.passes.push(PassRecord::new(target));
        }
        let pass = self.current(target);
        if colour.is_some() {
            pass.clear_colour = colour;
        }
        pass.clear_depth |= depth;
    }

    /// Append one uniform snapshot and return its dynamic offset.
    pub(crate) fn push_uniforms(&mut self, block: &UniformBlock) -> u32 {
        let offset = self.uniforms.len();
        self.uniforms.extend_from_slice(bytemuck::bytes_of(block));
        self.uniforms.resize(offset + UNIFORM_STRIDE as usize, 0);
        offset as u32
    }

    pub(crate) fn push_draw(&mut self, target: Option<FramebufferId>, draw: DrawRecord) {
        self.current(target).draws.push(draw);
    }

    pub(crate) fn take(&mut self) -> (Vec<PassRecord>, Vec<u8>) {
        (
            std::mem::take(&mut self.passes),
            std::mem::take(&mut self.uniforms),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::{CullFace, DepthFunc, ProgramId, VertexLayout};
    use crate::gfx::wgpu_device::pipeline::TargetKind;

    fn draw(target: TargetKind) -> DrawRecord {
        DrawRecord {
            pipeline: PipelineKey {
                program: ProgramId(1),
                layout: VertexLayout::PositionNormalUv,
                cull_face: CullFace::Back,
                depth_func: DepthFunc::Less,
                target,
            },
            vertex_array: VertexArrayId(2),
            count: 36,
            instances: 1,
            uniform_offset: 0,
            bindings: BindingSet::default(),
            viewport: Viewport::sized(4, 4),
        }
    }

    #[test]
    fn framebuffer_switches_split_passes() {
        let mut frame = FrameRecorder::new();
        let shadow = Some(FramebufferId(9));

        frame.bind_target(shadow);
        frame.clear(shadow, None, true);
        frame.push_draw(shadow, draw(TargetKind::DepthOnly));
        frame.bind_target(None);
        frame.push_draw(None, draw(TargetKind::Surface));

        let (passes, _) = frame.take();
        assert_eq!(passes.len(), 2);
        assert_eq!(passes[0].target, shadow);
        assert!(passes[0].clear_depth);
        assert_eq!(passes[1].target, None);
        assert_eq!(passes[1].draws.len(), 1);
    }

    #[test]
    fn clear_after_draws_starts_a_new_pass() {
        let mut frame = FrameRecorder::new();
        frame.clear(None, Some([0.1, 0.1, 0.1, 1.0]), true);
        frame.push_draw(None, draw(TargetKind::Surface));
        frame.clear(None, None, true);

        let (passes, _) = frame.take();
        assert_eq!(passes.len(), 2);
        assert_eq!(passes[0].clear_colour, Some([0.1, 0.1, 0.1, 1.0]));
        assert!(passes[1].draws.is_empty());
        assert!(passes[1].clear_depth);
    }

    #[test]
    fn uniform_snapshots_are_stride_aligned() {
        let mut frame = FrameRecorder::new();
        let block = UniformBlock::default();
        assert_eq!(frame.push_uniforms(&block), 0);
        assert_eq!(frame.push_uniforms(&block), UNIFORM_STRIDE as u32);

        let (_, bytes) = frame.take();
        assert_eq!(bytes.len(), 2 * UNIFORM_STRIDE as usize);
    }

    #[test]
    fn rebinding_the_same_target_keeps_one_pass() {
        let mut frame = FrameRecorder::new();
        frame.bind_target(None);
        frame.bind_target(None);
        let (passes, _) = frame.take();
        assert_eq!(passes.len(), 1);
        assert!(passes[0].is_empty());
    }
}
