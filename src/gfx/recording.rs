// gfx/recording.rs
//
// Headless device that records every call. Drives the scene layer in tests
// and dry runs without a window or adapter.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use glam::Mat4;

use super::{
    ClearFlags, CullFace, DepthFunc, FramebufferId, GpuResource, GraphicsDevice, ImageData,
    ProgramId, ProgramSource, SamplerParams, ShaderError, ShaderStage, TextureId, TextureKind,
    UniformValue, VertexArrayId, VertexLayout, Viewport,
};

/// Pipeline state captured at each draw call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawState {
    pub program: Option<ProgramId>,
    pub framebuffer: Option<FramebufferId>,
    pub cull_face: CullFace,
    pub depth_func: DepthFunc,
    pub viewport: Viewport,
    pub instances: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    CreateProgram {
        program: ProgramId,
        label: String,
    },
    UseProgram(ProgramId),
    SetUniform {
        program: ProgramId,
        name: String,
        value: UniformValue,
    },
    CreateTexture {
        texture: TextureId,
        width: u32,
        height: u32,
        srgb: bool,
    },
    CreateCubeMap {
        texture: TextureId,
        loaded_faces: usize,
    },
    CreateDepthTarget {
        framebuffer: FramebufferId,
        texture: TextureId,
        width: u32,
        height: u32,
    },
    BindTexture {
        unit: u32,
        texture: TextureId,
        kind: TextureKind,
        params: SamplerParams,
    },
    BindFramebuffer(Option<FramebufferId>),
    SetViewport(Viewport),
    Clear(ClearFlags),
    SetCullFace(CullFace),
    SetDepthFunc(DepthFunc),
    CreateVertexArray {
        vertex_array: VertexArrayId,
        layout: VertexLayout,
        vertex_count: usize,
        indexed: bool,
    },
    SetInstances {
        vertex_array: VertexArrayId,
        count: usize,
    },
    Draw {
        vertex_array: VertexArrayId,
        count: u32,
        state: DrawState,
    },
    Release(GpuResource),
    FinishFrame,
    Resize {
        width: u32,
        height: u32,
    },
}

#[derive(Debug)]
struct Recorded {
    commands: Vec<Command>,
    uniforms: HashMap<(ProgramId, String), UniformValue>,
    program_errors: HashMap<ProgramId, ShaderError>,
    live: Vec<GpuResource>,
    program: Option<ProgramId>,
    framebuffer: Option<FramebufferId>,
    cull_face: CullFace,
    depth_func: DepthFunc,
    viewport: Viewport,
    instances: HashMap<VertexArrayId, u32>,
    next_id: u32,
}

/// Read side of a [`RecordingDevice`], kept by the caller after the device
/// has been moved into a [`super::Gpu`].
#[derive(Clone, Debug)]
pub struct RecordingLog {
    inner: Rc<RefCell<Recorded>>,
}

impl RecordingLog {
    pub fn commands(&self) -> Vec<Command> {
        self.inner.borrow().commands.clone()
    }

    pub fn clear(&self) {
        self.inner.borrow_mut().commands.clear();
    }

    /// Last value uploaded under `name` for `program`.
    pub fn uniform(&self, program: ProgramId, name: &str) -> Option<UniformValue> {
        self.inner
            .borrow()
            .uniforms
            .get(&(program, name.to_string()))
            .copied()
    }

    /// Draw calls in issue order with their captured state.
    pub fn draws(&self) -> Vec<(VertexArrayId, u32, DrawState)> {
        self.inner
            .borrow()
            .commands
            .iter()
            .filter_map(|c| match c {
                Command::Draw {
                    vertex_array,
                    count,
                    state,
                } => Some((*vertex_array, *count, *state)),
                _ => None,
            })
            .collect()
    }

    /// Uniform names written since the last [`RecordingLog::clear`].
    pub fn uniform_names(&self) -> Vec<String> {
        self.inner
            .borrow()
            .commands
            .iter()
            .filter_map(|c| match c {
                Command::SetUniform { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn is_live(&self, resource: GpuResource) -> bool {
        self.inner.borrow().live.contains(&resource)
    }

    pub fn cull_face(&self) -> CullFace {
        self.inner.borrow().cull_face
    }

    pub fn depth_func(&self) -> DepthFunc {
        self.inner.borrow().depth_func
    }

    pub fn framebuffer(&self) -> Option<FramebufferId> {
        self.inner.borrow().framebuffer
    }
}

#[derive(Debug)]
pub struct RecordingDevice {
    inner: Rc<RefCell<Recorded>>,
}

impl RecordingDevice {
    pub const DEFAULT_VIEWPORT: Viewport = Viewport {
        x: 0,
        y: 0,
        width: 1200,
        height: 900,
    };

    pub fn new() -> (Self, RecordingLog) {
        let inner = Rc::new(RefCell::new(Recorded {
            commands: Vec::new(),
            uniforms: HashMap::new(),
            program_errors: HashMap::new(),
            live: Vec::new(),
            program: None,
            framebuffer: None,
            cull_face: CullFace::Back,
            depth_func: DepthFunc::Less,
            viewport: Self::DEFAULT_VIEWPORT,
            instances: HashMap::new(),
            next_id: 1,
        }));
        (
            Self {
                inner: inner.clone(),
            },
            RecordingLog { inner },
        )
    }

    fn push(&self, command: Command) {
        self.inner.borrow_mut().commands.push(command);
    }

    fn next_id(&self) -> u32 {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        id
    }

    fn track(&self, resource: GpuResource) {
        self.inner.borrow_mut().live.push(resource);
    }
}

impl GraphicsDevice for RecordingDevice {
    fn create_program(&mut self, source: &ProgramSource) -> ProgramId {
        let program = ProgramId(self.next_id());
        let error = if source.vertex.trim().is_empty() {
            Some(ShaderError::Compile {
                stage: ShaderStage::Vertex,
                log: "empty source".into(),
            })
        } else if source.fragment.trim().is_empty() {
            Some(ShaderError::Compile {
                stage: ShaderStage::Fragment,
                log: "empty source".into(),
            })
        } else {
            None
        };
        if let Some(error) = error {
            self.inner.borrow_mut().program_errors.insert(program, error);
        }
        self.track(program.into());
        self.push(Command::CreateProgram {
            program,
            label: source.label.clone(),
        });
        program
    }

    fn program_status(&self, program: ProgramId) -> Result<(), ShaderError> {
        match self.inner.borrow().program_errors.get(&program) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn use_program(&mut self, program: ProgramId) {
        self.inner.borrow_mut().program = Some(program);
        self.push(Command::UseProgram(program));
    }

    fn set_uniform(&mut self, program: ProgramId, name: &str, value: UniformValue) {
        self.inner
            .borrow_mut()
            .uniforms
            .insert((program, name.to_string()), value);
        self.push(Command::SetUniform {
            program,
            name: name.to_string(),
            value,
        });
    }

    fn create_texture(&mut self, image: &ImageData) -> TextureId {
        let texture = TextureId(self.next_id());
        self.track(texture.into());
        self.push(Command::CreateTexture {
            texture,
            width: image.width,
            height: image.height,
            srgb: image.srgb,
        });
        texture
    }

    fn create_cube_map(&mut self, faces: &[Option<ImageData>; 6]) -> TextureId {
        let texture = TextureId(self.next_id());
        self.track(texture.into());
        self.push(Command::CreateCubeMap {
            texture,
            loaded_faces: faces.iter().filter(|f| f.is_some()).count(),
        });
        texture
    }

    fn create_depth_target(&mut self, width: u32, height: u32) -> (FramebufferId, TextureId) {
        let framebuffer = FramebufferId(self.next_id());
        let texture = TextureId(self.next_id());
        self.track(framebuffer.into());
        self.track(texture.into());
        self.push(Command::CreateDepthTarget {
            framebuffer,
            texture,
            width,
            height,
        });
        (framebuffer, texture)
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureId, kind: TextureKind, params: SamplerParams) {
        self.push(Command::BindTexture {
            unit,
            texture,
            kind,
            params,
        });
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.inner.borrow_mut().framebuffer = framebuffer;
        self.push(Command::BindFramebuffer(framebuffer));
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.inner.borrow_mut().viewport = viewport;
        self.push(Command::SetViewport(viewport));
    }

    fn viewport(&self) -> Viewport {
        self.inner.borrow().viewport
    }

    fn clear(&mut self, flags: ClearFlags, _colour: [f32; 4]) {
        self.push(Command::Clear(flags));
    }

    fn set_cull_face(&mut self, face: CullFace) {
        self.inner.borrow_mut().cull_face = face;
        self.push(Command::SetCullFace(face));
    }

    fn cull_face(&self) -> CullFace {
        self.inner.borrow().cull_face
    }

    fn set_depth_func(&mut self, func: DepthFunc) {
        self.inner.borrow_mut().depth_func = func;
        self.push(Command::SetDepthFunc(func));
    }

    fn depth_func(&self) -> DepthFunc {
        self.inner.borrow().depth_func
    }

    fn create_vertex_array(
        &mut self,
        vertices: &[f32],
        layout: VertexLayout,
        indices: Option<&[u32]>,
    ) -> VertexArrayId {
        let vertex_array = VertexArrayId(self.next_id());
        self.track(vertex_array.into());
        self.push(Command::CreateVertexArray {
            vertex_array,
            layout,
            vertex_count: vertices.len() / layout.floats_per_vertex(),
            indexed: indices.is_some(),
        });
        vertex_array
    }

    fn set_instances(&mut self, vertex_array: VertexArrayId, models: &[Mat4]) {
        self.inner
            .borrow_mut()
            .instances
            .insert(vertex_array, models.len() as u32);
        self.push(Command::SetInstances {
            vertex_array,
            count: models.len(),
        });
    }

    fn draw_instanced(&mut self, vertex_array: VertexArrayId, count: u32, instances: u32) {
        let state = {
            let inner = self.inner.borrow();
            let attached = inner.instances.get(&vertex_array).copied().unwrap_or(0);
            DrawState {
                program: inner.program,
                framebuffer: inner.framebuffer,
                cull_face: inner.cull_face,
                depth_func: inner.depth_func,
                viewport: inner.viewport,
                instances: if attached == 0 { 1 } else { instances.min(attached) },
            }
        };
        self.push(Command::Draw {
            vertex_array,
            count,
            state,
        });
    }

    fn release(&mut self, resource: GpuResource) {
        let mut inner = self.inner.borrow_mut();
        inner.live.retain(|r| *r != resource);
        if let GpuResource::VertexArray(id) = resource {
            inner.instances.remove(&id);
        }
        drop(inner);
        self.push(Command::Release(resource));
    }

    fn finish_frame(&mut self) {
        self.push(Command::FinishFrame);
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.inner.borrow_mut().viewport = Viewport::sized(width, height);
        self.push(Command::Resize { width, height });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draws_capture_current_state() {
        let (mut device, log) = RecordingDevice::new();
        let program = device.create_program(&ProgramSource {
            label: "p".into(),
            vertex: "v".into(),
            fragment: "f".into(),
            geometry: None,
        });
        let vao = device.create_vertex_array(&[0.0; 9], VertexLayout::Position, None);

        device.use_program(program);
        device.set_cull_face(CullFace::Front);
        device.draw(vao, 3);

        let draws = log.draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].2.program, Some(program));
        assert_eq!(draws[0].2.cull_face, CullFace::Front);
    }

    #[test]
    fn instance_count_is_capped_by_attached_matrices() {
        let (mut device, log) = RecordingDevice::new();
        let vao = device.create_vertex_array(&[0.0; 9], VertexLayout::Position, None);

        device.draw_instanced(vao, 3, 10);
        device.set_instances(vao, &[Mat4::IDENTITY; 4]);
        device.draw_instanced(vao, 3, 10);
        device.draw(vao, 3);

        let instances: Vec<u32> = log.draws().iter().map(|d| d.2.instances).collect();
        assert_eq!(instances, vec![1, 4, 1]);
    }

    #[test]
    fn empty_stage_source_is_a_compile_error() {
        let (mut device, _log) = RecordingDevice::new();
        let program = device.create_program(&ProgramSource {
            label: "broken".into(),
            vertex: "v".into(),
            fragment: String::new(),
            geometry: None,
        });
        assert!(matches!(
            device.program_status(program),
            Err(ShaderError::Compile {
                stage: ShaderStage::Fragment,
                ..
            })
        ));
    }

    #[test]
    fn release_drops_resource_from_live_set() {
        let (mut device, log) = RecordingDevice::new();
        let texture = device.create_texture(&ImageData::solid([255; 4], false));
        assert!(log.is_live(texture.into()));
        device.release(texture.into());
        assert!(!log.is_live(texture.into()));
    }
}
