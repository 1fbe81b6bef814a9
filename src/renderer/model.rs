// renderer/model.rs
//
// Mesh groups imported from Wavefront OBJ (+ MTL) or glTF files. Parsing
// produces interleaved vertex data on the CPU; `Model` then uploads each
// group as a `Mesh` with its diffuse/specular maps.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use glam::{Mat3, Mat4, Vec3};
use thiserror::Error;

use crate::gfx::{FilterMode, Gpu, ImageData, PixelFormat, WrapMode};
use crate::io;

use super::mesh::Mesh;
use super::shader::Shader;
use super::texture::{Texture, TextureFormat, TextureParameter, TextureValue};
use super::units::TextureUnits;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to load OBJ {path}: {source}")]
    Obj {
        path: String,
        #[source]
        source: tobj::LoadError,
    },
    #[error("failed to load glTF {path}: {source}")]
    Gltf {
        path: String,
        #[source]
        source: gltf::Error,
    },
    #[error("unsupported model format: {0}")]
    UnsupportedFormat(String),
}

/// Where a material map comes from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TextureRef {
    /// Image file, already resolved against the model's directory.
    File(PathBuf),
    /// Image decoded by the glTF importer, by index.
    Image(usize),
}

/// One drawable group before upload: position/normal/uv vertices, triangle
/// indices and material maps.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub name: String,
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
    pub diffuse: Option<TextureRef>,
    pub specular: Option<TextureRef>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 8
    }
}

fn interleave(positions: &[f32], normals: &[f32], texcoords: &[f32], flip_v: bool) -> Vec<f32> {
    let count = positions.len() / 3;
    let mut vertices = Vec::with_capacity(count * 8);
    for i in 0..count {
        vertices.extend_from_slice(&positions[i * 3..i * 3 + 3]);
        match normals.get(i * 3..i * 3 + 3) {
            Some(normal) => vertices.extend_from_slice(normal),
            None => vertices.extend_from_slice(&[0.0, 1.0, 0.0]),
        }
        match texcoords.get(i * 2..i * 2 + 2) {
            Some(&[u, v]) => vertices.extend_from_slice(&[u, if flip_v { 1.0 - v } else { v }]),
            _ => vertices.extend_from_slice(&[0.0, 0.0]),
        }
    }
    vertices
}

/// Triangulated OBJ groups with texture coordinates flipped to a top-left
/// origin and map paths resolved against the file's directory.
pub fn parse_obj(path: &Path) -> Result<Vec<MeshData>, ModelError> {
    let (models, materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
    )
    .map_err(|source| ModelError::Obj {
        path: path.display().to_string(),
        source,
    })?;

    let materials = materials.unwrap_or_else(|err| {
        log::warn!("No materials for {:?}: {}", path, err);
        Vec::new()
    });
    let directory = io::parent_dir(path);
    let resolve = |name: &Option<String>| {
        name.as_ref()
            .filter(|name| !name.is_empty())
            .map(|name| TextureRef::File(directory.join(name)))
    };

    let groups = models
        .into_iter()
        .map(|model| {
            let mesh = model.mesh;
            let material = mesh.material_id.and_then(|id| materials.get(id));
            MeshData {
                name: model.name,
                vertices: interleave(&mesh.positions, &mesh.normals, &mesh.texcoords, true),
                indices: mesh.indices,
                diffuse: material.and_then(|m| resolve(&m.diffuse_texture)),
                specular: material.and_then(|m| resolve(&m.specular_texture)),
            }
        })
        .collect();
    Ok(groups)
}

fn gltf_node(
    node: &gltf::Node,
    parent: Mat4,
    buffers: &[gltf::buffer::Data],
    groups: &mut Vec<MeshData>,
) {
    let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());
    let normal_matrix = Mat3::from_mat4(world).inverse().transpose();

    if let Some(mesh) = node.mesh() {
        for (index, primitive) in mesh.primitives().enumerate() {
            let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));
            let Some(positions) = reader.read_positions() else {
                log::warn!("Skipping glTF primitive without positions in {:?}", mesh.name());
                continue;
            };
            let positions: Vec<f32> = positions
                .flat_map(|p| world.transform_point3(Vec3::from(p)).to_array())
                .collect();
            let normals: Vec<f32> = reader
                .read_normals()
                .map(|normals| {
                    normals
                        .flat_map(|n| (normal_matrix * Vec3::from(n)).normalize_or_zero().to_array())
                        .collect()
                })
                .unwrap_or_default();
            let texcoords: Vec<f32> = reader
                .read_tex_coords(0)
                .map(|uv| uv.into_f32().flatten().collect())
                .unwrap_or_default();
            let indices: Vec<u32> = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect(),
                None => (0..(positions.len() / 3) as u32).collect(),
            };
            let diffuse = primitive
                .material()
                .pbr_metallic_roughness()
                .base_color_texture()
                .map(|info| TextureRef::Image(info.texture().source().index()));

            groups.push(MeshData {
                name: format!("{}#{}", mesh.name().unwrap_or("mesh"), index),
                vertices: interleave(&positions, &normals, &texcoords, false),
                indices,
                diffuse,
                specular: None,
            });
        }
    }

    for child in node.children() {
        gltf_node(&child, world, buffers, groups);
    }
}

/// glTF primitives of the default scene with node transforms baked into the
/// vertices, plus the images the importer decoded.
pub fn parse_gltf(path: &Path) -> Result<(Vec<MeshData>, Vec<gltf::image::Data>), ModelError> {
    let (document, buffers, images) = gltf::import(path).map_err(|source| ModelError::Gltf {
        path: path.display().to_string(),
        source,
    })?;

    let mut groups = Vec::new();
    match document.default_scene().or_else(|| document.scenes().next()) {
        Some(scene) => {
            for node in scene.nodes() {
                gltf_node(&node, Mat4::IDENTITY, &buffers, &mut groups);
            }
        }
        None => log::warn!("glTF file {:?} has no scene", path),
    }
    Ok((groups, images))
}

fn gltf_image(image: &gltf::image::Data, gamma_correction: bool) -> Option<(ImageData, TextureFormat)> {
    let format = match image.format {
        gltf::image::Format::R8 => PixelFormat::Red,
        gltf::image::Format::R8G8B8 => PixelFormat::Rgb,
        gltf::image::Format::R8G8B8A8 => PixelFormat::Rgba,
        other => {
            log::warn!("Unsupported glTF image format {:?}", other);
            return None;
        }
    };
    let texture_format = TextureFormat::select(format.channels() as u8, gamma_correction)?;
    Some((
        ImageData {
            width: image.width,
            height: image.height,
            format,
            srgb: texture_format.is_srgb(),
            pixels: image.pixels.clone(),
        },
        texture_format,
    ))
}

/// Uploaded meshes of one model file. Maps shared by several meshes are
/// loaded once.
#[derive(Debug, Default)]
pub struct Model {
    meshes: Vec<Mesh>,
    /// Keyed by source and gamma flag: one file can be both a colour and
    /// a data map.
    textures: HashMap<(TextureRef, bool), Rc<Texture>>,
}

impl Model {
    /// Load `path`, logging and returning an empty model on failure.
    pub fn load(gpu: &Gpu, path: impl AsRef<Path>, units: &mut TextureUnits, gamma_correction: bool) -> Self {
        let path = path.as_ref();
        match Self::try_load(gpu, path, units, gamma_correction) {
            Ok(model) => model,
            Err(err) => {
                log::error!("Model failed to load: {}", err);
                Self::default()
            }
        }
    }

    pub fn try_load(
        gpu: &Gpu,
        path: &Path,
        units: &mut TextureUnits,
        gamma_correction: bool,
    ) -> Result<Self, ModelError> {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        let (groups, images) = match extension.as_str() {
            "obj" => (parse_obj(path)?, Vec::new()),
            "gltf" | "glb" => parse_gltf(path)?,
            _ => return Err(ModelError::UnsupportedFormat(path.display().to_string())),
        };

        let mut model = Self::default();
        for group in &groups {
            let mut mesh = Mesh::from_vertices(gpu, &group.vertices, Some(&group.indices));
            if let Some(source) = &group.diffuse {
                if let Some(texture) = model.texture(gpu, source, &images, gamma_correction) {
                    mesh.set_diffuse_map(texture, units);
                }
            }
            if let Some(source) = &group.specular {
                if let Some(texture) = model.texture(gpu, source, &images, false) {
                    mesh.set_specular_map(texture, units);
                }
            }
            model.meshes.push(mesh);
        }
        log::info!(
            "Loaded model {:?}: {} meshes, {} textures",
            path,
            model.meshes.len(),
            model.textures.len()
        );
        Ok(model)
    }

    fn texture(
        &mut self,
        gpu: &Gpu,
        source: &TextureRef,
        images: &[gltf::image::Data],
        gamma_correction: bool,
    ) -> Option<Rc<Texture>> {
        let key = (source.clone(), gamma_correction);
        if let Some(texture) = self.textures.get(&key) {
            return Some(texture.clone());
        }
        let texture = match source {
            TextureRef::File(path) => Texture::load(gpu, path, gamma_correction),
            TextureRef::Image(index) => {
                let (data, format) = gltf_image(images.get(*index)?, gamma_correction)?;
                Texture::from_data(gpu, &data, format, &format!("glTF image {index}"))
            }
        };
        texture.set_parameter(TextureParameter::WrapS, TextureValue::Wrap(WrapMode::Repeat));
        texture.set_parameter(TextureParameter::WrapT, TextureValue::Wrap(WrapMode::Repeat));
        texture.set_parameter(TextureParameter::MagFilter, TextureValue::Filter(FilterMode::Linear));

        let texture = Rc::new(texture);
        self.textures.insert(key, texture.clone());
        Some(texture)
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn meshes_mut(&mut self) -> &mut [Mesh] {
        &mut self.meshes
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn into_meshes(self) -> Vec<Mesh> {
        self.meshes
    }

    pub fn draw(&self, projection: Mat4, view: Mat4, shader: &Shader) {
        for mesh in &self.meshes {
            mesh.draw(projection, view, shader);
        }
    }
}
