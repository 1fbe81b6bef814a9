use std::f32::consts::FRAC_PI_2;

use forward_scene::gfx::{Gpu, GpuResource, RecordingDevice, UniformValue};
use forward_scene::renderer::{Attenuation, BuiltinShader, Mesh, QuadGeometry, Shader, Texture};
use forward_scene::scene::{Scene, Transform};
use glam::{Mat4, Quat, Vec2, Vec3};

const EPSILON: f32 = 1e-5;

fn floor() -> QuadGeometry {
    QuadGeometry::new(
        Vec3::new(-25.0, -0.5, 25.0),
        Vec3::new(25.0, -0.5, 25.0),
        Vec3::new(25.0, -0.5, -25.0),
        Vec3::new(-25.0, -0.5, -25.0),
    )
}

#[test]
fn floor_quad_faces_up_and_tiles_per_unit() {
    let quad = floor();
    assert!(quad.normal().abs_diff_eq(Vec3::Y, EPSILON));
    assert_eq!(quad.uv_extent(), Vec2::new(50.0, 50.0));

    let vertices = quad.vertices();
    assert_eq!(vertices.len(), 6 * 8);
    for vertex in vertices.chunks_exact(8) {
        assert_eq!(&vertex[3..6], &[0.0, 1.0, 0.0]);
        assert!((0.0..=50.0).contains(&vertex[6]));
        assert!((0.0..=50.0).contains(&vertex[7]));
    }
}

#[test]
fn attenuation_preset_follows_gamma_correction() {
    assert_eq!(Attenuation::for_gamma(false), Attenuation::DEFAULT);
    assert_eq!(Attenuation::for_gamma(true), Attenuation::GAMMA);

    // the gamma preset falls off faster at range
    let falloff = |a: Attenuation, d: f32| 1.0 / (a.constant + a.linear * d + a.quadratic * d * d);
    assert!(falloff(Attenuation::GAMMA, 7.0) < falloff(Attenuation::DEFAULT, 7.0));
}

#[test]
fn mesh_mutators_compose_like_the_transform() {
    let (device, _log) = RecordingDevice::new();
    let gpu = Gpu::new(device);
    let mut mesh = Mesh::cube(&gpu);

    mesh.move_by(Vec3::new(-1.0, 0.0, 2.0));
    mesh.rotate_y(FRAC_PI_2);
    mesh.scale(Vec3::splat(0.25));

    let transform = Transform::from_trs(
        Vec3::new(-1.0, 0.0, 2.0),
        Quat::from_rotation_y(FRAC_PI_2),
        Vec3::splat(0.25),
    );
    assert!(mesh.model().abs_diff_eq(transform.matrix(), EPSILON));

    mesh.reset();
    assert_eq!(mesh.model(), Mat4::IDENTITY);
}

#[test]
fn mesh_draw_uploads_model_and_material() {
    let (device, log) = RecordingDevice::new();
    let gpu = Gpu::new(device);
    let shader = Shader::builtin(&gpu, BuiltinShader::Lighting);
    let mut mesh = Mesh::cube(&gpu);
    mesh.move_by(Vec3::new(0.0, 1.0, 0.0));
    mesh.set_shininess(64.0);
    mesh.draw(Mat4::IDENTITY, Mat4::IDENTITY, &shader);

    assert_eq!(
        log.uniform(shader.id(), "model"),
        Some(UniformValue::Mat4(Mat4::from_translation(Vec3::Y)))
    );
    assert_eq!(
        log.uniform(shader.id(), "material.shininess"),
        Some(UniformValue::Float(64.0))
    );
    assert_eq!(log.draws().len(), 1);
}

#[test]
fn missing_texture_is_not_ready_and_scene_still_draws() {
    let (device, log) = RecordingDevice::new();
    let gpu = Gpu::new(device);
    let texture = Texture::load(&gpu, "definitely/not/here.png", true);
    assert!(!texture.is_ready());
    assert_eq!(texture.id(), None);

    let shader = Shader::builtin(&gpu, BuiltinShader::Lighting);
    let mut scene = Scene::new();
    let mut mesh = Mesh::quad(&gpu, floor());
    mesh.set_diffuse_map(std::rc::Rc::new(texture), scene.units_mut());
    scene.add_mesh(mesh);
    scene.draw(&shader);

    assert_eq!(log.draws().len(), 1);
    assert_eq!(log.draws()[0].1, 6);
}

#[test]
fn dropped_meshes_release_their_vertex_arrays() {
    let (device, log) = RecordingDevice::new();
    let gpu = Gpu::new(device);
    let mesh = Mesh::cube(&gpu);
    let vertex_array = GpuResource::VertexArray(mesh.vertex_array());
    assert!(log.is_live(vertex_array));

    drop(mesh);
    gpu.flush_releases();
    assert!(!log.is_live(vertex_array));
}
