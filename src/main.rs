mod demo_scenes;

use forward_scene::settings::RenderSettings;

fn main() {
    forward_scene::init_logging();
    let settings = RenderSettings::load();
    if let Err(err) = forward_scene::run(settings, Box::new(demo_scenes::create)) {
        eprintln!("Application error: {err}");
    }
}
