pub mod app;
pub mod gfx;
pub mod input;
pub mod io;
pub mod renderer;
pub mod scene;
pub mod settings;
pub mod time;

use app::{App, DemoFactory};
use settings::RenderSettings;
use winit::event_loop::EventLoop;

pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init();
}

pub fn run(settings: RenderSettings, create_demo: DemoFactory) -> Result<(), winit::error::EventLoopError> {
    log::info!("Starting {} ({:?})", settings.title, settings.demo);

    let event_loop = EventLoop::new()?;
    let mut app = App::new(settings, create_demo);

    let result = event_loop.run_app(&mut app);

    if let Err(ref err) = result {
        log::error!("Application error: {}", err);
    }

    log::info!("Application shutdown complete");

    result
}
