use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSettings {
    #[serde(default = "RenderSettings::default_title")]
    pub title: String,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default)]
    pub present_mode: PresentModeSetting,
    #[serde(default = "RenderSettings::default_shadow_map_size")]
    pub shadow_map_size: u32,
    /// Frames per second; 0 renders every frame the loop produces.
    #[serde(default = "RenderSettings::default_fps_limit")]
    pub fps_limit: u32,
    #[serde(default = "RenderSettings::default_gamma_correction")]
    pub gamma_correction: bool,
    #[serde(default = "RenderSettings::default_assets_dir")]
    pub assets_dir: PathBuf,
    #[serde(default = "RenderSettings::default_shaders_dir")]
    pub shaders_dir: PathBuf,
    #[serde(default)]
    pub demo: DemoSetting,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            title: Self::default_title(),
            resolution: Resolution::default(),
            present_mode: PresentModeSetting::default(),
            shadow_map_size: Self::default_shadow_map_size(),
            fps_limit: Self::default_fps_limit(),
            gamma_correction: Self::default_gamma_correction(),
            assets_dir: Self::default_assets_dir(),
            shaders_dir: Self::default_shaders_dir(),
            demo: DemoSetting::default(),
        }
    }
}

impl RenderSettings {
    pub fn load() -> Self {
        Self::load_from_path("settings.json")
    }

    /// Read settings from a JSON file. A missing or malformed file yields
    /// the defaults; present files are validated field by field.
    pub fn load_from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("No settings at {:?}, using defaults", path);
                return Self::default();
            }
            Err(err) => {
                warn!("Could not read {:?} ({}), using defaults", path, err);
                return Self::default();
            }
        };
        match serde_json::from_str::<RenderSettings>(&contents) {
            Ok(settings) => {
                info!("Loaded settings from {:?}", path);
                settings.validate()
            }
            Err(err) => {
                warn!("Invalid settings in {:?} ({}), using defaults", path, err);
                Self::default()
            }
        }
    }

    fn validate(mut self) -> Self {
        if self.shadow_map_size == 0 {
            warn!("Shadow map size must be greater than zero. Using default value.");
            self.shadow_map_size = Self::default_shadow_map_size();
        }

        if self.resolution.width == 0 || self.resolution.height == 0 {
            warn!("Resolution must be greater than zero. Using default resolution.");
            self.resolution = Resolution::default();
        }

        if self.title.trim().is_empty() {
            warn!("Window title is empty. Using default title.");
            self.title = Self::default_title();
        }

        self
    }

    /// The configured present mode if the surface offers it, otherwise FIFO,
    /// otherwise whatever the surface lists first.
    pub fn present_mode(&self, available: &[wgpu::PresentMode]) -> wgpu::PresentMode {
        let desired = self.present_mode.to_wgpu();
        if available.contains(&desired) {
            return desired;
        }
        let fallback = if available.contains(&wgpu::PresentMode::Fifo) {
            wgpu::PresentMode::Fifo
        } else {
            available.first().copied().unwrap_or(wgpu::PresentMode::Fifo)
        };
        warn!("Present mode {:?} unavailable, using {:?}", desired, fallback);
        fallback
    }

    /// Resolve a path relative to the asset directory.
    pub fn asset(&self, relative: &str) -> PathBuf {
        self.assets_dir.join(relative)
    }

    /// Resolve a path relative to the shader directory.
    pub fn shader(&self, relative: &str) -> PathBuf {
        self.shaders_dir.join(relative)
    }

    fn default_title() -> String {
        "forward-scene".to_string()
    }

    const fn default_shadow_map_size() -> u32 {
        1024
    }

    const fn default_fps_limit() -> u32 {
        60
    }

    const fn default_gamma_correction() -> bool {
        true
    }

    fn default_assets_dir() -> PathBuf {
        PathBuf::from("assets")
    }

    fn default_shaders_dir() -> PathBuf {
        PathBuf::from("shaders")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 900,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeSetting {
    Fifo,
    FifoRelaxed,
    Immediate,
    Mailbox,
    AutoVsync,
    AutoNoVsync,
}

impl PresentModeSetting {
    fn to_wgpu(&self) -> wgpu::PresentMode {
        match self {
            PresentModeSetting::Fifo => wgpu::PresentMode::Fifo,
            PresentModeSetting::FifoRelaxed => wgpu::PresentMode::FifoRelaxed,
            PresentModeSetting::Immediate => wgpu::PresentMode::Immediate,
            PresentModeSetting::Mailbox => wgpu::PresentMode::Mailbox,
            PresentModeSetting::AutoVsync => wgpu::PresentMode::AutoVsync,
            PresentModeSetting::AutoNoVsync => wgpu::PresentMode::AutoNoVsync,
        }
    }
}

impl Default for PresentModeSetting {
    fn default() -> Self {
        PresentModeSetting::Fifo
    }
}

/// Which demo the application opens with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DemoSetting {
    ShadowCourtyard,
    LightCasters,
    ModelViewer { path: String, scale: f32 },
    AsteroidField {
        #[serde(default = "DemoSetting::default_asteroid_count")]
        amount: usize,
    },
}

impl DemoSetting {
    fn default_asteroid_count() -> usize {
        1000
    }
}

impl Default for DemoSetting {
    fn default() -> Self {
        DemoSetting::ShadowCourtyard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid_settings() -> RenderSettings {
        RenderSettings {
            title: "  ".into(),
            shadow_map_size: 0,
            resolution: Resolution {
                width: 0,
                height: 0,
            },
            present_mode: PresentModeSetting::Immediate,
            ..RenderSettings::default()
        }
    }

    #[test]
    fn validate_replaces_invalid_values_with_defaults() {
        let validated = invalid_settings().validate();

        assert_eq!(
            validated.shadow_map_size,
            RenderSettings::default().shadow_map_size
        );
        assert_eq!(validated.resolution.width, Resolution::default().width);
        assert_eq!(validated.resolution.height, Resolution::default().height);
        assert_eq!(validated.title, RenderSettings::default().title);
    }

    #[test]
    fn validate_preserves_valid_values() {
        let valid = RenderSettings {
            shadow_map_size: 2048,
            resolution: Resolution {
                width: 1920,
                height: 1080,
            },
            present_mode: PresentModeSetting::Mailbox,
            fps_limit: 0,
            gamma_correction: false,
            ..RenderSettings::default()
        };

        let validated = valid.clone().validate();

        assert_eq!(validated.shadow_map_size, valid.shadow_map_size);
        assert_eq!(validated.resolution.width, valid.resolution.width);
        assert_eq!(validated.resolution.height, valid.resolution.height);
        assert_eq!(validated.fps_limit, 0);
        assert!(!validated.gamma_correction);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let settings: RenderSettings =
            serde_json::from_str(r#"{ "fps_limit": 30 }"#).expect("valid json");

        assert_eq!(settings.fps_limit, 30);
        assert!(settings.gamma_correction);
        assert_eq!(settings.resolution.width, 1200);
        assert_eq!(settings.resolution.height, 900);
        assert_eq!(settings.demo, DemoSetting::ShadowCourtyard);
        assert_eq!(settings.assets_dir, PathBuf::from("assets"));
    }

    #[test]
    fn model_viewer_demo_parses_with_path() {
        let settings: RenderSettings = serde_json::from_str(
            r#"{ "demo": { "kind": "model_viewer", "path": "backpack/backpack.obj", "scale": 0.5 } }"#,
        )
        .expect("valid json");

        assert_eq!(
            settings.demo,
            DemoSetting::ModelViewer {
                path: "backpack/backpack.obj".into(),
                scale: 0.5
            }
        );
    }

    #[test]
    fn asteroid_field_amount_defaults() {
        let settings: RenderSettings =
            serde_json::from_str(r#"{ "demo": { "kind": "asteroid_field" } }"#).expect("valid json");
        assert_eq!(settings.demo, DemoSetting::AsteroidField { amount: 1000 });
    }

    #[test]
    fn missing_settings_file_uses_defaults() {
        let settings = RenderSettings::load_from_path("definitely/not/here/settings.json");
        assert_eq!(settings.fps_limit, RenderSettings::default().fps_limit);
    }

    #[test]
    fn present_mode_prefers_configured_then_fifo() {
        use wgpu::PresentMode::*;
        let settings = RenderSettings {
            present_mode: PresentModeSetting::Mailbox,
            ..RenderSettings::default()
        };

        assert_eq!(settings.present_mode(&[Fifo, Mailbox]), Mailbox);
        assert_eq!(settings.present_mode(&[Immediate, Fifo]), Fifo);
        assert_eq!(settings.present_mode(&[Immediate]), Immediate);
        assert_eq!(settings.present_mode(&[]), Fifo);
    }
}
