// renderer/texture.rs

use std::cell::Cell;
use std::path::Path;

use image::DynamicImage;
use thiserror::Error;

use crate::gfx::{
    BorderColour, FilterMode, Gpu, GpuHandle, ImageData, PixelFormat, SamplerParams, TextureId,
    TextureKind, WrapMode,
};
use crate::io;

#[derive(Debug, Error)]
pub enum TextureError {
    #[error("failed to read image: {0}")]
    Read(String),
    #[error("failed to decode image {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("unsupported channel count {channels} in {path}")]
    UnsupportedChannels { path: String, channels: u8 },
}

/// Storage format chosen from the decoded channel count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Red,
    Rgb,
    Rgba,
    Srgb,
    SrgbAlpha,
}

impl TextureFormat {
    /// Single-channel images stay linear even when gamma correction is on.
    pub fn select(channels: u8, gamma_correction: bool) -> Option<Self> {
        match (channels, gamma_correction) {
            (1, _) => Some(TextureFormat::Red),
            (3, false) => Some(TextureFormat::Rgb),
            (3, true) => Some(TextureFormat::Srgb),
            (4, false) => Some(TextureFormat::Rgba),
            (4, true) => Some(TextureFormat::SrgbAlpha),
            _ => None,
        }
    }

    pub fn pixel_format(self) -> PixelFormat {
        match self {
            TextureFormat::Red => PixelFormat::Red,
            TextureFormat::Rgb | TextureFormat::Srgb => PixelFormat::Rgb,
            TextureFormat::Rgba | TextureFormat::SrgbAlpha => PixelFormat::Rgba,
        }
    }

    pub fn is_srgb(self) -> bool {
        matches!(self, TextureFormat::Srgb | TextureFormat::SrgbAlpha)
    }
}

/// Sampler state that can be overridden after construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureParameter {
    WrapS,
    WrapT,
    WrapR,
    MinFilter,
    MagFilter,
    BorderColour,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureValue {
    Wrap(WrapMode),
    Filter(FilterMode),
    Border(BorderColour),
}

/// Apply one parameter override. Mismatched pairs and mipmapped
/// magnification filters are rejected, leaving `params` untouched.
pub fn apply_parameter(
    params: &mut SamplerParams,
    parameter: TextureParameter,
    value: TextureValue,
) -> bool {
    match (parameter, value) {
        (TextureParameter::WrapS, TextureValue::Wrap(mode)) => params.wrap_s = mode,
        (TextureParameter::WrapT, TextureValue::Wrap(mode)) => params.wrap_t = mode,
        (TextureParameter::WrapR, TextureValue::Wrap(mode)) => params.wrap_r = mode,
        (TextureParameter::MinFilter, TextureValue::Filter(filter)) => params.min_filter = filter,
        (TextureParameter::MagFilter, TextureValue::Filter(filter))
            if matches!(filter, FilterMode::Nearest | FilterMode::Linear) =>
        {
            params.mag_filter = filter
        }
        (TextureParameter::BorderColour, TextureValue::Border(colour)) => params.border = colour,
        _ => {
            log::warn!("Ignoring texture parameter {:?} = {:?}", parameter, value);
            return false;
        }
    }
    true
}

/// Convert a decoded image into upload-ready pixels for `format`.
pub fn image_data(image: &DynamicImage, format: TextureFormat) -> ImageData {
    let pixels = match format.pixel_format() {
        PixelFormat::Red => image.to_luma8().into_raw(),
        PixelFormat::Rgb => image.to_rgb8().into_raw(),
        PixelFormat::Rgba => image.to_rgba8().into_raw(),
    };
    ImageData {
        width: image.width(),
        height: image.height(),
        format: format.pixel_format(),
        srgb: format.is_srgb(),
        pixels,
    }
}

/// 2D image texture. A texture whose image failed to load is kept in a
/// not-ready state: it has no device handle and binding it does nothing.
pub struct Texture {
    handle: Option<GpuHandle<TextureId>>,
    label: String,
    width: u32,
    height: u32,
    format: Option<TextureFormat>,
    params: Cell<SamplerParams>,
}

impl Texture {
    /// Load `path`, logging and returning a not-ready texture on failure.
    pub fn load(gpu: &Gpu, path: impl AsRef<Path>, gamma_correction: bool) -> Self {
        let path = path.as_ref();
        match Self::try_load(gpu, path, gamma_correction) {
            Ok(texture) => texture,
            Err(err) => {
                log::error!("Texture failed to load at path {:?}: {}", path, err);
                Self::not_ready(path.display().to_string())
            }
        }
    }

    pub fn try_load(gpu: &Gpu, path: &Path, gamma_correction: bool) -> Result<Self, TextureError> {
        let bytes = io::load_binary(path).map_err(TextureError::Read)?;
        let image = image::load_from_memory(&bytes).map_err(|source| TextureError::Decode {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_image(gpu, &image, gamma_correction, &path.display().to_string())
    }

    pub fn from_image(
        gpu: &Gpu,
        image: &DynamicImage,
        gamma_correction: bool,
        label: &str,
    ) -> Result<Self, TextureError> {
        let channels = image.color().channel_count();
        let format = TextureFormat::select(channels, gamma_correction).ok_or_else(|| {
            TextureError::UnsupportedChannels {
                path: label.to_string(),
                channels,
            }
        })?;
        Ok(Self::from_data(gpu, &image_data(image, format), format, label))
    }

    pub fn from_data(gpu: &Gpu, data: &ImageData, format: TextureFormat, label: &str) -> Self {
        let id = gpu.with(|device| device.create_texture(data));
        log::debug!(
            "Loaded texture '{}' {}x{} as {:?}",
            label,
            data.width,
            data.height,
            format
        );
        Self {
            handle: Some(GpuHandle::new(gpu, id)),
            label: label.to_string(),
            width: data.width,
            height: data.height,
            format: Some(format),
            params: Cell::new(SamplerParams::default()),
        }
    }

    fn not_ready(label: String) -> Self {
        Self {
            handle: None,
            label,
            width: 0,
            height: 0,
            format: None,
            params: Cell::new(SamplerParams::default()),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.handle.is_some()
    }

    pub fn id(&self) -> Option<TextureId> {
        self.handle.as_ref().map(GpuHandle::id)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> Option<TextureFormat> {
        self.format
    }

    pub fn params(&self) -> SamplerParams {
        self.params.get()
    }

    /// Takes effect the next time the texture is bound.
    pub fn set_parameter(&self, parameter: TextureParameter, value: TextureValue) {
        let mut params = self.params.get();
        if apply_parameter(&mut params, parameter, value) {
            self.params.set(params);
        }
    }

    /// Bind to `unit` with the current sampler state. Returns false for a
    /// not-ready texture.
    pub fn bind(&self, unit: u32) -> bool {
        let Some(handle) = &self.handle else {
            return false;
        };
        let (id, params) = (handle.id(), self.params.get());
        handle
            .gpu()
            .with(|device| device.bind_texture(unit, id, TextureKind::Texture2d, params));
        true
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("label", &self.label)
            .field("id", &self.id())
            .field("size", &self.size())
            .field("format", &self.format)
            .finish()
    }
}
