// SPDX-License-Identifier: MIT OR Apache-2.0
//! Placeholder scene renderer.
//!
//! Produces a deterministic PNG preview: the skybox (or a sky gradient) as
//! background with a shaded block standing in for the model. Identical
//! scenes always give identical bytes, so downstream dedup sees a re-render
//! of an unchanged scene as the same image.

use image::{imageops, ImageFormat, Rgba, RgbaImage};
use pipeline_editor_graph::payload::ImageData;
use pipeline_editor_graph::services::{Renderer, SceneDescription, ServiceError};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::Cursor;

/// Largest accepted output dimension
const MAX_DIMENSION: u32 = 4096;

/// Renderer that rasterises a stand-in preview of the scene
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderRenderer;

impl PlaceholderRenderer {
    fn background(scene: &SceneDescription) -> RgbaImage {
        let (width, height) = (scene.width, scene.height);
        let decoded = scene
            .skybox
            .as_ref()
            .and_then(|skybox| image::load_from_memory(&skybox.bytes).ok());

        match decoded {
            Some(skybox) => imageops::resize(&skybox.to_rgba8(), width, height, imageops::FilterType::Triangle),
            None => RgbaImage::from_fn(width, height, |_, y| {
                let t = y as f32 / height.max(1) as f32;
                let lerp = |a: f32, b: f32| (a + (b - a) * t) as u8;
                Rgba([lerp(90.0, 200.0), lerp(140.0, 210.0), lerp(220.0, 230.0), 255])
            }),
        }
    }
}

impl Renderer for PlaceholderRenderer {
    fn render(&self, scene: &SceneDescription) -> Result<ImageData, ServiceError> {
        if scene.width == 0 || scene.height == 0 || scene.width > MAX_DIMENSION || scene.height > MAX_DIMENSION {
            return Err(ServiceError::Provider(format!(
                "invalid render size {}x{}",
                scene.width, scene.height
            )));
        }

        let mut canvas = Self::background(scene);

        // Model stand-in: a block tinted from the model's content
        let mut hasher = DefaultHasher::new();
        scene.model.bytes.hash(&mut hasher);
        let [r, g, b, ..] = hasher.finish().to_le_bytes();
        let (w, h) = (scene.width, scene.height);
        let (x0, y0, x1, y1) = (w * 3 / 8, h * 3 / 8, w * 5 / 8, h * 7 / 8);
        for y in y0..y1 {
            for x in x0..x1 {
                let shade = 1.0 - 0.4 * (x - x0) as f32 / (x1 - x0).max(1) as f32;
                let tint = |c: u8| ((c as f32 * 0.6 + 80.0) * shade) as u8;
                canvas.put_pixel(x, y, Rgba([tint(r), tint(g), tint(b), 255]));
            }
        }

        let mut encoded = Cursor::new(Vec::new());
        canvas
            .write_to(&mut encoded, ImageFormat::Png)
            .map_err(|err| ServiceError::Provider(format!("failed to encode render: {err}")))?;

        tracing::debug!(model = %scene.model.name, skybox = scene.skybox.is_some(), "Rendered placeholder scene");
        Ok(ImageData::png(encoded.into_inner(), w, h))
    }
}
