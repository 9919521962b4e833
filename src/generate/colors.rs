//! Color guidance derived from reference screenshots.
//!
//! A capped subset of images is fetched and decoded concurrently; each image
//! contributes its dominant colors. A failing image is logged and skipped.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Mutex;

use futures::stream::{self, StreamExt};
use image::GenericImageView;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::types::{ColorInfo, ImageRef};
use crate::ports::images::ImageSource;

/// Side length images are reduced to before counting colors.
const THUMBNAIL_SIZE: u32 = 64;

/// A dominant color and the share of sampled pixels it covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedColor {
    /// The color.
    pub color: ColorInfo,
    /// Fraction of pixels in `0.0..=1.0`.
    pub share: f32,
}

/// Dominant colors of one reference image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePalette {
    /// Position of the image in the run's image list.
    pub index: usize,
    /// Colors, most dominant first.
    pub colors: Vec<WeightedColor>,
}

/// Advisory color guidance for prompts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColorGuidance {
    /// One palette per successfully analyzed image, in image order.
    pub palettes: Vec<ImagePalette>,
}

impl ColorGuidance {
    /// Whether no image could be analyzed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.palettes.is_empty()
    }

    /// Short prose summary for the prompt; empty when there is no guidance.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let (mut dark, mut light) = (0.0_f32, 0.0_f32);
        for palette in &self.palettes {
            let _ = write!(out, "Reference image {}:", palette.index + 1);
            for (i, weighted) in palette.colors.iter().enumerate() {
                let sep = if i == 0 { " " } else { ", " };
                let _ = write!(
                    out,
                    "{sep}{} ({}, {:.0}%)",
                    weighted.color.hex,
                    weighted.color.description,
                    weighted.share * 100.0
                );
                if weighted.color.is_dark {
                    dark += weighted.share;
                }
                if weighted.color.is_light {
                    light += weighted.share;
                }
            }
            out.push('\n');
        }
        if !out.is_empty() {
            let theme = if dark > light * 1.5 {
                "a dark theme"
            } else if light > dark * 1.5 {
                "a light theme"
            } else {
                "a mixed light/dark theme"
            };
            let _ = writeln!(out, "Overall the reference reads as {theme}.");
        }
        out
    }
}

/// Per-run memo of analyzed images, keyed by reference.
///
/// Owned by one pipeline run so a retried step does not refetch images.
#[derive(Debug, Default)]
pub struct ColorCache {
    entries: Mutex<HashMap<ImageRef, Vec<WeightedColor>>>,
}

impl ColorCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached images.
    ///
    /// # Panics
    ///
    /// Panics if the cache lock was poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .expect("color cache lock poisoned")
            .len()
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, image: &ImageRef) -> Option<Vec<WeightedColor>> {
        self.entries
            .lock()
            .expect("color cache lock poisoned")
            .get(image)
            .cloned()
    }

    fn insert(&self, image: ImageRef, colors: Vec<WeightedColor>) {
        self.entries
            .lock()
            .expect("color cache lock poisoned")
            .insert(image, colors);
    }
}

/// Limits for one analysis call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorLimits {
    /// Images sampled from the front of the list.
    pub max_images: usize,
    /// Images analyzed at the same time.
    pub concurrency: usize,
    /// Colors kept per image.
    pub colors_per_image: usize,
}

/// Analyzes up to `limits.max_images` images, reusing cached results.
pub async fn analyze_colors(
    source: &dyn ImageSource,
    images: &[ImageRef],
    cache: &ColorCache,
    limits: ColorLimits,
) -> ColorGuidance {
    let sampled: Vec<(usize, &ImageRef)> =
        images.iter().take(limits.max_images).enumerate().collect();
    let missing: Vec<(usize, &ImageRef)> = sampled
        .iter()
        .copied()
        .filter(|(_, image)| cache.get(image).is_none())
        .collect();

    let fetched: Vec<(usize, Option<Vec<WeightedColor>>)> = stream::iter(missing)
        .map(|(index, image)| async move {
            match analyze_one(source, image, limits.colors_per_image).await {
                Ok(colors) => {
                    debug!(image = %image.label(), colors = colors.len(), "analyzed image colors");
                    (index, Some(colors))
                }
                Err(e) => {
                    warn!(image = %image.label(), error = %e, "color analysis failed for image");
                    (index, None)
                }
            }
        })
        .buffer_unordered(limits.concurrency.max(1))
        .collect()
        .await;

    for (index, colors) in fetched {
        if let Some(colors) = colors {
            cache.insert(images[index].clone(), colors);
        }
    }

    let palettes = sampled
        .into_iter()
        .filter_map(|(index, image)| {
            cache
                .get(image)
                .map(|colors| ImagePalette { index, colors })
        })
        .collect();
    ColorGuidance { palettes }
}

async fn analyze_one(
    source: &dyn ImageSource,
    image: &ImageRef,
    count: usize,
) -> Result<Vec<WeightedColor>, String> {
    let bytes = source.fetch(image).await.map_err(|e| e.to_string())?;
    dominant_colors(&bytes, count).map_err(|e| e.to_string())
}

/// Decodes an image and returns its `count` most common colors.
///
/// # Errors
///
/// Returns an error if the bytes are not a supported image format.
pub fn dominant_colors(
    bytes: &[u8],
    count: usize,
) -> Result<Vec<WeightedColor>, image::ImageError> {
    let img = image::load_from_memory(bytes)?;
    let (width, height) = img.dimensions();
    let thumb = if width > THUMBNAIL_SIZE || height > THUMBNAIL_SIZE {
        img.thumbnail(THUMBNAIL_SIZE, THUMBNAIL_SIZE)
    } else {
        img
    };
    let rgb = thumb.to_rgb8();

    // Bucket by the top four bits of each channel, averaging inside a bucket.
    let mut buckets: HashMap<[u8; 3], (u32, [u32; 3])> = HashMap::new();
    for pixel in rgb.pixels() {
        let [r, g, b] = pixel.0;
        let entry = buckets
            .entry([r >> 4, g >> 4, b >> 4])
            .or_insert((0, [0; 3]));
        entry.0 += 1;
        entry.1[0] += u32::from(r);
        entry.1[1] += u32::from(g);
        entry.1[2] += u32::from(b);
    }

    let total: u32 = buckets.values().map(|(n, _)| n).sum();
    let mut ranked: Vec<(u32, [u32; 3])> = buckets.into_values().collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    Ok(ranked
        .into_iter()
        .take(count)
        .map(|(n, sums)| {
            let avg = sums.map(|s| u8::try_from(s / n).unwrap_or(u8::MAX));
            #[allow(clippy::cast_precision_loss)]
            let share = n as f32 / total.max(1) as f32;
            WeightedColor {
                color: describe_color(avg),
                share,
            }
        })
        .collect())
}

/// Builds a [`ColorInfo`] with a human-readable name for an RGB triple.
#[must_use]
pub fn describe_color(rgb: [u8; 3]) -> ColorInfo {
    let [r, g, b] = rgb.map(|c| f32::from(c) / 255.0);
    let luminance = 0.2126 * r + 0.7152 * g + 0.0722 * b;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let lightness = (max + min) / 2.0;
    let delta = max - min;
    let saturation = if delta == 0.0 {
        0.0
    } else {
        delta / (1.0 - (2.0 * lightness - 1.0).abs()).max(f32::EPSILON)
    };

    let description = if saturation < 0.12 || delta < 0.06 {
        if lightness < 0.12 {
            "black".to_string()
        } else if lightness > 0.93 {
            "white".to_string()
        } else {
            format!("{}gray", shade_prefix(lightness))
        }
    } else {
        let hue = if max == r {
            60.0 * ((g - b) / delta).rem_euclid(6.0)
        } else if max == g {
            60.0 * ((b - r) / delta + 2.0)
        } else {
            60.0 * ((r - g) / delta + 4.0)
        };
        format!("{}{}", shade_prefix(lightness), hue_name(hue))
    };

    ColorInfo {
        hex: format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2]),
        rgb,
        is_dark: luminance < 0.3,
        is_light: luminance > 0.8,
        description,
    }
}

fn shade_prefix(lightness: f32) -> &'static str {
    if lightness < 0.3 {
        "dark "
    } else if lightness > 0.75 {
        "light "
    } else {
        ""
    }
}

fn hue_name(hue: f32) -> &'static str {
    match hue {
        h if h < 15.0 => "red",
        h if h < 40.0 => "orange",
        h if h < 65.0 => "yellow",
        h if h < 160.0 => "green",
        h if h < 195.0 => "cyan",
        h if h < 255.0 => "blue",
        h if h < 290.0 => "purple",
        h if h < 335.0 => "pink",
        _ => "red",
    }
}
