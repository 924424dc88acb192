//! Random affine augmentation for training images.
//!
//! Every draw samples a rotation, shift, shear and zoom around the image center plus an
//! optional horizontal mirror. Pixels that map outside the source take the nearest edge
//! pixel.

use burn::config::Config;
use image::{imageops, RgbImage};
use rand::Rng;

#[derive(Config, Debug)]
pub struct AugmentationConfig {
	/// Degrees, sampled in `[-range, range]`.
	#[config(default = 30.0)]
	pub rotation_range: f32,
	/// Fraction of the width.
	#[config(default = 0.2)]
	pub width_shift_range: f32,
	/// Fraction of the height.
	#[config(default = 0.2)]
	pub height_shift_range: f32,
	/// Shear angle in degrees, counter-clockwise.
	#[config(default = 0.2)]
	pub shear_range: f32,
	/// Each axis is zoomed independently within `[1 - range, 1 + range]`.
	#[config(default = 0.2)]
	pub zoom_range: f32,
	#[config(default = true)]
	pub horizontal_flip: bool,
}

impl AugmentationConfig {
	/// A config whose transforms are always the identity.
	pub fn disabled() -> Self {
		Self::new()
			.with_rotation_range(0.0)
			.with_width_shift_range(0.0)
			.with_height_shift_range(0.0)
			.with_shear_range(0.0)
			.with_zoom_range(0.0)
			.with_horizontal_flip(false)
	}

	pub fn sample<R: Rng + ?Sized>(&self, height: u32, width: u32, rng: &mut R) -> Transform {
		Transform {
			rotation: symmetric(rng, self.rotation_range).to_radians(),
			shift_rows: symmetric(rng, self.height_shift_range) * height as f32,
			shift_cols: symmetric(rng, self.width_shift_range) * width as f32,
			shear: symmetric(rng, self.shear_range).to_radians(),
			zoom_rows: 1.0 + symmetric(rng, self.zoom_range),
			zoom_cols: 1.0 + symmetric(rng, self.zoom_range),
			flip: self.horizontal_flip && rng.gen_bool(0.5),
		}
	}

	pub fn apply<R: Rng + ?Sized>(&self, image: &RgbImage, rng: &mut R) -> RgbImage {
		self.sample(image.height(), image.width(), rng).apply(image)
	}
}

fn symmetric<R: Rng + ?Sized>(rng: &mut R, range: f32) -> f32 {
	if range <= 0.0 {
		return 0.0;
	}

	rng.gen_range(-range..=range)
}

/// One sampled augmentation. Offsets are in pixels, angles in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
	pub rotation: f32,
	pub shift_rows: f32,
	pub shift_cols: f32,
	pub shear: f32,
	pub zoom_rows: f32,
	pub zoom_cols: f32,
	pub flip: bool,
}

impl Transform {
	pub fn identity() -> Self {
		Self {
			rotation: 0.0,
			shift_rows: 0.0,
			shift_cols: 0.0,
			shear: 0.0,
			zoom_rows: 1.0,
			zoom_cols: 1.0,
			flip: false,
		}
	}

	/// Maps an output pixel (relative to the center) to its source position,
	/// composing rotation, shift, shear and zoom in that order.
	fn source(&self, row: f32, col: f32) -> (f32, f32) {
		let (row, col) = (row * self.zoom_rows, col * self.zoom_cols);
		let (row, col) = (row - self.shear.sin() * col, self.shear.cos() * col);
		let (row, col) = (row + self.shift_rows, col + self.shift_cols);
		let (sin, cos) = self.rotation.sin_cos();

		(cos * row - sin * col, sin * row + cos * col)
	}

	pub fn apply(&self, image: &RgbImage) -> RgbImage {
		let (width, height) = image.dimensions();
		if width == 0 || height == 0 {
			return image.clone();
		}

		let center_row = (height as f32 - 1.0) / 2.0;
		let center_col = (width as f32 - 1.0) / 2.0;

		let warped = RgbImage::from_fn(width, height, |x, y| {
			let (row, col) = self.source(y as f32 - center_row, x as f32 - center_col);
			let src_y = (row + center_row).round().clamp(0.0, height as f32 - 1.0) as u32;
			let src_x = (col + center_col).round().clamp(0.0, width as f32 - 1.0) as u32;

			*image.get_pixel(src_x, src_y)
		});

		if self.flip {
			imageops::flip_horizontal(&warped)
		} else {
			warped
		}
	}
}
