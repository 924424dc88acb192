//! Laplacian-variance sharpness check on OpenCV.

use crate::vision;
use image::RgbImage;
use opencv::core::{self, Mat, CV_64F};
use opencv::imgproc;
use opencv::prelude::*;

pub const DEFAULT_BLUR_THRESHOLD: f64 = 120.0;

/// `COLOR_BGR2GRAY` on the raw channel order: channel 0 is weighted as blue and
/// channel 2 as red, matching how the captured frames were converted when the
/// threshold was tuned.
pub fn grayscale(image: &RgbImage) -> opencv::Result<Mat> {
	let mut gray = Mat::default();
	imgproc::cvt_color_def(&vision::to_mat(image)?, &mut gray, imgproc::COLOR_BGR2GRAY)?;

	Ok(gray)
}

/// `[0 1 0; 1 -4 1; 0 1 0]` response in `CV_64F` with the default reflect-101 border.
pub fn laplacian(gray: &Mat) -> opencv::Result<Mat> {
	let mut response = Mat::default();
	imgproc::laplacian_def(gray, &mut response, CV_64F)?;

	Ok(response)
}

/// Population variance of a single-channel matrix.
pub fn variance(values: &Mat) -> opencv::Result<f64> {
	let mut mean = Mat::default();
	let mut stddev = Mat::default();
	core::mean_std_dev_def(values, &mut mean, &mut stddev)?;

	let stddev = *stddev.at::<f64>(0)?;
	Ok(stddev * stddev)
}

pub fn laplacian_variance(image: &RgbImage) -> opencv::Result<f64> {
	variance(&laplacian(&grayscale(image)?)?)
}

#[cfg(test)]
mod tests {
	use super::*;
	use image::{DynamicImage, GrayImage, Luma, Rgb};

	fn checkerboard(size: u32, cell: u32) -> RgbImage {
		RgbImage::from_fn(size, size, |x, y| {
			if (x / cell + y / cell) % 2 == 0 { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) }
		})
	}

	fn gray_mat(gray: &GrayImage) -> Mat {
		let mut mat = Mat::new_rows_cols_with_default(
			gray.height() as i32,
			gray.width() as i32,
			core::CV_8UC1,
			core::Scalar::all(0.0),
		)
		.unwrap();
		mat.data_bytes_mut().unwrap().copy_from_slice(gray.as_raw());
		mat
	}

	#[test]
	fn grayscale_weights_channel_zero_as_blue() {
		let image = RgbImage::from_fn(4, 1, |x, _| match x {
			0 => Rgb([255, 0, 0]),
			1 => Rgb([0, 255, 0]),
			2 => Rgb([0, 0, 255]),
			_ => Rgb([255, 255, 255]),
		});

		let gray = grayscale(&image).unwrap();

		assert_eq!(gray.data_bytes().unwrap(), &[29, 150, 76, 255]);
	}

	#[test]
	fn laplacian_reflects_borders() {
		let gray = GrayImage::from_fn(3, 3, |x, y| Luma([if (x, y) == (1, 1) { 255 } else { 0 }]));

		let response = laplacian(&gray_mat(&gray)).unwrap();

		assert_eq!(response.data_typed::<f64>().unwrap(), &[
			0.0, 510.0, 0.0,
			510.0, -1020.0, 510.0,
			0.0, 510.0, 0.0,
		]);
	}

	#[test]
	fn checkerboard_is_sharp() {
		assert!(laplacian_variance(&checkerboard(224, 8)).unwrap() > DEFAULT_BLUR_THRESHOLD);
	}

	#[test]
	fn flat_image_is_blurry() {
		let flat = RgbImage::from_pixel(224, 224, Rgb([90, 140, 30]));

		assert_eq!(laplacian_variance(&flat).unwrap(), 0.0);
	}

	#[test]
	fn shrunk_fine_stripes_stay_sharp() {
		// low-contrast stripes from a large frame, the way camera captures arrive
		let stripes = RgbImage::from_fn(672, 672, |x, _| if x % 6 < 3 { Rgb([108; 3]) } else { Rgb([100; 3]) });

		let resized = vision::resize(&DynamicImage::ImageRgb8(stripes), 224).unwrap();
		let variance = laplacian_variance(&resized).unwrap();

		assert!((variance - 256.0).abs() < 1e-6, "variance {variance}");
		assert!(variance > DEFAULT_BLUR_THRESHOLD);
	}
}
