//! `image` buffers in and out of OpenCV.
//!
//! Pixels keep their channel order when they cross over; nothing is swapped to BGR.

use image::{DynamicImage, RgbImage};
use opencv::core::{self, Mat, Scalar, Size, CV_8UC3};
use opencv::imgproc;
use opencv::prelude::*;

pub fn to_mat(image: &RgbImage) -> opencv::Result<Mat> {
	let (width, height) = image.dimensions();
	let mut mat = Mat::new_rows_cols_with_default(height as i32, width as i32, CV_8UC3, Scalar::all(0.0))?;
	mat.data_bytes_mut()?.copy_from_slice(image.as_raw());

	Ok(mat)
}

pub fn from_mat(mat: &Mat) -> opencv::Result<RgbImage> {
	RgbImage::from_raw(mat.cols() as u32, mat.rows() as u32, mat.data_bytes()?.to_vec())
		.ok_or_else(|| opencv::Error::new(core::StsBadArg, "expected a continuous 8-bit, 3 channel matrix"))
}

/// Forces three channels and resizes to `size`x`size` with `INTER_LINEAR`.
///
/// Training and serving both go through here so the model always sees the same pixels.
pub fn resize(image: &DynamicImage, size: u32) -> opencv::Result<RgbImage> {
	let source = to_mat(&image.to_rgb8())?;
	let mut resized = Mat::default();
	imgproc::resize(&source, &mut resized, Size::new(size as i32, size as i32), 0.0, 0.0, imgproc::INTER_LINEAR)?;

	from_mat(&resized)
}
