// src/annotate.rs
//
// Frame annotation and JPEG encoding. All OpenCV drawing lives here; the
// rest of the pipeline works on raw RGB buffers.

use crate::types::{Detection, Frame, LightStatus};
use anyhow::Result;
use opencv::{
    core::{self, Mat},
    imgcodecs, imgproc,
    prelude::*,
};

const RED: core::Scalar = core::Scalar::new(0.0, 0.0, 255.0, 0.0);
const WHITE: core::Scalar = core::Scalar::new(255.0, 255.0, 255.0, 0.0);

/// RGB frame buffer → drawable BGR Mat.
pub fn to_bgr_mat(frame: &Frame) -> Result<Mat> {
    let mat = Mat::from_slice(&frame.data)?;
    let mat = mat.reshape(3, frame.height as i32)?;

    let mut bgr = Mat::default();
    imgproc::cvt_color(&mat, &mut bgr, imgproc::COLOR_RGB2BGR, 0)?;
    Ok(bgr)
}

/// Visible marker for frames captured outside the operating window.
pub fn draw_disabled_marker(mat: &mut Mat) -> Result<()> {
    imgproc::put_text(
        mat,
        "Detection disabled (night mode)",
        core::Point::new(10, 100),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.9,
        RED,
        2,
        imgproc::LINE_AA,
        false,
    )?;
    Ok(())
}

/// Small status line so the stream shows what the classifier inferred.
pub fn draw_light_status(mat: &mut Mat, status: &LightStatus) -> Result<()> {
    let text = format!(
        "NS: {} | WE: {}",
        status.north_south.as_str(),
        status.west_east.as_str()
    );
    imgproc::put_text(
        mat,
        &text,
        core::Point::new(10, 30),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.7,
        WHITE,
        2,
        imgproc::LINE_AA,
        false,
    )?;
    Ok(())
}

/// Box every violating vehicle in red with a caption.
pub fn draw_violations(mat: &mut Mat, violations: &[Detection]) -> Result<()> {
    for det in violations {
        let [x1, y1, x2, y2] = det.bbox;
        let rect = core::Rect::new(
            x1 as i32,
            y1 as i32,
            (x2 - x1) as i32,
            (y2 - y1) as i32,
        );
        imgproc::rectangle(mat, rect, RED, 2, imgproc::LINE_8, 0)?;
        imgproc::put_text(
            mat,
            "VIOLATION!",
            core::Point::new(x1 as i32, y1 as i32 - 10),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.7,
            RED,
            2,
            imgproc::LINE_8,
            false,
        )?;
    }
    Ok(())
}

pub fn encode_jpeg(mat: &Mat, quality: i32) -> Result<Vec<u8>> {
    let mut buf = core::Vector::<u8>::new();
    let params = core::Vector::<i32>::from_slice(&[imgcodecs::IMWRITE_JPEG_QUALITY, quality]);
    imgcodecs::imencode(".jpg", mat, &mut buf, &params)?;
    Ok(buf.to_vec())
}
