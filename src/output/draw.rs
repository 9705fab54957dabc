// 该文件是 Shibie （识别） 项目的一部分。
// src/output/draw.rs - 识别与采集画面的叠加绘制
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use super::{LabelView, OutputError, RecognitionView, RecordingView, Scene};
use crate::config::DISPLAY_SIZE;
use crate::detect::BoundingBox;

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 40.0;
const ACCURACY_FONT_SIZE: f32 = 22.0;
const BANNER_FONT_SIZE: f32 = 22.0;
const LABEL_TOP: i32 = 20;
const CORNER_MARGIN: i32 = 20;
const BOX_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const LABEL_COLOR: [u8; 3] = [0, 255, 0];
const FAULT_COLOR: [u8; 3] = [255, 0, 0];
const ACCURACY_COLOR: [u8; 3] = [255, 255, 0]; // 黄色
const RECORDING_COLOR: [u8; 3] = [255, 0, 0];
const EDGE_COLOR: [u8; 3] = [0, 255, 0];

/// 内置字体（DejaVu Sans），未指定 `?font=` 时使用
const EMBEDDED_FONT: &[u8] = include_bytes!("../../assets/font.ttf");

pub struct Draw {
  font: FontArc,
  label_scale: PxScale,
  accuracy_scale: PxScale,
  banner_scale: PxScale,
  display_size: u32,
}

impl Draw {
  pub fn with_font(font: FontArc) -> Self {
    Self {
      font,
      label_scale: PxScale::from(LABEL_FONT_SIZE),
      accuracy_scale: PxScale::from(ACCURACY_FONT_SIZE),
      banner_scale: PxScale::from(BANNER_FONT_SIZE),
      display_size: DISPLAY_SIZE,
    }
  }

  pub fn embedded() -> Result<Self, OutputError> {
    let font = FontArc::try_from_slice(EMBEDDED_FONT)
      .map_err(|e| OutputError::FontError(format!("内置字体: {}", e)))?;
    Ok(Self::with_font(font))
  }

  pub fn with_font_file(path: &Path) -> Result<Self, OutputError> {
    Ok(Self::with_font(load_font(path)?))
  }

  /// 指定了字体就必须能加载，否则使用内置字体
  pub fn from_font_option(path: Option<&Path>) -> Result<Self, OutputError> {
    match path {
      Some(path) => Self::with_font_file(path),
      None => Self::embedded(),
    }
  }

  pub fn render(&self, scene: &Scene<'_>) -> RgbImage {
    match scene {
      Scene::Recording(view) => self.render_recording(view),
      Scene::Recognition(view) => self.render_recognition(view),
    }
  }

  /// 原始帧 + 辅助框 + 顶部居中的类别 + 右下角的准确率
  pub fn render_recognition(&self, view: &RecognitionView<'_>) -> RgbImage {
    let mut image = view.frame.image.clone();
    for bbox in view.boxes {
      draw_box(&mut image, bbox, Rgb(BOX_COLOR));
    }

    let (text, color) = match view.label {
      LabelView::Class(name) => (format!("Object: {}", name), LABEL_COLOR),
      LabelView::Fault(message) => (format!("Error: {}", message), FAULT_COLOR),
    };
    self.draw_centered(&mut image, &text, LABEL_TOP, self.label_scale, Rgb(color));

    let accuracy = format!("Model accuracy: {:.2}%", view.accuracy * 100.0);
    self.draw_bottom_right(&mut image, &accuracy, self.accuracy_scale, Rgb(ACCURACY_COLOR));
    image
  }

  /// 左：原始帧与录制提示；右：模型看到的灰度图与边缘
  pub fn render_recording(&self, view: &RecordingView<'_>) -> RgbImage {
    let size = self.display_size;
    let mut left = imageops::resize(&view.frame.image, size, size, FilterType::Triangle);
    let banner = format!("Recording: {} ({})", view.class, view.saved);
    self.draw_text(&mut left, &banner, 10, 10, self.banner_scale, Rgb(RECORDING_COLOR));

    let (width, height) = view.model_view.dimensions();
    let model_view = RgbImage::from_fn(width, height, |x, y| {
      let on_edge = view.edges.get_pixel_checked(x, y).is_some_and(|p| p[0] > 0);
      if on_edge {
        Rgb(EDGE_COLOR)
      } else {
        let v = view.model_view.get_pixel(x, y)[0];
        Rgb([v, v, v])
      }
    });
    let right = imageops::resize(&model_view, size, size, FilterType::Nearest);

    let mut combined = RgbImage::new(size * 2, size);
    imageops::replace(&mut combined, &left, 0, 0);
    imageops::replace(&mut combined, &right, size as i64, 0);
    combined
  }

  fn draw_text(
    &self,
    image: &mut RgbImage,
    text: &str,
    x: i32,
    y: i32,
    scale: PxScale,
    color: Rgb<u8>,
  ) {
    draw_text_mut(image, color, x, y, scale, &self.font, text);
  }

  fn draw_centered(
    &self,
    image: &mut RgbImage,
    text: &str,
    y: i32,
    scale: PxScale,
    color: Rgb<u8>,
  ) {
    let (text_w, _) = text_size(scale, &self.font, text);
    let x = (image.width() as i32 - text_w as i32) / 2;
    self.draw_text(image, text, x.max(0), y, scale, color);
  }

  fn draw_bottom_right(&self, image: &mut RgbImage, text: &str, scale: PxScale, color: Rgb<u8>) {
    let (text_w, text_h) = text_size(scale, &self.font, text);
    let x = image.width() as i32 - text_w as i32 - CORNER_MARGIN;
    let y = image.height() as i32 - text_h as i32 - CORNER_MARGIN;
    self.draw_text(image, text, x.max(0), y.max(0), scale, color);
  }
}

fn load_font(path: &Path) -> Result<FontArc, OutputError> {
  let data = std::fs::read(path)?;
  FontArc::try_from_vec(data)
    .map_err(|e| OutputError::FontError(format!("{}: {}", path.display(), e)))
}

/// 两像素宽的空心框
fn draw_box(image: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
  if bbox.width == 0 || bbox.height == 0 {
    return;
  }
  let rect = Rect::at(bbox.x as i32, bbox.y as i32).of_size(bbox.width, bbox.height);
  draw_hollow_rect_mut(image, rect, color);

  if bbox.width > 2 && bbox.height > 2 {
    let inner =
      Rect::at(bbox.x as i32 + 1, bbox.y as i32 + 1).of_size(bbox.width - 2, bbox.height - 2);
    draw_hollow_rect_mut(image, inner, color);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::Frame;
  use image::GrayImage;

  #[test]
  fn recognition_keeps_frame_size_and_draws_boxes() {
    let frame = Frame::from(RgbImage::new(400, 300));
    let boxes = [BoundingBox {
      x: 10,
      y: 10,
      width: 30,
      height: 20,
    }];
    let view = RecognitionView {
      frame: &frame,
      label: LabelView::Class("cube"),
      accuracy: 0.75,
      boxes: &boxes,
    };

    let image = Draw::embedded().unwrap().render_recognition(&view);
    assert_eq!(image.dimensions(), (400, 300));
    assert_eq!(*image.get_pixel(10, 10), Rgb(BOX_COLOR));
    assert_eq!(*image.get_pixel(11, 11), Rgb(BOX_COLOR));
    assert_eq!(*image.get_pixel(20, 15), Rgb([0, 0, 0]));
  }

  #[test]
  fn recording_is_side_by_side() {
    let frame = Frame::from(RgbImage::new(64, 48));
    let model_view = GrayImage::new(16, 16);
    let mut edges = GrayImage::new(16, 16);
    edges.put_pixel(0, 0, image::Luma([255]));
    let view = RecordingView {
      frame: &frame,
      class: "book",
      model_view: &model_view,
      edges: &edges,
      saved: 3,
    };

    let image = Draw::embedded().unwrap().render_recording(&view);
    assert_eq!(image.dimensions(), (DISPLAY_SIZE * 2, DISPLAY_SIZE));
    assert_eq!(*image.get_pixel(DISPLAY_SIZE, 0), Rgb(EDGE_COLOR));
  }

  #[test]
  fn missing_font_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Draw::with_font_file(&dir.path().join("none.ttf")).is_err());
    std::fs::write(dir.path().join("bad.ttf"), b"not a font").unwrap();
    assert!(matches!(
      Draw::with_font_file(&dir.path().join("bad.ttf")),
      Err(OutputError::FontError(_))
    ));
  }

  #[test]
  fn recognition_overlay_carries_label_and_accuracy() {
    let frame = Frame::from(RgbImage::new(400, 300));
    let view = RecognitionView {
      frame: &frame,
      label: LabelView::Class("book"),
      accuracy: 0.5,
      boxes: &[],
    };

    let image = Draw::embedded().unwrap().render_recognition(&view);
    let lit = |rows: std::ops::Range<u32>| {
      rows
        .flat_map(|y| (0..image.width()).map(move |x| (x, y)))
        .filter(|&(x, y)| *image.get_pixel(x, y) != Rgb([0, 0, 0]))
        .count()
    };
    // 顶部是类别，底部是准确率
    assert!(lit(0..100) > 0);
    assert!(lit(200..300) > 0);
    assert_eq!(lit(120..180), 0);
  }
}
