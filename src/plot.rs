use std::io::Cursor;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use plotters::prelude::LineSeries;
use plotters::prelude::*;
use crate::error::MonitorError;
use crate::session::SessionSnapshot;
use crate::types::CardiacClass;
#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
}
impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 900,
            height: 300,
            background: RGBColor(10, 10, 10),
        }
    }
}
/// Trace colour for the current rhythm.
pub fn class_color(class: Option<CardiacClass>) -> RGBColor {
    match class {
        None | Some(CardiacClass::Normal) => RGBColor(0, 255, 0),
        Some(CardiacClass::Tachycardia) => RGBColor(255, 170, 0),
        Some(CardiacClass::Bradycardia) => RGBColor(0, 170, 255),
        Some(CardiacClass::Arrhythmia) => RGBColor(255, 0, 0),
    }
}
/// Renders the waveform window of a snapshot. X runs in seconds relative to
/// the newest sample; the trace takes the colour of the current rhythm.
pub fn render_waveform_png(
    snapshot: &SessionSnapshot,
    style: PlotStyle,
) -> Result<Vec<u8>, MonitorError> {
    let Some(newest) = snapshot.waveform.last() else {
        return Err(MonitorError::Plot("waveform window is empty".into()));
    };
    let points: Vec<(f64, f64)> = snapshot
        .waveform
        .iter()
        .map(|s| (s.timestamp.saturating_sub(newest.timestamp) as f64 / 1000.0, s.value))
        .collect();
    let x_min = points.first().map(|p| p.0).unwrap_or(0.0).min(-0.001);
    let (y_min, y_max) = points
        .iter()
        .fold((f64::MAX, f64::MIN), |(lo, hi), p| (lo.min(p.1), hi.max(p.1)));
    let y_bounds = if (y_max - y_min).abs() < f64::EPSILON {
        (y_min - 1.0, y_max + 1.0)
    } else {
        let pad = (y_max - y_min) * 0.1;
        (y_min - pad, y_max + pad)
    };
    let color = class_color(snapshot.current_class());
    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        // no text: the bitmap must render without any system fonts
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .build_cartesian_2d(x_min..0f64, y_bounds.0..y_bounds.1)?;
        chart
            .configure_mesh()
            .x_labels(0)
            .y_labels(0)
            .light_line_style(&WHITE.mix(0.1))
            .bold_line_style(&WHITE.mix(0.2))
            .draw()?;
        chart.draw_series(LineSeries::new(points, &color))?;
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}
fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>, MonitorError> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| MonitorError::Plot("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    let dynamic = DynamicImage::ImageRgb8(image);
    dynamic.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}
