// Loss curve plot: discriminator and generator loss against training step,
// rendered as a standalone SVG with the `svg` crate.

use crate::error::PipelineError;
use crate::gan::LossHistory;
use std::path::Path;
use svg::Document;
use svg::node::element::{Line, Polyline, Rectangle, Text as SvgText};

const WIDTH: f64 = 800.0;
const HEIGHT: f64 = 500.0;
const MARGIN_LEFT: f64 = 70.0;
const MARGIN_RIGHT: f64 = 30.0;
const MARGIN_TOP: f64 = 50.0;
const MARGIN_BOTTOM: f64 = 60.0;
const Y_TICKS: usize = 5;

const D_COLOR: &str = "#1f77b4";
const G_COLOR: &str = "#ff7f0e";

/// Map data coordinates into the plot area.
struct Frame {
    x_min: f64,
    x_max: f64,
    y_max: f64,
}

impl Frame {
    fn x(&self, step: f64) -> f64 {
        let span = (self.x_max - self.x_min).max(1.0);
        MARGIN_LEFT + (step - self.x_min) / span * (WIDTH - MARGIN_LEFT - MARGIN_RIGHT)
    }

    fn y(&self, loss: f64) -> f64 {
        HEIGHT - MARGIN_BOTTOM - loss / self.y_max * (HEIGHT - MARGIN_TOP - MARGIN_BOTTOM)
    }
}

pub fn render_loss_plot(history: &LossHistory) -> Document {
    let steps = history.samples.iter().map(|s| s.step as f64);
    let x_min = steps.clone().fold(f64::INFINITY, f64::min);
    let x_max = steps.fold(f64::NEG_INFINITY, f64::max);
    let y_max = history
        .samples
        .iter()
        .flat_map(|s| [f64::from(s.d_loss), f64::from(s.g_loss)])
        .filter(|v| v.is_finite())
        .fold(0.0, f64::max);
    let frame = Frame {
        x_min: if x_min.is_finite() { x_min } else { 0.0 },
        x_max: if x_max.is_finite() { x_max } else { 1.0 },
        y_max: if y_max > 0.0 { y_max * 1.05 } else { 1.0 },
    };

    let mut doc = Document::new()
        .set("viewBox", (0, 0, WIDTH, HEIGHT))
        .set("width", WIDTH)
        .set("height", HEIGHT);
    doc = doc.add(
        Rectangle::new()
            .set("width", WIDTH)
            .set("height", HEIGHT)
            .set("fill", "white"),
    );
    doc = doc.add(
        SvgText::new("GAN Loss per Epoch")
            .set("x", WIDTH / 2.0)
            .set("y", 30)
            .set("font-family", "Arial")
            .set("font-size", 18)
            .set("text-anchor", "middle"),
    );

    // Axes
    let bottom = HEIGHT - MARGIN_BOTTOM;
    doc = doc
        .add(axis_line(MARGIN_LEFT, bottom, WIDTH - MARGIN_RIGHT, bottom))
        .add(axis_line(MARGIN_LEFT, MARGIN_TOP, MARGIN_LEFT, bottom));
    for i in 0..=Y_TICKS {
        let value = frame.y_max * i as f64 / Y_TICKS as f64;
        let y = frame.y(value);
        doc = doc
            .add(
                Line::new()
                    .set("x1", MARGIN_LEFT)
                    .set("y1", y)
                    .set("x2", WIDTH - MARGIN_RIGHT)
                    .set("y2", y)
                    .set("stroke", "#E8E8E8")
                    .set("stroke-width", 1),
            )
            .add(label(format!("{value:.2}"), MARGIN_LEFT - 8.0, y + 4.0, "end"));
    }
    doc = doc
        .add(label(format!("{}", frame.x_min), MARGIN_LEFT, bottom + 18.0, "middle"))
        .add(label(format!("{}", frame.x_max), WIDTH - MARGIN_RIGHT, bottom + 18.0, "middle"))
        .add(label("Epoch".to_string(), WIDTH / 2.0, HEIGHT - 15.0, "middle"))
        .add(label("Loss".to_string(), 20.0, HEIGHT / 2.0, "middle"));

    let d_points = history
        .samples
        .iter()
        .map(|s| (s.step as f64, f64::from(s.d_loss)));
    let g_points = history
        .samples
        .iter()
        .map(|s| (s.step as f64, f64::from(s.g_loss)));
    doc = doc
        .add(curve(&frame, d_points, D_COLOR))
        .add(curve(&frame, g_points, G_COLOR));

    // Legend
    for (i, (name, color)) in [("Discriminator", D_COLOR), ("Generator", G_COLOR)]
        .into_iter()
        .enumerate()
    {
        let y = MARGIN_TOP + 15.0 + 20.0 * i as f64;
        let x = WIDTH - MARGIN_RIGHT - 150.0;
        doc = doc
            .add(
                Line::new()
                    .set("x1", x)
                    .set("y1", y)
                    .set("x2", x + 25.0)
                    .set("y2", y)
                    .set("stroke", color)
                    .set("stroke-width", 2),
            )
            .add(label(name.to_string(), x + 32.0, y + 4.0, "start"));
    }
    doc
}

/// Render the loss plot and save it to `path`.
pub fn write_loss_plot(history: &LossHistory, path: &Path) -> Result<(), PipelineError> {
    svg::save(path, &render_loss_plot(history)).map_err(PipelineError::io(path))
}

fn axis_line(x1: f64, y1: f64, x2: f64, y2: f64) -> Line {
    Line::new()
        .set("x1", x1)
        .set("y1", y1)
        .set("x2", x2)
        .set("y2", y2)
        .set("stroke", "#444")
        .set("stroke-width", 1.5)
}

fn label(text: String, x: f64, y: f64, anchor: &str) -> SvgText {
    SvgText::new(text)
        .set("x", x)
        .set("y", y)
        .set("font-family", "Arial")
        .set("font-size", 11)
        .set("fill", "#444")
        .set("text-anchor", anchor)
}

fn curve(frame: &Frame, points: impl Iterator<Item = (f64, f64)>, color: &str) -> Polyline {
    let coords: Vec<String> = points
        .filter(|(_, loss)| loss.is_finite())
        .map(|(step, loss)| format!("{:.2},{:.2}", frame.x(step), frame.y(loss)))
        .collect();
    Polyline::new()
        .set("points", coords.join(" "))
        .set("fill", "none")
        .set("stroke", color)
        .set("stroke-width", 1.5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gan::StepLosses;

    fn history(losses: &[(f32, f32)]) -> LossHistory {
        let mut history = LossHistory::default();
        for (i, &(d, g)) in losses.iter().enumerate() {
            history.push(StepLosses {
                step: i + 1,
                d_loss: d,
                d_accuracy: 0.5,
                g_loss: g,
            });
        }
        history
    }

    #[test]
    fn plot_has_title_legend_and_both_curves() {
        let svg = render_loss_plot(&history(&[(0.7, 0.69), (0.6, 0.9), (0.5, 1.2)])).to_string();
        assert!(svg.contains("GAN Loss per Epoch"));
        assert!(svg.contains("Discriminator"));
        assert!(svg.contains("Generator"));
        assert_eq!(svg.matches("<polyline").count(), 2);
        assert!(svg.contains(D_COLOR) && svg.contains(G_COLOR));
    }

    #[test]
    fn points_span_the_plot_area() {
        let frame = Frame {
            x_min: 1.0,
            x_max: 3.0,
            y_max: 2.0,
        };
        assert_eq!(frame.x(1.0), MARGIN_LEFT);
        assert_eq!(frame.x(3.0), WIDTH - MARGIN_RIGHT);
        assert_eq!(frame.y(0.0), HEIGHT - MARGIN_BOTTOM);
        assert_eq!(frame.y(2.0), MARGIN_TOP);
    }

    #[test]
    fn empty_history_still_renders() {
        let svg = render_loss_plot(&LossHistory::default()).to_string();
        assert!(svg.contains("GAN Loss per Epoch"));
    }

    #[test]
    fn writes_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gan_loss_per_epoch.svg");
        write_loss_plot(&history(&[(0.7, 0.7)]), &path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("<svg"));
    }
}
