use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::Color;
use ratatui::widgets::{Block, Borders, Paragraph};

use crate::types::{Frame, TrackedFrame};

pub fn render(f: &mut ratatui::Frame, preview: Option<&TrackedFrame>, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title(" Camera ");
    let inner = block.inner(area);
    f.render_widget(block, area);
    match preview {
        Some(tracked) => draw_frame(&tracked.frame, inner, f.buffer_mut()),
        None => f.render_widget(Paragraph::new("waiting for frames..."), inner),
    }
}

/// Paints the frame with upper-half-block glyphs: each terminal cell
/// carries two vertically stacked pixels, foreground on top. The image
/// is scaled to fit and centered; cells outside it stay untouched.
fn draw_frame(frame: &Frame, area: Rect, buf: &mut Buffer) {
    if area.width == 0 || area.height == 0 || frame.width == 0 || frame.height == 0 {
        return;
    }
    // A cell is roughly twice as tall as wide, so the drawable pixel
    // grid is width x 2*height.
    let target_w = area.width as f32;
    let target_h = area.height as f32 * 2.0;
    let scale = (frame.width as f32 / target_w).max(frame.height as f32 / target_h);
    let out_w = ((frame.width as f32 / scale) as u16).clamp(1, area.width);
    let out_rows = ((frame.height as f32 / scale / 2.0) as u16).clamp(1, area.height);
    let x0 = area.x + (area.width - out_w) / 2;
    let y0 = area.y + (area.height - out_rows) / 2;

    for row in 0..out_rows {
        for col in 0..out_w {
            let top = sample(frame, col as u32, row as u32 * 2, scale);
            let bottom = sample(frame, col as u32, row as u32 * 2 + 1, scale);
            if let Some(cell) = buf.cell_mut((x0 + col, y0 + row)) {
                cell.set_char('▀');
                cell.set_fg(Color::Rgb(top[0], top[1], top[2]));
                cell.set_bg(Color::Rgb(bottom[0], bottom[1], bottom[2]));
            }
        }
    }
}

/// Nearest-neighbor sample of the source frame at an output pixel.
fn sample(frame: &Frame, out_x: u32, out_y: u32, scale: f32) -> [u8; 3] {
    let sx = (((out_x as f32 + 0.5) * scale) as u32).min(frame.width - 1);
    let sy = (((out_y as f32 + 0.5) * scale) as u32).min(frame.height - 1);
    let idx = ((sy * frame.width + sx) * 3) as usize;
    [frame.rgb[idx], frame.rgb[idx + 1], frame.rgb[idx + 2]]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn two_band_frame() -> Frame {
        // 4x4, top two rows red, bottom two rows blue.
        let mut rgb = Vec::new();
        for y in 0..4 {
            for _x in 0..4 {
                if y < 2 {
                    rgb.extend_from_slice(&[255, 0, 0]);
                } else {
                    rgb.extend_from_slice(&[0, 0, 255]);
                }
            }
        }
        Frame {
            rgb,
            width: 4,
            height: 4,
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn test_half_blocks_carry_top_and_bottom_pixels() {
        let area = Rect::new(0, 0, 4, 2);
        let mut buf = Buffer::empty(area);
        draw_frame(&two_band_frame(), area, &mut buf);

        let upper = buf.cell((0, 0)).unwrap();
        assert_eq!(upper.symbol(), "▀");
        assert_eq!(upper.fg, Color::Rgb(255, 0, 0));
        assert_eq!(upper.bg, Color::Rgb(255, 0, 0));

        let lower = buf.cell((3, 1)).unwrap();
        assert_eq!(lower.fg, Color::Rgb(0, 0, 255));
        assert_eq!(lower.bg, Color::Rgb(0, 0, 255));
    }

    #[test]
    fn test_wide_frame_is_letterboxed_not_stretched() {
        // 8x4 source in a 4x4 cell area: fills the width, occupies one
        // cell row, and is vertically centered.
        let frame = Frame {
            rgb: vec![10u8; 8 * 4 * 3],
            width: 8,
            height: 4,
            timestamp: Instant::now(),
        };
        let area = Rect::new(0, 0, 4, 4);
        let mut buf = Buffer::empty(area);
        draw_frame(&frame, area, &mut buf);

        assert_eq!(buf.cell((0, 0)).unwrap().symbol(), " ");
        assert_eq!(buf.cell((0, 1)).unwrap().symbol(), "▀");
        assert_eq!(buf.cell((3, 1)).unwrap().symbol(), "▀");
        assert_eq!(buf.cell((0, 3)).unwrap().symbol(), " ");
    }

    #[test]
    fn test_zero_sized_area_is_a_no_op() {
        let mut buf = Buffer::empty(Rect::new(0, 0, 0, 0));
        draw_frame(&two_band_frame(), Rect::new(0, 0, 0, 0), &mut buf);
    }
}
