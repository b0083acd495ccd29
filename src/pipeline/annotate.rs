use crate::gesture::landmark;

/// MediaPipe hand connection pairs, wrist out to each fingertip plus
/// the knuckle bridge across the palm.
pub const CONNECTIONS: &[(usize, usize)] = &[
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (5, 9),
    (9, 10),
    (10, 11),
    (11, 12),
    (9, 13),
    (13, 14),
    (14, 15),
    (15, 16),
    (13, 17),
    (0, 17),
    (17, 18),
    (18, 19),
    (19, 20),
];

const LINE_COLOR: [u8; 3] = [255, 255, 255];
const TIP_COLOR: [u8; 3] = [255, 68, 68];
const JOINT_COLOR: [u8; 3] = [0, 217, 255];
const OUTLINE_COLOR: [u8; 3] = [0, 0, 0];

const LINE_THICKNESS: i32 = 2;
const TIP_RADIUS: i32 = 6;
const JOINT_RADIUS: i32 = 4;

/// Draws the hand skeleton over a packed RGB24 buffer: white bone
/// lines, red fingertips, cyan joints with a black outline ring.
/// Out-of-range points are clipped pixel by pixel.
pub fn draw_landmarks(buffer: &mut [u8], width: u32, height: u32, points: &[(f32, f32)]) {
    if points.len() < landmark::COUNT {
        return;
    }

    for &(a, b) in CONNECTIONS {
        draw_line(buffer, width, height, points[a], points[b], LINE_COLOR);
    }

    for (idx, &(x, y)) in points.iter().enumerate() {
        let (radius, color) = if landmark::FINGERTIPS.contains(&idx) {
            (TIP_RADIUS, TIP_COLOR)
        } else {
            (JOINT_RADIUS, JOINT_COLOR)
        };
        let center = (x as i32, y as i32);
        draw_circle(buffer, width, height, center, radius + 1, OUTLINE_COLOR);
        draw_circle(buffer, width, height, center, radius, color);
    }
}

fn draw_line(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    p0: (f32, f32),
    p1: (f32, f32),
    color: [u8; 3],
) {
    let (mut x0, mut y0) = (p0.0 as i32, p0.1 as i32);
    let (x1, y1) = (p1.0 as i32, p1.1 as i32);
    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let radius = (LINE_THICKNESS - 1) / 2;

    loop {
        put_pixel_safe(buffer, width, height, x0, y0, color);
        for ox in -radius..=radius {
            for oy in -radius..=radius {
                if (ox != 0 || oy != 0) && ox.abs() + oy.abs() <= radius {
                    put_pixel_safe(buffer, width, height, x0 + ox, y0 + oy, color);
                }
            }
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

fn draw_circle(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    center: (i32, i32),
    radius: i32,
    color: [u8; 3],
) {
    let (cx, cy) = center;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                put_pixel_safe(buffer, width, height, cx + dx, cy + dy, color);
            }
        }
    }
}

fn put_pixel_safe(buffer: &mut [u8], width: u32, height: u32, x: i32, y: i32, color: [u8; 3]) {
    if x < 0 || y < 0 {
        return;
    }
    let (ux, uy) = (x as u32, y as u32);
    if ux >= width || uy >= height {
        return;
    }
    let idx = ((uy * width + ux) as usize) * 3;
    if idx + 2 < buffer.len() {
        buffer[idx..idx + 3].copy_from_slice(&color);
    }
}
