//! Built-in 5x7 bitmap font for badge counts and avatar initials

use tiny_skia::{Paint, Pixmap, Rect, Transform};

pub(super) const GLYPH_WIDTH: u32 = 5;
pub(super) const GLYPH_HEIGHT: u32 = 7;

/// Rows top to bottom, most significant of the low five bits is the leftmost column
fn glyph(c: char) -> [u8; 7] {
    match c {
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11100, 0b10010, 0b10001, 0b10001, 0b10001, 0b10010, 0b11100],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '+' => [0b00000, 0b00100, 0b00100, 0b11111, 0b00100, 0b00100, 0b00000],
        ' ' => [0; 7],
        _ => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b00000, 0b00100],
    }
}

/// Up to two uppercase initials of a label ("Ada Lovelace" -> "AL", "bob" -> "BO")
pub(super) fn initials(label: &str) -> String {
    let words: Vec<&str> = label.split_whitespace().collect();
    let chars: Vec<char> = match words.as_slice() {
        [] => Vec::new(),
        [word] => word.chars().take(2).collect(),
        [first, second, ..] => first.chars().take(1).chain(second.chars().take(1)).collect(),
    };
    chars.into_iter().flat_map(char::to_uppercase).take(2).collect()
}

/// Width in pixels of `text` drawn with square cells of side `cell`
pub(super) fn text_width(text: &str, cell: f32) -> f32 {
    let count = text.chars().count() as f32;
    if count == 0.0 {
        return 0.0;
    }
    (count * GLYPH_WIDTH as f32 + (count - 1.0)) * cell
}

/// Draw `text` centered on `(cx, cy)` with square cells of side `cell`
pub(super) fn draw_text(
    pixmap: &mut Pixmap,
    text: &str,
    cx: f32,
    cy: f32,
    cell: f32,
    paint: &Paint,
) {
    let x0 = (cx - text_width(text, cell) / 2.0).round();
    let y0 = (cy - GLYPH_HEIGHT as f32 * cell / 2.0).round();

    for (index, c) in text.chars().enumerate() {
        let glyph_x = x0 + index as f32 * (GLYPH_WIDTH + 1) as f32 * cell;
        for (row, bits) in glyph(c).iter().enumerate() {
            for column in 0..GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - column)) == 0 {
                    continue;
                }
                let x = glyph_x + column as f32 * cell;
                let y = y0 + row as f32 * cell;
                if let Some(rect) = Rect::from_xywh(x, y, cell, cell) {
                    pixmap.fill_rect(rect, paint, Transform::identity(), None);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initials() {
        assert_eq!(initials("Ada Lovelace"), "AL");
        assert_eq!(initials("bob"), "BO");
        assert_eq!(initials("  x  "), "X");
        assert_eq!(initials(""), "");
        assert_eq!(initials("one two three"), "OT");
    }

    #[test]
    fn test_text_width() {
        assert_eq!(text_width("", 2.0), 0.0);
        assert_eq!(text_width("1", 2.0), 10.0);
        assert_eq!(text_width("10+", 1.0), 17.0);
    }

    #[test]
    fn test_draw_text_touches_pixels() {
        let mut pixmap = Pixmap::new(40, 20).unwrap();
        let mut paint = Paint::default();
        paint.set_color_rgba8(255, 255, 255, 255);
        draw_text(&mut pixmap, "8", 20.0, 10.0, 2.0, &paint);
        assert!(pixmap.data().iter().any(|&byte| byte != 0));

        let mut blank = Pixmap::new(40, 20).unwrap();
        draw_text(&mut blank, " ", 20.0, 10.0, 2.0, &paint);
        assert!(blank.data().iter().all(|&byte| byte == 0));
    }
}
