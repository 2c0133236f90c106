//! QR code rendering
//!
//! Pairing codes are served to browsers as PNG (raw bytes on `/qr`, a data URL
//! on `/api/qrcode`) and optionally printed to the terminal with half-block
//! characters.

use base64::Engine;
use image::{ImageBuffer, Luma};
use qrcode::{Color, EcLevel, QrCode};

use crate::connection::QrPayload;
use crate::error::{GatewayError, Result};

const MODULE_SIZE: u32 = 10;
const PNG_QUIET_ZONE: u32 = 2;
const TERMINAL_QUIET_ZONE: usize = 4;

/// Render a pairing string as PNG bytes.
pub fn encode_png(data: &str) -> Result<Vec<u8>> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::L)
        .map_err(|e| GatewayError::EncodeFailed(e.to_string()))?;

    let modules = code.width() as u32;
    let img_size = (modules + PNG_QUIET_ZONE * 2) * MODULE_SIZE;

    let img = ImageBuffer::from_fn(img_size, img_size, |x, y| {
        let (cx, cy) = (x / MODULE_SIZE, y / MODULE_SIZE);
        if cx < PNG_QUIET_ZONE || cy < PNG_QUIET_ZONE {
            return Luma([255u8]);
        }
        let (mx, my) = (cx - PNG_QUIET_ZONE, cy - PNG_QUIET_ZONE);
        if mx >= modules || my >= modules {
            return Luma([255u8]);
        }
        match code[(mx as usize, my as usize)] {
            Color::Dark => Luma([0u8]),
            Color::Light => Luma([255u8]),
        }
    });

    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .map_err(|e| GatewayError::EncodeFailed(format!("PNG encoding failed: {}", e)))?;

    Ok(buf.into_inner())
}

pub fn png_data_url(png: &[u8]) -> String {
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    )
}

/// Encode a pairing string into the payload published with `qr_ready`.
pub fn payload(raw: &str) -> Result<QrPayload> {
    let png = encode_png(raw)?;
    Ok(QrPayload {
        raw: raw.to_string(),
        data_url: png_data_url(&png),
    })
}

/// Render a QR code as Unicode half-block characters for the terminal.
pub fn render_unicode(data: &str) -> Option<String> {
    let code = QrCode::new(data.as_bytes()).ok()?;
    let matrix = code.to_colors();
    let w = code.width();
    let quiet = TERMINAL_QUIET_ZONE;
    let total = w + quiet * 2;
    let mut out = String::with_capacity(total * (total / 2 + 1) * 3);

    let color_at = |x: usize, y: usize| -> Color {
        if x < quiet || x >= quiet + w || y < quiet || y >= quiet + w {
            Color::Light
        } else {
            matrix[(y - quiet) * w + (x - quiet)]
        }
    };

    for y in (0..total).step_by(2) {
        for x in 0..total {
            let top = color_at(x, y);
            let bottom = if y + 1 < total {
                color_at(x, y + 1)
            } else {
                Color::Light
            };
            out.push(match (top, bottom) {
                (Color::Light, Color::Light) => ' ',
                (Color::Dark, Color::Dark) => '\u{2588}',
                (Color::Dark, Color::Light) => '\u{2580}',
                (Color::Light, Color::Dark) => '\u{2584}',
            });
        }
        out.push('\n');
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAIRING: &str = "2@Xk3b9Qz,abcdefghijklmnopqrstuvwxyz012345,ZmFrZS1pZGVudGl0eQ==,c2Vzc2lvbg==";

    #[test]
    fn test_encode_png_has_png_magic() {
        let png = encode_png(PAIRING).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_payload_data_url() {
        let payload = payload(PAIRING).unwrap();
        assert_eq!(payload.raw, PAIRING);
        assert!(payload.data_url.starts_with("data:image/png;base64,iVBOR"));
    }

    #[test]
    fn test_oversized_input_fails_to_encode() {
        let huge = "x".repeat(8_000);
        assert!(matches!(
            encode_png(&huge),
            Err(GatewayError::EncodeFailed(_))
        ));
    }

    #[test]
    fn test_render_unicode_is_square_ish() {
        let text = render_unicode(PAIRING).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        let width = lines[0].chars().count();
        assert!(lines.iter().all(|l| l.chars().count() == width));
        assert_eq!(lines.len(), width.div_ceil(2));
    }
}
