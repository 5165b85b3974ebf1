//! Deterministic PNG rendering of a stored voucher.
//!
//! The render is a pure function of the stored barcode, PIN and amount; no provider call is
//! involved, so an exported image can be regenerated byte-for-byte at any time. Beneficiaries
//! redeem the code in person, so the payload is also printed below the code by the client that
//! displays it; this module only produces the scannable part.
use std::io::Cursor;

use dpg_common::Money;
use image::{GrayImage, Luma};
use qrcode::{Color, QrCode};

use crate::errors::ServerError;

const MODULE_PIXELS: u32 = 8;
const QUIET_ZONE_MODULES: u32 = 4;

/// The stored fields a voucher render depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoucherRenderData {
    pub barcode: String,
    pub pin: String,
    pub amount: Money,
}

impl VoucherRenderData {
    fn payload(&self) -> String {
        format!("{}\n{}\n{}", self.barcode, self.pin, self.amount.value())
    }
}

/// Renders the voucher as a PNG-encoded QR image.
pub fn render_voucher_png(voucher: &VoucherRenderData) -> Result<Vec<u8>, ServerError> {
    let code =
        QrCode::new(voucher.payload().as_bytes()).map_err(|e| ServerError::ImageRenderError(e.to_string()))?;
    let width = code.width() as u32;
    let size = (width + 2 * QUIET_ZONE_MODULES) * MODULE_PIXELS;
    let mut image = GrayImage::from_pixel(size, size, Luma([0xff]));
    for y in 0..width {
        for x in 0..width {
            if code[(x as usize, y as usize)] == Color::Dark {
                let px = (x + QUIET_ZONE_MODULES) * MODULE_PIXELS;
                let py = (y + QUIET_ZONE_MODULES) * MODULE_PIXELS;
                for dy in 0..MODULE_PIXELS {
                    for dx in 0..MODULE_PIXELS {
                        image.put_pixel(px + dx, py + dy, Luma([0]));
                    }
                }
            }
        }
    }
    let mut bytes = Vec::new();
    image::DynamicImage::ImageLuma8(image)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|e| ServerError::ImageRenderError(e.to_string()))?;
    Ok(bytes)
}

#[cfg(test)]
mod test {
    use super::*;

    fn voucher() -> VoucherRenderData {
        VoucherRenderData {
            barcode: "2668287205".to_string(),
            pin: "1234".to_string(),
            amount: Money::from_major(25),
        }
    }

    #[test]
    fn render_is_deterministic() {
        let a = render_voucher_png(&voucher()).unwrap();
        let b = render_voucher_png(&voucher()).unwrap();
        assert!(!a.is_empty());
        assert_eq!(a, b);
    }

    #[test]
    fn render_is_a_png() {
        let bytes = render_voucher_png(&voucher()).unwrap();
        assert_eq!(&bytes[..8], &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]);
    }

    #[test]
    fn different_vouchers_render_differently() {
        let a = render_voucher_png(&voucher()).unwrap();
        let mut other = voucher();
        other.pin = "9999".to_string();
        let b = render_voucher_png(&other).unwrap();
        assert_ne!(a, b);
    }
}
