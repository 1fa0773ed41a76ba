//! QR codes for pairing links.
//!
//! A listening peer shows its [`PairingLink`] as a QR code so a phone or a
//! second screen can pick it up without typing.
//!
//! ```rust,ignore
//! use duet_core::qr;
//!
//! println!("{}", qr::render_link(&link)?);
//! ```

use qrcode::render::unicode;
use qrcode::{EcLevel, QrCode};

use crate::code::PairingLink;
use crate::error::{Error, Result};

/// Encode `data` as a QR code drawn with Unicode half blocks.
///
/// Two modules share one character cell, so the result is roughly square
/// in a terminal. Dark modules are drawn light, which reads correctly on
/// the usual dark terminal background.
///
/// # Errors
///
/// Returns `Error::Internal` if `data` does not fit in a QR code.
pub fn generate_ascii(data: &str) -> Result<String> {
    let code = QrCode::with_error_correction_level(data, EcLevel::M)
        .map_err(|e| Error::Internal(format!("Failed to generate QR code: {e}")))?;

    Ok(code
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .build())
}

/// Render a pairing link for terminal display.
///
/// # Errors
///
/// Returns an error if the link is too long to encode.
pub fn render_link(link: &PairingLink) -> Result<String> {
    generate_ascii(&link.to_string())
}
