//! Color string parsing for LED actions and template documents.

use crate::app::ports::Rgb;
use crate::error::{Error, Result};

const NAMED: &[(&str, Rgb)] = &[
    ("red", Rgb::new(255, 0, 0)),
    ("green", Rgb::new(0, 255, 0)),
    ("blue", Rgb::new(0, 0, 255)),
    ("white", Rgb::new(255, 255, 255)),
    ("black", Rgb::new(0, 0, 0)),
    ("yellow", Rgb::new(255, 255, 0)),
    ("cyan", Rgb::new(0, 255, 255)),
    ("magenta", Rgb::new(255, 0, 255)),
    ("orange", Rgb::new(255, 165, 0)),
    ("purple", Rgb::new(128, 0, 128)),
    ("pink", Rgb::new(255, 192, 203)),
];

/// Parse `#RRGGBB`, `rgb(r,g,b)` or a named color (case-insensitive).
pub fn parse_color(s: &str) -> Result<Rgb> {
    let s = s.trim();

    if let Some(hex) = s.strip_prefix('#') {
        if hex.len() == 6 {
            let v = u32::from_str_radix(hex, 16)
                .map_err(|_| Error::InvalidArgument("color hex"))?;
            return Ok(Rgb::new((v >> 16) as u8, (v >> 8) as u8, v as u8));
        }
        return Err(Error::InvalidArgument("color hex"));
    }

    if s.get(..4).is_some_and(|p| p.eq_ignore_ascii_case("rgb(")) {
        let inner = s[4..].trim_end_matches(')');
        let mut parts = inner.split(',').map(|p| p.trim().parse::<u8>());
        if let (Some(Ok(r)), Some(Ok(g)), Some(Ok(b)), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        {
            return Ok(Rgb::new(r, g, b));
        }
        return Err(Error::InvalidArgument("color rgb()"));
    }

    NAMED
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(s))
        .map(|(_, rgb)| *rgb)
        .ok_or(Error::InvalidArgument("unknown color"))
}

/// `#RRGGBB`, upper-case hex.
pub fn format_color(c: Rgb) -> String {
    format!("#{:02X}{:02X}{:02X}", c.r, c.g, c.b)
}
