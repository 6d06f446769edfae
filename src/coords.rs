// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
 * Sky coordinates and sexagesimal wrangling.
 */

use std::f64::consts::TAU;

use thiserror::Error;

/// A position on the celestial sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RADec {
    /// Right ascension \[radians\], wrapped into [0, 2pi).
    pub ra: f64,
    /// Declination \[radians\].
    pub dec: f64,
}

impl RADec {
    pub fn new(ra_rad: f64, dec_rad: f64) -> RADec {
        RADec {
            ra: ra_rad.rem_euclid(TAU),
            dec: dec_rad,
        }
    }

    pub fn from_degrees(ra_deg: f64, dec_deg: f64) -> RADec {
        RADec::new(ra_deg.to_radians(), dec_deg.to_radians())
    }

    /// The angular separation between two sky positions \[radians\].
    pub fn separation(&self, other: &RADec) -> f64 {
        unsafe { erfa_sys::eraSeps(self.ra, self.dec, other.ra, other.dec) }
    }

    /// Parse a coordinate pair like "00:36:08 -10:34:00" or
    /// "00h36m08.2s -10d34m00s" (hourangle RA, degrees Dec).
    pub fn parse_hmsdms(s: &str) -> Result<RADec, ParseCoordError> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        let (ra_str, dec_str) = match fields.as_slice() {
            [ra, dec] => (*ra, *dec),
            _ => return Err(ParseCoordError::NotAPair(s.to_string())),
        };
        let ra_hours = parse_sexagesimal(ra_str)?;
        let dec_deg = parse_sexagesimal(dec_str)?;
        Ok(RADec::from_degrees(ra_hours * 15.0, dec_deg))
    }

    /// Format in the style astropy calls "hmsdms", e.g.
    /// "00h36m08.20s -10d34m00.00s". This is what ends up in FCTCEN keys.
    pub fn to_hmsdms(&self) -> String {
        let (h, hm, hs) = split_sexagesimal((self.ra.to_degrees() / 15.0).rem_euclid(24.0));
        let sign = if self.dec.is_sign_negative() { '-' } else { '+' };
        let (d, dm, ds) = split_sexagesimal(self.dec.to_degrees().abs());
        format!(
            "{:02}h{:02}m{:05.2}s {}{:02}d{:02}m{:05.2}s",
            h, hm, hs, sign, d, dm, ds
        )
    }
}

/// Break a positive angle into (whole, minutes, seconds).
fn split_sexagesimal(value: f64) -> (u32, u32, f64) {
    let whole = value.trunc();
    let minutes = ((value - whole) * 60.0).trunc();
    let seconds = ((value - whole) * 60.0 - minutes) * 60.0;
    (whole as u32, minutes as u32, seconds)
}

/// Parse a single sexagesimal angle, accepting ':' or letter separators. The
/// result is in the same unit as the leading field (hours or degrees).
fn parse_sexagesimal(s: &str) -> Result<f64, ParseCoordError> {
    let negative = s.trim_start().starts_with('-');
    let normalised: String = s
        .chars()
        .map(|c| {
            if c.is_ascii_digit() || c == '.' {
                c
            } else {
                ' '
            }
        })
        .collect();
    let mut fields = normalised.split_whitespace();
    let mut value = 0.0;
    let mut scale = 1.0;
    let mut any = false;
    for field in fields.by_ref().take(3) {
        let f: f64 = field
            .parse()
            .map_err(|_| ParseCoordError::BadAngle(s.to_string()))?;
        value += f * scale;
        scale /= 60.0;
        any = true;
    }
    if !any || fields.next().is_some() {
        return Err(ParseCoordError::BadAngle(s.to_string()));
    }
    Ok(if negative { -value } else { value })
}

#[derive(Error, Debug)]
pub enum ParseCoordError {
    #[error("Expected a coordinate pair like \"00:00:00 -27:00:00\", got '{0}'")]
    NotAPair(String),

    #[error("Couldn't parse '{0}' as a sexagesimal angle")]
    BadAngle(String),
}
