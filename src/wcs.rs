// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
 * A minimal celestial world-coordinate system for SIN-projected images, which
 * is what WSClean and friends write. Only the two celestial axes are handled;
 * any other image axes must be degenerate.
 */

use fitsio::hdu::FitsHdu;
use fitsio::FitsFile;
use thiserror::Error;

use crate::coords::RADec;

#[derive(Debug, Clone, Copy)]
pub struct Wcs {
    /// Reference sky position.
    pub crval: RADec,
    /// 1-based reference pixel along (x, y), per the FITS convention.
    pub crpix: (f64, f64),
    /// Pixel scale along (x, y) \[radians\].
    pub cdelt: (f64, f64),
}

impl Wcs {
    /// Read the celestial WCS keys from an image header.
    pub fn from_fits(fits: &mut FitsFile, hdu: &FitsHdu) -> Result<Wcs, WcsError> {
        let ctype1: String = hdu.read_key(fits, "CTYPE1")?;
        let ctype2: String = hdu.read_key(fits, "CTYPE2")?;
        if !ctype1.ends_with("SIN") || !ctype2.ends_with("SIN") {
            return Err(WcsError::UnsupportedProjection {
                ctype1,
                ctype2,
            });
        }

        let crval1: f64 = hdu.read_key(fits, "CRVAL1")?;
        let crval2: f64 = hdu.read_key(fits, "CRVAL2")?;
        let crpix1: f64 = hdu.read_key(fits, "CRPIX1")?;
        let crpix2: f64 = hdu.read_key(fits, "CRPIX2")?;
        let cdelt1: f64 = hdu.read_key(fits, "CDELT1")?;
        let cdelt2: f64 = hdu.read_key(fits, "CDELT2")?;

        Ok(Wcs {
            crval: RADec::from_degrees(crval1, crval2),
            crpix: (crpix1, crpix2),
            cdelt: (cdelt1.to_radians(), cdelt2.to_radians()),
        })
    }

    /// The sky position of the (0-based) pixel (x, y).
    pub fn pix_to_world(&self, x: f64, y: f64) -> RADec {
        let l = (x + 1.0 - self.crpix.0) * self.cdelt.0;
        let m = (y + 1.0 - self.crpix.1) * self.cdelt.1;
        let (sin_dec0, cos_dec0) = self.crval.dec.sin_cos();
        // Clamp against float fuzz at the edge of the projection.
        let q = (1.0 - l * l - m * m).max(0.0).sqrt();
        let dec = (m * cos_dec0 + sin_dec0 * q).asin();
        let ra = self.crval.ra + l.atan2(cos_dec0 * q - m * sin_dec0);
        RADec::new(ra, dec)
    }

    /// The (0-based, fractional) pixel position of a sky coordinate.
    pub fn world_to_pix(&self, coord: &RADec) -> (f64, f64) {
        let (sin_dec0, cos_dec0) = self.crval.dec.sin_cos();
        let (sin_dec, cos_dec) = coord.dec.sin_cos();
        let (sin_dra, cos_dra) = (coord.ra - self.crval.ra).sin_cos();
        let l = cos_dec * sin_dra;
        let m = sin_dec * cos_dec0 - cos_dec * sin_dec0 * cos_dra;
        (
            l / self.cdelt.0 + self.crpix.0 - 1.0,
            m / self.cdelt.1 + self.crpix.1 - 1.0,
        )
    }
}

#[derive(Error, Debug)]
pub enum WcsError {
    #[error("Only SIN-projected images are supported; got CTYPE1={ctype1}, CTYPE2={ctype2}")]
    UnsupportedProjection { ctype1: String, ctype2: String },

    #[error("{0}")]
    Fitsio(#[from] fitsio::errors::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// A 2048-pixel-wide field centred on RA 10.5, Dec -27, 0.01 deg pixels.
    fn test_wcs() -> Wcs {
        Wcs {
            crval: RADec::from_degrees(10.5, -27.0),
            crpix: (1025.0, 1025.0),
            cdelt: (-0.01_f64.to_radians(), 0.01_f64.to_radians()),
        }
    }

    #[test]
    fn test_reference_pixel_is_crval() {
        let wcs = test_wcs();
        let c = wcs.pix_to_world(1024.0, 1024.0);
        assert_abs_diff_eq!(c.ra, wcs.crval.ra, epsilon = 1e-12);
        assert_abs_diff_eq!(c.dec, wcs.crval.dec, epsilon = 1e-12);

        let (x, y) = wcs.world_to_pix(&wcs.crval);
        assert_abs_diff_eq!(x, 1024.0, epsilon = 1e-9);
        assert_abs_diff_eq!(y, 1024.0, epsilon = 1e-9);
    }

    #[test]
    fn test_round_trip_away_from_reference() {
        let wcs = test_wcs();
        for &(x, y) in &[(0.0, 0.0), (2047.0, 0.0), (317.0, 1999.0), (1024.0, 7.0)] {
            let c = wcs.pix_to_world(x, y);
            let (x2, y2) = wcs.world_to_pix(&c);
            assert_abs_diff_eq!(x, x2, epsilon = 1e-6);
            assert_abs_diff_eq!(y, y2, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_one_pixel_step_is_one_cdelt() {
        let wcs = test_wcs();
        let c = wcs.pix_to_world(1024.0, 1025.0);
        // One pixel north of the reference: separation is cdelt to first
        // order.
        assert_abs_diff_eq!(
            wcs.crval.separation(&c).to_degrees(),
            0.01,
            epsilon = 1e-6
        );
    }
}
