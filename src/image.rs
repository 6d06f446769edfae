// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
 * FITS sky images.
 */

use std::path::{Path, PathBuf};

use fitsio::hdu::HduInfo;
use fitsio::FitsFile;
use ndarray::Array2;
use thiserror::Error;

use crate::coords::RADec;
use crate::wcs::{Wcs, WcsError};

/// A FITS image's celestial plane and WCS. WSClean images are
/// (stokes, freq, dec, ra) cubes with degenerate leading axes; anything with
/// real extra dimensions is rejected.
pub struct Image {
    pub path: PathBuf,
    /// Image data, indexed (y, x).
    pub data: Array2<f32>,
    pub wcs: Wcs,
}

impl Image {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Image, ImageError> {
        let path = path.as_ref();
        let file_str = path.display().to_string();
        let mut fits = FitsFile::open(path)?;
        let hdu = fits.hdu(0)?;

        // fitsio reports the shape slowest-axis first.
        let shape = match &hdu.info {
            HduInfo::ImageInfo { shape, .. } => shape.clone(),
            _ => return Err(ImageError::NotAnImage { file: file_str }),
        };
        if shape.len() < 2 || shape[..shape.len() - 2].iter().product::<usize>() != 1 {
            return Err(ImageError::NotCelestial {
                file: file_str,
                shape,
            });
        }
        let (ny, nx) = (shape[shape.len() - 2], shape[shape.len() - 1]);

        let wcs = Wcs::from_fits(&mut fits, &hdu)?;
        let data: Vec<f32> = hdu.read_image(&mut fits)?;
        let data = Array2::from_shape_vec((ny, nx), data)
            .expect("image data length disagrees with its header");

        Ok(Image {
            path: path.to_path_buf(),
            data,
            wcs,
        })
    }
}

/// Write `data` over the image plane of a copy of `src`. Returns the
/// still-open output so the caller can add header keys.
pub fn write_image_copy(
    src: &Path,
    dest: &Path,
    data: &Array2<f32>,
) -> Result<FitsFile, ImageError> {
    std::fs::copy(src, dest)?;
    let mut fits = FitsFile::edit(dest)?;
    let hdu = fits.hdu(0)?;
    hdu.write_image(&mut fits, data.as_slice().expect("image data is contiguous"))?;
    Ok(fits)
}

/// Write a per-facet model image: a copy of `src` with the data replaced and
/// the facet's reference position and maximum angular radius \[degrees\]
/// recorded in the header for later retrieval.
pub fn write_facet_model(
    src: &Path,
    dest: &Path,
    data: &Array2<f32>,
    centre: &RADec,
    max_radius_deg: f64,
) -> Result<(), ImageError> {
    let mut fits = write_image_copy(src, dest, data)?;
    let hdu = fits.hdu(0)?;
    hdu.write_key(&mut fits, "FCTCEN", centre.to_hmsdms())?;
    hdu.write_key(&mut fits, "FCTMAX", max_radius_deg)?;
    Ok(())
}

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("HDU 0 of {file} isn't an image")]
    NotAnImage { file: String },

    #[error("{file} has shape {shape:?}; expected a 2D image (degenerate extra axes are fine)")]
    NotCelestial { file: String, shape: Vec<usize> },

    #[error(transparent)]
    Wcs(#[from] WcsError),

    #[error("{0}")]
    Fitsio(#[from] fitsio::errors::Error),

    #[error("{0}")]
    IO(#[from] std::io::Error),
}
