// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
 * Read, broadcast and apply "André Offringa style" calibration solutions
 * (the binary format written by the mwa-reduce `calibrate` tool).
 */

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ndarray::prelude::*;
use num_complex::Complex32;
use thiserror::Error;

use crate::jones::{Jones, SingularJones, C64};

/// Per-antenna calibration solutions.
pub struct Solutions {
    /// Jones matrices laid out (timeblock, antenna, channel).
    pub di_jones: Array3<Jones>,
    /// Start and end times as written in the file. 0 means "unknown"; we only
    /// carry these so that a round trip through `write_file` is faithful.
    pub start_time: f64,
    pub end_time: f64,
}

impl Solutions {
    pub fn num_timeblocks(&self) -> usize {
        self.di_jones.dim().0
    }

    pub fn num_antennas(&self) -> usize {
        self.di_jones.dim().1
    }

    pub fn num_channels(&self) -> usize {
        self.di_jones.dim().2
    }

    /// Read an "MWAOCAL" binary solutions file.
    pub fn read_file(file: &Path) -> Result<Solutions, SolutionsError> {
        let file_str = file.display().to_string();
        let mut bin_file = BufReader::new(File::open(file)?);

        // The first 7 bytes should be ASCII "MWAOCAL".
        let mut magic = [0; 7];
        bin_file.read_exact(&mut magic)?;
        if &magic != b"MWAOCAL" {
            return Err(SolutionsError::BadMagic {
                file: file_str,
                got: String::from_utf8_lossy(&magic).into_owned(),
            });
        }
        // A null byte, then the file and structure types, all of which are
        // only ever written as zeros.
        for _ in 0..9 {
            match bin_file.read_u8()? {
                0 => (),
                v => {
                    return Err(SolutionsError::BadHeader {
                        file: file_str,
                        expected: "0",
                        got: v.to_string(),
                    })
                }
            }
        }
        let num_timeblocks = bin_file.read_u32::<LittleEndian>()? as usize;
        let num_antennas = bin_file.read_u32::<LittleEndian>()? as usize;
        let num_channels = bin_file.read_u32::<LittleEndian>()? as usize;
        let num_pols = bin_file.read_u32::<LittleEndian>()? as usize;
        if num_pols != 4 {
            return Err(SolutionsError::BadHeader {
                file: file_str,
                expected: "4 polarisations",
                got: format!("{} polarisations", num_pols),
            });
        }
        let start_time = bin_file.read_f64::<LittleEndian>()?;
        let end_time = bin_file.read_f64::<LittleEndian>()?;

        // The rest of the file is Jones matrices, 8 f64s each.
        let mut floats =
            Array4::zeros((num_timeblocks, num_antennas, num_channels, 2 * num_pols));
        bin_file.read_f64_into::<LittleEndian>(floats.as_slice_mut().unwrap())?;
        let di_jones = floats.map_axis(Axis(3), |v| {
            Jones::from([
                C64::new(v[0], v[1]),
                C64::new(v[2], v[3]),
                C64::new(v[4], v[5]),
                C64::new(v[6], v[7]),
            ])
        });

        Ok(Solutions {
            di_jones,
            start_time,
            end_time,
        })
    }

    /// Write an "MWAOCAL" binary solutions file.
    pub fn write_file(&self, file: &Path) -> Result<(), SolutionsError> {
        let (num_timeblocks, num_antennas, num_channels) = self.di_jones.dim();
        let mut bin_file = BufWriter::new(File::create(file)?);
        bin_file.write_all(b"MWAOCAL")?;
        bin_file.write_u8(0)?;
        bin_file.write_u32::<LittleEndian>(0)?;
        bin_file.write_u32::<LittleEndian>(0)?;
        bin_file.write_u32::<LittleEndian>(num_timeblocks as _)?;
        bin_file.write_u32::<LittleEndian>(num_antennas as _)?;
        bin_file.write_u32::<LittleEndian>(num_channels as _)?;
        bin_file.write_u32::<LittleEndian>(4)?;
        bin_file.write_f64::<LittleEndian>(self.start_time)?;
        bin_file.write_f64::<LittleEndian>(self.end_time)?;
        for j in self.di_jones.iter() {
            for i in 0..4 {
                bin_file.write_f64::<LittleEndian>(j[i].re)?;
                bin_file.write_f64::<LittleEndian>(j[i].im)?;
            }
        }
        bin_file.flush()?;
        Ok(())
    }

    /// Replace every Jones matrix with its inverse, for un-applying
    /// previously-applied solutions.
    pub fn invert(&mut self) -> Result<(), SingularJones> {
        for j in self.di_jones.iter_mut() {
            *j = j.inv()?;
        }
        Ok(())
    }

    /// Expand the solutions along the frequency axis to cover `num_chans`
    /// data channels, which must be an integer multiple of the solution
    /// channel count. Data channel `c` takes solution channel
    /// `c / (num_chans / num_sol_chans)`.
    ///
    /// Returns the left-hand matrices and their Hermitian adjoints (the
    /// right-hand matrices), both laid out (timeblock, antenna, channel).
    pub fn broadcast(
        &self,
        num_chans: usize,
    ) -> Result<(Array3<Jones>, Array3<Jones>), SolutionsError> {
        let (num_timeblocks, num_antennas, num_sol_chans) = self.di_jones.dim();
        if num_chans == 0 || num_chans % num_sol_chans != 0 {
            return Err(SolutionsError::IncompatibleChannels {
                data: num_chans,
                solutions: num_sol_chans,
            });
        }
        let width = num_chans / num_sol_chans;

        let lhs = Array3::from_shape_fn((num_timeblocks, num_antennas, num_chans), |(t, a, c)| {
            self.di_jones[(t, a, c / width)]
        });
        let rhs = lhs.map(|j| j.h());
        Ok((lhs, rhs))
    }
}

/// Partition `num_times` sorted unique timestamps into `num_timeblocks`
/// contiguous, as-equal-as-possible groups, returning the timeblock index for
/// each timestamp. Group boundaries are at floor(i * num_times /
/// num_timeblocks).
pub fn time_bucket_indices(num_timeblocks: usize, num_times: usize) -> Vec<usize> {
    let mut indices = vec![0; num_times];
    for timeblock in 0..num_timeblocks {
        let start = timeblock * num_times / num_timeblocks;
        let end = (timeblock + 1) * num_times / num_timeblocks;
        for i in indices.iter_mut().take(end).skip(start) {
            *i = timeblock;
        }
    }
    indices
}

/// Correct one measurement-set cell (channels x 4 instrumental pols) in
/// place: V' = J1 V J2^H per channel. `lhs` and `rhs` are the broadcast
/// matrices for this row's first and second antenna at the row's timeblock.
pub fn correct_cell(cell: &mut Array2<Complex32>, lhs: ArrayView1<Jones>, rhs: ArrayView1<Jones>) {
    for (c, mut pols) in cell.outer_iter_mut().enumerate() {
        let vis = Jones::from_c32_slice(pols.as_slice().unwrap());
        let corrected = (lhs[c] * vis * rhs[c]).to_c32_array();
        for (p, v) in pols.iter_mut().zip(corrected.iter()) {
            *p = *v;
        }
    }
}

#[derive(Error, Debug)]
pub enum SolutionsError {
    #[error("Tried to read {file} as an \"MWAOCAL\" binary file, but its magic bytes were '{got}'")]
    BadMagic { file: String, got: String },

    #[error("Expected {expected} in the header of {file}, got {got}")]
    BadHeader {
        file: String,
        expected: &'static str,
        got: String,
    },

    #[error("The data have {data} channels, which isn't an integer multiple of the {solutions} solution channels")]
    IncompatibleChannels { data: usize, solutions: usize },

    #[error(transparent)]
    Singular(#[from] SingularJones),

    #[error("{0}")]
    IO(#[from] std::io::Error),
}
