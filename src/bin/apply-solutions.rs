// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use anyhow::bail;
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::prelude::*;
use num_complex::Complex32;
use rubbl_casatables::{Table, TableOpenMode};
use structopt::StructOpt;

use quoll::ms::*;
use quoll::solutions::{correct_cell, time_bucket_indices, Solutions};

/// Apply (or un-apply) antenna calibration solutions to the visibilities in a
/// measurement set.
#[derive(StructOpt, Debug)]
#[structopt(name = "apply-solutions")]
struct Opts {
    /// The measurement set to be corrected.
    #[structopt(name = "MEASUREMENT_SET", parse(from_str))]
    ms: PathBuf,

    /// The calibration solutions ("MWAOCAL" binary format).
    #[structopt(name = "SOLUTION_FILE", parse(from_str))]
    solutions: PathBuf,

    /// The column to read visibilities from.
    #[structopt(long, default_value = "DATA")]
    src: String,

    /// The column to write corrected visibilities to. Created (with the same
    /// shape as the DATA column) if it doesn't exist.
    #[structopt(long, default_value = "CORRECTED_DATA")]
    dest: String,

    /// Un-apply previously-applied solutions (use the matrix inverses).
    #[structopt(long)]
    reverse: bool,

    /// How many rows to process at a time. Only affects memory usage.
    #[structopt(long, default_value = "50000")]
    nrows: usize,
}

fn main() -> Result<(), anyhow::Error> {
    let opts = Opts::from_args();
    let src = opts.src.to_uppercase();
    let dest = opts.dest.to_uppercase();
    if opts.nrows == 0 {
        bail!("--nrows must be at least 1");
    }

    let mut sols = Solutions::read_file(&opts.solutions)?;
    if opts.reverse {
        sols.invert()?;
    }

    let mut ms = Table::open(&opts.ms, TableOpenMode::ReadWrite).unwrap();
    if !column_exists(&mut ms, &src) {
        bail!("{} is not a valid column name", src);
    }
    if !column_exists(&mut ms, &dest) {
        add_data_like_column(&mut ms, &dest);
    }

    // Broadcast the solutions along the frequency axis to match the data.
    let first_cell: Array2<Complex32> = ms.get_cell(&src, 0).unwrap();
    let (num_chans, num_pols) = first_cell.dim();
    if num_pols != 4 {
        bail!(
            "Expected 4 instrumental polarisations in {}, found {}",
            src,
            num_pols
        );
    }
    let (lhs, rhs) = sols.broadcast(num_chans)?;

    let ants1: Vec<i32> = ms.get_col_as_vec("ANTENNA1").unwrap();
    let ants2: Vec<i32> = ms.get_col_as_vec("ANTENNA2").unwrap();
    if let Some(&max_ant) = ants1.iter().chain(ants2.iter()).max() {
        if max_ant as usize >= sols.num_antennas() {
            bail!(
                "The measurement set refers to antenna {}, but the solutions only cover {} antennas",
                max_ant,
                sols.num_antennas()
            );
        }
    }

    // One solution timeblock index per row. With a single timeblock there's
    // nothing to work out; otherwise partition the unique timestamps into
    // as-equal-as-possible contiguous groups, one per timeblock.
    let buckets: Vec<usize> = if sols.num_timeblocks() == 1 {
        vec![0; ms.n_rows() as usize]
    } else {
        let times: Vec<f64> = ms.get_col_as_vec("TIME").unwrap();
        let keys = unique_time_keys(&times);
        let indices = time_bucket_indices(sols.num_timeblocks(), keys.len());
        times
            .iter()
            .map(|&t| indices[keys.binary_search(&time_key(t)).unwrap()])
            .collect()
    };

    let num_rows = ms.n_rows();
    let pb = ProgressBar::new(num_rows);
    pb.set_style(ProgressStyle::default_bar()
                 .template("{msg}{percent}% [{bar:34.cyan/blue}] {pos}/{len} rows [{elapsed_precise}<{eta_precise}]")
                 .progress_chars("#>-"));
    for batch_start in (0..num_rows).step_by(opts.nrows) {
        let batch_end = (batch_start + opts.nrows as u64).min(num_rows);

        // Read the batch, correct it, write it back.
        let mut cells: Vec<Array2<Complex32>> = (batch_start..batch_end)
            .map(|row| ms.get_cell(&src, row).unwrap())
            .collect();
        for (i, cell) in cells.iter_mut().enumerate() {
            let row = batch_start as usize + i;
            let timeblock = buckets[row];
            correct_cell(
                cell,
                lhs.slice(s![timeblock, ants1[row] as usize, ..]),
                rhs.slice(s![timeblock, ants2[row] as usize, ..]),
            );
        }
        for (i, cell) in cells.iter().enumerate() {
            ms.put_cell(&dest, batch_start + i as u64, cell).unwrap();
        }
        pb.set_position(batch_end);
    }
    pb.finish();

    Ok(())
}
