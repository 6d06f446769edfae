// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use anyhow::bail;
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Array2;
use num_complex::Complex32;
use rubbl_casatables::{Table, TableOpenMode};
use structopt::StructOpt;

use quoll::abacus::{ColumnRef, Expr};
use quoll::ms::*;

/// Evaluate simple arithmetic over measurement-set columns. The equation is
/// either a copy (`a.ms::CORRECTED_DATA = a.ms::DATA`) or an elementwise sum
/// or difference (`a.ms::CORRECTED_DATA = a.ms::DATA - b.ms::MODEL_DATA`).
/// The destination column is created if it doesn't exist.
#[derive(StructOpt, Debug)]
#[structopt(name = "column-abacus")]
struct Opts {
    /// The equation tokens, e.g.: a.ms::CORRECTED_DATA = a.ms::DATA -
    /// b.ms::MODEL_DATA
    #[structopt(name = "EQUATION")]
    eqn: Vec<String>,
}

fn open_source(col: &ColumnRef) -> Result<Table, anyhow::Error> {
    let mut table = Table::open(&col.table, TableOpenMode::Read).unwrap();
    if !column_exists(&mut table, &col.column) {
        bail!("column not recognised: {}::{}", col.table.display(), col.column);
    }
    Ok(table)
}

fn main() -> Result<(), anyhow::Error> {
    let opts = Opts::from_args();
    let expr = Expr::parse(&opts.eqn)?;

    // Validate all source columns before touching the destination.
    let mut sources: Vec<Table> = expr
        .sources()
        .iter()
        .map(|col| open_source(col))
        .collect::<Result<_, _>>()?;

    let dest = expr.dest();
    let mut dest_table = Table::open(&dest.table, TableOpenMode::ReadWrite).unwrap();
    if !column_exists(&mut dest_table, &dest.column) {
        add_data_like_column(&mut dest_table, &dest.column);
    }

    let num_rows = dest_table.n_rows();
    for source in sources.iter_mut() {
        if source.n_rows() != num_rows {
            bail!(
                "The tables have different row counts ({} vs {})",
                num_rows,
                source.n_rows()
            );
        }
    }

    let pb = ProgressBar::new(num_rows);
    pb.set_style(ProgressStyle::default_bar()
                 .template("{msg}{percent}% [{bar:34.cyan/blue}] {pos}/{len} rows [{elapsed_precise}<{eta_precise}]")
                 .progress_chars("#>-"));
    let source_cols: Vec<&ColumnRef> = expr.sources();
    for row in 0..num_rows {
        let mut result: Array2<Complex32> = sources[0]
            .get_cell(&source_cols[0].column, row)
            .unwrap();
        if let Some(second) = sources.get_mut(1) {
            let operand: Array2<Complex32> = second.get_cell(&source_cols[1].column, row).unwrap();
            if operand.dim() != result.dim() {
                bail!(
                    "Mismatched cell shapes at row {}: {:?} vs {:?}",
                    row,
                    result.dim(),
                    operand.dim()
                );
            }
            match &expr {
                Expr::Add { .. } => result += &operand,
                Expr::Sub { .. } => result -= &operand,
                Expr::Copy { .. } => unreachable!("a copy has one source"),
            }
        }
        dest_table.put_cell(&dest.column, row, &result).unwrap();
        pb.set_position(row);
    }
    pb.finish();

    Ok(())
}
