// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
 * Helper functions for measurement sets.
 */

use std::collections::BTreeSet;

use ndarray::Array2;
use num_complex::Complex32;
use rubbl_casatables::{GlueDataType, Table};

pub fn column_exists(table: &mut Table, column: &str) -> bool {
    table
        .column_names()
        .unwrap()
        .iter()
        .any(|name| name == column)
}

/// Add a complex array column shaped like the DATA column (the casacore
/// default fill for new complex cells is zero).
pub fn add_data_like_column(table: &mut Table, column: &str) {
    let cell: Array2<Complex32> = table.get_cell("DATA", 0).unwrap();
    let (num_chans, num_pols) = cell.dim();
    let shape = [num_chans as u64, num_pols as u64];
    table
        .add_array_column(
            GlueDataType::TpComplex,
            column,
            None,
            Some(&shape),
            false,
            false,
        )
        .unwrap();
}

/// Timestamps in a measurement set can carry sub-millisecond float jitter;
/// key them on rounded milliseconds when looking for unique values.
pub fn time_key(time: f64) -> u64 {
    (time * 1e3).round() as u64
}

/// The sorted unique timestamps of the given TIME column values, as
/// millisecond keys.
pub fn unique_time_keys(times: &[f64]) -> Vec<u64> {
    let mut set = BTreeSet::new();
    for &time in times {
        set.insert(time_key(time));
    }
    set.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_time_keys() {
        // Two unique timestamps, each appearing for many baselines, with a
        // bit of jitter well below a millisecond.
        let times = vec![
            4888561712.0,
            4888561712.0000001,
            4888561714.0,
            4888561712.0,
            4888561713.999999,
        ];
        let keys = unique_time_keys(&times);
        assert_eq!(keys.len(), 2);
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(keys[0], time_key(4888561712.0));
        assert_eq!(keys[1], time_key(4888561714.0));
    }
}
