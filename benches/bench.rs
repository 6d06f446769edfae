// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use criterion::*;
use ndarray::prelude::*;
use num_complex::Complex32;

use quoll::coords::RADec;
use quoll::facet::*;
use quoll::jones::{Jones, C64};
use quoll::solutions::{correct_cell, Solutions};
use quoll::wcs::Wcs;

fn apply_solutions(c: &mut Criterion) {
    // 128 antennas, 24 solution channels broadcast to 768 data channels.
    let di_jones = Array3::from_shape_fn((1, 128, 24), |(_, a, ch)| {
        Jones::from([
            C64::new(1.0 + a as f64, 0.5),
            C64::new(0.25, ch as f64),
            C64::new(-0.5, 0.1),
            C64::new(2.0 + ch as f64, -0.125),
        ])
    });
    let sols = Solutions {
        di_jones,
        start_time: 0.0,
        end_time: 0.0,
    };
    let (lhs, rhs) = sols.broadcast(768).unwrap();
    let cell = Array2::from_elem((768, 4), Complex32::new(1.0, -1.0));

    c.bench_function("correcting one row of 768 channels", |b| {
        b.iter(|| {
            let mut cell = cell.clone();
            correct_cell(&mut cell, lhs.slice(s![0, 0, ..]), rhs.slice(s![0, 1, ..]));
        })
    });
}

fn partition_image(c: &mut Criterion) {
    let (nx, ny) = (256, 256);
    let wcs = Wcs {
        crval: RADec::from_degrees(10.5, -27.0),
        crpix: ((nx / 2) as f64 + 1.0, (ny / 2) as f64 + 1.0),
        cdelt: (-0.01_f64.to_radians(), 0.01_f64.to_radians()),
    };
    let grid = pixel_grid(&wcs, ny, nx);
    let centres = grid_centres(&wcs.crval, 0.5);
    let dists = distance_matrix(&centres, &grid);

    c.bench_function("9-facet distance matrix for a 256x256 image", |b| {
        b.iter(|| distance_matrix(&centres, &grid))
    });

    c.bench_function("assigning 256x256 pixels to 9 facets", |b| {
        b.iter(|| assign(&dists, 4.0))
    });
}

criterion_group!(benches, apply_solutions, partition_image);
criterion_main!(benches);
