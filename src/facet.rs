// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
 * Facet partitioning: carve a sky image into angular facets, each owned by
 * the nearest of a set of facet centres.
 */

use std::f64::consts::FRAC_PI_2;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use itertools::iproduct;
use ndarray::prelude::*;
use thiserror::Error;

use crate::coords::RADec;
use crate::wcs::Wcs;

/// Assignment sentinel for pixels too far from every facet centre.
pub const UNASSIGNED: i32 = -1;

/// The sky coordinate of every pixel of a (ny, nx) image, indexed y * nx + x.
pub fn pixel_grid(wcs: &Wcs, ny: usize, nx: usize) -> Vec<RADec> {
    iproduct!(0..ny, 0..nx)
        .map(|(y, x)| wcs.pix_to_world(x as f64, y as f64))
        .collect()
}

/// The angular distance \[degrees\] from `centre` to every grid pixel.
fn distance_row(centre: &RADec, grid: &[RADec]) -> Vec<f64> {
    grid.iter()
        .map(|p| centre.separation(p).to_degrees())
        .collect()
}

/// Distances \[degrees\] from every centre to every grid pixel, laid out
/// (centre, pixel).
pub fn distance_matrix(centres: &[RADec], grid: &[RADec]) -> Array2<f64> {
    let mut rows = Vec::with_capacity(centres.len() * grid.len());
    for centre in centres {
        rows.extend(distance_row(centre, grid));
    }
    Array2::from_shape_vec((centres.len(), grid.len()), rows).unwrap()
}

/// Greedily find facet centres by peak detection: take the brightest
/// remaining pixel as a centre, blank out everything within
/// `exclusion_radius_deg` of it, and repeat until the image maximum drops to
/// `threshold`. Mutates `data` (picked regions become NaN).
///
/// Equal maxima are broken by taking the first in iteration order; don't
/// rely on a particular winner.
///
/// The distance matrix comes for free (it's needed for the exclusion disks),
/// so it is returned alongside the centres.
pub fn find_peak_centres(
    data: &mut Array2<f32>,
    wcs: &Wcs,
    grid: &[RADec],
    threshold: f32,
    exclusion_radius_deg: f64,
) -> (Vec<RADec>, Array2<f64>) {
    let nx = data.dim().1;
    let mut centres = vec![];
    let mut dists = Vec::with_capacity(grid.len());

    loop {
        // The brightest remaining pixel; NaNs are already-excluded pixels.
        let mut brightest: Option<(usize, f32)> = None;
        for (i, &v) in data.iter().enumerate() {
            if v.is_nan() {
                continue;
            }
            if brightest.map_or(true, |(_, max)| v > max) {
                brightest = Some((i, v));
            }
        }
        let (peak, max) = match brightest {
            Some(b) => b,
            None => break,
        };
        if max <= threshold {
            break;
        }

        let centre = wcs.pix_to_world((peak % nx) as f64, (peak / nx) as f64);
        centres.push(centre);
        eprint!("\rFacet count: {}... ", centres.len());

        let row = distance_row(&centre, grid);
        for (i, &d) in row.iter().enumerate() {
            if d < exclusion_radius_deg {
                data[(i / nx, i % nx)] = f32::NAN;
            }
        }
        dists.extend(row);
    }
    eprintln!("Done");

    let num_centres = centres.len();
    (
        centres,
        Array2::from_shape_vec((num_centres, grid.len()), dists).unwrap(),
    )
}

fn rotate_about_x(p: [f64; 3], angle: f64) -> [f64; 3] {
    let (s, c) = angle.sin_cos();
    [p[0], c * p[1] - s * p[2], s * p[1] + c * p[2]]
}

fn rotate_about_y(p: [f64; 3], angle: f64) -> [f64; 3] {
    let (s, c) = angle.sin_cos();
    [c * p[0] + s * p[2], p[1], -s * p[0] + c * p[2]]
}

fn rotate_about_z(p: [f64; 3], angle: f64) -> [f64; 3] {
    let (s, c) = angle.sin_cos();
    [c * p[0] - s * p[1], s * p[0] + c * p[1], p[2]]
}

/// Convert a Cartesian unit vector to a sky position (RA = azimuth,
/// Dec = 90 deg - colatitude).
fn to_radec(p: [f64; 3]) -> RADec {
    let r = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
    let theta = (p[2] / r).acos();
    let phi = p[1].atan2(p[0]);
    RADec::new(phi, FRAC_PI_2 - theta)
}

/// A fixed 9-point facet constellation centred on `target`: one point
/// `2 * radius_deg` away from the centre, replicated at 8 rotations in 45 deg
/// steps, plus the centre itself. Deterministic; depends only on the
/// arguments.
pub fn grid_centres(target: &RADec, radius_deg: f64) -> Vec<RADec> {
    let radius = (2.0 * radius_deg).to_radians();

    // A point on the unit sphere `radius` away from the x axis, which is the
    // constellation's pole, then spun around that axis.
    let theta0 = FRAC_PI_2 - radius;
    let first = [theta0.sin(), 0.0, theta0.cos()];
    let mut points: Vec<[f64; 3]> = (0..8)
        .map(|i| rotate_about_x(first, (45.0 * i as f64).to_radians()))
        .collect();
    points.push([1.0, 0.0, 0.0]);

    // Tip the pole up to the target's declination, then swing it around to
    // the target's right ascension.
    points
        .into_iter()
        .map(|p| to_radec(rotate_about_z(rotate_about_y(p, -target.dec), target.ra)))
        .collect()
}

/// Assign every pixel to its nearest facet centre, or [UNASSIGNED] if the
/// nearest centre is more than `max_radius_deg` away.
pub fn assign(dists: &Array2<f64>, max_radius_deg: f64) -> Vec<i32> {
    let (num_centres, num_pixels) = dists.dim();
    (0..num_pixels)
        .map(|p| {
            let mut closest = UNASSIGNED;
            let mut min = f64::INFINITY;
            for c in 0..num_centres {
                let d = dists[(c, p)];
                if d < min {
                    min = d;
                    closest = c as i32;
                }
            }
            if min > max_radius_deg {
                UNASSIGNED
            } else {
                closest
            }
        })
        .collect()
}

/// The largest nearest-centre distance \[degrees\] among the pixels assigned
/// to `facet`, or `None` if the facet is empty.
pub fn max_distance_for(dists: &Array2<f64>, assignment: &[i32], facet: usize) -> Option<f64> {
    let row = dists.index_axis(Axis(0), facet);
    assignment
        .iter()
        .zip(row.iter())
        .filter(|(&a, _)| a == facet as i32)
        .map(|(_, &d)| d)
        .fold(None, |acc, d| Some(acc.map_or(d, |m: f64| m.max(d))))
}

fn median(values: &mut Vec<f64>) -> f64 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

/// The empirical centroid of a facet: the median pixel position of its
/// assigned pixels, reprojected to the sky. `None` for an empty facet.
pub fn facet_centroid(assignment: &[i32], nx: usize, facet: usize, wcs: &Wcs) -> Option<RADec> {
    let mut xs = vec![];
    let mut ys = vec![];
    for (p, &a) in assignment.iter().enumerate() {
        if a == facet as i32 {
            xs.push((p % nx) as f64);
            ys.push((p / nx) as f64);
        }
    }
    if xs.is_empty() {
        return None;
    }
    Some(wcs.pix_to_world(median(&mut xs), median(&mut ys)))
}

/// Write a DS9 region file marking the given positions as numbered circle
/// points.
pub fn write_region_file(
    path: &Path,
    points: &[RADec],
    colour: &str,
) -> Result<(), std::io::Error> {
    let mut f = BufWriter::new(File::create(path)?);
    writeln!(
        f,
        "global color={} dashlist=8 3 width=1 font=\"helvetica 10 normal roman\" select=1 highlite=1 dash=0 fixed=0 edit=1 move=1 delete=1 include=1 source=1",
        colour
    )?;
    writeln!(f, "icrs")?;
    for (i, p) in points.iter().enumerate() {
        writeln!(
            f,
            "point {:.6}d {:.6}d # point=circle text={{{}}}",
            p.ra.to_degrees(),
            p.dec.to_degrees(),
            i + 1
        )?;
    }
    Ok(())
}

/// On-disk cache of facet centres and the centre-to-pixel distance matrix,
/// so that masks can be regenerated without re-running peak detection or the
/// full nearest-neighbour search.
pub struct FacetStore {
    dir: PathBuf,
}

impl FacetStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> FacetStore {
        FacetStore {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn centres_path(&self) -> PathBuf {
        self.dir.join("facet-centres.txt")
    }

    fn dists_path(&self) -> PathBuf {
        self.dir.join("facet-dists.bin")
    }

    /// The cached facet centres, or `None` if they haven't been written yet.
    pub fn load_centres(&self) -> Result<Option<Vec<RADec>>, FacetStoreError> {
        let path = self.centres_path();
        if !path.exists() {
            return Ok(None);
        }
        let file_str = path.display().to_string();
        let mut centres = vec![];
        for (i, line) in BufReader::new(File::open(&path)?).lines().enumerate() {
            let line = line?;
            let mut fields = line.split_whitespace();
            let mut field = || {
                fields
                    .next()
                    .and_then(|f| f.parse::<f64>().ok())
                    .ok_or_else(|| FacetStoreError::Malformed {
                        file: file_str.clone(),
                        line: i + 1,
                    })
            };
            let ra_deg = field()?;
            let dec_deg = field()?;
            centres.push(RADec::from_degrees(ra_deg, dec_deg));
        }
        Ok(Some(centres))
    }

    pub fn save_centres(&self, centres: &[RADec]) -> Result<(), FacetStoreError> {
        let mut f = BufWriter::new(File::create(self.centres_path())?);
        for c in centres {
            writeln!(f, "{:.12} {:.12}", c.ra.to_degrees(), c.dec.to_degrees())?;
        }
        Ok(())
    }

    /// The cached distance matrix, or `None` if it hasn't been written yet.
    pub fn load_dists(&self) -> Result<Option<Array2<f64>>, FacetStoreError> {
        let path = self.dists_path();
        if !path.exists() {
            return Ok(None);
        }
        let mut f = BufReader::new(File::open(&path)?);
        let num_centres = f.read_u32::<LittleEndian>()? as usize;
        let num_pixels = f.read_u32::<LittleEndian>()? as usize;
        let mut dists = Array2::zeros((num_centres, num_pixels));
        f.read_f64_into::<LittleEndian>(dists.as_slice_mut().unwrap())?;
        Ok(Some(dists))
    }

    pub fn save_dists(&self, dists: &Array2<f64>) -> Result<(), FacetStoreError> {
        let (num_centres, num_pixels) = dists.dim();
        let mut f = BufWriter::new(File::create(self.dists_path())?);
        f.write_u32::<LittleEndian>(num_centres as _)?;
        f.write_u32::<LittleEndian>(num_pixels as _)?;
        for &d in dists.iter() {
            f.write_f64::<LittleEndian>(d)?;
        }
        f.flush()?;
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum FacetStoreError {
    #[error("Couldn't parse line {line} of {file} as a facet centre")]
    Malformed { file: String, line: usize },

    #[error("{0}")]
    IO(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// A small field centred on RA 10.5, Dec -27, 0.01 deg pixels.
    fn test_wcs(nx: usize, ny: usize) -> Wcs {
        Wcs {
            crval: RADec::from_degrees(10.5, -27.0),
            crpix: ((nx / 2) as f64 + 1.0, (ny / 2) as f64 + 1.0),
            cdelt: (-0.01_f64.to_radians(), 0.01_f64.to_radians()),
        }
    }

    #[test]
    fn test_grid_centres_are_deterministic() {
        let target = RADec::parse_hmsdms("00:42:44 -30:00:00").unwrap();
        let first = grid_centres(&target, 5.0);
        let second = grid_centres(&target, 5.0);
        assert_eq!(first.len(), 9);
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.ra, b.ra);
            assert_eq!(a.dec, b.dec);
        }
    }

    #[test]
    fn test_grid_centres_geometry() {
        let target = RADec::from_degrees(30.0, -45.0);
        let radius_deg = 5.0;
        let centres = grid_centres(&target, radius_deg);
        // 8 ring points, each 2 * radius from the target.
        for c in centres.iter().take(8) {
            assert_abs_diff_eq!(
                target.separation(c).to_degrees(),
                2.0 * radius_deg,
                epsilon = 1e-9
            );
        }
        // The 9th point is the target itself.
        assert_abs_diff_eq!(target.separation(&centres[8]), 0.0, epsilon = 1e-9);

        // Neighbouring ring points are equally spaced.
        let spacings: Vec<f64> = (0..8)
            .map(|i| centres[i].separation(&centres[(i + 1) % 8]))
            .collect();
        for s in &spacings[1..] {
            assert_abs_diff_eq!(*s, spacings[0], epsilon = 1e-9);
        }
    }

    #[test]
    fn test_assign_nearest_with_cutoff() {
        // 2 centres, 4 pixels.
        let dists = ndarray::arr2(&[
            [0.1, 3.0, 1.0, 9.0], //
            [2.0, 0.5, 1.0, 8.0],
        ]);
        let assignment = assign(&dists, 4.0);
        // Ties go to the lower index; pixel 3 is beyond the cutoff for both.
        assert_eq!(assignment, vec![0, 1, 0, UNASSIGNED]);

        assert_abs_diff_eq!(max_distance_for(&dists, &assignment, 0).unwrap(), 1.0);
        assert_abs_diff_eq!(max_distance_for(&dists, &assignment, 1).unwrap(), 0.5);
        // A facet with no pixels.
        assert_eq!(max_distance_for(&dists, &[1, 1, 1, UNASSIGNED], 0), None);
    }

    #[test]
    fn test_peak_finding() {
        let (nx, ny) = (21, 21);
        let wcs = test_wcs(nx, ny);
        let grid = pixel_grid(&wcs, ny, nx);

        let mut data = Array2::zeros((ny, nx));
        data[(5, 5)] = 10.0;
        data[(15, 16)] = 5.0;
        data[(15, 15)] = 4.0; // inside the second peak's exclusion disk
        data[(0, 0)] = 2.9; // below the threshold

        // 0.03 deg exclusion radius = 3 pixels.
        let (centres, dists) = find_peak_centres(&mut data, &wcs, &grid, 3.0, 0.03);
        assert_eq!(centres.len(), 2);
        assert_eq!(dists.dim(), (2, grid.len()));

        // Brightest first.
        let first = wcs.pix_to_world(5.0, 5.0);
        let second = wcs.pix_to_world(16.0, 15.0);
        assert_abs_diff_eq!(centres[0].separation(&first), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(centres[1].separation(&second), 0.0, epsilon = 1e-9);

        // The exclusion disks are now NaN, including the picked peaks.
        assert!(data[(5, 5)].is_nan());
        assert!(data[(15, 16)].is_nan());
        assert!(data[(15, 15)].is_nan());
        // The sub-threshold pixel survives untouched.
        assert_abs_diff_eq!(data[(0, 0)], 2.9);
    }

    #[test]
    fn test_peak_finding_on_empty_image() {
        let (nx, ny) = (4, 4);
        let wcs = test_wcs(nx, ny);
        let grid = pixel_grid(&wcs, ny, nx);
        let mut data = Array2::zeros((ny, nx));
        let (centres, dists) = find_peak_centres(&mut data, &wcs, &grid, 3.0, 0.03);
        assert!(centres.is_empty());
        assert_eq!(dists.dim(), (0, grid.len()));

        // All NaN (e.g. everything already excluded) also terminates.
        let mut data = Array2::from_elem((ny, nx), f32::NAN);
        let (centres, _) = find_peak_centres(&mut data, &wcs, &grid, 3.0, 0.03);
        assert!(centres.is_empty());
    }

    #[test]
    fn test_nearest_centre_matches_distance_matrix() {
        let wcs = test_wcs(32, 32);
        let grid = pixel_grid(&wcs, 32, 32);
        let centres = grid_centres(&wcs.crval, 0.05);
        let dists = distance_matrix(&centres, &grid);
        let assignment = assign(&dists, 999.0);
        // Every assignment is the argmin over centres.
        for (p, &a) in assignment.iter().enumerate() {
            assert!(a >= 0);
            let d = dists[(a as usize, p)];
            for c in 0..centres.len() {
                assert!(d <= dists[(c, p)]);
            }
        }
    }

    #[test]
    fn test_centroid_of_uniform_block() {
        let wcs = test_wcs(10, 10);
        // Pixels (2..=4, 3..=5) assigned to facet 0 in a 10-wide image.
        let mut assignment = vec![UNASSIGNED; 100];
        for y in 2..=4 {
            for x in 3..=5 {
                assignment[y * 10 + x] = 0;
            }
        }
        let centroid = facet_centroid(&assignment, 10, 0, &wcs).unwrap();
        let expected = wcs.pix_to_world(4.0, 3.0);
        assert_abs_diff_eq!(centroid.separation(&expected), 0.0, epsilon = 1e-12);

        assert!(facet_centroid(&assignment, 10, 1, &wcs).is_none());
    }

    #[test]
    fn test_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FacetStore::new(dir.path());

        // Nothing cached yet.
        assert!(store.load_centres().unwrap().is_none());
        assert!(store.load_dists().unwrap().is_none());

        let centres = grid_centres(&RADec::from_degrees(10.5, -27.0), 5.0);
        store.save_centres(&centres).unwrap();
        let loaded = store.load_centres().unwrap().unwrap();
        assert_eq!(loaded.len(), centres.len());
        for (a, b) in centres.iter().zip(loaded.iter()) {
            assert_abs_diff_eq!(a.ra, b.ra, epsilon = 1e-12);
            assert_abs_diff_eq!(a.dec, b.dec, epsilon = 1e-12);
        }

        let dists = ndarray::arr2(&[[0.25, 1.5, 2.75], [3.0, 0.0, 9.5]]);
        store.save_dists(&dists).unwrap();
        let loaded = store.load_dists().unwrap().unwrap();
        assert_eq!(loaded, dists);
    }

    #[test]
    fn test_store_rejects_garbage_centres() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("facet-centres.txt"), "10.5 not-a-number\n").unwrap();
        let store = FacetStore::new(dir.path());
        match store.load_centres() {
            Err(FacetStoreError::Malformed { line: 1, .. }) => (),
            _ => panic!("Expected a Malformed error"),
        }
    }
}
