// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
 * 2x2 complex Jones matrices.
 */

use std::ops::{Index, IndexMut, Mul};

use num_complex::{Complex, Complex32};
use thiserror::Error;

pub type C64 = Complex<f64>;

/// A 2x2 complex matrix, stored row major: \[j00, j01, j10, j11\].
///
/// Solutions are stored (and applied) in double precision; measurement-set
/// visibilities are single precision and get promoted on the way through.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Jones([C64; 4]);

impl Jones {
    pub fn identity() -> Jones {
        Jones([
            C64::new(1.0, 0.0),
            C64::new(0.0, 0.0),
            C64::new(0.0, 0.0),
            C64::new(1.0, 0.0),
        ])
    }

    pub fn zero() -> Jones {
        Jones([C64::new(0.0, 0.0); 4])
    }

    /// The Hermitian adjoint (conjugate transpose).
    pub fn h(&self) -> Jones {
        Jones([
            self.0[0].conj(),
            self.0[2].conj(),
            self.0[1].conj(),
            self.0[3].conj(),
        ])
    }

    /// The matrix inverse. A singular block is an error; there's no sensible
    /// recovery when un-applying calibration solutions.
    pub fn inv(&self) -> Result<Jones, SingularJones> {
        let det = self.0[0] * self.0[3] - self.0[1] * self.0[2];
        if det.norm() < f64::EPSILON {
            return Err(SingularJones);
        }
        let inv_det = C64::new(1.0, 0.0) / det;
        Ok(Jones([
            inv_det * self.0[3],
            -inv_det * self.0[1],
            -inv_det * self.0[2],
            inv_det * self.0[0],
        ]))
    }

    pub fn any_nan(&self) -> bool {
        self.0.iter().any(|c| c.re.is_nan() || c.im.is_nan())
    }

    /// Promote a (XX, XY, YX, YY) visibility to double precision.
    pub fn from_c32_slice(vis: &[Complex32]) -> Jones {
        Jones([
            C64::new(vis[0].re as f64, vis[0].im as f64),
            C64::new(vis[1].re as f64, vis[1].im as f64),
            C64::new(vis[2].re as f64, vis[2].im as f64),
            C64::new(vis[3].re as f64, vis[3].im as f64),
        ])
    }

    /// Demote back to single precision for writing to a measurement set.
    pub fn to_c32_array(&self) -> [Complex32; 4] {
        [
            Complex32::new(self.0[0].re as f32, self.0[0].im as f32),
            Complex32::new(self.0[1].re as f32, self.0[1].im as f32),
            Complex32::new(self.0[2].re as f32, self.0[2].im as f32),
            Complex32::new(self.0[3].re as f32, self.0[3].im as f32),
        ]
    }
}

impl From<[C64; 4]> for Jones {
    fn from(j: [C64; 4]) -> Jones {
        Jones(j)
    }
}

impl Index<usize> for Jones {
    type Output = C64;
    fn index(&self, i: usize) -> &C64 {
        &self.0[i]
    }
}

impl IndexMut<usize> for Jones {
    fn index_mut(&mut self, i: usize) -> &mut C64 {
        &mut self.0[i]
    }
}

impl Mul for Jones {
    type Output = Jones;

    fn mul(self, rhs: Jones) -> Jones {
        Jones([
            self.0[0] * rhs.0[0] + self.0[1] * rhs.0[2],
            self.0[0] * rhs.0[1] + self.0[1] * rhs.0[3],
            self.0[2] * rhs.0[0] + self.0[3] * rhs.0[2],
            self.0[2] * rhs.0[1] + self.0[3] * rhs.0[3],
        ])
    }
}

#[derive(Error, Debug)]
#[error("Singular Jones matrix; can't be inverted")]
pub struct SingularJones;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn c(re: f64, im: f64) -> C64 {
        C64::new(re, im)
    }

    fn assert_jones_eq(a: Jones, b: Jones) {
        for i in 0..4 {
            assert_abs_diff_eq!(a[i].re, b[i].re, epsilon = 1e-12);
            assert_abs_diff_eq!(a[i].im, b[i].im, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_identity_mul() {
        let j = Jones::from([c(1.0, 2.0), c(3.0, 4.0), c(5.0, 6.0), c(7.0, 8.0)]);
        assert_jones_eq(Jones::identity() * j, j);
        assert_jones_eq(j * Jones::identity(), j);
    }

    #[test]
    fn test_hermitian() {
        let j = Jones::from([c(1.0, 2.0), c(3.0, 4.0), c(5.0, 6.0), c(7.0, 8.0)]);
        let h = j.h();
        assert_eq!(h[0], c(1.0, -2.0));
        assert_eq!(h[1], c(5.0, -6.0));
        assert_eq!(h[2], c(3.0, -4.0));
        assert_eq!(h[3], c(7.0, -8.0));
        // (J^H)^H == J
        assert_jones_eq(h.h(), j);
    }

    #[test]
    fn test_inverse() {
        let j = Jones::from([c(1.0, 2.0), c(3.0, 4.0), c(5.0, 6.0), c(7.0, 8.0)]);
        let inv = j.inv().unwrap();
        assert_jones_eq(j * inv, Jones::identity());
        assert_jones_eq(inv * j, Jones::identity());
    }

    #[test]
    fn test_singular() {
        // Rank 1: second row is twice the first.
        let j = Jones::from([c(1.0, 0.0), c(2.0, 0.0), c(2.0, 0.0), c(4.0, 0.0)]);
        assert!(j.inv().is_err());
        assert!(Jones::zero().inv().is_err());
    }

    #[test]
    fn test_precision_round_trip() {
        let vis = [
            Complex32::new(1.5, -2.5),
            Complex32::new(0.0, 1.0),
            Complex32::new(-3.0, 0.25),
            Complex32::new(8.0, 9.0),
        ];
        let j = Jones::from_c32_slice(&vis);
        assert_eq!(j.to_c32_array(), vis);
    }
}
