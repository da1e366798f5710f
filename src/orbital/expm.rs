//! Matrix exponential of real square matrices.
//!
//! The exponential is evaluated by scaling and squaring with a diagonal Padé approximant of
//! degree 13, following Higham, *SIAM J. Matrix Anal. Appl.* **26**, 1179 (2005).

use anyhow::{self, ensure, format_err};
use nalgebra::DMatrix;
use ndarray::{Array2, ArrayView2};

#[cfg(test)]
#[path = "expm_tests.rs"]
mod expm_tests;

/// Coefficients of the degree-13 Padé approximant to the exponential.
const PADE13: [f64; 14] = [
    64764752532480000.0,
    32382376266240000.0,
    7771770303897600.0,
    1187353796428800.0,
    129060195264000.0,
    10559470521600.0,
    670442572800.0,
    33522128640.0,
    1323241920.0,
    40840800.0,
    960960.0,
    16380.0,
    182.0,
    1.0,
];

/// The largest 1-norm for which the degree-13 approximant is accurate to double precision.
const THETA13: f64 = 5.371920351148152;

/// Computes the exponential of a real square matrix.
///
/// # Arguments
///
/// * `a` - The matrix to be exponentiated.
///
/// # Errors
///
/// Errors if `a` is not square, contains non-finite entries, or if the Padé denominator is
/// singular.
pub fn expm(a: ArrayView2<f64>) -> Result<Array2<f64>, anyhow::Error> {
    let n = a.nrows();
    ensure!(
        a.ncols() == n,
        "Unable to exponentiate a non-square matrix of shape {:?}.",
        a.shape()
    );
    ensure!(
        a.iter().all(|x| x.is_finite()),
        "Unable to exponentiate a matrix with non-finite entries."
    );
    if n == 0 {
        return Ok(Array2::zeros((0, 0)));
    }

    let norm1 = (0..n)
        .map(|j| a.column(j).iter().map(|x| x.abs()).sum::<f64>())
        .fold(0.0, f64::max);
    let squarings = if norm1 > THETA13 {
        (norm1 / THETA13).log2().ceil() as i32
    } else {
        0
    };

    let scale = 2f64.powi(-squarings);
    let a = DMatrix::from_fn(n, n, |i, j| a[(i, j)] * scale);
    let ident = DMatrix::<f64>::identity(n, n);
    let a2 = &a * &a;
    let a4 = &a2 * &a2;
    let a6 = &a4 * &a2;
    let b = &PADE13;

    let u_inner = &a6 * (&a6 * b[13] + &a4 * b[11] + &a2 * b[9])
        + &a6 * b[7]
        + &a4 * b[5]
        + &a2 * b[3]
        + &ident * b[1];
    let u = &a * u_inner;
    let v = &a6 * (&a6 * b[12] + &a4 * b[10] + &a2 * b[8])
        + &a6 * b[6]
        + &a4 * b[4]
        + &a2 * b[2]
        + &ident * b[0];

    let mut r = (&v - &u)
        .lu()
        .solve(&(&v + &u))
        .ok_or_else(|| format_err!("Singular Padé denominator in matrix exponential."))?;
    for _ in 0..squarings {
        r = &r * &r;
    }
    Ok(Array2::from_shape_fn((n, n), |(i, j)| r[(i, j)]))
}
