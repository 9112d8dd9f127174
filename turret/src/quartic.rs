//! Closed-form quadratic and quartic root finding over the complex numbers.
//!
//! The ballistics solver reduces time-of-flight to a quartic whose physical
//! solutions are the positive real roots; solving over `Complex64` keeps the
//! algebra total and lets the caller filter.

use num_complex::Complex64;

/// Roots of `c0·x² + c1·x + c2 = 0`.
pub fn solve_quadratic(c0: Complex64, c1: Complex64, c2: Complex64) -> [Complex64; 2] {
    let disc = (c1 * c1 - 4.0 * c0 * c2).sqrt();
    [(-c1 + disc) / (2.0 * c0), (-c1 - disc) / (2.0 * c0)]
}

/// Roots of `c0·x⁴ + c1·x³ + c2·x² + c3·x + c4 = 0`.
///
/// Ferrari's method in the resolvent form due to Sidney Cadot. All four
/// roots are returned, with multiplicity, in no particular order.
pub fn solve_quartic(
    c0: Complex64,
    c1: Complex64,
    c2: Complex64,
    c3: Complex64,
    c4: Complex64,
) -> [Complex64; 4] {
    let b = c1 / c0;
    let c = c2 / c0;
    let d = c3 / c0;
    let e = c4 / c0;

    let q1 = c * c - 3.0 * b * d + 12.0 * e;
    let q2 = 2.0 * c * c * c - 9.0 * b * c * d + 27.0 * d * d + 27.0 * b * b * e - 72.0 * c * e;
    let q3 = 8.0 * b * c - 16.0 * d - 2.0 * b * b * b;
    let q4 = 3.0 * b * b - 8.0 * c;

    let q5 = (q2 / 2.0 + (q2 * q2 / 4.0 - q1 * q1 * q1).sqrt()).powf(1.0 / 3.0);
    let q6 = (q1 / q5 + q5) / 3.0;
    let q7 = 2.0 * (q4 / 12.0 + q6).sqrt();

    [
        (-b - q7 - (4.0 * q4 / 6.0 - 4.0 * q6 - q3 / q7).sqrt()) / 4.0,
        (-b - q7 + (4.0 * q4 / 6.0 - 4.0 * q6 - q3 / q7).sqrt()) / 4.0,
        (-b + q7 - (4.0 * q4 / 6.0 - 4.0 * q6 + q3 / q7).sqrt()) / 4.0,
        (-b + q7 + (4.0 * q4 / 6.0 - 4.0 * q6 + q3 / q7).sqrt()) / 4.0,
    ]
}

/// The smallest root that is real (imaginary part below `imag_eps`) and
/// strictly positive, or `None` if there is no such root.
pub fn smallest_positive_real(roots: &[Complex64], imag_eps: f64) -> Option<f64> {
    let mut best: Option<f64> = None;
    for root in roots {
        if root.im.abs() < imag_eps && root.re > 0.0 {
            best = Some(match best {
                Some(b) => b.min(root.re),
                None => root.re,
            });
        }
    }
    best
}
