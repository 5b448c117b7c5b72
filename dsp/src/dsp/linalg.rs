//! Small dense complex linear algebra for the per-band beamformer solve
//!
//! Matrices here are micCount x micCount, so everything is direct and unblocked.

use ndarray::{Array1, Array2, ArrayView1};
use num_complex::Complex64;
use num_traits::Zero;

/// Pivots below this fraction of the largest diagonal entry are treated as zero
const SINGULAR_TOLERANCE: f64 = 1e-14;
/// Jacobi stops once the off-diagonal mass is this small relative to the whole matrix
const JACOBI_TOLERANCE: f64 = 1e-15;
const JACOBI_MAX_SWEEPS: usize = 100;
/// Eigenvalues within this relative distance of the maximum count as tied
pub const EIGEN_TIE_TOLERANCE: f64 = 1e-12;

/// Outer product a * b^H
pub fn outer_hermitian(a: ArrayView1<Complex64>, b: ArrayView1<Complex64>) -> Array2<Complex64> {
    Array2::from_shape_fn((a.len(), b.len()), |(i, j)| a[i] * b[j].conj())
}

/// Conjugate transpose
pub fn hermitian_transpose(m: &Array2<Complex64>) -> Array2<Complex64> {
    m.t().mapv(|x| x.conj())
}

/// Lower triangular L with L * L^H == m, or None if m is not positive definite
pub fn cholesky(m: &Array2<Complex64>) -> Option<Array2<Complex64>> {
    let n = m.nrows();
    assert!(m.ncols() == n, "cholesky needs a square matrix");

    let max_diag = m.diag().iter().fold(0.0f64, |acc, x| acc.max(x.re.abs()));
    let threshold = max_diag * SINGULAR_TOLERANCE;

    let mut l = Array2::<Complex64>::zeros((n, n));
    for j in 0..n {
        let mut pivot = m[[j, j]].re;
        for k in 0..j {
            pivot -= l[[j, k]].norm_sqr();
        }
        if !pivot.is_finite() || pivot <= threshold {
            return None;
        }
        let ljj = libm::sqrt(pivot);
        l[[j, j]] = Complex64::new(ljj, 0.0);
        for i in (j + 1)..n {
            let mut sum = m[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]].conj();
            }
            l[[i, j]] = sum / ljj;
        }
    }
    Some(l)
}

/// Solve L * X = B for lower triangular L
pub fn forward_substitute(l: &Array2<Complex64>, b: &Array2<Complex64>) -> Array2<Complex64> {
    let n = l.nrows();
    let mut x = Array2::<Complex64>::zeros(b.raw_dim());
    for col in 0..b.ncols() {
        for i in 0..n {
            let mut sum = b[[i, col]];
            for k in 0..i {
                sum -= l[[i, k]] * x[[k, col]];
            }
            x[[i, col]] = sum / l[[i, i]];
        }
    }
    x
}

/// Solve L^H * x = y for lower triangular L
pub fn back_substitute_hermitian(l: &Array2<Complex64>, y: ArrayView1<Complex64>) -> Array1<Complex64> {
    let n = l.nrows();
    let mut x = Array1::<Complex64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = y[i];
        for k in (i + 1)..n {
            // (L^H)[i][k] == conj(L[k][i])
            sum -= l[[k, i]].conj() * x[k];
        }
        x[i] = sum / l[[i, i]].conj();
    }
    x
}

pub fn vector_norm(v: ArrayView1<Complex64>) -> f64 {
    libm::sqrt(v.iter().map(|x| x.norm_sqr()).sum())
}

/// Eigen-decomposition of a Hermitian matrix
///
/// Returns eigenvalues in descending order, with eigenvectors as matching columns. The sort is
/// stable, so equal eigenvalues keep the order in which they sit on the diagonal after the
/// Jacobi sweeps.
pub fn hermitian_eigen(m: &Array2<Complex64>) -> (Array1<f64>, Array2<Complex64>) {
    let n = m.nrows();
    assert!(m.ncols() == n, "hermitian_eigen needs a square matrix");

    // Work on the Hermitian part so round-off in the input cannot skew the rotations
    let mut a = (m + &hermitian_transpose(m)).mapv(|x| x * 0.5);
    let mut v = Array2::<Complex64>::eye(n);

    let total: f64 = a.iter().map(|x| x.norm_sqr()).sum();
    for _ in 0..JACOBI_MAX_SWEEPS {
        let mut off = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                off += a[[p, q]].norm_sqr();
            }
        }
        if off <= JACOBI_TOLERANCE * JACOBI_TOLERANCE * total {
            break;
        }
        for p in 0..n {
            for q in (p + 1)..n {
                jacobi_rotate(&mut a, &mut v, p, q);
            }
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| a[[j, j]].re.total_cmp(&a[[i, i]].re));

    let values = Array1::from_iter(order.iter().map(|&i| a[[i, i]].re));
    let mut vectors = Array2::<Complex64>::zeros((n, n));
    for (dst, &src) in order.iter().enumerate() {
        vectors.column_mut(dst).assign(&v.column(src));
    }
    (values, vectors)
}

/// Zero a[p][q] with a unitary rotation, accumulating it into v
fn jacobi_rotate(a: &mut Array2<Complex64>, v: &mut Array2<Complex64>, p: usize, q: usize) {
    let n = a.nrows();
    let r = a[[p, q]].norm();
    if r == 0.0 {
        return;
    }

    // Phase step: scale row/column q so that a[p][q] becomes the real value r
    let phase = a[[p, q]] / r;
    let phase_conj = phase.conj();
    for k in 0..n {
        a[[k, q]] *= phase_conj;
        v[[k, q]] *= phase_conj;
    }
    for k in 0..n {
        a[[q, k]] *= phase;
    }

    // Real Givens rotation on the (p, q) plane
    let app = a[[p, p]].re;
    let aqq = a[[q, q]].re;
    let theta = 0.5 * libm::atan2(2.0 * r, aqq - app);
    let c = libm::cos(theta);
    let s = libm::sin(theta);

    for k in 0..n {
        let akp = a[[k, p]];
        let akq = a[[k, q]];
        a[[k, p]] = akp * c - akq * s;
        a[[k, q]] = akp * s + akq * c;

        let vkp = v[[k, p]];
        let vkq = v[[k, q]];
        v[[k, p]] = vkp * c - vkq * s;
        v[[k, q]] = vkp * s + vkq * c;
    }
    for k in 0..n {
        let apk = a[[p, k]];
        let aqk = a[[q, k]];
        a[[p, k]] = apk * c - aqk * s;
        a[[q, k]] = apk * s + aqk * c;
    }

    a[[p, q]] = Complex64::zero();
    a[[q, p]] = Complex64::zero();
    a[[p, p]] = Complex64::new(a[[p, p]].re, 0.0);
    a[[q, q]] = Complex64::new(a[[q, q]].re, 0.0);
}

/// Result of a generalized eigen solve
#[derive(Clone, Debug)]
pub struct GeneralizedEigen {
    /// Largest eigenvalue of Rb^-1 * Ra
    pub value: f64,
    /// Unit norm eigenvector for `value`
    pub vector: Array1<Complex64>,
    /// Number of eigenvalues tied with the maximum
    pub ties: usize,
}

/// Principal eigenpair of rb^-1 * ra for Hermitian ra and Hermitian positive definite rb
///
/// Solved as the Hermitian problem L^-1 * ra * L^-H with rb = L * L^H, so the eigenvalues are
/// real. When several eigenvalues tie with the maximum the one with the lowest index in the
/// descending sort wins. Returns None when rb is singular.
pub fn max_generalized_eigenvector(ra: &Array2<Complex64>, rb: &Array2<Complex64>) -> Option<GeneralizedEigen> {
    let l = cholesky(rb)?;
    let x = forward_substitute(&l, ra);
    let c = forward_substitute(&l, &hermitian_transpose(&x));
    let (values, vectors) = hermitian_eigen(&c);

    let value = values[0];
    let tie_floor = value - EIGEN_TIE_TOLERANCE * value.abs().max(f64::MIN_POSITIVE);
    let ties = values.iter().filter(|&&e| e >= tie_floor).count();

    let mut vector = back_substitute_hermitian(&l, vectors.column(0));
    let norm = vector_norm(vector.view());
    if norm > 0.0 {
        vector.mapv_inplace(|x| x / norm);
    }
    Some(GeneralizedEigen { value, vector, ties })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    fn random_hermitian(rng: &mut StdRng, n: usize) -> Array2<Complex64> {
        let m = Array2::from_shape_fn((n, n), |_| c(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)));
        &m + &hermitian_transpose(&m)
    }

    fn random_positive_definite(rng: &mut StdRng, n: usize) -> Array2<Complex64> {
        let m = Array2::from_shape_fn((n, n), |_| c(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)));
        m.dot(&hermitian_transpose(&m)) + Array2::<Complex64>::eye(n).mapv(|x| x * 0.1)
    }

    fn max_abs_diff(a: &Array2<Complex64>, b: &Array2<Complex64>) -> f64 {
        a.iter().zip(b.iter()).map(|(x, y)| (x - y).norm()).fold(0.0, f64::max)
    }

    #[test]
    fn cholesky_reconstructs() {
        let mut rng = StdRng::seed_from_u64(7);
        for n in 1..6 {
            let m = random_positive_definite(&mut rng, n);
            let l = cholesky(&m).unwrap();
            let back = l.dot(&hermitian_transpose(&l));
            assert!(max_abs_diff(&m, &back) < 1e-12);
            for i in 0..n {
                for j in (i + 1)..n {
                    assert_eq!(l[[i, j]], Complex64::zero());
                }
            }
        }
    }

    #[test]
    fn cholesky_rejects_singular() {
        let a = array![c(1.0, 0.0), c(0.0, 1.0)];
        let m = outer_hermitian(a.view(), a.view());
        assert!(cholesky(&m).is_none());
        let zero = Array2::<Complex64>::zeros((3, 3));
        assert!(cholesky(&zero).is_none());
    }

    #[test]
    fn eigen_decomposition_of_random_hermitian() {
        let mut rng = StdRng::seed_from_u64(42);
        for n in 1..7 {
            let m = random_hermitian(&mut rng, n);
            let (values, vectors) = hermitian_eigen(&m);
            for k in 0..n {
                let v = vectors.column(k);
                let mv = m.dot(&v);
                for i in 0..n {
                    assert!((mv[i] - v[i] * values[k]).norm() < 1e-10);
                }
                assert!((vector_norm(v) - 1.0).abs() < 1e-12);
            }
            for k in 1..n {
                assert!(values[k - 1] >= values[k]);
            }
        }
    }

    #[test]
    fn generalized_eigenvector_satisfies_pencil() {
        let mut rng = StdRng::seed_from_u64(3);
        for n in 2..5 {
            let ra = random_hermitian(&mut rng, n);
            let rb = random_positive_definite(&mut rng, n);
            let eig = max_generalized_eigenvector(&ra, &rb).unwrap();
            let lhs = ra.dot(&eig.vector);
            let rhs = rb.dot(&eig.vector).mapv(|x| x * eig.value);
            for i in 0..n {
                assert!((lhs[i] - rhs[i]).norm() < 1e-9);
            }
            assert!((vector_norm(eig.vector.view()) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn rank_one_pencil_picks_the_steered_direction() {
        let a = array![c(1.0, 0.0), c(0.0, 1.0)];
        let ra = outer_hermitian(a.view(), a.view());
        let rb = Array2::<Complex64>::eye(2);
        let eig = max_generalized_eigenvector(&ra, &rb).unwrap();
        assert!((eig.value - 2.0).abs() < 1e-12);
        assert_eq!(eig.ties, 1);
        // Parallel to a: |<a, w>| == |a|
        let overlap: Complex64 = a.iter().zip(eig.vector.iter()).map(|(x, y)| x.conj() * y).sum();
        assert!((overlap.norm() - 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn ties_resolve_to_first_diagonal_entry() {
        let identity = Array2::<Complex64>::eye(3);
        let eig = max_generalized_eigenvector(&identity, &identity).unwrap();
        assert_eq!(eig.ties, 3);
        assert!((eig.vector[0] - c(1.0, 0.0)).norm() < 1e-15);
        assert!(eig.vector[1].norm() < 1e-15);
        assert!(eig.vector[2].norm() < 1e-15);

        // Same answer on every call
        let again = max_generalized_eigenvector(&identity, &identity).unwrap();
        assert_eq!(eig.vector, again.vector);
    }

    #[test]
    fn singular_denominator_is_reported() {
        let a = array![c(1.0, 0.0), c(1.0, 0.0)];
        let singular = outer_hermitian(a.view(), a.view());
        assert!(max_generalized_eigenvector(&singular, &singular).is_none());
    }
}
