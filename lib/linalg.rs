//! Small-matrix complex linear algebra for the decomposition engine.
//!
//! Everything here operates on plain `ndarray` matrices. Eigendecompositions
//! use cyclic Jacobi iteration, which is exact enough at the sizes the
//! decomposition engine ever sees (2^k with small k) and keeps the crate free
//! of external LAPACK bindings.

use ndarray::{ self as nd };
use num_complex::Complex64 as C64;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinalgError {
    #[error("eigensolver failed to converge in {0} sweeps")]
    NoConvergence(usize),

    #[error("matrix is not a Kronecker product of single-qubit factors")]
    NotAProduct,
}
pub type LinalgResult<T> = Result<T, LinalgError>;
use LinalgError::*;

/// A square complex matrix.
pub type CMat = nd::Array2<C64>;
/// A square real matrix.
pub type RMat = nd::Array2<f64>;

const MAX_SWEEPS: usize = 64;

/// Conjugate transpose.
pub fn dagger(m: &CMat) -> CMat {
    m.t().mapv(|a| a.conj())
}

/// Kronecker product, with `a`'s indices more significant.
pub fn kron(a: &CMat, b: &CMat) -> CMat {
    let (ar, ac) = a.dim();
    let (br, bc) = b.dim();
    let mut out: CMat = CMat::zeros((ar * br, ac * bc));
    for i in 0..ar {
        for j in 0..ac {
            for k in 0..br {
                for l in 0..bc {
                    out[[i * br + k, j * bc + l]] = a[[i, j]] * b[[k, l]];
                }
            }
        }
    }
    out
}

/// Largest elementwise modulus of `a - b`.
pub fn max_diff(a: &CMat, b: &CMat) -> f64 {
    a.iter().zip(b.iter())
        .map(|(l, r)| (*l - *r).norm())
        .fold(0.0, f64::max)
}

/// Return `true` if `m` is unitary to within `tol` (largest elementwise
/// deviation of m†m from the identity).
pub fn is_unitary(m: &CMat, tol: f64) -> bool {
    let prod = dagger(m).dot(m);
    let eye: CMat = CMat::eye(m.nrows());
    max_diff(&prod, &eye) < tol
}

/// Return `true` if `m` is Hermitian to within `tol`.
pub fn is_hermitian(m: &CMat, tol: f64) -> bool {
    max_diff(m, &dagger(m)) < tol
}

/// Determinant by Gaussian elimination with partial pivoting.
pub fn det(m: &CMat) -> C64 {
    let n = m.nrows();
    let mut a = m.to_owned();
    let mut acc = C64::from(1.0);
    for k in 0..n {
        let (piv, piv_norm) =
            (k..n)
            .map(|i| (i, a[[i, k]].norm()))
            .fold((k, -1.0), |best, cand| {
                if cand.1 > best.1 { cand } else { best }
            });
        if piv_norm < 1e-300 { return C64::from(0.0); }
        if piv != k {
            for j in 0..n {
                let tmp = a[[k, j]];
                a[[k, j]] = a[[piv, j]];
                a[[piv, j]] = tmp;
            }
            acc = -acc;
        }
        let pivot = a[[k, k]];
        acc *= pivot;
        for i in k + 1..n {
            let factor = a[[i, k]] / pivot;
            for j in k..n {
                let sub = factor * a[[k, j]];
                a[[i, j]] -= sub;
            }
        }
    }
    acc
}

fn offdiag_norm_real(m: &RMat) -> f64 {
    let n = m.nrows();
    let mut acc = 0.0;
    for p in 0..n {
        for q in 0..n {
            if p != q { acc += m[[p, q]] * m[[p, q]]; }
        }
    }
    acc.sqrt()
}

fn offdiag_norm_herm(m: &CMat) -> f64 {
    let n = m.nrows();
    let mut acc = 0.0;
    for p in 0..n {
        for q in 0..n {
            if p != q { acc += m[[p, q]].norm_sqr(); }
        }
    }
    acc.sqrt()
}

// rotation coefficients (c, s) zeroing the off-diagonal element of the 2x2
// symmetric block [[app, r], [r, aqq]]
fn jacobi_cs(app: f64, aqq: f64, r: f64) -> (f64, f64) {
    let theta = (aqq - app) / (2.0 * r);
    let t =
        if theta >= 0.0 {
            1.0 / (theta + (theta * theta + 1.0).sqrt())
        } else {
            -1.0 / (-theta + (theta * theta + 1.0).sqrt())
        };
    let c = 1.0 / (t * t + 1.0).sqrt();
    (c, t * c)
}

/// Eigendecomposition of a real symmetric matrix by cyclic Jacobi iteration.
///
/// Returns eigenvalues in ascending order, paired with the columns of the
/// returned orthogonal matrix.
pub fn eigh_real(a: &RMat) -> LinalgResult<(Vec<f64>, RMat)> {
    let n = a.nrows();
    let mut m = a.to_owned();
    let mut v: RMat = RMat::eye(n);
    if n < 2 {
        return Ok((m.diag().to_vec(), v));
    }
    let scale =
        m.iter().map(|x| x * x).sum::<f64>().sqrt().max(f64::MIN_POSITIVE);
    let mut converged = false;
    for _ in 0..MAX_SWEEPS {
        if offdiag_norm_real(&m) < 1e-14 * scale {
            converged = true;
            break;
        }
        for p in 0..n - 1 {
            for q in p + 1..n {
                let r = m[[p, q]];
                if r.abs() < 1e-300 { continue; }
                let (c, s) = jacobi_cs(m[[p, p]], m[[q, q]], r);
                // m <- JᵀmJ, v <- vJ with J = [[c, s], [-s, c]] on (p, q)
                for k in 0..n {
                    let mkp = m[[k, p]];
                    let mkq = m[[k, q]];
                    m[[k, p]] = c * mkp - s * mkq;
                    m[[k, q]] = s * mkp + c * mkq;
                }
                for k in 0..n {
                    let mpk = m[[p, k]];
                    let mqk = m[[q, k]];
                    m[[p, k]] = c * mpk - s * mqk;
                    m[[q, k]] = s * mpk + c * mqk;
                }
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }
    if !converged && offdiag_norm_real(&m) >= 1e-14 * scale {
        return Err(NoConvergence(MAX_SWEEPS));
    }
    let mut pairs: Vec<(f64, nd::Array1<f64>)> =
        (0..n)
        .map(|k| (m[[k, k]], v.column(k).to_owned()))
        .collect();
    pairs.sort_by(|l, r| l.0.partial_cmp(&r.0).unwrap());
    let evals: Vec<f64> = pairs.iter().map(|(e, _)| *e).collect();
    let mut vecs: RMat = RMat::zeros((n, n));
    for (k, (_, col)) in pairs.into_iter().enumerate() {
        vecs.column_mut(k).assign(&col);
    }
    Ok((evals, vecs))
}

/// Eigendecomposition of a complex Hermitian matrix by cyclic Jacobi
/// iteration.
///
/// Returns eigenvalues in ascending order, paired with the columns of the
/// returned unitary matrix.
pub fn eigh_hermitian(a: &CMat) -> LinalgResult<(Vec<f64>, CMat)> {
    let n = a.nrows();
    let mut m = a.to_owned();
    let mut v: CMat = CMat::eye(n);
    if n < 2 {
        return Ok((m.diag().iter().map(|z| z.re).collect(), v));
    }
    let scale =
        m.iter().map(|z| z.norm_sqr()).sum::<f64>().sqrt()
        .max(f64::MIN_POSITIVE);
    let mut converged = false;
    for _ in 0..MAX_SWEEPS {
        if offdiag_norm_herm(&m) < 1e-14 * scale {
            converged = true;
            break;
        }
        for p in 0..n - 1 {
            for q in p + 1..n {
                let b = m[[p, q]];
                let r = b.norm();
                if r < 1e-300 { continue; }
                let u = b / r;
                let (c, s) = jacobi_cs(m[[p, p]].re, m[[q, q]].re, r);
                // m <- J†mJ, v <- vJ with the block of J on (p, q) equal to
                // [[c, s·u], [-s·conj(u), c]]
                for k in 0..n {
                    let mkp = m[[k, p]];
                    let mkq = m[[k, q]];
                    m[[k, p]] = c * mkp - s * u.conj() * mkq;
                    m[[k, q]] = s * u * mkp + c * mkq;
                }
                for k in 0..n {
                    let mpk = m[[p, k]];
                    let mqk = m[[q, k]];
                    m[[p, k]] = c * mpk - s * u * mqk;
                    m[[q, k]] = s * u.conj() * mpk + c * mqk;
                }
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * u.conj() * vkq;
                    v[[k, q]] = s * u * vkp + c * vkq;
                }
            }
        }
    }
    if !converged && offdiag_norm_herm(&m) >= 1e-14 * scale {
        return Err(NoConvergence(MAX_SWEEPS));
    }
    let mut pairs: Vec<(f64, nd::Array1<C64>)> =
        (0..n)
        .map(|k| (m[[k, k]].re, v.column(k).to_owned()))
        .collect();
    pairs.sort_by(|l, r| l.0.partial_cmp(&r.0).unwrap());
    let evals: Vec<f64> = pairs.iter().map(|(e, _)| *e).collect();
    let mut vecs: CMat = CMat::zeros((n, n));
    for (k, (_, col)) in pairs.into_iter().enumerate() {
        vecs.column_mut(k).assign(&col);
    }
    Ok((evals, vecs))
}

// indices of maximal runs of near-equal values in an ascending list
fn degenerate_groups(evals: &[f64], gap: f64) -> Vec<(usize, usize)> {
    let mut groups: Vec<(usize, usize)> = Vec::new();
    let mut start = 0;
    for k in 1..=evals.len() {
        if k == evals.len() || evals[k] - evals[k - 1] > gap {
            groups.push((start, k));
            start = k;
        }
    }
    groups
}

/// Simultaneously diagonalize two commuting real symmetric matrices.
///
/// Returns an orthogonal `P` along with the diagonals of `PᵀAP` and `PᵀBP`.
/// Degenerate eigenspaces of `A` are resolved by diagonalizing the
/// restriction of `B` within them.
pub fn simdiag_symmetric(a: &RMat, b: &RMat)
    -> LinalgResult<(RMat, Vec<f64>, Vec<f64>)>
{
    let (evals_a, mut p) = eigh_real(a)?;
    let scale =
        a.iter().map(|x| x * x).sum::<f64>().sqrt().max(1.0);
    let gap = 1e-9 * scale;
    for (lo, hi) in degenerate_groups(&evals_a, gap) {
        if hi - lo < 2 { continue; }
        let cols = p.slice(nd::s![.., lo..hi]).to_owned();
        let b_sub = cols.t().dot(b).dot(&cols);
        let (_, r) = eigh_real(&b_sub)?;
        let refined = cols.dot(&r);
        p.slice_mut(nd::s![.., lo..hi]).assign(&refined);
    }
    let da = p.t().dot(a).dot(&p);
    let db = p.t().dot(b).dot(&p);
    Ok((p, da.diag().to_vec(), db.diag().to_vec()))
}

/// Simultaneously diagonalize two commuting Hermitian matrices.
pub fn simdiag_hermitian(a: &CMat, b: &CMat)
    -> LinalgResult<(CMat, Vec<f64>, Vec<f64>)>
{
    let (evals_a, mut p) = eigh_hermitian(a)?;
    let scale =
        a.iter().map(|z| z.norm_sqr()).sum::<f64>().sqrt().max(1.0);
    let gap = 1e-9 * scale;
    for (lo, hi) in degenerate_groups(&evals_a, gap) {
        if hi - lo < 2 { continue; }
        let cols = p.slice(nd::s![.., lo..hi]).to_owned();
        let b_sub = dagger(&cols).dot(b).dot(&cols);
        let (_, r) = eigh_hermitian(&b_sub)?;
        let refined = cols.dot(&r);
        p.slice_mut(nd::s![.., lo..hi]).assign(&refined);
    }
    let da = dagger(&p).dot(a).dot(&p);
    let db = dagger(&p).dot(b).dot(&p);
    Ok((
        p,
        da.diag().iter().map(|z| z.re).collect(),
        db.diag().iter().map(|z| z.re).collect(),
    ))
}

/// Eigendecomposition of a unitary (more generally, normal) matrix.
///
/// Returns unit-modulus eigenvalues paired with the columns of the returned
/// unitary matrix, obtained by simultaneous diagonalization of the Hermitian
/// and anti-Hermitian parts.
pub fn eig_unitary(g: &CMat) -> LinalgResult<(Vec<C64>, CMat)> {
    let gd = dagger(g);
    let h1 = (g + &gd).mapv(|z| z / 2.0);
    let h2 = (g - &gd).mapv(|z| z / (2.0 * C64::i()));
    let (p, d1, d2) = simdiag_hermitian(&h1, &h2)?;
    let evals: Vec<C64> =
        d1.iter().zip(d2.iter())
        .map(|(re, im)| C64::new(*re, *im))
        .collect();
    Ok((evals, p))
}

/// Factor a 4×4 matrix into `g · A ⊗ B` with `det A = det B = 1`.
///
/// Fails with [`LinalgError::NotAProduct`] if the matrix is not a Kronecker
/// product of 2×2 factors to within `tol`.
pub fn kron_factor(m: &CMat, tol: f64) -> LinalgResult<(C64, CMat, CMat)> {
    let (mut i0, mut j0, mut best) = (0, 0, -1.0_f64);
    for i in 0..4 {
        for j in 0..4 {
            let nij = m[[i, j]].norm();
            if nij > best { best = nij; i0 = i; j0 = j; }
        }
    }
    if best < 1e-300 { return Err(NotAProduct); }
    let (a0, c0) = (i0 / 2, i0 % 2);
    let (b0, d0) = (j0 / 2, j0 % 2);
    let mut bmat: CMat = CMat::zeros((2, 2));
    for c in 0..2 {
        for d in 0..2 {
            bmat[[c, d]] = m[[2 * a0 + c, 2 * b0 + d]];
        }
    }
    let pivot = bmat[[c0, d0]];
    let mut amat: CMat = CMat::zeros((2, 2));
    for a in 0..2 {
        for b in 0..2 {
            amat[[a, b]] = m[[2 * a + c0, 2 * b + d0]] / pivot;
        }
    }
    let det_a = amat[[0, 0]] * amat[[1, 1]] - amat[[0, 1]] * amat[[1, 0]];
    let det_b = bmat[[0, 0]] * bmat[[1, 1]] - bmat[[0, 1]] * bmat[[1, 0]];
    if det_a.norm() < tol || det_b.norm() < tol {
        return Err(NotAProduct);
    }
    let amat = amat.mapv(|z| z / det_a.sqrt());
    let bmat = bmat.mapv(|z| z / det_b.sqrt());
    let phase = m[[i0, j0]] / (amat[[a0, b0]] * bmat[[c0, d0]]);
    let phase = phase / phase.norm();
    let recon = kron(&amat, &bmat).mapv(|z| z * phase);
    if max_diff(&recon, m) > tol.max(1e-9) {
        return Err(NotAProduct);
    }
    Ok((phase, amat, bmat))
}

/// Produce a unit vector orthonormal to the given columns.
///
/// Candidates are the canonical basis vectors; the one with the largest
/// residual after projecting out `cols` is selected (smallest index on
/// ties), making the completion deterministic.
pub fn complement_unit(cols: &[nd::Array1<C64>], dim: usize)
    -> nd::Array1<C64>
{
    let mut best: Option<(f64, nd::Array1<C64>)> = None;
    for k in 0..dim {
        let mut cand: nd::Array1<C64> = nd::Array1::zeros(dim);
        cand[k] = C64::from(1.0);
        for col in cols {
            let overlap: C64 =
                col.iter().zip(cand.iter())
                .map(|(c, x)| c.conj() * x)
                .sum();
            cand = cand - col.mapv(|z| z * overlap);
        }
        let norm = cand.iter().map(|z| z.norm_sqr()).sum::<f64>().sqrt();
        if best.as_ref().map_or(true, |(bn, _)| norm > *bn + 1e-12) {
            best = Some((norm, cand));
        }
    }
    let (norm, v) = best.unwrap();
    v.mapv(|z| z / norm)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::c;

    const RT2_: f64 = std::f64::consts::FRAC_1_SQRT_2;

    fn approx(l: f64, r: f64, eps: f64) -> bool { (l - r).abs() < eps }

    #[test]
    fn eigh_real_2x2() {
        let a = nd::array![[2.0, 1.0], [1.0, 2.0]];
        let (evals, v) = eigh_real(&a).unwrap();
        assert!(approx(evals[0], 1.0, 1e-12));
        assert!(approx(evals[1], 3.0, 1e-12));
        let recon = v.dot(&nd::Array2::from_diag(
            &nd::Array1::from(evals.clone()),
        )).dot(&v.t());
        for (l, r) in recon.iter().zip(a.iter()) {
            assert!(approx(*l, *r, 1e-12));
        }
    }

    #[test]
    fn eigh_hermitian_recon() {
        let a = nd::array![
            [c!(1.0), c!(i 0.5), c!(0.25)],
            [c!(i (-0.5)), c!(-1.0), c!(0.0)],
            [c!(0.25), c!(0.0), c!(0.5)],
        ];
        let (evals, v) = eigh_hermitian(&a).unwrap();
        let d: CMat = CMat::from_diag(
            &evals.iter().map(|e| C64::from(*e)).collect::<nd::Array1<C64>>(),
        );
        let recon = v.dot(&d).dot(&dagger(&v));
        assert!(max_diff(&recon, &a) < 1e-10);
        assert!(is_unitary(&v, 1e-10));
    }

    #[test]
    fn unitary_eig() {
        // a unitary with a degenerate Hermitian part
        let g = nd::array![
            [c!(0.0), c!(1.0), c!(0.0)],
            [c!(1.0), c!(0.0), c!(0.0)],
            [c!(0.0), c!(0.0), c!(i 1.0)],
        ];
        let (evals, v) = eig_unitary(&g).unwrap();
        let d: CMat = CMat::from_diag(&nd::Array1::from(evals));
        let recon = v.dot(&d).dot(&dagger(&v));
        assert!(max_diff(&recon, &g) < 1e-10);
    }

    #[test]
    fn det_permutation() {
        let m = nd::array![
            [c!(0.0), c!(1.0)],
            [c!(1.0), c!(0.0)],
        ];
        assert!((det(&m) + c!(1.0)).norm() < 1e-12);
    }

    #[test]
    fn kron_factor_roundtrip() {
        use std::f64::consts::FRAC_1_SQRT_2 as RT2;
        let h = nd::array![
            [c!(RT2), c!(RT2)],
            [c!(RT2), c!(-RT2)],
        ];
        let s = nd::array![
            [c!(1.0), c!(0.0)],
            [c!(0.0), c!(i 1.0)],
        ];
        let m = kron(&h, &s).mapv(|z| z * c!(e 0.3));
        let (g, a, b) = kron_factor(&m, 1e-9).unwrap();
        let recon = kron(&a, &b).mapv(|z| z * g);
        assert!(max_diff(&recon, &m) < 1e-9);
        let det_a = a[[0, 0]] * a[[1, 1]] - a[[0, 1]] * a[[1, 0]];
        assert!((det_a - c!(1.0)).norm() < 1e-9);
    }

    #[test]
    fn complement_is_orthonormal() {
        let col = nd::Array1::from(vec![c!(RT2_), c!(RT2_), c!(0.0)]);
        let v = complement_unit(&[col.clone()], 3);
        let overlap: C64 =
            col.iter().zip(v.iter()).map(|(c, x)| c.conj() * x).sum();
        assert!(overlap.norm() < 1e-12);
        let norm: f64 = v.iter().map(|z| z.norm_sqr()).sum();
        assert!(approx(norm, 1.0, 1e-12));
    }
}
