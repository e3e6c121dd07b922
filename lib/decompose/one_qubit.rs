//! Closed-form ZYZ Euler decomposition of single-qubit unitaries.
//!
//! Any 2×2 unitary factors as U = e^{iα}·Rz(β)·Ry(γ)·Rz(δ). The angles come
//! straight from the matrix entries; no search is involved, and the result
//! is exact up to floating-point error.

use num_complex::Complex64 as C64;
use crate::{
    gate::Gate,
    linalg::CMat,
    qubit::Qubit,
};

/// Euler angles for U = e^{iα}·Rz(β)·Ry(γ)·Rz(δ).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Euler {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub delta: f64,
}

/// Compute the ZYZ Euler angles of a 2×2 unitary.
///
/// Degenerate branches (γ ≈ 0 or γ ≈ π, where β and δ are only jointly
/// determined) are resolved by the fixed convention δ = 0.
pub fn zyz(u: &CMat) -> Euler {
    let det = u[[0, 0]] * u[[1, 1]] - u[[0, 1]] * u[[1, 0]];
    let root = det.sqrt();
    let su = u.mapv(|z| z / root);
    let n10 = su[[1, 0]].norm();
    let n00 = su[[0, 0]].norm();
    let gamma = 2.0 * n10.atan2(n00);
    let (beta, delta) =
        if n10 < 1e-12 {
            (2.0 * su[[1, 1]].arg(), 0.0)
        } else if n00 < 1e-12 {
            (2.0 * su[[1, 0]].arg(), 0.0)
        } else {
            (
                su[[1, 1]].arg() + su[[1, 0]].arg(),
                su[[1, 1]].arg() - su[[1, 0]].arg(),
            )
        };
    // the residual phase is read back off the reconstruction, which also
    // absorbs the branch of the determinant root
    let recon = rz_ry_rz(beta, gamma, delta);
    let mut tr = C64::from(0.0);
    for k in 0..2 {
        for j in 0..2 {
            tr += u[[k, j]] * recon[[k, j]].conj();
        }
    }
    let alpha = tr.arg();
    Euler { alpha, beta, gamma, delta }
}

// Rz(β)·Ry(γ)·Rz(δ) as a matrix
fn rz_ry_rz(beta: f64, gamma: f64, delta: f64) -> CMat {
    let (cg, sg) = ((gamma / 2.0).cos(), (gamma / 2.0).sin());
    let half_sum = (beta + delta) / 2.0;
    let half_diff = (beta - delta) / 2.0;
    ndarray::array![
        [
            C64::cis(-half_sum) * cg,
            -C64::cis(-half_diff) * sg,
        ],
        [
            C64::cis(half_diff) * sg,
            C64::cis(half_sum) * cg,
        ],
    ]
}

/// Emit the Euler decomposition of a 2×2 unitary as a chronological gate
/// sequence `[Rz(δ), Ry(γ), Rz(β), Ph(α)]`, eliding rotations smaller than
/// `tol`.
pub fn euler_gates(u: &CMat, qubit: &Qubit, tol: f64) -> Vec<Gate> {
    let mut gates = euler_rotations(u, qubit, tol);
    let angles = zyz(u);
    if angles.alpha.abs() > tol {
        gates.push(Gate::ph(angles.alpha, qubit.clone()));
    }
    gates
}

/// Like [`euler_gates`], but without the trailing global-phase gate; used
/// where an enclosing decomposition fixes the phase in one place.
pub fn euler_rotations(u: &CMat, qubit: &Qubit, tol: f64) -> Vec<Gate> {
    let angles = zyz(u);
    let mut gates: Vec<Gate> = Vec::new();
    if angles.delta.abs() > tol {
        gates.push(Gate::rz(angles.delta, qubit.clone()));
    }
    if angles.gamma.abs() > tol {
        gates.push(Gate::ry(angles.gamma, qubit.clone()));
    }
    if angles.beta.abs() > tol {
        gates.push(Gate::rz(angles.beta, qubit.clone()));
    }
    gates
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{ c, gate::StdGate, linalg };

    fn reconstruct(angles: &Euler) -> CMat {
        let ph = C64::cis(angles.alpha);
        rz_ry_rz(angles.beta, angles.gamma, angles.delta)
            .mapv(|z| z * ph)
    }

    fn check_roundtrip(u: &CMat) {
        let angles = zyz(u);
        let recon = reconstruct(&angles);
        assert!(
            linalg::max_diff(&recon, u) < 1e-9,
            "euler angles must reconstruct the unitary; got {angles:?}",
        );
    }

    #[test]
    fn named_gates_roundtrip() {
        for gate in [
            StdGate::I,
            StdGate::X,
            StdGate::Y,
            StdGate::Z,
            StdGate::H,
            StdGate::S,
            StdGate::TDag,
            StdGate::V,
            StdGate::Rx(1.234.into()),
            StdGate::Ry((-0.51).into()),
            StdGate::Rz(2.78.into()),
            StdGate::PhaseShift(0.9.into()),
        ] {
            check_roundtrip(&gate.matrix().unwrap());
        }
    }

    #[test]
    fn composed_unitaries_roundtrip() {
        // walk through a few products to hit generic branches
        let a = StdGate::Rz(0.3.into()).matrix().unwrap();
        let b = StdGate::Ry(1.1.into()).matrix().unwrap();
        let cmat = StdGate::Rx((-2.2).into()).matrix().unwrap();
        let t = StdGate::T.matrix().unwrap();
        check_roundtrip(&a.dot(&b));
        check_roundtrip(&b.dot(&cmat).dot(&t));
        check_roundtrip(&t.dot(&a).dot(&b).dot(&cmat));
    }

    #[test]
    fn identity_produces_no_rotations() {
        let id: CMat = CMat::eye(2);
        let q = Qubit::Int(0);
        assert!(euler_gates(&id, &q, 1e-9).is_empty());
    }

    #[test]
    fn degenerate_branch_convention() {
        // diagonal unitaries keep δ = 0
        let u = ndarray::array![
            [c!(e 0.4), c!(0.0)],
            [c!(0.0), c!(e (-0.4))],
        ];
        let angles = zyz(&u);
        assert_eq!(angles.delta, 0.0);
        check_roundtrip(&u);
    }
}
