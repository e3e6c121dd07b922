//! Recursive decomposition of n-qubit unitaries via the cosine-sine
//! (quantum Shannon) construction.
//!
//! A 2^n × 2^n unitary splits on its leading qubit into two block-diagonal
//! multiplexors and a multiplexed Ry (the cosine-sine core). Each
//! block-diagonal operator demultiplexes, through an eigendecomposition of
//! W0·W1†, into two half-size unitaries and a multiplexed Rz. Multiplexed
//! rotations lower to Gray-code CX/rotation chains, and the recursion
//! bottoms out at the two-qubit canonical decomposition.
//!
//! Gate count grows combinatorially with qubit number; the gate set's
//! qubit ceiling is an operational bound on this recursion, not a
//! correctness bound.

use ndarray::{ self as nd };
use num_complex::Complex64 as C64;
use crate::{
    circuit::Circuit,
    gate::Gate,
    linalg::{ self, CMat },
    qubit::Qubit,
};
use super::{
    one_qubit, two_qubit,
    DecomposeError, DecomposeResult, Entangler, GateSet, ELIDE,
};

// singular values below this are treated as exactly 0 (or 1) when picking
// which block determines a column
const SV_TOL: f64 = 1e-7;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Axis { Y, Z }

/// Decompose an n-qubit unitary over the given (ordered) qubits into the
/// target gate set. The first qubit corresponds to the most significant
/// axis of the matrix.
pub(crate) fn shannon(
    mat: &CMat,
    qubits: &[Qubit],
    gs: &GateSet,
) -> DecomposeResult<Circuit> {
    match qubits {
        [] => Ok(Circuit::new(Vec::<Qubit>::new())),
        [q] => {
            let mut circ = Circuit::new([q.clone()]);
            circ.extend(one_qubit::euler_gates(mat, q, ELIDE))?;
            Ok(circ)
        },
        [q0, q1] => two_qubit::synthesize(mat, q0, q1, gs),
        _ => {
            let csd = cosine_sine(mat)?;
            let r0d = linalg::dagger(&csd.r0);
            let r1d = linalg::dagger(&csd.r1);
            let right = demultiplex(&r0d, &r1d, qubits, gs)?;
            let ry_angles: Vec<f64> =
                csd.thetas.iter().map(|t| 2.0 * t).collect();
            let ry =
                multiplexed_rotation(Axis::Y, &ry_angles, qubits, gs)?;
            let left = demultiplex(&csd.l0, &csd.l1, qubits, gs)?;
            Ok(right.then(&ry).then(&left))
        },
    }
}

// W0 ⊕ W1 over the leading qubit, factored as
// (Vg⊕Vg)·(D⊕D†)·(W⊕W) with W0·W1† = Vg·D²·Vg†
fn demultiplex(
    w0: &CMat,
    w1: &CMat,
    qubits: &[Qubit],
    gs: &GateSet,
) -> DecomposeResult<Circuit> {
    let g = w0.dot(&linalg::dagger(w1));
    let (evals, vg) = linalg::eig_unitary(&g)?;
    let lam: nd::Array1<C64> = nd::Array1::from(evals.clone());
    let recon =
        vg.dot(&CMat::from_diag(&lam)).dot(&linalg::dagger(&vg));
    let resid = linalg::max_diff(&recon, &g);
    if resid > 1e-8 {
        return Err(DecomposeError::NumericalInstability(format!(
            "multiplexor eigendecomposition residual {resid:.2e}",
        )));
    }
    let d_conj: nd::Array1<C64> =
        evals.iter().map(|lam| C64::cis(-lam.arg() / 2.0)).collect();
    let w =
        CMat::from_diag(&d_conj)
        .dot(&linalg::dagger(&vg))
        .dot(w0);
    let rest = &qubits[1..];
    let w_circ = shannon(&w, rest, gs)?;
    let rz_angles: Vec<f64> =
        evals.iter().map(|lam| -lam.arg()).collect();
    let rz = multiplexed_rotation(Axis::Z, &rz_angles, qubits, gs)?;
    let v_circ = shannon(&vg, rest, gs)?;
    Ok(w_circ.then(&rz).then(&v_circ))
}

// a rotation on the leading qubit multiplexed over all remaining qubits,
// lowered to the standard Gray-code chain of rotations and CXs
fn multiplexed_rotation(
    axis: Axis,
    angles: &[f64],
    qubits: &[Qubit],
    gs: &GateSet,
) -> DecomposeResult<Circuit> {
    let target = &qubits[0];
    let controls = &qubits[1..];
    let k = controls.len();
    debug_assert_eq!(angles.len(), 1 << k);
    let rot = |theta: f64| -> Gate {
        match axis {
            Axis::Y => Gate::ry(theta, target.clone()),
            Axis::Z => Gate::rz(theta, target.clone()),
        }
    };
    let mut circ = Circuit::new(qubits.iter().cloned());
    if angles.iter().all(|t| t.abs() < ELIDE) {
        return Ok(circ);
    }
    if k == 0 {
        circ.append(rot(angles[0]))?;
        return Ok(circ);
    }
    let gray = |i: usize| i ^ (i >> 1);
    let size = 1_usize << k;
    for i in 0..size {
        let tilde: f64 =
            angles.iter().enumerate()
            .map(|(j, theta)| {
                let parity = (gray(i) & j).count_ones() % 2;
                if parity == 1 { -theta } else { *theta }
            })
            .sum::<f64>() / size as f64;
        if tilde.abs() > ELIDE {
            circ.append(rot(tilde))?;
        }
        let flipped = gray(i) ^ gray((i + 1) % size);
        let bit = flipped.trailing_zeros() as usize;
        let control = &controls[k - 1 - bit];
        match gs.entangler {
            Entangler::Cx => {
                circ.append(Gate::cx(control.clone(), target.clone())
                    .expect("control and target are distinct"))?;
            },
            Entangler::Cz => {
                circ.append(Gate::h(target.clone()))?;
                circ.append(Gate::cz(control.clone(), target.clone())
                    .expect("control and target are distinct"))?;
                circ.append(Gate::h(target.clone()))?;
            },
        }
    }
    Ok(circ)
}

struct Csd {
    l0: CMat,
    l1: CMat,
    r0: CMat,
    r1: CMat,
    thetas: Vec<f64>,
}

// cosine-sine decomposition of a 2m × 2m unitary:
// mat = (L0⊕L1)·[[C, −S], [S, C]]·(R0⊕R1)†
fn cosine_sine(mat: &CMat) -> DecomposeResult<Csd> {
    let m = mat.nrows() / 2;
    let a = mat.slice(nd::s![..m, ..m]).to_owned();
    let b = mat.slice(nd::s![..m, m..]).to_owned();
    let c_blk = mat.slice(nd::s![m.., ..m]).to_owned();
    let d_blk = mat.slice(nd::s![m.., m..]).to_owned();

    let ata = linalg::dagger(&a).dot(&a);
    let (evals, vecs) = linalg::eigh_hermitian(&ata)?;
    // descending cosines, so θ ascends and degenerate-at-1 columns lead
    let order: Vec<usize> = (0..m).rev().collect();
    let mut r0: CMat = CMat::zeros((m, m));
    let mut cos: Vec<f64> = Vec::with_capacity(m);
    for (slot, src) in order.iter().enumerate() {
        r0.column_mut(slot).assign(&vecs.column(*src));
        cos.push(evals[*src].clamp(0.0, 1.0).sqrt());
    }
    let sin: Vec<f64> =
        cos.iter().map(|ck| (1.0 - ck * ck).max(0.0).sqrt()).collect();
    let thetas: Vec<f64> =
        sin.iter().zip(cos.iter()).map(|(s, c)| s.atan2(*c)).collect();

    // left factors column by column; columns whose defining block vanishes
    // are underdetermined and get a deterministic orthonormal completion
    // against every block-derived column, so derived columns come first
    let complete = |cols: Vec<Option<nd::Array1<C64>>>|
        -> Vec<nd::Array1<C64>>
    {
        let mut done: Vec<nd::Array1<C64>> =
            cols.iter().flatten().cloned().collect();
        let mut out: Vec<nd::Array1<C64>> = Vec::with_capacity(m);
        for col in cols {
            match col {
                Some(c) => { out.push(c); },
                None => {
                    let fresh = linalg::complement_unit(&done, m);
                    done.push(fresh.clone());
                    out.push(fresh);
                },
            }
        }
        out
    };
    let l0_cols: Vec<Option<nd::Array1<C64>>> =
        (0..m)
        .map(|i| {
            (cos[i] > SV_TOL).then(|| {
                let col = a.dot(&r0.column(i).to_owned());
                col.mapv(|z| z / cos[i])
            })
        })
        .collect();
    let l0_cols = complete(l0_cols);
    let l1_cols: Vec<Option<nd::Array1<C64>>> =
        (0..m)
        .map(|i| {
            (sin[i] > SV_TOL).then(|| {
                let col = c_blk.dot(&r0.column(i).to_owned());
                col.mapv(|z| z / sin[i])
            })
        })
        .collect();
    let l1_cols = complete(l1_cols);
    let bd = linalg::dagger(&b);
    let dd = linalg::dagger(&d_blk);
    let mut r1_cols: Vec<nd::Array1<C64>> = Vec::with_capacity(m);
    for i in 0..m {
        if sin[i] > SV_TOL {
            let col = bd.dot(&l0_cols[i]);
            r1_cols.push(col.mapv(|z| -z / sin[i]));
        } else {
            let col = dd.dot(&l1_cols[i]);
            r1_cols.push(col.mapv(|z| z / cos[i]));
        }
    }

    let from_cols = |cols: &[nd::Array1<C64>]| -> CMat {
        let mut out: CMat = CMat::zeros((m, m));
        for (k, col) in cols.iter().enumerate() {
            out.column_mut(k).assign(col);
        }
        out
    };
    let l0 = from_cols(&l0_cols);
    let l1 = from_cols(&l1_cols);
    let r1 = from_cols(&r1_cols);

    let csd = Csd { l0, l1, r0, r1, thetas };
    let resid = csd_residual(mat, &csd, &cos, &sin);
    if resid > 1e-8 {
        return Err(DecomposeError::NumericalInstability(format!(
            "cosine-sine factorization residual {resid:.2e}",
        )));
    }
    Ok(csd)
}

fn csd_residual(mat: &CMat, csd: &Csd, cos: &[f64], sin: &[f64]) -> f64 {
    let m = cos.len();
    let cd: nd::Array1<C64> = cos.iter().map(|x| C64::from(*x)).collect();
    let sd: nd::Array1<C64> = sin.iter().map(|x| C64::from(*x)).collect();
    let cmat: CMat = CMat::from_diag(&cd);
    let smat: CMat = CMat::from_diag(&sd);
    let r0d = linalg::dagger(&csd.r0);
    let r1d = linalg::dagger(&csd.r1);
    let tl = csd.l0.dot(&cmat).dot(&r0d);
    let tr = csd.l0.dot(&smat).dot(&r1d).mapv(|z| -z);
    let bl = csd.l1.dot(&smat).dot(&r0d);
    let br = csd.l1.dot(&cmat).dot(&r1d);
    let mut recon: CMat = CMat::zeros((2 * m, 2 * m));
    recon.slice_mut(nd::s![..m, ..m]).assign(&tl);
    recon.slice_mut(nd::s![..m, m..]).assign(&tr);
    recon.slice_mut(nd::s![m.., ..m]).assign(&bl);
    recon.slice_mut(nd::s![m.., m..]).assign(&br);
    linalg::max_diff(&recon, mat)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::gate::StdGate;

    fn q(k: i64) -> Qubit { Qubit::Int(k) }
    fn qs3() -> [Qubit; 3] { [q(0), q(1), q(2)] }

    fn check_shannon(mat: &CMat, gs: &GateSet) {
        let qubits = qs3();
        let circ = shannon(mat, &qubits, gs).unwrap();
        let built =
            circ.unitary().unwrap().to_matrix(&qubits).unwrap();
        assert!(
            linalg::max_diff(&built, mat) < 1e-6,
            "shannon recursion must reproduce the operator",
        );
        // everything must be in the target basis
        for gate in circ.gates() {
            assert!(
                gate.arity() == 1 || gs.is_entangler(gate),
                "gate {gate} is outside the target set",
            );
        }
    }

    #[test]
    fn multiplexed_ry_matches_block_matrix() {
        let angles = [0.3, -0.9, 1.4, 0.05];
        let circ =
            multiplexed_rotation(Axis::Y, &angles, &qs3(), &GateSet::cx())
            .unwrap();
        let built =
            circ.unitary().unwrap().to_matrix(&qs3()).unwrap();
        let mut expect: CMat = CMat::zeros((8, 8));
        for (j, theta) in angles.iter().enumerate() {
            let half = theta / 2.0;
            expect[[j, j]] = C64::from(half.cos());
            expect[[j, j + 4]] = C64::from(-half.sin());
            expect[[j + 4, j]] = C64::from(half.sin());
            expect[[j + 4, j + 4]] = C64::from(half.cos());
        }
        assert!(linalg::max_diff(&built, &expect) < 1e-10);
    }

    #[test]
    fn multiplexed_rz_matches_block_matrix() {
        let angles = [0.7, 0.7, -0.2, 1.1];
        let circ =
            multiplexed_rotation(Axis::Z, &angles, &qs3(), &GateSet::cx())
            .unwrap();
        let built =
            circ.unitary().unwrap().to_matrix(&qs3()).unwrap();
        let mut expect: CMat = CMat::zeros((8, 8));
        for (j, theta) in angles.iter().enumerate() {
            expect[[j, j]] = C64::cis(-theta / 2.0);
            expect[[j + 4, j + 4]] = C64::cis(theta / 2.0);
        }
        assert!(linalg::max_diff(&built, &expect) < 1e-10);
    }

    #[test]
    fn toffoli_decomposes() {
        check_shannon(&StdGate::CCX.matrix().unwrap(), &GateSet::cx());
    }

    #[test]
    fn doubly_controlled_z_decomposes() {
        check_shannon(&StdGate::CCZ.matrix().unwrap(), &GateSet::cx());
        check_shannon(&StdGate::CCZ.matrix().unwrap(), &GateSet::cz());
    }

    #[test]
    fn fredkin_decomposes() {
        check_shannon(&StdGate::CSwap.matrix().unwrap(), &GateSet::cx());
    }

    #[test]
    fn generic_three_qubit_unitary_decomposes() {
        let mut circ = Circuit::new([0, 1, 2]);
        circ.append(Gate::h(0)).unwrap();
        circ.append(Gate::cx(0, 1).unwrap()).unwrap();
        circ.append(Gate::t(1)).unwrap();
        circ.append(Gate::iswap(1, 2).unwrap()).unwrap();
        circ.append(Gate::rz(0.45, 0)).unwrap();
        circ.append(Gate::ccx(0, 1, 2).unwrap()).unwrap();
        circ.append(Gate::ry(-1.2, 2)).unwrap();
        let mat =
            circ.unitary().unwrap().to_matrix(&qs3()).unwrap();
        check_shannon(&mat, &GateSet::cx());
    }
}
