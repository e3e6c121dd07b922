//! Pure states and density operators over a qubit set.
//!
//! A [`State`] is a normalized ket tensor (one ket axis per qubit) or a
//! density operator tensor (one ket and one bra axis per qubit). States are
//! owned by the caller; evolution produces new states and never mutates or
//! retains its input.

use ndarray::{ self as nd };
use num_complex::Complex64 as C64;
use thiserror::Error;
use crate::{
    linalg,
    qubit::{ Qubit, sorted_qubits },
    tensor::{ Ix, Tensor, TensorError },
};

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state vector has norm {0}, expected 1 to within tolerance {1:.1e}")]
    NotNormalized(f64, f64),

    #[error("expected {expected} amplitude(s), got {got}")]
    WrongDimension { expected: usize, got: usize },

    #[error("density operator is not Hermitian with unit trace to within tolerance {0:.1e}")]
    NotADensityOperator(f64),

    #[error("basis index {0} out of range for {1} qubit(s)")]
    BasisOutOfRange(usize, usize),

    #[error("state is a density operator, not a pure ket")]
    NotAPureState,

    #[error("tensor error: {0}")]
    Tensor(#[from] TensorError),
}
pub type StateResult<T> = Result<T, StateError>;
use StateError::*;

#[derive(Clone, Debug, PartialEq)]
enum StateKind {
    Pure(Tensor),
    Density(Tensor),
}

/// A pure state vector or density operator over a qubit set.
///
/// Amplitudes are indexed with the first qubit in canonical order as the
/// most significant bit.
#[derive(Clone, Debug, PartialEq)]
pub struct State {
    qubits: Vec<Qubit>,
    kind: StateKind,
}

impl State {
    /// The all-zeros computational basis state ∣0…0⟩.
    pub fn zero<I, Q>(qubits: I) -> Self
    where
        I: IntoIterator<Item = Q>,
        Q: Into<Qubit>,
    {
        let qubits = sorted_qubits(qubits.into_iter().map(|q| q.into()));
        let indices: Vec<Ix> =
            qubits.iter().cloned().map(Ix::Ket).collect();
        let tensor =
            Tensor::new(
                indices,
                |ix| {
                    if ix.iter().all(|b| *b == 0) {
                        1.0.into()
                    } else {
                        0.0.into()
                    }
                },
            );
        Self { qubits, kind: StateKind::Pure(tensor) }
    }

    /// The computational basis state with the given index (first qubit in
    /// canonical order = most significant bit).
    pub fn basis<I, Q>(qubits: I, index: usize) -> StateResult<Self>
    where
        I: IntoIterator<Item = Q>,
        Q: Into<Qubit>,
    {
        let qubits = sorted_qubits(qubits.into_iter().map(|q| q.into()));
        let n = qubits.len();
        if index >= 1 << n {
            return Err(BasisOutOfRange(index, n));
        }
        let mut amps: nd::Array1<C64> = nd::Array1::zeros(1 << n);
        amps[index] = 1.0.into();
        let tensor = Tensor::from_vector(&qubits, amps)?;
        Ok(Self { qubits, kind: StateKind::Pure(tensor) })
    }

    /// A pure state from explicit amplitudes, which must be unit-norm to
    /// within `tol`.
    pub fn from_amplitudes<I, Q>(
        qubits: I,
        amplitudes: Vec<C64>,
        tol: f64,
    ) -> StateResult<Self>
    where
        I: IntoIterator<Item = Q>,
        Q: Into<Qubit>,
    {
        let qubits = sorted_qubits(qubits.into_iter().map(|q| q.into()));
        let dim = 1_usize << qubits.len();
        if amplitudes.len() != dim {
            return Err(WrongDimension { expected: dim, got: amplitudes.len() });
        }
        let norm: f64 =
            amplitudes.iter().map(|a| a.norm_sqr()).sum::<f64>().sqrt();
        if (norm - 1.0).abs() > tol {
            return Err(NotNormalized(norm, tol));
        }
        let tensor =
            Tensor::from_vector(&qubits, nd::Array1::from(amplitudes))?;
        Ok(Self { qubits, kind: StateKind::Pure(tensor) })
    }

    /// A density operator from an explicit matrix, which must be Hermitian
    /// with unit trace to within `tol`.
    ///
    /// Positive semidefiniteness is not verified here; states produced by
    /// evolution preserve it, so the check only matters for hand-built
    /// operators.
    pub fn from_density_matrix<I, Q>(
        qubits: I,
        matrix: nd::Array2<C64>,
        tol: f64,
    ) -> StateResult<Self>
    where
        I: IntoIterator<Item = Q>,
        Q: Into<Qubit>,
    {
        let qubits = sorted_qubits(qubits.into_iter().map(|q| q.into()));
        let dim = 1_usize << qubits.len();
        if matrix.shape() != [dim, dim] {
            return Err(WrongDimension {
                expected: dim * dim,
                got: matrix.len(),
            });
        }
        let trace: C64 = matrix.diag().iter().sum();
        if !linalg::is_hermitian(&matrix, tol)
            || (trace - C64::from(1.0)).norm() > tol
        {
            return Err(NotADensityOperator(tol));
        }
        let tensor = Tensor::from_matrix(&qubits, matrix)?;
        Ok(Self { qubits, kind: StateKind::Density(tensor) })
    }

    // evolution results are already normalized by construction
    pub(crate) fn pure_unchecked(qubits: Vec<Qubit>, tensor: Tensor) -> Self {
        Self { qubits, kind: StateKind::Pure(tensor) }
    }

    pub(crate) fn density_unchecked(qubits: Vec<Qubit>, tensor: Tensor)
        -> Self
    {
        Self { qubits, kind: StateKind::Density(tensor) }
    }

    /// The state's qubits, in canonical order.
    pub fn qubits(&self) -> &[Qubit] { &self.qubits }

    /// The number of qubits.
    pub fn num_qubits(&self) -> usize { self.qubits.len() }

    /// Return `true` if the state is a pure ket.
    pub fn is_pure(&self) -> bool {
        matches!(self.kind, StateKind::Pure(_))
    }

    /// Return `true` if the state is a density operator.
    pub fn is_density(&self) -> bool {
        matches!(self.kind, StateKind::Density(_))
    }

    /// The underlying tensor: ket axes only for pure states, ket and bra
    /// axes for density operators.
    pub fn tensor(&self) -> &Tensor {
        match &self.kind {
            StateKind::Pure(t) => t,
            StateKind::Density(t) => t,
        }
    }

    /// The pure state's amplitudes in canonical qubit order; fails for
    /// density operators.
    pub fn amplitudes(&self) -> StateResult<nd::Array1<C64>> {
        match &self.kind {
            StateKind::Pure(t) => Ok(t.to_vector(&self.qubits)?),
            StateKind::Density(_) => Err(NotAPureState),
        }
    }

    /// The density matrix in canonical qubit order; pure states are promoted
    /// on the fly.
    pub fn density_matrix(&self) -> StateResult<nd::Array2<C64>> {
        match &self.kind {
            StateKind::Pure(_) => self.to_density().density_matrix(),
            StateKind::Density(t) => Ok(t.to_matrix(&self.qubits)?),
        }
    }

    /// Promote to a density operator ∣ψ⟩⟨ψ∣; already-density states are
    /// cloned unchanged.
    pub fn to_density(&self) -> State {
        match &self.kind {
            StateKind::Pure(t) => {
                let rho =
                    t.clone().contract(t.dagger())
                    .expect("pure state tensors have disjoint ket/bra indices");
                Self {
                    qubits: self.qubits.clone(),
                    kind: StateKind::Density(rho),
                }
            },
            StateKind::Density(_) => self.clone(),
        }
    }

    /// The state's norm: the 2-norm of the amplitudes for pure states, the
    /// trace for density operators.
    pub fn norm(&self) -> f64 {
        match &self.kind {
            StateKind::Pure(t) => {
                let amps = t.to_vector(&self.qubits).unwrap();
                amps.iter().map(|a| a.norm_sqr()).sum::<f64>().sqrt()
            },
            StateKind::Density(t) => t.trace().unwrap().re,
        }
    }

    /// Probabilities of each computational basis outcome, indexed with the
    /// first qubit in canonical order as the most significant bit.
    pub fn probabilities(&self) -> Vec<f64> {
        match &self.kind {
            StateKind::Pure(t) => {
                let amps = t.to_vector(&self.qubits).unwrap();
                amps.iter().map(|a| a.norm_sqr()).collect()
            },
            StateKind::Density(t) => {
                let mat = t.to_matrix(&self.qubits).unwrap();
                mat.diag().iter().map(|p| p.re).collect()
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::c;

    #[test]
    fn zero_state() {
        let s = State::zero([0, 1]);
        let amps = s.amplitudes().unwrap();
        assert_eq!(amps.len(), 4);
        assert!((amps[0] - c!(1.0)).norm() < 1e-15);
        assert!((s.norm() - 1.0).abs() < 1e-15);
    }

    #[test]
    fn normalization_checked() {
        let bad = State::from_amplitudes(
            [0],
            vec![c!(1.0), c!(1.0)],
            1e-6,
        );
        assert!(matches!(bad, Err(StateError::NotNormalized(..))));
        use std::f64::consts::FRAC_1_SQRT_2 as RT2;
        let good = State::from_amplitudes(
            [0],
            vec![c!(RT2), c!(RT2)],
            1e-6,
        );
        assert!(good.is_ok());
    }

    #[test]
    fn promote_to_density() {
        use std::f64::consts::FRAC_1_SQRT_2 as RT2;
        let s = State::from_amplitudes(
            [0],
            vec![c!(RT2), c!(RT2)],
            1e-6,
        ).unwrap();
        let rho = s.to_density();
        assert!(rho.is_density());
        let mat = rho.density_matrix().unwrap();
        for entry in mat.iter() {
            assert!((entry - c!(0.5)).norm() < 1e-12);
        }
        assert!((rho.norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn density_constructor_checks() {
        let bad = nd::array![
            [c!(0.5), c!(0.5)],
            [c!(0.1), c!(0.5)],
        ];
        assert!(matches!(
            State::from_density_matrix([0], bad, 1e-6),
            Err(StateError::NotADensityOperator(_)),
        ));
    }

    #[test]
    fn basis_index_order() {
        // |01⟩ with qubit 0 as the most significant bit
        let s = State::basis([0, 1], 1).unwrap();
        let probs = s.probabilities();
        assert_eq!(probs.len(), 4);
        assert!((probs[1] - 1.0).abs() < 1e-15);
        assert!(State::basis([0, 1], 4).is_err());
    }
}
