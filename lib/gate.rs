//! Gate objects: named, parametrized unitaries and Kraus channels over
//! ordered qubit tuples.
//!
//! A [`Gate`] pairs an operator payload with the qubits it acts on. Standard
//! gates ([`StdGate`]) defer tensor construction so they can carry symbolic
//! parameters; explicit unitaries and Kraus channels are checked against
//! their defining invariants at construction (unitarity, or trace
//! preservation and complete positivity, to a stated tolerance).
//!
//! Composition, adjoint, and tensor product all produce new gates; gates are
//! immutable values and may be shared freely between circuits.

use std::f64::consts::{ FRAC_PI_2, FRAC_PI_4, FRAC_1_SQRT_2 };
use itertools::Itertools;
use ndarray::{ self as nd };
use num_complex::Complex64 as C64;
use rustc_hash::FxHashMap;
use thiserror::Error;
use crate::{
    c,
    linalg::{ self, CMat },
    param::{ Param, ParamError },
    qubit::Qubit,
    tensor::{ Tensor, TensorError },
};

#[derive(Debug, Error)]
pub enum GateError {
    #[error("cannot compose gates acting on different qubit sets")]
    IncompatibleQubits,

    #[error("cannot take the tensor product of gates with overlapping qubit sets")]
    OverlappingQubits,

    #[error("operator is not unitary to within tolerance {0:.1e}")]
    NotUnitary(f64),

    #[error("Kraus operators do not sum to the identity to within tolerance {0:.1e}")]
    NotCompletelyPositive(f64),

    #[error("duplicate qubit {0} in gate application")]
    DuplicateQubit(Qubit),

    #[error("gate '{name}' takes {expected} qubit(s), got {got}")]
    WrongArity { name: String, expected: usize, got: usize },

    #[error("gate '{0}' is a channel and has no single unitary tensor")]
    Channel(String),

    #[error("{0}")]
    UnboundParameter(#[from] ParamError),

    #[error("tensor error: {0}")]
    Tensor(#[from] TensorError),
}
pub type GateResult<T> = Result<T, GateError>;
use GateError::*;

/// A named standard gate, with parameters where applicable.
///
/// Rotation angles are in radians. Two-qubit interaction strengths follow
/// the canonical-gate convention: `Can(tx, ty, tz)` denotes
/// exp(−iπ/2·(tx·XX + ty·YY + tz·ZZ)), so `XX(1/2)` is a maximally
/// entangling π/4 interaction.
#[derive(Clone, Debug, PartialEq)]
pub enum StdGate {
    /// Identity.
    I,
    /// Global phase e^{iφ}, carried on one qubit.
    Ph(Param),
    /// Pauli X.
    X,
    /// Pauli Y.
    Y,
    /// Pauli Z.
    Z,
    /// Hadamard.
    H,
    /// Phase gate, √Z.
    S,
    /// Adjoint phase gate.
    SDag,
    /// π/8 gate, √S.
    T,
    /// Adjoint π/8 gate.
    TDag,
    /// √X.
    V,
    /// Adjoint √X.
    VDag,
    /// Rotation about *x*.
    Rx(Param),
    /// Rotation about *y*.
    Ry(Param),
    /// Rotation about *z*.
    Rz(Param),
    /// Phase shift diag(1, e^{iθ}).
    PhaseShift(Param),
    /// Pauli X on the second qubit, controlled by the first.
    CX,
    /// Pauli Y on the second qubit, controlled by the first.
    CY,
    /// Pauli Z on the second qubit, controlled by the first.
    CZ,
    /// Swap.
    Swap,
    /// Swap with i phases on the swapped branch.
    ISwap,
    /// XX interaction, `Can(t, 0, 0)`.
    XX(Param),
    /// YY interaction, `Can(0, t, 0)`.
    YY(Param),
    /// ZZ interaction, `Can(0, 0, t)`.
    ZZ(Param),
    /// Canonical two-qubit interaction exp(−iπ/2·(tx·XX + ty·YY + tz·ZZ)).
    Can(Param, Param, Param),
    /// Toffoli.
    CCX,
    /// Doubly-controlled Z.
    CCZ,
    /// Fredkin.
    CSwap,
}

impl StdGate {
    /// The gate's name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::I => "i",
            Self::Ph(_) => "ph",
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
            Self::H => "h",
            Self::S => "s",
            Self::SDag => "sdg",
            Self::T => "t",
            Self::TDag => "tdg",
            Self::V => "v",
            Self::VDag => "vdg",
            Self::Rx(_) => "rx",
            Self::Ry(_) => "ry",
            Self::Rz(_) => "rz",
            Self::PhaseShift(_) => "p",
            Self::CX => "cx",
            Self::CY => "cy",
            Self::CZ => "cz",
            Self::Swap => "swap",
            Self::ISwap => "iswap",
            Self::XX(_) => "xx",
            Self::YY(_) => "yy",
            Self::ZZ(_) => "zz",
            Self::Can(..) => "can",
            Self::CCX => "ccx",
            Self::CCZ => "ccz",
            Self::CSwap => "cswap",
        }
    }

    /// The number of qubits the gate acts on.
    pub fn arity(&self) -> usize {
        match self {
            Self::I | Self::Ph(_)
            | Self::X | Self::Y | Self::Z | Self::H
            | Self::S | Self::SDag | Self::T | Self::TDag
            | Self::V | Self::VDag
            | Self::Rx(_) | Self::Ry(_) | Self::Rz(_)
            | Self::PhaseShift(_) => 1,
            Self::CX | Self::CY | Self::CZ
            | Self::Swap | Self::ISwap
            | Self::XX(_) | Self::YY(_) | Self::ZZ(_)
            | Self::Can(..) => 2,
            Self::CCX | Self::CCZ | Self::CSwap => 3,
        }
    }

    /// The gate's parameters, in declaration order.
    pub fn params(&self) -> Vec<Param> {
        match self {
            Self::Ph(t) | Self::Rx(t) | Self::Ry(t) | Self::Rz(t)
            | Self::PhaseShift(t)
            | Self::XX(t) | Self::YY(t) | Self::ZZ(t) => vec![t.clone()],
            Self::Can(tx, ty, tz) =>
                vec![tx.clone(), ty.clone(), tz.clone()],
            _ => Vec::new(),
        }
    }

    /// The symbolic adjoint, preserving gate names where the adjoint has one.
    pub fn adjoint(&self) -> StdGate {
        match self {
            Self::I => Self::I,
            Self::Ph(t) => Self::Ph(t.neg()),
            Self::X => Self::X,
            Self::Y => Self::Y,
            Self::Z => Self::Z,
            Self::H => Self::H,
            Self::S => Self::SDag,
            Self::SDag => Self::S,
            Self::T => Self::TDag,
            Self::TDag => Self::T,
            Self::V => Self::VDag,
            Self::VDag => Self::V,
            Self::Rx(t) => Self::Rx(t.neg()),
            Self::Ry(t) => Self::Ry(t.neg()),
            Self::Rz(t) => Self::Rz(t.neg()),
            Self::PhaseShift(t) => Self::PhaseShift(t.neg()),
            Self::CX => Self::CX,
            Self::CY => Self::CY,
            Self::CZ => Self::CZ,
            Self::Swap => Self::Swap,
            // ISwap = Can(-1/2, -1/2, 0)
            Self::ISwap =>
                Self::Can(0.5.into(), 0.5.into(), 0.0.into()),
            Self::XX(t) => Self::XX(t.neg()),
            Self::YY(t) => Self::YY(t.neg()),
            Self::ZZ(t) => Self::ZZ(t.neg()),
            Self::Can(tx, ty, tz) =>
                Self::Can(tx.neg(), ty.neg(), tz.neg()),
            Self::CCX => Self::CCX,
            Self::CCZ => Self::CCZ,
            Self::CSwap => Self::CSwap,
        }
    }

    /// Substitute bound parameter variables.
    pub fn bind(&self, bindings: &FxHashMap<String, f64>) -> StdGate {
        match self {
            Self::Ph(t) => Self::Ph(t.bind(bindings)),
            Self::Rx(t) => Self::Rx(t.bind(bindings)),
            Self::Ry(t) => Self::Ry(t.bind(bindings)),
            Self::Rz(t) => Self::Rz(t.bind(bindings)),
            Self::PhaseShift(t) => Self::PhaseShift(t.bind(bindings)),
            Self::XX(t) => Self::XX(t.bind(bindings)),
            Self::YY(t) => Self::YY(t.bind(bindings)),
            Self::ZZ(t) => Self::ZZ(t.bind(bindings)),
            Self::Can(tx, ty, tz) =>
                Self::Can(
                    tx.bind(bindings),
                    ty.bind(bindings),
                    tz.bind(bindings),
                ),
            other => other.clone(),
        }
    }

    /// The gate's operator as a 2^k × 2^k matrix, with the first qubit of the
    /// tuple on the most significant axis.
    ///
    /// Fails if any parameter is still symbolic.
    pub fn matrix(&self) -> Result<CMat, ParamError> {
        match self {
            Self::I => Ok(CMat::eye(2)),
            Self::Ph(t) => {
                let ph = c!(e t.value()?);
                Ok(CMat::eye(2).mapv(|z| z * ph))
            },
            Self::X => Ok(nd::array![
                [c!(0.0), c!(1.0)],
                [c!(1.0), c!(0.0)],
            ]),
            Self::Y => Ok(nd::array![
                [c!(0.0), c!(i (-1.0))],
                [c!(i 1.0), c!(0.0)],
            ]),
            Self::Z => Ok(nd::array![
                [c!(1.0), c!(0.0)],
                [c!(0.0), c!(-1.0)],
            ]),
            Self::H => Ok(nd::array![
                [c!(FRAC_1_SQRT_2), c!(FRAC_1_SQRT_2)],
                [c!(FRAC_1_SQRT_2), c!(-FRAC_1_SQRT_2)],
            ]),
            Self::S => Ok(nd::array![
                [c!(1.0), c!(0.0)],
                [c!(0.0), c!(i 1.0)],
            ]),
            Self::SDag => Ok(nd::array![
                [c!(1.0), c!(0.0)],
                [c!(0.0), c!(i (-1.0))],
            ]),
            Self::T => Ok(nd::array![
                [c!(1.0), c!(0.0)],
                [c!(0.0), c!(e FRAC_PI_4)],
            ]),
            Self::TDag => Ok(nd::array![
                [c!(1.0), c!(0.0)],
                [c!(0.0), c!(e (-FRAC_PI_4))],
            ]),
            Self::V => Ok(nd::array![
                [c!(0.5 + 0.5 i), c!(0.5 - 0.5 i)],
                [c!(0.5 - 0.5 i), c!(0.5 + 0.5 i)],
            ]),
            Self::VDag => Ok(nd::array![
                [c!(0.5 - 0.5 i), c!(0.5 + 0.5 i)],
                [c!(0.5 + 0.5 i), c!(0.5 - 0.5 i)],
            ]),
            Self::Rx(t) => {
                let th = t.value()? / 2.0;
                Ok(nd::array![
                    [c!(th.cos()), c!(i (-th.sin()))],
                    [c!(i (-th.sin())), c!(th.cos())],
                ])
            },
            Self::Ry(t) => {
                let th = t.value()? / 2.0;
                Ok(nd::array![
                    [c!(th.cos()), c!(-th.sin())],
                    [c!(th.sin()), c!(th.cos())],
                ])
            },
            Self::Rz(t) => {
                let th = t.value()? / 2.0;
                Ok(nd::array![
                    [c!(e (-th)), c!(0.0)],
                    [c!(0.0), c!(e th)],
                ])
            },
            Self::PhaseShift(t) => {
                let th = t.value()?;
                Ok(nd::array![
                    [c!(1.0), c!(0.0)],
                    [c!(0.0), c!(e th)],
                ])
            },
            Self::CX => {
                let mut m = CMat::eye(4);
                m[[2, 2]] = c!(0.0);
                m[[3, 3]] = c!(0.0);
                m[[2, 3]] = c!(1.0);
                m[[3, 2]] = c!(1.0);
                Ok(m)
            },
            Self::CY => {
                let mut m = CMat::eye(4);
                m[[2, 2]] = c!(0.0);
                m[[3, 3]] = c!(0.0);
                m[[2, 3]] = c!(i (-1.0));
                m[[3, 2]] = c!(i 1.0);
                Ok(m)
            },
            Self::CZ => {
                let mut m = CMat::eye(4);
                m[[3, 3]] = c!(-1.0);
                Ok(m)
            },
            Self::Swap => {
                let mut m = CMat::zeros((4, 4));
                m[[0, 0]] = c!(1.0);
                m[[1, 2]] = c!(1.0);
                m[[2, 1]] = c!(1.0);
                m[[3, 3]] = c!(1.0);
                Ok(m)
            },
            Self::ISwap => {
                let mut m = CMat::zeros((4, 4));
                m[[0, 0]] = c!(1.0);
                m[[1, 2]] = c!(i 1.0);
                m[[2, 1]] = c!(i 1.0);
                m[[3, 3]] = c!(1.0);
                Ok(m)
            },
            Self::XX(t) => Ok(can_matrix(t.value()?, 0.0, 0.0)),
            Self::YY(t) => Ok(can_matrix(0.0, t.value()?, 0.0)),
            Self::ZZ(t) => Ok(can_matrix(0.0, 0.0, t.value()?)),
            Self::Can(tx, ty, tz) =>
                Ok(can_matrix(tx.value()?, ty.value()?, tz.value()?)),
            Self::CCX => {
                let mut m = CMat::eye(8);
                m[[6, 6]] = c!(0.0);
                m[[7, 7]] = c!(0.0);
                m[[6, 7]] = c!(1.0);
                m[[7, 6]] = c!(1.0);
                Ok(m)
            },
            Self::CCZ => {
                let mut m = CMat::eye(8);
                m[[7, 7]] = c!(-1.0);
                Ok(m)
            },
            Self::CSwap => {
                let mut m = CMat::eye(8);
                m[[5, 5]] = c!(0.0);
                m[[6, 6]] = c!(0.0);
                m[[5, 6]] = c!(1.0);
                m[[6, 5]] = c!(1.0);
                Ok(m)
            },
        }
    }
}

/// The matrix of exp(−iπ/2·(tx·XX + ty·YY + tz·ZZ)).
///
/// The exponent is block-diagonal over the {∣00⟩, ∣11⟩} and {∣01⟩, ∣10⟩}
/// subspaces, so the exponential has a closed form in each block.
pub fn can_matrix(tx: f64, ty: f64, tz: f64) -> CMat {
    let mut m = CMat::zeros((4, 4));
    // {|00⟩, |11⟩}: tz·I + (tx − ty)·X
    let ph = c!(e (-FRAC_PI_2 * tz));
    let d = FRAC_PI_2 * (tx - ty);
    m[[0, 0]] = ph * d.cos();
    m[[3, 3]] = ph * d.cos();
    m[[0, 3]] = ph * c!(i (-d.sin()));
    m[[3, 0]] = ph * c!(i (-d.sin()));
    // {|01⟩, |10⟩}: −tz·I + (tx + ty)·X
    let ph = c!(e (FRAC_PI_2 * tz));
    let d = FRAC_PI_2 * (tx + ty);
    m[[1, 1]] = ph * d.cos();
    m[[2, 2]] = ph * d.cos();
    m[[1, 2]] = ph * c!(i (-d.sin()));
    m[[2, 1]] = ph * c!(i (-d.sin()));
    m
}

#[derive(Clone, Debug, PartialEq)]
enum GateKind {
    Std(StdGate),
    Unitary { name: String, tensor: Tensor },
    Kraus { name: String, ops: Vec<Tensor> },
}

/// A gate application: an operator bound to an ordered tuple of distinct
/// qubits.
#[derive(Clone, Debug, PartialEq)]
pub struct Gate {
    kind: GateKind,
    qubits: Vec<Qubit>,
}

fn check_distinct(qubits: &[Qubit]) -> GateResult<()> {
    for (k, q) in qubits.iter().enumerate() {
        if qubits.iter().skip(k + 1).any(|q2| q2 == q) {
            return Err(DuplicateQubit(q.clone()));
        }
    }
    Ok(())
}

impl Gate {
    /// Apply a standard gate to an ordered qubit tuple.
    pub fn std<I, Q>(gate: StdGate, qubits: I) -> GateResult<Self>
    where
        I: IntoIterator<Item = Q>,
        Q: Into<Qubit>,
    {
        let qubits: Vec<Qubit> =
            qubits.into_iter().map(|q| q.into()).collect();
        if qubits.len() != gate.arity() {
            return Err(WrongArity {
                name: gate.name().to_string(),
                expected: gate.arity(),
                got: qubits.len(),
            });
        }
        check_distinct(&qubits)?;
        Ok(Self { kind: GateKind::Std(gate), qubits })
    }

    /// Apply an explicit unitary matrix to an ordered qubit tuple.
    ///
    /// The matrix must be 2^k × 2^k for k qubits (first qubit on the most
    /// significant axis) and unitary to within `tol`.
    pub fn unitary<S, I, Q>(
        name: S,
        qubits: I,
        matrix: CMat,
        tol: f64,
    ) -> GateResult<Self>
    where
        S: Into<String>,
        I: IntoIterator<Item = Q>,
        Q: Into<Qubit>,
    {
        let name = name.into();
        let qubits: Vec<Qubit> =
            qubits.into_iter().map(|q| q.into()).collect();
        check_distinct(&qubits)?;
        if !linalg::is_unitary(&matrix, tol) {
            return Err(NotUnitary(tol));
        }
        let tensor = Tensor::from_matrix(&qubits, matrix)?;
        Ok(Self { kind: GateKind::Unitary { name, tensor }, qubits })
    }

    // trusted constructor for products of already-verified unitaries
    pub(crate) fn unitary_unchecked(
        name: String,
        qubits: Vec<Qubit>,
        tensor: Tensor,
    ) -> Self {
        Self { kind: GateKind::Unitary { name, tensor }, qubits }
    }

    /// Apply a Kraus channel to an ordered qubit tuple.
    ///
    /// The operators must satisfy ΣK†K = I to within `tol` (trace
    /// preservation; complete positivity is automatic in Kraus form).
    pub fn kraus<S, I, Q>(
        name: S,
        qubits: I,
        ops: Vec<CMat>,
        tol: f64,
    ) -> GateResult<Self>
    where
        S: Into<String>,
        I: IntoIterator<Item = Q>,
        Q: Into<Qubit>,
    {
        let name = name.into();
        let qubits: Vec<Qubit> =
            qubits.into_iter().map(|q| q.into()).collect();
        check_distinct(&qubits)?;
        let dim = 1_usize << qubits.len();
        let mut acc: CMat = CMat::zeros((dim, dim));
        for op in ops.iter() {
            acc = acc + linalg::dagger(op).dot(op);
        }
        let eye: CMat = CMat::eye(dim);
        if linalg::max_diff(&acc, &eye) > tol {
            return Err(NotCompletelyPositive(tol));
        }
        let ops =
            ops.into_iter()
            .map(|op| Tensor::from_matrix(&qubits, op))
            .collect::<Result<Vec<Tensor>, TensorError>>()?;
        Ok(Self { kind: GateKind::Kraus { name, ops }, qubits })
    }

    /// The gate's name.
    pub fn name(&self) -> &str {
        match &self.kind {
            GateKind::Std(g) => g.name(),
            GateKind::Unitary { name, .. } => name,
            GateKind::Kraus { name, .. } => name,
        }
    }

    /// The ordered qubit tuple the gate acts on.
    pub fn qubits(&self) -> &[Qubit] { &self.qubits }

    /// The number of qubits the gate acts on.
    pub fn arity(&self) -> usize { self.qubits.len() }

    /// The gate's parameters (empty for explicit unitaries and channels).
    pub fn params(&self) -> Vec<Param> {
        match &self.kind {
            GateKind::Std(g) => g.params(),
            _ => Vec::new(),
        }
    }

    /// Names of all unbound symbolic parameter variables.
    pub fn free_vars(&self) -> Vec<String> {
        self.params().iter()
            .flat_map(|p| p.free_vars())
            .unique()
            .collect()
    }

    /// Return the standard-gate payload, if the gate has one.
    pub fn as_std(&self) -> Option<&StdGate> {
        match &self.kind {
            GateKind::Std(g) => Some(g),
            _ => None,
        }
    }

    /// Return `true` if the gate is a Kraus channel rather than a unitary.
    pub fn is_channel(&self) -> bool {
        matches!(self.kind, GateKind::Kraus { .. })
    }

    /// The gate's unitary action as a qubit-indexed tensor.
    ///
    /// Fails for channels and for unbound symbolic parameters.
    pub fn tensor(&self) -> GateResult<Tensor> {
        match &self.kind {
            GateKind::Std(g) => {
                let mat = g.matrix()?;
                Ok(Tensor::from_matrix(&self.qubits, mat)?)
            },
            GateKind::Unitary { tensor, .. } => Ok(tensor.clone()),
            GateKind::Kraus { name, .. } => Err(Channel(name.clone())),
        }
    }

    /// The gate's action as Kraus operator tensors; a single element for
    /// unitary gates.
    pub fn kraus_tensors(&self) -> GateResult<Vec<Tensor>> {
        match &self.kind {
            GateKind::Kraus { ops, .. } => Ok(ops.clone()),
            _ => Ok(vec![self.tensor()?]),
        }
    }

    /// The gate's operator as a 2^k × 2^k matrix in qubit tuple order.
    pub fn matrix(&self) -> GateResult<CMat> {
        match &self.kind {
            GateKind::Std(g) => Ok(g.matrix()?),
            GateKind::Unitary { tensor, .. } =>
                Ok(tensor.to_matrix(&self.qubits)?),
            GateKind::Kraus { name, .. } => Err(Channel(name.clone())),
        }
    }

    /// The conjugate transpose of `self`; involutive for standard and
    /// explicit unitaries.
    ///
    /// For channels this produces the dual map by daggering every Kraus
    /// operator; the dual of a channel is not in general a channel itself.
    pub fn adjoint(&self) -> Self {
        match &self.kind {
            GateKind::Std(g) => Self {
                kind: GateKind::Std(g.adjoint()),
                qubits: self.qubits.clone(),
            },
            GateKind::Unitary { name, tensor } => Self {
                kind: GateKind::Unitary {
                    name: format!("{name}†"),
                    tensor: tensor.dagger(),
                },
                qubits: self.qubits.clone(),
            },
            GateKind::Kraus { name, ops } => Self {
                kind: GateKind::Kraus {
                    name: format!("{name}†"),
                    ops: ops.iter().map(|op| op.dagger()).collect(),
                },
                qubits: self.qubits.clone(),
            },
        }
    }

    /// Compose chronologically: the returned gate applies `self` first, then
    /// `other`.
    ///
    /// Both gates must be unitary and act on the same qubit set (in any
    /// order; axes are aligned automatically).
    pub fn then(&self, other: &Self) -> GateResult<Self> {
        let mut qs_l: Vec<&Qubit> = self.qubits.iter().collect();
        let mut qs_r: Vec<&Qubit> = other.qubits.iter().collect();
        qs_l.sort();
        qs_r.sort();
        if qs_l != qs_r { return Err(IncompatibleQubits); }
        let prod = other.tensor()?.contract(self.tensor()?)?;
        Ok(Self::unitary_unchecked(
            format!("{}·{}", other.name(), self.name()),
            self.qubits.clone(),
            prod,
        ))
    }

    /// Tensor product of two gates on disjoint qubit sets.
    pub fn tensor_product(&self, other: &Self) -> GateResult<Self> {
        if self.qubits.iter().any(|q| other.qubits.contains(q)) {
            return Err(OverlappingQubits);
        }
        let prod = self.tensor()?.contract(other.tensor()?)?;
        let qubits: Vec<Qubit> =
            self.qubits.iter().chain(other.qubits.iter()).cloned().collect();
        Ok(Self::unitary_unchecked(
            format!("{}⊗{}", self.name(), other.name()),
            qubits,
            prod,
        ))
    }

    /// Return `true` if `self` and `other` denote the same operator on the
    /// same qubit set, to within `thresh` after axis alignment.
    ///
    /// Global phase is *not* ignored; see
    /// [`is_close_up_to_phase`][Self::is_close_up_to_phase].
    pub fn is_close(&self, other: &Self, thresh: f64) -> GateResult<bool> {
        let mut qs_l: Vec<&Qubit> = self.qubits.iter().collect();
        let mut qs_r: Vec<&Qubit> = other.qubits.iter().collect();
        qs_l.sort();
        qs_r.sort();
        if qs_l != qs_r { return Ok(false); }
        Ok(self.tensor()?.approx_eq(&other.tensor()?, thresh))
    }

    /// Like [`is_close`][Self::is_close], but mods out a global phase, which
    /// is physically unobservable but numerically distinguishable.
    pub fn is_close_up_to_phase(&self, other: &Self, thresh: f64)
        -> GateResult<bool>
    {
        let mut qs_l: Vec<&Qubit> = self.qubits.iter().collect();
        let mut qs_r: Vec<&Qubit> = other.qubits.iter().collect();
        qs_l.sort();
        qs_r.sort();
        if qs_l != qs_r { return Ok(false); }
        Ok(self.tensor()?.approx_eq_phase(&other.tensor()?, thresh))
    }

    /// Substitute bound parameter variables, collapsing parameters to
    /// concrete values where possible.
    pub fn substitute(&self, bindings: &FxHashMap<String, f64>) -> Self {
        match &self.kind {
            GateKind::Std(g) => Self {
                kind: GateKind::Std(g.bind(bindings)),
                qubits: self.qubits.clone(),
            },
            _ => self.clone(),
        }
    }

    /// Replace every qubit label through `map`, failing if the images
    /// collide.
    pub fn relabel_with<F>(&self, mut map: F) -> GateResult<Self>
    where F: FnMut(&Qubit) -> Qubit
    {
        let qubits: Vec<Qubit> = self.qubits.iter().map(&mut map).collect();
        check_distinct(&qubits)?;
        let kind =
            match &self.kind {
                GateKind::Std(g) => GateKind::Std(g.clone()),
                GateKind::Unitary { name, tensor } => GateKind::Unitary {
                    name: name.clone(),
                    tensor: tensor.relabel(&mut map),
                },
                GateKind::Kraus { name, ops } => GateKind::Kraus {
                    name: name.clone(),
                    ops: ops.iter().map(|op| op.relabel(&mut map)).collect(),
                },
            };
        Ok(Self { kind, qubits })
    }

    // 1q constructors; these cannot fail

    /// Identity on one qubit.
    pub fn i<Q: Into<Qubit>>(q: Q) -> Self {
        Self::std(StdGate::I, [q]).unwrap()
    }

    /// Global phase e^{iφ}, carried on one qubit.
    pub fn ph<P: Into<Param>, Q: Into<Qubit>>(phi: P, q: Q) -> Self {
        Self::std(StdGate::Ph(phi.into()), [q]).unwrap()
    }

    /// Pauli X.
    pub fn x<Q: Into<Qubit>>(q: Q) -> Self {
        Self::std(StdGate::X, [q]).unwrap()
    }

    /// Pauli Y.
    pub fn y<Q: Into<Qubit>>(q: Q) -> Self {
        Self::std(StdGate::Y, [q]).unwrap()
    }

    /// Pauli Z.
    pub fn z<Q: Into<Qubit>>(q: Q) -> Self {
        Self::std(StdGate::Z, [q]).unwrap()
    }

    /// Hadamard.
    pub fn h<Q: Into<Qubit>>(q: Q) -> Self {
        Self::std(StdGate::H, [q]).unwrap()
    }

    /// Phase gate.
    pub fn s<Q: Into<Qubit>>(q: Q) -> Self {
        Self::std(StdGate::S, [q]).unwrap()
    }

    /// Adjoint phase gate.
    pub fn sdg<Q: Into<Qubit>>(q: Q) -> Self {
        Self::std(StdGate::SDag, [q]).unwrap()
    }

    /// π/8 gate.
    pub fn t<Q: Into<Qubit>>(q: Q) -> Self {
        Self::std(StdGate::T, [q]).unwrap()
    }

    /// Adjoint π/8 gate.
    pub fn tdg<Q: Into<Qubit>>(q: Q) -> Self {
        Self::std(StdGate::TDag, [q]).unwrap()
    }

    /// √X.
    pub fn v<Q: Into<Qubit>>(q: Q) -> Self {
        Self::std(StdGate::V, [q]).unwrap()
    }

    /// Adjoint √X.
    pub fn vdg<Q: Into<Qubit>>(q: Q) -> Self {
        Self::std(StdGate::VDag, [q]).unwrap()
    }

    /// Rotation about *x*.
    pub fn rx<P: Into<Param>, Q: Into<Qubit>>(theta: P, q: Q) -> Self {
        Self::std(StdGate::Rx(theta.into()), [q]).unwrap()
    }

    /// Rotation about *y*.
    pub fn ry<P: Into<Param>, Q: Into<Qubit>>(theta: P, q: Q) -> Self {
        Self::std(StdGate::Ry(theta.into()), [q]).unwrap()
    }

    /// Rotation about *z*.
    pub fn rz<P: Into<Param>, Q: Into<Qubit>>(theta: P, q: Q) -> Self {
        Self::std(StdGate::Rz(theta.into()), [q]).unwrap()
    }

    /// Phase shift diag(1, e^{iθ}).
    pub fn phase<P: Into<Param>, Q: Into<Qubit>>(theta: P, q: Q) -> Self {
        Self::std(StdGate::PhaseShift(theta.into()), [q]).unwrap()
    }

    // 2q and 3q constructors; these fail on duplicate qubits

    /// Controlled-X with control `c` and target `t`.
    pub fn cx<Q0, Q1>(c: Q0, t: Q1) -> GateResult<Self>
    where Q0: Into<Qubit>, Q1: Into<Qubit>
    {
        Self::std(StdGate::CX, [c.into(), t.into()])
    }

    /// Controlled-Y with control `c` and target `t`.
    pub fn cy<Q0, Q1>(c: Q0, t: Q1) -> GateResult<Self>
    where Q0: Into<Qubit>, Q1: Into<Qubit>
    {
        Self::std(StdGate::CY, [c.into(), t.into()])
    }

    /// Controlled-Z.
    pub fn cz<Q0, Q1>(a: Q0, b: Q1) -> GateResult<Self>
    where Q0: Into<Qubit>, Q1: Into<Qubit>
    {
        Self::std(StdGate::CZ, [a.into(), b.into()])
    }

    /// Swap.
    pub fn swap<Q0, Q1>(a: Q0, b: Q1) -> GateResult<Self>
    where Q0: Into<Qubit>, Q1: Into<Qubit>
    {
        Self::std(StdGate::Swap, [a.into(), b.into()])
    }

    /// ISwap.
    pub fn iswap<Q0, Q1>(a: Q0, b: Q1) -> GateResult<Self>
    where Q0: Into<Qubit>, Q1: Into<Qubit>
    {
        Self::std(StdGate::ISwap, [a.into(), b.into()])
    }

    /// XX interaction of strength `t`.
    pub fn xx<P, Q0, Q1>(t: P, a: Q0, b: Q1) -> GateResult<Self>
    where P: Into<Param>, Q0: Into<Qubit>, Q1: Into<Qubit>
    {
        Self::std(StdGate::XX(t.into()), [a.into(), b.into()])
    }

    /// YY interaction of strength `t`.
    pub fn yy<P, Q0, Q1>(t: P, a: Q0, b: Q1) -> GateResult<Self>
    where P: Into<Param>, Q0: Into<Qubit>, Q1: Into<Qubit>
    {
        Self::std(StdGate::YY(t.into()), [a.into(), b.into()])
    }

    /// ZZ interaction of strength `t`.
    pub fn zz<P, Q0, Q1>(t: P, a: Q0, b: Q1) -> GateResult<Self>
    where P: Into<Param>, Q0: Into<Qubit>, Q1: Into<Qubit>
    {
        Self::std(StdGate::ZZ(t.into()), [a.into(), b.into()])
    }

    /// Canonical two-qubit interaction.
    pub fn can<P0, P1, P2, Q0, Q1>(
        tx: P0,
        ty: P1,
        tz: P2,
        a: Q0,
        b: Q1,
    ) -> GateResult<Self>
    where
        P0: Into<Param>, P1: Into<Param>, P2: Into<Param>,
        Q0: Into<Qubit>, Q1: Into<Qubit>,
    {
        Self::std(
            StdGate::Can(tx.into(), ty.into(), tz.into()),
            [a.into(), b.into()],
        )
    }

    /// Toffoli with controls `c0`, `c1` and target `t`.
    pub fn ccx<Q0, Q1, Q2>(c0: Q0, c1: Q1, t: Q2) -> GateResult<Self>
    where Q0: Into<Qubit>, Q1: Into<Qubit>, Q2: Into<Qubit>
    {
        Self::std(StdGate::CCX, [c0.into(), c1.into(), t.into()])
    }

    /// Doubly-controlled Z.
    pub fn ccz<Q0, Q1, Q2>(a: Q0, b: Q1, c: Q2) -> GateResult<Self>
    where Q0: Into<Qubit>, Q1: Into<Qubit>, Q2: Into<Qubit>
    {
        Self::std(StdGate::CCZ, [a.into(), b.into(), c.into()])
    }

    /// Fredkin with control `c`.
    pub fn cswap<Q0, Q1, Q2>(c: Q0, a: Q1, b: Q2) -> GateResult<Self>
    where Q0: Into<Qubit>, Q1: Into<Qubit>, Q2: Into<Qubit>
    {
        Self::std(StdGate::CSwap, [c.into(), a.into(), b.into()])
    }
}

impl std::fmt::Display for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())?;
        let params = self.params();
        if !params.is_empty() {
            write!(f, "(")?;
            for (k, p) in params.iter().enumerate() {
                if k > 0 { write!(f, ", ")?; }
                write!(f, "{p}")?;
            }
            write!(f, ")")?;
        }
        for q in self.qubits.iter() {
            write!(f, " {q}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::qubit::Qubit;

    const EPS: f64 = 1e-12;

    #[test]
    fn compose_with_adjoint_is_identity() {
        let gates = [
            Gate::h(0),
            Gate::s(0),
            Gate::t(0),
            Gate::v(0),
            Gate::rx(0.7, 0),
            Gate::ry(-1.2, 0),
            Gate::phase(2.1, 0),
        ];
        let id = Gate::i(0);
        for g in gates {
            let prod = g.then(&g.adjoint()).unwrap();
            assert!(
                prod.is_close(&id, EPS).unwrap(),
                "{} · {}† should be the identity", g, g,
            );
        }
        let cx = Gate::cx(0, 1).unwrap();
        let prod = cx.then(&cx.adjoint()).unwrap();
        let id2 = Gate::unitary("id2", [0, 1], CMat::eye(4), EPS).unwrap();
        assert!(prod.is_close(&id2, EPS).unwrap());
    }

    #[test]
    fn adjoint_involutive() {
        let g = Gate::rz(0.4, 2);
        assert_eq!(g.adjoint().adjoint(), g);
        let s = Gate::s(1);
        assert_eq!(s.adjoint().adjoint(), s);
    }

    #[test]
    fn iswap_adjoint_matches_matrix() {
        let isw = Gate::iswap(0, 1).unwrap();
        let adj = isw.adjoint();
        let m = isw.matrix().unwrap();
        let expected = linalg::dagger(&m);
        assert!(linalg::max_diff(&adj.matrix().unwrap(), &expected) < EPS);
    }

    #[test]
    fn compose_requires_equal_qubit_sets() {
        let h0 = Gate::h(0);
        let h1 = Gate::h(1);
        assert!(matches!(h0.then(&h1), Err(GateError::IncompatibleQubits)));
    }

    #[test]
    fn compose_aligns_axes() {
        // cx(0,1) then cx(1,0), expressed with swapped tuple orders
        let a = Gate::cx(0, 1).unwrap();
        let b = Gate::cx(1, 0).unwrap();
        let prod = a.then(&b).unwrap();
        let m = prod.tensor().unwrap()
            .to_matrix(&[Qubit::Int(0), Qubit::Int(1)]).unwrap();
        // cx(1,0)·cx(0,1) maps |10⟩ → |11⟩ → ... check one column:
        // |10⟩ --cx(0,1)--> |11⟩ --cx(1,0)--> |01⟩
        assert!((m[[1, 2]] - c!(1.0)).norm() < EPS);
    }

    #[test]
    fn tensor_product_disjointness() {
        let h0 = Gate::h(0);
        let h0b = Gate::h(0);
        assert!(matches!(
            h0.tensor_product(&h0b),
            Err(GateError::OverlappingQubits),
        ));
        let x1 = Gate::x(1);
        let prod = h0.tensor_product(&x1).unwrap();
        assert_eq!(prod.arity(), 2);
    }

    #[test]
    fn non_unitary_rejected() {
        let m = nd::array![
            [c!(1.0), c!(1.0)],
            [c!(0.0), c!(1.0)],
        ];
        assert!(matches!(
            Gate::unitary("bad", [0], m, 1e-6),
            Err(GateError::NotUnitary(_)),
        ));
    }

    #[test]
    fn kraus_checked() {
        // amplitude damping with γ = 0.3
        let gamma: f64 = 0.3;
        let k0 = nd::array![
            [c!(1.0), c!(0.0)],
            [c!(0.0), c!((1.0 - gamma).sqrt())],
        ];
        let k1 = nd::array![
            [c!(0.0), c!(gamma.sqrt())],
            [c!(0.0), c!(0.0)],
        ];
        let chan =
            Gate::kraus("amp_damp", [0], vec![k0.clone(), k1], 1e-9).unwrap();
        assert!(chan.is_channel());
        // dropping one operator breaks trace preservation
        assert!(matches!(
            Gate::kraus("broken", [0], vec![k0], 1e-9),
            Err(GateError::NotCompletelyPositive(_)),
        ));
    }

    #[test]
    fn symbolic_tensor_defers() {
        let g = Gate::rx("theta", 0);
        assert!(matches!(
            g.tensor(),
            Err(GateError::UnboundParameter(_)),
        ));
        let bindings: FxHashMap<String, f64> =
            [("theta".to_string(), 0.5)].into_iter().collect();
        let g = g.substitute(&bindings);
        assert!(g.tensor().is_ok());
        assert!(g.is_close(&Gate::rx(0.5, 0), EPS).unwrap());
    }

    #[test]
    fn phase_equivalence_is_opt_in() {
        let z = Gate::z(0);
        let zp = Gate::unitary(
            "zph",
            [0],
            StdGate::Z.matrix().unwrap().mapv(|v| v * c!(e 1.1)),
            1e-9,
        ).unwrap();
        assert!(!z.is_close(&zp, 1e-6).unwrap());
        assert!(z.is_close_up_to_phase(&zp, 1e-6).unwrap());
    }

    #[test]
    fn can_gate_special_points() {
        // Can(1/2, 0, 0) is exp(−iπ/4 XX)
        let m = can_matrix(0.5, 0.0, 0.0);
        let rt2 = FRAC_1_SQRT_2;
        assert!((m[[0, 0]] - c!(rt2)).norm() < EPS);
        assert!((m[[0, 3]] - c!(i (-rt2))).norm() < EPS);
        // iswap agrees with Can(-1/2, -1/2, 0)
        let can = can_matrix(-0.5, -0.5, 0.0);
        let isw = StdGate::ISwap.matrix().unwrap();
        assert!(linalg::max_diff(&can, &isw) < EPS);
    }
}
