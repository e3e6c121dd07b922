//! Rewriting of gates and circuits into hardware-native gate sets.
//!
//! The engine canonicalizes arbitrary unitaries into sequences drawn from a
//! [`GateSet`] (a two-qubit entangling primitive plus arbitrary single-qubit
//! rotations): single-qubit gates via the closed-form ZYZ Euler
//! decomposition, two-qubit gates via the canonical (Weyl-chamber)
//! decomposition with a class-minimal number of entangler applications, and
//! larger unitaries via the cosine-sine recursion down to the two-qubit
//! case.
//!
//! Decomposition never mutates its input; it returns a new, semantically
//! equivalent circuit, verified against the original operator to a stated
//! tolerance.

use num_complex::Complex64 as C64;
use thiserror::Error;
use crate::{
    circuit::{ Circuit, CircuitError },
    gate::{ Gate, GateError, StdGate },
    linalg::{ CMat, LinalgError },
    qubit::Qubit,
};

pub(crate) mod one_qubit;
pub use one_qubit::{ Euler, zyz, euler_gates };

pub(crate) mod two_qubit;
pub use two_qubit::canonical_coords;

pub(crate) mod multi_qubit;

#[derive(Debug, Error)]
pub enum DecomposeError {
    #[error("no decomposition rule covers the target gate set: {0}")]
    UnsupportedGateSet(String),

    #[error("decomposition did not reach the requested tolerance: {0}")]
    NumericalInstability(String),

    #[error("operator acts on {0} qubit(s), above the gate set's ceiling of {1}")]
    TooManyQubits(usize, usize),

    #[error("gate error: {0}")]
    Gate(#[from] GateError),

    #[error("circuit error: {0}")]
    Circuit(#[from] CircuitError),
}
pub type DecomposeResult<T> = Result<T, DecomposeError>;
use DecomposeError::*;

impl From<LinalgError> for DecomposeError {
    fn from(err: LinalgError) -> Self {
        NumericalInstability(err.to_string())
    }
}

/// The two-qubit entangling primitive of a target gate set.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Entangler {
    /// Controlled-X.
    Cx,
    /// Controlled-Z.
    Cz,
}

/// A named, closed target gate set: one entangling primitive plus arbitrary
/// single-qubit rotations, with a cost model used to select among
/// equivalent decompositions.
#[derive(Clone, Debug, PartialEq)]
pub struct GateSet {
    /// Display name.
    pub name: String,
    /// The entangling primitive.
    pub entangler: Entangler,
    /// Verification tolerance: synthesized circuits must reproduce the
    /// input operator to within this bound (largest elementwise deviation).
    pub tolerance: f64,
    /// Operational ceiling on operator size; the multi-qubit recursion
    /// refuses larger inputs. This bounds cost, not correctness.
    pub max_qubits: usize,
    /// Cost of one entangling gate, relative to a single-qubit rotation at
    /// cost 1.
    pub entangler_cost: f64,
}

impl GateSet {
    /// Arbitrary single-qubit rotations plus controlled-X.
    pub fn cx() -> Self {
        Self {
            name: "rotations+cx".to_string(),
            entangler: Entangler::Cx,
            tolerance: 1e-6,
            max_qubits: 10,
            entangler_cost: 10.0,
        }
    }

    /// Arbitrary single-qubit rotations plus controlled-Z.
    pub fn cz() -> Self {
        Self {
            name: "rotations+cz".to_string(),
            entangler: Entangler::Cz,
            ..Self::cx()
        }
    }

    /// Return `true` if `gate` is the gate set's entangling primitive.
    pub fn is_entangler(&self, gate: &Gate) -> bool {
        matches!(
            (gate.as_std(), self.entangler),
            (Some(StdGate::CX), Entangler::Cx)
            | (Some(StdGate::CZ), Entangler::Cz),
        )
    }

    /// The cost of a circuit under this gate set's model: entangling gates
    /// at [`entangler_cost`][Self::entangler_cost], everything else at 1.
    pub fn cost(&self, circuit: &Circuit) -> f64 {
        circuit.gates().iter()
            .map(|g| {
                if self.is_entangler(g) { self.entangler_cost } else { 1.0 }
            })
            .sum()
    }

    /// The number of entangling-primitive applications in a circuit.
    pub fn entangler_count(&self, circuit: &Circuit) -> usize {
        circuit.gates().iter()
            .filter(|g| self.is_entangler(g))
            .count()
    }
}

// rotations below this magnitude are dropped during synthesis; far below
// any verification tolerance so elision never accumulates into a failure
pub(crate) const ELIDE: f64 = 1e-10;

/// Rewrite a single gate into an equivalent circuit over the target gate
/// set.
///
/// The input gate is unchanged; the result is a new circuit whose action
/// matches the gate to within the gate set's tolerance. Gates with unbound
/// symbolic parameters must be substituted first.
pub fn decompose_gate(gate: &Gate, target: &GateSet)
    -> DecomposeResult<Circuit>
{
    if gate.is_channel() {
        return Err(UnsupportedGateSet(format!(
            "channel '{}' cannot be rewritten over a unitary gate set",
            gate.name(),
        )));
    }
    let mat = gate.matrix()?;
    match gate.qubits() {
        [q] => {
            let mut circ = Circuit::new([q.clone()]);
            circ.extend(one_qubit::euler_gates(&mat, q, ELIDE))?;
            Ok(circ)
        },
        [q0, q1] => two_qubit::synthesize(&mat, q0, q1, target),
        qubits => {
            if qubits.len() > target.max_qubits {
                return Err(TooManyQubits(qubits.len(), target.max_qubits));
            }
            let circ = multi_qubit::shannon(&mat, qubits, target)?;
            compact_single_qubit_runs(&circ)
        },
    }
}

/// Rewrite every gate of a circuit into the target gate set.
///
/// Gates already in the target basis (any single-qubit unitary, or the
/// entangling primitive itself) are kept; everything else is decomposed
/// in place and adjacent single-qubit runs are re-fused afterwards.
/// Kraus channels pass through untouched: they carry no unitary to rewrite.
pub fn decompose_circuit(circuit: &Circuit, target: &GateSet)
    -> DecomposeResult<Circuit>
{
    let mut out = Circuit::new(circuit.qubits().iter().cloned());
    for gate in circuit.gates() {
        if gate.is_channel()
            || gate.arity() == 1
            || target.is_entangler(gate)
        {
            out.append(gate.clone())?;
        } else {
            for g in decompose_gate(gate, target)?.gates() {
                out.append(g.clone())?;
            }
        }
    }
    compact_single_qubit_runs(&out)
}

/// Fuse maximal runs of adjacent single-qubit gates on each wire back into
/// at most three rotations, accumulating global phase into one trailing
/// `Ph` gate.
pub fn compact_single_qubit_runs(circuit: &Circuit)
    -> DecomposeResult<Circuit>
{
    let qubits: Vec<Qubit> = circuit.qubits().to_vec();
    let mut pending: Vec<Option<CMat>> = vec![None; qubits.len()];
    let mut phase = C64::from(1.0);
    let mut out = Circuit::new(qubits.iter().cloned());
    let pos = |q: &Qubit| qubits.iter().position(|qk| qk == q).unwrap();

    let flush =
        |out: &mut Circuit,
         pending: &mut Vec<Option<CMat>>,
         phase: &mut C64,
         k: usize|
         -> DecomposeResult<()>
    {
        if let Some(acc) = pending[k].take() {
            let angles = one_qubit::zyz(&acc);
            *phase *= C64::cis(angles.alpha);
            for g in one_qubit::euler_rotations(&acc, &qubits[k], ELIDE) {
                out.append(g)?;
            }
        }
        Ok(())
    };

    for gate in circuit.gates() {
        if !gate.is_channel() && gate.arity() == 1 {
            if let Some(StdGate::Ph(_)) = gate.as_std() {
                // pure phase: accumulate, never re-emit mid-run
                let mat = gate.matrix()?;
                phase *= mat[[0, 0]];
                continue;
            }
            let k = pos(&gate.qubits()[0]);
            let mat = gate.matrix()?;
            pending[k] =
                match pending[k].take() {
                    None => Some(mat),
                    Some(prev) => Some(mat.dot(&prev)),
                };
        } else {
            for q in gate.qubits() {
                flush(&mut out, &mut pending, &mut phase, pos(q))?;
            }
            out.append(gate.clone())?;
        }
    }
    for k in 0..qubits.len() {
        flush(&mut out, &mut pending, &mut phase, k)?;
    }
    let arg = phase.arg();
    if arg.abs() > ELIDE && !qubits.is_empty() {
        out.append(Gate::ph(arg, qubits[0].clone()))?;
    }
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tensor::Tensor;

    fn action(circ: &Circuit) -> Tensor { circ.unitary().unwrap() }

    #[test]
    fn decompose_single_qubit_gates() {
        let gs = GateSet::cx();
        for gate in [
            Gate::h(0),
            Gate::t(0),
            Gate::v(0),
            Gate::rx(1.3, 0),
            Gate::phase(-0.7, 0),
        ] {
            let circ = decompose_gate(&gate, &gs).unwrap();
            assert_eq!(gs.entangler_count(&circ), 0);
            assert!(
                action(&circ).approx_eq(&gate.tensor().unwrap(), 1e-6),
                "euler decomposition must reproduce {gate}",
            );
        }
    }

    #[test]
    fn channels_are_not_decomposable() {
        let gs = GateSet::cx();
        let chan = Gate::kraus(
            "dephase",
            [0],
            vec![
                ndarray::array![
                    [C64::from(0.8_f64.sqrt()), C64::from(0.0)],
                    [C64::from(0.0), C64::from(0.8_f64.sqrt())],
                ],
                ndarray::array![
                    [C64::from(0.2_f64.sqrt()), C64::from(0.0)],
                    [C64::from(0.0), C64::from(-(0.2_f64.sqrt()))],
                ],
            ],
            1e-9,
        ).unwrap();
        assert!(matches!(
            decompose_gate(&chan, &gs),
            Err(DecomposeError::UnsupportedGateSet(_)),
        ));
    }

    #[test]
    fn compaction_preserves_action() {
        let mut circ = Circuit::new([0, 1]);
        circ.append(Gate::h(0)).unwrap();
        circ.append(Gate::t(0)).unwrap();
        circ.append(Gate::s(1)).unwrap();
        circ.append(Gate::cx(0, 1).unwrap()).unwrap();
        circ.append(Gate::rz(0.4, 1)).unwrap();
        circ.append(Gate::rx(0.2, 1)).unwrap();
        let compacted = compact_single_qubit_runs(&circ).unwrap();
        assert!(action(&compacted).approx_eq(&action(&circ), 1e-9));
        // h·t on the same wire fuses into one euler run (plus at most one
        // trailing phase gate)
        let ones_on_0 = compacted.gates().iter()
            .filter(|g| g.arity() == 1 && g.qubits()[0] == Qubit::Int(0))
            .count();
        assert!(ones_on_0 <= 4);
    }

    #[test]
    fn gate_set_cost_model() {
        let gs = GateSet::cx();
        let mut circ = Circuit::new([0, 1]);
        circ.append(Gate::h(0)).unwrap();
        circ.append(Gate::cx(0, 1).unwrap()).unwrap();
        assert_eq!(gs.entangler_count(&circ), 1);
        assert!((gs.cost(&circ) - 11.0).abs() < 1e-12);
        // a cz does not count as the cx entangler
        let gz = GateSet::cz();
        assert_eq!(gz.entangler_count(&circ), 0);
    }

    #[test]
    fn cnot_into_cz_basis_uses_one_cz() {
        let gs = GateSet::cz();
        let gate = Gate::cx(0, 1).unwrap();
        let circ = decompose_gate(&gate, &gs).unwrap();
        assert_eq!(gs.entangler_count(&circ), 1);
        assert!(
            action(&circ).approx_eq(&gate.tensor().unwrap(), 1e-6),
            "cz-basis decomposition must reproduce the cnot exactly",
        );
    }

    #[test]
    fn decomposed_circuit_simulates_identically() {
        use crate::{ sim::Simulator, state::State };
        let mut circ = Circuit::new([0, 1]);
        circ.append(Gate::h(0)).unwrap();
        circ.append(Gate::cx(0, 1).unwrap()).unwrap();
        circ.append(Gate::iswap(0, 1).unwrap()).unwrap();
        circ.append(Gate::t(1)).unwrap();
        let lowered = decompose_circuit(&circ, &GateSet::cz()).unwrap();
        for gate in lowered.gates() {
            assert!(gate.arity() == 1 || GateSet::cz().is_entangler(gate));
        }
        let sim = Simulator::default();
        let initial = State::zero([0, 1]);
        let out_a = sim.run(&circ, &initial).unwrap();
        let out_b = sim.run(&lowered, &initial).unwrap();
        assert!(out_a.tensor().approx_eq_phase(out_b.tensor(), 1e-6));
    }

    #[test]
    fn symbolic_gates_refuse_decomposition() {
        let gs = GateSet::cx();
        let gate = Gate::rx("theta", 0);
        assert!(matches!(
            decompose_gate(&gate, &gs),
            Err(DecomposeError::Gate(GateError::UnboundParameter(_))),
        ));
    }
}
