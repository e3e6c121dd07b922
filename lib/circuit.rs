//! Ordered sequences of gate applications over a declared qubit set.
//!
//! Gate order is chronological: the gate at position 0 acts first. A circuit
//! may declare idle qubits beyond those its gates touch; the declared set is
//! what simulation and composition operate over.

use itertools::Itertools;
use rustc_hash::FxHashMap;
use thiserror::Error;
use crate::{
    gate::{ Gate, GateError },
    qubit::{ Qubit, sorted_qubits },
    tensor::Tensor,
};

#[derive(Debug, Error)]
pub enum CircuitError {
    #[error("gate '{0}' references qubit {1} outside the circuit's qubit set")]
    QubitNotInCircuit(String, Qubit),

    #[error("qubit relabeling is not a bijection on the circuit's qubits: {0}")]
    InvalidMapping(String),

    #[error("gate error: {0}")]
    Gate(#[from] GateError),
}
pub type CircuitResult<T> = Result<T, CircuitError>;
use CircuitError::*;

/// An ordered sequence of gate applications over a declared qubit set.
///
/// Later gates are applied after earlier ones; qubits may be reused freely
/// across positions. Multiple circuits may share identical immutable
/// [`Gate`] values.
#[derive(Clone, Debug, PartialEq)]
pub struct Circuit {
    qubits: Vec<Qubit>,
    gates: Vec<Gate>,
    auto_extend: bool,
}

impl Circuit {
    /// Create an empty circuit over a declared qubit set.
    ///
    /// Appending a gate that references a qubit outside this set is an
    /// error; see [`with_auto_extend`][Self::with_auto_extend] for the
    /// growable alternative.
    pub fn new<I, Q>(qubits: I) -> Self
    where
        I: IntoIterator<Item = Q>,
        Q: Into<Qubit>,
    {
        Self {
            qubits: sorted_qubits(qubits.into_iter().map(|q| q.into())),
            gates: Vec::new(),
            auto_extend: false,
        }
    }

    /// Create an empty circuit whose qubit set grows to cover whatever
    /// qubits are appended.
    pub fn with_auto_extend() -> Self {
        Self {
            qubits: Vec::new(),
            gates: Vec::new(),
            auto_extend: true,
        }
    }

    /// The circuit's declared qubits, in canonical order.
    pub fn qubits(&self) -> &[Qubit] { &self.qubits }

    /// The number of declared qubits.
    pub fn num_qubits(&self) -> usize { self.qubits.len() }

    /// The gate sequence, in chronological order.
    pub fn gates(&self) -> &[Gate] { &self.gates }

    /// The number of gate applications.
    pub fn len(&self) -> usize { self.gates.len() }

    /// Return `true` if the circuit contains no gates.
    pub fn is_empty(&self) -> bool { self.gates.is_empty() }

    /// Return `true` if any gate is a Kraus channel.
    pub fn has_channel(&self) -> bool {
        self.gates.iter().any(|g| g.is_channel())
    }

    /// Append a gate application.
    ///
    /// Fails with [`CircuitError::QubitNotInCircuit`] if the gate references
    /// a qubit outside the declared set, unless the circuit was created with
    /// [`with_auto_extend`][Self::with_auto_extend].
    pub fn append(&mut self, gate: Gate) -> CircuitResult<()> {
        for q in gate.qubits() {
            if !self.qubits.contains(q) {
                if self.auto_extend {
                    self.qubits.push(q.clone());
                    self.qubits.sort();
                } else {
                    return Err(QubitNotInCircuit(
                        gate.name().to_string(),
                        q.clone(),
                    ));
                }
            }
        }
        self.gates.push(gate);
        Ok(())
    }

    /// Append a gate application, builder style.
    pub fn pushed(mut self, gate: Gate) -> CircuitResult<Self> {
        self.append(gate)?;
        Ok(self)
    }

    /// Append every gate of an iterator.
    pub fn extend<I>(&mut self, gates: I) -> CircuitResult<()>
    where I: IntoIterator<Item = Gate>
    {
        for gate in gates { self.append(gate)?; }
        Ok(())
    }

    /// The inverse circuit: gate order reversed, each gate adjointed.
    ///
    /// `c.inverse().inverse()` is structurally equal to `c`.
    pub fn inverse(&self) -> Self {
        Self {
            qubits: self.qubits.clone(),
            gates: self.gates.iter().rev().map(|g| g.adjoint()).collect(),
            auto_extend: self.auto_extend,
        }
    }

    /// Relabel every qubit through `mapping`.
    ///
    /// `mapping` must assign a label to every declared qubit and must be
    /// injective on them; anything else fails with
    /// [`CircuitError::InvalidMapping`].
    pub fn relabel(&self, mapping: &FxHashMap<Qubit, Qubit>)
        -> CircuitResult<Self>
    {
        for q in self.qubits.iter() {
            if !mapping.contains_key(q) {
                return Err(InvalidMapping(format!("qubit {q} is unmapped")));
            }
        }
        let images = sorted_qubits(
            self.qubits.iter().map(|q| mapping[q].clone()),
        );
        if images.len() != self.qubits.len() {
            return Err(InvalidMapping(
                "two qubits map to the same label".to_string(),
            ));
        }
        let gates =
            self.gates.iter()
            .map(|g| g.relabel_with(|q| mapping[q].clone()))
            .collect::<Result<Vec<Gate>, GateError>>()?;
        Ok(Self {
            qubits: images,
            gates,
            auto_extend: self.auto_extend,
        })
    }

    /// Chronological concatenation over the union of both qubit sets: all of
    /// `self`'s operations occur before `other`'s.
    pub fn then(&self, other: &Self) -> Self {
        let qubits = sorted_qubits(
            self.qubits.iter().chain(other.qubits.iter()).cloned(),
        );
        let gates: Vec<Gate> =
            self.gates.iter().chain(other.gates.iter()).cloned().collect();
        Self {
            qubits,
            gates,
            auto_extend: self.auto_extend || other.auto_extend,
        }
    }

    /// Substitute parameter variables in every gate.
    pub fn substitute(&self, bindings: &FxHashMap<String, f64>) -> Self {
        Self {
            qubits: self.qubits.clone(),
            gates: self.gates.iter().map(|g| g.substitute(bindings)).collect(),
            auto_extend: self.auto_extend,
        }
    }

    /// Names of all unbound symbolic parameter variables.
    pub fn free_vars(&self) -> Vec<String> {
        self.gates.iter()
            .flat_map(|g| g.free_vars())
            .unique()
            .collect()
    }

    /// The circuit's total action as an operator tensor over its declared
    /// qubits.
    ///
    /// Memory is exponential in the qubit count; this is intended for
    /// verification and few-qubit work. Fails for circuits containing
    /// channels or unbound parameters.
    pub fn unitary(&self) -> CircuitResult<Tensor> {
        let mut acc = Tensor::identity(self.qubits.iter());
        for gate in self.gates.iter() {
            acc = gate.tensor()?.contract(acc).map_err(GateError::from)?;
        }
        Ok(acc.sorted_indices())
    }
}

impl std::fmt::Display for Circuit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (k, gate) in self.gates.iter().enumerate() {
            if k > 0 { writeln!(f)?; }
            write!(f, "{gate}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn append_checks_qubits() {
        let mut circ = Circuit::new([0, 1]);
        circ.append(Gate::h(0)).unwrap();
        assert!(matches!(
            circ.append(Gate::x(2)),
            Err(CircuitError::QubitNotInCircuit(..)),
        ));
        let mut open = Circuit::with_auto_extend();
        open.append(Gate::x(2)).unwrap();
        assert_eq!(open.num_qubits(), 1);
    }

    #[test]
    fn double_inverse_is_identity() {
        let mut circ = Circuit::new([0, 1]);
        circ.append(Gate::h(0)).unwrap();
        circ.append(Gate::cx(0, 1).unwrap()).unwrap();
        circ.append(Gate::s(1)).unwrap();
        circ.append(Gate::rx(0.3, 0)).unwrap();
        assert_eq!(circ.inverse().inverse(), circ);
    }

    #[test]
    fn inverse_undoes_action() {
        let mut circ = Circuit::new([0, 1]);
        circ.append(Gate::h(0)).unwrap();
        circ.append(Gate::cx(0, 1).unwrap()).unwrap();
        circ.append(Gate::t(1)).unwrap();
        let round = circ.then(&circ.inverse());
        let id = Circuit::new([0, 1]).unitary().unwrap();
        assert!(round.unitary().unwrap().approx_eq(&id, 1e-12));
    }

    #[test]
    fn relabel_bijection_required() {
        let mut circ = Circuit::new([0, 1]);
        circ.append(Gate::cx(0, 1).unwrap()).unwrap();

        let partial: FxHashMap<Qubit, Qubit> =
            [(Qubit::Int(0), Qubit::Int(5))].into_iter().collect();
        assert!(matches!(
            circ.relabel(&partial),
            Err(CircuitError::InvalidMapping(_)),
        ));

        let collapsing: FxHashMap<Qubit, Qubit> =
            [
                (Qubit::Int(0), Qubit::Int(5)),
                (Qubit::Int(1), Qubit::Int(5)),
            ]
            .into_iter().collect();
        assert!(matches!(
            circ.relabel(&collapsing),
            Err(CircuitError::InvalidMapping(_)),
        ));

        let proper: FxHashMap<Qubit, Qubit> =
            [
                (Qubit::Int(0), Qubit::Name("a".to_string())),
                (Qubit::Int(1), Qubit::Name("b".to_string())),
            ]
            .into_iter().collect();
        let relabeled = circ.relabel(&proper).unwrap();
        assert_eq!(
            relabeled.qubits(),
            &["a".into(), "b".into()] as &[Qubit],
        );
        assert_eq!(
            relabeled.gates()[0].qubits(),
            &["a".into(), "b".into()] as &[Qubit],
        );
    }

    #[test]
    fn composition_is_chronological() {
        let mut first = Circuit::new([0]);
        first.append(Gate::x(0)).unwrap();
        let mut second = Circuit::new([0]);
        second.append(Gate::h(0)).unwrap();
        let joined = first.then(&second);
        assert_eq!(joined.gates()[0], Gate::x(0));
        assert_eq!(joined.gates()[1], Gate::h(0));
        // H·X ≠ X·H distinguishes the orders
        let expected =
            Gate::x(0).then(&Gate::h(0)).unwrap();
        assert!(
            joined.unitary().unwrap()
            .approx_eq(&expected.tensor().unwrap(), 1e-12)
        );
    }

    #[test]
    fn idle_qubits_carry_through() {
        let mut circ = Circuit::new([0, 1, 2]);
        circ.append(Gate::h(1)).unwrap();
        let u = circ.unitary().unwrap();
        assert_eq!(u.rank(), 6);
    }

    #[test]
    fn substitution_applies_everywhere() {
        let mut circ = Circuit::new([0, 1]);
        circ.append(Gate::rx("theta", 0)).unwrap();
        circ.append(Gate::rz("theta", 1)).unwrap();
        assert_eq!(circ.free_vars(), vec!["theta".to_string()]);
        let bindings: FxHashMap<String, f64> =
            [("theta".to_string(), 0.25)].into_iter().collect();
        let bound = circ.substitute(&bindings);
        assert!(bound.free_vars().is_empty());
        assert!(bound.unitary().is_ok());
    }
}
