//! Tensor-contraction evaluation of circuits on states.
//!
//! The simulator applies each gate's tensor to the state tensor by
//! contracting the gate's input (bra) axes against the state's corresponding
//! qubit axes, in circuit order. Density operators additionally contract
//! against the gate's adjoint on the bra side, and Kraus channels sum over
//! their operators (auto-promoting pure states to density form).
//!
//! [`Strategy::Contracted`] instead fuses the whole circuit into a single
//! operator first, choosing a pairwise contraction order that greedily
//! minimizes intermediate tensor rank. This is a performance choice only:
//! results agree with sequential application to within tolerance.
//!
//! All randomness used for sampling is supplied by the caller as a
//! [`rand::Rng`], so simulation is reproducible given a fixed seed and safe
//! for data-parallel batch evaluation.

use num_complex::Complex64 as C64;
use rand::Rng;
use rustc_hash::FxHashMap;
use thiserror::Error;
use crate::{
    circuit::Circuit,
    gate::GateError,
    qubit::Qubit,
    state::{ State, StateError },
    tensor::{ Ix, Tensor, TensorError },
};

#[derive(Debug, Error)]
pub enum SimError {
    #[error("observable is not Hermitian to within tolerance {0:.1e}")]
    NonHermitianObservable(f64),

    #[error("evaluation over {0} qubit(s) exceeds the configured ceiling of {1}")]
    ResourceExhausted(usize, usize),

    #[error("operation references qubit {0} not present in the state")]
    QubitNotInState(Qubit),

    #[error("gate error: {0}")]
    Gate(#[from] GateError),

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("tensor error: {0}")]
    Tensor(#[from] TensorError),
}
pub type SimResult<T> = Result<T, SimError>;
use SimError::*;

/// How a circuit's gates are folded into the state.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Apply gates one at a time, in circuit order.
    #[default]
    Sequential,
    /// Fuse the whole circuit into one operator using a greedy
    /// rank-minimizing contraction order, then apply it once.
    ///
    /// Falls back to sequential application for circuits containing
    /// channels.
    Contracted,
}

/// Simulator configuration.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SimConfig {
    /// Hard ceiling on the number of state qubits; evaluation fails fast
    /// with [`SimError::ResourceExhausted`] instead of allocating beyond it.
    /// Density-operator evolution squares the memory cost and halves the
    /// effective ceiling.
    pub max_qubits: usize,
    /// Tolerance for Hermiticity and equivalence checks.
    pub tolerance: f64,
    /// Contraction strategy.
    pub strategy: Strategy,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            max_qubits: 20,
            tolerance: 1e-6,
            strategy: Strategy::Sequential,
        }
    }
}

/// Stateless circuit evaluator; all scratch memory is owned per-call.
#[derive(Copy, Clone, Debug, Default)]
pub struct Simulator {
    config: SimConfig,
}

impl Simulator {
    /// Create a new simulator with the given configuration.
    pub fn new(config: SimConfig) -> Self { Self { config } }

    /// The simulator's configuration.
    pub fn config(&self) -> &SimConfig { &self.config }

    fn check_resources(&self, circuit: &Circuit, state: &State)
        -> SimResult<()>
    {
        for q in circuit.qubits() {
            if !state.qubits().contains(q) {
                return Err(QubitNotInState(q.clone()));
            }
        }
        let n = state.num_qubits();
        let density = state.is_density() || circuit.has_channel();
        let ceiling =
            if density {
                self.config.max_qubits / 2
            } else {
                self.config.max_qubits
            };
        if n > ceiling {
            return Err(ResourceExhausted(n, ceiling));
        }
        Ok(())
    }

    /// Evaluate the action of `circuit` on `initial`, returning the final
    /// state.
    ///
    /// The initial state is never mutated; the caller owns both.
    pub fn run(&self, circuit: &Circuit, initial: &State) -> SimResult<State> {
        self.check_resources(circuit, initial)?;
        if self.config.strategy == Strategy::Contracted
            && !circuit.has_channel()
            && circuit.len() > 1
        {
            let fused = contracted_unitary(circuit)?;
            return apply_unitary(&fused, initial);
        }
        let mut state = initial.clone();
        for gate in circuit.gates() {
            if gate.is_channel() {
                let rho = state.to_density();
                let mut acc: Option<Tensor> = None;
                for op in gate.kraus_tensors()? {
                    let term =
                        op.clone()
                        .contract(rho.tensor().clone())?
                        .contract(op.dagger())?;
                    acc =
                        match acc {
                            None => Some(term),
                            Some(prev) => Some(prev.add(&term)?),
                        };
                }
                state = State::density_unchecked(
                    rho.qubits().to_vec(),
                    acc.expect("channels have at least one Kraus operator")
                        .sorted_indices(),
                );
            } else {
                let u = gate.tensor()?;
                state = apply_unitary(&u, &state)?;
            }
        }
        Ok(state)
    }

    /// Evolve `initial` through `circuit` and return the expectation value
    /// of `observable` in the final state.
    ///
    /// The observable is an operator tensor over any subset of the state's
    /// qubits; it must be Hermitian to within the configured tolerance.
    pub fn expectation(
        &self,
        circuit: &Circuit,
        initial: &State,
        observable: &Tensor,
    ) -> SimResult<f64> {
        let tol = self.config.tolerance;
        if !observable.dagger().approx_eq(observable, tol) {
            return Err(NonHermitianObservable(tol));
        }
        let fin = self.run(circuit, initial)?;
        for q in observable.bra_qubits() {
            if !fin.qubits().contains(&q) {
                return Err(QubitNotInState(q));
            }
        }
        let value =
            if fin.is_pure() {
                let psi = fin.tensor().clone();
                let opsi = observable.clone().contract(psi.clone())?;
                psi.dagger().contract(opsi)?
                    .as_scalar()
                    .expect("full contraction yields a scalar")
            } else {
                observable.clone()
                    .contract(fin.tensor().clone())?
                    .trace()?
            };
        Ok(value.re)
    }

    /// Draw `shots` computational-basis samples from `state`.
    ///
    /// Outcomes are basis indices with the first qubit in canonical order as
    /// the most significant bit. Randomness comes only from the provided
    /// generator.
    pub fn sample<R>(&self, state: &State, shots: usize, rng: &mut R)
        -> Vec<usize>
    where R: Rng + ?Sized
    {
        let probs = state.probabilities();
        let mut cumulative: Vec<f64> = Vec::with_capacity(probs.len());
        let mut acc = 0.0;
        for p in probs {
            acc += p.max(0.0);
            cumulative.push(acc);
        }
        let total = *cumulative.last().unwrap_or(&1.0);
        (0..shots)
            .map(|_| {
                let r: f64 = rng.gen::<f64>() * total;
                cumulative.iter()
                    .position(|c| *c > r)
                    .unwrap_or(cumulative.len() - 1)
            })
            .collect()
    }

    /// Like [`sample`][Self::sample], but tallied into a map from basis
    /// index to count.
    pub fn sample_counts<R>(&self, state: &State, shots: usize, rng: &mut R)
        -> FxHashMap<usize, usize>
    where R: Rng + ?Sized
    {
        let mut counts: FxHashMap<usize, usize> = FxHashMap::default();
        for outcome in self.sample(state, shots, rng) {
            *counts.entry(outcome).or_insert(0) += 1;
        }
        counts
    }

    /// Measure a single qubit in the computational basis, collapsing the
    /// state.
    ///
    /// Returns the outcome bit and the renormalized post-measurement state.
    pub fn measure_qubit<R>(
        &self,
        state: &State,
        qubit: &Qubit,
        rng: &mut R,
    ) -> SimResult<(u8, State)>
    where R: Rng + ?Sized
    {
        let pos =
            state.qubits().iter()
            .position(|q| q == qubit)
            .ok_or_else(|| QubitNotInState(qubit.clone()))?;
        let n = state.num_qubits();
        let bit = 1_usize << (n - 1 - pos);
        let probs = state.probabilities();
        let p0: f64 =
            probs.iter().enumerate()
            .filter(|(k, _)| k & bit == 0)
            .map(|(_, p)| p)
            .sum();
        let outcome: u8 = u8::from(rng.gen::<f64>() >= p0);
        let keep = |k: usize| (k & bit != 0) == (outcome == 1);
        let p_outcome = if outcome == 0 { p0 } else { 1.0 - p0 };
        if state.is_pure() {
            let mut amps = state.amplitudes()?;
            let scale = 1.0 / p_outcome.sqrt();
            for (k, a) in amps.iter_mut().enumerate() {
                *a = if keep(k) { *a * scale } else { C64::from(0.0) };
            }
            let tensor = Tensor::from_vector(state.qubits(), amps)?;
            Ok((outcome, State::pure_unchecked(
                state.qubits().to_vec(),
                tensor,
            )))
        } else {
            let mut rho = state.density_matrix()?;
            let scale = 1.0 / p_outcome;
            for ((r, c), v) in rho.indexed_iter_mut() {
                *v = if keep(r) && keep(c) {
                    *v * scale
                } else {
                    C64::from(0.0)
                };
            }
            let tensor = Tensor::from_matrix(state.qubits(), rho)?;
            Ok((outcome, State::density_unchecked(
                state.qubits().to_vec(),
                tensor,
            )))
        }
    }
}

// apply a unitary operator tensor to a state, conjugating on the bra side
// for density operators
fn apply_unitary(u: &Tensor, state: &State) -> SimResult<State> {
    if state.is_pure() {
        let evolved =
            u.clone().contract(state.tensor().clone())?.sorted_indices();
        Ok(State::pure_unchecked(state.qubits().to_vec(), evolved))
    } else {
        let evolved =
            u.clone()
            .contract(state.tensor().clone())?
            .contract(u.dagger())?
            .sorted_indices();
        Ok(State::density_unchecked(state.qubits().to_vec(), evolved))
    }
}

/// Fuse a channel-free circuit into a single operator tensor using a greedy
/// rank-minimizing pairwise contraction order.
///
/// The result is identical (within floating-point tolerance) to multiplying
/// the gates out in circuit order.
pub fn contracted_unitary(circuit: &Circuit) -> SimResult<Tensor> {
    // wire segments get globally unique ids so tensors can be contracted in
    // any order without ket/bra name collisions
    let mut next_id: u32 = 0;
    let mut fresh = || { let id = next_id; next_id += 1; id };
    let mut open: FxHashMap<Qubit, u32> = FxHashMap::default();
    let mut input_ids: Vec<(Qubit, u32)> = Vec::new();
    for q in circuit.qubits() {
        let id = fresh();
        open.insert(q.clone(), id);
        input_ids.push((q.clone(), id));
    }
    let mut nodes: Vec<net::Node> = Vec::new();
    for gate in circuit.gates() {
        let mat = gate.matrix()?;
        let k = gate.arity();
        let data =
            mat.into_shape(vec![2; 2 * k]).unwrap();
        let out_ids: Vec<u32> = (0..k).map(|_| fresh()).collect();
        let in_ids: Vec<u32> =
            gate.qubits().iter().map(|q| open[q]).collect();
        for (q, id) in gate.qubits().iter().zip(out_ids.iter()) {
            open.insert(q.clone(), *id);
        }
        let ixs: Vec<u32> =
            out_ids.into_iter().chain(in_ids).collect();
        nodes.push(net::Node { ixs, data });
    }
    let fused = net::greedy(nodes);
    // translate open segment ids back into ket/bra indices; untouched qubits
    // never appear in any node and are re-attached as identity wires
    let mut untouched: Vec<Qubit> = Vec::new();
    for (q, input) in input_ids.iter() {
        if open[q] == *input { untouched.push(q.clone()); }
    }
    let core: Tensor =
        match fused {
            None => Tensor::scalar(1.0),
            Some(node) => {
                let indices: Vec<Ix> =
                    node.ixs.iter()
                    .map(|id| {
                        input_ids.iter()
                            .find_map(|(q, input)| {
                                (input == id).then(|| Ix::Bra(q.clone()))
                            })
                            .or_else(|| {
                                open.iter()
                                    .find_map(|(q, out)| {
                                        (out == id)
                                            .then(|| Ix::Ket(q.clone()))
                                    })
                            })
                            .expect("every open id is an input or an output")
                    })
                    .collect();
                Tensor::from_array(indices, node.data)?
            },
        };
    let full = core.contract(Tensor::identity(untouched.iter()))?;
    Ok(full.sorted_indices())
}

mod net {
    use ndarray::{ self as nd };
    use num_complex::Complex64 as C64;

    // a tensor in the contraction network: uniquely-numbered wire ids, one
    // length-2 axis each
    pub(super) struct Node {
        pub(super) ixs: Vec<u32>,
        pub(super) data: nd::ArrayD<C64>,
    }

    impl Node {
        fn rank(&self) -> usize { self.ixs.len() }

        fn shared_with(&self, other: &Self) -> usize {
            self.ixs.iter().filter(|id| other.ixs.contains(id)).count()
        }
    }

    pub(super) fn contract_pair(mut a: Node, mut b: Node) -> Node {
        let shared: Vec<u32> =
            a.ixs.iter().copied()
            .filter(|id| b.ixs.contains(id))
            .collect();
        let n_a = a.ixs.len();
        let n_sh = shared.len();
        let n_b = b.ixs.len();
        for (k_targ, id) in shared.iter().enumerate() {
            let k_src =
                a.ixs.iter().position(|i| i == id).unwrap();
            a.ixs.swap(k_src, n_a - n_sh + k_targ);
            a.data.swap_axes(k_src, n_a - n_sh + k_targ);
            let k_src =
                b.ixs.iter().position(|i| i == id).unwrap();
            b.ixs.swap(k_src, k_targ);
            b.data.swap_axes(k_src, k_targ);
        }
        let dim_a = 1_usize << (n_a - n_sh);
        let dim_sh = 1_usize << n_sh;
        let dim_b = 1_usize << (n_b - n_sh);
        let lhs: nd::CowArray<C64, nd::Ix2> =
            a.data.as_standard_layout()
            .into_shape((dim_a, dim_sh))
            .unwrap();
        let rhs: nd::CowArray<C64, nd::Ix2> =
            b.data.as_standard_layout()
            .into_shape((dim_sh, dim_b))
            .unwrap();
        let prod: nd::Array2<C64> = lhs.dot(&rhs);
        let ixs: Vec<u32> =
            a.ixs.into_iter().take(n_a - n_sh)
            .chain(b.ixs.into_iter().skip(n_sh))
            .collect();
        let data =
            prod.into_shape(vec![2; ixs.len()]).unwrap();
        Node { ixs, data }
    }

    // repeatedly contract the pair minimizing the resulting rank, breaking
    // ties toward the earliest pair in list order
    pub(super) fn greedy(mut nodes: Vec<Node>) -> Option<Node> {
        if nodes.is_empty() { return None; }
        while nodes.len() > 1 {
            let mut best: Option<(usize, usize, usize)> = None;
            for i in 0..nodes.len() - 1 {
                for j in i + 1..nodes.len() {
                    let shared = nodes[i].shared_with(&nodes[j]);
                    if shared == 0 { continue; }
                    let result_rank =
                        nodes[i].rank() + nodes[j].rank() - 2 * shared;
                    if best.map_or(true, |(br, ..)| result_rank < br) {
                        best = Some((result_rank, i, j));
                    }
                }
            }
            let (i, j) =
                match best {
                    Some((_, i, j)) => (i, j),
                    // disconnected components: fuse the front pair
                    None => (0, 1),
                };
            let b = nodes.remove(j);
            let a = nodes.remove(i);
            nodes.push(contract_pair(a, b));
        }
        nodes.pop()
    }
}

#[cfg(test)]
mod test {
    use std::f64::consts::FRAC_1_SQRT_2 as RT2;
    use ndarray as nd;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use crate::{ c, gate::{ Gate, StdGate } };
    use super::*;

    fn bell_circuit() -> Circuit {
        let mut circ = Circuit::new([0, 1]);
        circ.append(Gate::h(0)).unwrap();
        circ.append(Gate::cx(0, 1).unwrap()).unwrap();
        circ
    }

    #[test]
    fn bell_state() {
        let sim = Simulator::default();
        let fin = sim.run(&bell_circuit(), &State::zero([0, 1])).unwrap();
        let amps = fin.amplitudes().unwrap();
        assert!((amps[0] - c!(RT2)).norm() < 1e-6);
        assert!((amps[3] - c!(RT2)).norm() < 1e-6);
        assert!(amps[1].norm() < 1e-6);
        assert!(amps[2].norm() < 1e-6);
    }

    #[test]
    fn contracted_matches_sequential() {
        let mut circ = Circuit::new([0, 1, 2]);
        circ.append(Gate::h(0)).unwrap();
        circ.append(Gate::cx(0, 1).unwrap()).unwrap();
        circ.append(Gate::rz(0.31, 1)).unwrap();
        circ.append(Gate::cx(1, 2).unwrap()).unwrap();
        circ.append(Gate::ry(-0.7, 2)).unwrap();
        circ.append(Gate::cz(0, 2).unwrap()).unwrap();
        let initial = State::zero([0, 1, 2]);
        let seq = Simulator::default();
        let con = Simulator::new(SimConfig {
            strategy: Strategy::Contracted,
            ..SimConfig::default()
        });
        let out_seq = seq.run(&circ, &initial).unwrap();
        let out_con = con.run(&circ, &initial).unwrap();
        assert!(
            out_seq.tensor().approx_eq(out_con.tensor(), 1e-10),
            "contraction order must not change the result",
        );
    }

    #[test]
    fn fused_operator_matches_product() {
        let circ = bell_circuit();
        let fused = contracted_unitary(&circ).unwrap();
        let product = circ.unitary().unwrap();
        assert!(fused.approx_eq(&product, 1e-12));
    }

    #[test]
    fn resource_ceiling() {
        let sim = Simulator::new(SimConfig {
            max_qubits: 2,
            ..SimConfig::default()
        });
        let circ = Circuit::new([0, 1, 2]);
        let state = State::zero([0, 1, 2]);
        assert!(matches!(
            sim.run(&circ, &state),
            Err(SimError::ResourceExhausted(3, 2)),
        ));
    }

    #[test]
    fn expectation_values() {
        let sim = Simulator::default();
        let z0 = Tensor::from_matrix(
            &[Qubit::Int(0)],
            StdGate::Z.matrix().unwrap(),
        ).unwrap();
        let empty = Circuit::new([0]);
        let ev = sim.expectation(&empty, &State::zero([0]), &z0).unwrap();
        assert!((ev - 1.0).abs() < 1e-12);

        let mut h = Circuit::new([0]);
        h.append(Gate::h(0)).unwrap();
        let ev = sim.expectation(&h, &State::zero([0]), &z0).unwrap();
        assert!(ev.abs() < 1e-12);
    }

    #[test]
    fn non_hermitian_observable_rejected() {
        let sim = Simulator::default();
        let obs = Tensor::from_matrix(
            &[Qubit::Int(0)],
            nd::array![
                [c!(0.0), c!(1.0)],
                [c!(0.0), c!(0.0)],
            ],
        ).unwrap();
        let empty = Circuit::new([0]);
        assert!(matches!(
            sim.expectation(&empty, &State::zero([0]), &obs),
            Err(SimError::NonHermitianObservable(_)),
        ));
    }

    #[test]
    fn channel_preserves_trace() {
        let gamma: f64 = 0.25;
        let k0 = nd::array![
            [c!(1.0), c!(0.0)],
            [c!(0.0), c!((1.0 - gamma).sqrt())],
        ];
        let k1 = nd::array![
            [c!(0.0), c!(gamma.sqrt())],
            [c!(0.0), c!(0.0)],
        ];
        let chan = Gate::kraus("amp_damp", [0], vec![k0, k1], 1e-9).unwrap();
        let mut circ = Circuit::new([0]);
        circ.append(Gate::x(0)).unwrap();
        circ.append(chan).unwrap();
        let sim = Simulator::default();
        let fin = sim.run(&circ, &State::zero([0])).unwrap();
        assert!(fin.is_density(), "channels promote pure states");
        assert!((fin.norm() - 1.0).abs() < 1e-10);
        let probs = fin.probabilities();
        assert!((probs[0] - gamma).abs() < 1e-10);
        assert!((probs[1] - (1.0 - gamma)).abs() < 1e-10);
    }

    #[test]
    fn sampling_is_reproducible() {
        let sim = Simulator::default();
        let fin = sim.run(&bell_circuit(), &State::zero([0, 1])).unwrap();
        let mut rng_a = StdRng::seed_from_u64(17);
        let mut rng_b = StdRng::seed_from_u64(17);
        let a = sim.sample(&fin, 100, &mut rng_a);
        let b = sim.sample(&fin, 100, &mut rng_b);
        assert_eq!(a, b);
        // bell-state outcomes are only ever |00⟩ or |11⟩
        assert!(a.iter().all(|k| *k == 0 || *k == 3));
        let counts = sim.sample_counts(&fin, 1000, &mut rng_a);
        assert!(counts.keys().all(|k| *k == 0 || *k == 3));
        assert!(*counts.get(&0).unwrap_or(&0) > 300);
        assert!(*counts.get(&3).unwrap_or(&0) > 300);
    }

    #[test]
    fn measurement_collapses() {
        let sim = Simulator::default();
        let fin = sim.run(&bell_circuit(), &State::zero([0, 1])).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let (outcome, collapsed) =
            sim.measure_qubit(&fin, &Qubit::Int(0), &mut rng).unwrap();
        let amps = collapsed.amplitudes().unwrap();
        let expect_index = if outcome == 0 { 0 } else { 3 };
        assert!((amps[expect_index].norm() - 1.0).abs() < 1e-10);
        assert!((collapsed.norm() - 1.0).abs() < 1e-10);
        // measuring the second qubit afterward is deterministic
        let (outcome2, _) =
            sim.measure_qubit(&collapsed, &Qubit::Int(1), &mut rng).unwrap();
        assert_eq!(outcome, outcome2);
    }
}
