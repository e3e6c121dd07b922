//! Dense, qubit-indexed tensors and their contraction.
//!
//! A [`Tensor`] is a complex array with one length-2 axis per [`Ix`] wire
//! index. Each index names a qubit either on the output ([`Ix::Ket`]) or
//! input ([`Ix::Bra`]) side of the linear map the tensor denotes; a rank-2k
//! tensor over k qubits is exactly a 2^k × 2^k operator. Contraction matches
//! the bra indices of the left factor against the ket indices of the right
//! factor, so `b.contract(a)` is the operator product B·A.

use std::fmt;
use ndarray::{ self as nd, Dimension };
use num_complex::Complex64 as C64;
use thiserror::Error;
use crate::qubit::Qubit;

#[derive(Debug, Error)]
pub enum TensorError {
    #[error("duplicate index {0}")]
    DuplicateIndex(Ix),

    #[error("non-matching indices {0:?} and shape {1:?}")]
    IncompatibleShape(Box<[Ix]>, Box<[usize]>),

    #[error("un-matched duplicate index in contraction {0}")]
    ContractDuplicateIndex(Ix),

    #[error("expected index {0} is not present")]
    MissingIndex(Ix),

    #[error("cannot add tensors with different index sets")]
    AddIndexMismatch,
}
pub type TensorResult<T> = Result<T, TensorError>;
use TensorError::*;

/// An index for a qubit wire on a specific side of a linear map.
///
/// [`Ord`] sorts all ket indices before all bra indices, deferring to the
/// canonical qubit ordering within those subgroups.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Ix {
    /// A qubit on the ket (output) side.
    Ket(Qubit),
    /// A qubit on the bra (input) side.
    Bra(Qubit),
}

impl Ix {
    /// Return `true` if `self` is `Ket`.
    pub fn is_ket(&self) -> bool { matches!(self, Self::Ket(_)) }

    /// Return `true` if `self` is `Ket` and the qubit satisfies a predicate.
    pub fn is_ket_and<F>(&self, pred: F) -> bool
    where F: FnOnce(&Qubit) -> bool
    {
        if let Self::Ket(q) = self { pred(q) } else { false }
    }

    /// Return `true` if `self` is `Bra`.
    pub fn is_bra(&self) -> bool { matches!(self, Self::Bra(_)) }

    /// Return `true` if `self` is `Bra` and the qubit satisfies a predicate.
    pub fn is_bra_and<F>(&self, pred: F) -> bool
    where F: FnOnce(&Qubit) -> bool
    {
        if let Self::Bra(q) = self { pred(q) } else { false }
    }

    /// Conjugate `self`, changing `Ket`s to `Bra`s and `Bra`s to `Ket`s.
    pub fn conj(&self) -> Self {
        match self {
            Self::Ket(q) => Self::Bra(q.clone()),
            Self::Bra(q) => Self::Ket(q.clone()),
        }
    }

    /// Return `true` if `self` is a `Bra` and `other` is a `Ket` on the same
    /// qubit.
    pub fn matches_with(&self, other: &Self) -> bool {
        matches!((self, other), (Self::Bra(l), Self::Ket(r)) if l == r)
    }

    /// Return the qubit label.
    pub fn qubit(&self) -> &Qubit {
        match self {
            Self::Ket(q) => q,
            Self::Bra(q) => q,
        }
    }
}

impl PartialOrd for Ix {
    fn partial_cmp(&self, rhs: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(rhs))
    }
}

impl Ord for Ix {
    fn cmp(&self, rhs: &Self) -> std::cmp::Ordering {
        match (self, rhs) {
            (Self::Ket(_), Self::Bra(_)) => std::cmp::Ordering::Less,
            (Self::Bra(_), Self::Ket(_)) => std::cmp::Ordering::Greater,
            (Self::Ket(l), Self::Ket(r)) => l.cmp(r),
            (Self::Bra(l), Self::Bra(r)) => l.cmp(r),
        }
    }
}

impl fmt::Display for Ix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ket(q) => write!(f, "Ket({q})"),
            Self::Bra(q) => write!(f, "Bra({q})"),
        }
    }
}

/// A dynamically dimensioned array, with data stored behind an atomic
/// reference counter.
pub type ArcArrayD<T> = nd::ArcArray<T, nd::IxDyn>;

#[derive(Clone, PartialEq, Debug)]
enum TensorData {
    Scalar(C64),
    Tensor(Vec<Ix>, ArcArrayD<C64>),
}

impl TensorData {
    fn new<I, F>(indices: I, mut elems: F) -> Self
    where
        I: IntoIterator<Item = Ix>,
        F: FnMut(&[usize]) -> C64,
    {
        let mut idxs: Vec<Ix> = Vec::new();
        indices.into_iter()
            .for_each(|idx| { if !idxs.contains(&idx) { idxs.push(idx); } });
        if idxs.is_empty() {
            Self::Scalar(elems(&[]))
        } else {
            let shape: Vec<usize> = vec![2; idxs.len()];
            let data: nd::ArrayD<C64> =
                nd::ArrayD::from_shape_fn(
                    shape,
                    |ix| elems(ix.as_array_view().as_slice().unwrap()),
                );
            Self::Tensor(idxs, data.into_shared())
        }
    }

    fn from_array<I, S, D>(indices: I, array: nd::ArrayBase<S, D>)
        -> TensorResult<Self>
    where
        I: IntoIterator<Item = Ix>,
        S: nd::DataOwned<Elem = C64>,
        D: nd::Dimension,
    {
        let indices: Vec<Ix> = indices.into_iter().collect();
        let mb_dup =
            indices.iter().enumerate()
            .find_map(|(k, idx)| {
                indices.iter().skip(k + 1).find(|idx2| *idx2 == idx)
            });
        if let Some(dup) = mb_dup {
            return Err(DuplicateIndex(dup.clone()));
        }
        let shape = array.shape();
        if indices.len() == shape.len() && shape.iter().all(|dim| *dim == 2) {
            if indices.is_empty() {
                Ok(Self::Scalar(*array.into_iter().next().unwrap()))
            } else {
                Ok(Self::Tensor(indices, array.into_dyn().into_shared()))
            }
        } else if shape.len() == 1 && shape[0] == 1_usize << indices.len() {
            let tensor_shape: Vec<usize> = vec![2; indices.len()];
            let data = array.into_dyn().into_shared();
            let data = data.reshape(tensor_shape);
            Ok(Self::Tensor(indices, data))
        } else {
            let idxs: Box<[Ix]> = indices.into();
            let array_shape: Box<[usize]> = shape.iter().copied().collect();
            Err(IncompatibleShape(idxs, array_shape))
        }
    }

    fn indices(&self) -> Option<&Vec<Ix>> {
        match self {
            Self::Scalar(_) => None,
            Self::Tensor(idxs, _) => Some(idxs),
        }
    }

    fn rank(&self) -> usize {
        match self {
            Self::Scalar(_) => 0,
            Self::Tensor(idxs, _) => idxs.len(),
        }
    }

    fn dagger(&self) -> Self {
        match self {
            Self::Scalar(a) => Self::Scalar(a.conj()),
            Self::Tensor(idxs, a) => {
                let idxs_new: Vec<Ix> =
                    idxs.iter().map(|idx| idx.conj()).collect();
                let data_new: ArcArrayD<C64> = a.mapv(|ak| ak.conj()).into();
                Self::Tensor(idxs_new, data_new)
            },
        }
    }

    fn relabel<F>(&mut self, mut map: F)
    where F: FnMut(&Qubit) -> Qubit
    {
        if let Self::Tensor(idxs, _) = self {
            idxs.iter_mut()
                .for_each(|idx| {
                    *idx =
                        match idx {
                            Ix::Ket(q) => Ix::Ket(map(q)),
                            Ix::Bra(q) => Ix::Bra(map(q)),
                        };
                });
        }
    }

    fn swap_indices_pos(&mut self, a: usize, b: usize) {
        if let Self::Tensor(idxs, data) = self {
            if a >= idxs.len() || b >= idxs.len() { return; }
            idxs.swap(a, b);
            data.swap_axes(a, b);
        }
    }

    fn sort_indices(&mut self) {
        // bubble sort because we can only swap adjacent-or-not axes pairwise
        if let Self::Tensor(idxs, data) = self {
            let mut n = idxs.len();
            let mut swapped = n > 1;
            while swapped {
                swapped = false;
                for i in 1..n {
                    if idxs[i - 1] > idxs[i] {
                        idxs.swap(i - 1, i);
                        data.swap_axes(i - 1, i);
                        swapped = true;
                    }
                }
                n -= 1;
            }
        }
    }

    fn do_contract(
        common: Vec<Qubit>,
        mut idxs_a: Vec<Ix>,
        mut a: ArcArrayD<C64>,
        mut idxs_b: Vec<Ix>,
        mut b: ArcArrayD<C64>,
    ) -> Self
    {
        // move the matched bras of `a` to its rightmost axes and the matched
        // kets of `b` to its leftmost, in the same order, then fuse and matmul
        let n_idx_a = idxs_a.len();
        let n_common = common.len();
        let n_idx_b = idxs_b.len();
        let mut k_src: usize;
        for (k_targ, q) in common.iter().enumerate() {
            k_src =
                idxs_a.iter().enumerate()
                .find_map(|(k_src, idx_src)| {
                    idx_src.is_bra_and(|qk| qk == q).then_some(k_src)
                })
                .unwrap();
            idxs_a.swap(k_src, n_idx_a - n_common + k_targ);
            a.swap_axes(k_src, n_idx_a - n_common + k_targ);

            k_src =
                idxs_b.iter().enumerate()
                .find_map(|(k_src, idx_src)| {
                    idx_src.is_ket_and(|qk| qk == q).then_some(k_src)
                })
                .unwrap();
            idxs_b.swap(k_src, k_targ);
            b.swap_axes(k_src, k_targ);
        }

        let dim_noncomm_a = 1_usize << (n_idx_a - n_common);
        let dim_comm = 1_usize << n_common;
        let dim_noncomm_b = 1_usize << (n_idx_b - n_common);
        let a: nd::CowArray<C64, nd::Ix2> =
            a.as_standard_layout()
            .into_shape((dim_noncomm_a, dim_comm))
            .unwrap();
        let b: nd::CowArray<C64, nd::Ix2> =
            b.as_standard_layout()
            .into_shape((dim_comm, dim_noncomm_b))
            .unwrap();
        let c: nd::Array2<C64> = a.dot(&b);
        let new_shape: Vec<usize> = vec![2; n_idx_a + n_idx_b - 2 * n_common];
        if new_shape.is_empty() {
            let c_val = c.into_iter().next().unwrap();
            Self::Scalar(c_val)
        } else {
            let new_idxs: Vec<Ix> =
                idxs_a.into_iter().take(n_idx_a - n_common)
                .chain(idxs_b.into_iter().skip(n_common))
                .collect();
            let c = c.into_shape(new_shape).unwrap();
            Self::Tensor(new_idxs, c.into_shared())
        }
    }

    fn contract(self, rhs: Self) -> TensorResult<Self> {
        match (self, rhs) {
            (Self::Scalar(a), Self::Scalar(b)) => Ok(Self::Scalar(a * b)),
            (Self::Scalar(a), Self::Tensor(idxs, mut b)) => {
                b.mapv_inplace(|bk| a * bk);
                Ok(Self::Tensor(idxs, b))
            },
            (Self::Tensor(idxs, mut a), Self::Scalar(b)) => {
                a.mapv_inplace(|ak| ak * b);
                Ok(Self::Tensor(idxs, a))
            },
            (Self::Tensor(idxs_a, a), Self::Tensor(idxs_b, b)) => {
                let mut common: Vec<Qubit> =
                    Vec::with_capacity(idxs_a.len().max(idxs_b.len()));
                // bras of the left factor match kets of the right; any other
                // repeat of an identical index is an error
                for idx_a in idxs_a.iter() {
                    if idx_a.is_ket() { continue; }
                    let has_match =
                        idxs_b.iter().any(|idx_b| idx_a.matches_with(idx_b));
                    let has_dup = idxs_b.contains(idx_a);
                    if has_match {
                        common.push(idx_a.qubit().clone());
                    } else if has_dup {
                        return Err(ContractDuplicateIndex(idx_a.clone()));
                    }
                }
                for idx_b in idxs_b.iter() {
                    if idx_b.is_bra() { continue; }
                    let has_match = common.contains(idx_b.qubit());
                    let has_dup = idxs_a.contains(idx_b);
                    if !has_match && has_dup {
                        return Err(ContractDuplicateIndex(idx_b.clone()));
                    }
                }
                Ok(Self::do_contract(common, idxs_a, a, idxs_b, b))
            },
        }
    }

    fn add(&self, rhs: &Self) -> TensorResult<Self> {
        match (self, rhs) {
            (Self::Scalar(a), Self::Scalar(b)) => Ok(Self::Scalar(a + b)),
            (Self::Tensor(idxs_a, a), Self::Tensor(idxs_b, b)) => {
                let mut lhs = Self::Tensor(idxs_a.clone(), a.clone());
                let mut rhs = Self::Tensor(idxs_b.clone(), b.clone());
                lhs.sort_indices();
                rhs.sort_indices();
                match (lhs, rhs) {
                    (Self::Tensor(il, dl), Self::Tensor(ir, dr)) => {
                        if il != ir { return Err(AddIndexMismatch); }
                        let sum =
                            dl.as_standard_layout().into_owned()
                            + dr.as_standard_layout().into_owned().view();
                        Ok(Self::Tensor(il, sum.into_shared()))
                    },
                    _ => unreachable!(),
                }
            },
            _ => Err(AddIndexMismatch),
        }
    }

    fn scalar_mul_inplace(&mut self, scalar: C64) {
        match self {
            Self::Scalar(a) => { *a *= scalar; },
            Self::Tensor(_, data) => { *data *= scalar; },
        }
    }

    fn approx_eq(&self, other: &Self, thresh: f64) -> bool {
        match (self, other) {
            (Self::Scalar(l), Self::Scalar(r)) => (*l - *r).norm() < thresh,
            (Self::Tensor(idxs_l, data_l), Self::Tensor(idxs_r, data_r)) => {
                idxs_l == idxs_r
                    && data_l.iter().zip(data_r)
                        .all(|(l, r)| (*l - *r).norm() < thresh)
            },
            _ => false,
        }
    }

    fn max_abs(&self) -> (C64, f64) {
        match self {
            Self::Scalar(a) => (*a, a.norm()),
            Self::Tensor(_, data) => {
                data.iter()
                    .fold((C64::from(0.0), 0.0), |(acc, nacc), ak| {
                        let nk = ak.norm();
                        if nk > nacc { (*ak, nk) } else { (acc, nacc) }
                    })
            },
        }
    }
}

impl fmt::Display for TensorData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(a) => {
                a.fmt(f)?;
                write!(f, " {{ }}")?;
            },
            Self::Tensor(idxs, a) => {
                a.fmt(f)?;
                write!(f, "\n{{ ")?;
                let n_idxs = idxs.len();
                for (k, idx) in idxs.iter().enumerate() {
                    idx.fmt(f)?;
                    if k < n_idxs - 1 { write!(f, ", ")?; }
                }
                write!(f, " }}")?;
            },
        }
        Ok(())
    }
}

/// Basic implementation of an abstract tensor object.
///
/// A `Tensor` comprises complex elements and a series of [`Ix`] wire indices,
/// one length-2 axis per index. Rank-0 (scalar) and rank > 0 quantities are
/// distinguished internally. Tensors are thread-safe and relatively cheap to
/// clone; cloned tensors share their element storage.
#[derive(Clone, PartialEq, Debug)]
pub struct Tensor(TensorData);

impl From<C64> for Tensor {
    fn from(val: C64) -> Self { Self(TensorData::Scalar(val)) }
}

impl Tensor {
    /// Create a new tensor using a generator function over index values.
    ///
    /// The generator is called with one index value (0 or 1) per *unique*
    /// index passed to this function, in the order in which they are passed.
    pub fn new<I, F>(indices: I, elems: F) -> Self
    where
        I: IntoIterator<Item = Ix>,
        F: FnMut(&[usize]) -> C64,
    {
        Self(TensorData::new(indices, elems))
    }

    /// Create a new rank-0 (scalar) tensor.
    pub fn scalar<T>(val: T) -> Self
    where T: Into<C64>
    {
        Self(TensorData::Scalar(val.into()))
    }

    /// Create a new tensor from an n-dimensional array.
    ///
    /// Fails if duplicate indices are provided or the dimensions of the array
    /// do not match those of the indices. The array's dimensions match if it
    /// has one axis of length 2 per index or is one-dimensional with length
    /// 2<sup><i>n</i></sup> for *n* indices.
    pub fn from_array<I, S, D>(indices: I, array: nd::ArrayBase<S, D>)
        -> TensorResult<Self>
    where
        I: IntoIterator<Item = Ix>,
        S: nd::DataOwned<Elem = C64>,
        D: nd::Dimension,
    {
        TensorData::from_array(indices, array).map(Self)
    }

    /// Create the identity operator on a set of qubits.
    pub fn identity<'a, I>(qubits: I) -> Self
    where I: IntoIterator<Item = &'a Qubit>
    {
        let qs: Vec<Qubit> = qubits.into_iter().cloned().collect();
        let n = qs.len();
        let indices: Vec<Ix> =
            qs.iter().cloned().map(Ix::Ket)
            .chain(qs.iter().cloned().map(Ix::Bra))
            .collect();
        Self::new(
            indices,
            |ix| {
                let eq = (0..n).all(|k| ix[k] == ix[n + k]);
                if eq { 1.0.into() } else { 0.0.into() }
            },
        )
    }

    /// Create the operator tensor of a 2^k × 2^k matrix over an ordered qubit
    /// tuple, with row (ket) and column (bra) axes both following the tuple
    /// order.
    pub fn from_matrix(qubits: &[Qubit], matrix: nd::Array2<C64>)
        -> TensorResult<Self>
    {
        let k = qubits.len();
        let dim = 1_usize << k;
        if matrix.shape() != [dim, dim] {
            let idxs: Box<[Ix]> =
                qubits.iter().cloned().map(Ix::Ket)
                .chain(qubits.iter().cloned().map(Ix::Bra))
                .collect();
            let shape: Box<[usize]> = matrix.shape().iter().copied().collect();
            return Err(IncompatibleShape(idxs, shape));
        }
        let indices: Vec<Ix> =
            qubits.iter().cloned().map(Ix::Ket)
            .chain(qubits.iter().cloned().map(Ix::Bra))
            .collect();
        let reshaped =
            matrix.into_shape(vec![2; 2 * k]).unwrap();
        Self::from_array(indices, reshaped)
    }

    /// Create the ket tensor of a length-2^k vector over an ordered qubit
    /// tuple.
    pub fn from_vector(qubits: &[Qubit], vector: nd::Array1<C64>)
        -> TensorResult<Self>
    {
        let indices: Vec<Ix> =
            qubits.iter().cloned().map(Ix::Ket).collect();
        Self::from_array(indices, vector)
    }

    /// Flatten into a 2^k × 2^k matrix, with row (ket) and column (bra) axes
    /// both following `order`.
    ///
    /// The tensor's indices must be exactly one ket and one bra per qubit of
    /// `order`.
    pub fn to_matrix(&self, order: &[Qubit]) -> TensorResult<nd::Array2<C64>> {
        let k = order.len();
        let desired: Vec<Ix> =
            order.iter().cloned().map(Ix::Ket)
            .chain(order.iter().cloned().map(Ix::Bra))
            .collect();
        let mut t = self.clone();
        if t.rank() != desired.len() {
            let got: Box<[Ix]> =
                t.indices().map(|ix| ix.as_slice()).unwrap_or(&[]).into();
            return Err(IncompatibleShape(got, vec![2; desired.len()].into()));
        }
        for (pos, want) in desired.iter().enumerate() {
            let found =
                t.indices().unwrap().iter().enumerate().skip(pos)
                .find_map(|(k_src, idx)| (idx == want).then_some(k_src));
            match found {
                Some(k_src) => { t.0.swap_indices_pos(pos, k_src); },
                None => { return Err(MissingIndex(want.clone())); },
            }
        }
        let dim = 1_usize << k;
        match t.0 {
            TensorData::Scalar(a) => Ok(nd::array![[a]]),
            TensorData::Tensor(_, data) => {
                let mat =
                    data.as_standard_layout()
                    .into_shape((dim, dim))
                    .unwrap()
                    .into_owned();
                Ok(mat)
            },
        }
    }

    /// Flatten a pure ket tensor into a length-2^k vector following `order`.
    pub fn to_vector(&self, order: &[Qubit]) -> TensorResult<nd::Array1<C64>> {
        let desired: Vec<Ix> =
            order.iter().cloned().map(Ix::Ket).collect();
        let mut t = self.clone();
        if t.rank() != desired.len() {
            let got: Box<[Ix]> =
                t.indices().map(|ix| ix.as_slice()).unwrap_or(&[]).into();
            return Err(IncompatibleShape(got, vec![2; desired.len()].into()));
        }
        for (pos, want) in desired.iter().enumerate() {
            let found =
                t.indices().unwrap().iter().enumerate().skip(pos)
                .find_map(|(k_src, idx)| (idx == want).then_some(k_src));
            match found {
                Some(k_src) => { t.0.swap_indices_pos(pos, k_src); },
                None => { return Err(MissingIndex(want.clone())); },
            }
        }
        match t.0 {
            TensorData::Scalar(a) => Ok(nd::array![a]),
            TensorData::Tensor(_, data) => {
                let dim = 1_usize << desired.len();
                let vec =
                    data.as_standard_layout()
                    .into_shape(dim)
                    .unwrap()
                    .into_owned();
                Ok(vec)
            },
        }
    }

    /// Return `true` if `self` has rank 0.
    pub fn is_scalar(&self) -> bool {
        matches!(self.0, TensorData::Scalar(_))
    }

    /// If `self` has rank 0, return its value as a single scalar.
    pub fn as_scalar(&self) -> Option<C64> {
        match &self.0 {
            TensorData::Scalar(a) => Some(*a),
            _ => None,
        }
    }

    /// Return a reference to all indices, if `self` has rank > 0.
    pub fn indices(&self) -> Option<&Vec<Ix>> { self.0.indices() }

    /// Return the rank of `self`.
    pub fn rank(&self) -> usize { self.0.rank() }

    /// Return `true` if `self` has the given index.
    pub fn has_index(&self, index: &Ix) -> bool {
        self.indices().is_some_and(|idxs| idxs.contains(index))
    }

    /// Return all qubits appearing on the ket side, in index order.
    pub fn ket_qubits(&self) -> Vec<Qubit> {
        self.indices()
            .map(|idxs| {
                idxs.iter()
                    .filter_map(|idx| {
                        idx.is_ket().then(|| idx.qubit().clone())
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Return all qubits appearing on the bra side, in index order.
    pub fn bra_qubits(&self) -> Vec<Qubit> {
        self.indices()
            .map(|idxs| {
                idxs.iter()
                    .filter_map(|idx| {
                        idx.is_bra().then(|| idx.qubit().clone())
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Return the conjugate transpose of `self` as a new `Tensor`.
    ///
    /// Every element is conjugated and every ket index becomes a bra index
    /// and vice versa. This operation is involutive.
    pub fn dagger(&self) -> Self { Self(self.0.dagger()) }

    /// Return a copy with every qubit label replaced through `map`.
    pub fn relabel<F>(&self, map: F) -> Self
    where F: FnMut(&Qubit) -> Qubit
    {
        let mut new = self.clone();
        new.0.relabel(map);
        new
    }

    /// Apply the canonical ordering to the indices of `self` in place.
    ///
    /// This operation has no bearing on the complexity of contractions.
    pub fn sort_indices(&mut self) { self.0.sort_indices(); }

    /// Apply the canonical ordering to the indices of `self`.
    pub fn sorted_indices(mut self) -> Self {
        self.0.sort_indices();
        self
    }

    /// Contract `self` with `rhs` over all bra indices of `self` matching ket
    /// indices of `rhs` on the same qubit, consuming both.
    ///
    /// For operator tensors this is the product `self · rhs` (`rhs` acts
    /// first). Non-contracted indices of `self` are placed before those of
    /// `rhs` in the result.
    pub fn contract(self, rhs: Self) -> TensorResult<Self> {
        self.0.contract(rhs.0).map(Self)
    }

    /// Return the elementwise sum of `self` and `rhs`.
    ///
    /// Both tensors must carry exactly the same index set.
    pub fn add(&self, rhs: &Self) -> TensorResult<Self> {
        self.0.add(&rhs.0).map(Self)
    }

    /// Multiply by a scalar, modifying `self` in place.
    pub fn scalar_mul_inplace(&mut self, scalar: C64) {
        self.0.scalar_mul_inplace(scalar);
    }

    /// Multiply by a scalar, consuming `self`.
    pub fn scalar_mul(mut self, scalar: C64) -> Self {
        self.0.scalar_mul_inplace(scalar);
        self
    }

    /// Return the trace of an operator tensor whose ket and bra qubit sets
    /// coincide.
    pub fn trace(&self) -> TensorResult<C64> {
        if let Some(a) = self.as_scalar() { return Ok(a); }
        let mut kets = self.ket_qubits();
        kets.sort();
        let mat = self.to_matrix(&kets)?;
        Ok(mat.diag().iter().sum())
    }

    /// Return the element of largest modulus together with that modulus.
    pub fn max_abs(&self) -> (C64, f64) { self.0.max_abs() }

    /// Return `true` if `self` and `other` denote the same tensor to within
    /// `thresh`.
    ///
    /// Both tensors must carry identical index sets (compared after sorting)
    /// and the modulus of the difference between any two corresponding
    /// elements must be less than `thresh`.
    pub fn approx_eq(&self, other: &Self, thresh: f64) -> bool {
        let lhs = self.clone().sorted_indices();
        let rhs = other.clone().sorted_indices();
        lhs.0.approx_eq(&rhs.0, thresh)
    }

    /// Like [`approx_eq`][Self::approx_eq], but mods out a global phase
    /// before comparing.
    ///
    /// The phase is fixed by the element of largest modulus in `self`; this
    /// comparison is lossy by design and the tolerance is part of the result.
    pub fn approx_eq_phase(&self, other: &Self, thresh: f64) -> bool {
        let lhs = self.clone().sorted_indices();
        let rhs = other.clone().sorted_indices();
        let (al, nl) = lhs.max_abs();
        let (ar, nr) = rhs.max_abs();
        if nl < thresh || nr < thresh {
            return lhs.0.approx_eq(&rhs.0, thresh);
        }
        let phase = (al / nl) / (ar / nr);
        let rhs = rhs.scalar_mul(phase);
        lhs.0.approx_eq(&rhs.0, thresh)
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::c;

    fn q(k: i64) -> Qubit { Qubit::Int(k) }

    fn hadamard(k: i64) -> Tensor {
        use std::f64::consts::FRAC_1_SQRT_2 as RT2;
        Tensor::new(
            [Ix::Ket(q(k)), Ix::Bra(q(k))],
            |ix| if ix == [1, 1] { c!(-RT2) } else { c!(RT2) },
        )
    }

    #[test]
    fn identity_contract() {
        let id = Tensor::identity(&[q(0), q(1)]);
        let h = hadamard(0);
        let prod = h.clone().contract(id).unwrap();
        assert_eq!(prod.rank(), 4);
        assert!(prod.has_index(&Ix::Ket(q(0))));
        assert!(prod.has_index(&Ix::Bra(q(1))));
    }

    #[test]
    fn dagger_involutive() {
        let h = hadamard(3);
        assert!(h.dagger().dagger().approx_eq(&h, 1e-15));
    }

    #[test]
    fn h_squared_is_identity() {
        let h = hadamard(0);
        let prod = h.clone().contract(h).unwrap();
        let id = Tensor::identity(&[q(0)]);
        assert!(prod.approx_eq(&id, 1e-12));
    }

    #[test]
    fn contract_duplicate_is_error() {
        // two ket-side-only tensors on the same qubit cannot be contracted:
        // the duplicate ket has no bra to match against
        let v = Tensor::from_vector(
            &[q(0)],
            nd::array![c!(1.0), c!(0.0)],
        ).unwrap();
        assert!(v.clone().contract(v).is_err());
    }

    #[test]
    fn matrix_roundtrip() {
        let qs = [q(0), q(1)];
        let mut mat = nd::Array2::<C64>::zeros((4, 4));
        mat[[0, 0]] = c!(1.0);
        mat[[1, 2]] = c!(i 1.0);
        mat[[2, 1]] = c!(i (-1.0));
        mat[[3, 3]] = c!(1.0);
        let t = Tensor::from_matrix(&qs, mat.clone()).unwrap();
        let back = t.to_matrix(&qs).unwrap();
        assert_eq!(mat, back);
        // axis transposition follows qubit order
        let swapped = t.to_matrix(&[q(1), q(0)]).unwrap();
        assert_eq!(swapped[[2, 1]], c!(i 1.0));
    }

    #[test]
    fn phase_equivalence() {
        let h = hadamard(0);
        let ph = h.clone().scalar_mul(c!(e 0.83));
        assert!(!h.approx_eq(&ph, 1e-6));
        assert!(h.approx_eq_phase(&ph, 1e-6));
    }

    #[test]
    fn trace_of_identity() {
        let id = Tensor::identity(&[q(0), q(1)]);
        let tr = id.trace().unwrap();
        assert!((tr - c!(4.0)).norm() < 1e-15);
    }
}
