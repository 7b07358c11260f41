//! Finite element descriptor: how many DoFs live on each kind of entity.

use crate::dof_error::DofError;
use crate::topology::reference::entities_per_cell;
use serde::{Deserialize, Serialize};

/// DoF multiplicities of a finite element.
///
/// `dofs_per_object[d]` is the number of DoFs on every entity of dimension
/// `d`; index `dim` is the cell interior.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiniteElement {
    dim: usize,
    dofs_per_object: [usize; 4],
}

impl FiniteElement {
    /// Element with explicit multiplicities, one entry per dimension `0..=dim`.
    pub fn new(dim: usize, dofs_per_object: &[usize]) -> Result<Self, DofError> {
        if !(1..=3).contains(&dim) {
            return Err(DofError::Precondition(format!(
                "finite elements exist in 1, 2 or 3 dimensions, not {dim}"
            )));
        }
        if dofs_per_object.len() != dim + 1 {
            return Err(DofError::Precondition(format!(
                "expected {} multiplicities for a {dim}-dimensional element, got {}",
                dim + 1,
                dofs_per_object.len()
            )));
        }
        let mut dpo = [0; 4];
        dpo[..=dim].copy_from_slice(dofs_per_object);
        Ok(Self {
            dim,
            dofs_per_object: dpo,
        })
    }

    /// Continuous tensor-product Lagrange element `Q_degree`.
    pub fn lagrange(dim: usize, degree: usize) -> Result<Self, DofError> {
        if degree == 0 {
            return Err(DofError::Precondition(
                "continuous Lagrange elements need degree >= 1".into(),
            ));
        }
        let inner = degree - 1;
        let dpo: Vec<usize> = (0..=dim).map(|d| inner.pow(d as u32)).collect();
        Self::new(dim, &dpo)
    }

    /// Discontinuous element: all `(degree+1)^dim` DoFs on the cell interior.
    pub fn discontinuous(dim: usize, degree: usize) -> Result<Self, DofError> {
        let mut dpo = vec![0; dim + 1];
        dpo[dim] = (degree + 1).pow(dim as u32);
        Self::new(dim, &dpo)
    }

    /// Vector-valued element with `n` copies of every DoF.
    pub fn with_components(mut self, n: usize) -> Self {
        for d in &mut self.dofs_per_object {
            *d *= n;
        }
        self
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn dofs_per_vertex(&self) -> usize {
        self.dofs_per_object[0]
    }

    pub fn dofs_per_object(&self, dim: usize) -> usize {
        self.dofs_per_object.get(dim).copied().unwrap_or(0)
    }

    pub fn dofs_per_cell(&self) -> usize {
        (0..=self.dim)
            .map(|d| entities_per_cell(self.dim, d) * self.dofs_per_object[d])
            .sum()
    }
}
