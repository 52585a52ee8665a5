use std::collections::BTreeMap;

use super::error::{Error, Result};
use super::pbf::Pbf;
use super::source::Sense;

/// The emitted target model: binary variables 0..n−1 with energy
/// scale·(Σ_{i<j} Q_ij·x_i·x_j + Σ a_i·x_i + offset), reported under the
/// original objective sense.
///
/// Pair coefficients are stored once, keyed (i, j) with i < j; the matrix
/// accessors render the two common layouts from this canonical form.
#[derive(Clone, Debug, PartialEq)]
pub struct QuboForm {
    pub linear: Vec<f64>,
    pub quadratic: BTreeMap<(u32, u32), f64>,
    pub offset: f64,
    pub scale: f64,
    pub sense: Sense,
}

impl QuboForm {
    pub fn num_variables(&self) -> usize {
        self.linear.len()
    }

    /// Energy of a target assignment.
    pub fn evaluate(&self, x: &[bool]) -> f64 {
        let lin: f64 = self
            .linear
            .iter()
            .zip(x)
            .filter(|(_, &b)| b)
            .map(|(c, _)| c)
            .sum();
        let quad: f64 = self
            .quadratic
            .iter()
            .filter(|(&(i, j), _)| x[i as usize] && x[j as usize])
            .map(|(_, c)| c)
            .sum();
        self.scale * (quad + lin + self.offset)
    }

    /// Symmetric-matrix convention: linear terms on the diagonal, each pair
    /// coefficient split in half across (i,j) and (j,i); the energy is
    /// xᵀQx + offset.
    pub fn symmetric_matrix(&self) -> Vec<Vec<f64>> {
        let n = self.num_variables();
        let mut q = vec![vec![0.0; n]; n];
        for (i, &c) in self.linear.iter().enumerate() {
            q[i][i] = c;
        }
        for (&(i, j), &c) in &self.quadratic {
            q[i as usize][j as usize] = c / 2.0;
            q[j as usize][i as usize] = c / 2.0;
        }
        q
    }

    /// Upper-triangular convention: linear terms on the diagonal, each pair
    /// coefficient whole at (i, j) with i < j.
    pub fn upper_triangular_matrix(&self) -> Vec<Vec<f64>> {
        let n = self.num_variables();
        let mut q = vec![vec![0.0; n]; n];
        for (i, &c) in self.linear.iter().enumerate() {
            q[i][i] = c;
        }
        for (&(i, j), &c) in &self.quadratic {
            q[i as usize][j as usize] = c;
        }
        q
    }
}

/// Walk the Hamiltonian into the canonical quadratic form. Constant terms
/// accumulate into the offset, singletons into the affine vector, pairs into
/// the pair map; anything larger means quadratization did not finish and is
/// fatal.
pub fn emit(h: &Pbf, num_targets: usize, sense: Sense) -> Result<QuboForm> {
    let mut form = QuboForm {
        linear: vec![0.0; num_targets],
        quadratic: BTreeMap::new(),
        offset: 0.0,
        scale: 1.0,
        sense,
    };
    for (omega, c) in h.iter() {
        let mut vars = omega.iter().copied();
        match omega.len() {
            0 => form.offset += c,
            1 => {
                let v = vars.next().unwrap();
                let slot = form.linear.get_mut(v.0 as usize).ok_or_else(|| {
                    Error::CompilationFailure(format!("term references unknown target {v}"))
                })?;
                *slot += c;
            }
            2 => {
                let i = vars.next().unwrap().0;
                let j = vars.next().unwrap().0;
                if j as usize >= num_targets {
                    return Err(Error::CompilationFailure(format!(
                        "term references unknown target x{j}"
                    )));
                }
                *form.quadratic.entry((i, j)).or_insert(0.0) += c;
            }
            d => return Err(Error::QuadratizationIncomplete(d)),
        }
    }
    form.quadratic.retain(|_, c| *c != 0.0);
    Ok(form)
}
