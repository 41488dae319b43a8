use crate::Utils::logger::save_trajectories_to_csv;
use crate::numerical::optimal_control::ocp_error::{OcpError, OcpResult};
use crate::numerical::optimal_control::shooting_transcriber::DecisionLayout;
use nalgebra::{DMatrix, DVector};
use std::path::Path;

/// Trajectories read off a decision vector: node states and per-interval controls.
#[derive(Debug, Clone, PartialEq)]
pub struct OcpSolution {
    /// `k*dt`, k = 0..=nk
    pub t_grid: Vec<f64>,
    pub state_names: Vec<String>,
    pub control_names: Vec<String>,
    /// `states[i][k]` = x_i at node k, nk+1 samples per state
    pub states: Vec<Vec<f64>>,
    /// `controls[i][k]` = u_i on interval k, nk samples per control
    pub controls: Vec<Vec<f64>>,
}

impl OcpSolution {
    pub fn nk(&self) -> usize {
        self.t_grid.len().saturating_sub(1)
    }

    pub fn state(&self, name: &str) -> Option<&[f64]> {
        let i = self.state_names.iter().position(|s| s == name)?;
        Some(&self.states[i])
    }

    pub fn control(&self, name: &str) -> Option<&[f64]> {
        let i = self.control_names.iter().position(|s| s == name)?;
        Some(&self.controls[i])
    }

    /// Step form of control `i` for plotting: `(t_grid, [u_0, u_0, u_1, ..., u_{nk-1}])`.
    /// The first value is repeated so that sample j is the control held up to `t_j`.
    pub fn control_step_profile(&self, i: usize) -> Option<(Vec<f64>, Vec<f64>)> {
        let u = self.controls.get(i)?;
        let first = *u.first()?;
        let mut profile = Vec::with_capacity(u.len() + 1);
        profile.push(first);
        profile.extend_from_slice(u);
        Some((self.t_grid.clone(), profile))
    }

    /// (nk+1) x nx
    pub fn states_matrix(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.t_grid.len(), self.states.len(), |k, i| self.states[i][k])
    }

    /// nk x nu
    pub fn controls_matrix(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.nk(), self.controls.len(), |k, i| self.controls[i][k])
    }

    pub fn save_to_csv(&self, path: &Path) -> OcpResult<()> {
        save_trajectories_to_csv(
            path,
            &self.t_grid,
            &self.state_names,
            &self.states,
            &self.control_names,
            &self.controls,
        )?;
        Ok(())
    }
}

pub struct SolutionExtractor;

impl SolutionExtractor {
    /// Copies every block of `v` into per-component sequences. No interpolation.
    pub fn extract(
        layout: &DecisionLayout,
        v: &DVector<f64>,
        dt: f64,
        state_names: &[String],
        control_names: &[String],
    ) -> OcpResult<OcpSolution> {
        if v.len() != layout.nv() {
            return Err(OcpError::configuration(format!(
                "solution vector has length {}, the decision layout expects {}",
                v.len(),
                layout.nv()
            )));
        }
        OcpError::check_len("state names", layout.nx(), state_names.len())?;
        OcpError::check_len("control names", layout.nu(), control_names.len())?;
        let nk = layout.nk();
        let v = v.as_slice();

        let mut states = vec![Vec::with_capacity(nk + 1); layout.nx()];
        for k in 0..=nk {
            for (i, x) in layout.state(v, k).iter().enumerate() {
                states[i].push(*x);
            }
        }
        let mut controls = vec![Vec::with_capacity(nk); layout.nu()];
        for k in 0..nk {
            for (i, u) in layout.control(v, k).iter().enumerate() {
                controls[i].push(*u);
            }
        }

        Ok(OcpSolution {
            t_grid: (0..=nk).map(|k| k as f64 * dt).collect(),
            state_names: state_names.to_vec(),
            control_names: control_names.to_vec(),
            states,
            controls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: &[&str]) -> Vec<String> {
        n.iter().map(|s| s.to_string()).collect()
    }

    fn solution() -> OcpSolution {
        // nx = 2, nu = 1, nk = 2: [x0 x0' u0 x1 x1' u1 x2 x2']
        let layout = DecisionLayout::new(2, 1, 2);
        let v = DVector::from_vec(vec![1.0, 10.0, 0.1, 2.0, 20.0, 0.2, 3.0, 30.0]);
        SolutionExtractor::extract(&layout, &v, 0.5, &names(&["c", "T"]), &names(&["q"]))
            .unwrap()
    }

    #[test]
    fn test_extract_blocks() {
        let sol = solution();
        assert_eq!(sol.t_grid, vec![0.0, 0.5, 1.0]);
        assert_eq!(sol.state("c").unwrap(), &[1.0, 2.0, 3.0]);
        assert_eq!(sol.state("T").unwrap(), &[10.0, 20.0, 30.0]);
        assert_eq!(sol.control("q").unwrap(), &[0.1, 0.2]);
        assert!(sol.state("q").is_none());
        assert_eq!(sol.states_matrix().shape(), (3, 2));
        assert_eq!(sol.states_matrix()[(2, 1)], 30.0);
        assert_eq!(sol.controls_matrix(), DMatrix::from_column_slice(2, 1, &[0.1, 0.2]));
    }

    #[test]
    fn test_step_profile_repeats_first_value() {
        let (t, u) = solution().control_step_profile(0).unwrap();
        assert_eq!(t.len(), u.len());
        assert_eq!(u, vec![0.1, 0.1, 0.2]);
        assert!(solution().control_step_profile(1).is_none());
    }

    #[test]
    fn test_wrong_length_is_configuration_error() {
        let layout = DecisionLayout::new(2, 1, 2);
        let err = SolutionExtractor::extract(
            &layout,
            &DVector::zeros(7),
            0.5,
            &names(&["c", "T"]),
            &names(&["q"]),
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }
}
