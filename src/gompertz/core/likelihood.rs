//! Joint negative log-likelihood, its exact gradient, and the random-effect
//! Hessian.
//!
//! Purpose
//! -------
//! Assemble `jnll = nll_omega + nll_epsilon + nll_obs` for given fixed
//! parameters and random effects, and differentiate it.
//!
//! Key behaviors
//! -------------
//! - [`evaluate_joint`] builds `Q`, scores `Omega_input` and each
//!   `Epsilon_input` column against it, runs the recursion and sums the
//!   observation terms of non-missing records.
//! - [`joint_gradient`] returns the gradient with respect to the flat fixed
//!   layout and the flat random layout. The `log_kappa` entry includes
//!   `−½(n_t + 1)·tr(Q⁻¹ ∂Q/∂log κ)`, taken column by column from the shared
//!   Cholesky factor.
//! - [`random_gradient`] and [`random_hessian`] give the first and second
//!   derivatives in the random effects only, as used by the Laplace layer:
//!   `H = blockdiag(Q, …, Q) + Jᵀ diag(f″) J`.
//!
//! Invariants & assumptions
//! ------------------------
//! - A non-positive-definite `Q` makes `jnll = +∞`. The `log_kappa` gradient
//!   entry is then `NaN`; other entries stay finite.
//! - Missing counts contribute nothing to `jnll` or its derivatives, but
//!   their `log_chat` still feeds the next record.
//!
//! Testing notes
//! -------------
//! - Gradient and Hessian are checked against central differences for both
//!   observation models; missing-record and model-switch properties are
//!   tested on small fixtures.
use nalgebra_sparse::{CooMatrix, CscMatrix};
use ndarray::Array1;

use crate::gompertz::{
    core::{
        data::GompertzData,
        gmrf::{GmrfDensity, SparseCholesky, quad_form},
        mesh::SpdeMesh,
        observation::{ObservationModel, ObservationTerms},
        params::{DerivedQuantities, FixedParams, RandomEffects},
        recursion::{LatentFields, backpropagate, compute_latent, latent_jacobian},
    },
    errors::{GompertzError, GompertzResult},
};

/// Read-only inputs shared by every evaluation: the mesh and the
/// observation model.
#[derive(Debug, Clone, Copy)]
pub struct LikelihoodContext<'a> {
    pub mesh: &'a SpdeMesh,
    pub observation: ObservationModel,
}

impl<'a> LikelihoodContext<'a> {
    pub fn new(mesh: &'a SpdeMesh, observation: ObservationModel) -> Self {
        Self { mesh, observation }
    }

    /// Mesh size must equal the number of covariate rows.
    ///
    /// # Errors
    /// - [`GompertzError::MeshDataMismatch`].
    pub fn check_data(&self, data: &GompertzData) -> GompertzResult<()> {
        if self.mesh.n_x() != data.n_x() {
            return Err(GompertzError::MeshDataMismatch {
                mesh_n_x: self.mesh.n_x(),
                data_n_x: data.n_x(),
            });
        }
        Ok(())
    }
}

/// Result of one joint evaluation.
///
/// - `jnll`: total joint NLL.
/// - `jnll_comp`: `[omega, epsilon, observations]`.
/// - `jnll_i`: per-record observation NLL, `0` for missing records.
/// - `terms`: per-record observation terms, `None` for missing records.
/// - `latent`, `derived`: recursion output and SPDE summaries.
/// - `gmrf`: the factored precision used for the penalties.
#[derive(Debug)]
pub struct JointEvaluation {
    pub jnll: f64,
    pub jnll_comp: [f64; 3],
    pub jnll_i: Array1<f64>,
    pub terms: Vec<Option<ObservationTerms>>,
    pub latent: LatentFields,
    pub derived: DerivedQuantities,
    pub gmrf: GmrfDensity,
}

/// Gradient of the joint NLL in the flat fixed and flat random layouts.
#[derive(Debug, Clone, PartialEq)]
pub struct JointGradient {
    pub fixed: Array1<f64>,
    pub random: Array1<f64>,
}

/// Evaluate the joint NLL.
///
/// # Errors
/// - [`GompertzError::MeshDataMismatch`] and dimension errors for
///   mismatched inputs.
pub fn evaluate_joint(
    ctx: &LikelihoodContext<'_>, params: &FixedParams, random: &RandomEffects,
    data: &GompertzData,
) -> GompertzResult<JointEvaluation> {
    ctx.check_data(data)?;
    let latent = compute_latent(params, random, data)?;
    let gmrf = GmrfDensity::new(ctx.mesh.precision(params.log_kappa));

    let nll_omega = gmrf.nll(random.omega_input.view())?;
    let mut nll_epsilon = 0.0;
    for column in random.epsilon_input.columns() {
        nll_epsilon += gmrf.nll(column)?;
    }

    let mut jnll_i = Array1::zeros(data.n_i());
    let mut terms = Vec::with_capacity(data.n_i());
    for (i, count) in data.counts.iter().enumerate() {
        let record = count.map(|c| ctx.observation.nll_terms(c, latent.log_chat[i], params.theta_z));
        if let Some(t) = &record {
            jnll_i[i] = t.nll;
        }
        terms.push(record);
    }
    let nll_obs = jnll_i.sum();

    Ok(JointEvaluation {
        jnll: nll_omega + nll_epsilon + nll_obs,
        jnll_comp: [nll_omega, nll_epsilon, nll_obs],
        jnll_i,
        terms,
        latent,
        derived: params.derived(),
        gmrf,
    })
}

/// Evaluate the joint NLL and its exact gradient.
///
/// # Errors
/// - As [`evaluate_joint`].
pub fn joint_gradient(
    ctx: &LikelihoodContext<'_>, params: &FixedParams, random: &RandomEffects,
    data: &GompertzData,
) -> GompertzResult<(JointEvaluation, JointGradient)> {
    let eval = evaluate_joint(ctx, params, random, data)?;
    let grad = joint_gradient_at(&eval, ctx, params, random, data)?;
    Ok((eval, grad))
}

/// Gradient at an existing evaluation of the same inputs.
///
/// # Errors
/// - Dimension errors from the reverse pass.
pub fn joint_gradient_at(
    eval: &JointEvaluation, ctx: &LikelihoodContext<'_>, params: &FixedParams,
    random: &RandomEffects, data: &GompertzData,
) -> GompertzResult<JointGradient> {
    let n_p = params.n_p();
    let random_grad = random_gradient_at(eval, params, random, data)?;

    let d_log_kappa = eval.gmrf.factor().map_or(f64::NAN, |factor| {
        let dq = ctx.mesh.precision_dlog_kappa(params.log_kappa);
        let n_fields = (data.n_t() + 1) as f64;
        let mut quad = quad_form(&dq, random.omega_input.view());
        for column in random.epsilon_input.columns() {
            quad += quad_form(&dq, column);
        }
        -0.5 * n_fields * trace_of_solve(factor, &dq) + 0.5 * quad
    });

    let (mut d_log_sd, mut d_log_clustersize) = (0.0, 0.0);
    for t in eval.terms.iter().flatten() {
        d_log_sd += t.d_log_sd;
        d_log_clustersize += t.d_log_clustersize;
    }

    let adj = backpropagate(params, data, &eval.latent, observation_weights(eval).view())?;
    let mut fixed = Array1::zeros(FixedParams::n_fixed(n_p));
    for (k, v) in adj.alpha.iter().enumerate() {
        fixed[k] = *v;
    }
    fixed[n_p] = adj.phi;
    fixed[n_p + 1] = adj.log_tau_e;
    fixed[n_p + 2] = adj.log_tau_o;
    fixed[n_p + 3] = d_log_kappa;
    fixed[n_p + 4] = adj.rho;
    fixed[n_p + 5] = d_log_sd;
    fixed[n_p + 6] = d_log_clustersize;

    Ok(JointGradient { fixed, random: random_grad })
}

/// Gradient of the joint NLL in the flat random layout only.
///
/// # Errors
/// - As [`evaluate_joint`].
pub fn random_gradient(
    ctx: &LikelihoodContext<'_>, params: &FixedParams, random: &RandomEffects,
    data: &GompertzData,
) -> GompertzResult<Array1<f64>> {
    let eval = evaluate_joint(ctx, params, random, data)?;
    random_gradient_at(&eval, params, random, data)
}

/// Random-effect gradient at an existing evaluation.
///
/// # Errors
/// - Dimension errors from the reverse pass.
pub fn random_gradient_at(
    eval: &JointEvaluation, params: &FixedParams, random: &RandomEffects, data: &GompertzData,
) -> GompertzResult<Array1<f64>> {
    let adj = backpropagate(params, data, &eval.latent, observation_weights(eval).view())?;
    let mut epsilon = adj.epsilon_input;
    for (t, column) in random.epsilon_input.columns().into_iter().enumerate() {
        let q_v = eval.gmrf.gradient(column)?;
        let mut target = epsilon.column_mut(t);
        target += &q_v;
    }
    let omega = adj.omega_input + eval.gmrf.gradient(random.omega_input.view())?;
    Ok(RandomEffects { epsilon_input: epsilon, omega_input: omega }.to_flat())
}

/// Hessian of the joint NLL in the random effects.
///
/// # Errors
/// - As [`evaluate_joint`].
pub fn random_hessian(
    ctx: &LikelihoodContext<'_>, params: &FixedParams, random: &RandomEffects,
    data: &GompertzData,
) -> GompertzResult<CscMatrix<f64>> {
    let eval = evaluate_joint(ctx, params, random, data)?;
    Ok(random_hessian_at(&eval, params, data, 0.0))
}

/// Random-effect Hessian at an existing evaluation, plus `shift·I`.
pub fn random_hessian_at(
    eval: &JointEvaluation, params: &FixedParams, data: &GompertzData, shift: f64,
) -> CscMatrix<f64> {
    let (n_x, n_t) = (data.n_x(), data.n_t());
    let n_u = RandomEffects::n_random(n_x, n_t);
    let mut coo = CooMatrix::new(n_u, n_u);
    for block in 0..=n_t {
        let offset = block * n_x;
        for (i, j, v) in eval.gmrf.precision().triplet_iter() {
            coo.push(offset + i, offset + j, *v);
        }
    }
    let rows = latent_jacobian(params, data);
    for (row, term) in rows.iter().zip(&eval.terms) {
        let Some(term) = term else { continue };
        for &(a, va) in row {
            for &(b, vb) in row {
                coo.push(a, b, term.d2 * va * vb);
            }
        }
    }
    if shift != 0.0 {
        for k in 0..n_u {
            coo.push(k, k, shift);
        }
    }
    CscMatrix::from(&coo)
}

// ---- Helper methods ----

fn observation_weights(eval: &JointEvaluation) -> Array1<f64> {
    eval.terms.iter().map(|t| t.map_or(0.0, |t| t.d1)).collect()
}

/// `tr(M⁻¹ A)` from one solve per column of `A`, for a factored `M`.
pub(crate) fn trace_of_solve(factor: &SparseCholesky, a: &CscMatrix<f64>) -> f64 {
    let n = a.ncols();
    let mut trace = 0.0;
    let mut rhs = Array1::<f64>::zeros(n);
    for j in 0..n {
        rhs.fill(0.0);
        let col = a.col(j);
        for (&i, &v) in col.row_indices().iter().zip(col.values()) {
            rhs[i] = v;
        }
        trace += factor.solve_vec(rhs.view())[j];
    }
    trace
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gompertz::core::{
        mesh::tests::path_mesh,
        recursion::tests::{
            small_data, small_params, small_random, year_major_data, year_major_random,
        },
    };
    use approx::assert_relative_eq;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Component bookkeeping, missing-record exclusion and the model switch.
    // - The exact joint gradient and random Hessian against finite
    //   differences, including Trusted year-major records.
    // - Non-PD precision and mesh/data mismatch.
    //
    // They intentionally DO NOT cover:
    // - The Laplace marginal (laplace.rs).
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // jnll is the sum of its components, and the observation component is the
    // sum of per-record terms.
    //
    // Given
    // -----
    // - The small fixture under Poisson.
    //
    // Expect
    // ------
    // - jnll = Σ jnll_comp; jnll_comp[2] = Σ jnll_i; jnll_i = 0 where missing.
    fn components_sum_to_total() {
        // Arrange
        let mesh = path_mesh(3);
        let ctx = LikelihoodContext::new(&mesh, ObservationModel::Poisson);
        let data = small_data();

        // Act
        let eval = evaluate_joint(&ctx, &small_params(), &small_random(), &data).expect("valid");

        // Assert
        assert_relative_eq!(eval.jnll, eval.jnll_comp.iter().sum::<f64>(), epsilon = 1e-12);
        assert_relative_eq!(eval.jnll_comp[2], eval.jnll_i.sum(), epsilon = 1e-12);
        let missing = data.counts.iter().position(Option::is_none).expect("fixture has NA");
        assert_eq!(eval.jnll_i[missing], 0.0);
        assert!(eval.terms[missing].is_none());
    }

    #[test]
    // Purpose
    // -------
    // Marking a record missing removes exactly its term and leaves log_chat
    // untouched.
    //
    // Given
    // -----
    // - The small fixture, and a copy with record 1 set to missing.
    //
    // Expect
    // ------
    // - jnll drops by the original jnll_i[1]; log_chat identical.
    fn missing_record_is_excluded_but_propagates() {
        // Arrange
        let mesh = path_mesh(3);
        let ctx = LikelihoodContext::new(&mesh, ObservationModel::PoissonLognormal);
        let full = small_data();
        let mut holed = full.clone();
        holed.counts[1] = None;
        let (p, r) = (small_params(), small_random());

        // Act
        let a = evaluate_joint(&ctx, &p, &r, &full).expect("valid");
        let b = evaluate_joint(&ctx, &p, &r, &holed).expect("valid");

        // Assert
        assert_relative_eq!(b.jnll, a.jnll - a.jnll_i[1], epsilon = 1e-10);
        assert_eq!(a.latent.log_chat, b.latent.log_chat);
    }

    #[test]
    // Purpose
    // -------
    // The observation model changes the objective.
    //
    // Given
    // -----
    // - Identical inputs under Poisson and Poisson-lognormal.
    //
    // Expect
    // ------
    // - Identical GMRF components, different observation components.
    fn observation_model_switch_changes_nll() {
        // Arrange
        let mesh = path_mesh(3);
        let (p, r, d) = (small_params(), small_random(), small_data());

        // Act
        let pois = evaluate_joint(&LikelihoodContext::new(&mesh, ObservationModel::Poisson), &p, &r, &d)
            .expect("valid");
        let pln = evaluate_joint(
            &LikelihoodContext::new(&mesh, ObservationModel::PoissonLognormal),
            &p,
            &r,
            &d,
        )
        .expect("valid");

        // Assert
        assert_eq!(pois.jnll_comp[0], pln.jnll_comp[0]);
        assert_eq!(pois.jnll_comp[1], pln.jnll_comp[1]);
        assert!((pois.jnll_comp[2] - pln.jnll_comp[2]).abs() > 1e-3);
        assert_eq!(pois.latent.log_chat, pln.latent.log_chat);
    }

    fn assert_joint_gradient_matches_fd(
        ctx: &LikelihoodContext<'_>, p: &FixedParams, r: &RandomEffects, d: &GompertzData,
    ) {
        let (n_p, n_x, n_t) = (d.n_p(), d.n_x(), d.n_t());
        let h = 1e-6;
        let jnll =
            |p: &FixedParams, r: &RandomEffects| evaluate_joint(ctx, p, r, d).expect("valid").jnll;

        let (_, grad) = joint_gradient(ctx, p, r, d).expect("valid");

        let theta = p.to_theta();
        for k in 0..theta.len() {
            let (mut up, mut dn) = (theta.clone(), theta.clone());
            up[k] += h;
            dn[k] -= h;
            let fd = (jnll(&FixedParams::from_theta(up.view(), n_p).expect("finite"), r)
                - jnll(&FixedParams::from_theta(dn.view(), n_p).expect("finite"), r))
                / (2.0 * h);
            assert_relative_eq!(grad.fixed[k], fd, epsilon = 1e-5, max_relative = 1e-5);
        }
        let flat = r.to_flat();
        for k in 0..flat.len() {
            let (mut up, mut dn) = (flat.clone(), flat.clone());
            up[k] += h;
            dn[k] -= h;
            let fd = (jnll(p, &RandomEffects::from_flat(up.view(), n_x, n_t).expect("finite"))
                - jnll(p, &RandomEffects::from_flat(dn.view(), n_x, n_t).expect("finite")))
                / (2.0 * h);
            assert_relative_eq!(grad.random[k], fd, epsilon = 1e-5, max_relative = 1e-5);
        }
    }

    fn assert_random_hessian_matches_fd(
        ctx: &LikelihoodContext<'_>, p: &FixedParams, r: &RandomEffects, d: &GompertzData,
    ) {
        let (n_x, n_t) = (d.n_x(), d.n_t());
        let h = 1e-6;
        let flat = r.to_flat();
        let n_u = flat.len();

        let hess = random_hessian(ctx, p, r, d).expect("valid");

        let mut dense = ndarray::Array2::<f64>::zeros((n_u, n_u));
        for (i, j, v) in hess.triplet_iter() {
            dense[[i, j]] += *v;
        }
        let grad_at = |v: &Array1<f64>| {
            let moved = RandomEffects::from_flat(v.view(), n_x, n_t).expect("finite");
            random_gradient(ctx, p, &moved, d).expect("valid")
        };
        for k in 0..n_u {
            let (mut up, mut dn) = (flat.clone(), flat.clone());
            up[k] += h;
            dn[k] -= h;
            let (gu, gd) = (grad_at(&up), grad_at(&dn));
            for j in 0..n_u {
                let fd = (gu[j] - gd[j]) / (2.0 * h);
                assert_relative_eq!(dense[[j, k]], fd, epsilon = 1e-5, max_relative = 1e-5);
                assert_relative_eq!(dense[[j, k]], dense[[k, j]], epsilon = 1e-12);
            }
        }
    }

    #[test]
    // Purpose
    // -------
    // The exact gradient matches central differences in every coordinate.
    //
    // Given
    // -----
    // - The small fixture under both observation models, h = 1e-6.
    //
    // Expect
    // ------
    // - Fixed and random gradients within 1e-5 (absolute or relative).
    fn joint_gradient_matches_finite_differences() {
        let mesh = path_mesh(3);
        let (p, r, d) = (small_params(), small_random(), small_data());
        for model in [ObservationModel::Poisson, ObservationModel::PoissonLognormal] {
            assert_joint_gradient_matches_fd(&LikelihoodContext::new(&mesh, model), &p, &r, &d);
        }
    }

    #[test]
    // Purpose
    // -------
    // The random Hessian is the Jacobian of the random gradient.
    //
    // Given
    // -----
    // - The small fixture under both models, central differences of
    //   random_gradient with h = 1e-6.
    //
    // Expect
    // ------
    // - Entrywise agreement within 1e-5; the matrix is symmetric.
    fn random_hessian_matches_finite_differences() {
        let mesh = path_mesh(3);
        let (p, r, d) = (small_params(), small_random(), small_data());
        for model in [ObservationModel::Poisson, ObservationModel::PoissonLognormal] {
            assert_random_hessian_matches_fd(&LikelihoodContext::new(&mesh, model), &p, &r, &d);
        }
    }

    #[test]
    // Purpose
    // -------
    // Gradient and Hessian stay exact when Trusted year-major records chain
    // each record to the previous slot of another vertex.
    //
    // Given
    // -----
    // - x_s = [0, 1, 0, 1], t_i = [0, 0, 1, 1] on a 2-vertex path, both
    //   observation models.
    //
    // Expect
    // ------
    // - Both finite-difference checks pass; the last record's log_chat
    //   chains from record 2.
    fn year_major_trusted_records_differentiate_exactly() {
        let mesh = path_mesh(2);
        let (p, r, d) = (small_params(), year_major_random(), year_major_data());
        for model in [ObservationModel::Poisson, ObservationModel::PoissonLognormal] {
            // Arrange
            let ctx = LikelihoodContext::new(&mesh, model);

            // Act
            let eval = evaluate_joint(&ctx, &p, &r, &d).expect("valid");

            // Assert
            let lc = &eval.latent.log_chat;
            let expected = p.rho * lc[2]
                + eval.latent.eta_x[1]
                + eval.latent.omega_x[1]
                + eval.latent.epsilon_xt[[1, 1]];
            assert_relative_eq!(lc[3], expected, epsilon = 1e-14);
            assert_joint_gradient_matches_fd(&ctx, &p, &r, &d);
            assert_random_hessian_matches_fd(&ctx, &p, &r, &d);
        }
    }

    #[test]
    // Purpose
    // -------
    // A non-PD precision yields an infinite objective, not an error.
    //
    // Given
    // -----
    // - One vertex with G0 = 1, G1 = 0, G2 = −2 and log κ = 0, so Q = −1.
    //
    // Expect
    // ------
    // - jnll = +∞; the log κ gradient entry is NaN.
    fn non_pd_precision_gives_infinite_nll() {
        // Arrange
        let mesh = SpdeMesh::from_triplets(1, &[(0, 0, 1.0)], &[], &[(0, 0, -2.0)])
            .expect("valid structure");
        let ctx = LikelihoodContext::new(&mesh, ObservationModel::Poisson);
        let data = crate::gompertz::core::recursion::tests::single_site_data(vec![Some(2.0); 3]);
        let params = FixedParams::new(ndarray::array![1.0], 0.0, 0.0, 0.0, 0.0, 0.5, [0.0, 0.0])
            .expect("finite");

        // Act
        let (eval, grad) =
            joint_gradient(&ctx, &params, &RandomEffects::zeros(1, 3), &data).expect("no error");

        // Assert
        assert_eq!(eval.jnll, f64::INFINITY);
        assert!(grad.fixed[1 + 3].is_nan());
    }

    #[test]
    // Purpose
    // -------
    // Mesh and data sizes must agree.
    //
    // Given
    // -----
    // - A 2-vertex mesh with the 3-vertex fixture.
    //
    // Expect
    // ------
    // - MeshDataMismatch { mesh_n_x: 2, data_n_x: 3 }.
    fn mesh_data_mismatch_is_rejected() {
        let mesh = path_mesh(2);
        let ctx = LikelihoodContext::new(&mesh, ObservationModel::Poisson);
        let err = evaluate_joint(&ctx, &small_params(), &small_random(), &small_data())
            .expect_err("mismatch");
        assert_eq!(err, GompertzError::MeshDataMismatch { mesh_n_x: 2, data_n_x: 3 });
    }
}
