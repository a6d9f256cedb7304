// Copyright 2026 The stella-post Authors. All rights reserved.
// Stella Post-Processing Suite - Weighted Reducer

//! Marginalisation of g(t, s, mu, vpa) onto z, mu and vpa.
//!
//! Every output point is the sum over the two dropped axes of
//!
//! ```text
//! g[t,s,mu,vpa] * mu_weights[z,mu] * vpa_weights[vpa] * dl_over_B[z]
//! ```
//!
//! The sum is factored into contractions instead of a (vpa, mu, z) loop:
//!
//! ```text
//! W[z,mu]        = mu_weights[z,mu] * dl_over_B[z]
//! Wmu[mu]        = sum_z W[z,mu]
//! Gv[t,s,mu]     = sum_vpa g[t,s,mu,vpa] * vpa_weights[vpa]
//! g_vs_tsz       = Gv . W^T
//! g_vs_tsmu      = Gv * Wmu
//! g_vs_tsvpa     = sum_mu g[t,s,mu,vpa] * vpa_weights[vpa] * Wmu[mu]
//! ```

use ndarray::{Array3, ArrayView4, Axis};

use crate::error::{check_axis, Result};
use crate::types::GeometryWeights;

/// The three marginals of one reduction.
#[derive(Debug, Clone, PartialEq)]
pub struct ReducedMarginals {
    pub g_vs_tsz: Array3<f64>,
    pub g_vs_tsmu: Array3<f64>,
    pub g_vs_tsvpa: Array3<f64>,
}

/// Reduce the velocity distribution onto z, mu and vpa.
///
/// `g_vs_tsvpaz` only provides the z extent; its time, species and vpa axes
/// must agree with `g_vs_tsmuvpa`. Any disagreement between the arrays and
/// the weights fails with [`ShapeMismatch`](crate::PostError::ShapeMismatch).
pub fn reduce(
    g_vs_tsmuvpa: ArrayView4<f64>,
    g_vs_tsvpaz: ArrayView4<f64>,
    weights: &GeometryWeights,
) -> Result<ReducedMarginals> {
    let (nt, ns, nmu, nvpa) = g_vs_tsmuvpa.dim();
    let (nt_z, ns_z, nvpa_z, nz) = g_vs_tsvpaz.dim();
    check_axis("time", nt, nt_z)?;
    check_axis("species", ns, ns_z)?;
    check_axis("vpa", nvpa, nvpa_z)?;

    let (nz_w, nmu_w) = weights.mu_weights.dim();
    check_axis("z", nz, nz_w)?;
    check_axis("mu", nmu, nmu_w)?;
    check_axis("vpa", nvpa, weights.vpa_weights.len())?;
    check_axis("z", nz, weights.dl_over_b.len())?;

    let w_zmu = &weights.mu_weights * &weights.dl_over_b.view().insert_axis(Axis(1));
    let w_mu = w_zmu.sum_axis(Axis(0));

    // g[t,s,mu,vpa] * vpa_weights[vpa]
    let g_weighted = &g_vs_tsmuvpa * &weights.vpa_weights;
    let g_v = g_weighted.sum_axis(Axis(3));

    let g_vs_tsmu = &g_v * &w_mu;

    let g_vs_tsvpa = (&g_weighted * &w_mu.view().insert_axis(Axis(1))).sum_axis(Axis(2));

    let g_v_flat = g_v.into_shape((nt * ns, nmu))?;
    let g_tsz_flat = g_v_flat.dot(&w_zmu.t());
    let g_vs_tsz = Array3::from_shape_vec((nt, ns, nz), g_tsz_flat.iter().copied().collect())?;

    Ok(ReducedMarginals {
        g_vs_tsz,
        g_vs_tsmu,
        g_vs_tsvpa,
    })
}
