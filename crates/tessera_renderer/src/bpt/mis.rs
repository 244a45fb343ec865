use tessera_core::ConfigNode;

use super::fullpath::FullPath;
use crate::{RenderError, RenderResult};

/// Multiple importance sampling weight of a bidirectional strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MisWeight {
    /// Uniform over the strategies that can sample the path.
    Simple,
    /// Power heuristic, evaluated incrementally from pdf ratios.
    Power { beta: f32 },
    /// Power heuristic, evaluating every `p_i` directly.
    PowerNaive { beta: f32 },
}

impl MisWeight {
    /// Read `mis_weight { type, beta_coeff }` from a renderer element.
    pub fn configure(node: &ConfigNode<'_>) -> RenderResult<Self> {
        let mis_node = node.child("mis_weight").ok_or_else(|| {
            RenderError::Invalid("missing 'mis_weight' element".to_string())
        })?;
        let ty = mis_node.required_attribute("type")?;
        let weight = match ty {
            "simple" => MisWeight::Simple,
            "power" => MisWeight::Power {
                beta: mis_node.child_value_or_default("beta_coeff", 2.0)?,
            },
            "powernaive" => MisWeight::PowerNaive {
                beta: mis_node.child_value_or_default("beta_coeff", 2.0)?,
            },
            other => {
                return Err(RenderError::Invalid(format!("unknown MIS weight type '{}'", other)));
            }
        };
        log::info!("MIS weight: {:?}", weight);
        Ok(weight)
    }

    pub fn evaluate(&self, path: &FullPath<'_, '_>) -> f32 {
        match *self {
            MisWeight::Simple => simple(path),
            MisWeight::Power { beta } => power(path, beta),
            MisWeight::PowerNaive { beta } => power_naive(path, beta),
        }
    }
}

fn simple(path: &FullPath<'_, '_>) -> f32 {
    let n = path.len();
    let strategies = (0..=n).filter(|&i| !path.fullpath_pdf_is_zero(i)).count();
    1.0 / strategies as f32
}

fn power(path: &FullPath<'_, '_>, beta: f32) -> f32 {
    let n = path.len();
    let s = path.s;
    let ps = path.evaluate_fullpath_pdf(s);
    if ps == 0.0 {
        return 0.0;
    }

    // p_s / p_s
    let mut inv_weight = 1.0;

    // p_i / p_s for i = s-1 down to 0
    let mut pi_div_ps = 1.0;
    let mut prev_pdf_is_zero = false;
    for i in (0..s).rev() {
        if path.fullpath_pdf_is_zero(i) {
            prev_pdf_is_zero = true;
            continue;
        }
        if prev_pdf_is_zero {
            pi_div_ps = path.evaluate_fullpath_pdf(i) / ps;
            prev_pdf_is_zero = false;
        } else {
            let ratio = path.evaluate_fullpath_pdf_ratio(i);
            if ratio == 0.0 {
                break;
            }
            pi_div_ps /= ratio;
        }
        inv_weight += pi_div_ps.powf(beta);
    }

    // p_i / p_s for i = s+1 to n
    pi_div_ps = 1.0;
    prev_pdf_is_zero = false;
    for i in s..n {
        if path.fullpath_pdf_is_zero(i + 1) {
            prev_pdf_is_zero = true;
            continue;
        }
        if prev_pdf_is_zero {
            pi_div_ps = path.evaluate_fullpath_pdf(i + 1) / ps;
            prev_pdf_is_zero = false;
        } else {
            let ratio = path.evaluate_fullpath_pdf_ratio(i);
            if ratio == 0.0 {
                break;
            }
            pi_div_ps *= ratio;
        }
        inv_weight += pi_div_ps.powf(beta);
    }

    1.0 / inv_weight
}

fn power_naive(path: &FullPath<'_, '_>, beta: f32) -> f32 {
    let ps = path.evaluate_fullpath_pdf(path.s);
    if ps == 0.0 {
        return 0.0;
    }
    let mut inv_weight = 0.0;
    for i in 0..=path.len() {
        let pi = path.evaluate_fullpath_pdf(i);
        if pi > 0.0 {
            inv_weight += (pi / ps).powf(beta);
        }
    }
    1.0 / inv_weight
}
