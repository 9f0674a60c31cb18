//! Classical (hazard-curve driven) loss curves.

use crate::error::{Error, Result};
use crate::numeric::{interp, pairwise_diff};
use crate::vulnerability::{Lrem, VulnerabilityFunction};

use super::LossCurve;

fn check_hazard_curve(imls: &[f64], poes: &[f64]) -> Result<()> {
    if imls.is_empty() || imls.len() != poes.len() {
        return Err(Error::config("hazard_curve", "levels and poes must be non-empty and of equal length"));
    }
    if !imls.windows(2).all(|w| w[0] < w[1]) {
        return Err(Error::config("hazard_curve", "levels must be strictly increasing"));
    }
    Ok(())
}

/// Probabilities of occurrence of the intervals around each vulnerability
/// level. The hazard curve is read at the interval bounds, saturating at its
/// own first and last level rather than extrapolating.
pub fn probabilities_of_occurrence(vf: &VulnerabilityFunction, hazard_imls: &[f64], hazard_poes: &[f64]) -> Vec<f64> {
    let poes: Vec<f64> = vf
        .mean_imls()
        .iter()
        .map(|iml| interp(*iml, hazard_imls, hazard_poes))
        .collect();
    pairwise_diff(&poes)
}

/// Loss-ratio curve of `vf` under a hazard curve, with a precomputed LREM.
pub fn classical_with_lrem(
    vf: &VulnerabilityFunction,
    lrem: &Lrem,
    hazard_imls: &[f64],
    hazard_poes: &[f64],
) -> Result<LossCurve> {
    check_hazard_curve(hazard_imls, hazard_poes)?;
    let poos = probabilities_of_occurrence(vf, hazard_imls, hazard_poes);
    let poes = lrem
        .matrix
        .iter()
        .map(|row| row.iter().zip(&poos).map(|(s, po)| s * po).sum::<f64>())
        .collect();
    LossCurve::new(lrem.loss_ratios.clone(), poes)
}

/// Loss-ratio curve of `vf` under a hazard curve. `steps` subdivides each
/// interval between consecutive mean loss ratios, 0 and 1 included.
pub fn classical(vf: &VulnerabilityFunction, hazard_imls: &[f64], hazard_poes: &[f64], steps: usize) -> Result<LossCurve> {
    let lrem = vf.loss_ratio_exceedance_matrix(steps)?;
    classical_with_lrem(vf, &lrem, hazard_imls, hazard_poes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imt::Imt;
    use crate::vulnerability::Distribution;

    #[test]
    fn test_poos_sum_to_curve_span() {
        let vf = VulnerabilityFunction::new(
            "vf",
            Imt::Pga,
            vec![0.1, 0.2, 0.4, 0.6],
            vec![0.05, 0.08, 0.2, 0.4],
            vec![0.5, 0.3, 0.2, 0.1],
            Distribution::LogNormal,
        )
        .unwrap();
        let imls = [0.01, 0.08, 0.17, 0.26, 0.36, 0.55, 0.70];
        let poes = [0.99, 0.96, 0.89, 0.82, 0.70, 0.40, 0.01];
        let poos = probabilities_of_occurrence(&vf, &imls, &poes);
        assert_eq!(poos.len(), 4);
        assert!(poos.iter().all(|p| *p >= 0.0));
        // telescoping: first bound 0.05 minus last bound 0.7
        let first = 0.99 - 0.03 * (0.04 / 0.07);
        assert!((poos.iter().sum::<f64>() - (first - 0.01)).abs() < 1e-12);
    }

    #[test]
    fn test_bad_hazard_curve_rejected() {
        let vf = VulnerabilityFunction::new(
            "vf",
            Imt::Pga,
            vec![0.1, 0.2],
            vec![0.05, 0.08],
            vec![0.0, 0.0],
            Distribution::LogNormal,
        )
        .unwrap();
        assert!(classical(&vf, &[0.2, 0.1], &[0.5, 0.4], 2).is_err());
        assert!(classical(&vf, &[0.1, 0.2], &[0.5], 2).is_err());
        assert!(classical(&vf, &[0.1, 0.2], &[0.5, 0.4], 0).is_err());
    }
}
