//! Regularization parameters and model selectors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VfError};

/// Ambrosio–Tortorelli surface energy variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AtModel {
    /// Linear damage term `(1 - V)`.
    At1,
    /// Quadratic damage term `(1 - V)^2`.
    #[default]
    At2,
}

impl AtModel {
    /// Normalization `c_v = ∫_0^1 sqrt(w(s)) ds` of the damage term.
    pub fn cv(self) -> f64 {
        match self {
            AtModel::At1 => 2.0 / 3.0,
            AtModel::At2 => 0.5,
        }
    }
}

impl TryFrom<u8> for AtModel {
    type Error = VfError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(AtModel::At1),
            2 => Ok(AtModel::At2),
            other => Err(VfError::Config(format!(
                "unknown damage model order {other}, expected 1 or 2"
            ))),
        }
    }
}

impl From<AtModel> for u8 {
    fn from(model: AtModel) -> u8 {
        match model {
            AtModel::At1 => 1,
            AtModel::At2 => 2,
        }
    }
}

/// Treatment of the volumetric part of the elastic energy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Unilateral {
    /// Full elastic energy is degraded.
    #[default]
    None,
    /// Compressive volumetric strain keeps full stiffness and does not
    /// drive damage.
    NoCompression,
}

impl FromStr for Unilateral {
    type Err = VfError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Unilateral::None),
            "no-compression" | "nocompression" => Ok(Unilateral::NoCompression),
            other => Err(VfError::Config(format!("unknown unilateral policy '{other}'"))),
        }
    }
}

impl TryFrom<String> for Unilateral {
    type Error = VfError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Unilateral> for String {
    fn from(policy: Unilateral) -> String {
        policy.to_string()
    }
}

impl fmt::Display for Unilateral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unilateral::None => write!(f, "none"),
            Unilateral::NoCompression => write!(f, "no-compression"),
        }
    }
}

/// Phase-field regularization properties.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VfProp {
    /// Regularization length ε
    pub epsilon: f64,
    /// Residual stiffness η
    pub eta: f64,
    /// Residual stiffness used when assembling the U Jacobian; `None` uses `eta`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pc_eta: Option<f64>,
    pub at: AtModel,
    /// Nodes with `VIrrev <= irrev_tol` are held at `V = 0`
    pub irrev_tol: f64,
    /// Trace threshold of the no-compression split
    pub unilateral_threshold: f64,
}

impl Default for VfProp {
    fn default() -> Self {
        Self {
            epsilon: 0.1,
            eta: 1e-5,
            pc_eta: None,
            at: AtModel::At2,
            irrev_tol: 1e-2,
            unilateral_threshold: 0.0,
        }
    }
}

impl VfProp {
    pub fn jacobian_eta(&self) -> f64 {
        self.pc_eta.unwrap_or(self.eta)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.epsilon > 0.0) {
            return Err(VfError::Config(format!(
                "epsilon must be positive, got {}",
                self.epsilon
            )));
        }
        if !(self.eta >= 0.0) || self.pc_eta.is_some_and(|e| !(e >= 0.0)) {
            return Err(VfError::Config("residual stiffness must be non-negative".into()));
        }
        if !self.irrev_tol.is_finite() || !self.unilateral_threshold.is_finite() {
            return Err(VfError::Config("tolerances must be finite".into()));
        }
        Ok(())
    }
}

/// Far-field stress in Voigt order `s11, s22, s33, s23, s13, s12`.
pub type VoigtStress = [f64; 6];

/// Optional load terms of the displacement problem.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Coupling {
    /// Pressure acting on crack faces through `∇V`.
    pub has_crack_pressure: bool,
    /// Tractions from an in-situ stress on faces without a Dirichlet marker.
    pub has_insitu: bool,
    /// In-situ stress at the bottom of the domain (`z = z_min`).
    pub insitu_min: VoigtStress,
    /// In-situ stress at the top of the domain (`z = z_max`).
    pub insitu_max: VoigtStress,
}

impl Coupling {
    /// Linear interpolation of the in-situ stress at height `z`.
    pub fn insitu_at(&self, z: f64, z_min: f64, z_max: f64) -> VoigtStress {
        let t = if z_max > z_min {
            ((z - z_min) / (z_max - z_min)).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let mut s = [0.0; 6];
        for (c, slot) in s.iter_mut().enumerate() {
            *slot = self.insitu_min[c] + t * (self.insitu_max[c] - self.insitu_min[c]);
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_model_round_trip() {
        assert_eq!(AtModel::try_from(1).unwrap(), AtModel::At1);
        assert_eq!(u8::from(AtModel::At2), 2);
        assert!(AtModel::try_from(3).is_err());
    }

    #[test]
    fn unilateral_parse() {
        assert_eq!("none".parse::<Unilateral>().unwrap(), Unilateral::None);
        assert_eq!(
            "No-Compression".parse::<Unilateral>().unwrap(),
            Unilateral::NoCompression
        );
        assert!("tension-only".parse::<Unilateral>().is_err());
    }

    #[test]
    fn insitu_interpolates_linearly() {
        let coupling = Coupling {
            has_insitu: true,
            insitu_min: [0.0, 0.0, -2.0, 0.0, 0.0, 0.0],
            insitu_max: [0.0, 0.0, -1.0, 0.0, 0.0, 1.0],
            ..Default::default()
        };
        let s = coupling.insitu_at(0.5, 0.0, 2.0);
        assert!((s[2] + 1.75).abs() < 1e-12);
        assert!((s[5] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn vfprop_validation() {
        assert!(VfProp::default().validate().is_ok());
        let bad = VfProp {
            epsilon: 0.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
