//! Tolerance abstraction to allow scalar or vector absolute tolerances

use std::ops::Index;

use crate::Float;

/// Absolute tolerance, either one value for every component or one value per
/// component.
///
/// Converts from `Float`, `[Float; N]`, `&[Float]` and `Vec<Float>` so option
/// builders can take either shape with `into`.
#[derive(Clone, Debug, PartialEq)]
pub enum Tolerance {
    Scalar(Float),
    Vector(Vec<Float>),
}

impl Tolerance {
    /// Check the tolerance against a problem of `n` components.
    ///
    /// Returns a description of the problem if a value is negative or if a
    /// vector tolerance has the wrong length.
    pub fn check(&self, n: usize) -> Result<(), String> {
        match self {
            Tolerance::Scalar(v) if *v < 0.0 => Err(format!("atol = {v} is negative")),
            Tolerance::Scalar(_) => Ok(()),
            Tolerance::Vector(vs) if vs.len() != n => Err(format!(
                "atol has {} components but the problem has {n}",
                vs.len()
            )),
            Tolerance::Vector(vs) => match vs.iter().position(|v| *v < 0.0) {
                Some(i) => Err(format!("atol[{i}] = {} is negative", vs[i])),
                None => Ok(()),
            },
        }
    }

    /// Number of per-component values, `None` for a scalar tolerance.
    pub fn len(&self) -> Option<usize> {
        match self {
            Tolerance::Scalar(_) => None,
            Tolerance::Vector(vs) => Some(vs.len()),
        }
    }
}

impl From<Float> for Tolerance {
    fn from(val: Float) -> Self {
        Tolerance::Scalar(val)
    }
}

impl From<&[Float]> for Tolerance {
    fn from(val: &[Float]) -> Self {
        Tolerance::Vector(val.to_vec())
    }
}

impl<const N: usize> From<[Float; N]> for Tolerance {
    fn from(val: [Float; N]) -> Self {
        Tolerance::Vector(val.to_vec())
    }
}

impl From<Vec<Float>> for Tolerance {
    fn from(val: Vec<Float>) -> Self {
        Tolerance::Vector(val)
    }
}

impl Index<usize> for Tolerance {
    type Output = Float;

    fn index(&self, index: usize) -> &Self::Output {
        match self {
            Tolerance::Scalar(v) => v,
            Tolerance::Vector(vs) => &vs[index],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Tolerance;

    #[test]
    fn scalar_indexes_every_component() {
        let tol = Tolerance::from(1e-8);
        assert_eq!(tol[0], 1e-8);
        assert_eq!(tol[41], 1e-8);
        assert!(tol.check(3).is_ok());
    }

    #[test]
    fn vector_length_is_checked() {
        let tol = Tolerance::from([1e-8, 1e-6]);
        assert!(tol.check(2).is_ok());
        assert!(tol.check(3).is_err());
        assert!(Tolerance::from(vec![1e-8, -1.0]).check(2).is_err());
    }
}
