//! Rescaling of decoded SI values.
//!
//! Coordinates, currents and heights are stored in meters and amperes. The
//! hand-off to numeric tools multiplies them by 1e9 (nanometers,
//! nanoamperes) so that the values have convenient magnitudes.

use ndarray::{Array, ArrayBase, Data, Dimension};
use std::ops::Mul;

/// Scale applied to a decoded field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Scale {
    /// Multiply by 1e9: meters to nanometers, amperes to nanoamperes.
    #[default]
    Nano,
    /// Keep SI units.
    Raw,
}

impl Scale {
    pub fn factor(self) -> f64 {
        match self {
            Scale::Nano => 1e9,
            Scale::Raw => 1.,
        }
    }
}

/// An element type that can be rescaled.
pub trait Scalable: Copy + Mul<Output = Self> {
    /// Converts the scale factor to `Self`.
    fn from_factor(factor: f64) -> Self;
}

impl Scalable for f32 {
    fn from_factor(factor: f64) -> f32 {
        factor as f32
    }
}

impl Scalable for f64 {
    fn from_factor(factor: f64) -> f64 {
        factor
    }
}

/// Extension trait for rescaling arrays.
///
/// # Example
///
/// ```
/// use ndarray::array;
/// use nanonis_read::{Scale, ScaleExt};
///
/// let x_m = array![0.5f32, -2.];
/// assert_eq!(x_m.to_scale(Scale::Nano), array![5e8f32, -2e9]);
/// assert_eq!(x_m.to_scale(Scale::Raw), x_m);
/// ```
pub trait ScaleExt {
    type Output;

    /// Returns a copy multiplied element-wise by `scale.factor()`.
    fn to_scale(&self, scale: Scale) -> Self::Output;
}

impl<A, S, D> ScaleExt for ArrayBase<S, D>
where
    A: Scalable,
    S: Data<Elem = A>,
    D: Dimension,
{
    type Output = Array<A, D>;

    fn to_scale(&self, scale: Scale) -> Array<A, D> {
        let factor = A::from_factor(scale.factor());
        self.mapv(|v| v * factor)
    }
}

impl ScaleExt for f64 {
    type Output = f64;

    fn to_scale(&self, scale: Scale) -> f64 {
        self * scale.factor()
    }
}
