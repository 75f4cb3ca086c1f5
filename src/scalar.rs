use std::{
    fmt::Debug,
    ops::{
        Add,
        AddAssign,
        Mul,
        Neg,
        Sub,
        SubAssign,
    },
};

use num::{
    Zero,
    complex::Complex64,
};

/// Scalar type a field cell holds.
///
/// The update kernels are written once against this trait and instantiated
/// for real (`f64`) and complex (`Complex64`) arithmetic. Amplitude
/// tracking only makes sense for real fields, the NTFF transform only for
/// complex ones; those constraints are enforced where the operations live.
pub trait FieldScalar:
    Copy
    + Debug
    + Default
    + Send
    + Sync
    + 'static
    + Zero
    + Add<Output = Self>
    + Sub<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + Mul<f64, Output = Self>
{
    /// Whether this scalar carries a quadrature component.
    const COMPLEX: bool;

    /// Number of `f64` words a value occupies on the wire (halo exchange,
    /// gather).
    const WORDS: usize;

    /// Value of the harmonic hard source at the given phase.
    ///
    /// Real fields take the in-phase part only; complex fields carry the
    /// full rotating phasor.
    fn harmonic(phase: f64) -> Self;

    fn from_re(re: f64) -> Self;

    /// Lossless view of the value as a phasor; real scalars carry no
    /// quadrature part.
    fn into_complex(self) -> Complex64;

    fn magnitude(self) -> f64;

    fn is_finite(self) -> bool;

    fn write_words(self, out: &mut [f64]);

    fn read_words(words: &[f64]) -> Self;
}

impl FieldScalar for f64 {
    const COMPLEX: bool = false;
    const WORDS: usize = 1;

    fn harmonic(phase: f64) -> Self {
        phase.sin()
    }

    fn from_re(re: f64) -> Self {
        re
    }

    fn into_complex(self) -> Complex64 {
        Complex64::new(self, 0.0)
    }

    fn magnitude(self) -> f64 {
        self.abs()
    }

    fn is_finite(self) -> bool {
        f64::is_finite(self)
    }

    fn write_words(self, out: &mut [f64]) {
        out[0] = self;
    }

    fn read_words(words: &[f64]) -> Self {
        words[0]
    }
}

impl FieldScalar for Complex64 {
    const COMPLEX: bool = true;
    const WORDS: usize = 2;

    fn harmonic(phase: f64) -> Self {
        Complex64::new(phase.sin(), phase.cos())
    }

    fn from_re(re: f64) -> Self {
        Complex64::new(re, 0.0)
    }

    fn into_complex(self) -> Complex64 {
        self
    }

    fn magnitude(self) -> f64 {
        self.norm()
    }

    fn is_finite(self) -> bool {
        self.re.is_finite() && self.im.is_finite()
    }

    fn write_words(self, out: &mut [f64]) {
        out[0] = self.re;
        out[1] = self.im;
    }

    fn read_words(words: &[f64]) -> Self {
        Complex64::new(words[0], words[1])
    }
}

#[cfg(test)]
mod tests {
    use num::complex::Complex64;

    use crate::scalar::FieldScalar;

    #[test]
    fn it_roundtrips_words() {
        let mut words = [0.0; 2];
        let value = Complex64::new(1.5, -2.5);
        value.write_words(&mut words);
        assert_eq!(Complex64::read_words(&words), value);

        let mut word = [0.0];
        3.25f64.write_words(&mut word);
        assert_eq!(f64::read_words(&word), 3.25);
    }

    #[test]
    fn it_evaluates_the_harmonic_source() {
        assert_eq!(f64::harmonic(0.0), 0.0);
        let z = Complex64::harmonic(0.0);
        assert_eq!(z, Complex64::new(0.0, 1.0));
        assert!((Complex64::harmonic(0.7).norm() - 1.0).abs() < 1e-12);
    }
}
