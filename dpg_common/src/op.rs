//! Arithmetic boilerplate for transparent numeric newtypes.

/// Implements the standard arithmetic traits for a tuple newtype wrapping a numeric value.
///
/// `op!(binary T, Add, add)` produces `impl Add for T`, and so on for `inplace` (e.g. `SubAssign`)
/// and `unary` (e.g. `Neg`) variants.
#[macro_export]
macro_rules! op {
    (binary $ty:ident, $trait:ident, $fn:ident) => {
        impl std::ops::$trait for $ty {
            type Output = Self;

            fn $fn(self, rhs: Self) -> Self::Output {
                Self(self.0.$fn(rhs.0))
            }
        }
    };
    (inplace $ty:ident, $trait:ident, $fn:ident) => {
        impl std::ops::$trait for $ty {
            fn $fn(&mut self, rhs: Self) {
                self.0.$fn(rhs.0);
            }
        }
    };
    (unary $ty:ident, $trait:ident, $fn:ident) => {
        impl std::ops::$trait for $ty {
            type Output = Self;

            fn $fn(self) -> Self::Output {
                Self(self.0.$fn())
            }
        }
    };
}
