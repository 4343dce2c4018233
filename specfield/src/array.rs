//! Dtypes, grid scales, and the reinterpretable field buffer.
//!
//! A field owns a single byte buffer that is viewed as a real or complex
//! array of varying shape depending on the field's current layout. The views
//! are zero-copy: the bytes stay put, only the shape and dtype interpretation
//! change. No two typed views of one buffer outlive a layout transition; the
//! borrow scopes of [`FieldBuffer::view`] and [`FieldBuffer::view_mut`]
//! enforce this.

use super::error::{Error, Result};
use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Axis, IxDyn, Slice};
use num_complex::Complex64;
use std::mem;

/// Scalar type of a field's data in a given layout.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Dtype {
    /// `f64` elements.
    Real,
    /// `Complex64` elements.
    Complex,
}

impl Dtype {
    /// Size of one element in bytes.
    pub const fn itemsize(self) -> usize {
        match self {
            Self::Real => mem::size_of::<f64>(),
            Self::Complex => mem::size_of::<Complex64>(),
        }
    }
}

/// Per-axis grid-size multipliers used for dealiasing.
///
/// Every scale must be positive and must produce an integer scaled grid size
/// for the basis it is applied to; the latter is checked where the basis is
/// known.
#[derive(Clone, Debug, PartialEq)]
pub struct Scales(Vec<f64>);

impl Scales {
    /// Constructs scales from one multiplier per axis.
    ///
    /// # Errors
    ///
    /// Returns an error if any entry is not strictly positive.
    pub fn new(scales: Vec<f64>) -> Result<Self> {
        if let Some(&bad) = scales.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(Error::InvalidScale(bad));
        }
        Ok(Self(scales))
    }

    /// Constructs the same multiplier for every one of `dim` axes.
    pub fn uniform(dim: usize, scale: f64) -> Result<Self> {
        Self::new(vec![scale; dim])
    }

    /// Number of axes.
    pub fn dim(&self) -> usize {
        self.0.len()
    }

    /// Multiplier along `axis`.
    pub fn at(&self, axis: usize) -> f64 {
        self.0[axis]
    }

    /// All multipliers in axis order.
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    // Bit-exact memo key; scales are value types.
    pub(crate) fn key(&self) -> Vec<u64> {
        self.0.iter().map(|s| s.to_bits()).collect()
    }
}

/// Borrowed typed view of field data.
pub enum ArrayRef<'a> {
    /// View of real data.
    Real(ArrayViewD<'a, f64>),
    /// View of complex data.
    Complex(ArrayViewD<'a, Complex64>),
}

/// Mutable typed view of field data.
pub enum ArrayMut<'a> {
    /// Mutable view of real data.
    Real(ArrayViewMutD<'a, f64>),
    /// Mutable view of complex data.
    Complex(ArrayViewMutD<'a, Complex64>),
}

/// Owned typed array, used where a kernel needs its input detached from the
/// buffer it will write into.
#[derive(Clone, Debug)]
pub enum DynArray {
    /// Owned real data.
    Real(ArrayD<f64>),
    /// Owned complex data.
    Complex(ArrayD<Complex64>),
}

impl<'a> ArrayRef<'a> {
    /// Dtype of the viewed data.
    pub fn dtype(&self) -> Dtype {
        match self {
            Self::Real(_) => Dtype::Real,
            Self::Complex(_) => Dtype::Complex,
        }
    }

    /// Shape of the viewed data.
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Real(a) => a.shape(),
            Self::Complex(a) => a.shape(),
        }
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    /// Whether the view holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies the view into an owned array.
    pub fn to_owned_data(&self) -> DynArray {
        match self {
            Self::Real(a) => DynArray::Real(a.to_owned()),
            Self::Complex(a) => DynArray::Complex(a.to_owned()),
        }
    }

    /// The real view, or a dtype error.
    pub fn as_real(&self) -> Result<ArrayViewD<'a, f64>> {
        match self {
            Self::Real(a) => Ok(a.clone()),
            Self::Complex(_) => Err(Error::DtypeMismatch { context: "real view" }),
        }
    }

    /// The complex view, or a dtype error.
    pub fn as_complex(&self) -> Result<ArrayViewD<'a, Complex64>> {
        match self {
            Self::Complex(a) => Ok(a.clone()),
            Self::Real(_) => Err(Error::DtypeMismatch { context: "complex view" }),
        }
    }

    /// Extent along `axis`.
    pub fn len_of(&self, axis: usize) -> usize {
        self.shape()[axis]
    }

    /// Restricts the view to `start..end` along `axis`.
    pub fn slice_axis(&self, axis: usize, start: usize, end: usize) -> ArrayRef<'_> {
        let slice = Slice::from(start..end);
        match self {
            Self::Real(a) => ArrayRef::Real(a.slice_axis(Axis(axis), slice)),
            Self::Complex(a) => ArrayRef::Complex(a.slice_axis(Axis(axis), slice)),
        }
    }
}

impl ArrayMut<'_> {
    /// Dtype of the viewed data.
    pub fn dtype(&self) -> Dtype {
        match self {
            Self::Real(_) => Dtype::Real,
            Self::Complex(_) => Dtype::Complex,
        }
    }

    /// Shape of the viewed data.
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Real(a) => a.shape(),
            Self::Complex(a) => a.shape(),
        }
    }

    /// Reborrows as an immutable view.
    pub fn as_ref(&self) -> ArrayRef<'_> {
        match self {
            Self::Real(a) => ArrayRef::Real(a.view()),
            Self::Complex(a) => ArrayRef::Complex(a.view()),
        }
    }

    /// Overwrites every element with zero.
    pub fn fill_zero(&mut self) {
        match self {
            Self::Real(a) => a.fill(0.0),
            Self::Complex(a) => a.fill(Complex64::new(0.0, 0.0)),
        }
    }

    /// Extent along `axis`.
    pub fn len_of(&self, axis: usize) -> usize {
        self.shape()[axis]
    }

    /// Restricts the mutable view to `start..end` along `axis`.
    pub fn slice_axis_mut(&mut self, axis: usize, start: usize, end: usize) -> ArrayMut<'_> {
        let slice = Slice::from(start..end);
        match self {
            Self::Real(a) => ArrayMut::Real(a.slice_axis_mut(Axis(axis), slice)),
            Self::Complex(a) => ArrayMut::Complex(a.slice_axis_mut(Axis(axis), slice)),
        }
    }

    /// Copies `src` into this view. Shapes and dtypes must agree.
    pub fn assign(&mut self, src: &ArrayRef<'_>) -> Result<()> {
        match (self, src) {
            (Self::Real(dst), ArrayRef::Real(s)) => {
                check_same_shape(dst.shape(), s.shape())?;
                dst.assign(s);
                Ok(())
            }
            (Self::Complex(dst), ArrayRef::Complex(s)) => {
                check_same_shape(dst.shape(), s.shape())?;
                dst.assign(s);
                Ok(())
            }
            _ => Err(Error::DtypeMismatch { context: "assignment" }),
        }
    }
}

impl DynArray {
    /// Allocates a zero-filled array of the given shape and dtype.
    pub fn zeros(shape: &[usize], dtype: Dtype) -> Self {
        match dtype {
            Dtype::Real => Self::Real(ArrayD::zeros(IxDyn(shape))),
            Dtype::Complex => Self::Complex(ArrayD::zeros(IxDyn(shape))),
        }
    }

    /// Dtype of the owned data.
    pub fn dtype(&self) -> Dtype {
        match self {
            Self::Real(_) => Dtype::Real,
            Self::Complex(_) => Dtype::Complex,
        }
    }

    /// Shape of the owned data.
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Real(a) => a.shape(),
            Self::Complex(a) => a.shape(),
        }
    }

    /// Borrows a typed view.
    pub fn view(&self) -> ArrayRef<'_> {
        match self {
            Self::Real(a) => ArrayRef::Real(a.view()),
            Self::Complex(a) => ArrayRef::Complex(a.view()),
        }
    }

    /// Borrows a mutable typed view.
    pub fn view_mut(&mut self) -> ArrayMut<'_> {
        match self {
            Self::Real(a) => ArrayMut::Real(a.view_mut()),
            Self::Complex(a) => ArrayMut::Complex(a.view_mut()),
        }
    }

    /// View of the `index`-th slot along `axis`, with that axis removed.
    pub fn index_axis(&self, axis: usize, index: usize) -> ArrayRef<'_> {
        match self {
            Self::Real(a) => ArrayRef::Real(a.index_axis(Axis(axis), index)),
            Self::Complex(a) => ArrayRef::Complex(a.index_axis(Axis(axis), index)),
        }
    }

    /// Mutable counterpart of [`DynArray::index_axis`].
    pub fn index_axis_mut(&mut self, axis: usize, index: usize) -> ArrayMut<'_> {
        match self {
            Self::Real(a) => ArrayMut::Real(a.index_axis_mut(Axis(axis), index)),
            Self::Complex(a) => ArrayMut::Complex(a.index_axis_mut(Axis(axis), index)),
        }
    }
}

fn check_same_shape(dst: &[usize], src: &[usize]) -> Result<()> {
    if dst == src {
        Ok(())
    } else {
        Err(Error::ShapeMismatch {
            context: "assignment",
            actual: src.iter().product(),
            expected: dst.iter().product(),
        })
    }
}

/// Owned byte buffer backing one field, reinterpreted per layout.
///
/// Stored as `f64` words so both element types stay aligned; the length is
/// kept even so a complex view of the full buffer is always possible.
#[derive(Debug, Default)]
pub struct FieldBuffer {
    words: Vec<f64>,
}

impl FieldBuffer {
    /// Allocates a zeroed buffer able to hold at least `bytes` bytes.
    pub fn with_capacity_bytes(bytes: usize) -> Self {
        let mut buffer = Self { words: Vec::new() };
        buffer.ensure_bytes(bytes);
        buffer
    }

    /// Grows the buffer to hold at least `bytes` bytes, zero-filling any new
    /// words. Existing words are preserved.
    pub fn ensure_bytes(&mut self, bytes: usize) {
        let words = crate::convert::div_ceil(bytes, mem::size_of::<f64>());
        let words = words + words % 2;
        if words > self.words.len() {
            self.words.resize(words, 0.0);
        }
    }

    /// Capacity in bytes.
    pub fn capacity_bytes(&self) -> usize {
        self.words.len() * mem::size_of::<f64>()
    }

    /// Zeroes the whole buffer.
    pub fn clear(&mut self) {
        self.words.fill(0.0);
    }

    /// Typed view of the leading elements under `(shape, dtype)`.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is smaller than the requested view; buffers are
    /// sized for the worst-case layout at allocation.
    pub fn view(&self, shape: &[usize], dtype: Dtype) -> ArrayRef<'_> {
        let n: usize = shape.iter().product();
        match dtype {
            Dtype::Real => {
                let slice = &self.words[..n];
                ArrayRef::Real(ArrayViewD::from_shape(IxDyn(shape), slice).unwrap())
            }
            Dtype::Complex => {
                let slice: &[Complex64] = bytemuck::cast_slice(&self.words);
                ArrayRef::Complex(ArrayViewD::from_shape(IxDyn(shape), &slice[..n]).unwrap())
            }
        }
    }

    /// Mutable counterpart of [`FieldBuffer::view`].
    pub fn view_mut(&mut self, shape: &[usize], dtype: Dtype) -> ArrayMut<'_> {
        let n: usize = shape.iter().product();
        match dtype {
            Dtype::Real => {
                let slice = &mut self.words[..n];
                ArrayMut::Real(ArrayViewMutD::from_shape(IxDyn(shape), slice).unwrap())
            }
            Dtype::Complex => {
                let slice: &mut [Complex64] = bytemuck::cast_slice_mut(&mut self.words);
                ArrayMut::Complex(ArrayViewMutD::from_shape(IxDyn(shape), &mut slice[..n]).unwrap())
            }
        }
    }
}
