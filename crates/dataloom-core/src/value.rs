//! Typed, multi-dimensional, row-major dense array values.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::{Error, Result};

/// Inline shape storage; ranks beyond 4 spill to the heap transparently.
pub type Shape = SmallVec<[usize; 4]>;

/// Element type of an [`Array`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl DType {
    /// Size in bytes of one element of this type.
    pub fn elem_size(self) -> usize {
        match self {
            DType::U8 | DType::I8 => 1,
            DType::U16 | DType::I16 => 2,
            DType::U32 | DType::I32 | DType::F32 => 4,
            DType::U64 | DType::I64 | DType::F64 => 8,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::U8 => "u8",
            DType::I8 => "i8",
            DType::U16 => "u16",
            DType::I16 => "i16",
            DType::U32 => "u32",
            DType::I32 => "i32",
            DType::U64 => "u64",
            DType::I64 => "i64",
            DType::F32 => "f32",
            DType::F64 => "f64",
        };
        f.write_str(name)
    }
}

/// A scalar/array element type usable with the typed [`Array`] constructors.
pub trait Element: Copy + bytemuck::Pod {
    const DTYPE: DType;
}

macro_rules! impl_element {
    ($t:ty, $dtype:expr) => {
        impl Element for $t {
            const DTYPE: DType = $dtype;
        }
    };
}

impl_element!(u8, DType::U8);
impl_element!(i8, DType::I8);
impl_element!(u16, DType::U16);
impl_element!(i16, DType::I16);
impl_element!(u32, DType::U32);
impl_element!(i32, DType::I32);
impl_element!(u64, DType::U64);
impl_element!(i64, DType::I64);
impl_element!(f32, DType::F32);
impl_element!(f64, DType::F64);

/// Type-erased, row-major dense array: an element type, a shape, and owned byte storage.
///
/// Cloning an `Array` is O(1) — the byte storage is reference-counted and never mutated in
/// place once constructed, so a clone can never alias engine-internal mutable state.
#[derive(Clone)]
pub struct Array {
    dtype: DType,
    shape: Shape,
    bytes: Arc<[u8]>,
}

impl Array {
    /// Build an array from raw bytes, checking the `product(shape) * elem_size == len(bytes)`
    /// invariant from the data model.
    pub fn from_bytes(dtype: DType, shape: Shape, bytes: Vec<u8>) -> Result<Self> {
        let expected = shape.iter().product::<usize>() * dtype.elem_size();
        if expected != bytes.len() {
            return Err(Error::Shape(format!(
                "array of dtype {dtype} and shape {shape:?} expects {expected} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self {
            dtype,
            shape,
            bytes: Arc::from(bytes),
        })
    }

    /// Build a typed array from a flat, row-major `Vec<T>` and a shape.
    pub fn from_vec<T: Element>(shape: Shape, data: Vec<T>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(Error::Shape(format!(
                "array of shape {shape:?} expects {expected} elements, got {}",
                data.len()
            )));
        }
        let bytes = bytemuck::cast_slice::<T, u8>(&data).to_vec();
        Ok(Self {
            dtype: T::DTYPE,
            shape,
            bytes: Arc::from(bytes),
        })
    }

    /// Rank-0 scalar array.
    pub fn scalar<T: Element>(value: T) -> Self {
        Self::from_vec(Shape::new(), vec![value]).expect("scalar shape always matches")
    }

    /// Rank-1 u8 array representing a byte string.
    pub fn byte_string(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        let shape: Shape = SmallVec::from_slice(&[bytes.len()]);
        Self {
            dtype: DType::U8,
            shape,
            bytes: Arc::from(bytes),
        }
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Length along dim 0 (1 for a rank-0 scalar, `shape[0]` otherwise).
    pub fn len0(&self) -> usize {
        self.shape.first().copied().unwrap_or(1)
    }

    pub fn num_elements(&self) -> usize {
        self.shape.iter().product::<usize>().max(if self.shape.is_empty() { 1 } else { 0 })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Borrow the array's elements as `&[T]`, failing with a [`Error::Type`] if `T::DTYPE`
    /// does not match this array's dtype.
    pub fn as_slice<T: Element>(&self) -> Result<&[T]> {
        if T::DTYPE != self.dtype {
            return Err(Error::Type(format!(
                "expected dtype {}, found {}",
                T::DTYPE,
                self.dtype
            )));
        }
        Ok(bytemuck::cast_slice(&self.bytes))
    }

    /// Interpret a rank-1 u8 array as a byte string. Fails with [`Error::Type`] otherwise.
    pub fn as_byte_string(&self) -> Result<&[u8]> {
        if self.dtype != DType::U8 || self.rank() != 1 {
            return Err(Error::Type(
                "value is not a rank-1 u8 byte-string array".to_string(),
            ));
        }
        Ok(&self.bytes)
    }

    /// Row-major strides, in elements, for the current shape.
    fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1usize; self.shape.len()];
        for i in (0..self.shape.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.shape[i + 1];
        }
        strides
    }

    /// `slice(key, dim, start, end)`: take the half-open range `[start, end)` along `dim`,
    /// keeping every other dimension whole.
    pub fn slice_dim(&self, dim: usize, start: usize, end: usize) -> Result<Self> {
        if dim >= self.shape.len() {
            return Err(Error::Shape(format!(
                "slice dim {dim} out of range for rank {}",
                self.shape.len()
            )));
        }
        let dim_len = self.shape[dim];
        if start > end || end > dim_len {
            return Err(Error::Range {
                index: end as i64,
                len: dim_len,
            });
        }
        let elem_size = self.dtype.elem_size();
        let strides = self.strides();
        let outer: usize = self.shape[..dim].iter().product();
        let slice_len = end - start;
        let dim_stride = strides[dim];
        let mut out = Vec::with_capacity(outer * slice_len * dim_stride * elem_size);
        for o in 0..outer {
            let base = o * self.shape[dim] * dim_stride;
            let start_elem = base + start * dim_stride;
            let len_elems = slice_len * dim_stride;
            let byte_start = start_elem * elem_size;
            let byte_len = len_elems * elem_size;
            out.extend_from_slice(&self.bytes[byte_start..byte_start + byte_len]);
        }
        let mut new_shape = self.shape.clone();
        new_shape[dim] = slice_len;
        Self::from_bytes(self.dtype, new_shape, out)
    }

    /// `squeeze(key, dim?)`: drop dimension `dim` if it has length 1 (error otherwise), or
    /// drop every length-1 dimension if `dim` is `None`.
    pub fn squeeze(&self, dim: Option<usize>) -> Result<Self> {
        let new_shape: Shape = match dim {
            Some(d) => {
                if d >= self.shape.len() {
                    return Err(Error::Shape(format!(
                        "squeeze dim {d} out of range for rank {}",
                        self.shape.len()
                    )));
                }
                if self.shape[d] != 1 {
                    return Err(Error::Shape(format!(
                        "cannot squeeze dim {d} of length {}",
                        self.shape[d]
                    )));
                }
                self.shape
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != d)
                    .map(|(_, &s)| s)
                    .collect()
            }
            None => self.shape.iter().copied().filter(|&s| s != 1).collect(),
        };
        Ok(Self {
            dtype: self.dtype,
            shape: new_shape,
            bytes: self.bytes.clone(),
        })
    }

    /// `shape(key, out_key, dim)`: the size of dimension `dim`, as a rank-0 `i64` array.
    pub fn dim_size(&self, dim: usize) -> Result<Self> {
        let size = *self.shape.get(dim).ok_or_else(|| {
            Error::Shape(format!(
                "shape dim {dim} out of range for rank {}",
                self.shape.len()
            ))
        })?;
        Ok(Self::scalar(size as i64))
    }

    /// Concatenate `arrays` along a new leading dimension, as `batch(n)` does per key. All
    /// arrays must share dtype and shape; a mismatch is a [`Error::Shape`] error.
    pub fn stack(arrays: &[&Array]) -> Result<Self> {
        let first = arrays
            .first()
            .ok_or_else(|| Error::InvalidArgument("stack requires at least one array".to_string()))?;
        let dtype = first.dtype;
        let shape = first.shape.clone();
        let mut bytes = Vec::with_capacity(first.bytes.len() * arrays.len());
        for a in arrays {
            if a.dtype != dtype || a.shape != shape {
                return Err(Error::Shape(format!(
                    "stack: expected dtype {dtype} shape {shape:?}, found dtype {} shape {:?}",
                    a.dtype, a.shape
                )));
            }
            bytes.extend_from_slice(&a.bytes);
        }
        let mut new_shape = Shape::new();
        new_shape.push(arrays.len());
        new_shape.extend(shape);
        Self::from_bytes(dtype, new_shape, bytes)
    }

    /// `pad(key, dim, left, right, value)`: pad dimension `dim` with `left`/`right` extra
    /// slices filled with one element's worth of `value_bytes`.
    pub fn pad(&self, dim: usize, left: usize, right: usize, value_bytes: &[u8]) -> Result<Self> {
        if self.shape.is_empty() || dim >= self.shape.len() {
            return Err(Error::Shape(format!(
                "pad dim {dim} out of range for rank {}",
                self.shape.len()
            )));
        }
        if value_bytes.len() != self.dtype.elem_size() {
            return Err(Error::Type(format!(
                "pad value must be {} bytes for dtype {}, got {}",
                self.dtype.elem_size(),
                self.dtype,
                value_bytes.len()
            )));
        }
        let elem_size = self.dtype.elem_size();
        let strides = self.strides();
        let outer: usize = self.shape[..dim].iter().product();
        let dim_stride = strides[dim];
        let pad_slice_elems = dim_stride;
        let pad_slice_bytes: Vec<u8> = value_bytes.repeat(pad_slice_elems);

        let mut out = Vec::new();
        let row_stride_bytes = self.shape[dim] * dim_stride * elem_size;
        for o in 0..outer {
            let start = o * row_stride_bytes;
            for _ in 0..left {
                out.extend_from_slice(&pad_slice_bytes);
            }
            out.extend_from_slice(&self.bytes[start..start + row_stride_bytes]);
            for _ in 0..right {
                out.extend_from_slice(&pad_slice_bytes);
            }
        }
        let mut new_shape = self.shape.clone();
        new_shape[dim] += left + right;
        Self::from_bytes(self.dtype, new_shape, out)
    }

    /// `replace(key, needle, replacement, max_count)`: byte-level find/replace over a rank-1
    /// u8 byte-string array. `max_count < 0` means unbounded; matches are found left to right
    /// and are non-overlapping.
    pub fn replace_bytes(&self, needle: &[u8], replacement: &[u8], max_count: i64) -> Result<Self> {
        let haystack = self.as_byte_string()?;
        if needle.is_empty() {
            return Ok(self.clone());
        }
        let mut out = Vec::with_capacity(haystack.len());
        let mut i = 0;
        let mut replaced = 0i64;
        while i < haystack.len() {
            let reached_limit = max_count >= 0 && replaced >= max_count;
            if !reached_limit && haystack[i..].starts_with(needle) {
                out.extend_from_slice(replacement);
                i += needle.len();
                replaced += 1;
            } else {
                out.push(haystack[i]);
                i += 1;
            }
        }
        Ok(Self::byte_string(out))
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array")
            .field("dtype", &self.dtype)
            .field("shape", &self.shape.as_slice())
            .field("bytes_len", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_roundtrip() {
        let a = Array::scalar(42i32);
        assert_eq!(a.rank(), 0);
        assert_eq!(a.dtype(), DType::I32);
        assert_eq!(a.as_slice::<i32>().unwrap(), &[42]);
    }

    #[test]
    fn test_byte_string() {
        let a = Array::byte_string(b"hello".to_vec());
        assert_eq!(a.rank(), 1);
        assert_eq!(a.as_byte_string().unwrap(), b"hello");
    }

    #[test]
    fn test_shape_mismatch_is_shape_error() {
        let err = Array::from_vec::<f32>(SmallVec::from_slice(&[2, 2]), vec![1.0, 2.0]).unwrap_err();
        assert!(matches!(err, Error::Shape(_)));
    }

    #[test]
    fn test_wrong_type_access_is_type_error() {
        let a = Array::scalar(1u8);
        let err = a.as_slice::<f32>().unwrap_err();
        assert!(matches!(err, Error::Type(_)));
    }

    #[test]
    fn test_rank2_elements_and_len0() {
        let a = Array::from_vec(SmallVec::from_slice(&[2, 3]), vec![1u8, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(a.num_elements(), 6);
        assert_eq!(a.len0(), 2);
    }

    #[test]
    fn test_slice_dim0_on_rank2() {
        let a = Array::from_vec(SmallVec::from_slice(&[3, 2]), vec![1i32, 2, 3, 4, 5, 6]).unwrap();
        let s = a.slice_dim(0, 1, 3).unwrap();
        assert_eq!(s.shape(), &[2, 2]);
        assert_eq!(s.as_slice::<i32>().unwrap(), &[3, 4, 5, 6]);
    }

    #[test]
    fn test_slice_out_of_range_is_range_error() {
        let a = Array::from_vec(SmallVec::from_slice(&[3]), vec![1i32, 2, 3]).unwrap();
        let err = a.slice_dim(0, 0, 4).unwrap_err();
        assert!(matches!(err, Error::Range { .. }));
    }

    #[test]
    fn test_squeeze_specific_dim() {
        let a = Array::from_vec(SmallVec::from_slice(&[1, 3]), vec![1i32, 2, 3]).unwrap();
        let s = a.squeeze(Some(0)).unwrap();
        assert_eq!(s.shape(), &[3]);
    }

    #[test]
    fn test_squeeze_all_dims() {
        let a = Array::from_vec(SmallVec::from_slice(&[1, 3, 1]), vec![1i32, 2, 3]).unwrap();
        let s = a.squeeze(None).unwrap();
        assert_eq!(s.shape(), &[3]);
    }

    #[test]
    fn test_squeeze_nonunit_dim_is_shape_error() {
        let a = Array::from_vec(SmallVec::from_slice(&[2, 3]), vec![1i32, 2, 3, 4, 5, 6]).unwrap();
        let err = a.squeeze(Some(0)).unwrap_err();
        assert!(matches!(err, Error::Shape(_)));
    }

    #[test]
    fn test_dim_size() {
        let a = Array::from_vec(SmallVec::from_slice(&[4, 2]), vec![0u8; 8]).unwrap();
        let d = a.dim_size(0).unwrap();
        assert_eq!(d.as_slice::<i64>().unwrap(), &[4]);
    }

    #[test]
    fn test_replace_bytes_leftmost_two() {
        let a = Array::byte_string(b"Hello world".to_vec());
        let r = a.replace_bytes(b"l", b"b", 2).unwrap();
        assert_eq!(r.as_byte_string().unwrap(), b"Hebbo world");
    }

    #[test]
    fn test_stack_adds_leading_dim() {
        let a = Array::scalar(1i32);
        let b = Array::scalar(2i32);
        let c = Array::scalar(3i32);
        let stacked = Array::stack(&[&a, &b, &c]).unwrap();
        assert_eq!(stacked.shape(), &[3]);
        assert_eq!(stacked.as_slice::<i32>().unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn test_stack_mismatched_shape_is_shape_error() {
        let a = Array::scalar(1i32);
        let b = Array::from_vec(SmallVec::from_slice(&[2]), vec![1i32, 2]).unwrap();
        let err = Array::stack(&[&a, &b]).unwrap_err();
        assert!(matches!(err, Error::Shape(_)));
    }

    #[test]
    fn test_pad_dim0() {
        let a = Array::from_vec(SmallVec::from_slice(&[3]), vec![1i32, 2, 3]).unwrap();
        let padded = a.pad(0, 1, 2, &0i32.to_ne_bytes()).unwrap();
        assert_eq!(padded.shape(), &[6]);
        assert_eq!(padded.as_slice::<i32>().unwrap(), &[0, 1, 2, 3, 0, 0]);
    }

    #[test]
    fn test_pad_inner_dim() {
        let a = Array::from_vec(SmallVec::from_slice(&[2, 2]), vec![1i32, 2, 3, 4]).unwrap();
        let padded = a.pad(1, 1, 0, &0i32.to_ne_bytes()).unwrap();
        assert_eq!(padded.shape(), &[2, 3]);
        assert_eq!(padded.as_slice::<i32>().unwrap(), &[0, 1, 2, 0, 3, 4]);
    }

    #[test]
    fn test_replace_bytes_unbounded() {
        let a = Array::byte_string(b"aaa".to_vec());
        let r = a.replace_bytes(b"a", b"bb", -1).unwrap();
        assert_eq!(r.as_byte_string().unwrap(), b"bbbbbb");
    }
}
