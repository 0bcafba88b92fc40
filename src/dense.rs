//! Column-major dense matrices and LU factorization with partial pivoting.
//!
//! This is the matrix type handed to Jacobian callbacks: the bindings wrap
//! the solver's own `SUNMatrix` storage and expose it as `&mut DenseMatrix`.
//! Element `(i, j)` is row `i`, column `j`. Factorization runs SUNDIALS' dense
//! kernels on the same column layout.

use std::fmt;
use std::ops::{Index, IndexMut};

use sundials_sys as sys;

use crate::{native, Float};

enum Storage<'a> {
    Owned(Vec<Float>),
    Borrowed(&'a mut [Float]),
}

/// Dense `rows x cols` matrix stored column by column.
///
/// Matrices made with [`new`](DenseMatrix::new) own their data; the ones
/// passed to Jacobian callbacks borrow the solver's.
pub struct DenseMatrix<'a> {
    rows: usize,
    cols: usize,
    data: Storage<'a>,
}

impl DenseMatrix<'static> {
    /// Zero matrix.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: Storage::Owned(vec![0.0; rows * cols]),
        }
    }

    /// Square identity matrix.
    pub fn identity(n: usize) -> Self {
        let mut m = Self::new(n, n);
        m.add_identity();
        m
    }

    /// Build from row-major nested arrays, convenient in tests and demos.
    pub fn from_rows<const R: usize, const C: usize>(rows: [[Float; C]; R]) -> Self {
        let mut m = Self::new(R, C);
        for (i, row) in rows.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                m[(i, j)] = *v;
            }
        }
        m
    }
}

impl<'a> DenseMatrix<'a> {
    /// View the data of a dense `SUNMatrix`.
    ///
    /// # Safety
    /// `a` must be a live dense matrix, not accessed through another path
    /// while the view exists.
    pub(crate) unsafe fn from_sunmatrix(a: sys::SUNMatrix) -> Self {
        let rows = sys::SUNDenseMatrix_Rows(a) as usize;
        let cols = sys::SUNDenseMatrix_Columns(a) as usize;
        let data = native::raw_slice_mut(sys::SUNDenseMatrix_Data(a), rows * cols);
        DenseMatrix {
            rows,
            cols,
            data: Storage::Borrowed(data),
        }
    }
}

impl DenseMatrix<'_> {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// All elements, column by column.
    pub fn as_slice(&self) -> &[Float] {
        match &self.data {
            Storage::Owned(v) => v,
            Storage::Borrowed(s) => s,
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [Float] {
        match &mut self.data {
            Storage::Owned(v) => v,
            Storage::Borrowed(s) => s,
        }
    }

    /// Column `j` as a slice.
    pub fn column(&self, j: usize) -> &[Float] {
        &self.as_slice()[j * self.rows..(j + 1) * self.rows]
    }

    /// Column `j` as a mutable slice.
    pub fn column_mut(&mut self, j: usize) -> &mut [Float] {
        let rows = self.rows;
        &mut self.as_mut_slice()[j * rows..(j + 1) * rows]
    }

    /// Set every element to `v`.
    pub fn fill(&mut self, v: Float) {
        self.as_mut_slice().fill(v);
    }

    /// Multiply every element by `c`.
    pub fn scale(&mut self, c: Float) {
        self.as_mut_slice().iter_mut().for_each(|x| *x *= c);
    }

    /// Add one to each diagonal element.
    pub fn add_identity(&mut self) {
        for i in 0..self.rows.min(self.cols) {
            self[(i, i)] += 1.0;
        }
    }

    /// Copy the contents of `other`, which must have the same shape.
    pub fn copy_from(&mut self, other: &DenseMatrix<'_>) {
        assert!(
            self.rows == other.rows && self.cols == other.cols,
            "dimension mismatch in copy: {}x{} from {}x{}",
            self.rows,
            self.cols,
            other.rows,
            other.cols
        );
        self.as_mut_slice().copy_from_slice(other.as_slice());
    }

    /// y = A x
    pub fn matvec(&self, x: &[Float], y: &mut [Float]) {
        assert_eq!(x.len(), self.cols, "matvec: x has the wrong length");
        assert_eq!(y.len(), self.rows, "matvec: y has the wrong length");
        y.fill(0.0);
        for (j, xj) in x.iter().enumerate() {
            for (yi, aij) in y.iter_mut().zip(self.column(j)) {
                *yi += aij * xj;
            }
        }
    }

    fn column_ptrs(&mut self) -> Vec<*mut Float> {
        let rows = self.rows;
        let base = self.as_mut_slice().as_mut_ptr();
        (0..self.cols).map(|j| base.wrapping_add(j * rows)).collect()
    }

    /// In-place LU factorization with partial pivoting, `P A = L U`.
    ///
    /// `pivots[k]` receives the row swapped with row `k`. On a zero pivot
    /// the factorization stops and `Err(k)` names the offending column.
    pub fn getrf(&mut self, pivots: &mut [usize]) -> Result<(), usize> {
        let n = self.cols;
        assert_eq!(self.rows, n, "getrf needs a square matrix");
        assert_eq!(pivots.len(), n, "getrf: pivot array has the wrong length");

        let mut cols = self.column_ptrs();
        let mut p = vec![0 as sys::sunindextype; n];
        let len = n as sys::sunindextype;
        // SAFETY: `cols` holds `n` columns of `n` elements each, `p` has `n`
        // entries, and both outlive the call.
        let zero_at = unsafe { sys::SUNDlsMat_denseGETRF(cols.as_mut_ptr(), len, len, p.as_mut_ptr()) };
        for (dst, src) in pivots.iter_mut().zip(&p) {
            *dst = *src as usize;
        }
        match zero_at {
            0 => Ok(()),
            k => Err(k as usize - 1),
        }
    }

    /// Solve `A x = b` in place using the factors left by [`getrf`](Self::getrf).
    pub fn getrs(&mut self, pivots: &[usize], b: &mut [Float]) {
        let n = self.cols;
        assert_eq!(
            b.len(),
            n,
            "dimension mismatch in solve: A is {n}x{n}, b has length {}",
            b.len()
        );
        assert_eq!(pivots.len(), n, "getrs: pivot array has the wrong length");

        let mut cols = self.column_ptrs();
        let mut p: Vec<sys::sunindextype> = pivots.iter().map(|&k| k as sys::sunindextype).collect();
        // SAFETY: as in `getrf`; `b` has `n` entries.
        unsafe {
            sys::SUNDlsMat_denseGETRS(cols.as_mut_ptr(), n as sys::sunindextype, p.as_mut_ptr(), b.as_mut_ptr())
        };
    }
}

impl PartialEq for DenseMatrix<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.rows == other.rows && self.cols == other.cols && self.as_slice() == other.as_slice()
    }
}

impl fmt::Debug for DenseMatrix<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DenseMatrix")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("data", &self.as_slice())
            .finish()
    }
}

impl Index<(usize, usize)> for DenseMatrix<'_> {
    type Output = Float;

    fn index(&self, (i, j): (usize, usize)) -> &Self::Output {
        debug_assert!(i < self.rows && j < self.cols);
        &self.as_slice()[j * self.rows + i]
    }
}

impl IndexMut<(usize, usize)> for DenseMatrix<'_> {
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut Self::Output {
        debug_assert!(i < self.rows && j < self.cols);
        let rows = self.rows;
        &mut self.as_mut_slice()[j * rows + i]
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::DenseMatrix;

    fn sample() -> DenseMatrix<'static> {
        DenseMatrix::from_rows([[1.0, 2.0, 3.0], [2.0, -4.0, 6.0], [3.0, -9.0, -3.0]])
    }

    #[test]
    fn matvec_scale_and_copy() {
        let a = sample();
        let mut y = [0.0; 3];
        a.matvec(&[1.0, 2.0, 3.0], &mut y);
        assert_eq!(y, [14.0, 12.0, -24.0]);

        let mut b = DenseMatrix::new(3, 3);
        b.copy_from(&a);
        b.scale(2.0);
        assert_eq!(b[(2, 1)], -18.0);
        b.add_identity();
        assert_eq!(b[(0, 0)], 3.0);
    }

    #[test]
    fn lu_solves_three_by_three() {
        let mut a = sample();
        let mut p = [0; 3];
        a.getrf(&mut p).unwrap();
        let mut s = [5.0, 18.0, 6.0];
        a.getrs(&p, &mut s);
        assert_abs_diff_eq!(s[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s[1], -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s[2], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn equality_ignores_ownership() {
        let mut data = [1.0, 2.0, 2.0, 4.0];
        let borrowed = DenseMatrix {
            rows: 2,
            cols: 2,
            data: super::Storage::Borrowed(&mut data),
        };
        assert_eq!(borrowed, DenseMatrix::from_rows([[1.0, 2.0], [2.0, 4.0]]));
    }

    #[test]
    fn singular_matrix_names_the_column() {
        let mut a = DenseMatrix::from_rows([[1.0, 2.0], [2.0, 4.0]]);
        let mut p = [0; 2];
        assert_eq!(a.getrf(&mut p), Err(1));
    }
}
