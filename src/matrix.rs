//! Column-major matrix of spectra.
//!
//! [`SpectralMatrix`] stores one spectrum per column: a pixel matrix is
//! `bands × pixels`, an endmember matrix `bands × p` and an abundance matrix
//! `p × pixels`. Each spectrum is therefore a contiguous slice, which is the
//! access pattern of every per-pixel loop in this crate.

use nalgebra::DMatrix;

/// Column-major matrix whose columns are spectral vectors.
///
/// Element `(row, col)` lives at index `row + col * nrows`.
///
/// # Examples
///
/// ```
/// use hsi_unmix::matrix::SpectralMatrix;
///
/// // Two 3-band spectra
/// let mat = SpectralMatrix::from_column_major(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3, 2).unwrap();
///
/// assert_eq!(mat.column(1), &[4.0, 5.0, 6.0]);
/// assert_eq!(mat[(2, 0)], 3.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralMatrix {
    data: Vec<f64>,
    nrows: usize,
    ncols: usize,
}

impl SpectralMatrix {
    /// Create from flat column-major data.
    ///
    /// Returns `None` if `data.len() != nrows * ncols`.
    pub fn from_column_major(data: Vec<f64>, nrows: usize, ncols: usize) -> Option<Self> {
        if data.len() != nrows * ncols {
            return None;
        }
        Some(Self { data, nrows, ncols })
    }

    /// Build from a list of equally long spectra, one per column.
    ///
    /// Returns `None` if the spectra have different lengths.
    pub fn from_columns(columns: &[Vec<f64>]) -> Option<Self> {
        let nrows = columns.first().map_or(0, Vec::len);
        if columns.iter().any(|c| c.len() != nrows) {
            return None;
        }
        let data = columns.iter().flatten().copied().collect();
        Some(Self {
            data,
            nrows,
            ncols: columns.len(),
        })
    }

    /// Zero-filled matrix.
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            data: vec![0.0; nrows * ncols],
            nrows,
            ncols,
        }
    }

    #[inline]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Dimensions as `(nrows, ncols)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    #[inline]
    pub fn is_square(&self) -> bool {
        self.nrows == self.ncols
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Contiguous spectrum stored in column `col`.
    ///
    /// # Panics
    /// Panics if `col >= ncols`.
    #[inline]
    pub fn column(&self, col: usize) -> &[f64] {
        let start = col * self.nrows;
        &self.data[start..start + self.nrows]
    }

    /// Mutable spectrum stored in column `col`.
    ///
    /// # Panics
    /// Panics if `col >= ncols`.
    #[inline]
    pub fn column_mut(&mut self, col: usize) -> &mut [f64] {
        let start = col * self.nrows;
        &mut self.data[start..start + self.nrows]
    }

    /// Iterate over the columns as slices.
    pub fn columns(&self) -> impl Iterator<Item = &[f64]> + '_ {
        // chunks_exact panics on zero, an empty-row matrix has no columns to yield
        self.data.chunks_exact(self.nrows.max(1)).take(self.ncols)
    }

    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Copy into a nalgebra `DMatrix<f64>` (same column-major layout).
    pub fn to_dmatrix(&self) -> DMatrix<f64> {
        DMatrix::from_column_slice(self.nrows, self.ncols, &self.data)
    }

    /// Copy out of a nalgebra `DMatrix<f64>`.
    pub fn from_dmatrix(mat: &DMatrix<f64>) -> Self {
        let (nrows, ncols) = mat.shape();
        Self {
            data: mat.as_slice().to_vec(),
            nrows,
            ncols,
        }
    }
}

impl std::ops::Index<(usize, usize)> for SpectralMatrix {
    type Output = f64;

    #[inline]
    fn index(&self, (row, col): (usize, usize)) -> &f64 {
        debug_assert!(
            row < self.nrows && col < self.ncols,
            "SpectralMatrix index ({}, {}) out of bounds for {}x{} matrix",
            row,
            col,
            self.nrows,
            self.ncols
        );
        &self.data[row + col * self.nrows]
    }
}

impl std::ops::IndexMut<(usize, usize)> for SpectralMatrix {
    #[inline]
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut f64 {
        debug_assert!(
            row < self.nrows && col < self.ncols,
            "SpectralMatrix index ({}, {}) out of bounds for {}x{} matrix",
            row,
            col,
            self.nrows,
            self.ncols
        );
        &mut self.data[row + col * self.nrows]
    }
}

impl std::fmt::Display for SpectralMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SpectralMatrix({}x{})", self.nrows, self.ncols)
    }
}
