//! Compressed sparse row matrices for the per-basis linear operators.
//!
//! The implicit solver consumes these; the transform core only builds them.

/// Real sparse matrix in compressed sparse row form.
#[derive(Clone, Debug, PartialEq)]
pub struct CsrMatrix {
    nrows: usize,
    ncols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    /// Builds a matrix from `(row, column, value)` triplets, summing
    /// duplicate entries.
    ///
    /// # Panics
    ///
    /// Panics if a triplet lies outside the matrix.
    pub fn from_triplets(nrows: usize, ncols: usize, mut triplets: Vec<(usize, usize, f64)>) -> Self {
        assert!(
            triplets.iter().all(|&(r, c, _)| r < nrows && c < ncols),
            "triplet outside a {nrows}x{ncols} matrix"
        );
        triplets.sort_by_key(|&(r, c, _)| (r, c));

        let mut indptr = Vec::with_capacity(nrows + 1);
        let mut indices = Vec::with_capacity(triplets.len());
        let mut values = Vec::with_capacity(triplets.len());
        indptr.push(0);
        let mut row = 0;
        for (r, c, v) in triplets {
            while row < r {
                indptr.push(indices.len());
                row += 1;
            }
            if indices.len() > indptr[row] && indices[indices.len() - 1] == c {
                let last = values.len() - 1;
                values[last] += v;
            } else {
                indices.push(c);
                values.push(v);
            }
        }
        while row < nrows {
            indptr.push(indices.len());
            row += 1;
        }
        Self {
            nrows,
            ncols,
            indptr,
            indices,
            values,
        }
    }

    /// The `n`-dimensional identity.
    pub fn identity(n: usize) -> Self {
        Self::from_triplets(n, n, (0..n).map(|i| (i, i, 1.0)).collect())
    }

    /// Stacks square blocks along the diagonal.
    pub fn block_diag(blocks: &[Self]) -> Self {
        let nrows = blocks.iter().map(|b| b.nrows).sum();
        let ncols = blocks.iter().map(|b| b.ncols).sum();
        let mut triplets = Vec::new();
        let (mut r0, mut c0) = (0, 0);
        for block in blocks {
            for (r, c, v) in block.iter() {
                triplets.push((r0 + r, c0 + c, v));
            }
            r0 += block.nrows;
            c0 += block.ncols;
        }
        Self::from_triplets(nrows, ncols, triplets)
    }

    /// Number of rows.
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Number of columns.
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Number of explicitly stored entries.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// The entry at `(row, col)`, implicit zeros included.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        let range = self.indptr[row]..self.indptr[row + 1];
        self.indices[range.clone()]
            .binary_search(&col)
            .map_or(0.0, |offset| self.values[range.start + offset])
    }

    /// Iterates over the stored entries as `(row, col, value)`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (0..self.nrows).flat_map(move |r| {
            let range = self.indptr[r]..self.indptr[r + 1];
            self.indices[range.clone()]
                .iter()
                .zip(&self.values[range])
                .map(move |(&c, &v)| (r, c, v))
        })
    }

    /// Dense matrix-vector product.
    ///
    /// # Panics
    ///
    /// Panics if `x` does not have `ncols` entries.
    pub fn matvec(&self, x: &[f64]) -> Vec<f64> {
        assert_eq!(x.len(), self.ncols);
        (0..self.nrows)
            .map(|r| {
                let range = self.indptr[r]..self.indptr[r + 1];
                self.indices[range.clone()]
                    .iter()
                    .zip(&self.values[range])
                    .map(|(&c, &v)| v * x[c])
                    .sum()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triplets_merge_and_order() {
        let m = CsrMatrix::from_triplets(2, 3, vec![(1, 2, 4.0), (0, 1, 1.0), (1, 2, 1.0)]);
        assert_eq!(m.nnz(), 2);
        assert_eq!(m.get(0, 1), 1.0);
        assert_eq!(m.get(1, 2), 5.0);
        assert_eq!(m.get(1, 0), 0.0);
    }

    #[test]
    fn block_diag_offsets_blocks() {
        let a = CsrMatrix::identity(2);
        let b = CsrMatrix::from_triplets(1, 1, vec![(0, 0, 3.0)]);
        let m = CsrMatrix::block_diag(&[a, b]);
        assert_eq!((m.nrows(), m.ncols()), (3, 3));
        assert_eq!(m.get(1, 1), 1.0);
        assert_eq!(m.get(2, 2), 3.0);
        assert_eq!(m.get(2, 0), 0.0);
    }

    #[test]
    fn matvec_matches_dense() {
        let m = CsrMatrix::from_triplets(2, 2, vec![(0, 0, 2.0), (0, 1, -1.0), (1, 1, 0.5)]);
        assert_eq!(m.matvec(&[2.0, 4.0]), vec![0.0, 2.0]);
    }
}
