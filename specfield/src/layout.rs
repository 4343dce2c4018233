//! Data-distribution states.
//!
//! A layout describes, per axis, whether the data is local or distributed
//! over the process mesh and whether it sits in coefficient or grid space,
//! together with the element dtype. All geometric queries are keyed on the
//! transform scales and memoised.

use super::array::{Dtype, Scales};
use super::basis::scaled_grid_size;
use super::convert::div_ceil;
use super::error::{Error, Result};
use rustc_hash::FxHashMap;
use std::ops::Range;
use std::sync::{Arc, Mutex};

/// Coefficient and base grid extents of one axis.
#[derive(Clone, Copy, Debug)]
pub(crate) struct AxisSizes {
    pub coeff: usize,
    pub base_grid: usize,
}

/// Per-scales geometry of a layout on this rank.
#[derive(Clone, Debug)]
pub struct Geometry {
    /// Global data shape.
    pub global_shape: Vec<usize>,
    /// Block sizes for the data distribution.
    pub blocks: Vec<usize>,
    /// Starting coordinates of the local portion.
    pub start: Vec<usize>,
    /// Local data shape.
    pub local_shape: Vec<usize>,
}

impl Geometry {
    /// Number of locally held elements.
    pub fn local_elements(&self) -> usize {
        self.local_shape.iter().product()
    }

    /// Index ranges selecting the local portion of the global data.
    pub fn slices(&self) -> Vec<Range<usize>> {
        self.start
            .iter()
            .zip(&self.local_shape)
            .map(|(&start, &len)| start..start + len)
            .collect()
    }
}

/// One transform-and-distribution state of a domain.
#[derive(Debug)]
pub struct Layout {
    index: usize,
    local: Vec<bool>,
    grid_space: Vec<bool>,
    dtype: Dtype,
    ext_mesh: Vec<usize>,
    ext_coords: Vec<usize>,
    axis_sizes: Vec<AxisSizes>,
    geometries: Mutex<FxHashMap<Vec<u64>, Arc<Geometry>>>,
}

impl Layout {
    pub(crate) fn new(
        index: usize,
        local: Vec<bool>,
        grid_space: Vec<bool>,
        dtype: Dtype,
        mesh: &[usize],
        coords: &[usize],
        axis_sizes: Vec<AxisSizes>,
    ) -> Self {
        // Embed the rank-R mesh and coordinates into the D axes: distributed
        // axes pick up the mesh entries in order, local axes get 1/0.
        let dim = local.len();
        let mut ext_mesh = vec![1; dim];
        let mut ext_coords = vec![0; dim];
        let mut next = 0;
        for axis in 0..dim {
            if !local[axis] {
                ext_mesh[axis] = mesh[next];
                ext_coords[axis] = coords[next];
                next += 1;
            }
        }
        debug_assert_eq!(next, mesh.len());
        Self {
            index,
            local,
            grid_space,
            dtype,
            ext_mesh,
            ext_coords,
            axis_sizes,
            geometries: Mutex::new(FxHashMap::default()),
        }
    }

    /// Position of this layout in the distributor's chain.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Axis locality flags (`true` for local).
    pub fn local(&self) -> &[bool] {
        &self.local
    }

    /// Axis grid-space flags (`true` for grid space).
    pub fn grid_space(&self) -> &[bool] {
        &self.grid_space
    }

    /// Element dtype of field data in this layout.
    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    /// Mesh extents embedded into the domain axes.
    pub fn ext_mesh(&self) -> &[usize] {
        &self.ext_mesh
    }

    /// Mesh coordinates embedded into the domain axes.
    pub fn ext_coords(&self) -> &[usize] {
        &self.ext_coords
    }

    /// The memoised geometry of this layout at the given scales.
    ///
    /// # Errors
    ///
    /// Returns an error if the scales do not match the domain dimension or a
    /// scaled grid size is not an integer.
    pub fn geometry(&self, scales: &Scales) -> Result<Arc<Geometry>> {
        if scales.dim() != self.local.len() {
            return Err(Error::ShapeMismatch {
                context: "scales",
                actual: scales.dim(),
                expected: self.local.len(),
            });
        }
        let key = scales.key();
        if let Some(geometry) = self.geometries.lock().unwrap().get(&key) {
            return Ok(Arc::clone(geometry));
        }
        let geometry = Arc::new(self.build_geometry(scales)?);
        self.geometries
            .lock()
            .unwrap()
            .insert(key, Arc::clone(&geometry));
        Ok(geometry)
    }

    fn build_geometry(&self, scales: &Scales) -> Result<Geometry> {
        let dim = self.local.len();
        let mut global_shape = Vec::with_capacity(dim);
        for axis in 0..dim {
            let sizes = self.axis_sizes[axis];
            global_shape.push(if self.grid_space[axis] {
                scaled_grid_size(sizes.base_grid, scales.at(axis))?
            } else {
                sizes.coeff
            });
        }
        // FFTW-standard block sizes.
        let blocks: Vec<usize> = global_shape
            .iter()
            .zip(&self.ext_mesh)
            .map(|(&global, &mesh)| div_ceil(global, mesh))
            .collect();
        let start: Vec<usize> = self
            .ext_coords
            .iter()
            .zip(&blocks)
            .map(|(&coord, &block)| coord * block)
            .collect();
        // Cutoff coordinates: the first empty or partial block.
        let local_shape: Vec<usize> = (0..dim)
            .map(|axis| {
                let global = global_shape[axis];
                let block = blocks[axis];
                let coord = self.ext_coords[axis];
                let cut = global / block;
                if coord < cut {
                    block
                } else if coord == cut {
                    global - cut * block
                } else {
                    0
                }
            })
            .collect();
        Ok(Geometry {
            global_shape,
            blocks,
            start,
            local_shape,
        })
    }

    /// Local buffer size in bytes at the given scales.
    pub fn buffer_size(&self, scales: &Scales) -> Result<usize> {
        Ok(self.geometry(scales)?.local_elements() * self.dtype.itemsize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout_for(
        local: Vec<bool>,
        grid_space: Vec<bool>,
        mesh: &[usize],
        coords: &[usize],
        sizes: &[(usize, usize)],
    ) -> Layout {
        let axis_sizes = sizes
            .iter()
            .map(|&(coeff, base_grid)| AxisSizes { coeff, base_grid })
            .collect();
        Layout::new(0, local, grid_space, Dtype::Real, mesh, coords, axis_sizes)
    }

    #[test]
    fn cut_rank_gets_partial_block() {
        // Global coeff shape [9, 8] over mesh [4] on axis 0: blocks are
        // ceil(9/4) = 3, the cut lands on rank 3.
        for rank in 0..4 {
            let layout = layout_for(
                vec![false, true],
                vec![false, false],
                &[4],
                &[rank],
                &[(9, 9), (8, 8)],
            );
            let geometry = layout.geometry(&Scales::uniform(2, 1.0).unwrap()).unwrap();
            assert_eq!(geometry.blocks, vec![3, 8]);
            let expected = if rank == 3 { vec![0, 8] } else { vec![3, 8] };
            assert_eq!(geometry.local_shape, expected);
            assert_eq!(geometry.start[0], rank * 3);
        }
    }

    #[test]
    fn local_axes_span_the_global_shape() {
        let layout = layout_for(
            vec![true, true],
            vec![true, false],
            &[],
            &[],
            &[(8, 16), (5, 10)],
        );
        let geometry = layout
            .geometry(&Scales::new(vec![1.5, 2.0]).unwrap())
            .unwrap();
        // Axis 0 is in grid space at scale 3/2, axis 1 stays in coeff space.
        assert_eq!(geometry.global_shape, vec![24, 5]);
        assert_eq!(geometry.local_shape, vec![24, 5]);
        assert_eq!(geometry.start, vec![0, 0]);
    }

    #[test]
    fn shape_conservation_over_ranks() {
        // Sum over ranks of local element counts equals the global count.
        let mesh = [3, 2];
        let mut total = 0;
        for c0 in 0..3 {
            for c1 in 0..2 {
                let layout = layout_for(
                    vec![false, false, true],
                    vec![false, false, false],
                    &mesh,
                    &[c0, c1],
                    &[(7, 7), (5, 5), (4, 4)],
                );
                let geometry = layout.geometry(&Scales::uniform(3, 1.0).unwrap()).unwrap();
                total += geometry.local_elements();
            }
        }
        assert_eq!(total, 7 * 5 * 4);
    }

    #[test]
    fn geometry_is_memoised_per_scales() {
        let layout = layout_for(
            vec![true],
            vec![true],
            &[],
            &[],
            &[(8, 8)],
        );
        let scales = Scales::uniform(1, 2.0).unwrap();
        let first = layout.geometry(&scales).unwrap();
        let second = layout.geometry(&scales).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
