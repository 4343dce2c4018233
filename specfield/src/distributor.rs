//! Layout graph construction and the paths between layouts.
//!
//! Fields over a D-dimensional domain are split over an R-dimensional
//! process mesh with R < D. In coefficient space the first R axes are
//! distributed and the rest local; walking toward grid space loops backwards
//! over the axes, transforming each local one and transposing with the next
//! axis otherwise. This bubbles the local window up to the first axis,
//! producing R+D+1 layouts joined by D transforms and R transposes.

use super::array::Scales;
use super::basis::{Basis, BasisEnum};
use super::comm::{CartComm, Comm};
use super::config::Config;
use super::domain::Domain;
use super::error::{Error, Result};
use super::field::Field;
use super::layout::{AxisSizes, Layout};
use super::transform::TransformPath;
use super::transpose::TransposePath;
use log::debug;
use std::sync::Arc;

/// The two distinguished ends of the layout chain.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LayoutSpace {
    /// Full coefficient space.
    Coeff,
    /// Full grid space.
    Grid,
}

/// One edge of the layout graph.
#[derive(Debug)]
pub enum Path {
    /// Local spectral transform along one axis.
    Transform(TransformPath),
    /// Distributed transpose along one mesh dimension.
    Transpose(TransposePath),
}

impl Path {
    /// Axis the step acts along.
    pub fn axis(&self) -> usize {
        match self {
            Self::Transform(path) => path.axis(),
            Self::Transpose(path) => path.axis(),
        }
    }

    /// Whether this step is a local transform.
    pub fn is_transform(&self) -> bool {
        matches!(self, Self::Transform(_))
    }

    pub(crate) fn increment(&self, domain: &Domain, fields: &mut [&mut Field]) -> Result<()> {
        match self {
            Self::Transform(path) => path.increment(domain, fields),
            Self::Transpose(path) => path.increment(fields),
        }
    }

    pub(crate) fn decrement(&self, domain: &Domain, fields: &mut [&mut Field]) -> Result<()> {
        match self {
            Self::Transform(path) => path.decrement(domain, fields),
            Self::Transpose(path) => path.decrement(fields),
        }
    }
}

/// Directs the parallel distribution and transformation of fields over a
/// domain.
#[derive(Debug)]
pub struct Distributor {
    comm: Comm,
    mesh: Vec<usize>,
    coords: Vec<usize>,
    layouts: Vec<Arc<Layout>>,
    paths: Vec<Path>,
}

impl Distributor {
    pub(crate) fn new(
        bases: &[BasisEnum],
        mesh: Option<&[usize]>,
        comm: Comm,
        config: &Config,
    ) -> Result<Self> {
        let dim = bases.len();
        // Default to a 1-D mesh of the available processes, then squeeze out
        // single-process dimensions.
        let default_mesh = vec![comm.size()];
        let mesh: Vec<usize> = mesh
            .unwrap_or(&default_mesh)
            .iter()
            .copied()
            .filter(|&extent| extent > 1)
            .collect();
        debug!("mesh: {mesh:?}");
        if mesh.len() >= dim {
            return Err(Error::MeshDimension {
                mesh: mesh.len(),
                domain: dim,
            });
        }
        let cart = CartComm::new(Arc::clone(&comm), &mesh)?;
        let coords = cart.coords().to_vec();

        let axis_sizes: Vec<AxisSizes> = bases
            .iter()
            .map(|basis| AxisSizes {
                coeff: basis.coeff_size(),
                base_grid: basis.base_grid_size(),
            })
            .collect();

        // First layout: full coefficient space, first R axes distributed.
        let r = mesh.len();
        let mut local: Vec<bool> = (0..dim).map(|axis| axis >= r).collect();
        let mut grid_space = vec![false; dim];
        let mut dtype = bases[dim - 1].coeff_dtype();

        enum Step {
            Transform(usize),
            Transpose(usize),
        }

        let mut layouts = vec![Arc::new(Layout::new(
            0,
            local.clone(),
            grid_space.clone(),
            dtype,
            &mesh,
            &coords,
            axis_sizes.clone(),
        ))];
        let mut steps = Vec::with_capacity(r + dim);
        for index in 1..=r + dim {
            // Iterate backwards over the axes to the last one still in
            // coefficient space: transform it if local, transpose otherwise.
            let axis = (0..dim)
                .rev()
                .find(|&axis| !grid_space[axis])
                .expect("chain ends only once every axis is in grid space");
            let step = if local[axis] {
                grid_space[axis] = true;
                dtype = bases[axis].grid_dtype();
                Step::Transform(axis)
            } else {
                local[axis] = true;
                local[axis + 1] = false;
                Step::Transpose(axis)
            };
            layouts.push(Arc::new(Layout::new(
                index,
                local.clone(),
                grid_space.clone(),
                dtype,
                &mesh,
                &coords,
                axis_sizes.clone(),
            )));
            steps.push(step);
        }

        let paths = steps
            .into_iter()
            .enumerate()
            .map(|(index, step)| {
                let layout0 = Arc::clone(&layouts[index]);
                let layout1 = Arc::clone(&layouts[index + 1]);
                match step {
                    Step::Transform(axis) => {
                        Path::Transform(TransformPath::new(layout0, layout1, axis, config))
                    }
                    Step::Transpose(axis) => Path::Transpose(TransposePath::new(
                        layout0,
                        layout1,
                        axis,
                        cart.sub(axis),
                        config,
                    )),
                }
            })
            .collect();

        Ok(Self {
            comm,
            mesh,
            coords,
            layouts,
            paths,
        })
    }

    /// World rank of this process.
    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    /// Number of processes.
    pub fn size(&self) -> usize {
        self.comm.size()
    }

    /// World communicator handle.
    pub fn comm(&self) -> &Comm {
        &self.comm
    }

    /// Effective process mesh (size-one dimensions squeezed out).
    pub fn mesh(&self) -> &[usize] {
        &self.mesh
    }

    /// This rank's mesh coordinates.
    pub fn coords(&self) -> &[usize] {
        &self.coords
    }

    /// Every layout, in chain order.
    pub fn layouts(&self) -> &[Arc<Layout>] {
        &self.layouts
    }

    /// The paths joining adjacent layouts.
    pub fn paths(&self) -> &[Path] {
        &self.paths
    }

    /// The full-coefficient-space layout.
    pub fn coeff_layout(&self) -> &Arc<Layout> {
        &self.layouts[0]
    }

    /// The full-grid-space layout.
    pub fn grid_layout(&self) -> &Arc<Layout> {
        &self.layouts[self.layouts.len() - 1]
    }

    /// Dereferences a layout end by enum.
    pub fn layout(&self, space: LayoutSpace) -> &Arc<Layout> {
        match space {
            LayoutSpace::Coeff => self.coeff_layout(),
            LayoutSpace::Grid => self.grid_layout(),
        }
    }

    /// Dereferences a layout by its conventional name.
    ///
    /// # Errors
    ///
    /// Returns an error for names other than `c`, `g`, `coeff`, `grid`.
    pub fn layout_by_name(&self, name: &str) -> Result<&Arc<Layout>> {
        match name {
            "c" | "coeff" => Ok(self.coeff_layout()),
            "g" | "grid" => Ok(self.grid_layout()),
            _ => Err(Error::UnknownLayout(name.to_owned())),
        }
    }

    /// Buffer size in bytes covering every layout at the given scales.
    pub fn buffer_size(&self, scales: &Scales) -> Result<usize> {
        let mut size = 0;
        for layout in &self.layouts {
            size = size.max(layout.buffer_size(scales)?);
        }
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::Dtype;
    use crate::basis::{Chebyshev, Fourier};
    use crate::comm::universe;
    use crate::domain::Domain;
    use std::f64::consts::PI;

    fn three_bases() -> Vec<BasisEnum> {
        vec![
            Fourier::new(8, (0.0, 2.0 * PI)).into(),
            Fourier::new(8, (0.0, 2.0 * PI)).into(),
            Chebyshev::new(8, (-1.0, 1.0)).into(),
        ]
    }

    #[test]
    fn serial_chain_is_all_transforms() {
        let comm = universe(1).pop().unwrap();
        let domain =
            Domain::new(three_bases(), Dtype::Real, None, comm, Config::default()).unwrap();
        let dist = domain.distributor();
        assert_eq!(dist.mesh(), &[] as &[usize]);
        assert_eq!(dist.layouts().len(), 4);
        assert_eq!(dist.paths().len(), 3);
        let axes: Vec<usize> = dist.paths().iter().map(Path::axis).collect();
        assert_eq!(axes, vec![2, 1, 0]);
        assert!(dist.paths().iter().all(Path::is_transform));
    }

    #[test]
    fn four_rank_chain_interleaves_one_transpose() {
        // D = 3 over mesh [4]: 5 layouts and 4 paths. The chain transforms
        // the local tail axes, transposes the first axis local, then
        // transforms it.
        let world = universe(4);
        for comm in world {
            let rank = comm.rank();
            let domain = Domain::new(
                three_bases(),
                Dtype::Real,
                Some(vec![4]),
                comm,
                Config::default(),
            )
            .unwrap();
            let dist = domain.distributor();
            assert_eq!(dist.layouts().len(), 5);
            assert_eq!(dist.paths().len(), 4);
            assert_eq!(dist.coords(), &[rank]);

            let expected_local = [
                [false, true, true],
                [false, true, true],
                [false, true, true],
                [true, false, true],
                [true, false, true],
            ];
            let expected_grid = [
                [false, false, false],
                [false, false, true],
                [false, true, true],
                [false, true, true],
                [true, true, true],
            ];
            for (layout, (local, grid_space)) in dist
                .layouts()
                .iter()
                .zip(expected_local.iter().zip(&expected_grid))
            {
                assert_eq!(layout.local(), local.as_slice());
                assert_eq!(layout.grid_space(), grid_space.as_slice());
            }

            let kinds: Vec<(bool, usize)> = dist
                .paths()
                .iter()
                .map(|path| (path.is_transform(), path.axis()))
                .collect();
            assert_eq!(kinds, vec![(true, 2), (true, 1), (false, 0), (true, 0)]);

            // Real grid data turns complex through the Fourier axes: full
            // coefficient space is complex, full grid space real.
            assert_eq!(dist.coeff_layout().dtype(), Dtype::Complex);
            assert_eq!(dist.grid_layout().dtype(), Dtype::Real);
        }
    }

    #[test]
    fn adjacent_layouts_differ_by_one_step() {
        let world = universe(4);
        for comm in world {
            let domain = Domain::new(
                three_bases(),
                Dtype::Real,
                Some(vec![4]),
                comm,
                Config::default(),
            )
            .unwrap();
            let dist = domain.distributor();
            for (index, pair) in dist.layouts().windows(2).enumerate() {
                let path = &dist.paths()[index];
                let axis = path.axis();
                if path.is_transform() {
                    // One grid_space flip; locality untouched.
                    assert_eq!(pair[0].local(), pair[1].local());
                    assert!(!pair[0].grid_space()[axis] && pair[1].grid_space()[axis]);
                    assert!(pair[0].local()[axis]);
                } else {
                    // Locality swaps between the two adjacent axes.
                    assert_eq!(pair[0].grid_space(), pair[1].grid_space());
                    assert!(!pair[0].local()[axis] && pair[1].local()[axis]);
                    assert!(pair[0].local()[axis + 1] && !pair[1].local()[axis + 1]);
                    assert_eq!(pair[0].dtype(), pair[1].dtype());
                }
            }
        }
    }

    #[test]
    fn buffer_size_covers_every_layout() {
        let world = universe(4);
        for comm in world {
            let domain = Domain::new(
                three_bases(),
                Dtype::Real,
                Some(vec![4]),
                comm,
                Config::default(),
            )
            .unwrap();
            let dist = domain.distributor();
            let scales = Scales::uniform(3, 1.5).unwrap();
            let total = dist.buffer_size(&scales).unwrap();
            for layout in dist.layouts() {
                assert!(layout.buffer_size(&scales).unwrap() <= total);
            }
        }
    }

    #[test]
    fn incompatible_meshes_are_rejected() {
        let comm = universe(1).pop().unwrap();
        let result = Domain::new(
            vec![Chebyshev::new(8, (-1.0, 1.0)).into()],
            Dtype::Real,
            Some(vec![2, 2]),
            Arc::clone(&comm),
            Config::default(),
        );
        assert!(matches!(result, Err(Error::MeshDimension { .. })));

        // Mesh entries that do not multiply up to the process count.
        let result = Domain::new(three_bases(), Dtype::Real, Some(vec![3]), comm, Config::default());
        assert!(matches!(result, Err(Error::MeshSize { .. })));
    }

    #[test]
    fn layout_names_dereference() {
        let comm = universe(1).pop().unwrap();
        let domain =
            Domain::new(three_bases(), Dtype::Real, None, comm, Config::default()).unwrap();
        let dist = domain.distributor();
        assert_eq!(dist.layout_by_name("c").unwrap().index(), 0);
        assert_eq!(dist.layout_by_name("grid").unwrap().index(), 3);
        assert!(matches!(
            dist.layout_by_name("x"),
            Err(Error::UnknownLayout(_))
        ));
    }
}
