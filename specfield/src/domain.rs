//! Problem domains composed of orthogonal bases.

use super::array::{Dtype, FieldBuffer, Scales};
use super::basis::{Basis, BasisEnum};
use super::comm::Comm;
use super::config::Config;
use super::distributor::Distributor;
use super::error::Result;
use super::field::Field;
use std::sync::{Arc, Mutex};

/// A problem domain: an ordered list of bases, the distributor built over
/// them, and a pool of reusable field buffers.
#[derive(Debug)]
pub struct Domain {
    bases: Vec<BasisEnum>,
    grid_dtype: Dtype,
    distributor: Distributor,
    pool: Mutex<Vec<FieldBuffer>>,
    config: Config,
}

impl Domain {
    /// Builds a domain over `bases` with the given grid dtype.
    ///
    /// Basis dtypes are threaded left to right: a basis may turn real grid
    /// data into complex coefficients, which then feed the next basis.
    ///
    /// # Errors
    ///
    /// Returns an error if the mesh is incompatible with the communicator or
    /// the domain dimension, or if a basis rejects its dtype.
    pub fn new(
        mut bases: Vec<BasisEnum>,
        grid_dtype: Dtype,
        mesh: Option<Vec<usize>>,
        comm: Comm,
        config: Config,
    ) -> Result<Arc<Self>> {
        assert!(!bases.is_empty(), "domain needs at least one basis");
        // Grid-to-coefficient transforms proceed in the listed order.
        let mut dtype = grid_dtype;
        for basis in &mut bases {
            basis.configure(&config);
            dtype = basis.set_dtype(dtype)?;
        }
        let distributor = Distributor::new(&bases, mesh.as_deref(), comm, &config)?;
        Ok(Arc::new(Self {
            bases,
            grid_dtype,
            distributor,
            pool: Mutex::new(Vec::new()),
            config,
        }))
    }

    /// Number of domain dimensions.
    pub fn dim(&self) -> usize {
        self.bases.len()
    }

    /// Grid dtype the domain was built with.
    pub fn grid_dtype(&self) -> Dtype {
        self.grid_dtype
    }

    /// The bases in axis order.
    pub fn bases(&self) -> &[BasisEnum] {
        &self.bases
    }

    /// The basis along `axis`.
    pub fn basis(&self, axis: usize) -> &BasisEnum {
        &self.bases[axis]
    }

    /// Finds a basis (and its axis) by name.
    pub fn basis_by_name(&self, name: &str) -> Option<(usize, &BasisEnum)> {
        self.bases
            .iter()
            .enumerate()
            .find(|(_, basis)| basis.name() == Some(name))
    }

    /// The distributor built over this domain.
    pub fn distributor(&self) -> &Distributor {
        &self.distributor
    }

    /// Startup configuration in effect.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The local segment of the grid along `axis` at the given scales, as
    /// seen in the full-grid-space layout.
    pub fn grid(&self, axis: usize, scales: &Scales) -> Result<Vec<f64>> {
        let geometry = self.distributor.grid_layout().geometry(scales)?;
        let grid = self.bases[axis].grid(scales.at(axis))?;
        let slices = geometry.slices();
        Ok(grid[slices[axis].clone()].to_vec())
    }

    /// Returns a free field in full coefficient space, reusing a pooled
    /// buffer when one is available.
    pub fn new_field(self: &Arc<Self>) -> Result<Field> {
        let scales = Scales::uniform(self.dim(), 1.0)?;
        let bytes = self.distributor.buffer_size(&scales)?;
        let buffer = {
            let mut pool = self.pool.lock().unwrap();
            pool.pop()
        };
        let mut buffer = buffer.unwrap_or_default();
        buffer.ensure_bytes(bytes);
        Ok(Field::assemble(Arc::clone(self), buffer))
    }

    // Fields return their buffers here when dropped.
    pub(crate) fn collect(&self, mut buffer: FieldBuffer) {
        buffer.clear();
        self.pool.lock().unwrap().push(buffer);
    }

    #[cfg(test)]
    pub(crate) fn pooled_buffers(&self) -> usize {
        self.pool.lock().unwrap().len()
    }
}
