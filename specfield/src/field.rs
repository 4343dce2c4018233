//! Scalar fields defined over a distributed domain.
//!
//! A field owns one reinterpretable buffer and a pointer into the layout
//! chain. Moving between representations advances the pointer one path at a
//! time; the typed data view is recomputed from the layout's local shape and
//! dtype after every step.

use super::array::{ArrayMut, ArrayRef, FieldBuffer, Scales};
use super::basis::{AxisMeta, Basis, Parity};
use super::distributor::LayoutSpace;
use super::domain::Domain;
use super::error::{Error, Result};
use super::layout::Layout;
use std::sync::Arc;

/// Scalar field over a [`Domain`].
#[derive(Debug)]
pub struct Field {
    domain: Arc<Domain>,
    name: Option<String>,
    buffer: FieldBuffer,
    layout_index: usize,
    meta: Vec<AxisMeta>,
}

impl Field {
    pub(crate) fn assemble(domain: Arc<Domain>, buffer: FieldBuffer) -> Self {
        let meta = domain
            .bases()
            .iter()
            .map(|basis| AxisMeta::new(basis.default_parity()))
            .collect();
        Self {
            domain,
            name: None,
            buffer,
            layout_index: 0,
            meta,
        }
    }

    /// Optional user-facing name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Names the field.
    pub fn set_name(&mut self, name: &str) {
        self.name = Some(name.to_owned());
    }

    /// The domain this field lives on.
    pub fn domain(&self) -> &Arc<Domain> {
        &self.domain
    }

    /// The field's current layout.
    pub fn layout(&self) -> &Arc<Layout> {
        &self.domain.distributor().layouts()[self.layout_index]
    }

    /// Index of the current layout in the chain.
    pub fn layout_index(&self) -> usize {
        self.layout_index
    }

    /// Per-axis transform state.
    pub fn axis_meta(&self, axis: usize) -> AxisMeta {
        self.meta[axis]
    }

    /// Sets the series parity along `axis`.
    pub fn set_parity(&mut self, axis: usize, parity: Parity) {
        self.meta[axis].parity = parity;
    }

    /// The transform scales currently in effect.
    pub fn scales(&self) -> Scales {
        Scales::new(self.meta.iter().map(|meta| meta.scale).collect())
            .expect("field scales were validated when set")
    }

    /// Changes the transform scales, growing the buffer if the new worst
    /// case layout outgrows it. Grid-space data does not survive a scale
    /// change; set scales while in coefficient space.
    ///
    /// # Errors
    ///
    /// Returns an error if the scales are invalid for the domain.
    pub fn set_scales(&mut self, scales: &Scales) -> Result<()> {
        let bytes = self.domain.distributor().buffer_size(scales)?;
        self.buffer.ensure_bytes(bytes);
        for (meta, &scale) in self.meta.iter_mut().zip(scales.as_slice()) {
            meta.scale = scale;
        }
        Ok(())
    }

    /// Typed view of the local data under the current layout.
    pub fn data(&self) -> ArrayRef<'_> {
        let layout = self.layout();
        let geometry = layout
            .geometry(&self.scales())
            .expect("field scales were validated when set");
        self.buffer.view(&geometry.local_shape, layout.dtype())
    }

    /// Mutable counterpart of [`Field::data`].
    pub fn data_mut(&mut self) -> ArrayMut<'_> {
        let layout = Arc::clone(self.layout());
        let geometry = layout
            .geometry(&self.scales())
            .expect("field scales were validated when set");
        self.buffer.view_mut(&geometry.local_shape, layout.dtype())
    }

    // Reinterprets the buffer under another layout. The bytes stay put.
    pub(crate) fn set_layout_index(&mut self, index: usize) {
        self.layout_index = index;
    }

    /// Forcibly reinterprets the field under `space` and copies `data` in.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` does not match the layout's local shape
    /// and dtype.
    pub fn write_in(&mut self, space: LayoutSpace, data: &ArrayRef<'_>) -> Result<()> {
        self.layout_index = self.domain.distributor().layout(space).index();
        self.data_mut().assign(data)
    }

    /// Walks the field to `space` and returns the typed view.
    ///
    /// # Errors
    ///
    /// Returns an error if a step of the walk fails.
    pub fn view_in(&mut self, space: LayoutSpace) -> Result<ArrayRef<'_>> {
        self.require_layout(space)?;
        Ok(self.data())
    }

    /// One step toward grid space.
    pub fn towards_grid_space(&mut self) -> Result<()> {
        let domain = Arc::clone(&self.domain);
        let index = self.layout_index;
        let paths = domain.distributor().paths();
        assert!(index < paths.len(), "already in full grid space");
        paths[index].increment(&domain, &mut [self])
    }

    /// One step toward coefficient space.
    pub fn towards_coeff_space(&mut self) -> Result<()> {
        let domain = Arc::clone(&self.domain);
        let index = self.layout_index;
        assert!(index > 0, "already in full coefficient space");
        domain.distributor().paths()[index - 1].decrement(&domain, &mut [self])
    }

    /// Walks the field to the layout with the given chain index.
    pub fn require_layout_index(&mut self, index: usize) -> Result<()> {
        assert!(index < self.domain.distributor().layouts().len());
        while self.layout_index < index {
            self.towards_grid_space()?;
        }
        while self.layout_index > index {
            self.towards_coeff_space()?;
        }
        Ok(())
    }

    /// Walks the field to one end of the layout chain.
    pub fn require_layout(&mut self, space: LayoutSpace) -> Result<()> {
        let index = self.domain.distributor().layout(space).index();
        self.require_layout_index(index)
    }

    /// Walks the field to the layout with the given conventional name.
    pub fn require_layout_name(&mut self, name: &str) -> Result<()> {
        let index = self.domain.distributor().layout_by_name(name)?.index();
        self.require_layout_index(index)
    }

    /// Requires one axis (default: all axes) to be in grid space.
    pub fn require_grid_space(&mut self, axis: Option<usize>) -> Result<()> {
        match axis {
            None => {
                while !self.layout().grid_space().iter().all(|&g| g) {
                    self.towards_grid_space()?;
                }
            }
            Some(axis) => {
                while !self.layout().grid_space()[axis] {
                    self.towards_grid_space()?;
                }
            }
        }
        Ok(())
    }

    /// Requires one axis (default: all axes) to be in coefficient space.
    pub fn require_coeff_space(&mut self, axis: Option<usize>) -> Result<()> {
        match axis {
            None => {
                while self.layout().grid_space().iter().any(|&g| g) {
                    self.towards_coeff_space()?;
                }
            }
            Some(axis) => {
                while self.layout().grid_space()[axis] {
                    self.towards_coeff_space()?;
                }
            }
        }
        Ok(())
    }

    /// Requires an axis to be local.
    ///
    /// The first axis only becomes local toward grid space, axis R only
    /// toward coefficient space; interior mesh axes are never local and are
    /// refused.
    pub fn require_local(&mut self, axis: usize) -> Result<()> {
        let r = self.domain.distributor().mesh().len();
        while !self.layout().local()[axis] {
            if axis == 0 {
                self.towards_grid_space()?;
            } else if axis >= r {
                self.towards_coeff_space()?;
            } else {
                return Err(Error::Unsupported("locality along an interior mesh axis"));
            }
        }
        Ok(())
    }

    /// Differentiates this field along `axis` into `out`, on coefficients.
    ///
    /// # Errors
    ///
    /// Returns an error if the axis cannot be made local, or the basis
    /// refuses the data.
    pub fn differentiate(&mut self, axis: usize, out: &mut Field) -> Result<()> {
        self.require_local(axis)?;
        self.require_coeff_space(Some(axis))?;
        let domain = Arc::clone(&self.domain);
        out.set_scales(&self.scales())?;
        out.set_layout_index(self.layout_index);
        out.meta.clone_from(&self.meta);
        let meta = self.axis_meta(axis);
        let parity =
            domain
                .basis(axis)
                .differentiate(&self.data(), &mut out.data_mut(), axis, &meta)?;
        out.meta[axis].parity = parity;
        Ok(())
    }

    /// Integrates this field over the given axes (default: all axes) into
    /// `out`, accumulating each axis into its leading mode.
    ///
    /// # Errors
    ///
    /// Returns an error if an axis cannot be made local in coefficient
    /// space.
    pub fn integrate(&mut self, axes: Option<&[usize]>, out: &mut Field) -> Result<()> {
        let mut axes: Vec<usize> = match axes {
            None => (0..self.domain.dim()).collect(),
            Some(axes) => axes.to_vec(),
        };
        axes.sort_unstable();
        axes.dedup();
        let domain = Arc::clone(&self.domain);
        // Deeper axes first: they are local on the coefficient side.
        let mut first = true;
        for &axis in axes.iter().rev() {
            let meta = self.axis_meta(axis);
            if first {
                self.require_local(axis)?;
                self.require_coeff_space(Some(axis))?;
                out.set_scales(&self.scales())?;
                out.set_layout_index(self.layout_index);
                out.meta.clone_from(&self.meta);
                domain
                    .basis(axis)
                    .integrate(&self.data(), &mut out.data_mut(), axis, &meta)?;
                first = false;
            } else {
                out.require_local(axis)?;
                out.require_coeff_space(Some(axis))?;
                let data = out.data().to_owned_data();
                domain
                    .basis(axis)
                    .integrate(&data.view(), &mut out.data_mut(), axis, &meta)?;
            }
        }
        Ok(())
    }

    /// Evaluates this field at `position` along `axis` into `out`, writing
    /// the value into the leading mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the position lies outside the basis interval or
    /// the axis cannot be made local.
    pub fn interpolate(&mut self, axis: usize, position: f64, out: &mut Field) -> Result<()> {
        self.require_local(axis)?;
        self.require_coeff_space(Some(axis))?;
        let domain = Arc::clone(&self.domain);
        out.set_scales(&self.scales())?;
        out.set_layout_index(self.layout_index);
        out.meta.clone_from(&self.meta);
        let meta = self.axis_meta(axis);
        domain
            .basis(axis)
            .interpolate(&self.data(), &mut out.data_mut(), position, axis, &meta)
    }
}

/// Advances several fields one step toward grid space together, letting
/// grouped paths batch the work into one kernel or exchange.
///
/// All fields must live on the same domain, sit in the same layout, and
/// share their scales.
///
/// # Errors
///
/// Returns an error if the fields disagree on domain, layout, or scales.
pub fn towards_grid_space_many(fields: &mut [&mut Field]) -> Result<()> {
    let domain = check_same_state(fields)?;
    let index = fields[0].layout_index;
    domain.distributor().paths()[index].increment(&domain, fields)
}

/// Retreats several fields one step toward coefficient space together.
///
/// # Errors
///
/// Returns an error if the fields disagree on domain, layout, or scales.
pub fn towards_coeff_space_many(fields: &mut [&mut Field]) -> Result<()> {
    let domain = check_same_state(fields)?;
    let index = fields[0].layout_index;
    domain.distributor().paths()[index - 1].decrement(&domain, fields)
}

fn check_same_state(fields: &[&mut Field]) -> Result<Arc<Domain>> {
    assert!(!fields.is_empty(), "no fields to step");
    let domain = Arc::clone(&fields[0].domain);
    let index = fields[0].layout_index;
    for field in fields {
        if !Arc::ptr_eq(&field.domain, &domain) || field.layout_index != index {
            return Err(Error::ShapeMismatch {
                context: "grouped fields",
                actual: field.layout_index,
                expected: index,
            });
        }
    }
    Ok(domain)
}

impl Drop for Field {
    fn drop(&mut self) {
        // Return the buffer to the domain pool.
        let buffer = std::mem::take(&mut self.buffer);
        self.domain.collect(buffer);
    }
}
