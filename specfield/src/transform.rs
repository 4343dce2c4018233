//! Spectral transform steps between two adjacent layouts.

use super::array::DynArray;
use super::basis::Basis;
use super::config::Config;
use super::domain::Domain;
use super::error::{Error, Result};
use super::field::Field;
use super::layout::Layout;
use std::sync::Arc;

/// A local transform along one axis, linking a coefficient-side layout to
/// its grid-side neighbor through the axis basis.
#[derive(Debug)]
pub struct TransformPath {
    layout0: Arc<Layout>,
    layout1: Arc<Layout>,
    axis: usize,
    group: bool,
}

impl TransformPath {
    pub(crate) fn new(
        layout0: Arc<Layout>,
        layout1: Arc<Layout>,
        axis: usize,
        config: &Config,
    ) -> Self {
        Self {
            layout0,
            layout1,
            axis,
            group: config.group_transforms,
        }
    }

    /// Transformed axis.
    pub fn axis(&self) -> usize {
        self.axis
    }

    /// Coefficient-side layout.
    pub fn layout0(&self) -> &Arc<Layout> {
        &self.layout0
    }

    /// Grid-side layout.
    pub fn layout1(&self) -> &Arc<Layout> {
        &self.layout1
    }

    /// Backward transform toward grid space.
    pub(crate) fn increment(&self, domain: &Domain, fields: &mut [&mut Field]) -> Result<()> {
        if fields.len() == 1 {
            self.increment_single(domain, fields[0])
        } else if self.group {
            self.increment_group(domain, fields)
        } else {
            for field in fields.iter_mut() {
                self.increment_single(domain, field)?;
            }
            Ok(())
        }
    }

    /// Forward transform toward coefficient space.
    pub(crate) fn decrement(&self, domain: &Domain, fields: &mut [&mut Field]) -> Result<()> {
        if fields.len() == 1 {
            self.decrement_single(domain, fields[0])
        } else if self.group {
            self.decrement_group(domain, fields)
        } else {
            for field in fields.iter_mut() {
                self.decrement_single(domain, field)?;
            }
            Ok(())
        }
    }

    fn increment_single(&self, domain: &Domain, field: &mut Field) -> Result<()> {
        let meta = field.axis_meta(self.axis);
        let scales = field.scales();
        // Nothing local to transform: only the layout pointer moves.
        if self.layout0.geometry(&scales)?.local_elements() == 0 {
            field.set_layout_index(self.layout1.index());
            return Ok(());
        }
        let cdata = field.data().to_owned_data();
        field.set_layout_index(self.layout1.index());
        let mut gdata = field.data_mut();
        domain
            .basis(self.axis)
            .backward(&cdata.view(), &mut gdata, self.axis, &meta)
    }

    fn decrement_single(&self, domain: &Domain, field: &mut Field) -> Result<()> {
        let meta = field.axis_meta(self.axis);
        let scales = field.scales();
        if self.layout1.geometry(&scales)?.local_elements() == 0 {
            field.set_layout_index(self.layout0.index());
            return Ok(());
        }
        let gdata = field.data().to_owned_data();
        field.set_layout_index(self.layout0.index());
        let mut cdata = field.data_mut();
        domain
            .basis(self.axis)
            .forward(&gdata.view(), &mut cdata, self.axis, &meta)
    }

    fn group_shapes(&self, nfields: usize, fields: &[&mut Field]) -> Result<(Vec<usize>, Vec<usize>)> {
        let scales = fields[0].scales();
        for field in fields {
            if field.scales() != scales {
                return Err(Error::ShapeMismatch {
                    context: "grouped scales",
                    actual: 0,
                    expected: 0,
                });
            }
        }
        let mut shape0 = self.layout0.geometry(&scales)?.local_shape.clone();
        let mut shape1 = self.layout1.geometry(&scales)?.local_shape.clone();
        shape0.insert(0, nfields);
        shape1.insert(0, nfields);
        Ok((shape0, shape1))
    }

    fn increment_group(&self, domain: &Domain, fields: &mut [&mut Field]) -> Result<()> {
        let nfields = fields.len();
        let (shape0, shape1) = self.group_shapes(nfields, fields)?;
        if shape0.iter().product::<usize>() == 0 {
            for field in fields.iter_mut() {
                field.set_layout_index(self.layout1.index());
            }
            return Ok(());
        }
        let meta = fields[0].axis_meta(self.axis);
        // One contiguous super-array amortises kernel dispatch over fields.
        let mut cgroup = DynArray::zeros(&shape0, self.layout0.dtype());
        for (slot, field) in fields.iter().enumerate() {
            cgroup.index_axis_mut(0, slot).assign(&field.data())?;
        }
        let mut ggroup = DynArray::zeros(&shape1, self.layout1.dtype());
        domain.basis(self.axis).backward(
            &cgroup.view(),
            &mut ggroup.view_mut(),
            self.axis + 1,
            &meta,
        )?;
        for (slot, field) in fields.iter_mut().enumerate() {
            field.set_layout_index(self.layout1.index());
            field.data_mut().assign(&ggroup.index_axis(0, slot))?;
        }
        Ok(())
    }

    fn decrement_group(&self, domain: &Domain, fields: &mut [&mut Field]) -> Result<()> {
        let nfields = fields.len();
        let (shape0, shape1) = self.group_shapes(nfields, fields)?;
        if shape1.iter().product::<usize>() == 0 {
            for field in fields.iter_mut() {
                field.set_layout_index(self.layout0.index());
            }
            return Ok(());
        }
        let meta = fields[0].axis_meta(self.axis);
        let mut ggroup = DynArray::zeros(&shape1, self.layout1.dtype());
        for (slot, field) in fields.iter().enumerate() {
            ggroup.index_axis_mut(0, slot).assign(&field.data())?;
        }
        let mut cgroup = DynArray::zeros(&shape0, self.layout0.dtype());
        domain.basis(self.axis).forward(
            &ggroup.view(),
            &mut cgroup.view_mut(),
            self.axis + 1,
            &meta,
        )?;
        for (slot, field) in fields.iter_mut().enumerate() {
            field.set_layout_index(self.layout0.index());
            field.data_mut().assign(&cgroup.index_axis(0, slot))?;
        }
        Ok(())
    }
}
