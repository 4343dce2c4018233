//! Distributed block transposes between two adjacent layouts.
//!
//! A transpose moves the local window between field axes `axis` and
//! `axis+1` across the one mesh dimension assigned to `axis`. The plan
//! follows the standard many-transpose parameterization
//! `(n0, n1, howmany, block0, block1)`: `n0`/`n1` are the global extents of
//! the two moving axes, `block0`/`block1` the distribution block sizes on
//! either side, and `howmany` the bystander volume per moved element. The
//! collective itself is an all-to-all over the sub-communicator fixed at
//! construction.

use super::array::{ArrayMut, DynArray, Scales};
use super::comm::SubComm;
use super::config::Config;
use super::error::{Error, Result};
use super::field::Field;
use super::layout::Layout;
use log::debug;
use ndarray::{ArrayViewD, ArrayViewMutD, Axis, IxDyn, Slice};
use rustc_hash::FxHashMap;
use std::ops::Range;
use std::sync::{Arc, Mutex};

/// A distributed transpose step along one mesh dimension.
pub struct TransposePath {
    layout0: Arc<Layout>,
    layout1: Arc<Layout>,
    axis: usize,
    sub: SubComm,
    in_place: bool,
    sync: bool,
    group: bool,
    plans: Mutex<FxHashMap<(usize, Vec<u64>), Option<Arc<TransposePlan>>>>,
}

impl std::fmt::Debug for TransposePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransposePath")
            .field("axis", &self.axis)
            .field("group_size", &self.sub.size())
            .finish()
    }
}

/// Memoised exchange geometry for one `(nfields, scales)` pair.
#[derive(Debug)]
struct TransposePlan {
    n0: usize,
    n1: usize,
    block0: usize,
    block1: usize,
    shape0: Vec<usize>,
    shape1: Vec<usize>,
    // Index of the moving axis within shape0/shape1 (shifted by a leading
    // field dimension in grouped mode).
    array_axis: usize,
}

// Block ownership of one peer along a distributed extent.
fn span(global: usize, block: usize, peer: usize) -> Range<usize> {
    let start = (peer * block).min(global);
    let end = (start + block).min(global);
    start..end
}

// Rolled axis order putting the moving axis first, as the exchange packs and
// unpacks its payloads.
fn rolled_axes(ndim: usize, axis: usize) -> Vec<usize> {
    (0..ndim).map(|i| (i + axis) % ndim).collect()
}

fn pack<T: bytemuck::Pod>(chunk: &ArrayViewD<'_, T>, order: &[usize]) -> Vec<u8> {
    let permuted = chunk.view().permuted_axes(order.to_vec());
    let values: Vec<T> = permuted.iter().copied().collect();
    bytemuck::cast_slice(&values).to_vec()
}

fn unpack<T: bytemuck::Pod>(bytes: &[u8], dest: ArrayViewMutD<'_, T>, order: &[usize]) {
    let mut permuted = dest.permuted_axes(order.to_vec());
    let values: Vec<T> = bytemuck::pod_collect_to_vec(bytes);
    let source = ArrayViewD::from_shape(IxDyn(permuted.shape()), &values)
        .expect("peer payload matches the block geometry");
    permuted.assign(&source);
}

impl TransposePath {
    pub(crate) fn new(
        layout0: Arc<Layout>,
        layout1: Arc<Layout>,
        axis: usize,
        sub: SubComm,
        config: &Config,
    ) -> Self {
        Self {
            layout0,
            layout1,
            axis,
            sub,
            in_place: config.in_place,
            sync: config.sync_transposes,
            group: config.group_transposes,
            plans: Mutex::new(FxHashMap::default()),
        }
    }

    /// Mesh axis this transpose moves data along.
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

    fn plan(&self, nfields: usize, scales: &Scales) -> Result<Option<Arc<TransposePlan>>> {
        let key = (nfields, scales.key());
        if let Some(plan) = self.plans.lock().unwrap().get(&key) {
            return Ok(plan.clone());
        }
        let geometry0 = self.layout0.geometry(scales)?;
        let geometry1 = self.layout1.geometry(scales)?;
        let axis = self.axis;
        let n0 = geometry1.local_shape[axis];
        let n1 = geometry0.local_shape[axis + 1];
        let howmany: usize = nfields
            * geometry0.local_shape[..axis].iter().product::<usize>()
            * geometry0.local_shape[axis + 2..].iter().product::<usize>();
        let block0 = geometry0.blocks[axis];
        let block1 = geometry1.blocks[axis + 1];
        // Bystander extents agree between the layouts, so an empty slab is
        // empty on every rank of the sub-communicator at once.
        let plan = if howmany == 0 || n0 == 0 || n1 == 0 {
            None
        } else {
            debug!(
                "building transpose plan for (nfields, axis, in_place) = ({}, {}, {})",
                nfields, axis, self.in_place
            );
            let mut shape0 = geometry0.local_shape.clone();
            let mut shape1 = geometry1.local_shape.clone();
            let mut array_axis = axis;
            if nfields > 1 {
                shape0.insert(0, nfields);
                shape1.insert(0, nfields);
                array_axis += 1;
            }
            Some(Arc::new(TransposePlan {
                n0,
                n1,
                block0,
                block1,
                shape0,
                shape1,
                array_axis,
            }))
        };
        self.plans.lock().unwrap().insert(key, plan.clone());
        Ok(plan)
    }

    // Gather: every peer contributes its row block of the moving axis; each
    // rank leaves owning full rows and a column block of axis+1.
    fn gather_data<T: bytemuck::Pod>(
        &self,
        plan: &TransposePlan,
        input: &ArrayViewD<'_, T>,
        output: &mut ArrayViewMutD<'_, T>,
    ) {
        let peers = self.sub.size();
        let a = plan.array_axis;
        let order = rolled_axes(input.ndim(), a);
        let sends = (0..peers)
            .map(|peer| {
                let cols = span(plan.n1, plan.block1, peer);
                let chunk = input.slice_axis(Axis(a + 1), Slice::from(cols));
                pack(&chunk, &order)
            })
            .collect();
        let received = self.sub.all_to_all(sends);
        for (peer, bytes) in received.iter().enumerate() {
            let rows = span(plan.n0, plan.block0, peer);
            let dest = output.slice_axis_mut(Axis(a), Slice::from(rows));
            unpack(bytes, dest, &order);
        }
    }

    fn scatter_data<T: bytemuck::Pod>(
        &self,
        plan: &TransposePlan,
        input: &ArrayViewD<'_, T>,
        output: &mut ArrayViewMutD<'_, T>,
    ) {
        let peers = self.sub.size();
        let a = plan.array_axis;
        let order = rolled_axes(input.ndim(), a);
        let sends = (0..peers)
            .map(|peer| {
                let rows = span(plan.n0, plan.block0, peer);
                let chunk = input.slice_axis(Axis(a), Slice::from(rows));
                pack(&chunk, &order)
            })
            .collect();
        let received = self.sub.all_to_all(sends);
        for (peer, bytes) in received.iter().enumerate() {
            let cols = span(plan.n1, plan.block1, peer);
            let dest = output.slice_axis_mut(Axis(a + 1), Slice::from(cols));
            unpack(bytes, dest, &order);
        }
    }

    fn exchange(&self, plan: &TransposePlan, input: &DynArray, output: ArrayMut<'_>, gather: bool) {
        match (input, output) {
            (DynArray::Real(i), ArrayMut::Real(mut o)) => {
                if gather {
                    self.gather_data(plan, &i.view(), &mut o);
                } else {
                    self.scatter_data(plan, &i.view(), &mut o);
                }
            }
            (DynArray::Complex(i), ArrayMut::Complex(mut o)) => {
                if gather {
                    self.gather_data(plan, &i.view(), &mut o);
                } else {
                    self.scatter_data(plan, &i.view(), &mut o);
                }
            }
            _ => unreachable!("transposes preserve the dtype"),
        }
    }

    /// Gather along the mesh axis, toward grid space.
    pub(crate) fn increment(&self, fields: &mut [&mut Field]) -> Result<()> {
        if self.sync {
            self.sub.barrier();
        }
        if fields.len() == 1 {
            self.increment_single(fields[0])
        } else if self.group {
            self.increment_group(fields)
        } else {
            for field in fields.iter_mut() {
                self.increment_single(field)?;
            }
            Ok(())
        }
    }

    /// Scatter along the mesh axis, toward coefficient space.
    pub(crate) fn decrement(&self, fields: &mut [&mut Field]) -> Result<()> {
        if self.sync {
            self.sub.barrier();
        }
        if fields.len() == 1 {
            self.decrement_single(fields[0])
        } else if self.group {
            self.decrement_group(fields)
        } else {
            for field in fields.iter_mut() {
                self.decrement_single(field)?;
            }
            Ok(())
        }
    }

    fn increment_single(&self, field: &mut Field) -> Result<()> {
        let scales = field.scales();
        let Some(plan) = self.plan(1, &scales)? else {
            // No data on this sub-group: just update the layout pointer.
            field.set_layout_index(self.layout1.index());
            return Ok(());
        };
        let input = field.data().to_owned_data();
        field.set_layout_index(self.layout1.index());
        self.exchange(&plan, &input, field.data_mut(), true);
        Ok(())
    }

    fn decrement_single(&self, field: &mut Field) -> Result<()> {
        let scales = field.scales();
        let Some(plan) = self.plan(1, &scales)? else {
            field.set_layout_index(self.layout0.index());
            return Ok(());
        };
        let input = field.data().to_owned_data();
        field.set_layout_index(self.layout0.index());
        self.exchange(&plan, &input, field.data_mut(), false);
        Ok(())
    }

    fn check_group_scales(fields: &[&mut Field]) -> Result<Scales> {
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
        Ok(scales)
    }

    fn increment_group(&self, fields: &mut [&mut Field]) -> Result<()> {
        let scales = Self::check_group_scales(fields)?;
        let Some(plan) = self.plan(fields.len(), &scales)? else {
            for field in fields.iter_mut() {
                field.set_layout_index(self.layout1.index());
            }
            return Ok(());
        };
        let mut super0 = DynArray::zeros(&plan.shape0, self.layout0.dtype());
        for (slot, field) in fields.iter().enumerate() {
            super0.index_axis_mut(0, slot).assign(&field.data())?;
        }
        let mut super1 = DynArray::zeros(&plan.shape1, self.layout1.dtype());
        self.exchange(&plan, &super0, super1.view_mut(), true);
        for (slot, field) in fields.iter_mut().enumerate() {
            field.set_layout_index(self.layout1.index());
            field.data_mut().assign(&super1.index_axis(0, slot))?;
        }
        Ok(())
    }

    fn decrement_group(&self, fields: &mut [&mut Field]) -> Result<()> {
        let scales = Self::check_group_scales(fields)?;
        let Some(plan) = self.plan(fields.len(), &scales)? else {
            for field in fields.iter_mut() {
                field.set_layout_index(self.layout0.index());
            }
            return Ok(());
        };
        let mut super1 = DynArray::zeros(&plan.shape1, self.layout1.dtype());
        for (slot, field) in fields.iter().enumerate() {
            super1.index_axis_mut(0, slot).assign(&field.data())?;
        }
        let mut super0 = DynArray::zeros(&plan.shape0, self.layout0.dtype());
        self.exchange(&plan, &super1, super0.view_mut(), false);
        for (slot, field) in fields.iter_mut().enumerate() {
            field.set_layout_index(self.layout0.index());
            field.data_mut().assign(&super0.index_axis(0, slot))?;
        }
        Ok(())
    }
}
