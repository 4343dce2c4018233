//! Multi-rank walks through the layout chain.

use float_cmp::assert_approx_eq;
use ndarray::{ArrayD, IxDyn};
use num_complex::Complex64;
use rand::Rng;
use rand_pcg::Pcg64;
use specfield::{
    towards_coeff_space_many, towards_grid_space_many, universe, ArrayMut, ArrayRef, Chebyshev,
    Compound, Comm, Config, Domain, Dtype, DynArray, Field, Fourier, LayoutSpace, Scales,
};
use std::f64::consts::PI;
use std::sync::Arc;
use std::thread;

fn fourier_chebyshev(comm: Comm, config: Config) -> Arc<Domain> {
    Domain::new(
        vec![
            Fourier::new(16, (0.0, 2.0 * PI)).named("x").into(),
            Chebyshev::new(32, (-1.0, 1.0)).named("y").into(),
        ],
        Dtype::Complex,
        Some(vec![4]),
        comm,
        config,
    )
    .unwrap()
}

fn random_coeffs(field: &Field, rank: usize) -> DynArray {
    let mut rng = Pcg64::new(0xa02bdbf7bb3c0a7 + rank as u128, 0x5851f42d4c957f2d);
    let shape: Vec<usize> = field.data().shape().to_vec();
    let count: usize = shape.iter().product();
    let values: Vec<Complex64> = (0..count)
        .map(|_| Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
        .collect();
    DynArray::Complex(ArrayD::from_shape_vec(IxDyn(&shape), values).unwrap())
}

fn max_abs_diff(a: &ArrayRef<'_>, b: &ArrayRef<'_>) -> f64 {
    let (ArrayRef::Complex(a), ArrayRef::Complex(b)) = (a, b) else {
        unreachable!();
    };
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (*x - *y).norm())
        .fold(0.0, f64::max)
}

#[test]
fn scaled_round_trip_over_four_ranks() {
    let handles: Vec<_> = universe(4)
        .into_iter()
        .map(|comm| {
            thread::spawn(move || {
                let rank = comm.rank();
                let domain = fourier_chebyshev(comm, Config::default());
                let mut field = domain.new_field().unwrap();
                field
                    .set_scales(&Scales::new(vec![1.5, 1.5]).unwrap())
                    .unwrap();
                let original = random_coeffs(&field, rank);
                field
                    .write_in(LayoutSpace::Coeff, &original.view())
                    .unwrap();

                field.require_layout(LayoutSpace::Grid).unwrap();
                assert!(field.layout().grid_space().iter().all(|&g| g));
                field.require_layout(LayoutSpace::Coeff).unwrap();

                max_abs_diff(&field.data(), &original.view())
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap() <= 1e-12);
    }
}

#[test]
fn local_shapes_tile_the_global_shape() {
    // Over every layout, the rank-summed local element counts equal the
    // global element count.
    let handles: Vec<_> = universe(4)
        .into_iter()
        .map(|comm| {
            thread::spawn(move || {
                let domain = fourier_chebyshev(Arc::clone(&comm), Config::default());
                let scales = Scales::new(vec![1.5, 1.0]).unwrap();
                for layout in domain.distributor().layouts() {
                    let geometry = layout.geometry(&scales).unwrap();
                    let local = geometry.local_elements() as f64;
                    let global: usize = geometry.global_shape.iter().product();
                    let summed = comm.all_reduce_sum(local);
                    assert_approx_eq!(f64, summed, global as f64, epsilon = 0.0);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn grouped_walks_round_trip() {
    let config = Config {
        group_transforms: true,
        group_transposes: true,
        sync_transposes: true,
        ..Config::default()
    };
    let handles: Vec<_> = universe(4)
        .into_iter()
        .map(|comm| {
            let config = config.clone();
            thread::spawn(move || {
                let rank = comm.rank();
                let domain = fourier_chebyshev(comm, config);
                let mut first = domain.new_field().unwrap();
                let mut second = domain.new_field().unwrap();
                let data_first = random_coeffs(&first, rank);
                let data_second = random_coeffs(&second, rank + 100);
                first.write_in(LayoutSpace::Coeff, &data_first.view()).unwrap();
                second
                    .write_in(LayoutSpace::Coeff, &data_second.view())
                    .unwrap();

                let steps = domain.distributor().paths().len();
                for _ in 0..steps {
                    towards_grid_space_many(&mut [&mut first, &mut second]).unwrap();
                }
                for _ in 0..steps {
                    towards_coeff_space_many(&mut [&mut first, &mut second]).unwrap();
                }

                let error = max_abs_diff(&first.data(), &data_first.view())
                    .max(max_abs_diff(&second.data(), &data_second.view()));
                assert!(error <= 1e-12);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn differentiation_crosses_the_transpose() {
    // d/dx of T0(y)·exp(ix) picks up a factor i. The x axis starts
    // distributed; differentiating it forces the walk through the
    // transpose that makes it local.
    let handles: Vec<_> = universe(4)
        .into_iter()
        .map(|comm| {
            thread::spawn(move || {
                let rank = comm.rank();
                let domain = fourier_chebyshev(comm, Config::default());
                let mut field = domain.new_field().unwrap();
                let mut out = domain.new_field().unwrap();

                let shape: Vec<usize> = field.data().shape().to_vec();
                let mut data = DynArray::zeros(&shape, Dtype::Complex);
                // Global mode (k = 1, T0) lives in rank 0's row block.
                if rank == 0 {
                    if let ArrayMut::Complex(mut view) = data.view_mut() {
                        view[[1, 0]] = Complex64::new(1.0, 0.0);
                    }
                }
                field.write_in(LayoutSpace::Coeff, &data.view()).unwrap();
                field.differentiate(0, &mut out).unwrap();

                // The walk made the x axis local, transforming y to its grid
                // along the way; T0(y) is 1 everywhere, so every local y
                // column of the k = 1 row carries the factor i.
                assert!(out.layout().local()[0]);
                assert!(out.layout().grid_space()[1]);
                let ArrayRef::Complex(result) = out.data() else {
                    unreachable!();
                };
                assert_eq!(result.shape(), &[15, 8]);
                for (index, value) in result.indexed_iter() {
                    let expected = if index[0] == 1 {
                        Complex64::new(0.0, 1.0)
                    } else {
                        Complex64::default()
                    };
                    assert_approx_eq!(f64, value.re, expected.re, epsilon = 1e-12);
                    assert_approx_eq!(f64, value.im, expected.im, epsilon = 1e-12);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn compound_axis_joins_the_walk() {
    let comm = universe(1).pop().unwrap();
    let compound = Compound::new(vec![
        Chebyshev::new(8, (0.0, 1.0)).into(),
        Chebyshev::new(8, (1.0, 2.0)).into(),
    ])
    .unwrap();
    let domain = Domain::new(
        vec![
            Fourier::new(8, (0.0, 2.0 * PI)).named("x").into(),
            compound.named("y").into(),
        ],
        Dtype::Complex,
        None,
        comm,
        Config::default(),
    )
    .unwrap();

    let mut field = domain.new_field().unwrap();
    let original = random_coeffs(&field, 7);
    field.write_in(LayoutSpace::Coeff, &original.view()).unwrap();
    field.require_layout(LayoutSpace::Grid).unwrap();
    field.require_layout(LayoutSpace::Coeff).unwrap();
    assert!(max_abs_diff(&field.data(), &original.view()) <= 1e-12);
}
