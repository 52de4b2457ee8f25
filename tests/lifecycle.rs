//! Lifecycle contract of every kernel: buffers, unsupported variants and misuse.

use kperf::{
    data::live_buffers,
    kernels::{Kernel, KernelId},
    params::{RunParams, SizeSpec},
    variant::VariantId,
    SuiteError,
};

fn small() -> RunParams {
    RunParams::default()
        .with_size(200)
        .with_reps(2)
        .with_size_spec(SizeSpec::Mini)
}

fn host_variants() -> impl Iterator<Item = VariantId> {
    VariantId::compiled().filter(|v| !v.is_device_resident())
}

#[test]
fn buffers_are_released_after_every_execution() {
    let baseline = live_buffers();
    for id in KernelId::ALL {
        let mut kernel = id.make(&small());
        for variant in host_variants() {
            kernel.execute(variant).unwrap();
            assert_eq!(live_buffers(), baseline, "{id} {variant}");
        }
    }
}

#[test]
fn set_up_allocates_and_tear_down_releases() {
    let baseline = live_buffers();
    let mut kernel = KernelId::AppsPressure.make(&small());
    kernel.set_up(VariantId::BaseSeq).unwrap();
    assert_eq!(live_buffers(), baseline + 5);
    kernel.tear_down(VariantId::BaseSeq);
    assert_eq!(live_buffers(), baseline);
}

#[test]
fn running_without_set_up_is_an_error() {
    for id in KernelId::ALL {
        let mut kernel = id.make(&small());
        match kernel.run_kernel(VariantId::BaseSeq) {
            Err(SuiteError::NotSetUp(k)) => assert_eq!(k, id),
            other => panic!("{id}: unexpected {other:?}"),
        }
    }
}

#[test]
fn tear_down_without_set_up_is_harmless() {
    let baseline = live_buffers();
    for id in KernelId::ALL {
        let mut kernel = id.make(&small());
        kernel.tear_down(VariantId::BaseSeq);
        kernel.tear_down(VariantId::BaseSeq);
    }
    assert_eq!(live_buffers(), baseline);
}

#[cfg(not(feature = "cuda"))]
#[test]
fn unsupported_variant_does_no_work() {
    let baseline = live_buffers();
    for id in KernelId::ALL {
        let mut kernel = id.make(&small());
        kernel.execute(VariantId::BaseDevice).unwrap();
        kernel.execute(VariantId::PortableDevice).unwrap();

        let base = kernel.base();
        assert!(base.checksums().is_empty(), "{id}");
        assert!(base.times().is_empty(), "{id}");
        assert_eq!(live_buffers(), baseline, "{id}");
    }
}

#[test]
fn checksums_accumulate_over_passes() {
    for id in KernelId::ALL {
        let mut kernel = id.make(&small());
        kernel.execute(VariantId::BaseSeq).unwrap();
        let once = kernel.base().checksum(VariantId::BaseSeq).unwrap();
        kernel.execute(VariantId::BaseSeq).unwrap();
        let twice = kernel.base().checksum(VariantId::BaseSeq).unwrap();

        assert_eq!(twice, 2.0 * once, "{id}");
        assert_eq!(kernel.base().samples(VariantId::BaseSeq).len(), 2);
    }
}
