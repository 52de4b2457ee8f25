//! Cross-variant properties of the kernels.

use kperf::{
    data::DataInit,
    drivers,
    kernels::{Fir, Kernel, KernelId, Reduce3Int, TrapInt, FIR_COEFFLEN},
    params::{RunParams, SizeSpec},
    perf_report::Status,
    variant::VariantId,
};

fn params(reps: usize) -> RunParams {
    RunParams::default()
        .with_size(1_000)
        .with_reps(reps)
        .with_size_spec(SizeSpec::Mini)
}

fn host_variants() -> Vec<VariantId> {
    VariantId::compiled()
        .filter(|v| !v.is_device_resident())
        .collect()
}

const ELEMENTWISE: [KernelId; 5] = [
    KernelId::StreamAdd,
    KernelId::AppsFir,
    KernelId::AppsPressure,
    KernelId::AppsDelDotVec2d,
    KernelId::Polybench2mm,
];

#[test]
fn every_compiled_variant_agrees_with_base_seq() {
    let variants: Vec<_> = VariantId::compiled().collect();
    let reports = drivers::run_suite(&params(2), &KernelId::ALL, &variants);
    for report in &reports {
        assert_eq!(report.status(), Status::Passed, "{report}");
    }
}

#[test]
fn sequential_variants_agree_exactly_on_elementwise_kernels() {
    for id in ELEMENTWISE {
        let mut kernel = id.make(&params(1));
        kernel.execute(VariantId::BaseSeq).unwrap();
        kernel.execute(VariantId::PortableSeq).unwrap();
        assert_eq!(
            kernel.base().checksum(VariantId::BaseSeq),
            kernel.base().checksum(VariantId::PortableSeq),
            "{id}"
        );
    }
}

#[test]
fn elementwise_kernels_are_idempotent_across_repetitions() {
    for id in ELEMENTWISE {
        for variant in host_variants() {
            let mut once = id.make(&params(1));
            let mut thrice = id.make(&params(3));
            once.execute(variant).unwrap();
            thrice.execute(variant).unwrap();
            assert_eq!(
                once.base().checksum(variant),
                thrice.base().checksum(variant),
                "{id} {variant}"
            );
        }
    }
}

#[test]
fn reductions_accumulate_across_repetitions() {
    for variant in host_variants() {
        let run = |reps| {
            let mut kernel = Reduce3Int::new(&params(reps));
            kernel.set_up(variant).unwrap();
            kernel.run_kernel(variant).unwrap();
            let totals = kernel.totals();
            kernel.tear_down(variant);
            totals
        };
        let (once, thrice) = (run(1), run(3));
        assert_eq!(thrice.sum, 3 * once.sum, "{variant}");
        assert_eq!((thrice.min, thrice.max), (once.min, once.max), "{variant}");

        let run = |reps| {
            let mut kernel = TrapInt::new(&params(reps));
            kernel.set_up(variant).unwrap();
            kernel.run_kernel(variant).unwrap();
            let total = kernel.total();
            kernel.tear_down(variant);
            total
        };
        let (once, thrice) = (run(1), run(3));
        assert!(
            ((thrice - 3.0 * once) / (3.0 * once)).abs() < 1e-12,
            "{variant}"
        );
    }
}

#[test]
fn fir_computes_n_minus_coefflen_outputs() {
    for n in [FIR_COEFFLEN, FIR_COEFFLEN + 1, 1_000] {
        let fir = Fir::new(&RunParams::default().with_size(n).with_reps(1));
        assert_eq!(fir.domain(), n - FIR_COEFFLEN);
    }
    let fir = Fir::new(&RunParams::default().with_size(3));
    assert_eq!(fir.domain(), 0);
}

#[test]
fn seed_only_changes_integer_data() {
    let mut reference = DataInit::new(RunParams::default().seed);
    let mut reseeded = DataInit::new(12345);
    assert_ne!(
        reference.ints(1_000, VariantId::BaseSeq).unwrap(),
        reseeded.ints(1_000, VariantId::BaseSeq).unwrap()
    );
    assert_eq!(
        reference.reals(1_000, VariantId::BaseSeq).unwrap(),
        reseeded.reals(1_000, VariantId::BaseSeq).unwrap()
    );
}
