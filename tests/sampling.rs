//! Testing module for the generation of datasets.
//!
//!
//!

use CompositeFit::dataset::ColumnProperties;
use CompositeFit::pdf::{Gaussian::Gaussian, Pdf, SumCoefficients, Uniform::Uniform};
use CompositeFit::*;

fn gaussian(reg: &mut Registry, name: &str, x: VarId, mu: f64, sigma: f64) -> Pdf {
    let mean: VarId = reg.constant(&format!("{name}_mean"), mu).unwrap();
    let sigma: VarId = reg.constant(&format!("{name}_sigma"), sigma).unwrap();
    return Pdf::leaf(Gaussian::new(reg, name, x, mean, sigma).unwrap());
}

#[test]
fn exact_number_of_events() {
    let mut reg: Registry = Registry::new();
    let x: VarId = reg.observable("x", 0.0, 10.0).unwrap();
    let g: Pdf = gaussian(&mut reg, "g", x, 5.0, 1.0);

    for n in [0, 1, 17, 10000] {
        let data: Dataset = sampler::generate()
            .pdf(&g)
            .registry(&reg)
            .n(n)
            .seed(3)
            .call()
            .unwrap();
        assert_eq!(data.len(), n);
    }
}

#[test]
fn gaussian_moments() {
    let mut reg: Registry = Registry::new();
    let x: VarId = reg.observable("x", 0.0, 10.0).unwrap();
    let g: Pdf = gaussian(&mut reg, "g", x, 5.0, 1.0);

    let data: Dataset = sampler::generate()
        .pdf(&g)
        .registry(&reg)
        .n(10000)
        .seed(11)
        .call()
        .unwrap();
    let props: &ColumnProperties = data.properties(x).unwrap();

    // standard error of the mean is 0.01
    assert!((props.mean.unwrap() - 5.0).abs() < 0.05);
    assert!((props.variance.unwrap() - 1.0).abs() < 0.1);
    assert!(0.0 <= props.minimum.unwrap() && props.maximum.unwrap() <= 10.0);
}

#[test]
fn mixture_fractions() {
    let mut reg: Registry = Registry::new();
    let x: VarId = reg.observable("x", 0.0, 10.0).unwrap();
    let frac: VarId = reg.constant("frac", 0.3).unwrap();
    let left: Pdf = gaussian(&mut reg, "left", x, 2.0, 0.1);
    let right: Pdf = gaussian(&mut reg, "right", x, 8.0, 0.1);
    let model: Pdf = Pdf::sum(
        &reg,
        "model",
        vec![left, right],
        SumCoefficients::Fractions(vec![frac]),
    )
    .unwrap();

    let data: Dataset = sampler::generate()
        .pdf(&model)
        .registry(&reg)
        .n(10000)
        .seed(8)
        .call()
        .unwrap();
    let lower_half: Range = Range::new(0.0, 5.0).unwrap();
    let count: usize = data.count_in(x, &lower_half);
    // binomial standard deviation ~ 46
    assert!((count as f64 - 3000.0).abs() < 230.0, "{count}");
}

#[test]
fn generation_inside_a_range() {
    let mut reg: Registry = Registry::new();
    let x: VarId = reg.observable("x", 0.0, 10.0).unwrap();
    reg.define_range(x, "tail", 7.0, 9.0).unwrap();
    let g: Pdf = gaussian(&mut reg, "g", x, 5.0, 1.0);

    // only ~2% of the gaussian is inside the tail
    let data: Dataset = sampler::generate()
        .pdf(&g)
        .registry(&reg)
        .n(500)
        .range("tail")
        .seed(21)
        .call()
        .unwrap();
    assert_eq!(data.count_in_range(&reg, x, "tail").unwrap(), 500);
    assert!(data.properties(x).unwrap().mean.unwrap() < 8.0);

    assert!(matches!(
        sampler::generate().pdf(&g).registry(&reg).n(10).range("nowhere").call(),
        Err(FitError::UnknownRange { .. })
    ));
}

#[test]
fn poisson_fluctuated_generation() {
    let mut reg: Registry = Registry::new();
    let x: VarId = reg.observable("x", 0.0, 10.0).unwrap();
    let n: VarId = reg.parameter("n", 1000.0, 0.0, 1e5).unwrap();
    let u: Pdf = Pdf::leaf(Uniform::new(&reg, "u", x).unwrap());

    assert!(matches!(
        sampler::generate_extended().pdf(&u).registry(&reg).seed(1).call(),
        Err(FitError::NotExtendable(_))
    ));

    let eu: Pdf = Pdf::extended(&reg, "eu", u, n, None).unwrap();
    let mut sizes: Vec<usize> = Vec::new();
    for seed in 0..5 {
        let data: Dataset = sampler::generate_extended()
            .pdf(&eu)
            .registry(&reg)
            .seed(seed)
            .call()
            .unwrap();
        // 5 standard deviations
        assert!((data.len() as f64 - 1000.0).abs() < 160.0);
        sizes.push(data.len());
    }
    sizes.dedup();
    assert!(1 < sizes.len(), "the number of events must fluctuate");
}

#[test]
fn zero_integral_is_unnormalizable() {
    let mut reg: Registry = Registry::new();
    let x: VarId = reg.observable("x", 0.0, 10.0).unwrap();
    reg.define_range(x, "far", 9.0, 10.0).unwrap();
    let narrow: Pdf = gaussian(&mut reg, "narrow", x, 1.0, 0.01);

    assert!(matches!(
        sampler::generate().pdf(&narrow).registry(&reg).n(10).range("far").seed(2).call(),
        Err(FitError::UnnormalizablePdf { .. })
    ));
}

#[test]
fn mixture_follows_its_cdf() {
    let mut reg: Registry = Registry::new();
    let x: VarId = reg.observable("x", 0.0, 10.0).unwrap();
    let frac: VarId = reg.constant("frac", 0.4).unwrap();
    let peak: Pdf = gaussian(&mut reg, "peak", x, 6.0, 0.8);
    let flat: Pdf = Pdf::leaf(Uniform::new(&reg, "flat", x).unwrap());
    let model: Pdf = Pdf::sum(
        &reg,
        "model",
        vec![peak, flat],
        SumCoefficients::Fractions(vec![frac]),
    )
    .unwrap();

    let n: usize = 4000;
    let data: Dataset = sampler::generate()
        .pdf(&model)
        .registry(&reg)
        .n(n)
        .seed(31)
        .call()
        .unwrap();
    let mut events: Vec<f64> = data.column(x).unwrap().to_vec();
    events.sort_by(f64::total_cmp);

    let values: Vec<f64> = reg.values();
    let support: Range = reg.support(x).unwrap();
    let cdf = |v: f64| -> f64 {
        if v <= support.low() {
            return 0.0;
        }
        let below: Range = Range::new(support.low(), v).unwrap();
        return model.integral(&values, &support, &below).unwrap();
    };

    // Kolmogorov-Smirnov distance
    let mut distance: f64 = 0.0;
    for (i, &v) in events.iter().enumerate() {
        let f: f64 = cdf(v);
        let above: f64 = (i + 1) as f64 / n as f64 - f;
        let below: f64 = f - i as f64 / n as f64;
        distance = distance.max(above).max(below);
    }
    // critical value for alpha = 0.001
    assert!(distance < 1.95 / (n as f64).sqrt(), "{distance}");
}
