//! Testing module for the complete workflow: signal peak over a polynomial
//! background, yields counted inside a signal window, extended fit.
//!
//!
//!

use CompositeFit::pdf::{Chebyshev::Chebyshev, Gaussian::Gaussian, Pdf, SumCoefficients};
use CompositeFit::*;

struct Model {
    reg: Registry,
    x: VarId,
    model: Pdf,
}

fn build_model() -> Model {
    let mut reg: Registry = Registry::new();
    let x: VarId = reg.observable("x", 0.0, 10.0).unwrap();
    reg.define_range(x, "signalRange", 4.0, 6.0).unwrap();

    let mean: VarId = reg.constant("mean", 5.0).unwrap();
    let sigma1: VarId = reg.constant("sigma1", 0.5).unwrap();
    let sigma2: VarId = reg.constant("sigma2", 1.0).unwrap();
    let a0: VarId = reg.parameter("a0", 0.5, 0.0, 1.0).unwrap();
    let a1: VarId = reg.parameter("a1", 0.2, 0.0, 1.0).unwrap();
    let sig1frac: VarId = reg.parameter("sig1frac", 0.8, 0.0, 1.0).unwrap();
    let nsig: VarId = reg.parameter("nsig", 500.0, 0.0, 10000.0).unwrap();
    let nbkg: VarId = reg.parameter("nbkg", 500.0, 0.0, 10000.0).unwrap();

    let sig1: Pdf = Pdf::leaf(Gaussian::new(&reg, "sig1", x, mean, sigma1).unwrap());
    let sig2: Pdf = Pdf::leaf(Gaussian::new(&reg, "sig2", x, mean, sigma2).unwrap());
    let bkg: Pdf = Pdf::leaf(Chebyshev::new(&reg, "bkg", x, &[a0, a1]).unwrap());
    let sig: Pdf = Pdf::sum(
        &reg,
        "sig",
        vec![sig1, sig2],
        SumCoefficients::Fractions(vec![sig1frac]),
    )
    .unwrap();

    let esig: Pdf = Pdf::extended(&reg, "esig", sig, nsig, Some("signalRange")).unwrap();
    let ebkg: Pdf = Pdf::extended(&reg, "ebkg", bkg, nbkg, Some("signalRange")).unwrap();
    let model: Pdf = Pdf::sum(&reg, "model", vec![esig, ebkg], SumCoefficients::FromExtended).unwrap();

    return Model { reg, x, model };
}

#[test]
fn extended_fit_of_the_tutorial_model() {
    let Model { mut reg, x, model } = build_model();
    assert!(model.is_extendable());

    let data: Dataset = sampler::generate_extended()
        .pdf(&model)
        .registry(&reg)
        .seed(2024)
        .call()
        .unwrap();
    assert!(0 < data.len());
    assert!(0 < data.count_in_range(&reg, x, "signalRange").unwrap());

    // start away from the generated values
    for (name, value) in [("nsig", 350.0), ("nbkg", 650.0), ("sig1frac", 0.6)] {
        let id: VarId = reg.find(name).unwrap();
        reg.set_value(id, value).unwrap();
    }

    let result: FitResult = fit_to().pdf(&model).registry(&reg).data(&data).call().unwrap();
    println!("{result}");

    assert!(result.is_converged(), "{result}");
    assert!(result.is_extended());
    assert_eq!(result.n_events(), data.len());
    assert_eq!(result.parameters().len(), 5);
    assert_eq!(result.constants().len(), 3);
    assert_eq!(result.parameter("nsig").unwrap().initial, 350.0);

    let nsig: &FitParameter = result.parameter("nsig").unwrap();
    assert!(0.0 < nsig.error);
    assert!((nsig.value - 500.0).abs() < 5.0 * nsig.error, "{result}");

    // a fraction at its bound can leave the Hessian without a covariance
    if let Some(rho) = result.correlation("nsig", "nbkg") {
        assert!((-1.0..=1.0).contains(&rho));
        assert_eq!(result.correlation("nsig", "nsig"), Some(1.0));
    }

    // the registry is untouched until the result is applied
    let id: VarId = reg.find("nsig").unwrap();
    assert_eq!(reg.value(id).unwrap(), 350.0);
    result.apply(&mut reg).unwrap();
    assert_eq!(reg.value(id).unwrap(), nsig.value);
}

#[test]
fn tutorial_density_is_normalized_in_the_signal_range() {
    let Model { reg, x, model } = build_model();
    let range: Range = reg.range(x, "signalRange").unwrap();

    let integral: f64 = euclid::integrate(
        |v| model.evaluate(&reg, v, Some("signalRange")).unwrap(),
        (range.low(), range.high() - 1e-12),
    );
    assert!((integral - 1.0).abs() < 1e-6, "{integral}");

    // outside of the range the range-normalized density is 0, [4, 6) is half open
    assert_eq!(model.evaluate(&reg, 1.0, Some("signalRange")).unwrap(), 0.0);
    assert_eq!(model.evaluate(&reg, 6.0, Some("signalRange")).unwrap(), 0.0);
    assert!(0.0 < model.evaluate(&reg, 4.0, Some("signalRange")).unwrap());
    // the upper bound of the observable belongs to it
    assert!(0.0 < model.evaluate(&reg, 10.0, None).unwrap());
    assert!(0.0 < model.evaluate(&reg, 1.0, None).unwrap());
}

#[test]
fn yields_of_the_signal_range_are_converted_to_the_full_range() {
    let Model { reg, x, model } = build_model();
    let values: Vec<f64> = reg.values();
    let full: Range = reg.support(x).unwrap();
    let signal: Range = reg.range(x, "signalRange").unwrap();

    let in_window: f64 = model.expected_events(&values, &signal).unwrap().unwrap();
    assert!((in_window - 1000.0).abs() < 1e-6, "{in_window}");

    let everywhere: f64 = model.expected_events(&values, &full).unwrap().unwrap();
    assert!(1000.0 < everywhere);
}
