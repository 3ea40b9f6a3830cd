#![allow(
    non_snake_case,
    clippy::needless_return,
    clippy::assign_op_pattern,
    clippy::excessive_precision
)]

#![warn(
    clippy::all,
    clippy::restriction,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
)]
// ^Disable warning "crate `CompositeFit` should have a snake case name convert the identifier to snake case: `composite_fit`"
// The rest of the names will follow the snake_case convention.

//! # Composite Fit
//!
//! This library builds probability density functions out of simple shapes,
//! generates toy datasets from them and fits them to data with an unbinned
//! (extended) maximum likelihood.
//!
//!  - [x] Variables with bounds and named ranges ([registry])
//!  - [x] Leaf shapes with closed form integrals
//!  - [x] Weighted sums with fractions or yields
//!  - [x] Extended pdfs with yields scoped to a named range
//!  - [x] Exact sampling of the whole tree ([sampler])
//!  - [x] Extended negative log likelihood, evaluated in parallel ([likelihood])
//!  - [x] Bounded minimization with parabolic errors ([minimizer], [fit])
//!  - [x] Storing the results as json
//!  - [ ] Multidimensional observables
//!  - [ ] Binned fits
//!
//! ## Variables
//!
//! All the variables live in a [Registry](registry::Registry) and pdfs refer to
//! them by [VarId](registry::VarId). An *observable* has finite bounds (its
//! support) and can have named ranges; a *parameter* may be bounded, unbounded
//! or constant.
//!
//! ## Pdfs
//!
//! A [Pdf](pdf::Pdf) is a tree. The leaves implement the [Shape](pdf::Shape)
//! trait, where the only required method is the unnormalized density. We
//! provide:
//!
//!  - [x] [Gaussian](pdf::Gaussian::Gaussian) ([Wiki](https://en.wikipedia.org/wiki/Normal_distribution))
//!  - [x] [Chebyshev](pdf::Chebyshev::Chebyshev) ([Wiki](https://en.wikipedia.org/wiki/Chebyshev_polynomials))
//!  - [x] [Polynomial](pdf::Polynomial::Polynomial)
//!  - [x] [Exponential](pdf::Exponential::Exponential) ([Wiki](https://en.wikipedia.org/wiki/Exponential_distribution))
//!  - [x] [Uniform](pdf::Uniform::Uniform) ([Wiki](https://en.wikipedia.org/wiki/Continuous_uniform_distribution))
//!  - [x] [Any function](pdf::Custom::CustomShape)
//!
//! Leaves are combined with [Pdf::sum](pdf::Pdf::sum) and given an expected
//! number of events with [Pdf::extended](pdf::Pdf::extended).
//!
//! ## Example
//!
//! A signal made of two Gaussians over a Chebyshev background, with the number
//! of signal events counted only inside `signalRange`:
//!
//! ```
//! use CompositeFit::pdf::{Chebyshev::Chebyshev, Gaussian::Gaussian, Pdf, SumCoefficients};
//! use CompositeFit::{fit_to, sampler, FitResult, Registry, Result};
//!
//! fn main() -> Result<()> {
//!     let mut reg: Registry = Registry::new();
//!     let x = reg.observable("x", 0.0, 10.0)?;
//!     reg.define_range(x, "signalRange", 4.0, 6.0)?;
//!
//!     let mean = reg.constant("mean", 5.0)?;
//!     let sigma1 = reg.constant("sigma1", 0.5)?;
//!     let sigma2 = reg.constant("sigma2", 1.0)?;
//!     let a0 = reg.parameter("a0", 0.5, 0.0, 1.0)?;
//!     let a1 = reg.parameter("a1", 0.2, 0.0, 1.0)?;
//!     let sig1frac = reg.parameter("sig1frac", 0.8, 0.0, 1.0)?;
//!     let nsig = reg.parameter("nsig", 500.0, 0.0, 10000.0)?;
//!     let nbkg = reg.parameter("nbkg", 500.0, 0.0, 10000.0)?;
//!
//!     let sig1 = Pdf::leaf(Gaussian::new(&reg, "sig1", x, mean, sigma1)?);
//!     let sig2 = Pdf::leaf(Gaussian::new(&reg, "sig2", x, mean, sigma2)?);
//!     let bkg = Pdf::leaf(Chebyshev::new(&reg, "bkg", x, &[a0, a1])?);
//!     let sig = Pdf::sum(&reg, "sig", vec![sig1, sig2], SumCoefficients::Fractions(vec![sig1frac]))?;
//!
//!     let esig = Pdf::extended(&reg, "esig", sig, nsig, Some("signalRange"))?;
//!     let ebkg = Pdf::extended(&reg, "ebkg", bkg, nbkg, Some("signalRange"))?;
//!     let model = Pdf::sum(&reg, "model", vec![esig, ebkg], SumCoefficients::FromExtended)?;
//!
//!     let data = sampler::generate().pdf(&model).registry(&reg).n(1000).seed(1).call()?;
//!     let result: FitResult = fit_to().pdf(&model).registry(&reg).data(&data).call()?;
//!     assert!(result.is_extended());
//!     println!("{result}");
//!     return Ok(());
//! }
//! ```
//!
//! ***
//!

pub mod configuration;
pub mod dataset;
pub mod domain;
pub mod errors;
pub mod euclid;
pub mod fit;
pub mod likelihood;
pub mod minimizer;
pub mod pdf;
pub mod range;
pub mod registry;
pub mod sampler;

pub use configuration::FitConfig;
pub use dataset::Dataset;
pub use errors::{FitError, Result};
pub use fit::{FitParameter, FitResult, FitState, FitStatus, Fitter, fit_to};
pub use range::Range;
pub use registry::{Registry, VarId};
