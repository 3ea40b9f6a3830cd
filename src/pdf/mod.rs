//! # Pdf expression tree
//!
//! A model is a tree of [Pdf] nodes:
//!
//!  - [Pdf::Leaf]: a [Shape] (see the submodules for the available families).
//!  - [Pdf::Sum]: a weighted sum of other nodes ([SumPdf]). Every child is
//!     normalized over the same domain before being weighted, so the sum is
//!     a proper mixture.
//!  - [Pdf::Extended]: attaches an expected number of events to a node
//!     ([ExtendedPdf]). The shape is unchanged. The expected count can be
//!     scoped to a named range of the observable.
//!
//! Nodes never own parameter values: they hold [VarId] handles and are evaluated
//! against a snapshot (`&[f64]`) of the [Registry]. Every normalization depends
//! on a *domain*, which is either the full support of the observable or one of
//! its named [Range]s. [Pdf::prepare] computes all the normalization constants for
//! a given snapshot and domain once, and the returned [PreparedPdf] can then be
//! evaluated cheaply (and from many threads at once).

pub mod shape_trait;

pub mod Chebyshev;
pub mod Custom;
pub mod Exponential;
pub mod Gaussian;
pub mod Polynomial;
pub mod Uniform;

use std::collections::BTreeSet;
use std::sync::Arc;

pub use shape_trait::Shape;

use crate::errors::{FitError, Result};
use crate::range::Range;
use crate::registry::{Registry, VarId};

/// Below this value an implicit fraction is considered to be `0.0`.
const IMPLICIT_FRACTION_TOLERANCE: f64 = 1e-12;

/// A node of the pdf tree.
#[derive(Debug, Clone)]
pub enum Pdf {
    Leaf(Arc<dyn Shape>),
    Sum(SumPdf),
    Extended(ExtendedPdf),
}

/// How the children of a [SumPdf] are weighted.
#[derive(Debug, Clone, PartialEq)]
pub enum SumCoefficients {
    /// `n - 1` fractions for `n` children. The last child gets `1 - sum(fractions)`.
    /// Every fraction (including the implicit one) must be inside `[0, 1]`.
    Fractions(Vec<VarId>),
    /// One yield per child. The weights are `yield_i / sum(yields)` and the
    /// sum is extendable with `sum(yields)` expected events. Every yield must
    /// be `>= 0` and their total `> 0`.
    Yields(Vec<VarId>),
    /// Every child is an [ExtendedPdf] and their expected number of events are
    /// used as yields.
    FromExtended,
}

#[derive(Debug, Clone)]
pub struct SumPdf {
    name: String,
    observable: VarId,
    children: Vec<Pdf>,
    coefficients: SumCoefficients,
}

/// A named range resolved at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedRange {
    pub name: String,
    pub range: Range,
}

#[derive(Debug, Clone)]
pub struct ExtendedPdf {
    name: String,
    child: Box<Pdf>,
    n_expected: VarId,
    /// If present, `n_expected` is the number of events expected **inside** this range.
    range: Option<NamedRange>,
}

impl Pdf {
    /// Wraps a [Shape] into a leaf node.
    pub fn leaf<S: Shape + 'static>(shape: S) -> Pdf {
        return Pdf::Leaf(Arc::new(shape));
    }

    /// Creates a weighted sum of `children`.
    ///
    /// Errors:
    ///  - [FitError::ObservableMismatch] if the children do not share the observable.
    ///  - [FitError::InvalidParameter] if the number of coefficients does not match.
    ///  - [FitError::InvalidWeight] if the current fractions are outside `[0, 1]` or
    ///     a current yield is negative.
    ///  - [FitError::NotExtendable] if [SumCoefficients::FromExtended] is used with
    ///     a child that is not an [ExtendedPdf].
    ///  - [FitError::RangeMismatch] if the extended children declare different ranges.
    pub fn sum(
        registry: &Registry,
        name: &str,
        children: Vec<Pdf>,
        coefficients: SumCoefficients,
    ) -> Result<Pdf> {
        let observable: VarId = match children.first() {
            Some(c) => c.observable(),
            None => {
                return Err(FitError::InvalidParameter {
                    name: name.to_string(),
                    reason: String::from("a sum needs at least one component"),
                });
            }
        };
        if children.iter().any(|c| c.observable() != observable) {
            return Err(FitError::ObservableMismatch(name.to_string()));
        }

        let arity_error = |expected: usize, got: usize| FitError::InvalidParameter {
            name: name.to_string(),
            reason: format!("expected {expected} coefficients, got {got}"),
        };

        match &coefficients {
            SumCoefficients::Fractions(ids) => {
                if ids.len() + 1 != children.len() {
                    return Err(arity_error(children.len() - 1, ids.len()));
                }
                for &id in ids {
                    registry.get(id)?;
                }
            }
            SumCoefficients::Yields(ids) => {
                if ids.len() != children.len() {
                    return Err(arity_error(children.len(), ids.len()));
                }
                for &id in ids {
                    registry.get(id)?;
                }
            }
            SumCoefficients::FromExtended => {
                let mut declared: Option<Option<&str>> = None;
                for child in &children {
                    let Pdf::Extended(e) = child else {
                        return Err(FitError::NotExtendable(child.name().to_string()));
                    };
                    let range_name: Option<&str> = e.range_name();
                    match declared {
                        None => declared = Some(range_name),
                        Some(previous) if previous != range_name => {
                            return Err(FitError::RangeMismatch(format!(
                                "the components of `{name}` declare their yields over different ranges ({previous:?} and {range_name:?})"
                            )));
                        }
                        Some(_) => {}
                    }
                }
            }
        }

        let sum: SumPdf = SumPdf {
            name: name.to_string(),
            observable,
            children,
            coefficients,
        };

        if matches!(sum.coefficients, SumCoefficients::Fractions(_) | SumCoefficients::Yields(_)) {
            let values: Vec<f64> = registry.values();
            let support: Range = registry.support(observable)?;
            sum.weights(&values, &support)?;
        }

        return Ok(Pdf::Sum(sum));
    }

    /// Attaches the expected number of events `n_expected` to `child`.
    ///
    /// If `range` is given, `n_expected` is the number of events expected inside
    /// that named range of the observable. The range must already be defined
    /// ([FitError::UnknownRange] otherwise). A negative yield is a
    /// [FitError::InvalidWeight].
    pub fn extended(
        registry: &Registry,
        name: &str,
        child: Pdf,
        n_expected: VarId,
        range: Option<&str>,
    ) -> Result<Pdf> {
        checked_yield(name, registry.value(n_expected)?)?;
        let range: Option<NamedRange> = match range {
            Some(r) => Some(NamedRange {
                name: r.to_string(),
                range: registry.range(child.observable(), r)?,
            }),
            None => None,
        };

        return Ok(Pdf::Extended(ExtendedPdf {
            name: name.to_string(),
            child: Box::new(child),
            n_expected,
            range,
        }));
    }

    pub fn name(&self) -> &str {
        return match self {
            Pdf::Leaf(s) => s.name(),
            Pdf::Sum(s) => &s.name,
            Pdf::Extended(e) => &e.name,
        };
    }

    /// The observable the tree is a density of.
    pub fn observable(&self) -> VarId {
        return match self {
            Pdf::Leaf(s) => s.observable(),
            Pdf::Sum(s) => s.observable,
            Pdf::Extended(e) => e.child.observable(),
        };
    }

    /// Every variable the tree depends on (except the observable), sorted and
    /// without duplicates.
    pub fn parameters(&self) -> Vec<VarId> {
        let mut set: BTreeSet<VarId> = BTreeSet::new();
        self.collect_parameters(&mut set);
        return set.into_iter().collect::<Vec<VarId>>();
    }

    fn collect_parameters(&self, set: &mut BTreeSet<VarId>) {
        match self {
            Pdf::Leaf(s) => set.extend(s.parameters()),
            Pdf::Sum(s) => {
                match &s.coefficients {
                    SumCoefficients::Fractions(ids) | SumCoefficients::Yields(ids) => {
                        set.extend(ids.iter().copied());
                    }
                    SumCoefficients::FromExtended => {}
                }
                for child in &s.children {
                    child.collect_parameters(set);
                }
            }
            Pdf::Extended(e) => {
                set.insert(e.n_expected);
                e.child.collect_parameters(set);
            }
        }
    }

    /// True if the tree defines an expected number of events.
    pub fn is_extendable(&self) -> bool {
        return match self {
            Pdf::Leaf(_) => false,
            Pdf::Sum(s) => !matches!(s.coefficients, SumCoefficients::Fractions(_)),
            Pdf::Extended(_) => true,
        };
    }

    /// All the ranges declared by the extended nodes of the tree.
    pub fn extended_ranges(&self) -> Vec<&NamedRange> {
        return match self {
            Pdf::Leaf(_) => Vec::new(),
            Pdf::Sum(s) => s
                .children
                .iter()
                .flat_map(|c| c.extended_ranges())
                .collect::<Vec<&NamedRange>>(),
            Pdf::Extended(e) => {
                let mut ret: Vec<&NamedRange> = e.child.extended_ranges();
                if let Some(r) = &e.range {
                    ret.push(r);
                }
                ret
            }
        };
    }

    /// Integral over `range` of the tree when it is normalized over `domain`.
    ///
    /// Leaves return the integral of their unnormalized shape. A sum returns
    /// `sum_i w_i * int_range f_i / int_domain f_i`, so a valid sum integrates to
    /// `1.0` over `domain`.
    pub fn integral(&self, values: &[f64], domain: &Range, range: &Range) -> Result<f64> {
        return match self {
            Pdf::Leaf(s) => Ok(s.integral(values, range)),
            Pdf::Extended(e) => e.child.integral(values, domain, range),
            Pdf::Sum(s) => {
                let weights: Vec<f64> = s.weights(values, domain)?;
                let mut total: f64 = 0.0;
                for (w, child) in weights.iter().zip(&s.children) {
                    let norm: f64 = child.normalization(values, domain)?;
                    total += w * child.integral(values, domain, range)? / norm;
                }
                Ok(total)
            }
        };
    }

    /// The integral of the tree over `domain`. Fails with
    /// [FitError::UnnormalizablePdf] if it is not strictly positive and finite.
    pub fn normalization(&self, values: &[f64], domain: &Range) -> Result<f64> {
        let integral: f64 = self.integral(values, domain, domain)?;
        if !integral.is_finite() || integral <= 0.0 {
            return Err(FitError::UnnormalizablePdf {
                name: self.name().to_string(),
                integral,
            });
        }
        return Ok(integral);
    }

    /// Expected number of events inside `domain`, or [None] if the tree is not
    /// extendable.
    ///
    /// For an [ExtendedPdf] with a range `R` and yield `n` the result is
    /// `n * int_domain f / int_R f`.
    pub fn expected_events(&self, values: &[f64], domain: &Range) -> Result<Option<f64>> {
        return match self {
            Pdf::Leaf(_) => Ok(None),
            Pdf::Sum(s) => match &s.coefficients {
                SumCoefficients::Fractions(_) => Ok(None),
                SumCoefficients::Yields(ids) => {
                    let mut total: f64 = 0.0;
                    for (i, id) in ids.iter().enumerate() {
                        total += checked_yield(&format!("{}[{i}]", s.name), values[id.index()])?;
                    }
                    Ok(Some(total))
                }
                SumCoefficients::FromExtended => {
                    let mut total: f64 = 0.0;
                    for child in &s.children {
                        total += child
                            .expected_events(values, domain)?
                            .ok_or_else(|| FitError::NotExtendable(child.name().to_string()))?;
                    }
                    Ok(Some(total))
                }
            },
            Pdf::Extended(e) => {
                let n: f64 = checked_yield(&e.name, values[e.n_expected.index()])?;
                let Some(scope) = &e.range else {
                    return Ok(Some(n));
                };
                if scope.range == *domain {
                    return Ok(Some(n));
                }
                let inside: f64 = e.child.integral(values, domain, &scope.range)?;
                if !inside.is_finite() || inside <= 0.0 {
                    return Err(FitError::UnnormalizablePdf {
                        name: e.name.clone(),
                        integral: inside,
                    });
                }
                let total: f64 = e.child.integral(values, domain, domain)?;
                Ok(Some(n * total / inside))
            }
        };
    }

    /// Computes every normalization constant of the tree for the parameter
    /// snapshot `values` and the normalization `domain`.
    pub fn prepare<'a>(&'a self, values: &'a [f64], domain: Range) -> Result<PreparedPdf<'a>> {
        let root: PreparedNode<'a> = PreparedNode::build(self, values, &domain)?;
        let norm: f64 = self.normalization(values, &domain)?;
        return Ok(PreparedPdf {
            name: self.name(),
            root,
            values,
            domain,
            closed: false,
            norm,
        });
    }

    /// Normalized density at `x` with the current values of `registry`.
    ///
    /// The normalization domain is the named `range` of the observable if given,
    /// or its full support otherwise. Values of `x` outside the domain have
    /// density `0.0`. Named ranges are half open `[low, high)` unless they end at
    /// the upper bound of the observable.
    pub fn evaluate(&self, registry: &Registry, x: f64, range: Option<&str>) -> Result<f64> {
        let domain: Range = registry.range_or_support(self.observable(), range)?;
        let support: Range = registry.support(self.observable())?;
        let values: Vec<f64> = registry.values();
        let mut prepared: PreparedPdf = self.prepare(&values, domain)?;
        if domain.high() == support.high() {
            prepared = prepared.with_upper_edge();
        }
        return prepared.density(x);
    }
}

impl SumPdf {
    pub fn children(&self) -> &[Pdf] {
        return &self.children;
    }

    pub fn coefficients(&self) -> &SumCoefficients {
        return &self.coefficients;
    }

    /// The weight of every child. They are always `>= 0` for fractions and add
    /// up to `1.0`.
    pub fn weights(&self, values: &[f64], domain: &Range) -> Result<Vec<f64>> {
        let raw: Vec<f64> = match &self.coefficients {
            SumCoefficients::Fractions(ids) => {
                let mut weights: Vec<f64> = Vec::with_capacity(self.children.len());
                let mut total: f64 = 0.0;
                for (i, id) in ids.iter().enumerate() {
                    let w: f64 = values[id.index()];
                    if !(0.0..=1.0).contains(&w) {
                        return Err(FitError::InvalidWeight {
                            name: format!("{}[{i}]", self.name),
                            value: w,
                        });
                    }
                    total += w;
                    weights.push(w);
                }

                let implicit: f64 = 1.0 - total;
                if implicit < -IMPLICIT_FRACTION_TOLERANCE || 1.0 < implicit {
                    return Err(FitError::InvalidWeight {
                        name: format!("{}[{}] (implicit)", self.name, ids.len()),
                        value: implicit,
                    });
                }
                weights.push(implicit.max(0.0));
                return Ok(weights);
            }
            SumCoefficients::Yields(ids) => ids
                .iter()
                .map(|id| values[id.index()])
                .collect::<Vec<f64>>(),
            SumCoefficients::FromExtended => {
                let mut yields: Vec<f64> = Vec::with_capacity(self.children.len());
                for child in &self.children {
                    yields.push(
                        child
                            .expected_events(values, domain)?
                            .ok_or_else(|| FitError::NotExtendable(child.name().to_string()))?,
                    );
                }
                yields
            }
        };

        if let Some((i, &y)) = raw.iter().enumerate().find(|(_, y)| !(0.0 <= **y)) {
            return Err(FitError::InvalidWeight {
                name: format!("{}[{i}] (yield)", self.name),
                value: y,
            });
        }

        let total: f64 = raw.iter().sum::<f64>();
        if !total.is_finite() || total <= 0.0 {
            return Err(FitError::UnnormalizablePdf {
                name: self.name.clone(),
                integral: total,
            });
        }
        return Ok(raw.iter().map(|y| y / total).collect::<Vec<f64>>());
    }
}

/// A yield is an expected number of events: finite and `>= 0`.
fn checked_yield(name: &str, value: f64) -> Result<f64> {
    if !(value.is_finite() && 0.0 <= value) {
        return Err(FitError::InvalidWeight {
            name: format!("{name} (yield)"),
            value,
        });
    }
    return Ok(value);
}

impl ExtendedPdf {
    pub fn child(&self) -> &Pdf {
        return &self.child;
    }

    pub fn n_expected(&self) -> VarId {
        return self.n_expected;
    }

    pub fn range(&self) -> Option<&NamedRange> {
        return self.range.as_ref();
    }

    pub fn range_name(&self) -> Option<&str> {
        return self.range.as_ref().map(|r| r.name.as_str());
    }
}

#[derive(Debug)]
enum PreparedNode<'a> {
    Leaf(&'a dyn Shape),
    /// `(weight / normalization of the child, child)`
    Sum(Vec<(f64, PreparedNode<'a>)>),
}

impl<'a> PreparedNode<'a> {
    fn build(pdf: &'a Pdf, values: &[f64], domain: &Range) -> Result<PreparedNode<'a>> {
        return match pdf {
            Pdf::Leaf(s) => {
                s.validate(values)?;
                Ok(PreparedNode::Leaf(s.as_ref()))
            }
            Pdf::Extended(e) => PreparedNode::build(&e.child, values, domain),
            Pdf::Sum(s) => {
                let weights: Vec<f64> = s.weights(values, domain)?;
                let mut nodes: Vec<(f64, PreparedNode<'a>)> = Vec::with_capacity(weights.len());
                for (w, child) in weights.iter().zip(&s.children) {
                    let norm: f64 = child.normalization(values, domain)?;
                    nodes.push((w / norm, PreparedNode::build(child, values, domain)?));
                }
                Ok(PreparedNode::Sum(nodes))
            }
        };
    }

    fn value(&self, x: f64, values: &[f64]) -> f64 {
        return match self {
            PreparedNode::Leaf(s) => s.unnormalized(x, values),
            PreparedNode::Sum(nodes) => nodes
                .iter()
                .map(|(c, node)| c * node.value(x, values))
                .sum::<f64>(),
        };
    }
}

/// A [Pdf] with all its normalization constants computed for a fixed parameter
/// snapshot and domain.
#[derive(Debug)]
pub struct PreparedPdf<'a> {
    name: &'a str,
    root: PreparedNode<'a>,
    values: &'a [f64],
    domain: Range,
    /// The upper edge of the domain is also the upper bound of the observable
    closed: bool,
    norm: f64,
}

impl PreparedPdf<'_> {
    pub fn domain(&self) -> Range {
        return self.domain;
    }

    /// Includes the upper edge of the domain, for domains that end at the upper
    /// bound of the observable (the observable itself is a closed interval).
    #[must_use]
    pub fn with_upper_edge(mut self) -> Self {
        self.closed = true;
        return self;
    }

    /// `x` is inside the (half open) domain, or at its upper edge if it is included.
    pub fn in_domain(&self, x: f64) -> bool {
        return self.domain.contains(x) || (self.closed && x == self.domain.high());
    }

    /// The normalization constant of the root node.
    pub fn norm(&self) -> f64 {
        return self.norm;
    }

    /// The normalized density at `x`. It is `0.0` outside of the domain
    /// (see [PreparedPdf::in_domain]).
    ///
    /// Fails with [FitError::NegativeDensity] if the tree evaluates to a negative
    /// or non finite value.
    pub fn density(&self, x: f64) -> Result<f64> {
        if !self.in_domain(x) {
            return Ok(0.0);
        }
        let value: f64 = self.root.value(x, self.values) / self.norm;
        if !value.is_finite() || value < 0.0 {
            return Err(FitError::NegativeDensity {
                name: self.name.to_string(),
                x,
                value,
            });
        }
        return Ok(value);
    }

    /// `ln(density(x))`. Can be `-inf` if the density is `0.0`.
    #[inline]
    pub fn log_density(&self, x: f64) -> Result<f64> {
        return self.density(x).map(f64::ln);
    }
}
