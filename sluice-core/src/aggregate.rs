//! Incremental aggregation contract and stock operations.
//!
//! An [`Aggregation`] bundles five function values:
//!
//! - `create`: construct an identity accumulator
//! - `accumulate`: fold one item into an accumulator
//! - `combine`: merge two accumulators (commutative, associative)
//! - `deduct` (optional): inverse of `combine`
//! - `finish`: convert an accumulator into the result, side-effect free
//!
//! When `deduct` is present, `deduct(combine(a, b), b) == a` must hold for
//! all `a`, `b`, and an accumulator that has had everything deducted must
//! compare equal to a freshly created one. The windowing operators use that
//! equality to detect that a key dropped out of a deduct-maintained sliding
//! window; an implementation whose deduct drifts away from the identity is
//! an aggregation bug, not detected here.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::EventTime;

type CreateFn<A> = Arc<dyn Fn() -> A + Send + Sync>;
type AccumulateFn<T, A> = Arc<dyn Fn(&mut A, &T) + Send + Sync>;
type MergeFn<A> = Arc<dyn Fn(&mut A, &A) + Send + Sync>;
type FinishFn<A, R> = Arc<dyn Fn(&A) -> R + Send + Sync>;

// ── Aggregation ───────────────────────────────────────────────────────────────

/// A windowing aggregation over items `T`, with accumulator `A` and result `R`.
///
/// Cheap to clone: the function values are shared. The same aggregation value
/// is typically handed to both stages of a frame pipeline.
pub struct Aggregation<T, A, R> {
    create: CreateFn<A>,
    accumulate: AccumulateFn<T, A>,
    combine: MergeFn<A>,
    deduct: Option<MergeFn<A>>,
    finish: FinishFn<A, R>,
}

impl<T, A, R> Clone for Aggregation<T, A, R> {
    fn clone(&self) -> Self {
        Self {
            create: Arc::clone(&self.create),
            accumulate: Arc::clone(&self.accumulate),
            combine: Arc::clone(&self.combine),
            deduct: self.deduct.as_ref().map(Arc::clone),
            finish: Arc::clone(&self.finish),
        }
    }
}

impl<T, A, R> Aggregation<T, A, R> {
    /// Build an aggregation from its four mandatory operations.
    pub fn of(
        create: impl Fn() -> A + Send + Sync + 'static,
        accumulate: impl Fn(&mut A, &T) + Send + Sync + 'static,
        combine: impl Fn(&mut A, &A) + Send + Sync + 'static,
        finish: impl Fn(&A) -> R + Send + Sync + 'static,
    ) -> Self {
        Self {
            create: Arc::new(create),
            accumulate: Arc::new(accumulate),
            combine: Arc::new(combine),
            deduct: None,
            finish: Arc::new(finish),
        }
    }

    /// Attach the inverse of `combine`, enabling constant-time sliding
    /// window maintenance downstream.
    pub fn with_deduct(mut self, deduct: impl Fn(&mut A, &A) + Send + Sync + 'static) -> Self {
        self.deduct = Some(Arc::new(deduct));
        self
    }

    /// Drop the deduct function, forcing full window recomputation
    /// downstream. Useful to cross-check the two sliding strategies.
    pub fn without_deduct(mut self) -> Self {
        self.deduct = None;
        self
    }

    /// Construct an identity accumulator.
    pub fn create(&self) -> A {
        (self.create)()
    }

    /// Fold one item into the accumulator.
    pub fn accumulate(&self, acc: &mut A, item: &T) {
        (self.accumulate)(acc, item);
    }

    /// Merge `other` into `acc`.
    pub fn combine(&self, acc: &mut A, other: &A) {
        (self.combine)(acc, other);
    }

    /// Return true if this aggregation supports deduction.
    pub fn has_deduct(&self) -> bool {
        self.deduct.is_some()
    }

    /// The deduct function, if present. The returned handle shares the
    /// underlying function value.
    pub fn deduct_fn(&self) -> Option<Arc<dyn Fn(&mut A, &A) + Send + Sync>> {
        self.deduct.as_ref().map(Arc::clone)
    }

    /// Convert the accumulator into the window result.
    pub fn finish(&self, acc: &A) -> R {
        (self.finish)(acc)
    }
}

// ── Stock operations ──────────────────────────────────────────────────────────

/// Count of items in the window. Supports deduct.
pub fn counting<T>() -> Aggregation<T, i64, i64> {
    Aggregation::of(|| 0i64, |acc, _item| *acc += 1, |acc, other| *acc += *other, |acc| *acc)
        .with_deduct(|acc, other| *acc -= *other)
}

/// Sum of an `i64` quantity extracted from each item. Supports deduct.
pub fn summing_i64<T>(
    get_value: impl Fn(&T) -> i64 + Send + Sync + 'static,
) -> Aggregation<T, i64, i64> {
    let get = Arc::new(get_value);
    Aggregation::of(
        || 0i64,
        move |acc, item| *acc += get(item),
        |acc, other| *acc += *other,
        |acc| *acc,
    )
    .with_deduct(|acc, other| *acc -= *other)
}

/// Accumulator for [`linear_trend`]: the running sums of a least-squares fit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinTrendAccumulator {
    n: i64,
    sum_x: i64,
    sum_y: i64,
    sum_xy: i64,
    sum_x2: i64,
}

impl LinTrendAccumulator {
    fn add(&mut self, x: i64, y: i64) {
        self.n += 1;
        self.sum_x += x;
        self.sum_y += y;
        self.sum_xy += x * y;
        self.sum_x2 += x * x;
    }

    fn merge(&mut self, other: &Self) {
        self.n += other.n;
        self.sum_x += other.sum_x;
        self.sum_y += other.sum_y;
        self.sum_xy += other.sum_xy;
        self.sum_x2 += other.sum_x2;
    }

    fn subtract(&mut self, other: &Self) {
        self.n -= other.n;
        self.sum_x -= other.sum_x;
        self.sum_y -= other.sum_y;
        self.sum_xy -= other.sum_xy;
        self.sum_x2 -= other.sum_x2;
    }

    /// The slope of the least-squares line through the accumulated points.
    /// Zero when the points do not determine a line.
    fn slope(&self) -> f64 {
        let n = i128::from(self.n);
        let (sx, sy) = (i128::from(self.sum_x), i128::from(self.sum_y));
        let (sxy, sx2) = (i128::from(self.sum_xy), i128::from(self.sum_x2));
        let denominator = n * sx2 - sx * sx;
        if denominator == 0 {
            return 0.0;
        }
        (n * sxy - sx * sy) as f64 / denominator as f64
    }
}

/// Rate of change of `y` as a function of `x`, where both quantities are
/// extracted from each item. Supports deduct.
pub fn linear_trend<T>(
    get_x: impl Fn(&T) -> EventTime + Send + Sync + 'static,
    get_y: impl Fn(&T) -> i64 + Send + Sync + 'static,
) -> Aggregation<T, LinTrendAccumulator, f64> {
    Aggregation::of(
        LinTrendAccumulator::default,
        move |acc, item| acc.add(get_x(item), get_y(item)),
        |acc: &mut LinTrendAccumulator, other| acc.merge(other),
        LinTrendAccumulator::slope,
    )
    .with_deduct(|acc, other| acc.subtract(other))
}

/// Pair two aggregations into one that maintains both at once, with a
/// `(A1, A2)` accumulator and a `(R1, R2)` result.
///
/// The pair supports deduct iff both constituents do. Larger tuples
/// compose by nesting.
pub fn zip<T, A1, R1, A2, R2>(
    left: Aggregation<T, A1, R1>,
    right: Aggregation<T, A2, R2>,
) -> Aggregation<T, (A1, A2), (R1, R2)>
where
    T: 'static,
    A1: 'static,
    R1: 'static,
    A2: 'static,
    R2: 'static,
{
    let deduct = match (left.deduct_fn(), right.deduct_fn()) {
        (Some(dl), Some(dr)) => Some(move |acc: &mut (A1, A2), other: &(A1, A2)| {
            dl(&mut acc.0, &other.0);
            dr(&mut acc.1, &other.1);
        }),
        _ => None,
    };

    let (cl, cr) = (Arc::clone(&left.create), Arc::clone(&right.create));
    let (al, ar) = (Arc::clone(&left.accumulate), Arc::clone(&right.accumulate));
    let (ml, mr) = (Arc::clone(&left.combine), Arc::clone(&right.combine));
    let (fl, fr) = (Arc::clone(&left.finish), Arc::clone(&right.finish));

    let zipped = Aggregation::of(
        move || (cl(), cr()),
        move |acc: &mut (A1, A2), item: &T| {
            al(&mut acc.0, item);
            ar(&mut acc.1, item);
        },
        move |acc: &mut (A1, A2), other: &(A1, A2)| {
            ml(&mut acc.0, &other.0);
            mr(&mut acc.1, &other.1);
        },
        move |acc: &(A1, A2)| (fl(&acc.0), fr(&acc.1)),
    );
    match deduct {
        Some(d) => zipped.with_deduct(d),
        None => zipped,
    }
}
