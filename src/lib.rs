//! Regulator and class group computation for real quadratic orders.
//!
//! Given a discriminant D > 0 (non-square, D ≡ 0 or 1 mod 4), this crate
//! computes the regulator R of the order of discriminant D and the invariant
//! factors of its ideal class group. The engine is the infrastructure of the
//! principal cycle: reduced ideals carry an exact distance, baby steps walk
//! the cycle, NUCOMP/NUDUPL giant steps jump across it, and a hash-indexed
//! table of baby steps turns the analytic class number formula into a
//! baby-step/giant-step search in O(D^{1/5}) group operations (Lenstra).
//!
//! Modules:
//! - `numeric`: distance arithmetic and exact relative generators
//! - `order`: the quadratic order, prime ideals, Kronecker symbol
//! - `ideal`: quadratic ideals, reduction, NUCOMP and NUDUPL
//! - `infrastructure`: distance-tracked elements of the principal cycle
//! - `table`: the budget-sized baby-step hash table
//! - `lfunction`: L(1, chi) estimation and error bounds
//! - `regulator`: the Lenstra baby-step/giant-step orchestrator
//! - `class_group`: invariant factors via relation matrix + Smith normal form

pub mod class_group;
pub mod ideal;
pub mod infrastructure;
pub mod lfunction;
pub mod numeric;
pub mod order;
pub mod regulator;
pub mod table;

pub use class_group::{compute_class_group, ClassGroupResult};
pub use order::QuadraticOrder;
pub use regulator::{compute_regulator, RegulatorResult, SearchCase, SearchParams};

use num_bigint::BigInt;
use thiserror::Error;

/// Errors raised by the infrastructure computations.
#[derive(Debug, Clone, Error)]
pub enum InfraError {
    /// A form with a vanishing leading coefficient cannot represent an ideal.
    #[error("degenerate form ({a}, {b}, {c}): leading coefficient is zero")]
    DegenerateForm { a: BigInt, b: BigInt, c: BigInt },

    /// The input is not the discriminant of a real quadratic order.
    #[error("{0} is not a real quadratic discriminant (need D > 0, D = 0,1 mod 4, non-square)")]
    NotRealDiscriminant(BigInt),

    /// A bounded search walked past its bound without a match.
    #[error("search walked past bound {bound:.3} without a match")]
    BoundExceeded { bound: f64 },

    /// A reduction step failed to move the distance in its direction; the
    /// floating-point distance representation has lost the cycle.
    #[error("reduction step failed to advance the distance near {distance:.3}")]
    PrecisionDrift { distance: f64 },

    /// The baby-step table reached its budgeted capacity.
    #[error("baby-step table full at {capacity} entries")]
    TableFull { capacity: usize },

    /// The memory budget cannot hold even a minimal table.
    #[error("table needs at least {needed} bytes but the budget is {budget}")]
    MemoryBudgetExceeded { needed: usize, budget: usize },

    /// The class group search terminated without explaining the analytic
    /// class number estimate.
    #[error("class group search found order {found} but the analytic estimate requires {expected}")]
    ClassGroupIncomplete { found: u64, expected: u64 },
}
