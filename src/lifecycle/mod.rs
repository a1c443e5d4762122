//! Order lifecycle rules with no I/O.
//!
//! Services load an order, call into these functions, and persist the result
//! inside one versioned write. Keeping the rules here lets them be tested
//! without a database.

pub mod branching;
pub mod costing;
pub mod derivation;
pub mod status;

pub use branching::{available_capacity, plan_branch, scale_material_quantity, BranchPlan};
pub use costing::{
    completion_percentage, material_cost, order_statistics, piecework_lines, work_cost,
    OrderStatistics, PieceworkLine,
};
pub use derivation::{derive_materials, derive_operations, CatalogSnapshot};
pub use status::{apply_completion, operation_status, roll_up, OrderProgress};
