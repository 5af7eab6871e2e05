//! Public API: the table gateway, its builders, batching and expressions.

pub mod batch;
pub mod builders;
pub mod condition;
pub mod filter;
pub mod pages;
pub mod table;
pub mod update;

pub use batch::BatchWriter;
pub use builders::{GetBuilder, QueryBuilder, ScanBuilder, UpdateBuilder};
pub use condition::KeyCondition;
pub use filter::{CompareOp, FilterExpr};
pub use pages::{Items, Records};
pub use table::{SaveReport, Table};
pub use update::UpdateAction;
