//! # Portfolio
//!
//! $$
//! \mathbf w^\*=\arg\max_{\mathbf w}\frac{\mu^\top\mathbf w}{\sqrt{\mathbf w^\top\Sigma\mathbf w}}
//! $$
//!
//! Maximum Sharpe optimization, discrete share allocation and the end-to-end
//! allocation engine.

pub mod allocation;
pub mod engine;
pub mod optimizer;
pub mod types;

pub use allocation::portfolio_performance;
pub use allocation::reconcile;
pub use engine::allocate_with_data;
pub use engine::validate_request;
pub use engine::Allocator;
pub use optimizer::max_sharpe;
pub use optimizer::tangency_weights;
pub use types::AllocationReport;
pub use types::AllocationResult;
pub use types::Holding;
pub use types::WeightVector;
