//! # Data
//!
//! $$
//! P\in\mathbb R^{T\times N},\qquad F\in\mathbb R^{T'\times 5}
//! $$
//!
//! Price and factor containers, their loaders, and the collaborator traits
//! that feed the allocation engine.

pub mod factors;
pub mod prices;
pub mod returns;
pub mod source;
#[cfg(feature = "yahoo")]
pub mod yahoo;

pub use factors::build_factor_matrix;
pub use factors::load_factor_file;
pub use factors::Factor;
pub use factors::FactorMatrix;
pub use factors::FactorTable;
pub use prices::PriceMatrix;
pub use returns::ReturnSeries;
pub use source::CsvPriceSource;
pub use source::FactorSource;
pub use source::PriceSource;
#[cfg(feature = "yahoo")]
pub use yahoo::YahooPriceSource;
