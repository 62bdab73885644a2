//! # factor-allocator
//!
//! $$
//! \mathbf n=\Bigl\lfloor \frac{B}{\mathbf p}\odot\arg\max_{\mathbf w\ge 0,\ \mathbf 1^\top\mathbf w=1}\frac{\mu^\top\mathbf w}{\sqrt{\mathbf w^\top\Sigma\mathbf w}}\Bigr\rfloor
//! $$
//!
//! Long-only portfolio allocation driven by Carhart four-factor expected
//! returns and a Ledoit-Wolf shrinkage covariance.
//!
//! The pipeline is
//!
//! 1. load the Fama-French three-factor and momentum files and join them on date,
//! 2. fetch adjusted-close prices and drop tickers with no data,
//! 3. regress each asset's excess returns on the factors and annualize,
//! 4. shrink the sample covariance and make it positive definite,
//! 5. solve for the maximum Sharpe portfolio and clean the weights,
//! 6. turn weights into whole shares and re-evaluate the realized holdings.
//!
//! [`portfolio::Allocator`] runs all of it against a [`data::PriceSource`]
//! and a [`data::FactorSource`].

pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod portfolio;

pub use config::AllocatorConfig;
pub use error::AllocError;
pub use error::ErrorKind;
pub use error::Result;
pub use portfolio::AllocationResult;
pub use portfolio::Allocator;
