pub mod concentration;
pub mod engine;
pub mod liquidity;
pub mod scoring;
pub mod trend;
