//! Strategy core: order-book analytics and the dual-order planner.
//!
//! [`LiquidityCalculator`] measures depth near the touch, [`SlippageModel`]
//! prices taker walks and maker placements, and [`BookAnalyzer`] combines
//! both with the fee tables into a maker+taker [`DualOrderPlan`] with a net
//! premium after costs.

pub mod liquidity;
pub mod planner;
pub mod slippage;

pub use liquidity::{DepthLevel, LiquidityAlert, LiquidityCalculator, LiquidityMetrics};
pub use planner::{AnalyzerConfig, BookAnalyzer, DualOrderPlan};
pub use slippage::{MakerPriceEstimate, SlippageEstimate, SlippageModel};
