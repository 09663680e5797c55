pub mod pnl;
pub mod settlement;

pub use pnl::PnL;
pub use settlement::Settlement;
