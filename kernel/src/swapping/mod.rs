pub mod page_replacement;
pub mod swap_space;

pub use page_replacement::{ClockEviction, PageReplacementPolicy};
pub use swap_space::{SwapSlot, SwapSpace};
