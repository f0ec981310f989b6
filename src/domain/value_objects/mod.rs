pub mod price;
pub mod shares;

pub use price::Price;
pub use shares::Shares;
