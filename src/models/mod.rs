pub mod warehouses;

pub use self::warehouses::*;
