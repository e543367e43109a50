//! Sea-ORM entities for the `categories`, `products` and `stock_movements` tables

pub mod category;
pub mod movement;
pub mod product;
