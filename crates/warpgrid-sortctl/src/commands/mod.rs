pub mod check;
pub mod order;
