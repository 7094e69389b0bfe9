pub mod atr;
pub mod rolling;
pub mod wilder;
