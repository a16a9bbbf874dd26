pub mod engines;
pub mod inspect;
pub mod solve;
