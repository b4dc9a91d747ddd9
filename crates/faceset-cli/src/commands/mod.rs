pub mod describe;
pub mod prepare;
pub mod update;
pub mod validate;
