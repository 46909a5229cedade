pub mod matrix;
pub mod run;
pub mod validate;
