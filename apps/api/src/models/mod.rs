pub mod form;
pub mod generated;
pub mod plan;
