// Domain layer - Report and reading models
pub mod reading;
pub mod vitals;
