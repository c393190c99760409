// Application layer - Use cases and provider seams
pub mod reading_provider;
pub mod vitals_service;
