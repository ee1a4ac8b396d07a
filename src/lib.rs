pub mod domain;
pub mod models;
pub mod processing;
pub mod repository;
pub mod sources;
pub mod vision;
