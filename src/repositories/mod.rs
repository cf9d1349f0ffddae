pub mod lineage_repository;

pub use lineage_repository::LineageRepository;
