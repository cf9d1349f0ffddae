pub mod lineage;

pub use lineage::LineageService;
