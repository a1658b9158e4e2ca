pub mod convert;
pub mod fields;
pub mod links;
pub mod provenance;
pub mod reconciler;
pub mod relay;
pub mod status;
