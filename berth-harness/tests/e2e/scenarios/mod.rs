pub mod env_lifecycle;
pub mod flow_composition;
